//! Board State (§4.7): row-major cell array, tile placement application.

use crate::types::{Adjacency, BoardCell, CellOwner};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("position out of bounds")]
    OutOfBounds,
    #[error("cell already occupied")]
    PrecedenceConflict,
    #[error("write would move the cell's tick backward")]
    InvalidTilePlacement,
    #[error("placement does not satisfy the rule set's adjacency policy")]
    AdjacencyViolation,
}

/// Owned by exactly one [`crate::room::BattleRoom`] for its lifetime;
/// never accessed concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub width: u16,
    pub height: u16,
    cells: Vec<BoardCell>,
}

impl Board {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cells: vec![BoardCell::default(); width as usize * height as usize],
        }
    }

    fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn seed_tile(&mut self, x: u16, y: u16, tile_type: u32) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            self.cells[idx] = BoardCell {
                tile_type: Some(tile_type),
                last_updated_tick: 0,
                last_updated_by: CellOwner::System,
            };
        }
    }

    pub fn get_cell(&self, x: u16, y: u16) -> Option<BoardCell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.cells[self.index(x, y)])
    }

    pub fn cells(&self) -> &[BoardCell] {
        &self.cells
    }

    /// `true` once any cell holds a placed tile (seeded or player-placed).
    pub fn has_any_tile(&self) -> bool {
        self.cells.iter().any(|c| c.tile_type.is_some())
    }

    /// Whether `(x, y)` has at least one occupied neighbor under `adjacency`
    /// (§3 `placement.adjacency`). `None` is trivially satisfied; `Orthogonal`
    /// checks the four cardinal neighbors; `Any` adds the four diagonals.
    pub fn has_adjacent_tile(&self, x: u16, y: u16, adjacency: Adjacency) -> bool {
        let offsets: &[(i32, i32)] = match adjacency {
            Adjacency::None => return true,
            Adjacency::Orthogonal => &[(0, -1), (0, 1), (-1, 0), (1, 0)],
            Adjacency::Any => &[
                (-1, -1),
                (0, -1),
                (1, -1),
                (-1, 0),
                (1, 0),
                (-1, 1),
                (0, 1),
                (1, 1),
            ],
        };
        offsets.iter().any(|(dx, dy)| {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            nx >= 0
                && ny >= 0
                && self
                    .get_cell(nx as u16, ny as u16)
                    .is_some_and(|c| c.tile_type.is_some())
        })
    }

    /// Apply a tile placement (§4.7):
    /// 1. Position must be in bounds.
    /// 2. Cell must be empty.
    /// 3. `tick >= cell.lastUpdatedTick` (no backward writes).
    /// 4. Adjacency policy satisfied, unless this is the board's first
    ///    placement and the rule set allows placing anywhere first.
    /// 5. On success: set `tileType`, `lastUpdatedTick`, `lastUpdatedBy`.
    pub fn apply_tile_placement(
        &mut self,
        x: u16,
        y: u16,
        tile_type: u32,
        tick: u64,
        actor: CellOwner,
        adjacency: Adjacency,
        allow_first_placement_anywhere: bool,
    ) -> Result<BoardCell, BoardError> {
        if x >= self.width || y >= self.height {
            return Err(BoardError::OutOfBounds);
        }

        let idx = self.index(x, y);
        let cell = self.cells[idx];

        if cell.tile_type.is_some() {
            return Err(BoardError::PrecedenceConflict);
        }

        if tick < cell.last_updated_tick {
            return Err(BoardError::InvalidTilePlacement);
        }

        let is_first_placement = !self.has_any_tile();
        if !(is_first_placement && allow_first_placement_anywhere) && !self.has_adjacent_tile(x, y, adjacency) {
            return Err(BoardError::AdjacencyViolation);
        }

        let updated = BoardCell {
            tile_type: Some(tile_type),
            last_updated_tick: tick,
            last_updated_by: actor,
        };
        self.cells[idx] = updated;
        Ok(updated)
    }
}
