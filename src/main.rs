use battle_core_server::config;
use battle_core_server::logging;
use battle_core_server::net;
use battle_core_server::server::ServerState;
use clap::Parser;
use std::net::SocketAddr;

/// Battle Core Server -- realtime session, action pipeline, and
/// battle-room core for a tile-based multiplayer game.
#[derive(Parser, Debug)]
#[command(name = "battle-core-server")]
#[command(about = "Realtime admission, session, and battle-room core server")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Board max dimension: {}", cfg.board.max_dimension);
                println!("  Board max players: {}", cfg.board.max_players);
                println!("  Admission timeout: {}ms", cfg.admission.timeout_ms);
                println!("  Reconnect grace: {}ms", cfg.reconnect.grace_ms);
                println!("  Drain mode: {}", cfg.drain.drain_mode_enabled);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result.map_err(|e| anyhow::anyhow!("{e}"))?;

    logging::init_with_config(&cfg.logging);

    let port = cfg.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "Starting battle core server");

    let state = ServerState::build(cfg);
    state.spawn_background_tasks();

    let router = net::router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server started");

    axum::serve(listener, router).await?;

    Ok(())
}
