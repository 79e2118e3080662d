//! Configuration module for the battle core server.
//!
//! Supports JSON configuration files, environment variable overrides, stdin
//! input, and sensible defaults, all failing fast at startup when a value
//! falls outside its documented bound (§6.5).
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`admission`]: Admission controller tunables (timeout, queue, rate limit)
//! - [`session`]: Session Store inactivity timeout
//! - [`reconnect`]: Reconnect Service grace period
//! - [`janitor`]: Janitor sweep cadence and batch size
//! - [`rate_limit`]: Per-channel sliding-window rate limiter declarations
//! - [`board`]: Board/rule-set hard ceilings
//! - [`client_build`]: Supported client build versions
//! - [`drain`]: Drain / maintenance mode toggles
//! - [`logging`]: Logging configuration
//! - [`metrics`]: Metrics registry configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Configuration validation functions
//! - [`defaults`]: Default value functions

pub mod admission;
pub mod board;
pub mod client_build;
pub mod defaults;
pub mod drain;
pub mod health;
pub mod janitor;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod reconnect;
pub mod session;
pub mod types;
pub mod validation;

pub use admission::AdmissionConfig;
pub use board::BoardConfig;
pub use client_build::ClientBuildConfig;
pub use drain::DrainConfig;
pub use health::HealthConfig;
pub use janitor::JanitorConfig;
pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metrics::MetricsConfig;
pub use rate_limit::{ChannelLimit, RateLimiterConfig};
pub use reconnect::ReconnectConfig;
pub use session::SessionConfig;
pub use types::Config;
pub use validation::{validate, ConfigValidationError};
