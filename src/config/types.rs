//! Root configuration types.

use super::admission::AdmissionConfig;
use super::board::BoardConfig;
use super::client_build::ClientBuildConfig;
use super::defaults::default_port;
use super::drain::DrainConfig;
use super::health::HealthConfig;
use super::janitor::JanitorConfig;
use super::logging::LoggingConfig;
use super::metrics::MetricsConfig;
use super::rate_limit::RateLimiterConfig;
use super::reconnect::ReconnectConfig;
use super::session::SessionConfig;
use serde::{Deserialize, Serialize};

/// Root configuration for the battle core server.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub admission: AdmissionConfig,
    pub session: SessionConfig,
    pub reconnect: ReconnectConfig,
    pub janitor: JanitorConfig,
    pub rate_limiter: RateLimiterConfig,
    pub board: BoardConfig,
    pub client_build: ClientBuildConfig,
    pub drain: DrainConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub health: HealthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            admission: AdmissionConfig::default(),
            session: SessionConfig::default(),
            reconnect: ReconnectConfig::default(),
            janitor: JanitorConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            board: BoardConfig::default(),
            client_build: ClientBuildConfig::default(),
            drain: DrainConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            health: HealthConfig::default(),
        }
    }
}
