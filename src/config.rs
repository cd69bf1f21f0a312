use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::dashboard::DEFAULT_MAX_CONCURRENT_READS;
use crate::leaderboard::DEFAULT_LIMIT;

/// Top-level configuration, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub dashboard: DashboardConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let url = env::var("DATABASE_URL").ok().filter(|value| !value.trim().is_empty());
        let max_connections = parse_positive("DATABASE_MAX_CONNECTIONS", 5)? as u32;

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let max_concurrent_reads =
            parse_positive("KUDOS_MAX_CONCURRENT_READS", DEFAULT_MAX_CONCURRENT_READS)?;
        let leaderboard_limit = parse_positive("KUDOS_LEADERBOARD_LIMIT", DEFAULT_LIMIT)?;
        let cache_ttl = parse_seconds("KUDOS_CACHE_TTL_SECS", DEFAULT_TTL)?;
        let cache_max_entries = parse_positive("KUDOS_CACHE_MAX_ENTRIES", DEFAULT_MAX_ENTRIES)?;

        Ok(Self {
            database: DatabaseConfig {
                url,
                max_connections,
            },
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            dashboard: DashboardConfig {
                max_concurrent_reads,
                leaderboard_limit,
                cache_ttl,
                cache_max_entries,
            },
        })
    }
}

fn parse_positive(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(value) if value > 0 && value <= u32::MAX as usize => Ok(value),
            _ => Err(ConfigError::NotPositive { name, value: raw }),
        },
    }
}

/// `0` is accepted and means "off".
fn parse_seconds(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidSeconds { name, value: raw }),
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn url(&self) -> Result<&str, ConfigError> {
        self.url.as_deref().ok_or(ConfigError::MissingDatabaseUrl)
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub max_concurrent_reads: usize,
    pub leaderboard_limit: usize,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set to a Postgres instance holding the kudos tables")]
    MissingDatabaseUrl,
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost { source: std::net::AddrParseError },
    #[error("{name} must be a positive integer (got '{value}')")]
    NotPositive { name: &'static str, value: String },
    #[error("{name} must be a whole number of seconds (got '{value}')")]
    InvalidSeconds { name: &'static str, value: String },
}
