//! Plain config structs. Every runtime tunable is a field somewhere
//! below; nothing here performs I/O.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub downloads: DownloadsConfig,
    pub search: SearchConfig,
    pub health: HealthConfig,
    pub events: EventsConfig,
    pub prowlarr: Option<ProviderConfig>,
    pub jackett: Option<ProviderConfig>,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the single embedded SQLite database file, the source of
    /// truth for every component.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("foliofox.db"),
        }
    }
}

/// `downloads.*` tunables consumed by the Download Scheduler.
#[derive(Debug, Clone)]
pub struct DownloadsConfig {
    pub max_concurrent: usize,
    pub retry_count: u32,
    pub timeout: Duration,
    pub user_agent: String,
    pub download_path: PathBuf,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            retry_count: 3,
            timeout: Duration::from_secs(30),
            user_agent: "FolioFox/0.1".to_string(),
            download_path: PathBuf::from("./downloads"),
            base_retry_delay: Duration::from_secs(5),
            max_retry_delay: Duration::from_secs(300),
        }
    }
}

/// `search.*` tunables consumed by the Search Engine.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub cache_ttl: Duration,
    pub max_results: usize,
    pub timeout_seconds: Duration,
    pub max_concurrent: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            max_results: 100,
            timeout_seconds: Duration::from_secs(30),
            max_concurrent: 8,
        }
    }
}

/// Health Monitor cadence.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub check_interval: Duration,
    pub probe_timeout: Duration,
    pub sample_window: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(10),
            sample_window: 10,
        }
    }
}

/// Event Bus heartbeat/buffer tuning.
#[derive(Debug, Clone)]
pub struct EventsConfig {
    pub client_buffer_size: usize,
    pub ping_period: Duration,
    pub pong_wait: Duration,
    pub idle_sweep_interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            client_buffer_size: 256,
            ping_period: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            idle_sweep_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// `prowlarr.*` / `jackett.*` — optional upstream aggregators seeded as
/// indexer rows on first boot.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
}

/// `auth.*` — consumed only by the authentication collaborator; the
/// core never reads these fields, but they are part of the single
/// structured config object every tunable must live in.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub token_duration: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            downloads: DownloadsConfig::default(),
            search: SearchConfig::default(),
            health: HealthConfig::default(),
            events: EventsConfig::default(),
            prowlarr: None,
            jackett: None,
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
