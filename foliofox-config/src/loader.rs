//! Layered config loading: defaults → optional `foliofox.toml` →
//! `FOLIOFOX__`-prefixed environment variables. Fails fast on malformed
//! values, otherwise falls back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::models::{
    AuthConfig, Config, DatabaseConfig, DownloadsConfig, EventsConfig, HealthConfig,
    LoggingConfig, ProviderConfig, SearchConfig, ServerConfig,
};

const ENV_PREFIX: &str = "FOLIOFOX";
const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["foliofox.toml", "config/foliofox.toml"];

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read/parse configuration: {0}")]
    Source(#[from] config::ConfigError),
    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<Config, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).is_ok(),
            None => dotenvy::dotenv().is_ok(),
        };
        if env_file_loaded {
            tracing::debug!("loaded .env file");
        }

        let mut builder = config::Config::builder();

        if let Some(path) = self.resolve_config_path() {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let raw: RawConfig = match builder.build() {
            Ok(merged) => merged.try_deserialize().unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "configuration source failed to load, using defaults");
                RawConfig::default()
            }
        };

        raw.into_config()
    }

    fn resolve_config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.options.config_path {
            return Some(path.clone());
        }
        DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .map(Path::to_path_buf)
    }
}

/// Serde mirror of [`Config`], one nested struct per section so that
/// both the TOML file source (`[downloads]` tables) and the
/// `__`-separated environment source (`FOLIOFOX__DOWNLOADS__RETRY_COUNT`)
/// populate the same tree instead of a flat key a nested source can
/// never address. Durations/paths are plain scalars (seconds as `u64`,
/// paths as `String`) so the `config` crate can deserialize them
/// directly; converted to the typed [`Config`] in
/// [`RawConfig::into_config`].
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    server: RawServerConfig,
    database: RawDatabaseConfig,
    downloads: RawDownloadsConfig,
    search: RawSearchConfig,
    health: RawHealthConfig,
    events: RawEventsConfig,
    prowlarr: Option<RawProviderConfig>,
    jackett: Option<RawProviderConfig>,
    auth: RawAuthConfig,
    logging: RawLoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawServerConfig {
    host: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawDatabaseConfig {
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawDownloadsConfig {
    max_concurrent: usize,
    retry_count: u32,
    timeout_secs: u64,
    user_agent: String,
    download_path: String,
    base_retry_delay_secs: u64,
    max_retry_delay_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSearchConfig {
    cache_ttl_secs: u64,
    max_results: usize,
    timeout_secs: u64,
    max_concurrent: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawHealthConfig {
    check_interval_secs: u64,
    probe_timeout_secs: u64,
    sample_window: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawEventsConfig {
    client_buffer_size: usize,
    ping_period_secs: u64,
    pong_wait_secs: u64,
    idle_sweep_interval_secs: u64,
    idle_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawProviderConfig {
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    rate_limit_requests: u32,
    rate_limit_window_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawAuthConfig {
    jwt_secret: Option<String>,
    token_duration_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawLoggingConfig {
    level: String,
    json: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        let d = Config::default();
        Self {
            server: RawServerConfig {
                host: d.server.host,
                port: d.server.port,
            },
            database: RawDatabaseConfig {
                path: d.database.path.display().to_string(),
            },
            downloads: RawDownloadsConfig {
                max_concurrent: d.downloads.max_concurrent,
                retry_count: d.downloads.retry_count,
                timeout_secs: d.downloads.timeout.as_secs(),
                user_agent: d.downloads.user_agent,
                download_path: d.downloads.download_path.display().to_string(),
                base_retry_delay_secs: d.downloads.base_retry_delay.as_secs(),
                max_retry_delay_secs: d.downloads.max_retry_delay.as_secs(),
            },
            search: RawSearchConfig {
                cache_ttl_secs: d.search.cache_ttl.as_secs(),
                max_results: d.search.max_results,
                timeout_secs: d.search.timeout_seconds.as_secs(),
                max_concurrent: d.search.max_concurrent,
            },
            health: RawHealthConfig {
                check_interval_secs: d.health.check_interval.as_secs(),
                probe_timeout_secs: d.health.probe_timeout.as_secs(),
                sample_window: d.health.sample_window,
            },
            events: RawEventsConfig {
                client_buffer_size: d.events.client_buffer_size,
                ping_period_secs: d.events.ping_period.as_secs(),
                pong_wait_secs: d.events.pong_wait.as_secs(),
                idle_sweep_interval_secs: d.events.idle_sweep_interval.as_secs(),
                idle_timeout_secs: d.events.idle_timeout.as_secs(),
            },
            prowlarr: None,
            jackett: None,
            auth: RawAuthConfig {
                jwt_secret: d.auth.jwt_secret,
                token_duration_secs: 3600,
            },
            logging: RawLoggingConfig {
                level: d.logging.level,
                json: d.logging.json,
            },
        }
    }
}

impl Default for RawProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout_secs: 15,
            rate_limit_requests: 60,
            rate_limit_window_secs: 60,
        }
    }
}

impl RawConfig {
    fn into_config(self) -> Result<Config, ConfigLoadError> {
        if self.server.port == 0 {
            return Err(ConfigLoadError::Invalid {
                field: "server.port",
                reason: "must be nonzero".to_string(),
            });
        }
        if self.downloads.max_concurrent == 0 {
            return Err(ConfigLoadError::Invalid {
                field: "downloads.max_concurrent",
                reason: "must be at least 1".to_string(),
            });
        }

        let prowlarr = self.prowlarr.map(|p| ProviderConfig {
            base_url: p.base_url,
            api_key: p.api_key,
            timeout: Duration::from_secs(p.timeout_secs),
            rate_limit_requests: p.rate_limit_requests,
            rate_limit_window: Duration::from_secs(p.rate_limit_window_secs),
        });

        let jackett = self.jackett.map(|p| ProviderConfig {
            base_url: p.base_url,
            api_key: p.api_key,
            timeout: Duration::from_secs(p.timeout_secs),
            rate_limit_requests: p.rate_limit_requests,
            rate_limit_window: Duration::from_secs(p.rate_limit_window_secs),
        });

        Ok(Config {
            server: ServerConfig {
                host: self.server.host,
                port: self.server.port,
            },
            database: DatabaseConfig {
                path: PathBuf::from(self.database.path),
            },
            downloads: DownloadsConfig {
                max_concurrent: self.downloads.max_concurrent,
                retry_count: self.downloads.retry_count,
                timeout: Duration::from_secs(self.downloads.timeout_secs),
                user_agent: self.downloads.user_agent,
                download_path: PathBuf::from(self.downloads.download_path),
                base_retry_delay: Duration::from_secs(self.downloads.base_retry_delay_secs),
                max_retry_delay: Duration::from_secs(self.downloads.max_retry_delay_secs),
            },
            search: SearchConfig {
                cache_ttl: Duration::from_secs(self.search.cache_ttl_secs),
                max_results: self.search.max_results,
                timeout_seconds: Duration::from_secs(self.search.timeout_secs),
                max_concurrent: self.search.max_concurrent,
            },
            health: HealthConfig {
                check_interval: Duration::from_secs(self.health.check_interval_secs),
                probe_timeout: Duration::from_secs(self.health.probe_timeout_secs),
                sample_window: self.health.sample_window,
            },
            events: EventsConfig {
                client_buffer_size: self.events.client_buffer_size,
                ping_period: Duration::from_secs(self.events.ping_period_secs),
                pong_wait: Duration::from_secs(self.events.pong_wait_secs),
                idle_sweep_interval: Duration::from_secs(self.events.idle_sweep_interval_secs),
                idle_timeout: Duration::from_secs(self.events.idle_timeout_secs),
            },
            prowlarr,
            jackett,
            auth: AuthConfig {
                jwt_secret: self.auth.jwt_secret,
                token_duration: Duration::from_secs(self.auth.token_duration_secs),
            },
            logging: LoggingConfig {
                level: self.logging.level,
                json: self.logging.json,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_any_source() {
        let cfg = RawConfig::default().into_config().unwrap();
        assert_eq!(cfg.downloads.max_concurrent, 3);
        assert_eq!(cfg.search.max_results, 100);
    }

    #[test]
    fn rejects_zero_port() {
        let mut raw = RawConfig::default();
        raw.server.port = 0;
        assert!(raw.into_config().is_err());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut raw = RawConfig::default();
        raw.downloads.max_concurrent = 0;
        assert!(raw.into_config().is_err());
    }

    #[test]
    fn nested_toml_table_populates_downloads_section() {
        let source = config::File::from_str("[downloads]\nretry_count = 7\n", config::FileFormat::Toml);
        let merged = config::Config::builder().add_source(source).build().expect("build config");
        let raw: RawConfig = merged.try_deserialize().expect("nested deserialize");
        assert_eq!(raw.downloads.retry_count, 7);
        // Sibling fields left out of the override still fall back to defaults.
        assert_eq!(raw.downloads.max_concurrent, RawConfig::default().downloads.max_concurrent);
    }
}
