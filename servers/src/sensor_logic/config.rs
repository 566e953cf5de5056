use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lib_common::StateOptions;
use lib_common::connections::EventLogOptions;
use lib_common::ingestors::StompConfig;

const DEFAULT_CONFIG_FILE: &str = "server_sensor.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Sensor telemetry relay: STOMP upstream to REST and WebSocket dashboards", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "PORT", help = "Port to listen on for HTTP and WebSocket clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "SENSOR_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "SENSOR_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "SENSOR_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "UPSTREAM_URL", help = "WebSocket URL of the upstream STOMP broker.")]
    pub upstream_url: Option<String>,

    #[clap(long, env = "UPSTREAM_TOPIC", help = "STOMP destination carrying device envelopes.")]
    pub upstream_topic: Option<String>,

    #[clap(long, env = "UPSTREAM_LOGIN", help = "Optional STOMP login.")]
    pub upstream_login: Option<String>,

    #[clap(long, env = "UPSTREAM_PASSCODE", help = "Optional STOMP passcode.")]
    pub upstream_passcode: Option<String>,

    #[clap(long, env = "UPSTREAM_RECONNECT_DELAY_MS", help = "Fixed delay in milliseconds between upstream reconnect attempts.")]
    pub reconnect_delay_ms: Option<u64>,

    #[clap(long, env = "DATABASE_URL", help = "PostgreSQL connection URL for the event log. Persistence is disabled when unset.")]
    pub database_url: Option<String>,

    #[clap(long, env = "DB_ACCEPT_INVALID_CERTS", help = "Use TLS for the database and accept self-signed certificates.")]
    pub db_accept_invalid_certs: Option<bool>,

    #[clap(long, env = "DB_POOL_SIZE", help = "Maximum number of pooled database connections.")]
    pub db_pool_size: Option<usize>,

    #[clap(long, env = "PERSIST_TIMEOUT_MS", help = "Upper bound in milliseconds for one event log insert.")]
    pub persist_timeout_ms: Option<u64>,

    #[clap(long, env = "REQUEST_TIMEOUT_MS", help = "Upper bound in milliseconds a request waits for the sensor state.")]
    pub request_timeout_ms: Option<u64>,
}

/// Fully resolved configuration, every value concrete except the optional ones.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub upstream: StompConfig,
    pub database_url: Option<String>,
    pub event_log: EventLogOptions,
    pub state: StateOptions,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            upstream_url: other.upstream_url.or(self.upstream_url),
            upstream_topic: other.upstream_topic.or(self.upstream_topic),
            upstream_login: other.upstream_login.or(self.upstream_login),
            upstream_passcode: other.upstream_passcode.or(self.upstream_passcode),
            reconnect_delay_ms: other.reconnect_delay_ms.or(self.reconnect_delay_ms),
            database_url: other.database_url.or(self.database_url),
            db_accept_invalid_certs: other.db_accept_invalid_certs.or(self.db_accept_invalid_certs),
            db_pool_size: other.db_pool_size.or(self.db_pool_size),
            persist_timeout_ms: other.persist_timeout_ms.or(self.persist_timeout_ms),
            request_timeout_ms: other.request_timeout_ms.or(self.request_timeout_ms),
        }
    }

    fn defaults() -> Config {
        Config {
            port: Some(3000),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            upstream_url: Some("ws://127.0.0.1:8080/websocket".to_string()),
            upstream_topic: Some("/topic/hub900".to_string()),
            reconnect_delay_ms: Some(5000),
            db_accept_invalid_certs: Some(false),
            db_pool_size: Some(4),
            persist_timeout_ms: Some(3000),
            request_timeout_ms: Some(5000),
            ..Default::default()
        }
    }

    /// Turns a merged config into concrete settings, falling back to the defaults.
    pub fn resolve(self) -> Settings {
        let c = Config::defaults().merge(self);
        let persist_timeout = Duration::from_millis(c.persist_timeout_ms.unwrap_or(3000));

        Settings {
            port: c.port.unwrap_or(3000),
            log_dir: c.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: c.log_level.unwrap_or_else(|| "info".to_string()),
            upstream: StompConfig {
                url: c.upstream_url.unwrap_or_default(),
                topic: c.upstream_topic.unwrap_or_default(),
                login: c.upstream_login,
                passcode: c.upstream_passcode,
                reconnect_delay: Duration::from_millis(c.reconnect_delay_ms.unwrap_or(5000)),
                ..StompConfig::default()
            },
            database_url: c.database_url.filter(|url| !url.trim().is_empty()),
            event_log: EventLogOptions {
                max_connections: c.db_pool_size.unwrap_or(4).max(1),
                accept_invalid_certs: c.db_accept_invalid_certs.unwrap_or(false),
                acquire_timeout: persist_timeout,
            },
            state: StateOptions {
                lock_timeout: Duration::from_millis(c.request_timeout_ms.unwrap_or(5000)),
                persist_timeout,
            },
        }
    }
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers defaults < config file < environment/CLI and resolves the result.
pub fn load_config() -> Settings {
    // clap::Parser handles both env vars and CLI args
    let cli_args = Config::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli_args).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve() {
        let settings = Config::default().resolve();
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.upstream.topic, "/topic/hub900");
        assert_eq!(settings.upstream.reconnect_delay, Duration::from_millis(5000));
        assert_eq!(settings.database_url, None);
        assert!(!settings.event_log.accept_invalid_certs);
        assert_eq!(settings.state.persist_timeout, Duration::from_millis(3000));
    }

    #[test]
    fn test_later_layer_wins() {
        let file = Config {
            port: Some(4000),
            upstream_topic: Some("/topic/file".into()),
            ..Default::default()
        };
        let cli = Config {
            port: Some(5000),
            database_url: Some("postgres://relay@localhost/sensors".into()),
            ..Default::default()
        };
        let settings = Config::defaults().merge(file).merge(cli).resolve();
        assert_eq!(settings.port, 5000);
        assert_eq!(settings.upstream.topic, "/topic/file");
        assert_eq!(settings.database_url.as_deref(), Some("postgres://relay@localhost/sensors"));
    }

    #[test]
    fn test_blank_database_url_disables_persistence() {
        let settings = Config {
            database_url: Some("  ".into()),
            ..Default::default()
        }
        .resolve();
        assert_eq!(settings.database_url, None);
    }

    #[test]
    fn test_config_file_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_sensor.conf");
        fs::write(
            &path,
            r#"{"port":3100,"upstreamUrl":"ws://broker:15674/ws","reconnectDelayMs":250,"dbAcceptInvalidCerts":true}"#,
        )
        .unwrap();

        let settings = read_config_file(&path).unwrap().resolve();
        assert_eq!(settings.port, 3100);
        assert_eq!(settings.upstream.url, "ws://broker:15674/ws");
        assert_eq!(settings.upstream.reconnect_delay, Duration::from_millis(250));
        assert!(settings.event_log.accept_invalid_certs);
    }

    #[test]
    fn test_unparseable_config_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.conf");
        fs::write(&path, "{ port: ").unwrap();
        assert!(read_config_file(&path).is_none());
        assert!(read_config_file(&dir.path().join("missing.conf")).is_none());
    }
}
