use crate::error::{RelayError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Serving endpoint configuration
    pub serve: ServeConfig,
    /// Raw source list configuration
    pub source: SourceConfig,
    /// Whitelist file locations
    pub whitelist: WhitelistConfig,
    /// Probe pipeline configuration
    pub probe: ProbeSettings,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Port for the serving endpoint (default: 8080)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Optional HTTP mirror the raw list is pulled from
    pub mirror_url: Option<String>,
    /// Local path the raw list is read from (and the mirror written to)
    pub local_path: PathBuf,
    /// Seconds between mirror polls
    pub poll_interval: u64,
}

#[derive(Debug, Clone)]
pub struct WhitelistConfig {
    /// Path to the address whitelist (one network-prefix-eligible address per line)
    pub address_path: PathBuf,
    /// Path to the SNI whitelist (one hostname per line)
    pub sni_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// External proxy engine executable
    pub engine_binary: String,
    /// Externally reachable URL requested through each tunnel
    pub probe_url: String,
    /// First local port handed to the worker pool; worker i gets base_port + i
    pub base_port: u16,
    /// Lower bound on worker count regardless of batch size
    pub min_workers: usize,
    /// Seconds to wait for the spawned engine's inbound to accept
    pub port_wait_timeout: u64,
    /// Seconds allowed for the raw TLS reachability check
    pub tls_timeout: u64,
    /// Seconds allowed for the HTTP probe through the tunnel
    pub request_timeout: u64,
    /// Seconds between availability refresh cycles
    pub refresh_interval: u64,
    /// Stability required for publication
    pub accept_threshold: f64,
    /// Stability required for the "stable" annotation
    pub stable_threshold: f64,
}

impl ProbeSettings {
    pub fn port_wait(&self) -> Duration {
        Duration::from_secs(self.port_wait_timeout.max(1))
    }

    pub fn tls_wait(&self) -> Duration {
        Duration::from_secs(self.tls_timeout.max(1))
    }

    pub fn request_wait(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            serve: ServeConfig {
                port: get_env_or("SERVE_PORT", "8080").parse().map_err(|_| {
                    RelayError::InvalidConfig("SERVE_PORT must be a valid port number".into())
                })?,
                host: get_env_or("SERVE_HOST", "0.0.0.0"),
            },
            source: SourceConfig {
                mirror_url: parse_mirror_url()?,
                local_path: PathBuf::from(get_env_or("SOURCE_PATH", "data/endpoints.txt")),
                poll_interval: get_env_or("SOURCE_POLL_INTERVAL", "300")
                    .parse()
                    .unwrap_or(300),
            },
            whitelist: WhitelistConfig {
                address_path: PathBuf::from(get_env_or(
                    "ADDRESS_WHITELIST_PATH",
                    "config/cidrwhitelist.txt",
                )),
                sni_path: PathBuf::from(get_env_or("SNI_WHITELIST_PATH", "config/sniwhitelist.txt")),
            },
            probe: ProbeSettings {
                engine_binary: get_env_or("ENGINE_BINARY", "sing-box"),
                probe_url: get_env_or("PROBE_URL", "http://cp.cloudflare.com/"),
                base_port: get_env_or("PROBE_BASE_PORT", "2081").parse().map_err(|_| {
                    RelayError::InvalidConfig("PROBE_BASE_PORT must be a valid port number".into())
                })?,
                min_workers: get_env_or("PROBE_MIN_WORKERS", "4").parse().unwrap_or(4),
                port_wait_timeout: get_env_or("PORT_WAIT_TIMEOUT", "5").parse().unwrap_or(5),
                tls_timeout: get_env_or("TLS_PROBE_TIMEOUT", "2").parse().unwrap_or(2),
                request_timeout: get_env_or("PROBE_REQUEST_TIMEOUT", "10")
                    .parse()
                    .unwrap_or(10),
                refresh_interval: get_env_or("REFRESH_INTERVAL", "5").parse().unwrap_or(5),
                accept_threshold: get_env_or("MIN_STABILITY_ACCEPT", "5.0")
                    .parse()
                    .unwrap_or(5.0),
                stable_threshold: get_env_or("MIN_STABILITY_STABLE", "50.0")
                    .parse()
                    .unwrap_or(50.0),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "json"),
            },
        })
    }

    /// Get the serving endpoint address
    pub fn serve_addr(&self) -> String {
        format!("{}:{}", self.serve.host, self.serve.port)
    }
}

fn parse_mirror_url() -> Result<Option<String>> {
    let raw = env::var("SOURCE_MIRROR_URL").unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let url = Url::parse(raw).map_err(|e| {
        RelayError::InvalidConfig(format!("SOURCE_MIRROR_URL must be a valid URL: {}", e))
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RelayError::InvalidConfig(format!(
                "SOURCE_MIRROR_URL has unsupported scheme: {}",
                other
            )))
        }
    }

    Ok(Some(url.to_string()))
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "SERVE_PORT",
        "SERVE_HOST",
        "SOURCE_MIRROR_URL",
        "SOURCE_PATH",
        "SOURCE_POLL_INTERVAL",
        "ADDRESS_WHITELIST_PATH",
        "SNI_WHITELIST_PATH",
        "ENGINE_BINARY",
        "PROBE_URL",
        "PROBE_BASE_PORT",
        "PROBE_MIN_WORKERS",
        "PORT_WAIT_TIMEOUT",
        "TLS_PROBE_TIMEOUT",
        "PROBE_REQUEST_TIMEOUT",
        "REFRESH_INTERVAL",
        "MIN_STABILITY_ACCEPT",
        "MIN_STABILITY_STABLE",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.serve.port, 8080);
        assert_eq!(config.serve.host, "0.0.0.0");
        assert!(config.source.mirror_url.is_none());
        assert_eq!(config.source.local_path, PathBuf::from("data/endpoints.txt"));

        assert_eq!(config.probe.engine_binary, "sing-box");
        assert_eq!(config.probe.probe_url, "http://cp.cloudflare.com/");
        assert_eq!(config.probe.base_port, 2081);
        assert_eq!(config.probe.min_workers, 4);
        assert_eq!(config.probe.accept_threshold, 5.0);
        assert_eq!(config.probe.stable_threshold, 50.0);
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("SERVE_PORT", "9090");
        env::set_var("SOURCE_MIRROR_URL", "https://mirror.example/bypass-all.txt");
        env::set_var("PROBE_BASE_PORT", "3000");
        env::set_var("PROBE_MIN_WORKERS", "8");
        env::set_var("MIN_STABILITY_ACCEPT", "10.0");

        let config = Config::from_env().unwrap();

        assert_eq!(config.serve.port, 9090);
        assert_eq!(
            config.source.mirror_url.as_deref(),
            Some("https://mirror.example/bypass-all.txt")
        );
        assert_eq!(config.probe.base_port, 3000);
        assert_eq!(config.probe.min_workers, 8);
        assert_eq!(config.probe.accept_threshold, 10.0);
    }

    #[test]
    fn test_config_from_env_invalid_port() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("SERVE_PORT", "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_mirror_url() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("SOURCE_MIRROR_URL", "not a url");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig(_)));

        env::set_var("SOURCE_MIRROR_URL", "ftp://mirror.example/list.txt");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig(_)));
    }

    #[test]
    fn test_probe_timeout_floors() {
        let settings = ProbeSettings {
            engine_binary: "sing-box".into(),
            probe_url: "http://cp.cloudflare.com/".into(),
            base_port: 2081,
            min_workers: 1,
            port_wait_timeout: 0,
            tls_timeout: 0,
            request_timeout: 0,
            refresh_interval: 5,
            accept_threshold: 5.0,
            stable_threshold: 50.0,
        };

        assert_eq!(settings.port_wait(), Duration::from_secs(1));
        assert_eq!(settings.tls_wait(), Duration::from_secs(1));
        assert_eq!(settings.request_wait(), Duration::from_secs(1));
    }

    #[test]
    fn test_serve_addr_formatting() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();
        assert_eq!(config.serve_addr(), "0.0.0.0:8080");
    }
}
