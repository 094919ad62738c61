//! Runtime configuration for the REST client and the WebSocket monitor.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then the
//! `HELIX_BASE_URL` / `HELIX_WS_URL` environment variables. The CLI applies its
//! own flags on top of the result.
//!
//! ```toml
//! base_url = "https://helix.example"
//! ws_url = "wss://helix.example/ws"
//! request_timeout_ms = 10000
//!
//! [reconnect]
//! initial_delay_ms = 1000
//! max_delay_ms = 60000
//! max_attempts = 10
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HelixError, Result};

/// Production REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://helix-unified-production.up.railway.app";
/// Production WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://helix-unified-production.up.railway.app/ws";

pub const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_millis(60_000);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

pub const ENV_BASE_URL: &str = "HELIX_BASE_URL";
pub const ENV_WS_URL: &str = "HELIX_WS_URL";

/// Reconnection bounds for [`HelixMonitor`](crate::monitor::HelixMonitor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect, and the value restored on every
    /// successful open.
    pub initial_delay: Duration,
    /// Upper bound for the doubled delay.
    pub max_delay: Duration,
    /// Consecutive closes without a successful open before the monitor gives up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_RETRY_DELAY,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// Reject bounds the lifecycle manager cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay.is_zero() {
            return Err(HelixError::Config("initial retry delay must be > 0".into()));
        }
        if self.max_delay < self.initial_delay {
            return Err(HelixError::Config(format!(
                "max retry delay ({} ms) is below the initial delay ({} ms)",
                self.max_delay.as_millis(),
                self.initial_delay.as_millis()
            )));
        }
        if self.max_attempts == 0 {
            return Err(HelixError::Config("max reconnect attempts must be > 0".into()));
        }
        Ok(())
    }
}

/// Full client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelixConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub base_url: String,
    /// WebSocket endpoint streamed by the monitor.
    pub ws_url: String,
    /// TCP connection timeout for REST calls.
    pub connect_timeout: Duration,
    /// Per-request timeout for REST calls.
    pub request_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for HelixConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// On-disk shape. Every field is optional; absent fields keep the default.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    ws_url: Option<String>,
    connect_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    reconnect: ReconnectFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ReconnectFile {
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
}

impl HelixConfig {
    /// Load defaults, then `path` if given, then environment overrides.
    ///
    /// # Errors
    /// Returns [`HelixError::Io`] when the file cannot be read and
    /// [`HelixError::Config`] when it cannot be parsed or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with environment lookups going through `lookup`.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        let mut config = Self::default();

        if let Some(url) = file.base_url {
            config.base_url = url;
        }
        if let Some(url) = file.ws_url {
            config.ws_url = url;
        }
        if let Some(ms) = file.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.reconnect.initial_delay_ms {
            config.reconnect.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.reconnect.max_delay_ms {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(n) = file.reconnect.max_attempts {
            config.reconnect.max_attempts = n;
        }

        config.base_url = trim_trailing_slash(&config.base_url);
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = trim_trailing_slash(&url);
        }
        if let Some(url) = lookup(ENV_WS_URL).filter(|v| !v.trim().is_empty()) {
            self.ws_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(HelixError::Config("base_url must not be empty".into()));
        }
        if self.ws_url.trim().is_empty() {
            return Err(HelixError::Config("ws_url must not be empty".into()));
        }
        self.reconnect.validate()
    }
}

pub(crate) fn trim_trailing_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_production_endpoints() {
        let cfg = HelixConfig::default();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.ws_url, DEFAULT_WS_URL);
        assert_eq!(cfg.reconnect.initial_delay, Duration::from_millis(1_000));
        assert_eq!(cfg.reconnect.max_delay, Duration::from_millis(60_000));
        assert_eq!(cfg.reconnect.max_attempts, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn toml_overrides_only_present_fields() {
        let cfg = HelixConfig::from_toml_str(
            r#"
            base_url = "http://localhost:8000/"
            [reconnect]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.base_url, "http://localhost:8000");
        assert_eq!(cfg.ws_url, DEFAULT_WS_URL);
        assert_eq!(cfg.reconnect.max_attempts, 3);
        assert_eq!(cfg.reconnect.initial_delay, DEFAULT_INITIAL_RETRY_DELAY);
    }

    #[test]
    fn toml_durations_are_milliseconds() {
        let cfg = HelixConfig::from_toml_str(
            "request_timeout_ms = 2500\n[reconnect]\ninitial_delay_ms = 250\nmax_delay_ms = 4000\n",
        )
        .unwrap();
        assert_eq!(cfg.request_timeout, Duration::from_millis(2_500));
        assert_eq!(cfg.reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(cfg.reconnect.max_delay, Duration::from_millis(4_000));
    }

    #[test]
    fn toml_unknown_field_is_rejected() {
        let err = HelixConfig::from_toml_str("retry = 5").unwrap_err();
        assert!(matches!(err, HelixError::Config(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = HelixConfig::default();
        cfg.apply_env(|key| match key {
            ENV_BASE_URL => Some("http://127.0.0.1:9000/".to_string()),
            ENV_WS_URL => Some("ws://127.0.0.1:9000/ws".to_string()),
            _ => None,
        });
        assert_eq!(cfg.base_url, "http://127.0.0.1:9000");
        assert_eq!(cfg.ws_url, "ws://127.0.0.1:9000/ws");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut cfg = HelixConfig::default();
        cfg.apply_env(|_| Some("   ".to_string()));
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn validate_rejects_max_below_initial() {
        let rc = ReconnectConfig {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(1),
            max_attempts: 10,
        };
        assert!(matches!(rc.validate(), Err(HelixError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_attempts_and_zero_delay() {
        let mut rc = ReconnectConfig::default();
        rc.max_attempts = 0;
        assert!(rc.validate().is_err());

        let mut rc = ReconnectConfig::default();
        rc.initial_delay = Duration::ZERO;
        assert!(rc.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_urls() {
        let cfg = HelixConfig { base_url: String::new(), ..HelixConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ws_url = \"ws://localhost:1234/ws\"").unwrap();
        let cfg = HelixConfig::load_with_env(Some(file.path()), |_| None).unwrap();
        assert_eq!(cfg.ws_url, "ws://localhost:1234/ws");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn load_applies_env_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ws_url = \"ws://localhost:1234/ws\"").unwrap();
        let cfg = HelixConfig::load_with_env(Some(file.path()), |key| {
            (key == ENV_WS_URL).then(|| "ws://env.test/ws".to_string())
        })
        .unwrap();
        assert_eq!(cfg.ws_url, "ws://env.test/ws");
    }

    #[test]
    fn load_with_env_validates_result() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reconnect]\nmax_attempts = 0").unwrap();
        let err = HelixConfig::load_with_env(Some(file.path()), |_| None).unwrap_err();
        assert!(matches!(err, HelixError::Config(_)));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = HelixConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, HelixError::Io(_)));
    }
}
