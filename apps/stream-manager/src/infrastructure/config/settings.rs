//! Manager Configuration Settings
//!
//! Configuration types for the stream manager, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::{BackoffConfig, ManagerSettings};
use crate::infrastructure::backend::HttpBackendConfig;

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    /// Base URL of the stream backend.
    pub url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Interval of the status poll feeding the manager.
    pub status_poll_interval: Duration,
}

impl BackendSettings {
    /// Settings with default timeouts for the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: Duration::from_secs(10),
            status_poll_interval: Duration::from_secs(5),
        }
    }

    /// HTTP adapter configuration.
    #[must_use]
    pub fn http(&self) -> HttpBackendConfig {
        HttpBackendConfig {
            base_url: self.url.clone(),
            timeout: self.request_timeout,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete manager configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Backend connection settings.
    pub backend: BackendSettings,
    /// Location of the persisted state file.
    pub state_path: PathBuf,
    /// Server port settings.
    pub server: ServerSettings,
    /// Automatic reconnect backoff.
    pub reconnect: BackoffConfig,
    /// Period of the reconcile loop (`None` = disabled).
    pub reconcile_interval: Option<Duration>,
}

/// Default location of the persisted state file.
pub const DEFAULT_STATE_PATH: &str = "stream-manager-state.json";

impl ManagerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `STREAM_BACKEND_URL` is missing or empty, or if
    /// the reconnect multiplier is not a finite number of at least 1.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `STREAM_BACKEND_URL` is missing or empty, or if
    /// the reconnect multiplier is not a finite number of at least 1.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup("STREAM_BACKEND_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("STREAM_BACKEND_URL".to_string()))?;

        if url.trim().is_empty() {
            return Err(ConfigError::EmptyValue("STREAM_BACKEND_URL".to_string()));
        }

        let env = EnvReader { lookup: &lookup };
        let backend_defaults = BackendSettings::new(url.trim());

        let backend = BackendSettings {
            request_timeout: env.duration_millis(
                "STREAM_MANAGER_REQUEST_TIMEOUT_MS",
                backend_defaults.request_timeout,
            ),
            status_poll_interval: env.duration_millis(
                "STREAM_MANAGER_STATUS_POLL_MS",
                backend_defaults.status_poll_interval,
            ),
            ..backend_defaults
        };

        let state_path = lookup("STREAM_MANAGER_STATE_PATH")
            .filter(|p| !p.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_STATE_PATH), PathBuf::from);

        let server = ServerSettings {
            health_port: env.parse(
                "STREAM_MANAGER_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let reconnect_defaults = BackoffConfig::default();
        let reconnect = BackoffConfig {
            initial_delay: env.duration_millis(
                "STREAM_MANAGER_RECONNECT_DELAY_INITIAL_MS",
                reconnect_defaults.initial_delay,
            ),
            max_delay: env.duration_secs(
                "STREAM_MANAGER_RECONNECT_DELAY_MAX_SECS",
                reconnect_defaults.max_delay,
            ),
            multiplier: env.multiplier(
                "STREAM_MANAGER_RECONNECT_DELAY_MULTIPLIER",
                reconnect_defaults.multiplier,
            )?,
            jitter_factor: reconnect_defaults.jitter_factor,
            max_attempts: env.parse(
                "STREAM_MANAGER_MAX_RECONNECT_ATTEMPTS",
                reconnect_defaults.max_attempts,
            ),
        };

        let reconcile_secs: u64 = env.parse("STREAM_MANAGER_RECONCILE_INTERVAL_SECS", 0);
        let reconcile_interval = (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs));

        Ok(Self {
            backend,
            state_path,
            server,
            reconnect,
            reconcile_interval,
        })
    }

    /// Settings handed to the manager service.
    #[must_use]
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            reconnect: self.reconnect.clone(),
            reconcile_interval: self.reconcile_interval,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable holds a value outside its allowed range.
    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// Raw value as read.
        value: String,
        /// What the value must satisfy.
        reason: &'static str,
    },
}

/// Typed reads with defaults. Unparseable values fall back to the default,
/// except where a bad value would break the runtime.
struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.lookup)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn multiplier(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        let Some(raw) = (self.lookup)(key) else {
            return Ok(default);
        };

        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 1.0 => Ok(value),
            _ => Err(ConfigError::InvalidValue {
                name: key.to_string(),
                value: raw,
                reason: "must be a finite number >= 1.0",
            }),
        }
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        (self.lookup)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        (self.lookup)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&ms| ms > 0)
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use test_case::test_case;

    fn config_from(vars: &[(&str, &str)]) -> Result<ManagerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ManagerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn backend_url_is_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "STREAM_BACKEND_URL"));

        let err = config_from(&[("STREAM_BACKEND_URL", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("STREAM_BACKEND_URL", "http://localhost:1420")]).unwrap();

        assert_eq!(config.backend.url, "http://localhost:1420");
        assert_eq!(config.backend.request_timeout, Duration::from_secs(10));
        assert_eq!(config.backend.status_poll_interval, Duration::from_secs(5));
        assert_eq!(config.state_path, PathBuf::from(DEFAULT_STATE_PATH));
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.reconnect, BackoffConfig::default());
        assert_eq!(config.reconcile_interval, None);
    }

    #[test]
    fn overrides_apply() {
        let config = config_from(&[
            ("STREAM_BACKEND_URL", "http://backend:9000"),
            ("STREAM_MANAGER_STATE_PATH", "/var/lib/stream/state.json"),
            ("STREAM_MANAGER_HEALTH_PORT", "9100"),
            ("STREAM_MANAGER_REQUEST_TIMEOUT_MS", "2500"),
            ("STREAM_MANAGER_STATUS_POLL_MS", "750"),
            ("STREAM_MANAGER_RECONCILE_INTERVAL_SECS", "60"),
            ("STREAM_MANAGER_RECONNECT_DELAY_INITIAL_MS", "200"),
            ("STREAM_MANAGER_MAX_RECONNECT_ATTEMPTS", "5"),
        ])
        .unwrap();

        assert_eq!(config.state_path, PathBuf::from("/var/lib/stream/state.json"));
        assert_eq!(config.server.health_port, 9100);
        assert_eq!(config.backend.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.backend.status_poll_interval, Duration::from_millis(750));
        assert_eq!(config.reconcile_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(200));
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("STREAM_BACKEND_URL", "http://localhost:1420"),
            ("STREAM_MANAGER_HEALTH_PORT", "not-a-port"),
            ("STREAM_MANAGER_STATUS_POLL_MS", "0"),
        ])
        .unwrap();

        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.backend.status_poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn manager_settings_carry_reconnect_and_reconcile() {
        let config = config_from(&[
            ("STREAM_BACKEND_URL", "http://localhost:1420"),
            ("STREAM_MANAGER_RECONCILE_INTERVAL_SECS", "30"),
        ])
        .unwrap();

        let settings = config.manager_settings();
        assert_eq!(settings.reconcile_interval, Some(Duration::from_secs(30)));
        assert_eq!(settings.reconnect, config.reconnect);
        assert_eq!(config.backend.http().base_url, "http://localhost:1420");
    }

    #[test]
    fn multiplier_override_applies() {
        let config = config_from(&[
            ("STREAM_BACKEND_URL", "http://localhost:1420"),
            ("STREAM_MANAGER_RECONNECT_DELAY_MULTIPLIER", "1.5"),
        ])
        .unwrap();

        assert!((config.reconnect.multiplier - 1.5).abs() < f64::EPSILON);
    }

    #[test_case("inf" ; "infinite")]
    #[test_case("NaN" ; "not a number")]
    #[test_case("1e400" ; "overflows to infinity")]
    #[test_case("0.5" ; "shrinking")]
    #[test_case("fast" ; "unparseable")]
    fn bad_multiplier_is_rejected(raw: &str) {
        let err = config_from(&[
            ("STREAM_BACKEND_URL", "http://localhost:1420"),
            ("STREAM_MANAGER_RECONNECT_DELAY_MULTIPLIER", raw),
        ])
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref name, ref value, .. }
                if name == "STREAM_MANAGER_RECONNECT_DELAY_MULTIPLIER" && value == raw
        ));
    }
}
