//! Configuration management for fortidash-throttle.
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! YAML file, and environment variables prefixed with `FORTIDASH_` using
//! `__` between nested keys:
//!
//! ```bash
//! export FORTIDASH_POLICIES__SEARCH__MAX_REQUESTS=50
//! export FORTIDASH_API__BASE_URL=http://inventory.internal:8800/api
//! export FORTIDASH_DEBUG_LOGGING=true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{LimiterError, Result};
use crate::ratelimit::PolicyConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FORTIDASH";

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Policies for the three limiter instances
    #[serde(default)]
    pub policies: PoliciesConfig,

    /// Inventory API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Raise the default log level to debug
    #[serde(default)]
    pub debug_logging: bool,
}

/// Policies for the general API, search and bulk limiters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoliciesConfig {
    #[serde(default = "default_api_policy")]
    pub api: PolicyConfig,

    #[serde(default = "default_search_policy")]
    pub search: PolicyConfig,

    #[serde(default = "default_bulk_policy")]
    pub bulk: PolicyConfig,
}

impl Default for PoliciesConfig {
    fn default() -> Self {
        Self {
            api: default_api_policy(),
            search: default_search_policy(),
            bulk: default_bulk_policy(),
        }
    }
}

// Requests per minute
fn default_api_policy() -> PolicyConfig {
    PolicyConfig::new(1800, 60_000, 100)
}

fn default_search_policy() -> PolicyConfig {
    PolicyConfig::new(900, 60_000, 150)
}

fn default_bulk_policy() -> PolicyConfig {
    PolicyConfig::new(300, 60_000, 500)
}

/// Inventory API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the inventory REST API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8800/api".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl ThrottleConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from a YAML file without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration file");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load defaults, then the optional file, then `FORTIDASH_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            ::config::Config::builder().add_source(::config::Config::try_from(&ThrottleConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config: ThrottleConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject non-positive policy values and an empty base URL.
    pub fn validate(&self) -> Result<()> {
        self.policies.api.validate("api")?;
        self.policies.search.validate("search")?;
        self.policies.bulk.validate("bulk")?;

        if self.api.base_url.trim().is_empty() {
            return Err(LimiterError::Config("api base_url is required".to_string()));
        }
        Ok(())
    }

    /// Default tracing filter directive for this configuration.
    pub fn log_level(&self) -> &'static str {
        if self.debug_logging {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_dashboard_policies() {
        let config = ThrottleConfig::default();

        assert_eq!(config.policies.api, PolicyConfig::new(1800, 60_000, 100));
        assert_eq!(config.policies.search, PolicyConfig::new(900, 60_000, 150));
        assert_eq!(config.policies.bulk, PolicyConfig::new(300, 60_000, 500));
        assert_eq!(config.api.base_url, "http://localhost:8800/api");
        assert_eq!(config.api.request_timeout_ms, 10_000);
        assert!(!config.debug_logging);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
policies:
  search:
    max_requests: 50
    window_ms: 10000
api:
  base_url: http://inventory.internal/api
debug_logging: true
"#;
        let config = ThrottleConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.policies.search.max_requests, 50);
        assert_eq!(config.policies.search.window_ms, 10_000);
        assert_eq!(config.policies.search.retry_after_ms, 1000);
        assert_eq!(config.policies.api, PolicyConfig::new(1800, 60_000, 100));
        assert_eq!(config.api.base_url, "http://inventory.internal/api");
        assert_eq!(config.api.request_timeout_ms, 10_000);
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = ThrottleConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ThrottleConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = ThrottleConfig::from_yaml("policies: [1, 2").unwrap_err();
        assert!(matches!(err, LimiterError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_quota() {
        let mut config = ThrottleConfig::default();
        config.policies.bulk.max_requests = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bulk max_requests"));
    }

    #[test]
    fn test_validate_rejects_empty_base_url() {
        let mut config = ThrottleConfig::default();
        config.api.base_url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_layers_file_over_defaults() {
        let path = std::env::temp_dir().join(format!("fortidash-load-{}.yaml", std::process::id()));
        std::fs::write(&path, "policies:\n  bulk:\n    max_requests: 10\n    window_ms: 5000\n    retry_after_ms: 250\n").unwrap();

        let config = ThrottleConfig::load(Some(path.as_path()));
        std::fs::remove_file(&path).ok();
        let config = config.unwrap();

        assert_eq!(config.policies.bulk, PolicyConfig::new(10, 5000, 250));
        assert_eq!(config.policies.api, PolicyConfig::new(1800, 60_000, 100));
    }

    #[test]
    fn test_load_env_overrides_file_and_defaults() {
        let path = std::env::temp_dir().join(format!("fortidash-env-{}.yaml", std::process::id()));
        std::fs::write(&path, "policies:\n  search:\n    max_requests: 40\n    retry_after_ms: 250\n").unwrap();

        std::env::set_var("FORTIDASH_POLICIES__SEARCH__RETRY_AFTER_MS", "750");
        std::env::set_var("FORTIDASH_POLICIES__SEARCH__WINDOW_MS", "2000");
        let config = ThrottleConfig::load(Some(path.as_path()));
        std::env::remove_var("FORTIDASH_POLICIES__SEARCH__RETRY_AFTER_MS");
        std::env::remove_var("FORTIDASH_POLICIES__SEARCH__WINDOW_MS");
        std::fs::remove_file(&path).ok();
        let config = config.unwrap();

        // retry_after_ms beats the file, window_ms beats the default
        assert_eq!(config.policies.search, PolicyConfig::new(40, 2000, 750));
        assert_eq!(config.policies.api, PolicyConfig::new(1800, 60_000, 100));
    }

    #[test]
    fn test_from_missing_file_is_io_error() {
        let err = ThrottleConfig::from_file("/nonexistent/fortidash.yaml").unwrap_err();
        assert!(matches!(err, LimiterError::Io(_)));
    }
}
