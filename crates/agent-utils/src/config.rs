//! Configuration management utilities

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (dev, prod, etc.)
    pub environment: String,
    /// Tracing filter directive, `RUST_LOG` syntax
    pub log_filter: Option<String>,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "stock-research".to_string(),
            environment: "development".to_string(),
            log_filter: None,
            json_logs: false,
        }
    }
}

impl Config {
    /// Read `APP_ENV`, `RUST_LOG` and `LOG_FORMAT` over the defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            app_name: defaults.app_name,
            environment: lookup("APP_ENV").unwrap_or(defaults.environment),
            log_filter: lookup("RUST_LOG"),
            json_logs: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        }
    }

    /// Whether this is a production deployment
    pub fn is_production(&self) -> bool {
        matches!(self.environment.as_str(), "prod" | "production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("APP_ENV", "prod"), ("LOG_FORMAT", "JSON")]);
        let config = Config::from_lookup(|key| vars.get(key).map(ToString::to_string));

        assert!(config.is_production());
        assert!(config.json_logs);
        assert_eq!(config.log_filter, None);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config, Config::default());
        assert!(!config.is_production());
    }
}
