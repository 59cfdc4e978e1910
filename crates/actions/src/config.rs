//! Runtime configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::service::DEFAULT_FETCH_SIZE;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Configuration for running actions against Postgres.
#[derive(Debug, Clone)]
pub struct ActionsConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Maximum pool connections (default: `20`).
    pub db_max_connections: u32,
    /// Directory holding action definition files (default: `./actions`).
    pub actions_dir: PathBuf,
    /// Base directory for hook output logs (default: `./action-logs`).
    pub output_dir: PathBuf,
    /// Iterator page size (default: `1024`).
    pub fetch_size: usize,
    /// Upper bound for a single store operation (default: 30s).
    pub db_timeout: Duration,
}

impl ActionsConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default          |
    /// |---------------------------|------------------|
    /// | `DATABASE_URL`            | required         |
    /// | `DB_MAX_CONNECTIONS`      | `20`             |
    /// | `ACTIONS_DIR`             | `./actions`      |
    /// | `ACTIONS_OUTPUT_DIR`      | `./action-logs`  |
    /// | `ACTIONS_FETCH_SIZE`      | `1024`           |
    /// | `ACTIONS_DB_TIMEOUT_SECS` | `30`             |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", "u32", 20)?;
        let actions_dir = lookup("ACTIONS_DIR").unwrap_or_else(|| "./actions".into());
        let output_dir = lookup("ACTIONS_OUTPUT_DIR").unwrap_or_else(|| "./action-logs".into());
        let fetch_size: usize =
            parse_or(&lookup, "ACTIONS_FETCH_SIZE", "positive integer", DEFAULT_FETCH_SIZE)?;
        if fetch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "ACTIONS_FETCH_SIZE",
                expected: "positive integer",
                value: "0".to_string(),
            });
        }
        let db_timeout_secs: u64 = parse_or(&lookup, "ACTIONS_DB_TIMEOUT_SECS", "u64", 30)?;

        Ok(Self {
            database_url,
            db_max_connections,
            actions_dir: PathBuf::from(actions_dir),
            output_dir: PathBuf::from(output_dir),
            fetch_size,
            db_timeout: Duration::from_secs(db_timeout_secs),
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = ActionsConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap();
        assert_eq!(config.db_max_connections, 20);
        assert_eq!(config.actions_dir, PathBuf::from("./actions"));
        assert_eq!(config.output_dir, PathBuf::from("./action-logs"));
        assert_eq!(config.fetch_size, 1024);
        assert_eq!(config.db_timeout, Duration::from_secs(30));
    }

    #[test]
    fn database_url_is_required() {
        assert_matches!(
            ActionsConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = ActionsConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("ACTIONS_FETCH_SIZE", "10"),
            ("ACTIONS_DB_TIMEOUT_SECS", "5"),
            ("ACTIONS_DIR", "/etc/strata/actions"),
        ]))
        .unwrap();
        assert_eq!(config.fetch_size, 10);
        assert_eq!(config.db_timeout, Duration::from_secs(5));
        assert_eq!(config.actions_dir, PathBuf::from("/etc/strata/actions"));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert_matches!(
            ActionsConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://x"),
                ("DB_MAX_CONNECTIONS", "many"),
            ])),
            Err(ConfigError::Invalid { name: "DB_MAX_CONNECTIONS", .. })
        );
        assert_matches!(
            ActionsConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://x"),
                ("ACTIONS_FETCH_SIZE", "0"),
            ])),
            Err(ConfigError::Invalid { name: "ACTIONS_FETCH_SIZE", .. })
        );
    }
}
