use crate::{env_parse, env_required, ConfigError, FromEnv};
use std::time::Duration;

/// Relational store connection settings
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(8),
        }
    }
}

impl FromEnv for DatabaseConfig {
    /// Requires DATABASE_URL; pool settings have defaults
    fn from_env() -> Result<Self, ConfigError> {
        let url = env_required("DATABASE_URL")?;
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 10u32)?;
        let connect_timeout_secs = env_parse("DATABASE_CONNECT_TIMEOUT_SECS", 8u64)?;

        Ok(Self {
            url,
            max_connections,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_from_env_success() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/catalog")),
                ("DATABASE_MAX_CONNECTIONS", Some("25")),
                ("DATABASE_CONNECT_TIMEOUT_SECS", None),
            ],
            || {
                let config = DatabaseConfig::from_env().unwrap();
                assert_eq!(config.url, "postgres://localhost/catalog");
                assert_eq!(config.max_connections, 25);
                assert_eq!(config.connect_timeout, Duration::from_secs(8));
            },
        );
    }

    #[test]
    fn test_database_config_from_env_missing() {
        temp_env::with_var_unset("DATABASE_URL", || {
            let err = DatabaseConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("DATABASE_URL"));
        });
    }
}
