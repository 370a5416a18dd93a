use crate::{env_optional, ConfigError, FromEnv};

/// Remote cache location. `url: None` means run without Redis.
#[derive(Clone, Debug, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
        }
    }
}

impl FromEnv for RedisConfig {
    /// REDIS_URL is optional
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_optional("REDIS_URL"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_from_env_set() {
        temp_env::with_var("REDIS_URL", Some("redis://localhost:6379"), || {
            let config = RedisConfig::from_env().unwrap();
            assert_eq!(config.url.as_deref(), Some("redis://localhost:6379"));
        });
    }

    #[test]
    fn test_redis_config_from_env_unset() {
        temp_env::with_var_unset("REDIS_URL", || {
            assert!(RedisConfig::from_env().unwrap().url.is_none());
        });
    }
}
