use crate::{env_optional, env_parse, ConfigError, FromEnv};

/// Broker connection settings. Publishing is skipped when `url` is unset.
#[derive(Clone, Debug)]
pub struct NatsConfig {
    pub url: Option<String>,
    pub enabled: bool,
}

impl NatsConfig {
    /// Whether a connection should be attempted at all
    pub fn is_active(&self) -> bool {
        self.enabled && self.url.is_some()
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: None,
            enabled: true,
        }
    }
}

impl FromEnv for NatsConfig {
    /// NATS_URL (optional), EVENTS_ENABLED (true)
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_optional("NATS_URL"),
            enabled: env_parse("EVENTS_ENABLED", true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nats_config_disabled_flag() {
        temp_env::with_vars(
            [
                ("NATS_URL", Some("nats://localhost:4222")),
                ("EVENTS_ENABLED", Some("false")),
            ],
            || {
                let config = NatsConfig::from_env().unwrap();
                assert!(!config.enabled);
                assert!(!config.is_active());
            },
        );
    }

    #[test]
    fn test_nats_config_without_url_is_inactive() {
        temp_env::with_vars(
            [("NATS_URL", None::<&str>), ("EVENTS_ENABLED", None)],
            || {
                let config = NatsConfig::from_env().unwrap();
                assert!(config.enabled);
                assert!(!config.is_active());
            },
        );
    }
}
