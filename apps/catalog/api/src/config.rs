use core_config::database::DatabaseConfig;
use core_config::nats::NatsConfig;
use core_config::redis::RedisConfig;
use core_config::server::ServerConfig;
use core_config::{Environment, FromEnv};
use domain_products::cache::CacheConfig;
use domain_products::events::EventsConfig;

/// Application-specific configuration
/// Composes shared config components from the `core_config` library
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub nats: NatsConfig,
    pub cache: CacheConfig,
    pub events: EventsConfig,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        Ok(Self {
            environment: Environment::from_env(),
            server: ServerConfig::from_env()?, // HOST=0.0.0.0, PORT=8080
            database: DatabaseConfig::from_env()?, // Required - will fail if not set
            redis: RedisConfig::from_env()?, // Optional, falls back to in-process cache
            nats: NatsConfig::from_env()?, // Optional, events become no-ops
            cache: CacheConfig::from_env()?,
            events: EventsConfig::from_env()?,
        })
    }
}
