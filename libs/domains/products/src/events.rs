//! Product change notifications over NATS.
//!
//! Publishing never blocks or fails the calling operation: the NATS
//! publisher hands the snapshot to a spawned task and returns immediately.

use async_nats::Client;
use chrono::{DateTime, Utc};
use core_config::nats::NatsConfig;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumString};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::models::Product;

/// Partition key used before the store has assigned an id
pub const UNASSIGNED_KEY: &str = "new-product";

/// What happened to the product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductEventType {
    Created,
    Updated,
    StockChanged,
}

/// Message body published on `<stream>.<key>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductEvent {
    pub event_type: ProductEventType,
    pub product: Product,
    pub occurred_at: DateTime<Utc>,
}

impl ProductEvent {
    pub fn new(event_type: ProductEventType, product: Product) -> Self {
        Self {
            event_type,
            product,
            occurred_at: Utc::now(),
        }
    }

    /// Product id, or [`UNASSIGNED_KEY`] for a non-positive id
    pub fn partition_key(&self) -> String {
        if self.product.id > 0 {
            self.product.id.to_string()
        } else {
            UNASSIGNED_KEY.to_string()
        }
    }
}

#[derive(Clone, Debug)]
pub struct EventsConfig {
    /// Subject prefix, events go to `<stream>.<key>`
    pub stream: String,
    pub publish_timeout: Duration,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            stream: "products".to_string(),
            publish_timeout: Duration::from_millis(5000),
        }
    }
}

impl FromEnv for EventsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            stream: env_or_default("EVENTS_STREAM", "products"),
            publish_timeout: Duration::from_millis(env_parse("EVENTS_PUBLISH_TIMEOUT_MS", 5000u64)?),
        })
    }
}

/// Fire-and-forget publisher of product snapshots
#[cfg_attr(test, mockall::automock)]
pub trait EventPublisher: Send + Sync {
    /// Dispatch `event` to `stream` under `key` without waiting on the broker.
    ///
    /// Returns the handle of the background send, if one was started.
    fn publish(&self, stream: &str, key: &str, event: ProductEvent) -> Option<JoinHandle<()>>;
}

/// NATS-backed publisher
#[derive(Clone)]
pub struct NatsEventPublisher {
    client: Client,
    publish_timeout: Duration,
}

impl NatsEventPublisher {
    pub fn new(client: Client, publish_timeout: Duration) -> Self {
        Self {
            client,
            publish_timeout,
        }
    }
}

impl EventPublisher for NatsEventPublisher {
    #[instrument(skip(self, event), fields(subject = %format!("{stream}.{key}")))]
    fn publish(&self, stream: &str, key: &str, event: ProductEvent) -> Option<JoinHandle<()>> {
        let subject = format!("{stream}.{key}");

        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, subject = %subject, "Failed to serialize event");
                return None;
            }
        };

        let client = self.client.clone();
        let timeout = self.publish_timeout;

        Some(tokio::spawn(async move {
            let send = async {
                client.publish(subject.clone(), payload.into()).await?;
                client.flush().await?;
                Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
            };

            match tokio::time::timeout(timeout, send).await {
                Ok(Ok(())) => info!(subject = %subject, "Event published"),
                Ok(Err(e)) => error!(error = %e, subject = %subject, "Failed to publish event"),
                Err(_) => warn!(subject = %subject, ?timeout, "Event publish timed out"),
            }
        }))
    }
}

/// Used when events are disabled or the broker is unreachable
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, stream: &str, key: &str, _event: ProductEvent) -> Option<JoinHandle<()>> {
        debug!(stream, key, "Event publishing disabled, dropping event");
        None
    }
}

/// NATS publisher if enabled and reachable, otherwise a no-op
pub async fn connect_publisher(
    nats: &NatsConfig,
    events: &EventsConfig,
) -> Arc<dyn EventPublisher> {
    if !nats.enabled {
        info!("Event publishing disabled by configuration");
        return Arc::new(NoopEventPublisher);
    }

    let Some(url) = nats.url.as_deref() else {
        info!("NATS_URL not set, event publishing disabled");
        return Arc::new(NoopEventPublisher);
    };

    match async_nats::connect(url).await {
        Ok(client) => {
            info!(url = %url, stream = %events.stream, "Connected to NATS");
            Arc::new(NatsEventPublisher::new(client, events.publish_timeout))
        }
        Err(e) => {
            warn!(error = %e, url = %url, "NATS unreachable, event publishing disabled");
            Arc::new(NoopEventPublisher)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_CATEGORY, NewProduct};
    use rust_decimal::Decimal;

    fn product(id: i64) -> Product {
        NewProduct {
            name: "Widget".to_string(),
            description: None,
            price: Decimal::new(1000, 2),
            category: DEFAULT_CATEGORY.to_string(),
            stock_quantity: 5,
            sku: Some("SKU-ABC123".to_string()),
            is_active: true,
        }
        .into_product(id)
    }

    #[test]
    fn test_partition_key_uses_id() {
        let event = ProductEvent::new(ProductEventType::Created, product(42));
        assert_eq!(event.partition_key(), "42");
    }

    #[test]
    fn test_partition_key_sentinel_for_unassigned_id() {
        let event = ProductEvent::new(ProductEventType::Created, product(0));
        assert_eq!(event.partition_key(), UNASSIGNED_KEY);
    }

    #[test]
    fn test_event_serializes_snapshot() {
        let event = ProductEvent::new(ProductEventType::StockChanged, product(3));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event_type"], "stock_changed");
        assert_eq!(json["product"]["id"], 3);
        assert_eq!(json["product"]["sku"], "SKU-ABC123");
        assert!(json["occurred_at"].is_string());
    }

    #[test]
    fn test_noop_publisher_starts_nothing() {
        let publisher = NoopEventPublisher;
        let handle = publisher.publish(
            "products",
            "1",
            ProductEvent::new(ProductEventType::Updated, product(1)),
        );
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_connect_publisher_disabled() {
        let nats = NatsConfig {
            url: Some("nats://127.0.0.1:4222".to_string()),
            enabled: false,
        };
        let publisher = connect_publisher(&nats, &EventsConfig::default()).await;
        let handle = publisher.publish(
            "products",
            "1",
            ProductEvent::new(ProductEventType::Updated, product(1)),
        );
        assert!(handle.is_none());
    }

    #[test]
    fn test_events_config_from_env() {
        temp_env::with_vars(
            [
                ("EVENTS_STREAM", Some("catalog")),
                ("EVENTS_PUBLISH_TIMEOUT_MS", Some("250")),
            ],
            || {
                let config = EventsConfig::from_env().unwrap();
                assert_eq!(config.stream, "catalog");
                assert_eq!(config.publish_timeout, Duration::from_millis(250));
            },
        );
    }
}
