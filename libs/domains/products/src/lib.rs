//! Products Domain
//!
//! Catalog lifecycle for products backed by PostgreSQL through SeaORM, with a
//! read-through cache and fire-and-forget change events.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← HTTP endpoints
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐      ┌─────────┐
//! │   Service   │ ───► │  Cache  │  ← Redis or in-process LRU
//! └──────┬──────┘      └─────────┘
//!        │             ┌─────────┐
//!        ├───────────► │ Events  │  ← NATS or no-op
//!        │             └─────────┘
//! ┌──────▼──────┐
//! │ Repository  │  ← Data access (trait + Postgres / in-memory)
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Entities, DTOs
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_products::{
//!     cache::{CacheConfig, ProductCache},
//!     events::NoopEventPublisher,
//!     handlers,
//!     postgres::PgProductRepository,
//!     service::ProductService,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = sea_orm::Database::connect("postgres://localhost/catalog").await?;
//!
//! let repository = PgProductRepository::new(db);
//! let cache = ProductCache::in_memory(CacheConfig::default());
//! let service = ProductService::new(repository, cache, Arc::new(NoopEventPublisher), "products");
//!
//! let router = handlers::router(service);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod entity;
pub mod error;
pub mod events;
pub mod handlers;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;

// Re-export commonly used types
pub use cache::{CacheConfig, ProductCache};
pub use error::{ProductError, ProductResult};
pub use events::{EventPublisher, EventsConfig, ProductEvent, ProductEventType};
pub use handlers::ApiDoc;
pub use models::{
    CreateProduct, PriceHistory, Product, ProductPage, ProductSearch, ProductStatistics,
    StockOperation, UpdateProduct,
};
pub use postgres::PgProductRepository;
pub use repository::{InMemoryProductRepository, ProductRepository};
pub use service::ProductService;
