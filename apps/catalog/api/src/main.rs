use core_config::tracing::{init_tracing, install_color_eyre};
use domain_products::events::connect_publisher;
use domain_products::{PgProductRepository, ProductCache, ProductService};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database};
use tracing::info;

mod app;
mod config;
mod server;

use config::Config;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output (before any fallible operations)
    install_color_eyre();

    let config = Config::from_env()?;

    // Initialize tracing with ErrorLayer for span trace capture
    init_tracing(&config.environment);

    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .connect_timeout(config.database.connect_timeout)
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .map_err(|e| eyre::eyre!("PostgreSQL connection failed: {}", e))?;
    info!("PostgreSQL connected");

    Migrator::up(&db, None)
        .await
        .map_err(|e| eyre::eyre!("Migrations failed: {}", e))?;
    info!("Migrations applied");

    // Redis and NATS are optional, both degrade instead of failing startup
    let cache = ProductCache::connect(&config.redis, config.cache.clone()).await;
    let events = connect_publisher(&config.nats, &config.events).await;
    info!(cache_backend = cache.backend_name(), "Product cache ready");

    let repository = PgProductRepository::new(db.clone());
    let service = ProductService::new(repository, cache, events, config.events.stream.clone());

    let router = app::build_router(service, db.clone());

    server::serve(router, &config.server, async move {
        info!("Shutting down: closing database connections");
        match db.close().await {
            Ok(()) => info!("PostgreSQL connection closed successfully"),
            Err(e) => tracing::error!("Error closing PostgreSQL: {}", e),
        }
    })
    .await
    .map_err(|e| eyre::eyre!("Server error: {}", e))?;

    info!("Catalog API shutdown complete");
    Ok(())
}
