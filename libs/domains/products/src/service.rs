//! Product Service - lifecycle and consistency rules
//!
//! Every mutating operation runs store write, then cache invalidation, then
//! event publish. Cache and broker failures never fail the operation.

use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

use crate::cache::{CacheNamespace, ProductCache};
use crate::error::{ProductError, ProductResult};
use crate::events::{EventPublisher, ProductEvent, ProductEventType};
use crate::models::{
    BulkDeleteResult, CategoryCount, CreateProduct, LOW_STOCK_THRESHOLD, PriceHistory, Product,
    ProductPage, ProductSearch, ProductStatistics, StockOperation, UpdateProduct,
};
use crate::repository::ProductRepository;

const ALL_KEY: &str = "all";
const ACTIVE_KEY: &str = "active";
pub const DEFAULT_RECENT_LIMIT: u64 = 5;
const MAX_RECENT_LIMIT: u64 = 100;

fn category_key(category: &str) -> String {
    format!("category:{category}")
}

/// Product service providing business logic operations
pub struct ProductService<R: ProductRepository> {
    repository: Arc<R>,
    cache: ProductCache,
    events: Arc<dyn EventPublisher>,
    stream: String,
}

impl<R: ProductRepository> Clone for ProductService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            cache: self.cache.clone(),
            events: Arc::clone(&self.events),
            stream: self.stream.clone(),
        }
    }
}

impl<R: ProductRepository> ProductService<R> {
    pub fn new(
        repository: R,
        cache: ProductCache,
        events: Arc<dyn EventPublisher>,
        stream: impl Into<String>,
    ) -> Self {
        Self {
            repository: Arc::new(repository),
            cache,
            events,
            stream: stream.into(),
        }
    }

    pub fn cache(&self) -> &ProductCache {
        &self.cache
    }

    /// Drop the by-id entry and every listing
    async fn invalidate(&self, id: i64) {
        self.cache
            .evict(CacheNamespace::ProductById, &id.to_string())
            .await;
        self.cache.evict_all(CacheNamespace::Products).await;
    }

    fn publish(&self, event_type: ProductEventType, product: &Product) {
        let event = ProductEvent::new(event_type, product.clone());
        let key = event.partition_key();
        // Completion is logged by the publisher
        let _ = self.events.publish(&self.stream, &key, event);
    }

    /// Create a new product
    #[instrument(skip(self, input), fields(product_name = %input.name))]
    pub async fn create_product(&self, input: CreateProduct) -> ProductResult<Product> {
        input.validate()?;

        if let Some(ref sku) = input.sku {
            if self.repository.find_by_sku(sku).await?.is_some() {
                return Err(ProductError::DuplicateSku(sku.clone()));
            }
        }

        let product = self.repository.create(input.into()).await?;

        self.cache.evict_all(CacheNamespace::Products).await;
        self.publish(ProductEventType::Created, &product);

        Ok(product)
    }

    /// Partial update. A changed price is recorded in the price history
    /// within the same store write.
    #[instrument(skip(self, input), fields(product_id = id))]
    pub async fn update_product(&self, id: i64, input: UpdateProduct) -> ProductResult<Product> {
        input.validate()?;

        let mut product = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(ProductError::NotFound(id))?;

        if let Some(ref sku) = input.sku {
            if *sku != product.sku && self.repository.find_by_sku(sku).await?.is_some() {
                return Err(ProductError::DuplicateSku(sku.clone()));
            }
        }

        let price_change = product.apply_update(input);
        if let Some(ref change) = price_change {
            tracing::info!(
                old_price = %change.old_price,
                new_price = %change.new_price,
                "Recording price change"
            );
        }

        let updated = self.repository.update(product, price_change).await?;

        self.invalidate(id).await;
        self.publish(ProductEventType::Updated, &updated);

        Ok(updated)
    }

    /// Delete a product
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: i64) -> ProductResult<()> {
        if !self.repository.exists_by_id(id).await? {
            return Err(ProductError::NotFound(id));
        }

        if !self.repository.delete_by_id(id).await? {
            return Err(ProductError::NotFound(id));
        }

        self.invalidate(id).await;
        Ok(())
    }

    /// Get a product by ID, `None` if it does not exist
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: i64) -> ProductResult<Option<Product>> {
        let key = id.to_string();

        if let Some(product) = self.cache.get(CacheNamespace::ProductById, &key).await {
            return Ok(Some(product));
        }

        let seen = self.cache.generation(CacheNamespace::ProductById);
        let product = self.repository.find_by_id(id).await?;
        if let Some(ref product) = product {
            self.cache
                .put_if_current(CacheNamespace::ProductById, &key, product, seen)
                .await;
        }
        Ok(product)
    }

    /// Get a product by SKU
    #[instrument(skip(self))]
    pub async fn get_by_sku(&self, sku: &str) -> ProductResult<Option<Product>> {
        self.repository.find_by_sku(sku).await
    }

    /// All products, cached under a single listing key
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> ProductResult<Vec<Product>> {
        self.cached_listing(ALL_KEY.to_string(), || self.repository.find_all())
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_products_by_category(&self, category: &str) -> ProductResult<Vec<Product>> {
        self.cached_listing(category_key(category), || {
            self.repository.find_by_category(category)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn get_active_products(&self) -> ProductResult<Vec<Product>> {
        self.cached_listing(ACTIVE_KEY.to_string(), || self.repository.find_active())
            .await
    }

    async fn cached_listing<F, Fut>(&self, key: String, load: F) -> ProductResult<Vec<Product>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProductResult<Vec<Product>>>,
    {
        if let Some(products) = self.cache.get(CacheNamespace::Products, &key).await {
            return Ok(products);
        }

        let seen = self.cache.generation(CacheNamespace::Products);
        let products = load().await?;
        self.cache
            .put_if_current(CacheNamespace::Products, &key, &products, seen)
            .await;
        Ok(products)
    }

    /// Filtered, sorted, paged search; not cached
    #[instrument(skip(self))]
    pub async fn search_products(&self, criteria: ProductSearch) -> ProductResult<ProductPage> {
        // Reject bad sort tokens before touching the store
        criteria.sort_field()?;
        criteria.direction()?;
        self.repository.search(&criteria).await
    }

    /// Adjust stock by `quantity` in the direction named by `operation`
    #[instrument(skip(self))]
    pub async fn update_stock(
        &self,
        id: i64,
        quantity: i32,
        operation: &str,
    ) -> ProductResult<Product> {
        let operation: StockOperation = operation.parse().map_err(|_| {
            ProductError::InvalidArgument(format!(
                "Invalid operation '{operation}', expected INCREASE or DECREASE"
            ))
        })?;

        if quantity < 0 {
            return Err(ProductError::InvalidArgument(
                "Quantity must not be negative".to_string(),
            ));
        }

        let mut product = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(ProductError::NotFound(id))?;

        product.adjust_stock(quantity, operation)?;

        let updated = self.repository.update(product, None).await?;

        self.invalidate(id).await;
        self.publish(ProductEventType::StockChanged, &updated);

        tracing::info!(
            product_id = id,
            %operation,
            quantity,
            stock = updated.stock_quantity,
            "Stock updated"
        );
        Ok(updated)
    }

    /// Aggregates recomputed from the store on every call
    #[instrument(skip(self))]
    pub async fn get_statistics(&self) -> ProductResult<ProductStatistics> {
        let total_products = self.repository.count().await?;
        let prices = self.repository.price_statistics().await?;
        let price_ranges = self.repository.price_bucket_counts().await?;
        let active_products = self.repository.count_active().await?;
        let low_stock_products = self.repository.count_low_stock(LOW_STOCK_THRESHOLD).await?;
        let category_counts = self.repository.count_by_category().await?;

        Ok(ProductStatistics {
            total_products,
            active_products,
            low_stock_products,
            price_ranges,
            min_price: prices.min,
            max_price: prices.max,
            average_price: prices.average,
            category_counts,
        })
    }

    /// Price changes for a product, newest first. Unknown products yield an
    /// empty list.
    #[instrument(skip(self))]
    pub async fn get_price_history(&self, product_id: i64) -> ProductResult<Vec<PriceHistory>> {
        self.repository.price_history(product_id).await
    }

    /// Products with stock strictly below `threshold`
    #[instrument(skip(self))]
    pub async fn get_low_stock_products(&self, threshold: i32) -> ProductResult<Vec<Product>> {
        if threshold < 0 {
            return Err(ProductError::InvalidArgument(
                "Threshold must not be negative".to_string(),
            ));
        }
        self.repository.find_low_stock(threshold).await
    }

    #[instrument(skip(self))]
    pub async fn get_category_counts(&self) -> ProductResult<Vec<CategoryCount>> {
        self.repository.count_by_category().await
    }

    /// Newest products first, `limit` clamped to 1..=100
    #[instrument(skip(self))]
    pub async fn get_recent_products(&self, limit: u64) -> ProductResult<Vec<Product>> {
        self.repository
            .find_recent(limit.clamp(1, MAX_RECENT_LIMIT))
            .await
    }

    /// Delete each id, reporting which ones did not exist
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn bulk_delete(&self, ids: Vec<i64>) -> ProductResult<BulkDeleteResult> {
        let mut result = BulkDeleteResult::default();

        for id in ids {
            if self.repository.delete_by_id(id).await? {
                self.cache
                    .evict(CacheNamespace::ProductById, &id.to_string())
                    .await;
                result.deleted.push(id);
            } else {
                result.not_found.push(id);
            }
        }

        if !result.deleted.is_empty() {
            self.cache.evict_all(CacheNamespace::Products).await;
        }

        tracing::info!(
            deleted = result.deleted.len(),
            not_found = result.not_found.len(),
            "Bulk delete finished"
        );
        Ok(result)
    }
}
