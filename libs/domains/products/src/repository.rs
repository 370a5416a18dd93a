use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use crate::error::{ProductError, ProductResult};
use crate::models::{
    CategoryCount, NewPriceHistory, NewProduct, PriceBucketCounts, PriceHistory, PriceStatistics,
    MAX_SKU_ATTEMPTS, Product, ProductPage, ProductSearch, SortDirection, SortField,
    generate_sku,
};

/// Repository trait for Product persistence
///
/// Implementations own id assignment and SKU generation. `update` is
/// conditional on `product.version` still matching the stored row.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Insert a product, generating a SKU if none was supplied
    async fn create(&self, input: NewProduct) -> ProductResult<Product>;

    async fn find_by_id(&self, id: i64) -> ProductResult<Option<Product>>;

    async fn find_by_sku(&self, sku: &str) -> ProductResult<Option<Product>>;

    async fn exists_by_id(&self, id: i64) -> ProductResult<bool>;

    /// Persist `product` and the optional price history row atomically.
    ///
    /// Fails with `ConcurrentModification` when the stored version moved on.
    async fn update(
        &self,
        product: Product,
        price_change: Option<NewPriceHistory>,
    ) -> ProductResult<Product>;

    /// Delete a product and its price history. Returns false if absent.
    async fn delete_by_id(&self, id: i64) -> ProductResult<bool>;

    async fn find_all(&self) -> ProductResult<Vec<Product>>;

    async fn search(&self, criteria: &ProductSearch) -> ProductResult<ProductPage>;

    async fn find_by_category(&self, category: &str) -> ProductResult<Vec<Product>>;

    async fn find_active(&self) -> ProductResult<Vec<Product>>;

    /// Products with stock strictly below `threshold`
    async fn find_low_stock(&self, threshold: i32) -> ProductResult<Vec<Product>>;

    /// Newest first
    async fn find_recent(&self, limit: u64) -> ProductResult<Vec<Product>>;

    async fn count(&self) -> ProductResult<u64>;

    async fn count_active(&self) -> ProductResult<u64>;

    async fn count_low_stock(&self, threshold: i32) -> ProductResult<u64>;

    async fn count_by_category(&self) -> ProductResult<Vec<CategoryCount>>;

    async fn price_statistics(&self) -> ProductResult<PriceStatistics>;

    async fn price_bucket_counts(&self) -> ProductResult<PriceBucketCounts>;

    /// History rows for a product, newest first
    async fn price_history(&self, product_id: i64) -> ProductResult<Vec<PriceHistory>>;
}

#[derive(Debug, Default)]
struct Store {
    products: HashMap<i64, Product>,
    history: Vec<PriceHistory>,
}

/// In-memory implementation of ProductRepository (for development/testing)
#[derive(Debug, Clone)]
pub struct InMemoryProductRepository {
    store: Arc<RwLock<Store>>,
    next_product_id: Arc<AtomicI64>,
    next_history_id: Arc<AtomicI64>,
}

impl Default for InMemoryProductRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
            next_product_id: Arc::new(AtomicI64::new(1)),
            next_history_id: Arc::new(AtomicI64::new(1)),
        }
    }

    async fn select<F>(&self, predicate: F) -> Vec<Product>
    where
        F: Fn(&Product) -> bool,
    {
        let store = self.store.read().await;
        let mut result: Vec<Product> = store
            .products
            .values()
            .filter(|p| predicate(p))
            .cloned()
            .collect();
        result.sort_by_key(|p| p.id);
        result
    }
}

fn compare(a: &Product, b: &Product, field: SortField) -> std::cmp::Ordering {
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::Price => a.price.cmp(&b.price),
        SortField::Category => a.category.cmp(&b.category),
        SortField::StockQuantity => a.stock_quantity.cmp(&b.stock_quantity),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Id => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn create(&self, input: NewProduct) -> ProductResult<Product> {
        let mut store = self.store.write().await;

        let sku_taken = |sku: &str| store.products.values().any(|p| p.sku == sku);

        let sku = match input.sku.clone() {
            Some(sku) if sku_taken(&sku) => return Err(ProductError::DuplicateSku(sku)),
            Some(sku) => sku,
            None => std::iter::repeat_with(generate_sku)
                .take(MAX_SKU_ATTEMPTS)
                .find(|sku| !sku_taken(sku))
                .ok_or_else(|| {
                    ProductError::Internal("Could not generate a unique SKU".to_string())
                })?,
        };

        let id = self.next_product_id.fetch_add(1, Ordering::SeqCst);
        let product = NewProduct {
            sku: Some(sku),
            ..input
        }
        .into_product(id);
        store.products.insert(id, product.clone());

        tracing::info!(product_id = id, sku = %product.sku, "Created product");
        Ok(product)
    }

    async fn find_by_id(&self, id: i64) -> ProductResult<Option<Product>> {
        let store = self.store.read().await;
        Ok(store.products.get(&id).cloned())
    }

    async fn find_by_sku(&self, sku: &str) -> ProductResult<Option<Product>> {
        let store = self.store.read().await;
        Ok(store.products.values().find(|p| p.sku == sku).cloned())
    }

    async fn exists_by_id(&self, id: i64) -> ProductResult<bool> {
        let store = self.store.read().await;
        Ok(store.products.contains_key(&id))
    }

    async fn update(
        &self,
        mut product: Product,
        price_change: Option<NewPriceHistory>,
    ) -> ProductResult<Product> {
        let mut store = self.store.write().await;

        let stored_version = store
            .products
            .get(&product.id)
            .map(|p| p.version)
            .ok_or(ProductError::NotFound(product.id))?;

        if stored_version != product.version {
            return Err(ProductError::ConcurrentModification(product.id));
        }

        if store
            .products
            .values()
            .any(|p| p.id != product.id && p.sku == product.sku)
        {
            return Err(ProductError::DuplicateSku(product.sku));
        }

        if let Some(change) = price_change {
            let history_id = self.next_history_id.fetch_add(1, Ordering::SeqCst);
            store.history.push(change.into_entry(history_id));
        }

        product.version += 1;
        store.products.insert(product.id, product.clone());

        tracing::info!(product_id = product.id, version = product.version, "Updated product");
        Ok(product)
    }

    async fn delete_by_id(&self, id: i64) -> ProductResult<bool> {
        let mut store = self.store.write().await;

        if store.products.remove(&id).is_some() {
            store.history.retain(|h| h.product_id != id);
            tracing::info!(product_id = id, "Deleted product");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn find_all(&self) -> ProductResult<Vec<Product>> {
        Ok(self.select(|_| true).await)
    }

    async fn search(&self, criteria: &ProductSearch) -> ProductResult<ProductPage> {
        let field = criteria.sort_field()?;
        let direction = criteria.direction()?;
        let (page, size) = (criteria.page(), criteria.size());

        let mut matching = self.select(|p| criteria.matches(p)).await;
        matching.sort_by(|a, b| {
            let ordering = compare(a, b, field);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let total = matching.len() as u64;
        // Offsets past the end, including ones beyond usize, yield an empty page
        let offset = page
            .checked_mul(size)
            .and_then(|offset| usize::try_from(offset).ok())
            .unwrap_or(usize::MAX);
        let content = matching
            .into_iter()
            .skip(offset)
            .take(size as usize)
            .collect();

        Ok(ProductPage::new(content, page, size, total))
    }

    async fn find_by_category(&self, category: &str) -> ProductResult<Vec<Product>> {
        Ok(self.select(|p| p.category == category).await)
    }

    async fn find_active(&self) -> ProductResult<Vec<Product>> {
        Ok(self.select(|p| p.is_active).await)
    }

    async fn find_low_stock(&self, threshold: i32) -> ProductResult<Vec<Product>> {
        let mut result = self.select(|p| p.stock_quantity < threshold).await;
        result.sort_by_key(|p| p.stock_quantity);
        Ok(result)
    }

    async fn find_recent(&self, limit: u64) -> ProductResult<Vec<Product>> {
        let mut result = self.select(|_| true).await;
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        result.truncate(limit as usize);
        Ok(result)
    }

    async fn count(&self) -> ProductResult<u64> {
        let store = self.store.read().await;
        Ok(store.products.len() as u64)
    }

    async fn count_active(&self) -> ProductResult<u64> {
        Ok(self.select(|p| p.is_active).await.len() as u64)
    }

    async fn count_low_stock(&self, threshold: i32) -> ProductResult<u64> {
        Ok(self.select(|p| p.stock_quantity < threshold).await.len() as u64)
    }

    async fn count_by_category(&self) -> ProductResult<Vec<CategoryCount>> {
        let store = self.store.read().await;

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for product in store.products.values() {
            *counts.entry(product.category.as_str()).or_default() += 1;
        }

        let mut result: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(category, count)| CategoryCount {
                category: category.to_string(),
                count,
            })
            .collect();
        result.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(result)
    }

    async fn price_statistics(&self) -> ProductResult<PriceStatistics> {
        let store = self.store.read().await;
        let prices: Vec<_> = store.products.values().map(|p| p.price).collect();

        if prices.is_empty() {
            return Ok(PriceStatistics::default());
        }

        let count = prices.len() as u64;
        let sum: rust_decimal::Decimal = prices.iter().sum();

        Ok(PriceStatistics {
            count,
            min: prices.iter().min().copied(),
            max: prices.iter().max().copied(),
            average: Some((sum / rust_decimal::Decimal::from(count)).round_dp(2)),
        })
    }

    async fn price_bucket_counts(&self) -> ProductResult<PriceBucketCounts> {
        let store = self.store.read().await;
        let mut buckets = PriceBucketCounts::default();
        for product in store.products.values() {
            buckets.record(product.price);
        }
        Ok(buckets)
    }

    async fn price_history(&self, product_id: i64) -> ProductResult<Vec<PriceHistory>> {
        let store = self.store.read().await;
        let mut rows: Vec<PriceHistory> = store
            .history
            .iter()
            .filter(|h| h.product_id == product_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.changed_at.cmp(&a.changed_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }
}
