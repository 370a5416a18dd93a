use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, SqlErr, TransactionTrait,
};
use tracing::instrument;

use crate::entity::{price_history, products};
use crate::error::{ProductError, ProductResult};
use crate::models::{
    CategoryCount, NewPriceHistory, NewProduct, PriceBucketCounts, PriceHistory, PriceStatistics,
    MAX_SKU_ATTEMPTS, Product, ProductPage, ProductSearch, SortDirection, SortField,
    generate_sku,
};
use crate::repository::ProductRepository;

/// PostgreSQL implementation of ProductRepository
#[derive(Clone)]
pub struct PgProductRepository {
    db: DatabaseConnection,
}

impl PgProductRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct PriceAggregateRow {
    count: i64,
    min: Option<Decimal>,
    max: Option<Decimal>,
    sum: Option<Decimal>,
}

#[derive(Debug, FromQueryResult)]
struct CategoryCountRow {
    category: String,
    count: i64,
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Unique index violations surface as a SKU conflict
fn map_write_err(err: DbErr, sku: &str) -> ProductError {
    if is_unique_violation(&err) {
        ProductError::DuplicateSku(sku.to_string())
    } else {
        ProductError::from(err)
    }
}

fn sort_column(field: SortField) -> products::Column {
    match field {
        SortField::Name => products::Column::Name,
        SortField::Price => products::Column::Price,
        SortField::Category => products::Column::Category,
        SortField::StockQuantity => products::Column::StockQuantity,
        SortField::CreatedAt => products::Column::CreatedAt,
        SortField::UpdatedAt => products::Column::UpdatedAt,
        SortField::Id => products::Column::Id,
    }
}

/// Lowercased `%needle%` with LIKE wildcards in the needle taken literally
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn apply_criteria(
    mut query: Select<products::Entity>,
    criteria: &ProductSearch,
) -> Select<products::Entity> {
    if let Some(name) = criteria.name.as_deref().filter(|n| !n.is_empty()) {
        query = query.filter(Expr::cust_with_values(
            "LOWER(\"products\".\"name\") LIKE $1 ESCAPE '\\'",
            [contains_pattern(name)],
        ));
    }
    if let Some(description) = criteria.description.as_deref().filter(|d| !d.is_empty()) {
        query = query.filter(Expr::cust_with_values(
            "LOWER(\"products\".\"description\") LIKE $1 ESCAPE '\\'",
            [contains_pattern(description)],
        ));
    }
    if let Some(category) = criteria.category.as_deref().filter(|c| !c.is_empty()) {
        query = query.filter(products::Column::Category.eq(category));
    }
    if let Some(min_price) = criteria.min_price {
        query = query.filter(products::Column::Price.gte(min_price));
    }
    if let Some(max_price) = criteria.max_price {
        query = query.filter(products::Column::Price.lte(max_price));
    }
    if let Some(is_active) = criteria.is_active {
        query = query.filter(products::Column::IsActive.eq(is_active));
    }
    query
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn create(&self, input: NewProduct) -> ProductResult<Product> {
        // A supplied SKU conflicts; a generated one is simply drawn again
        let attempts = if input.sku.is_some() { 1 } else { MAX_SKU_ATTEMPTS };

        for attempt in 1..=attempts {
            let sku = input.sku.clone().unwrap_or_else(generate_sku);
            let model = products::ActiveModel::from(NewProduct {
                sku: Some(sku.clone()),
                ..input.clone()
            });

            match model.insert(&self.db).await {
                Ok(created) => {
                    tracing::info!(product_id = created.id, sku = %created.sku, "Created product");
                    return Ok(created.into());
                }
                Err(e) if input.sku.is_none() && is_unique_violation(&e) => {
                    tracing::warn!(attempt, sku = %sku, "Generated SKU collided, retrying");
                }
                Err(e) => return Err(map_write_err(e, &sku)),
            }
        }

        Err(ProductError::Internal(
            "Could not generate a unique SKU".to_string(),
        ))
    }

    async fn find_by_id(&self, id: i64) -> ProductResult<Option<Product>> {
        let model = products::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn find_by_sku(&self, sku: &str) -> ProductResult<Option<Product>> {
        let model = products::Entity::find()
            .filter(products::Column::Sku.eq(sku))
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn exists_by_id(&self, id: i64) -> ProductResult<bool> {
        let count = products::Entity::find()
            .filter(products::Column::Id.eq(id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    #[instrument(skip_all, fields(product_id = product.id, version = product.version))]
    async fn update(
        &self,
        mut product: Product,
        price_change: Option<NewPriceHistory>,
    ) -> ProductResult<Product> {
        let txn = self.db.begin().await?;

        if let Some(change) = price_change {
            price_history::ActiveModel::from(change).insert(&txn).await?;
        }

        let result = products::Entity::update_many()
            .set(products::ActiveModel::from(&product))
            .filter(products::Column::Id.eq(product.id))
            .filter(products::Column::Version.eq(product.version))
            .exec(&txn)
            .await
            .map_err(|e| map_write_err(e, &product.sku))?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return if self.exists_by_id(product.id).await? {
                Err(ProductError::ConcurrentModification(product.id))
            } else {
                Err(ProductError::NotFound(product.id))
            };
        }

        txn.commit().await?;
        product.version += 1;

        tracing::info!(product_id = product.id, version = product.version, "Updated product");
        Ok(product)
    }

    async fn delete_by_id(&self, id: i64) -> ProductResult<bool> {
        // price_history rows go with the product (ON DELETE CASCADE)
        let result = products::Entity::delete_by_id(id).exec(&self.db).await?;

        if result.rows_affected > 0 {
            tracing::info!(product_id = id, "Deleted product");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn find_all(&self) -> ProductResult<Vec<Product>> {
        let models = products::Entity::find()
            .order_by_asc(products::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn search(&self, criteria: &ProductSearch) -> ProductResult<ProductPage> {
        let order = match criteria.direction()? {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };
        let (page, size) = (criteria.page(), criteria.size());

        let query = apply_criteria(products::Entity::find(), criteria)
            .order_by(sort_column(criteria.sort_field()?), order)
            .order_by_asc(products::Column::Id);

        let paginator = query.paginate(&self.db, size);
        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page).await?;

        Ok(ProductPage::new(
            models.into_iter().map(Into::into).collect(),
            page,
            size,
            total,
        ))
    }

    async fn find_by_category(&self, category: &str) -> ProductResult<Vec<Product>> {
        let models = products::Entity::find()
            .filter(products::Column::Category.eq(category))
            .order_by_asc(products::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn find_active(&self) -> ProductResult<Vec<Product>> {
        let models = products::Entity::find()
            .filter(products::Column::IsActive.eq(true))
            .order_by_asc(products::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn find_low_stock(&self, threshold: i32) -> ProductResult<Vec<Product>> {
        let models = products::Entity::find()
            .filter(products::Column::StockQuantity.lt(threshold))
            .order_by_asc(products::Column::StockQuantity)
            .order_by_asc(products::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn find_recent(&self, limit: u64) -> ProductResult<Vec<Product>> {
        let models = products::Entity::find()
            .order_by_desc(products::Column::CreatedAt)
            .order_by_desc(products::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> ProductResult<u64> {
        Ok(products::Entity::find().count(&self.db).await?)
    }

    async fn count_active(&self) -> ProductResult<u64> {
        let count = products::Entity::find()
            .filter(products::Column::IsActive.eq(true))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn count_low_stock(&self, threshold: i32) -> ProductResult<u64> {
        let count = products::Entity::find()
            .filter(products::Column::StockQuantity.lt(threshold))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn count_by_category(&self) -> ProductResult<Vec<CategoryCount>> {
        let rows = products::Entity::find()
            .select_only()
            .column(products::Column::Category)
            .column_as(products::Column::Id.count(), "count")
            .group_by(products::Column::Category)
            .order_by_asc(products::Column::Category)
            .into_model::<CategoryCountRow>()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryCount {
                category: row.category,
                count: row.count as u64,
            })
            .collect())
    }

    async fn price_statistics(&self) -> ProductResult<PriceStatistics> {
        let row = products::Entity::find()
            .select_only()
            .column_as(products::Column::Id.count(), "count")
            .column_as(products::Column::Price.min(), "min")
            .column_as(products::Column::Price.max(), "max")
            .column_as(products::Column::Price.sum(), "sum")
            .into_model::<PriceAggregateRow>()
            .one(&self.db)
            .await?;

        let Some(row) = row.filter(|r| r.count > 0) else {
            return Ok(PriceStatistics::default());
        };

        let count = row.count as u64;
        let average = row
            .sum
            .map(|sum| (sum / Decimal::from(count)).round_dp(2));

        Ok(PriceStatistics {
            count,
            min: row.min,
            max: row.max,
            average,
        })
    }

    async fn price_bucket_counts(&self) -> ProductResult<PriceBucketCounts> {
        let fifty = Decimal::from(50);
        let hundred = Decimal::ONE_HUNDRED;
        let five_hundred = Decimal::from(500);
        let price = products::Column::Price;

        let under_50 = products::Entity::find()
            .filter(price.lt(fifty))
            .count(&self.db)
            .await?;
        let from_50_to_100 = products::Entity::find()
            .filter(price.gte(fifty))
            .filter(price.lt(hundred))
            .count(&self.db)
            .await?;
        let from_100_to_500 = products::Entity::find()
            .filter(price.gte(hundred))
            .filter(price.lt(five_hundred))
            .count(&self.db)
            .await?;
        let over_500 = products::Entity::find()
            .filter(price.gte(five_hundred))
            .count(&self.db)
            .await?;

        Ok(PriceBucketCounts {
            under_50,
            from_50_to_100,
            from_100_to_500,
            over_500,
        })
    }

    async fn price_history(&self, product_id: i64) -> ProductResult<Vec<PriceHistory>> {
        let models = price_history::Entity::find()
            .filter(price_history::Column::ProductId.eq(product_id))
            .order_by_desc(price_history::Column::ChangedAt)
            .order_by_desc(price_history::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn widget_model(id: i64, version: i32) -> products::Model {
        let now = Utc::now();
        products::Model {
            id,
            name: "Widget".to_string(),
            description: None,
            price: Decimal::new(1000, 2),
            category: "Tools".to_string(),
            stock_quantity: 5,
            sku: "SKU-ABC123".to_string(),
            is_active: true,
            version,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("Wid"), "%wid%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }

    #[tokio::test]
    async fn test_find_by_id_maps_model() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![widget_model(7, 3)]])
            .into_connection();
        let repo = PgProductRepository::new(db);

        let product = repo.find_by_id(7).await.unwrap().unwrap();

        assert_eq!(product.id, 7);
        assert_eq!(product.version, 3);
        assert_eq!(product.price, Decimal::new(1000, 2));
        assert_eq!(product.sku, "SKU-ABC123");
    }

    #[tokio::test]
    async fn test_create_returns_inserted_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![widget_model(1, 1)]])
            .into_connection();
        let repo = PgProductRepository::new(db);

        let product = repo
            .create(NewProduct {
                name: "Widget".to_string(),
                description: None,
                price: Decimal::new(1000, 2),
                category: "Tools".to_string(),
                stock_quantity: 5,
                sku: Some("SKU-ABC123".to_string()),
                is_active: true,
            })
            .await
            .unwrap();

        assert_eq!(product.id, 1);
        assert_eq!(product.version, 1);
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let repo = PgProductRepository::new(db);

        let product: Product = widget_model(4, 2).into();
        let updated = repo.update(product, None).await.unwrap();

        assert_eq!(updated.version, 3);
    }

    #[tokio::test]
    async fn test_update_with_stale_version_is_conflict() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![std::collections::BTreeMap::from([(
                "num_items".to_string(),
                sea_orm::Value::BigInt(Some(1)),
            )])]])
            .into_connection();
        let repo = PgProductRepository::new(db);

        let product: Product = widget_model(4, 1).into();
        let result = repo.update(product, None).await;

        assert!(matches!(
            result,
            Err(ProductError::ConcurrentModification(4))
        ));
    }
}
