use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::{ProductError, ProductResult};

pub const DEFAULT_CATEGORY: &str = "Uncategorized";
pub const DEFAULT_CHANGE_REASON: &str = "Product update";
pub const LOW_STOCK_THRESHOLD: i32 = 10;
pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;
/// Highest page whose offset still fits a signed 64-bit SQL OFFSET
pub const MAX_PAGE: u64 = i64::MAX as u64 / MAX_PAGE_SIZE;

static SKU_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SKU-[A-Z0-9-]{6,}$").unwrap());

fn validate_sku(sku: &str) -> Result<(), ValidationError> {
    if !SKU_PATTERN.is_match(sku) {
        return Err(ValidationError::new("invalid_sku")
            .with_message("SKU must match SKU-XXXXXX (uppercase letters, digits, hyphens)".into()));
    }
    Ok(())
}

/// Positive with at most two fraction digits
fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() || price.is_zero() {
        return Err(ValidationError::new("price_not_positive")
            .with_message("Price must be greater than 0".into()));
    }
    if price.normalize().scale() > 2 {
        return Err(ValidationError::new("price_precision")
            .with_message("Price must have at most 2 decimal places".into()));
    }
    Ok(())
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("must not be blank".into()));
    }
    Ok(())
}

/// `SKU-<epoch millis>-<12 hex>`, used when a product is created without one.
///
/// The suffix carries 48 random bits. Store adapters still check the result
/// against existing SKUs and regenerate on a collision.
pub fn generate_sku() -> String {
    let random = Uuid::new_v4().as_u128() & 0xFFFF_FFFF_FFFF;
    format!("SKU-{}-{:012X}", Utc::now().timestamp_millis(), random)
}

/// Attempts at a fresh generated SKU before a create gives up
pub const MAX_SKU_ATTEMPTS: usize = 5;

/// Catalog product as stored and returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    /// Store-assigned identifier
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,
    pub category: String,
    pub stock_quantity: i32,
    /// Unique Stock Keeping Unit
    pub sku: String,
    pub is_active: bool,
    /// Optimistic concurrency token, bumped on every write
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DTO for creating a new product
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_price"))]
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    #[validate(custom(function = "validate_sku"))]
    pub sku: Option<String>,
    pub is_active: Option<bool>,
}

/// DTO for updating an existing product.
///
/// Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProduct {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_price"))]
    #[schema(value_type = Option<String>, example = "24.99")]
    pub price: Option<Decimal>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    #[validate(custom(function = "validate_sku"))]
    pub sku: Option<String>,
    pub is_active: Option<bool>,
    /// Recorded on the price history row when the price changes
    #[validate(length(max = 255))]
    pub change_reason: Option<String>,
    #[validate(length(max = 100))]
    pub changed_by: Option<String>,
}

/// Store-adapter input for an insert, defaults already applied
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category: String,
    pub stock_quantity: i32,
    /// Generated by the store adapter when `None`
    pub sku: Option<String>,
    pub is_active: bool,
}

impl From<CreateProduct> for NewProduct {
    fn from(input: CreateProduct) -> Self {
        let category = input
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        Self {
            name: input.name.trim().to_string(),
            description: input.description,
            price: input.price,
            category,
            stock_quantity: input.stock_quantity.unwrap_or(0),
            sku: input.sku,
            is_active: input.is_active.unwrap_or(true),
        }
    }
}

impl NewProduct {
    /// Materialize with a store-assigned id
    pub fn into_product(self, id: i64) -> Product {
        let now = Utc::now();
        Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            category: self.category,
            stock_quantity: self.stock_quantity,
            sku: self.sku.unwrap_or_else(generate_sku),
            is_active: self.is_active,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Product {
    /// Apply the fields present in `update`.
    ///
    /// Returns the history entry to record when the price actually changed.
    pub fn apply_update(&mut self, update: UpdateProduct) -> Option<NewPriceHistory> {
        let price_change = update
            .price
            .filter(|new_price| *new_price != self.price)
            .map(|new_price| NewPriceHistory {
                product_id: self.id,
                old_price: self.price,
                new_price,
                change_reason: Some(
                    update
                        .change_reason
                        .unwrap_or_else(|| DEFAULT_CHANGE_REASON.to_string()),
                ),
                changed_by: update.changed_by,
            });

        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(category) = update.category {
            let category = category.trim();
            self.category = if category.is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                category.to_string()
            };
        }
        if let Some(stock_quantity) = update.stock_quantity {
            self.stock_quantity = stock_quantity;
        }
        if let Some(sku) = update.sku {
            self.sku = sku;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        self.updated_at = Utc::now();

        price_change
    }

    /// Apply a stock delta or fail without touching the product
    pub fn adjust_stock(&mut self, quantity: i32, operation: StockOperation) -> ProductResult<()> {
        let new_stock = match operation {
            StockOperation::Increase => self
                .stock_quantity
                .checked_add(quantity)
                .ok_or_else(|| {
                    ProductError::InvalidArgument("Stock quantity overflow".to_string())
                })?,
            StockOperation::Decrease => {
                if quantity > self.stock_quantity {
                    return Err(ProductError::InsufficientStock {
                        available: self.stock_quantity,
                        requested: quantity,
                    });
                }
                self.stock_quantity - quantity
            }
        };

        self.stock_quantity = new_stock;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Direction of a stock adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum StockOperation {
    Increase,
    Decrease,
}

/// Query parameters for `PUT /{id}/stock`
#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
pub struct StockUpdateQuery {
    /// Non-negative amount to add or remove
    pub quantity: i32,
    /// INCREASE or DECREASE, case-insensitive
    pub operation: String,
}

/// Immutable ledger entry written on every price change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceHistory {
    pub id: i64,
    pub product_id: i64,
    #[schema(value_type = String)]
    pub old_price: Decimal,
    #[schema(value_type = String)]
    pub new_price: Decimal,
    pub change_reason: Option<String>,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPriceHistory {
    pub product_id: i64,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub change_reason: Option<String>,
    pub changed_by: Option<String>,
}

impl NewPriceHistory {
    pub fn into_entry(self, id: i64) -> PriceHistory {
        PriceHistory {
            id,
            product_id: self.product_id,
            old_price: self.old_price,
            new_price: self.new_price,
            change_reason: self.change_reason,
            changed_at: Utc::now(),
            changed_by: self.changed_by,
        }
    }
}

/// Sortable product columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortField {
    #[default]
    Name,
    Price,
    Category,
    #[strum(serialize = "stock_quantity", serialize = "stockQuantity")]
    StockQuantity,
    #[strum(serialize = "created_at", serialize = "createdAt")]
    CreatedAt,
    #[strum(serialize = "updated_at", serialize = "updatedAt")]
    UpdatedAt,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Search criteria for `GET /search`
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductSearch {
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    /// Case-insensitive substring of the description
    pub description: Option<String>,
    /// Exact category
    pub category: Option<String>,
    #[param(value_type = Option<String>)]
    #[schema(value_type = Option<String>)]
    pub min_price: Option<Decimal>,
    #[param(value_type = Option<String>)]
    #[schema(value_type = Option<String>)]
    pub max_price: Option<Decimal>,
    pub is_active: Option<bool>,
    /// name (default), price, category, stock_quantity, created_at, updated_at, id
    pub sort_by: Option<String>,
    /// asc (default) or desc
    pub sort_direction: Option<String>,
    /// Zero-based page number
    pub page: Option<u64>,
    /// Page size, clamped to 1..=100
    pub size: Option<u64>,
}

impl ProductSearch {
    pub fn sort_field(&self) -> ProductResult<SortField> {
        match self.sort_by.as_deref() {
            None | Some("") => Ok(SortField::default()),
            Some(raw) => raw
                .parse()
                .map_err(|_| ProductError::InvalidArgument(format!("Unknown sort field: {raw}"))),
        }
    }

    pub fn direction(&self) -> ProductResult<SortDirection> {
        match self.sort_direction.as_deref() {
            None | Some("") => Ok(SortDirection::default()),
            Some(raw) => raw.parse().map_err(|_| {
                ProductError::InvalidArgument(format!("Unknown sort direction: {raw}"))
            }),
        }
    }

    /// Zero-based page, capped so `page * size` cannot overflow
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(0).min(MAX_PAGE)
    }

    pub fn size(&self) -> u64 {
        self.size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// In-process filter, mirrors the SQL predicate of the Postgres adapter
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            if !product.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            let found = product
                .description
                .as_deref()
                .is_some_and(|text| text.to_lowercase().contains(&description.to_lowercase()));
            if !found {
                return false;
            }
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            if product.category != category {
                return false;
            }
        }
        if let Some(min_price) = self.min_price {
            if product.price < min_price {
                return false;
            }
        }
        if let Some(max_price) = self.max_price {
            if product.price > max_price {
                return false;
            }
        }
        if let Some(is_active) = self.is_active {
            if product.is_active != is_active {
                return false;
            }
        }
        true
    }
}

/// One page of search results
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductPage {
    pub content: Vec<Product>,
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl ProductPage {
    pub fn new(content: Vec<Product>, page: u64, size: u64, total_elements: u64) -> Self {
        Self {
            content,
            page,
            size,
            total_elements,
            total_pages: total_elements.div_ceil(size.max(1)),
        }
    }
}

/// Aggregate price figures across all products
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceStatistics {
    pub count: u64,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub average: Option<Decimal>,
}

/// Product counts per fixed price range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceBucketCounts {
    /// [0, 50)
    pub under_50: u64,
    /// [50, 100)
    pub from_50_to_100: u64,
    /// [100, 500)
    pub from_100_to_500: u64,
    /// [500, ∞)
    pub over_500: u64,
}

impl PriceBucketCounts {
    pub fn record(&mut self, price: Decimal) {
        if price < Decimal::from(50) {
            self.under_50 += 1;
        } else if price < Decimal::ONE_HUNDRED {
            self.from_50_to_100 += 1;
        } else if price < Decimal::from(500) {
            self.from_100_to_500 += 1;
        } else {
            self.over_500 += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// Response of `GET /statistics`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductStatistics {
    pub total_products: u64,
    pub active_products: u64,
    /// Products with stock below the low-stock threshold
    pub low_stock_products: u64,
    pub price_ranges: PriceBucketCounts,
    #[schema(value_type = Option<String>)]
    pub min_price: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub max_price: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub average_price: Option<Decimal>,
    pub category_counts: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkDeleteRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BulkDeleteResult {
    pub deleted: Vec<i64>,
    pub not_found: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct LowStockQuery {
    /// Defaults to 10
    pub threshold: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct RecentQuery {
    /// Defaults to 5, clamped to 1..=100
    pub limit: Option<u64>,
}
