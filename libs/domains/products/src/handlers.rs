//! HTTP handlers for Products API

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, put},
};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::error::{ErrorResponse, ProductError, ProductResult};
use crate::models::{
    BulkDeleteRequest, BulkDeleteResult, CategoryCount, CreateProduct, LOW_STOCK_THRESHOLD,
    LowStockQuery, PriceBucketCounts, PriceHistory, Product, ProductPage, ProductSearch,
    ProductStatistics, RecentQuery, StockOperation, StockUpdateQuery, UpdateProduct,
};
use crate::repository::ProductRepository;
use crate::service::{DEFAULT_RECENT_LIMIT, ProductService};

/// OpenAPI documentation for Products API
#[derive(OpenApi)]
#[openapi(
    paths(
        list_products,
        create_product,
        get_product,
        update_product,
        delete_product,
        search_products,
        get_statistics,
        get_active_products,
        get_low_stock,
        get_category_counts,
        get_recent_products,
        get_by_category,
        get_by_sku,
        bulk_delete,
        update_stock,
        get_price_history,
    ),
    components(
        schemas(
            Product, CreateProduct, UpdateProduct, ProductPage, ProductStatistics,
            PriceBucketCounts, CategoryCount, PriceHistory, StockOperation,
            BulkDeleteRequest, BulkDeleteResult, ErrorResponse
        )
    ),
    tags(
        (name = "Products", description = "Product catalog endpoints")
    )
)]
pub struct ApiDoc;

/// Create the products router with all HTTP endpoints
pub fn router<R: ProductRepository + 'static>(service: ProductService<R>) -> Router {
    let shared_service = Arc::new(service);

    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/search", get(search_products))
        .route("/statistics", get(get_statistics))
        .route("/active", get(get_active_products))
        .route("/low-stock", get(get_low_stock))
        .route("/category-counts", get(get_category_counts))
        .route("/recent", get(get_recent_products))
        .route("/category/{category}", get(get_by_category))
        .route("/sku/{sku}", get(get_by_sku))
        .route("/bulk", delete(bulk_delete))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/{id}/stock", put(update_stock))
        .route("/{id}/price-history", get(get_price_history))
        .with_state(shared_service)
}

/// List all products
#[utoipa::path(
    get,
    path = "",
    tag = "Products",
    responses(
        (status = 200, description = "List of products", body = Vec<Product>),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn list_products<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
) -> ProductResult<Json<Vec<Product>>> {
    let products = service.list_products().await?;
    Ok(Json(products))
}

/// Create a new product
#[utoipa::path(
    post,
    path = "",
    tag = "Products",
    request_body = CreateProduct,
    responses(
        (status = 201, description = "Product created successfully", body = Product),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 409, description = "SKU already in use", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn create_product<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Json(input): Json<CreateProduct>,
) -> ProductResult<impl IntoResponse> {
    let product = service.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Get a product by ID
#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Products",
    params(
        ("id" = i64, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product found", body = Product),
        (status = 404, description = "Product not found", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn get_product<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Path(id): Path<i64>,
) -> ProductResult<Json<Product>> {
    let product = service
        .get_product(id)
        .await?
        .ok_or(ProductError::NotFound(id))?;
    Ok(Json(product))
}

/// Partially update a product
#[utoipa::path(
    put,
    path = "/{id}",
    tag = "Products",
    params(
        ("id" = i64, Path, description = "Product ID")
    ),
    request_body = UpdateProduct,
    responses(
        (status = 200, description = "Product updated successfully", body = Product),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse),
        (status = 409, description = "SKU in use or concurrent modification", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn update_product<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateProduct>,
) -> ProductResult<Json<Product>> {
    let product = service.update_product(id, input).await?;
    Ok(Json(product))
}

/// Delete a product
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Products",
    params(
        ("id" = i64, Path, description = "Product ID")
    ),
    responses(
        (status = 204, description = "Product deleted successfully"),
        (status = 404, description = "Product not found", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn delete_product<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Path(id): Path<i64>,
) -> ProductResult<StatusCode> {
    service.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Search with filters, sorting and pagination
#[utoipa::path(
    get,
    path = "/search",
    tag = "Products",
    params(ProductSearch),
    responses(
        (status = 200, description = "One page of matching products", body = ProductPage),
        (status = 400, description = "Unknown sort field or direction", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn search_products<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Query(criteria): Query<ProductSearch>,
) -> ProductResult<Json<ProductPage>> {
    let page = service.search_products(criteria).await?;
    Ok(Json(page))
}

/// Catalog-wide statistics
#[utoipa::path(
    get,
    path = "/statistics",
    tag = "Products",
    responses(
        (status = 200, description = "Aggregated statistics", body = ProductStatistics),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn get_statistics<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
) -> ProductResult<Json<ProductStatistics>> {
    let statistics = service.get_statistics().await?;
    Ok(Json(statistics))
}

/// Active products only
#[utoipa::path(
    get,
    path = "/active",
    tag = "Products",
    responses(
        (status = 200, description = "Active products", body = Vec<Product>),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn get_active_products<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
) -> ProductResult<Json<Vec<Product>>> {
    let products = service.get_active_products().await?;
    Ok(Json(products))
}

/// Products with stock below the threshold
#[utoipa::path(
    get,
    path = "/low-stock",
    tag = "Products",
    params(LowStockQuery),
    responses(
        (status = 200, description = "Low stock products", body = Vec<Product>),
        (status = 400, description = "Negative threshold", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn get_low_stock<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Query(query): Query<LowStockQuery>,
) -> ProductResult<Json<Vec<Product>>> {
    let threshold = query.threshold.unwrap_or(LOW_STOCK_THRESHOLD);
    let products = service.get_low_stock_products(threshold).await?;
    Ok(Json(products))
}

/// Product count per category
#[utoipa::path(
    get,
    path = "/category-counts",
    tag = "Products",
    responses(
        (status = 200, description = "Counts per category", body = Vec<CategoryCount>),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn get_category_counts<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
) -> ProductResult<Json<Vec<CategoryCount>>> {
    let counts = service.get_category_counts().await?;
    Ok(Json(counts))
}

/// Most recently created products
#[utoipa::path(
    get,
    path = "/recent",
    tag = "Products",
    params(RecentQuery),
    responses(
        (status = 200, description = "Newest products first", body = Vec<Product>),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn get_recent_products<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Query(query): Query<RecentQuery>,
) -> ProductResult<Json<Vec<Product>>> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let products = service.get_recent_products(limit).await?;
    Ok(Json(products))
}

/// Products in a category
#[utoipa::path(
    get,
    path = "/category/{category}",
    tag = "Products",
    params(
        ("category" = String, Path, description = "Exact category name")
    ),
    responses(
        (status = 200, description = "Products in the category", body = Vec<Product>),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn get_by_category<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Path(category): Path<String>,
) -> ProductResult<Json<Vec<Product>>> {
    let products = service.get_products_by_category(&category).await?;
    Ok(Json(products))
}

/// Get a product by SKU
#[utoipa::path(
    get,
    path = "/sku/{sku}",
    tag = "Products",
    params(
        ("sku" = String, Path, description = "Stock keeping unit")
    ),
    responses(
        (status = 200, description = "Product found", body = Product),
        (status = 404, description = "No product with this SKU, empty body"),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn get_by_sku<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Path(sku): Path<String>,
) -> ProductResult<Response> {
    match service.get_by_sku(&sku).await? {
        Some(product) => Ok(Json(product).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// Delete several products at once
#[utoipa::path(
    delete,
    path = "/bulk",
    tag = "Products",
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Deleted and missing ids", body = BulkDeleteResult),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn bulk_delete<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Json(request): Json<BulkDeleteRequest>,
) -> ProductResult<Json<BulkDeleteResult>> {
    let result = service.bulk_delete(request.ids).await?;
    Ok(Json(result))
}

/// Increase or decrease stock
#[utoipa::path(
    put,
    path = "/{id}/stock",
    tag = "Products",
    params(
        ("id" = i64, Path, description = "Product ID"),
        StockUpdateQuery
    ),
    responses(
        (status = 200, description = "Stock updated", body = Product),
        (status = 400, description = "Bad operation or insufficient stock", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse),
        (status = 409, description = "Concurrent modification", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn update_stock<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Path(id): Path<i64>,
    Query(query): Query<StockUpdateQuery>,
) -> ProductResult<Json<Product>> {
    let product = service
        .update_stock(id, query.quantity, &query.operation)
        .await?;
    Ok(Json(product))
}

/// Price change history, newest first
#[utoipa::path(
    get,
    path = "/{id}/price-history",
    tag = "Products",
    params(
        ("id" = i64, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Price changes", body = Vec<PriceHistory>),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn get_price_history<R: ProductRepository>(
    State(service): State<Arc<ProductService<R>>>,
    Path(id): Path<i64>,
) -> ProductResult<Json<Vec<PriceHistory>>> {
    let history = service.get_price_history(id).await?;
    Ok(Json(history))
}
