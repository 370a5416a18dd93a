//! Handler tests for Products domain
//!
//! These tests drive the products router end to end over the in-memory
//! repository:
//! - Request deserialization (JSON and query strings)
//! - Response serialization and status codes
//! - Error bodies
//!
//! No database, Redis or NATS is needed.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain_products::events::NoopEventPublisher;
use domain_products::models::{BulkDeleteResult, CategoryCount};
use domain_products::*;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For oneshot()

// Helper to parse JSON response body
async fn json_body<T: serde::de::DeserializeOwned>(body: Body) -> T {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn app() -> Router {
    let service = ProductService::new(
        InMemoryProductRepository::new(),
        ProductCache::in_memory(CacheConfig::default()),
        Arc::new(NoopEventPublisher),
        "products",
    );
    handlers::router(service)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn create(app: &Router, body: Value) -> Product {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response.into_body()).await
}

#[tokio::test]
async fn test_create_product_handler_returns_201_with_defaults() {
    let app = app();

    let product = create(&app, json!({ "name": "Widget", "price": "10.00" })).await;

    assert!(product.id > 0);
    assert_eq!(product.category, "Uncategorized");
    assert_eq!(product.stock_quantity, 0);
    assert!(product.is_active);
    assert!(product.sku.starts_with("SKU-"));
}

#[tokio::test]
async fn test_create_product_handler_validates_input() {
    let app = app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/",
            json!({ "name": "", "price": "10.001" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: Value = json_body(response.into_body()).await;
    assert_eq!(error["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_create_duplicate_sku_returns_409() {
    let app = app();
    create(
        &app,
        json!({ "name": "Widget", "price": "10.00", "sku": "SKU-ABC123" }),
    )
    .await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/",
            json!({ "name": "Other", "price": "5.00", "sku": "SKU-ABC123" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);

    let list = app.oneshot(empty_request("GET", "/")).await.unwrap();
    let products: Vec<Product> = json_body(list.into_body()).await;
    assert_eq!(products.len(), 1);
}

#[tokio::test]
async fn test_get_missing_product_returns_404() {
    let response = app().oneshot(empty_request("GET", "/999")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: Value = json_body(response.into_body()).await;
    assert_eq!(error["code"], 1004);
}

#[tokio::test]
async fn test_update_price_records_history() {
    let app = app();
    let product = create(&app, json!({ "name": "Widget", "price": "10.00" })).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/{}", product.id),
            json!({ "price": "12.50", "changed_by": "ops" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Product = json_body(response.into_body()).await;
    assert_eq!(updated.price, Decimal::new(1250, 2));
    assert_eq!(updated.name, "Widget");

    let response = app
        .oneshot(empty_request(
            "GET",
            &format!("/{}/price-history", product.id),
        ))
        .await
        .unwrap();
    let history: Vec<PriceHistory> = json_body(response.into_body()).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_price, Decimal::new(1000, 2));
    assert_eq!(history[0].new_price, Decimal::new(1250, 2));
    assert_eq!(history[0].changed_by.as_deref(), Some("ops"));
}

#[tokio::test]
async fn test_stock_update_round_trip() {
    let app = app();
    let product = create(
        &app,
        json!({ "name": "Widget", "price": "10.00", "stock_quantity": 5 }),
    )
    .await;

    let response = app
        .clone()
        .oneshot(empty_request(
            "PUT",
            &format!("/{}/stock?quantity=3&operation=increase", product.id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stocked: Product = json_body(response.into_body()).await;
    assert_eq!(stocked.stock_quantity, 8);

    let response = app
        .oneshot(empty_request(
            "PUT",
            &format!("/{}/stock?quantity=3&operation=DECREASE", product.id),
        ))
        .await
        .unwrap();
    let restored: Product = json_body(response.into_body()).await;
    assert_eq!(restored.stock_quantity, 5);
}

#[tokio::test]
async fn test_stock_decrease_below_zero_returns_400() {
    let app = app();
    let product = create(
        &app,
        json!({ "name": "Widget", "price": "10.00", "stock_quantity": 2 }),
    )
    .await;

    let response = app
        .clone()
        .oneshot(empty_request(
            "PUT",
            &format!("/{}/stock?quantity=3&operation=DECREASE", product.id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: Value = json_body(response.into_body()).await;
    assert_eq!(error["error"], "INSUFFICIENT_STOCK");

    let response = app
        .oneshot(empty_request("GET", &format!("/{}", product.id)))
        .await
        .unwrap();
    let unchanged: Product = json_body(response.into_body()).await;
    assert_eq!(unchanged.stock_quantity, 2);
}

#[tokio::test]
async fn test_search_sorts_and_pages() {
    let app = app();
    for (name, price) in [("Gamma", "30.00"), ("Alpha", "10.00"), ("Beta", "20.00")] {
        create(&app, json!({ "name": name, "price": price })).await;
    }

    let response = app
        .clone()
        .oneshot(empty_request(
            "GET",
            "/search?sort_by=price&sort_direction=desc&page=0&size=2",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page: ProductPage = json_body(response.into_body()).await;

    assert_eq!(page.total_elements, 3);
    assert_eq!(page.total_pages, 2);
    let names: Vec<_> = page.content.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Gamma", "Beta"]);

    let response = app
        .oneshot(empty_request("GET", "/search?sort_by=colour"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_statistics_and_category_counts() {
    let app = app();
    create(
        &app,
        json!({ "name": "Hammer", "price": "25.00", "category": "Tools", "stock_quantity": 3 }),
    )
    .await;
    create(
        &app,
        json!({ "name": "Drill", "price": "150.00", "category": "Tools", "stock_quantity": 40 }),
    )
    .await;
    create(
        &app,
        json!({ "name": "Sofa", "price": "900.00", "category": "Furniture", "stock_quantity": 1, "is_active": false }),
    )
    .await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/statistics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats: ProductStatistics = json_body(response.into_body()).await;
    assert_eq!(stats.total_products, 3);
    assert_eq!(stats.active_products, 2);
    assert_eq!(stats.low_stock_products, 2);
    assert_eq!(stats.price_ranges.under_50, 1);
    assert_eq!(stats.price_ranges.from_100_to_500, 1);
    assert_eq!(stats.price_ranges.over_500, 1);

    let response = app
        .oneshot(empty_request("GET", "/category-counts"))
        .await
        .unwrap();
    let counts: Vec<CategoryCount> = json_body(response.into_body()).await;
    let tools = counts.iter().find(|c| c.category == "Tools").unwrap();
    assert_eq!(tools.count, 2);
}

#[tokio::test]
async fn test_delete_then_get_returns_404() {
    let app = app();
    let product = create(&app, json!({ "name": "Widget", "price": "10.00" })).await;

    // Warm the cache first
    app.clone()
        .oneshot(empty_request("GET", &format!("/{}", product.id)))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/{}", product.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(empty_request("GET", &format!("/{}", product.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_delete_reports_missing_ids() {
    let app = app();
    let product = create(&app, json!({ "name": "Widget", "price": "10.00" })).await;

    let response = app
        .oneshot(json_request(
            "DELETE",
            "/bulk",
            json!({ "ids": [product.id, 404] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result: BulkDeleteResult = json_body(response.into_body()).await;
    assert_eq!(result.deleted, vec![product.id]);
    assert_eq!(result.not_found, vec![404]);
}

#[tokio::test]
async fn test_lookup_by_sku() {
    let app = app();
    create(
        &app,
        json!({ "name": "Widget", "price": "10.00", "sku": "SKU-LOOKUP1" }),
    )
    .await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/sku/SKU-LOOKUP1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let product: Product = json_body(response.into_body()).await;
    assert_eq!(product.name, "Widget");

    let response = app
        .oneshot(empty_request("GET", "/sku/SKU-MISSING"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_search_by_description_and_huge_page() {
    let app = app();
    create(
        &app,
        json!({ "name": "Drill", "price": "99.00", "description": "Cordless drill" }),
    )
    .await;
    create(&app, json!({ "name": "Hammer", "price": "15.00" })).await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/search?description=CORDLESS"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page: ProductPage = json_body(response.into_body()).await;
    let names: Vec<_> = page.content.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Drill"]);

    let response = app
        .oneshot(empty_request(
            "GET",
            "/search?page=9223372036854775807&size=100",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page: ProductPage = json_body(response.into_body()).await;
    assert!(page.content.is_empty());
    assert_eq!(page.total_elements, 2);
}

#[test]
fn test_sku_lookup_404_is_documented_without_body() {
    use utoipa::OpenApi;

    let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
    let not_found = &doc["paths"]["/sku/{sku}"]["get"]["responses"]["404"];
    assert!(not_found.is_object());
    assert!(not_found.get("content").is_none());

    let by_id = &doc["paths"]["/{id}"]["get"]["responses"]["404"];
    assert!(by_id.get("content").is_some());
}
