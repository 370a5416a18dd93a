use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use domain_products::{ApiDoc, ProductCache, ProductRepository, ProductService, handlers};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;

#[derive(Clone)]
struct HealthState {
    db: DatabaseConnection,
    cache: ProductCache,
}

#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    database: bool,
    cache_backend: &'static str,
}

/// Compose the product API with health and documentation endpoints
pub fn build_router<R: ProductRepository + 'static>(
    service: ProductService<R>,
    db: DatabaseConnection,
) -> Router {
    let health_state = HealthState {
        db,
        cache: service.cache().clone(),
    };

    let health = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(health_state);

    Router::new()
        .nest("/api/products", handlers::router(service))
        .route("/api-docs/openapi.json", get(openapi))
        .merge(health)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn health(State(state): State<HealthState>) -> Json<Value> {
    let stats = state.cache.stats();
    Json(json!({
        "status": "healthy",
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "cache": {
            "backend": state.cache.backend_name(),
            "hits": stats.hits,
            "misses": stats.misses,
        },
    }))
}

async fn ready(State(state): State<HealthState>) -> (StatusCode, Json<ReadyResponse>) {
    let database = match state.db.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database ping failed");
            false
        }
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready: database,
            database,
            cache_backend: state.cache.backend_name(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use domain_products::events::NoopEventPublisher;
    use domain_products::{CacheConfig, InMemoryProductRepository};
    use http_body_util::BodyExt;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let service = ProductService::new(
            InMemoryProductRepository::new(),
            ProductCache::in_memory(CacheConfig::default()),
            Arc::new(NoopEventPublisher),
            "products",
        );
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        build_router(service, db)
    }

    async fn json_body(body: Body) -> Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_cache_backend() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response.into_body()).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["cache"]["backend"], "in-memory");
    }

    #[tokio::test]
    async fn test_openapi_document_lists_product_paths() {
        let response = app()
            .oneshot(
                Request::get("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response.into_body()).await;
        assert!(body["paths"].get("/{id}/stock").is_some());
    }

    #[tokio::test]
    async fn test_products_are_nested_under_api() {
        let response = app()
            .oneshot(
                Request::get("/api/products")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response.into_body()).await, json!([]));
    }
}
