use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("Product not found: {0}")]
    NotFound(i64),

    #[error("Product with SKU '{0}' already exists")]
    DuplicateSku(String),

    #[error("Product {0} was modified concurrently")]
    ConcurrentModification(i64),

    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i32, requested: i32 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ProductResult<T> = Result<T, ProductError>;

/// Error body returned by every product endpoint.
///
/// ```json
/// { "code": 1007, "error": "CONFLICT", "message": "Product with SKU 'SKU-ABC123' already exists" }
/// ```
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Integer code for logging and monitoring
    pub code: i32,
    /// Machine-readable identifier
    pub error: String,
    /// Human-readable message
    pub message: String,
}

impl ProductError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProductError::NotFound(_) => StatusCode::NOT_FOUND,
            ProductError::DuplicateSku(_) | ProductError::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            ProductError::InsufficientStock { .. }
            | ProductError::InvalidArgument(_)
            | ProductError::Validation(_) => StatusCode::BAD_REQUEST,
            ProductError::Database(_) | ProductError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> (i32, &'static str) {
        match self {
            ProductError::Validation(_) => (1001, "VALIDATION_ERROR"),
            ProductError::InvalidArgument(_) => (1002, "INVALID_ARGUMENT"),
            ProductError::NotFound(_) => (1004, "NOT_FOUND"),
            ProductError::DuplicateSku(_) => (1007, "CONFLICT"),
            ProductError::ConcurrentModification(_) => (1008, "CONCURRENT_MODIFICATION"),
            ProductError::InsufficientStock { .. } => (1009, "INSUFFICIENT_STOCK"),
            ProductError::Internal(_) => (1010, "INTERNAL_ERROR"),
            ProductError::Database(_) => (2003, "DATABASE_ERROR"),
        }
    }
}

impl IntoResponse for ProductError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, error) = self.code();

        // Store details stay in the logs
        let message = if status.is_server_error() {
            tracing::error!(error_code = code, error = %self, "Request failed");
            "An internal error occurred".to_string()
        } else {
            tracing::debug!(error_code = code, error = %self, "Request rejected");
            self.to_string()
        };

        let body = ErrorResponse {
            code,
            error: error.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

/// Plain store failure. SKU writes translate unique violations themselves,
/// since only they know which SKU conflicted.
impl From<DbErr> for ProductError {
    fn from(err: DbErr) -> Self {
        ProductError::Database(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ProductError {
    fn from(err: validator::ValidationErrors) -> Self {
        ProductError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProductError::NotFound(1).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ProductError::DuplicateSku("SKU-ABC123".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ProductError::ConcurrentModification(1).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ProductError::InsufficientStock {
                available: 2,
                requested: 3
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProductError::Database("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_db_error_never_claims_a_sku_conflict() {
        let err: ProductError = DbErr::RecordNotInserted.into();
        assert!(matches!(err, ProductError::Database(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_db_error_without_constraint_maps_to_database() {
        let err: ProductError = DbErr::Custom("connection reset".into()).into();
        assert!(matches!(err, ProductError::Database(msg) if msg.contains("connection reset")));
    }
}
