use actix_web::{HttpResponse, ResponseError};
use coinvoice::{InvoiceError, ReconcileError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request failed input validation
    #[error("validation error: {0}")]
    Validation(String),
    /// No invoice with this id
    #[error("invoice not found: {0}")]
    NotFound(String),
    /// Deposit address collided on every provisioning attempt
    #[error("address conflict: {0}")]
    AddressConflict(String),
    /// Missing or wrong bearer token
    #[error("unauthorized")]
    Unauthorized,
    /// Endpoint disabled by configuration
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    /// Webhook failed strict authenticity checks
    #[error("webhook authentication failed: {0}")]
    Authenticity(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<InvoiceError> for ApiError {
    fn from(e: InvoiceError) -> Self {
        match e {
            InvoiceError::Validation(msg) => ApiError::Validation(msg),
            InvoiceError::AddressConflict(msg) => ApiError::AddressConflict(msg),
            InvoiceError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<ReconcileError> for ApiError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Authenticity(reason) => ApiError::Authenticity(reason),
            ReconcileError::Lifecycle(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Validation(msg) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "validation_error",
                "message": msg
            })),
            ApiError::NotFound(id) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "not_found",
                "message": format!("Invoice '{}' not found", id)
            })),
            ApiError::AddressConflict(msg) => {
                tracing::error!("Deposit address conflict: {}", msg);
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "address_conflict",
                    "message": "Could not allocate a unique deposit address, retry later"
                }))
            }
            ApiError::Unauthorized => HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "unauthorized",
                "message": "Valid Bearer token required"
            })),
            ApiError::Forbidden(msg) => HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": msg
            })),
            ApiError::Authenticity(_) => HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication_failed",
                "message": "Webhook signature missing or invalid"
            })),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::AddressConflict("x".into()), StatusCode::CONFLICT),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::Authenticity("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.error_response().status(), status, "{err}");
        }
    }

    #[test]
    fn test_reconcile_errors_map() {
        let auth: ApiError = ReconcileError::Authenticity("missing signature".into()).into();
        assert!(matches!(auth, ApiError::Authenticity(_)));

        let misconfigured: ApiError = ReconcileError::Misconfigured("no secret".into()).into();
        assert!(matches!(misconfigured, ApiError::Internal(_)));

        let storage: ApiError =
            ReconcileError::Lifecycle(InvoiceError::Store(StoreError::LockPoisoned)).into();
        assert!(matches!(storage, ApiError::Internal(_)));
    }
}
