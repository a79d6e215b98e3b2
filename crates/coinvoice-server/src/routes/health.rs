use actix_web::{web, HttpRequest, HttpResponse};
use coinvoice::security::bearer_matches;

use crate::error::ApiError;
use crate::metrics::metrics_output;
use crate::state::AppState;

/// GET /health - Health check endpoint
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "coinvoice-server",
        "version": env!("CARGO_PKG_VERSION"),
        "webhookVerification": state.reconciler.mode().as_str(),
    }))
}

/// GET /metrics - Prometheus metrics, bearer-gated unless made public
pub async fn metrics(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    match state.config.metrics_token {
        Some(ref token) => {
            let header = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok());
            if !bearer_matches(header, token.as_bytes()) {
                return Err(ApiError::Unauthorized);
            }
        }
        None if state.config.public_metrics => {}
        None => return Err(ApiError::Forbidden("metrics are disabled")),
    }

    let output = metrics_output().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(output))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics));
}
