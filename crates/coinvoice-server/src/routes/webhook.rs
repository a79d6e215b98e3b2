use actix_web::{web, HttpRequest, HttpResponse};
use coinvoice::SIGNATURE_HEADER;

use crate::error::ApiError;
use crate::metrics::WEBHOOK_EVENTS;
use crate::state::AppState;

/// POST /api/webhook/circle - Processor transfer notifications
///
/// The body is taken raw so the signature is checked over the exact bytes
/// received. Ignored events are acknowledged with 200 so the processor does
/// not redeliver them.
pub async fn receive(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = match state.reconciler.process(&body, signature) {
        Ok(outcome) => outcome,
        Err(e) => {
            WEBHOOK_EVENTS.with_label_values(&["rejected"]).inc();
            return Err(e.into());
        }
    };

    WEBHOOK_EVENTS.with_label_values(&[outcome.label()]).inc();

    let mut response = serde_json::json!({
        "received": true,
        "outcome": outcome.label(),
    });
    if let Some(id) = outcome.invoice_id() {
        response["invoiceId"] = serde_json::json!(id);
    }
    Ok(HttpResponse::Ok().json(response))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/webhook/circle", web::post().to(receive));
}
