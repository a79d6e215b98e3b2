use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse};
use coinvoice::security::bearer_matches;
use coinvoice::{is_fallback_address, CreateInvoice, Invoice, InvoiceId, InvoiceStatus};
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{FALLBACK_ADDRESSES, INVOICES_CREATED, STATUS_UPDATES};
use crate::state::AppState;

/// An invoice as returned to clients, with the payer-facing link.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub payment_url: String,
}

impl InvoiceResponse {
    pub fn new(invoice: Invoice, config: &ServerConfig) -> Self {
        let payment_url = config.payment_url(&invoice.id);
        Self {
            invoice,
            payment_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub issuer: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

fn parse_id(raw: &str) -> Result<InvoiceId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(raw.to_string()))
}

fn parse_status(raw: &str) -> Result<InvoiceStatus, ApiError> {
    raw.parse::<InvoiceStatus>()
        .map_err(|e| ApiError::Validation(e.to_string()))
}

/// POST /api/invoices - Create an invoice and provision its deposit address
pub async fn create_invoice(
    body: web::Json<CreateInvoice>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let invoice = state.manager.create_invoice(body.into_inner()).await?;

    INVOICES_CREATED.inc();
    if is_fallback_address(&invoice.deposit_address) {
        FALLBACK_ADDRESSES.inc();
    }

    Ok(HttpResponse::Created().json(InvoiceResponse::new(invoice, &state.config)))
}

/// GET /api/invoices/{id}
pub async fn get_invoice(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let raw = path.into_inner();
    let id = parse_id(&raw)?;

    let invoice = state
        .manager
        .get_by_id(&id)?
        .ok_or(ApiError::NotFound(raw))?;

    Ok(HttpResponse::Ok().json(InvoiceResponse::new(invoice, &state.config)))
}

/// GET /api/invoices?issuer=<contact>&status=<status> - Newest first
pub async fn list_invoices(
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;

    let invoices = match (query.issuer.as_deref().map(str::trim), status) {
        (Some(issuer), status) => {
            let mut invoices = state.manager.list_by_issuer(issuer)?;
            if let Some(status) = status {
                invoices.retain(|inv| inv.status == status);
            }
            invoices
        }
        (None, Some(status)) => state.manager.list_by_status(status)?,
        (None, None) => {
            return Err(ApiError::Validation(
                "issuer or status query parameter is required".to_string(),
            ))
        }
    };

    let invoices: Vec<InvoiceResponse> = invoices
        .into_iter()
        .map(|inv| InvoiceResponse::new(inv, &state.config))
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "invoices": invoices,
        "count": invoices.len(),
    })))
}

/// PUT /api/invoices/{id}/status - Administrative status override
pub async fn update_status(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<StatusUpdate>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    if let Some(ref token) = state.config.admin_token {
        let header = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok());
        if !bearer_matches(header, token.as_bytes()) {
            tracing::warn!("rejected status update with missing or invalid admin token");
            return Err(ApiError::Unauthorized);
        }
    }

    let raw = path.into_inner();
    let id = parse_id(&raw)?;
    let status = parse_status(&body.status)?;

    let invoice = state
        .manager
        .transition_status(&id, status)?
        .ok_or(ApiError::NotFound(raw))?;

    STATUS_UPDATES.with_label_values(&[status.as_str()]).inc();
    Ok(HttpResponse::Ok().json(InvoiceResponse::new(invoice, &state.config)))
}

/// Malformed JSON bodies get the same error shape as validation failures.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err: JsonPayloadError, _req| ApiError::Validation(err.to_string()).into())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/invoices")
            .app_data(json_config())
            .route("", web::post().to(create_invoice))
            .route("", web::get().to(list_invoices))
            .route("/{id}", web::get().to(get_invoice))
            .route("/{id}/status", web::put().to(update_status)),
    );
}
