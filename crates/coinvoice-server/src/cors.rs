//! CORS configuration for the invoice API.

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use coinvoice::SIGNATURE_HEADER;

/// Build the CORS middleware from allowed origins.
///
/// `*` admits any origin; config validation only lets it through in
/// permissive (development) mode.
pub fn build_cors(allowed_origins: &[String]) -> Cors {
    let allowed = allowed_origins.to_vec();
    Cors::default()
        .allowed_origin_fn(move |origin, _req_head| {
            let origin_str = origin.to_str().unwrap_or("");
            allowed.iter().any(|a| a == "*" || a == origin_str)
        })
        .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-circle-signature"),
        ])
        .max_age(3600)
}
