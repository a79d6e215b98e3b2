use actix_web::web;

pub mod health;
pub mod invoices;
pub mod webhook;

/// Mount every route of the service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    health::configure(cfg);
    invoices::configure(cfg);
    webhook::configure(cfg);
}
