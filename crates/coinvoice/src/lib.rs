//! Crypto invoicing core.
//!
//! An invoice is bound to a freshly provisioned deposit address; a transfer
//! notification from the payment processor that lands on that address with a
//! sufficient amount settles the invoice.
//!
//! # Components
//!
//! - **Address provisioning** ([`ProcessorProvisioner`]): asks the processor
//!   for a deposit address, degrading to a marked local fallback on failure
//! - **Invoice store** ([`InvoiceStore`]): keyed storage with a unique
//!   deposit-address constraint and atomic per-invoice updates
//! - **Lifecycle** ([`InvoiceManager`]): creation, lookup, status changes;
//!   the only writer of invoice state
//! - **Reconciliation** ([`WebhookReconciler`]): verifies and applies
//!   transfer notifications
//!
//! # Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use coinvoice::{
//!     CreateInvoice, InvoiceManager, ProcessorConfig, ProcessorProvisioner,
//!     SqliteInvoiceStore, WebhookConfig, WebhookReconciler,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provisioner = ProcessorProvisioner::new(ProcessorConfig::default())?;
//! let store = Arc::new(SqliteInvoiceStore::open("./invoices.db")?);
//! let manager = Arc::new(InvoiceManager::new(provisioner).with_store(store));
//!
//! let invoice = manager
//!     .create_invoice(CreateInvoice {
//!         issuer_contact: "dev@example.com".into(),
//!         payer_name: "Acme".into(),
//!         payer_contact: None,
//!         amount: "50.00".parse()?,
//!         memo: "Landing page".into(),
//!     })
//!     .await?;
//!
//! let reconciler = WebhookReconciler::new(manager, WebhookConfig::strict(b"secret".to_vec()));
//! # let (body, signature): (Vec<u8>, Option<&str>) = (vec![], None);
//! let outcome = reconciler.process(&body, signature)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod hmac;
pub mod invoice;
pub mod security;
pub mod validation;
pub mod webhook;

pub mod lifecycle;
pub mod provisioner;
pub mod reconciler;
pub mod store;

pub use config::{ProcessorConfig, VerificationMode, WebhookConfig};
pub use constants::*;
pub use error::{InvoiceError, ReconcileError, SignatureError, StoreError};
pub use invoice::{CreateInvoice, Invoice, InvoiceId, InvoiceStatus};
pub use lifecycle::{InvoiceManager, Settlement};
pub use provisioner::{
    fallback_address, is_fallback_address, AddressProvisioner, ProcessorProvisioner,
    ProvisionError,
};
pub use reconciler::{IgnoreReason, Outcome, WebhookReconciler};
pub use store::{InMemoryInvoiceStore, InvoiceStore, SqliteInvoiceStore, UpdateResult};
pub use webhook::Notification;
