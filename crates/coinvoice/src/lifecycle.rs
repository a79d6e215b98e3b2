use std::sync::Arc;

use crate::constants::MAX_PROVISION_ATTEMPTS;
use crate::error::{InvoiceError, StoreError};
use crate::invoice::{now, CreateInvoice, Invoice, InvoiceId, InvoiceStatus};
use crate::provisioner::{is_fallback_address, AddressProvisioner};
use crate::store::{InMemoryInvoiceStore, InvoiceStore, UpdateResult};
use crate::validation::validate_create;

/// What a settlement attempt did to the invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// PENDING -> PAID, `paid_at` stamped now.
    Settled(Invoice),
    /// Already PAID. Nothing written; `paid_at` is the original stamp.
    AlreadyPaid(Invoice),
    /// EXPIRED or CANCELLED. Payment does not revive it.
    NotPayable(Invoice),
}

/// Owns invoice creation and every status change. The only writer of invoice state.
pub struct InvoiceManager<P> {
    provisioner: P,
    store: Arc<dyn InvoiceStore>,
}

impl<P: AddressProvisioner> InvoiceManager<P> {
    /// Create a manager over an in-memory store.
    ///
    /// # Warning
    /// Invoices are lost on restart. For production use, chain
    /// `.with_store(sqlite_store)`.
    pub fn new(provisioner: P) -> Self {
        Self {
            provisioner,
            store: Arc::new(InMemoryInvoiceStore::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn InvoiceStore>) -> Self {
        self.store = store;
        self
    }

    /// Validate, provision a deposit address, and persist a PENDING invoice.
    ///
    /// The address is obtained before anything is written, so an invoice never
    /// exists without one. Provisioning degradation is absorbed by the
    /// provisioner; only validation failures and storage errors come back.
    /// A colliding address is re-provisioned up to a bounded number of times.
    pub async fn create_invoice(&self, request: CreateInvoice) -> Result<Invoice, InvoiceError> {
        let request = request.normalized();
        validate_create(&request)?;

        let label = format!("Invoice for {}", request.payer_name);
        let mut last_conflict = String::new();

        for attempt in 1..=MAX_PROVISION_ATTEMPTS {
            let address = self.provisioner.provision(&label).await;
            let invoice = Invoice::open(request.clone(), address, now());

            match self.store.insert(&invoice) {
                Ok(()) => {
                    tracing::info!(
                        invoice_id = %invoice.id,
                        issuer = %invoice.issuer_contact,
                        amount = %invoice.amount,
                        address = %invoice.deposit_address,
                        fallback = is_fallback_address(&invoice.deposit_address),
                        "invoice created"
                    );
                    return Ok(invoice);
                }
                Err(StoreError::AddressConflict(detail)) => {
                    tracing::warn!(
                        attempt,
                        address = %invoice.deposit_address,
                        "deposit address collision, provisioning another"
                    );
                    last_conflict = detail;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(InvoiceError::AddressConflict(last_conflict))
    }

    /// `Ok(None)` when no invoice has this id.
    pub fn get_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, InvoiceError> {
        Ok(self.store.get(id)?)
    }

    /// Newest first; ties broken by creation order.
    pub fn list_by_issuer(&self, issuer_contact: &str) -> Result<Vec<Invoice>, InvoiceError> {
        Ok(self.store.list_by_issuer(issuer_contact)?)
    }

    pub fn list_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>, InvoiceError> {
        Ok(self.store.list_by_status(status)?)
    }

    pub fn find_by_address(&self, address: &str) -> Result<Option<Invoice>, InvoiceError> {
        Ok(self.store.find_by_address(address)?)
    }

    /// Set an invoice's status unconditionally. Entering PAID stamps `paid_at`
    /// (kept if already PAID); any other status clears it.
    ///
    /// This is the administrative primitive: it does not check whether the
    /// transition is legal. Callers own that decision. The automatic payment
    /// path goes through [`settle`](Self::settle) instead.
    pub fn transition_status(
        &self,
        id: &InvoiceId,
        status: InvoiceStatus,
    ) -> Result<Option<Invoice>, InvoiceError> {
        let at = now();
        let updated = self
            .store
            .update(id, &|current| Some(current.with_status(status, at)))?;

        match &updated {
            Some(result) => tracing::info!(
                invoice_id = %id,
                status = %result.invoice().status,
                "invoice status set"
            ),
            None => tracing::debug!(invoice_id = %id, "status update for unknown invoice"),
        }

        Ok(updated.map(UpdateResult::into_invoice))
    }

    /// Mark a PENDING invoice PAID as one atomic step.
    ///
    /// Duplicate or concurrent calls for the same invoice resolve to exactly
    /// one [`Settlement::Settled`]; the rest see [`Settlement::AlreadyPaid`]
    /// with the original `paid_at`.
    pub fn settle(&self, id: &InvoiceId) -> Result<Option<Settlement>, InvoiceError> {
        let at = now();
        let updated = self.store.update(id, &|current| {
            current
                .is_payable()
                .then(|| current.with_status(InvoiceStatus::Paid, at))
        })?;

        Ok(updated.map(|result| match result {
            UpdateResult::Written(invoice) => Settlement::Settled(invoice),
            UpdateResult::Unchanged(invoice) if invoice.status == InvoiceStatus::Paid => {
                Settlement::AlreadyPaid(invoice)
            }
            UpdateResult::Unchanged(invoice) => Settlement::NotPayable(invoice),
        }))
    }
}
