use thiserror::Error;

/// Failures of an [`InvoiceStore`](crate::store::InvoiceStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another invoice already holds this deposit address.
    #[error("deposit address already assigned: {0}")]
    AddressConflict(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("store lock poisoned")]
    LockPoisoned,

    /// A persisted row could not be decoded back into an invoice.
    #[error("corrupt invoice record: {0}")]
    Corrupt(String),
}

/// SQLITE_CONSTRAINT_UNIQUE
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref err, Some(ref msg)) = e {
            if err.extended_code == SQLITE_CONSTRAINT_UNIQUE && msg.contains("deposit_address") {
                return StoreError::AddressConflict(msg.clone());
            }
        }
        StoreError::Database(e)
    }
}

/// Errors returned by the invoice lifecycle manager.
#[derive(Debug, Error)]
pub enum InvoiceError {
    /// Creation input violates a constraint. User-correctable.
    #[error("validation error: {0}")]
    Validation(String),

    /// Every provisioned address collided with an existing invoice.
    #[error("could not obtain a unique deposit address: {0}")]
    AddressConflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for InvoiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AddressConflict(addr) => InvoiceError::AddressConflict(addr),
            other => InvoiceError::Store(other),
        }
    }
}

/// HMAC plumbing failure (not a signature mismatch).
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// Failures the reconciler surfaces to the webhook boundary.
///
/// Ignored events are never errors; see [`Outcome`](crate::reconciler::Outcome).
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Signature missing or mismatched under strict verification.
    #[error("authenticity check failed: {0}")]
    Authenticity(String),

    #[error("signature verification unavailable: {0}")]
    Signature(#[from] SignatureError),

    #[error("webhook verification misconfigured: {0}")]
    Misconfigured(String),

    /// Invoice lookup or settlement failed in storage.
    #[error(transparent)]
    Lifecycle(#[from] InvoiceError),
}
