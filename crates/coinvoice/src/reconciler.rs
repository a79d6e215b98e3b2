//! Reconciliation of processor transfer notifications against open invoices.
//!
//! The reconciler holds no state of its own; invoice status is the state
//! machine. One notification runs through:
//!
//! 1. authenticity (HMAC-SHA256 over the raw body, see [`VerificationMode`])
//! 2. type filter (`transfer` only)
//! 3. completion filter (`complete` only)
//! 4. resolution by exact destination address
//! 5. amount policy (underpayment never settles)
//! 6. settlement through [`InvoiceManager::settle`], idempotent per invoice
//!
//! Every step that drops the event yields [`Outcome::Ignored`], a normal
//! result the sender should not retry. Errors are reserved for strict-mode
//! authenticity failures, verification misconfiguration, and storage faults.

use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

use crate::config::{VerificationMode, WebhookConfig};
use crate::constants::{TRANSFER_COMPLETE, TRANSFER_EVENT};
use crate::error::ReconcileError;
use crate::hmac::verify_signature;
use crate::invoice::{InvoiceId, InvoiceStatus};
use crate::lifecycle::{InvoiceManager, Settlement};
use crate::provisioner::AddressProvisioner;
use crate::webhook::Notification;

/// Why a notification was acknowledged without effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Body was not a parseable notification.
    Malformed,
    UnsupportedType(String),
    Incomplete(String),
    MissingDestination,
    UnknownAddress(String),
    InvalidAmount(String),
    Underpaid {
        invoice_id: InvoiceId,
        expected: Decimal,
        received: Decimal,
    },
    /// Invoice is EXPIRED or CANCELLED.
    NotPayable {
        invoice_id: InvoiceId,
        status: InvoiceStatus,
    },
}

impl IgnoreReason {
    pub fn code(&self) -> &'static str {
        match self {
            IgnoreReason::Malformed => "malformed",
            IgnoreReason::UnsupportedType(_) => "unsupported_type",
            IgnoreReason::Incomplete(_) => "incomplete",
            IgnoreReason::MissingDestination => "missing_destination",
            IgnoreReason::UnknownAddress(_) => "unknown_address",
            IgnoreReason::InvalidAmount(_) => "invalid_amount",
            IgnoreReason::Underpaid { .. } => "underpaid",
            IgnoreReason::NotPayable { .. } => "not_payable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Settled(InvoiceId),
    /// Replay against an invoice already PAID; nothing changed.
    AlreadyPaid(InvoiceId),
    Ignored(IgnoreReason),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Settled(_) => "settled",
            Outcome::AlreadyPaid(_) => "already_paid",
            Outcome::Ignored(reason) => reason.code(),
        }
    }

    pub fn invoice_id(&self) -> Option<InvoiceId> {
        match self {
            Outcome::Settled(id) | Outcome::AlreadyPaid(id) => Some(*id),
            Outcome::Ignored(IgnoreReason::Underpaid { invoice_id, .. })
            | Outcome::Ignored(IgnoreReason::NotPayable { invoice_id, .. }) => Some(*invoice_id),
            Outcome::Ignored(_) => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub struct WebhookReconciler<P> {
    manager: Arc<InvoiceManager<P>>,
    config: WebhookConfig,
}

impl<P: AddressProvisioner> WebhookReconciler<P> {
    pub fn new(manager: Arc<InvoiceManager<P>>, config: WebhookConfig) -> Self {
        if config.mode == VerificationMode::Permissive {
            tracing::warn!(
                "webhook verification is PERMISSIVE: events failing the signature check will still be processed. Do not use in production"
            );
        }
        Self { manager, config }
    }

    pub fn mode(&self) -> VerificationMode {
        self.config.mode
    }

    /// Process one raw notification body with its optional signature header.
    pub fn process(&self, body: &[u8], signature: Option<&str>) -> Result<Outcome, ReconcileError> {
        self.check_authenticity(body, signature)?;

        let notification = match Notification::from_slice(body) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, bytes = body.len(), "dropping malformed webhook payload");
                return Ok(Outcome::Ignored(IgnoreReason::Malformed));
            }
        };

        self.reconcile(&notification)
    }

    /// Apply type, completion, resolution, amount and settlement policy to a
    /// notification whose authenticity has already been established.
    pub fn reconcile(&self, notification: &Notification) -> Result<Outcome, ReconcileError> {
        let data = &notification.data;

        if notification.kind != TRANSFER_EVENT {
            tracing::info!(kind = %notification.kind, "ignoring unhandled webhook type");
            return Ok(Outcome::Ignored(IgnoreReason::UnsupportedType(
                notification.kind.clone(),
            )));
        }

        if data.status != TRANSFER_COMPLETE {
            tracing::info!(transfer_id = %data.id, status = %data.status, "transfer not complete");
            return Ok(Outcome::Ignored(IgnoreReason::Incomplete(data.status.clone())));
        }

        let Some(address) = notification.destination_address() else {
            tracing::warn!(transfer_id = %data.id, "no destination address in transfer");
            return Ok(Outcome::Ignored(IgnoreReason::MissingDestination));
        };

        let Some(invoice) = self.manager.find_by_address(address)? else {
            tracing::info!(transfer_id = %data.id, address = %address, "no invoice for destination address");
            return Ok(Outcome::Ignored(IgnoreReason::UnknownAddress(
                address.to_string(),
            )));
        };

        // Exact parse: excess precision is refused rather than rounded up
        // to the invoice amount.
        let received = match Decimal::from_str_exact(data.amount.amount.trim()) {
            Ok(amount) => amount,
            Err(e) => {
                tracing::warn!(
                    transfer_id = %data.id,
                    amount = %data.amount.amount,
                    error = %e,
                    "unparseable transfer amount"
                );
                return Ok(Outcome::Ignored(IgnoreReason::InvalidAmount(
                    data.amount.amount.clone(),
                )));
            }
        };

        if received < invoice.amount {
            tracing::warn!(
                invoice_id = %invoice.id,
                expected = %invoice.amount,
                received = %received,
                "payment less than invoice amount"
            );
            return Ok(Outcome::Ignored(IgnoreReason::Underpaid {
                invoice_id: invoice.id,
                expected: invoice.amount,
                received,
            }));
        }

        match self.manager.settle(&invoice.id)? {
            Some(Settlement::Settled(paid)) => {
                tracing::info!(
                    invoice_id = %paid.id,
                    transfer_id = %data.id,
                    amount = %received,
                    currency = %data.amount.currency,
                    "invoice marked as paid"
                );
                Ok(Outcome::Settled(paid.id))
            }
            Some(Settlement::AlreadyPaid(paid)) => {
                tracing::info!(
                    invoice_id = %paid.id,
                    transfer_id = %data.id,
                    "invoice already paid, replay ignored"
                );
                Ok(Outcome::AlreadyPaid(paid.id))
            }
            Some(Settlement::NotPayable(closed)) => {
                tracing::warn!(
                    invoice_id = %closed.id,
                    status = %closed.status,
                    transfer_id = %data.id,
                    "payment received for closed invoice"
                );
                Ok(Outcome::Ignored(IgnoreReason::NotPayable {
                    invoice_id: closed.id,
                    status: closed.status,
                }))
            }
            None => Ok(Outcome::Ignored(IgnoreReason::UnknownAddress(
                address.to_string(),
            ))),
        }
    }

    fn check_authenticity(&self, body: &[u8], signature: Option<&str>) -> Result<(), ReconcileError> {
        let strict = self.config.mode == VerificationMode::Strict;

        let Some(secret) = self.config.signing_secret.as_deref() else {
            if strict {
                tracing::error!("strict webhook verification has no signing secret, rejecting event");
                return Err(ReconcileError::Misconfigured(
                    "strict verification requires a signing secret".to_string(),
                ));
            }
            tracing::debug!("no webhook signing secret configured, skipping signature check");
            return Ok(());
        };

        let failure = match signature {
            None => "missing signature",
            Some(sig) => match verify_signature(secret, body, sig) {
                Ok(true) => return Ok(()),
                Ok(false) => "signature mismatch",
                Err(e) if strict => {
                    tracing::error!(error = %e, "webhook signature verification unavailable");
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "webhook signature verification unavailable, continuing (permissive)");
                    return Ok(());
                }
            },
        };

        tracing::warn!(
            reason = failure,
            mode = self.config.mode.as_str(),
            "webhook authenticity check failed"
        );

        if strict {
            Err(ReconcileError::Authenticity(failure.to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmac::compute_signature;
    use crate::invoice::CreateInvoice;

    struct FixedProvisioner(&'static str);

    impl AddressProvisioner for FixedProvisioner {
        async fn provision(&self, _label: &str) -> String {
            self.0.to_string()
        }
    }

    const SECRET: &[u8] = b"whsec-unit";

    fn body(kind: &str, address: Option<&str>, amount: &str, status: &str) -> Vec<u8> {
        let mut destination = serde_json::json!({ "type": "blockchain" });
        if let Some(a) = address {
            destination["address"] = serde_json::json!(a);
        }
        serde_json::to_vec(&serde_json::json!({
            "type": kind,
            "data": {
                "id": "tr-1",
                "source": { "type": "blockchain" },
                "destination": destination,
                "amount": { "amount": amount, "currency": "USD" },
                "status": status,
                "createDate": "2024-05-01T12:00:00Z"
            }
        }))
        .unwrap()
    }

    async fn setup(config: WebhookConfig) -> (WebhookReconciler<FixedProvisioner>, InvoiceId) {
        let manager = Arc::new(InvoiceManager::new(FixedProvisioner("0xABC")));
        let invoice = manager
            .create_invoice(CreateInvoice {
                issuer_contact: "dev@example.com".to_string(),
                payer_name: "Acme".to_string(),
                payer_contact: None,
                amount: "100.00".parse().unwrap(),
                memo: "Audit".to_string(),
            })
            .await
            .unwrap();
        (WebhookReconciler::new(manager, config), invoice.id)
    }

    fn signed(b: &[u8]) -> String {
        compute_signature(SECRET, b).unwrap()
    }

    #[tokio::test]
    async fn test_strict_accepts_valid_signature() {
        let (reconciler, id) = setup(WebhookConfig::strict(SECRET)).await;
        let b = body("transfer", Some("0xABC"), "100.00", "complete");
        assert_eq!(reconciler.process(&b, Some(&signed(&b))).unwrap(), Outcome::Settled(id));
    }

    #[tokio::test]
    async fn test_strict_rejects_bad_or_missing_signature() {
        let (reconciler, id) = setup(WebhookConfig::strict(SECRET)).await;
        let b = body("transfer", Some("0xABC"), "100.00", "complete");

        let err = reconciler.process(&b, Some("bogus")).unwrap_err();
        assert!(matches!(err, ReconcileError::Authenticity(_)));
        let err = reconciler.process(&b, None).unwrap_err();
        assert!(matches!(err, ReconcileError::Authenticity(_)));

        let invoice = reconciler.manager.get_by_id(&id).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn test_strict_without_secret_is_misconfigured() {
        let (reconciler, _) = setup(WebhookConfig::default()).await;
        let b = body("transfer", Some("0xABC"), "100.00", "complete");
        assert!(matches!(
            reconciler.process(&b, None),
            Err(ReconcileError::Misconfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_permissive_processes_forged_event() {
        let (reconciler, id) = setup(WebhookConfig::permissive(Some(SECRET.to_vec()))).await;
        let b = body("transfer", Some("0xABC"), "100.00", "complete");
        assert_eq!(reconciler.process(&b, Some("forged")).unwrap(), Outcome::Settled(id));
    }

    #[tokio::test]
    async fn test_ignore_paths() {
        let (reconciler, id) = setup(WebhookConfig::permissive(None)).await;

        let cases = [
            (body("payout", Some("0xABC"), "100.00", "complete"), "unsupported_type"),
            (body("transfer", Some("0xABC"), "100.00", "pending"), "incomplete"),
            (body("transfer", None, "100.00", "complete"), "missing_destination"),
            (body("transfer", Some("0xDEF"), "100.00", "complete"), "unknown_address"),
            (body("transfer", Some("0xABC"), "lots", "complete"), "invalid_amount"),
            (body("transfer", Some("0xABC"), "99.999999", "complete"), "underpaid"),
            (b"{not json".to_vec(), "malformed"),
        ];
        for (b, expected) in cases {
            let outcome = reconciler.process(&b, None).unwrap();
            assert_eq!(outcome.label(), expected);
        }

        let invoice = reconciler.manager.get_by_id(&id).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert!(invoice.paid_at.is_none());
    }

    #[tokio::test]
    async fn test_unrepresentable_amount_is_not_rounded_into_payment() {
        let (reconciler, id) = setup(WebhookConfig::permissive(None)).await;
        let b = body(
            "transfer",
            Some("0xABC"),
            "99.99999999999999999999999999999999",
            "complete",
        );
        let outcome = reconciler.process(&b, None).unwrap();
        assert_eq!(outcome.label(), "invalid_amount");

        let invoice = reconciler.manager.get_by_id(&id).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn test_overpayment_settles() {
        let (reconciler, id) = setup(WebhookConfig::permissive(None)).await;
        let b = body("transfer", Some("0xABC"), "150", "complete");
        assert_eq!(reconciler.process(&b, None).unwrap(), Outcome::Settled(id));
    }

    #[tokio::test]
    async fn test_closed_invoice_is_not_revived() {
        let (reconciler, id) = setup(WebhookConfig::permissive(None)).await;
        reconciler
            .manager
            .transition_status(&id, InvoiceStatus::Expired)
            .unwrap();

        let b = body("transfer", Some("0xABC"), "100.00", "complete");
        let outcome = reconciler.process(&b, None).unwrap();
        assert_eq!(
            outcome,
            Outcome::Ignored(IgnoreReason::NotPayable {
                invoice_id: id,
                status: InvoiceStatus::Expired
            })
        );
    }
}
