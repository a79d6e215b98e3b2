//! The invoice record and its status machine.
//!
//! [`Invoice`] is a plain value. Changes never happen in place on shared
//! state: [`Invoice::with_status`] produces the next value and the store
//! writes it back atomically by id.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::{AMOUNT_SCALE, INVOICE_TTL_DAYS};

/// Opaque invoice identifier, assigned once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(Uuid);

impl InvoiceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvoiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InvoiceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Expired,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Expired => "EXPIRED",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown invoice status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for InvoiceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(InvoiceStatus::Pending),
            "PAID" => Ok(InvoiceStatus::Paid),
            "EXPIRED" => Ok(InvoiceStatus::Expired),
            "CANCELLED" => Ok(InvoiceStatus::Cancelled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Input to invoice creation, as received from the request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoice {
    pub issuer_contact: String,
    pub payer_name: String,
    #[serde(default)]
    pub payer_contact: Option<String>,
    pub amount: Decimal,
    pub memo: String,
}

impl CreateInvoice {
    /// Canonical form of the request: names and contacts trimmed, a blank
    /// payer contact treated as absent, and redundant trailing zeros beyond
    /// the amount scale dropped.
    pub fn normalized(self) -> Self {
        let amount = if self.amount.scale() > AMOUNT_SCALE {
            self.amount.normalize()
        } else {
            self.amount
        };
        Self {
            issuer_contact: self.issuer_contact.trim().to_string(),
            payer_name: self.payer_name.trim().to_string(),
            payer_contact: self
                .payer_contact
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            amount,
            memo: self.memo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: InvoiceId,
    /// Payee contact; invoices are listed by this.
    pub issuer_contact: String,
    pub payer_name: String,
    pub payer_contact: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub memo: String,
    pub deposit_address: String,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Build a fresh PENDING invoice bound to `deposit_address`.
    ///
    /// Inputs are expected to be validated already.
    pub fn open(request: CreateInvoice, deposit_address: String, now: DateTime<Utc>) -> Self {
        Self {
            id: InvoiceId::new(),
            issuer_contact: request.issuer_contact,
            payer_name: request.payer_name,
            payer_contact: request.payer_contact,
            amount: request.amount,
            memo: request.memo,
            deposit_address,
            status: InvoiceStatus::Pending,
            created_at: now,
            paid_at: None,
            expires_at: Some(now + Duration::days(INVOICE_TTL_DAYS)),
        }
    }

    /// Return the invoice moved to `status`.
    ///
    /// `paid_at` is stamped on entering PAID and kept untouched when the
    /// invoice is already PAID; any other status clears it.
    pub fn with_status(&self, status: InvoiceStatus, now: DateTime<Utc>) -> Self {
        let paid_at = match (self.status, status) {
            (InvoiceStatus::Paid, InvoiceStatus::Paid) => self.paid_at.or(Some(now)),
            (_, InvoiceStatus::Paid) => Some(now),
            _ => None,
        };
        Self {
            status,
            paid_at,
            ..self.clone()
        }
    }

    pub fn is_payable(&self) -> bool {
        self.status == InvoiceStatus::Pending
    }
}

/// Current time at the precision the stores persist (microseconds).
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn request() -> CreateInvoice {
        CreateInvoice {
            issuer_contact: "dev@example.com".to_string(),
            payer_name: "Acme".to_string(),
            payer_contact: None,
            amount: dec("50.00"),
            memo: "Logo design".to_string(),
        }
    }

    #[test]
    fn test_open_is_pending_with_expiry() {
        let now = now();
        let invoice = Invoice::open(request(), "0xabc".to_string(), now);
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert!(invoice.paid_at.is_none());
        assert_eq!(invoice.expires_at, Some(now + Duration::days(30)));
    }

    #[test]
    fn test_paid_stamps_once() {
        let t0 = now();
        let t1 = t0 + Duration::seconds(5);
        let invoice = Invoice::open(request(), "0xabc".to_string(), t0);

        let paid = invoice.with_status(InvoiceStatus::Paid, t0);
        assert_eq!(paid.paid_at, Some(t0));

        let again = paid.with_status(InvoiceStatus::Paid, t1);
        assert_eq!(again.paid_at, Some(t0));
    }

    #[test]
    fn test_leaving_paid_clears_paid_at() {
        let t0 = now();
        let invoice = Invoice::open(request(), "0xabc".to_string(), t0)
            .with_status(InvoiceStatus::Paid, t0)
            .with_status(InvoiceStatus::Cancelled, t0);
        assert_eq!(invoice.status, InvoiceStatus::Cancelled);
        assert!(invoice.paid_at.is_none());
    }

    #[test]
    fn test_with_status_keeps_amount() {
        let t0 = now();
        let invoice = Invoice::open(request(), "0xabc".to_string(), t0);
        let paid = invoice.with_status(InvoiceStatus::Paid, t0);
        assert_eq!(paid.amount, invoice.amount);
        assert_eq!(paid.id, invoice.id);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("paid".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::Paid);
        assert_eq!(
            " CANCELLED ".parse::<InvoiceStatus>().unwrap(),
            InvoiceStatus::Cancelled
        );
        assert!("settled".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn test_normalized_trims_and_drops_blank_contact() {
        let raw = CreateInvoice {
            issuer_contact: "  dev@example.com ".to_string(),
            payer_name: "\tAcme ".to_string(),
            payer_contact: Some("   ".to_string()),
            amount: dec("50.000000000"),
            memo: " Logo design ".to_string(),
        };
        let clean = raw.normalized();
        assert_eq!(clean.issuer_contact, "dev@example.com");
        assert_eq!(clean.payer_name, "Acme");
        assert_eq!(clean.payer_contact, None);
        assert_eq!(clean.amount, dec("50"));
        assert!(clean.amount.scale() <= AMOUNT_SCALE);
        assert_eq!(clean.memo, " Logo design ");

        let kept = request().normalized();
        assert_eq!(kept.amount.to_string(), "50.00");
        let contact = CreateInvoice {
            payer_contact: Some(" ap@acme.io ".to_string()),
            ..request()
        };
        assert_eq!(contact.normalized().payer_contact.as_deref(), Some("ap@acme.io"));
    }

    #[test]
    fn test_serializes_camel_case_with_string_amount() {
        let invoice = Invoice::open(request(), "0xabc".to_string(), now());
        let json = serde_json::to_value(&invoice).unwrap();
        assert_eq!(json["depositAddress"], "0xabc");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["amount"], "50.00");
        assert!(json["paidAt"].is_null());
    }
}
