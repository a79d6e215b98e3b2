use rust_decimal::Decimal;

use crate::constants::{
    AMOUNT_MAX_INTEGER_DIGITS, AMOUNT_SCALE, MAX_CONTACT_LEN, MAX_MEMO_LEN, MAX_PAYER_NAME_LEN,
};
use crate::error::InvoiceError;
use crate::invoice::CreateInvoice;

/// Reject creation input that could never form a valid invoice.
///
/// Runs before any address is provisioned.
pub fn validate_create(request: &CreateInvoice) -> Result<(), InvoiceError> {
    validate_contact("issuer contact", &request.issuer_contact)?;

    if request.payer_name.trim().is_empty() {
        return Err(InvoiceError::Validation(
            "payer name is required".to_string(),
        ));
    }
    if request.payer_name.chars().count() > MAX_PAYER_NAME_LEN {
        return Err(InvoiceError::Validation(format!(
            "payer name must be at most {MAX_PAYER_NAME_LEN} characters"
        )));
    }

    // A blank optional contact means "not given".
    if let Some(contact) = request
        .payer_contact
        .as_deref()
        .filter(|c| !c.trim().is_empty())
    {
        validate_contact("payer contact", contact)?;
    }

    validate_amount(request.amount)?;

    if request.memo.trim().is_empty() {
        return Err(InvoiceError::Validation("memo is required".to_string()));
    }
    if request.memo.chars().count() > MAX_MEMO_LEN {
        return Err(InvoiceError::Validation(format!(
            "memo must be at most {MAX_MEMO_LEN} characters"
        )));
    }

    Ok(())
}

/// Amount must be positive, with at most 12 integer and 6 fractional digits.
pub fn validate_amount(amount: Decimal) -> Result<(), InvoiceError> {
    if amount <= Decimal::ZERO {
        return Err(InvoiceError::Validation(
            "amount must be greater than 0".to_string(),
        ));
    }

    let normalized = amount.normalize();
    if normalized.scale() > AMOUNT_SCALE {
        return Err(InvoiceError::Validation(format!(
            "amount can have at most {AMOUNT_SCALE} decimal places"
        )));
    }

    let integer_digits = normalized.trunc().to_string().trim_start_matches('0').len() as u32;
    if integer_digits > AMOUNT_MAX_INTEGER_DIGITS {
        return Err(InvoiceError::Validation(format!(
            "amount can have at most {AMOUNT_MAX_INTEGER_DIGITS} integer digits"
        )));
    }

    Ok(())
}

/// Shallow e-mail shape check: `local@domain.tld`, no whitespace.
fn validate_contact(field: &str, value: &str) -> Result<(), InvoiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InvoiceError::Validation(format!("{field} is required")));
    }
    if value.len() > MAX_CONTACT_LEN {
        return Err(InvoiceError::Validation(format!("{field} is too long")));
    }

    let well_formed = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !well_formed {
        return Err(InvoiceError::Validation(format!(
            "{field} must be a valid e-mail address"
        )));
    }

    Ok(())
}
