use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

fn keyed(secret: &[u8]) -> Result<HmacSha256, SignatureError> {
    HmacSha256::new_from_slice(secret).map_err(|e| SignatureError::InvalidKey(e.to_string()))
}

/// Compute HMAC-SHA256 over the raw body. Returns the base64-encoded MAC,
/// the encoding the processor puts in its signature header.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = keyed(secret)?;
    mac.update(body);
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a signature header value against the raw body.
///
/// Accepts base64 or hex encodings of the MAC. Comparison is constant-time;
/// an undecodable signature is compared against zeros so it fails the same way.
/// `Err` only for key plumbing problems, never for a mismatch.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    signature: &str,
) -> Result<bool, SignatureError> {
    let mut mac = keyed(secret)?;
    mac.update(body);

    let expected = decode_signature(signature.trim()).unwrap_or_else(|| vec![0u8; 32]);

    Ok(mac.verify_slice(&expected).is_ok())
}

fn decode_signature(s: &str) -> Option<Vec<u8>> {
    if s.len() == 64 {
        if let Ok(bytes) = hex::decode(s) {
            return Some(bytes);
        }
    }
    base64::engine::general_purpose::STANDARD.decode(s).ok()
}

mod hex {
    pub fn decode(s: &str) -> Result<Vec<u8>, ()> {
        if s.len() % 2 != 0 || !s.is_ascii() {
            return Err(());
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
            .collect()
    }

    #[cfg(test)]
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
            s
        })
    }
}
