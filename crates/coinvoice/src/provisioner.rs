//! Deposit-address provisioning through the payment processor.
//!
//! Provisioning never fails from the caller's point of view: when the
//! processor cannot be reached, answers with an error, or returns something
//! unusable, a locally generated fallback address is returned instead and the
//! degradation is logged. Invoices holding a fallback address cannot be
//! reconciled until corrected by hand; [`is_fallback_address`] identifies them.

use serde::{Deserialize, Serialize};
use std::future::Future;
use uuid::Uuid;

use crate::config::ProcessorConfig;
use crate::constants::{DEPOSIT_ADDRESS_PATH, FALLBACK_ADDRESS_PREFIX};

/// Source of unique deposit addresses.
pub trait AddressProvisioner: Send + Sync {
    /// Obtain a deposit address for a new invoice. `label` is descriptive only.
    fn provision(&self, label: &str) -> impl Future<Output = String> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("malformed processor response: {0}")]
    MalformedResponse(String),

    #[error("no processor API key configured")]
    MissingCredential,
}

#[derive(Debug, Serialize)]
struct DepositAddressRequest<'a> {
    currency: &'a str,
    chain: &'a str,
}

#[derive(Debug, Deserialize)]
struct DepositAddressResponse {
    data: DepositAddress,
}

#[derive(Debug, Deserialize)]
struct DepositAddress {
    address: String,
    currency: String,
    chain: String,
}

/// Provisioner backed by the processor's deposit-address endpoint.
pub struct ProcessorProvisioner {
    http: reqwest::Client,
    config: ProcessorConfig,
}

impl ProcessorProvisioner {
    pub fn new(config: ProcessorConfig) -> Result<Self, ProvisionError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { http, config })
    }

    /// One attempt against the processor, surfacing the failure reason.
    pub async fn request_address(&self) -> Result<String, ProvisionError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProvisionError::MissingCredential)?;

        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            DEPOSIT_ADDRESS_PATH
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&DepositAddressRequest {
                currency: &self.config.currency,
                chain: &self.config.chain,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProvisionError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        let parsed: DepositAddressResponse = resp
            .json()
            .await
            .map_err(|e| ProvisionError::MalformedResponse(e.to_string()))?;

        let address = parsed.data.address.trim().to_string();
        if address.is_empty() {
            return Err(ProvisionError::MalformedResponse(
                "empty address".to_string(),
            ));
        }
        if is_fallback_address(&address) {
            return Err(ProvisionError::MalformedResponse(format!(
                "processor address uses the reserved fallback prefix: {address}"
            )));
        }

        tracing::debug!(
            currency = %parsed.data.currency,
            chain = %parsed.data.chain,
            "processor issued deposit address"
        );
        Ok(address)
    }
}

impl AddressProvisioner for ProcessorProvisioner {
    async fn provision(&self, label: &str) -> String {
        match self.request_address().await {
            Ok(address) => {
                tracing::info!(label = %label, address = %address, "deposit address provisioned");
                address
            }
            Err(e) => {
                let address = fallback_address();
                tracing::warn!(
                    label = %label,
                    error = %e,
                    fallback = %address,
                    "address provisioning degraded, using fallback address; invoice will not reconcile automatically"
                );
                address
            }
        }
    }
}

/// Synthesize a local stand-in address: the reserved prefix plus 32 random hex digits.
pub fn fallback_address() -> String {
    format!("{FALLBACK_ADDRESS_PREFIX}{}", Uuid::new_v4().simple())
}

pub fn is_fallback_address(address: &str) -> bool {
    address.starts_with(FALLBACK_ADDRESS_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fallback_addresses_are_marked_and_distinct() {
        let a = fallback_address();
        let b = fallback_address();
        assert!(is_fallback_address(&a));
        assert_eq!(a.len(), FALLBACK_ADDRESS_PREFIX.len() + 32);
        assert_ne!(a, b);
        assert!(!is_fallback_address("0x8381470ED67C3802402dbbFa0058E8871F017A6F"));
    }

    #[test]
    fn test_response_shape() {
        let body = r#"{"data":{"id":"w-1","address":"0xabc","currency":"USD","chain":"ETH"}}"#;
        let parsed: DepositAddressResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.address, "0xabc");
    }

    #[tokio::test]
    async fn test_missing_key_falls_back_without_network() {
        let provisioner = ProcessorProvisioner::new(ProcessorConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: None,
            ..ProcessorConfig::default()
        })
        .unwrap();

        assert!(matches!(
            provisioner.request_address().await,
            Err(ProvisionError::MissingCredential)
        ));
        assert!(is_fallback_address(&provisioner.provision("Acme").await));
    }

    #[tokio::test]
    async fn test_unreachable_processor_falls_back() {
        let provisioner = ProcessorProvisioner::new(ProcessorConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: Some("test-key".to_string()),
            timeout: Duration::from_secs(2),
            ..ProcessorConfig::default()
        })
        .unwrap();

        let address = provisioner.provision("Acme").await;
        assert!(is_fallback_address(&address));
    }
}
