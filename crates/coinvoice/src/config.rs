//! Per-component configuration. Each component receives exactly the settings
//! it needs at construction; nothing reads the environment from here.

use std::fmt;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CHAIN, DEFAULT_CURRENCY, DEFAULT_PROCESSOR_URL, DEFAULT_PROVISION_TIMEOUT,
};

/// Settings for the payment processor's address-issuing API.
#[derive(Clone)]
pub struct ProcessorConfig {
    pub base_url: String,
    /// Bearer credential. `None` means every invoice gets a fallback address.
    pub api_key: Option<String>,
    pub currency: String,
    pub chain: String,
    /// Bound on a single provisioning call, connect included.
    pub timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROCESSOR_URL.to_string(),
            api_key: None,
            currency: DEFAULT_CURRENCY.to_string(),
            chain: DEFAULT_CHAIN.to_string(),
            timeout: DEFAULT_PROVISION_TIMEOUT,
        }
    }
}

impl fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("currency", &self.currency)
            .field("chain", &self.chain)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// How the reconciler treats events whose signature does not check out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationMode {
    /// Reject unauthenticated events. Requires a signing secret.
    #[default]
    Strict,
    /// Log the failure and process the event anyway. Development only.
    Permissive,
}

impl VerificationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMode::Strict => "strict",
            VerificationMode::Permissive => "permissive",
        }
    }
}

impl std::str::FromStr for VerificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(VerificationMode::Strict),
            "permissive" => Ok(VerificationMode::Permissive),
            other => Err(format!(
                "unknown verification mode '{other}' (expected strict or permissive)"
            )),
        }
    }
}

/// Settings for inbound webhook authentication.
#[derive(Clone, Default)]
pub struct WebhookConfig {
    /// Shared HMAC secret. `None` disables signature checks, which strict
    /// mode treats as a misconfiguration.
    pub signing_secret: Option<Vec<u8>>,
    pub mode: VerificationMode,
}

impl WebhookConfig {
    pub fn strict(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_secret: Some(secret.into()),
            mode: VerificationMode::Strict,
        }
    }

    pub fn permissive(secret: Option<Vec<u8>>) -> Self {
        Self {
            signing_secret: secret,
            mode: VerificationMode::Permissive,
        }
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("mode", &self.mode)
            .finish()
    }
}
