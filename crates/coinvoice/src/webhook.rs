//! Inbound notification payloads from the payment processor.

use serde::{Deserialize, Serialize};

/// A processor notification. Only `type == "transfer"` is acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: TransferData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferData {
    pub id: String,
    pub source: TransferEndpoint,
    pub destination: TransferEndpoint,
    pub amount: TransferAmount,
    pub status: String,
    pub create_date: String,
}

/// Either side of a transfer. Blockchain destinations carry an `address`;
/// wallet-to-wallet legs carry an `id` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEndpoint {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Amount as the processor reports it: a decimal string plus currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAmount {
    pub amount: String,
    pub currency: String,
}

impl Notification {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Destination address, if present and non-blank.
    pub fn destination_address(&self) -> Option<&str> {
        self.data
            .destination
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}
