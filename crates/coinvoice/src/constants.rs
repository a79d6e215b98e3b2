use std::time::Duration;

/// Days between invoice creation and its recorded expiry deadline.
pub const INVOICE_TTL_DAYS: i64 = 30;

/// Maximum memo length, in characters.
pub const MAX_MEMO_LEN: usize = 1000;

/// Maximum payer name length, in characters.
pub const MAX_PAYER_NAME_LEN: usize = 100;

/// Maximum contact (e-mail) length, in characters.
pub const MAX_CONTACT_LEN: usize = 254;

/// Amounts carry at most this many fractional digits.
pub const AMOUNT_SCALE: u32 = 6;

/// Amounts carry at most this many integer digits.
pub const AMOUNT_MAX_INTEGER_DIGITS: u32 = 12;

/// Default processor API base URL (sandbox).
pub const DEFAULT_PROCESSOR_URL: &str = "https://api-sandbox.circle.com";

/// Path of the processor's deposit-address endpoint.
pub const DEPOSIT_ADDRESS_PATH: &str = "/v1/wallets/addresses/deposit";

/// Settlement currency requested for new deposit addresses.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Settlement chain requested for new deposit addresses.
pub const DEFAULT_CHAIN: &str = "ETH";

/// Upper bound on a single address-provisioning call.
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(10);

/// How many addresses creation will try before giving up on collisions.
pub const MAX_PROVISION_ATTEMPTS: u32 = 3;

/// Prefix marking a locally synthesized deposit address.
pub const FALLBACK_ADDRESS_PREFIX: &str = "local-0x";

/// Header carrying the processor's webhook signature.
pub const SIGNATURE_HEADER: &str = "X-Circle-Signature";

/// Event kind the reconciler acts on.
pub const TRANSFER_EVENT: &str = "transfer";

/// Transfer status that counts as settled funds.
pub const TRANSFER_COMPLETE: &str = "complete";
