use std::env;
use std::time::Duration;

use coinvoice::{ProcessorConfig, VerificationMode, WebhookConfig};
use url::Url;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_PATH: &str = "./invoices.db";
const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_RATE_LIMIT_RPM: u32 = 60;

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// SQLite database path (`:memory:` for a throwaway store)
    pub db_path: String,
    /// Base of the payer-facing invoice page, used to build `paymentUrl`
    pub frontend_base_url: String,
    pub processor: ProcessorConfig,
    pub webhook: WebhookConfig,
    /// CORS allowed origins
    pub allowed_origins: Vec<String>,
    /// Rate limit requests per minute
    pub rate_limit_rpm: u32,
    /// Bearer token for status updates (None = open, permissive mode only)
    pub admin_token: Option<String>,
    /// Bearer token required for /metrics
    pub metrics_token: Option<String>,
    /// Serve /metrics without a token when none is configured
    pub public_metrics: bool,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("frontend_base_url", &self.frontend_base_url)
            .field("processor", &self.processor)
            .field("webhook", &self.webhook)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field(
                "admin_token",
                &self.admin_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("public_metrics", &self.public_metrics)
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = parse_or(var("PORT"), "PORT", DEFAULT_PORT)?;
        let db_path = var("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let frontend_base_url =
            var("FRONTEND_BASE_URL").unwrap_or_else(|| DEFAULT_FRONTEND_BASE_URL.to_string());
        Url::parse(&frontend_base_url)
            .map_err(|_| ConfigError::InvalidUrl(frontend_base_url.clone()))?;

        let defaults = ProcessorConfig::default();
        let processor_url = var("PROCESSOR_API_URL").unwrap_or(defaults.base_url);
        Url::parse(&processor_url).map_err(|_| ConfigError::InvalidUrl(processor_url.clone()))?;

        let timeout_secs = parse_or(
            var("PROVISION_TIMEOUT_SECS"),
            "PROVISION_TIMEOUT_SECS",
            defaults.timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PROVISION_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        let processor = ProcessorConfig {
            base_url: processor_url,
            api_key: var("PROCESSOR_API_KEY"),
            currency: var("SETTLEMENT_CURRENCY").unwrap_or(defaults.currency),
            chain: var("SETTLEMENT_CHAIN").unwrap_or(defaults.chain),
            timeout: Duration::from_secs(timeout_secs),
        };

        let mode = match var("WEBHOOK_VERIFICATION") {
            Some(raw) => raw
                .parse::<VerificationMode>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "WEBHOOK_VERIFICATION",
                    value: raw,
                })?,
            None => VerificationMode::Strict,
        };
        let webhook = WebhookConfig {
            signing_secret: var("WEBHOOK_SIGNING_SECRET").map(String::into_bytes),
            mode,
        };

        let allowed_origins: Vec<String> = var("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec![frontend_base_url.trim_end_matches('/').to_string()]);

        let rate_limit_rpm = parse_or(var("RATE_LIMIT_RPM"), "RATE_LIMIT_RPM", DEFAULT_RATE_LIMIT_RPM)?;
        if rate_limit_rpm == 0 {
            return Err(ConfigError::InvalidValue {
                name: "RATE_LIMIT_RPM",
                value: "0".to_string(),
            });
        }

        let admin_token = var("ADMIN_TOKEN");
        let metrics_token = var("METRICS_TOKEN");
        let public_metrics = var("PUBLIC_METRICS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        match (&webhook.signing_secret, webhook.mode) {
            (None, VerificationMode::Strict) => {
                tracing::error!(
                    "WEBHOOK_SIGNING_SECRET is required with strict webhook verification. \
                     For local development only, set WEBHOOK_VERIFICATION=permissive."
                );
                return Err(ConfigError::MissingRequired("WEBHOOK_SIGNING_SECRET"));
            }
            (Some(secret), _) if secret.len() < 32 => {
                tracing::warn!(
                    "WEBHOOK_SIGNING_SECRET is short ({} bytes); use at least 32",
                    secret.len()
                );
            }
            _ => {}
        }

        if allowed_origins.iter().any(|o| o == "*") && webhook.mode == VerificationMode::Strict {
            tracing::error!(
                "Wildcard CORS origin '*' is only allowed with WEBHOOK_VERIFICATION=permissive"
            );
            return Err(ConfigError::InvalidValue {
                name: "ALLOWED_ORIGINS",
                value: "*".to_string(),
            });
        }

        if admin_token.is_none() {
            if webhook.mode == VerificationMode::Strict {
                tracing::error!(
                    "ADMIN_TOKEN is required with strict webhook verification; without it anyone \
                     could set invoice status. For local development only, set WEBHOOK_VERIFICATION=permissive."
                );
                return Err(ConfigError::MissingRequired("ADMIN_TOKEN"));
            }
            tracing::warn!("ADMIN_TOKEN not set; status updates are unauthenticated (permissive mode)");
        }

        if processor.api_key.is_none() {
            tracing::warn!(
                "PROCESSOR_API_KEY not set; every invoice will get a local fallback address"
            );
        }
        if metrics_token.is_none() && !public_metrics {
            tracing::info!("METRICS_TOKEN not set; /metrics is disabled (set PUBLIC_METRICS=true to expose it)");
        }

        Ok(Self {
            port,
            db_path,
            frontend_base_url,
            processor,
            webhook,
            allowed_origins,
            rate_limit_rpm,
            admin_token,
            metrics_token,
            public_metrics,
        })
    }

    /// Payer-facing link for an invoice.
    pub fn payment_url(&self, invoice_id: &impl std::fmt::Display) -> String {
        format!(
            "{}/invoice/{}",
            self.frontend_base_url.trim_end_matches('/'),
            invoice_id
        )
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ADMIN: (&str, &str) = ("ADMIN_TOKEN", "admin");

    fn load(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_secret() {
        let config = load(&[("WEBHOOK_SIGNING_SECRET", "whsec"), ADMIN]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path, "./invoices.db");
        assert_eq!(config.rate_limit_rpm, 60);
        assert_eq!(config.processor.currency, "USD");
        assert_eq!(config.processor.chain, "ETH");
        assert_eq!(config.processor.timeout, Duration::from_secs(10));
        assert!(config.processor.api_key.is_none());
        assert_eq!(config.webhook.mode, VerificationMode::Strict);
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
        assert!(!config.public_metrics);
    }

    #[test]
    fn test_strict_without_secret_refuses() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingRequired("WEBHOOK_SIGNING_SECRET")
        ));

        let config = load(&[("WEBHOOK_VERIFICATION", "permissive")]).unwrap();
        assert_eq!(config.webhook.mode, VerificationMode::Permissive);
        assert!(config.webhook.signing_secret.is_none());
    }

    #[test]
    fn test_open_admin_path_only_in_permissive_mode() {
        let err = load(&[("WEBHOOK_SIGNING_SECRET", "whsec")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired("ADMIN_TOKEN")));

        let config = load(&[("WEBHOOK_VERIFICATION", "permissive")]).unwrap();
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let secret = ("WEBHOOK_SIGNING_SECRET", "whsec");
        assert!(matches!(
            load(&[secret, ADMIN, ("PORT", "eighty")]).unwrap_err(),
            ConfigError::InvalidValue { name: "PORT", .. }
        ));
        assert!(matches!(
            load(&[secret, ADMIN, ("PROCESSOR_API_URL", "not a url")]).unwrap_err(),
            ConfigError::InvalidUrl(_)
        ));
        assert!(matches!(
            load(&[secret, ADMIN, ("WEBHOOK_VERIFICATION", "lenient")]).unwrap_err(),
            ConfigError::InvalidValue { name: "WEBHOOK_VERIFICATION", .. }
        ));
        assert!(matches!(
            load(&[secret, ADMIN, ("RATE_LIMIT_RPM", "0")]).unwrap_err(),
            ConfigError::InvalidValue { name: "RATE_LIMIT_RPM", .. }
        ));
        assert!(matches!(
            load(&[secret, ADMIN, ("ALLOWED_ORIGINS", "*")]).unwrap_err(),
            ConfigError::InvalidValue { name: "ALLOWED_ORIGINS", .. }
        ));
    }

    #[test]
    fn test_payment_url_tolerates_trailing_slash() {
        let config = load(&[
            ("WEBHOOK_SIGNING_SECRET", "whsec"),
            ADMIN,
            ("FRONTEND_BASE_URL", "https://pay.example.com/"),
        ])
        .unwrap();
        assert_eq!(
            config.payment_url(&"abc"),
            "https://pay.example.com/invoice/abc"
        );
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let config = load(&[
            ("WEBHOOK_SIGNING_SECRET", "whsec-value"),
            ("ADMIN_TOKEN", "admin-value"),
            ("METRICS_TOKEN", "metrics-value"),
            ("PROCESSOR_API_KEY", "key-value"),
        ])
        .unwrap();
        let out = format!("{config:?}");
        for secret in ["whsec-value", "admin-value", "metrics-value", "key-value"] {
            assert!(!out.contains(secret), "{secret} leaked");
        }
    }
}
