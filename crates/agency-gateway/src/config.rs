//! Payment gateway configuration.
//!
//! Merchant credentials and the token endpoint. Loaded from the
//! environment in deployments; tests build one with [`GatewayConfig::local_mock`].

use url::Url;

use crate::signature::Signer;

/// Configuration for the outbound token request and inbound callback
/// verification.
///
/// Custom `Debug` implementation redacts `merchant_key` and `merchant_salt`
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Token endpoint (full URL, form POST).
    pub token_url: Url,
    /// Merchant identifier issued by the gateway.
    pub merchant_id: String,
    /// HMAC key for request tokens and callback hashes.
    pub merchant_key: String,
    /// Salt appended to every signed string.
    pub merchant_salt: String,
    /// Redirect target after a successful payment. `?sale_id=` is appended.
    pub ok_url: Option<Url>,
    /// Redirect target after a failed payment. `?sale_id=` is appended.
    pub fail_url: Option<Url>,
    /// ISO currency code sent with every request.
    pub currency: String,
    /// Gateway sandbox flag.
    pub test_mode: bool,
    /// Disallow installments entirely.
    pub no_installment: bool,
    /// Maximum installment count offered (0 = gateway default).
    pub max_installment: u8,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("token_url", &self.token_url)
            .field("merchant_id", &self.merchant_id)
            .field("merchant_key", &"[REDACTED]")
            .field("merchant_salt", &"[REDACTED]")
            .field("ok_url", &self.ok_url)
            .field("fail_url", &self.fail_url)
            .field("currency", &self.currency)
            .field("test_mode", &self.test_mode)
            .field("no_installment", &self.no_installment)
            .field("max_installment", &self.max_installment)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `GATEWAY_TOKEN_URL` (required)
    /// - `GATEWAY_MERCHANT_ID` (required)
    /// - `GATEWAY_MERCHANT_KEY` (required)
    /// - `GATEWAY_MERCHANT_SALT` (required)
    /// - `GATEWAY_OK_URL`, `GATEWAY_FAIL_URL` (optional)
    /// - `GATEWAY_CURRENCY` (default: `TL`)
    /// - `GATEWAY_TEST_MODE` (default: `false`)
    /// - `GATEWAY_NO_INSTALLMENT` (default: `false`)
    /// - `GATEWAY_MAX_INSTALLMENT` (default: 0)
    /// - `GATEWAY_TIMEOUT_SECS` (default: 20)
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            token_url: parse_url("GATEWAY_TOKEN_URL", &required("GATEWAY_TOKEN_URL")?)?,
            merchant_id: required("GATEWAY_MERCHANT_ID")?,
            merchant_key: required("GATEWAY_MERCHANT_KEY")?,
            merchant_salt: required("GATEWAY_MERCHANT_SALT")?,
            ok_url: optional_url("GATEWAY_OK_URL")?,
            fail_url: optional_url("GATEWAY_FAIL_URL")?,
            currency: std::env::var("GATEWAY_CURRENCY").unwrap_or_else(|_| "TL".to_string()),
            test_mode: env_flag("GATEWAY_TEST_MODE")?,
            no_installment: env_flag("GATEWAY_NO_INSTALLMENT")?,
            max_installment: env_number("GATEWAY_MAX_INSTALLMENT", 0)?,
            timeout_secs: env_number("GATEWAY_TIMEOUT_SECS", 20)?,
        })
    }

    /// Configuration pointing at a local mock server (for testing).
    pub fn local_mock(base: &str, key: &str, salt: &str) -> Result<Self, ConfigError> {
        let token_url = parse_url("local_mock", &format!("{}/api/get-token", base.trim_end_matches('/')))?;
        Ok(Self {
            token_url,
            merchant_id: "100001".to_string(),
            merchant_key: key.to_string(),
            merchant_salt: salt.to_string(),
            ok_url: None,
            fail_url: None,
            currency: "TL".to_string(),
            test_mode: true,
            no_installment: false,
            max_installment: 0,
            timeout_secs: 5,
        })
    }

    /// Signing material derived from this configuration.
    pub fn signer(&self) -> Signer {
        Signer::new(&self.merchant_key, &self.merchant_salt)
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

fn parse_url(var: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

fn optional_url(var: &str) -> Result<Option<Url>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => parse_url(var, &raw).map(Some),
        _ => Ok(None),
    }
}

fn env_flag(var: &str) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(false),
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "no" => Ok(false),
            "1" | "true" | "yes" => Ok(true),
            _ => Err(ConfigError::InvalidValue(var.to_string(), raw)),
        },
    }
}

fn env_number<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var.to_string(), raw)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(String, String),
}
