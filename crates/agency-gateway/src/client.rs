//! Outbound token request.
//!
//! `POST {token_url}` as `application/x-www-form-urlencoded`. The gateway
//! answers with JSON:
//!
//! ```text
//! {"status":"success","token":"..."}
//! {"status":"failed","reason":"..."}
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::request::TokenRequest;
use crate::signature::Signer;

const ENDPOINT: &str = "get-token";

/// Token issued by the gateway for one sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentToken {
    pub token: String,
    /// Sanitized order id the gateway will echo in callbacks.
    pub merchant_oid: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum TokenResponse {
    Success { token: String },
    Failed {
        #[serde(default)]
        reason: String,
    },
}

/// HTTP client for the payment gateway. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
    signer: Signer,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;
        let signer = config.signer();
        Ok(Self {
            http,
            config,
            signer,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Signing material for callback verification.
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Ask the gateway for a payment token. No local state changes, so a
    /// caller may repeat this after any error.
    pub async fn request_token(&self, req: &TokenRequest) -> Result<PaymentToken, GatewayError> {
        let form = req.to_form(&self.config, &self.signer)?;
        let merchant_oid = form
            .iter()
            .find(|(k, _)| *k == "merchant_oid")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let url = self.config.token_url.clone();

        tracing::debug!(sale_id = %req.sale_id, merchant_oid = %merchant_oid, "requesting payment token");

        let resp = crate::retry::retry_send(ENDPOINT, || self.http.post(url.clone()).form(&form).send())
            .await
            .map_err(|e| GatewayError::Http {
                endpoint: ENDPOINT.into(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            return Err(GatewayError::ApiError {
                endpoint: ENDPOINT.into(),
                status,
                body,
            });
        }

        let parsed: TokenResponse = resp.json().await.map_err(|e| GatewayError::Deserialization {
            endpoint: ENDPOINT.into(),
            source: e,
        })?;

        match parsed {
            TokenResponse::Success { token } => {
                tracing::info!(sale_id = %req.sale_id, "payment token issued");
                Ok(PaymentToken {
                    token,
                    merchant_oid,
                })
            }
            TokenResponse::Failed { reason } => {
                tracing::warn!(sale_id = %req.sale_id, reason = %reason, "gateway refused token request");
                Err(GatewayError::Rejected { reason })
            }
        }
    }
}
