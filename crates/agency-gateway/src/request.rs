//! Token request construction: basket encoding and the outbound form.

use agency_core::{round_money, to_minor_units, SaleId};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rust_decimal::Decimal;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::order_id;
use crate::signature::{CanonicalFields, Signer};

/// Address sent when the customer has none; the gateway rejects an empty one.
pub const DEFAULT_ADDRESS: &str = "unspecified";

/// One basket line.
#[derive(Debug, Clone, PartialEq)]
pub struct BasketItem {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// base64 of the JSON array `[[name, "price.2f", qty], ...]`.
pub fn encode_basket(items: &[BasketItem]) -> Result<String, GatewayError> {
    let rows: Vec<serde_json::Value> = items
        .iter()
        .map(|item| {
            serde_json::json!([
                item.name,
                format!("{:.2}", round_money(item.unit_price)),
                item.quantity
            ])
        })
        .collect();
    let json = serde_json::to_vec(&rows)
        .map_err(|e| GatewayError::InvalidRequest(format!("basket encoding failed: {e}")))?;
    Ok(STANDARD.encode(json))
}

/// Everything the gateway needs to issue a token for one sale.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub sale_id: SaleId,
    pub user_ip: String,
    pub email: String,
    pub amount: Decimal,
    pub basket: Vec<BasketItem>,
    pub user_name: String,
    pub user_phone: Option<String>,
    pub user_address: Option<String>,
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn with_sale_id(base: &Option<url::Url>, sale_id: SaleId) -> String {
    match base {
        Some(url) => {
            let mut url = url.clone();
            url.query_pairs_mut()
                .append_pair("sale_id", &sale_id.as_uuid().to_string());
            url.to_string()
        }
        None => String::new(),
    }
}

impl TokenRequest {
    /// Signed canonical fields plus the sanitized order id.
    pub fn canonical(&self, config: &GatewayConfig) -> Result<CanonicalFields, GatewayError> {
        if self.email.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("customer email is required".into()));
        }
        let minor = to_minor_units(self.amount)
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
        if minor <= 0 {
            return Err(GatewayError::InvalidRequest(format!(
                "payment amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(CanonicalFields {
            merchant_id: config.merchant_id.clone(),
            user_ip: self.user_ip.clone(),
            merchant_oid: order_id::for_sale(self.sale_id),
            email: self.email.trim().to_string(),
            payment_amount: minor.to_string(),
            user_basket: encode_basket(&self.basket)?,
            no_installment: flag(config.no_installment),
            max_installment: config.max_installment.to_string(),
            currency: config.currency.clone(),
            test_mode: flag(config.test_mode),
        })
    }

    /// Full form body, token included.
    pub fn to_form(
        &self,
        config: &GatewayConfig,
        signer: &Signer,
    ) -> Result<Vec<(&'static str, String)>, GatewayError> {
        let canonical = self.canonical(config)?;
        let token = signer.request_token(&canonical)?;
        let address = self
            .user_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_ADDRESS)
            .to_string();

        Ok(vec![
            ("merchant_id", canonical.merchant_id),
            ("user_ip", canonical.user_ip),
            ("merchant_oid", canonical.merchant_oid),
            ("email", canonical.email),
            ("payment_amount", canonical.payment_amount),
            ("request_token", token),
            ("user_basket", canonical.user_basket),
            ("no_installment", canonical.no_installment),
            ("max_installment", canonical.max_installment),
            ("user_name", self.user_name.clone()),
            ("user_address", address),
            ("user_phone", self.user_phone.clone().unwrap_or_default()),
            ("merchant_ok_url", with_sale_id(&config.ok_url, self.sale_id)),
            ("merchant_fail_url", with_sale_id(&config.fail_url, self.sale_id)),
            ("currency", canonical.currency),
            ("test_mode", canonical.test_mode),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> TokenRequest {
        TokenRequest {
            sale_id: SaleId::new(),
            user_ip: "85.34.78.112".into(),
            email: "ayse@example.com".into(),
            amount: dec!(1200),
            basket: vec![BasketItem {
                name: "Kasko".into(),
                unit_price: dec!(1200),
                quantity: 1,
            }],
            user_name: "Ayse Yilmaz".into(),
            user_phone: None,
            user_address: Some("   ".into()),
        }
    }

    fn config() -> GatewayConfig {
        let mut cfg = GatewayConfig::local_mock("http://127.0.0.1:9000", "k", "s").unwrap();
        cfg.ok_url = Some("https://shop.example/payment/ok".parse().unwrap());
        cfg
    }

    fn field<'a>(form: &'a [(&'static str, String)], name: &str) -> &'a str {
        form.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str()).unwrap()
    }

    #[test]
    fn basket_prices_have_two_decimals() {
        let encoded = encode_basket(&request().basket).unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            r#"[["Kasko","1200.00",1]]"#
        );
    }

    #[test]
    fn amount_is_sent_in_minor_units() {
        let canonical = request().canonical(&config()).unwrap();
        assert_eq!(canonical.payment_amount, "120000");
        assert_eq!(canonical.test_mode, "1");
        assert_eq!(canonical.no_installment, "0");
        assert_eq!(canonical.merchant_oid.len(), 32);
    }

    #[test]
    fn blank_address_gets_placeholder() {
        let cfg = config();
        let form = request().to_form(&cfg, &cfg.signer()).unwrap();
        assert_eq!(field(&form, "user_address"), DEFAULT_ADDRESS);
    }

    #[test]
    fn redirect_urls_carry_sale_id() {
        let cfg = config();
        let req = request();
        let form = req.to_form(&cfg, &cfg.signer()).unwrap();
        assert_eq!(
            field(&form, "merchant_ok_url"),
            format!("https://shop.example/payment/ok?sale_id={}", req.sale_id.as_uuid())
        );
        assert_eq!(field(&form, "merchant_fail_url"), "");
    }

    #[test]
    fn missing_email_is_rejected() {
        let mut req = request();
        req.email = " ".into();
        assert!(matches!(
            req.canonical(&config()),
            Err(GatewayError::InvalidRequest(_))
        ));
    }
}
