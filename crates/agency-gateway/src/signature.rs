//! # Request Token and Callback Hash
//!
//! Both directions use base64(HMAC-SHA256(merchant_key, message)). The
//! message layouts are fixed by the gateway and must stay byte-exact:
//!
//! | Direction | Message |
//! |-----------|---------|
//! | Token request | `merchant_id ‖ user_ip ‖ merchant_oid ‖ email ‖ payment_amount ‖ user_basket ‖ no_installment ‖ max_installment ‖ currency ‖ test_mode ‖ salt` |
//! | Callback | `merchant_oid ‖ salt ‖ status ‖ total_amount` |
//!
//! Absent optional fields contribute an empty string; nothing is skipped.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// Fields of the token request that enter the signature, already rendered
/// as the strings sent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalFields {
    pub merchant_id: String,
    pub user_ip: String,
    pub merchant_oid: String,
    pub email: String,
    pub payment_amount: String,
    pub user_basket: String,
    pub no_installment: String,
    pub max_installment: String,
    pub currency: String,
    pub test_mode: String,
}

impl CanonicalFields {
    /// Concatenate in gateway order, without the salt.
    pub fn concat(&self) -> String {
        [
            self.merchant_id.as_str(),
            self.user_ip.as_str(),
            self.merchant_oid.as_str(),
            self.email.as_str(),
            self.payment_amount.as_str(),
            self.user_basket.as_str(),
            self.no_installment.as_str(),
            self.max_installment.as_str(),
            self.currency.as_str(),
            self.test_mode.as_str(),
        ]
        .concat()
    }
}

/// Merchant key and salt. `Debug` never prints either.
#[derive(Clone)]
pub struct Signer {
    key: String,
    salt: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("key", &"[REDACTED]")
            .field("salt", &"[REDACTED]")
            .finish()
    }
}

impl Signer {
    pub fn new(key: &str, salt: &str) -> Self {
        Self {
            key: key.to_string(),
            salt: salt.to_string(),
        }
    }

    fn mac(&self, parts: &[&str]) -> Result<String, GatewayError> {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .map_err(|e| GatewayError::InvalidRequest(format!("signing key rejected: {e}")))?;
        for part in parts {
            mac.update(part.as_bytes());
        }
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Request token over the canonical fields followed by the salt.
    pub fn request_token(&self, fields: &CanonicalFields) -> Result<String, GatewayError> {
        self.mac(&[&fields.concat(), &self.salt])
    }

    /// Hash the gateway is expected to send with a callback.
    pub fn callback_hash(
        &self,
        merchant_oid: &str,
        status: &str,
        total_amount: &str,
    ) -> Result<String, GatewayError> {
        self.mac(&[merchant_oid, &self.salt, status, total_amount])
    }

    /// Constant-time comparison of a presented callback hash.
    pub fn verify_callback(
        &self,
        merchant_oid: &str,
        status: &str,
        total_amount: &str,
        presented: &str,
    ) -> bool {
        match self.callback_hash(merchant_oid, status, total_amount) {
            Ok(expected) => expected.as_bytes().ct_eq(presented.trim().as_bytes()).into(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> Signer {
        Signer::new("merchant-key", "merchant-salt")
    }

    fn fields() -> CanonicalFields {
        CanonicalFields {
            merchant_id: "100001".into(),
            user_ip: "85.34.78.112".into(),
            merchant_oid: "10b561c951604c83b0b84f675673a192".into(),
            email: "ayse@example.com".into(),
            payment_amount: "120000".into(),
            user_basket: "W1siS2Fza28iLCIxMjAwLjAwIiwxXV0=".into(),
            no_installment: "0".into(),
            max_installment: "0".into(),
            currency: "TL".into(),
            test_mode: "1".into(),
        }
    }

    #[test]
    fn concat_keeps_gateway_order() {
        let f = fields();
        assert_eq!(
            f.concat(),
            "10000185.34.78.11210b561c951604c83b0b84f675673a192ayse@example.com\
             120000W1siS2Fza28iLCIxMjAwLjAwIiwxXV0=00TL1"
        );
    }

    #[test]
    fn empty_fields_still_occupy_their_slot() {
        let mut f = fields();
        f.email.clear();
        let with_empty = signer().request_token(&f).unwrap();
        let full = signer().request_token(&fields()).unwrap();
        assert_ne!(with_empty, full);
    }

    #[test]
    fn token_matches_manual_hmac() {
        let f = fields();
        let mut mac = HmacSha256::new_from_slice(b"merchant-key").unwrap();
        mac.update(format!("{}merchant-salt", f.concat()).as_bytes());
        let expected = STANDARD.encode(mac.finalize().into_bytes());
        assert_eq!(signer().request_token(&f).unwrap(), expected);
    }

    #[test]
    fn callback_hash_layout() {
        let mut mac = HmacSha256::new_from_slice(b"merchant-key").unwrap();
        mac.update(b"oid123merchant-saltsuccess120000");
        let expected = STANDARD.encode(mac.finalize().into_bytes());
        assert_eq!(
            signer().callback_hash("oid123", "success", "120000").unwrap(),
            expected
        );
    }

    #[test]
    fn verify_accepts_genuine_and_rejects_tampered() {
        let s = signer();
        let hash = s.callback_hash("oid123", "success", "120000").unwrap();
        assert!(s.verify_callback("oid123", "success", "120000", &hash));
        assert!(!s.verify_callback("oid123", "success", "120001", &hash));
        assert!(!s.verify_callback("oid123", "failed", "120000", &hash));
        assert!(!s.verify_callback("oid123", "success", "120000", ""));
        assert!(!Signer::new("other-key", "merchant-salt").verify_callback(
            "oid123", "success", "120000", &hash
        ));
    }

    #[test]
    fn debug_is_redacted() {
        assert!(!format!("{:?}", signer()).contains("merchant-key"));
    }
}
