//! # Order Id Mapping
//!
//! The gateway accepts only alphanumeric merchant order ids, so the sale's
//! hyphenated UUID is sent with the hyphens removed. Callbacks echo the
//! sanitized form back; [`restore`] reinserts the hyphens at the fixed
//! UUID group offsets (8-4-4-4-12) to recover the sale id.

use agency_core::SaleId;
use uuid::Uuid;

/// Hyphen positions in the restored string, ascending.
const HYPHEN_OFFSETS: [usize; 4] = [8, 12, 16, 20];

/// Length of a sanitized UUID.
const SANITIZED_LEN: usize = 32;

/// Strip every non-alphanumeric character.
pub fn sanitize(order_id: &str) -> String {
    order_id.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Sanitized order id for a sale.
pub fn for_sale(sale_id: SaleId) -> String {
    sanitize(&sale_id.as_uuid().to_string())
}

/// Reinsert hyphens into a sanitized id.
///
/// Strings that are not exactly 32 alphanumeric characters are returned
/// unchanged, so an id that was never sanitized passes through.
pub fn restore(sanitized: &str) -> String {
    if sanitized.len() != SANITIZED_LEN || !sanitized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return sanitized.to_string();
    }
    let mut out = String::with_capacity(SANITIZED_LEN + HYPHEN_OFFSETS.len());
    for (i, c) in sanitized.chars().enumerate() {
        if HYPHEN_OFFSETS.contains(&i) {
            out.push('-');
        }
        out.push(c);
    }
    out
}

/// Resolve a callback's `merchant_oid` to the sale it was issued for.
pub fn sale_id_from(merchant_oid: &str) -> Option<SaleId> {
    Uuid::parse_str(&restore(merchant_oid.trim())).ok().map(SaleId)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "10b561c9-5160-4c83-b0b8-4f675673a192";
    const SANITIZED: &str = "10b561c951604c83b0b84f675673a192";

    #[test]
    fn sanitize_strips_hyphens() {
        assert_eq!(sanitize(ORIGINAL), SANITIZED);
    }

    #[test]
    fn restore_reinserts_hyphens() {
        assert_eq!(restore(SANITIZED), ORIGINAL);
    }

    #[test]
    fn restore_passes_through_other_shapes() {
        assert_eq!(restore(ORIGINAL), ORIGINAL);
        assert_eq!(restore("abc"), "abc");
    }

    #[test]
    fn resolves_sale_id() {
        let id = sale_id_from(SANITIZED).unwrap();
        assert_eq!(id.as_uuid().to_string(), ORIGINAL);
        assert_eq!(for_sale(id), SANITIZED);
    }

    #[test]
    fn garbage_does_not_resolve() {
        assert!(sale_id_from("not-an-order").is_none());
        assert!(sale_id_from("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_none());
    }
}
