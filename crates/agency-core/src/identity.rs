//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every record identifier. These prevent accidental
//! identifier confusion -- a sale id cannot be handed to a lookup that
//! expects a payment id.
//!
//! All identifiers are UUID v4 and serialize transparently as the bare
//! hyphenated UUID string.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }
    };
}

define_id!(
    /// Top-level tenant owning branches and a base commission rate.
    AgencyId,
    "agency"
);
define_id!(
    /// Sub-unit of an agency.
    BranchId,
    "branch"
);
define_id!(
    /// A sale (policy) record.
    SaleId,
    "sale"
);
define_id!(
    /// A payment row belonging to a sale.
    PaymentId,
    "payment"
);
define_id!(
    /// A customer record.
    CustomerId,
    "customer"
);
define_id!(
    /// A vehicle record, naturally keyed by its normalized plate.
    VehicleId,
    "vehicle"
);
define_id!(
    /// A sellable package.
    PackageId,
    "package"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(SaleId::new(), SaleId::new());
    }

    #[test]
    fn display_is_prefixed() {
        let uuid = Uuid::nil();
        assert_eq!(
            AgencyId::from_uuid(uuid).to_string(),
            "agency:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_string(&SaleId(uuid)).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
        let back: SaleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.0, uuid);
    }
}
