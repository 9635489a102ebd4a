//! # API Route Modules
//!
//! - `tenancy`: agencies, branches, packages, rates and deposits.
//! - `sales`: sale completion, lookup, payment tokens and refunds.
//! - `payments`: the gateway callback (hash-authenticated, no bearer token).

pub mod payments;
pub mod sales;
pub mod tenancy;
