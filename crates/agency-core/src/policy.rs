//! Policy number generation.
//!
//! Format: `YYYYMMDDHHMMSS` followed by a four-digit random suffix. Two
//! sales created in the same second collide with probability 1/10000;
//! no uniqueness retry is performed.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Generate a policy number for a sale created at `now`.
pub fn generate_policy_number(now: DateTime<Utc>) -> String {
    generate_policy_number_with(now, &mut rand::thread_rng())
}

/// Generate a policy number with an explicit random source.
pub fn generate_policy_number_with<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    let suffix: u16 = rng.gen_range(0..10_000);
    format!("{}{suffix:04}", now.format("%Y%m%d%H%M%S"))
}
