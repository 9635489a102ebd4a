//! # agency-store -- Repository Ports and Storage Engines
//!
//! Every mutation sequence in the settlement core runs inside one
//! [`UnitOfWork`]: a transaction context opened from a [`SettlementStore`]
//! and threaded explicitly through every sub-operation. Nothing is visible
//! to other units of work until [`UnitOfWork::commit`]; dropping or rolling
//! back discards everything.
//!
//! ## Engines
//!
//! | Engine | Module | Isolation |
//! |--------|--------|-----------|
//! | In-memory | [`memory`] | Serializable: one unit of work at a time |
//! | PostgreSQL | [`postgres`] | Read committed + `SELECT … FOR UPDATE` on every row read inside a unit of work |
//!
//! The PostgreSQL engine relies on row locks taken by the reads so that a
//! balance check and the subsequent balance write cannot interleave with a
//! concurrent unit of work touching the same agency, branch, sale or payment.

pub mod error;
pub mod memory;
pub mod ports;
pub mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use ports::{SettlementStore, StoreHandle, UnitOfWork};
pub use postgres::PgStore;
