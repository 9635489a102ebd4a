//! Storage error types.

use thiserror::Error;

/// Errors raised by a storage engine.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unit of work could not be opened at all.
    #[error("failed to open unit of work: {0}")]
    Begin(String),

    /// A natural or primary key already exists.
    #[error("duplicate {kind}: {key}")]
    Duplicate {
        /// Record kind.
        kind: &'static str,
        /// Conflicting key.
        key: String,
    },

    /// An update targeted a row that does not exist.
    #[error("{kind} {id} does not exist")]
    Missing {
        /// Record kind.
        kind: &'static str,
        /// Identifier.
        id: String,
    },

    /// A persisted value could not be decoded into a domain type.
    #[error("corrupt {kind} row: {reason}")]
    Corrupt {
        /// Record kind.
        kind: &'static str,
        /// What failed to decode.
        reason: String,
    },

    /// Database driver error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn missing(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::Missing {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn corrupt(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            kind,
            reason: reason.into(),
        }
    }
}
