//! Error types shared across Pillbox.
//!
//! The split follows how callers are expected to react:
//!
//! - [`Error::NotFound`] and [`Error::Validation`] are user-facing and map to
//!   4xx responses at the API layer.
//! - [`Error::Storage`] and [`Error::Corrupt`] mean the backing store could
//!   not be read or rewritten safely. Mutating repository calls propagate
//!   these loudly rather than risk silently dropping records.
//!
//! Notification-permission denial is intentionally *not* an error: it is an
//! expected user choice, surfaced as a no-op at fire time.

use thiserror::Error;

/// Errors produced by the repository and storage layers.
#[derive(Debug, Error)]
pub enum Error {
    /// An update or delete referenced an id absent from the owner's set.
    #[error("no record with id {0} for this owner")]
    NotFound(i64),

    /// A record violated a data-model invariant before persistence.
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The underlying persistence read/write failed.
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    /// A stored record set could not be decoded on a mutation path.
    ///
    /// Rewriting a set we cannot fully decode would drop the undecodable
    /// records, so mutations fail instead. Read paths stay resilient: see
    /// `Repository::list`.
    #[error("stored record set is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a field-level validation failure.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_field() {
        let err = Error::validation("time_slots", "at least one time slot is required");
        assert_eq!(
            err.to_string(),
            "time_slots: at least one time slot is required"
        );
    }
}
