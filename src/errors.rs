//! Error taxonomy for the platform core.
//!
//! Every fallible operation in this crate returns [`CoreError`]. The
//! variants map one-to-one onto the error kinds the ingress layer
//! translates into HTTP responses, so callers can match on the kind
//! without parsing messages.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the platform core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid input: missing activity parameters, a malformed or
    /// out-of-vocabulary formula, or a provider response that fails
    /// schema validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An entity id that does not resolve to a stored document.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// A provider call failed: network error or non-2xx response.
    /// Provider calls are single best-effort attempts, never retried.
    #[error("activity provider request failed: {0}")]
    Provider(String),

    /// The operation would break a reference another document holds,
    /// e.g. deleting an activity still listed in an IAP.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Formula evaluation failed: unbound variable or division by zero.
    #[error("formula error: {0}")]
    Formula(String),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] with the given entity kind.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether this error originated in a provider call.
    pub fn is_provider(&self) -> bool {
        matches!(self, CoreError::Provider(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CoreError::not_found("iap", "abc123");
        assert_eq!(err.to_string(), "iap abc123 not found");
    }

    #[test]
    fn test_is_provider() {
        assert!(CoreError::Provider("boom".into()).is_provider());
        assert!(!CoreError::Validation("bad".into()).is_provider());
    }
}
