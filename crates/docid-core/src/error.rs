//! Error types for docid.

use thiserror::Error;

/// Top-level result type for docid operations.
pub type Result<T> = std::result::Result<T, DocIdError>;

/// Top-level error type for docid.
#[derive(Debug, Error)]
pub enum DocIdError {
    #[error("document type configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error(
        "could not reserve {requested} ids for '{doc_type}': skipped {skipped} colliding candidates"
    )]
    ReservationExhausted {
        doc_type: String,
        requested: usize,
        skipped: usize,
    },

    #[error("engine config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DocIdError {
    /// Whether the failure came from the store being unreachable (busy,
    /// locked, timed out, or not openable) rather than from bad input.
    #[must_use]
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Errors raised while parsing or validating a format template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template '{0}' has no {{{{COUNTER}}}} token")]
    MissingCounterToken(String),

    #[error("template '{template}' has an unterminated token at byte {offset}")]
    UnterminatedToken { template: String, offset: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_human_readable_messages() {
        let err = DocIdError::ConfigNotFound("XYZ".to_string());
        assert!(err.to_string().contains("XYZ"));

        let err = TemplateError::MissingCounterToken("{{PREFIX}}".to_string());
        let msg = err.to_string();
        assert!(msg.contains("{{COUNTER}}"), "got: {msg}");
        assert!(msg.contains("{{PREFIX}}"));

        let err = DocIdError::ReservationExhausted {
            doc_type: "EMP".to_string(),
            requested: 5,
            skipped: 10_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("EMP"));
        assert!(msg.contains("10000"));
    }

    #[test]
    fn only_store_unavailable_is_flagged() {
        assert!(DocIdError::StoreUnavailable("busy".into()).is_store_unavailable());
        assert!(!DocIdError::Store("constraint".into()).is_store_unavailable());
        assert!(!DocIdError::InvalidTenant("".into()).is_store_unavailable());
    }
}
