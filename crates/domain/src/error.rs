//! Unified error types for the domain layer
//!
//! Provides a common error type that can be used across all domain operations,
//! so rule evaluation can report failures without depending on storage or HTTP.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// State transition not allowed
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Reward configuration that cannot be evaluated (empty loot table, cyclic arcs)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Coin balance below the required spend
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },
}

impl DomainError {
    /// Creates a validation error for business rule violations.
    ///
    /// Use this when domain invariants or constraints are violated:
    /// - Required fields are empty or missing
    /// - Values are outside allowed ranges
    ///
    /// # Example
    /// ```ignore
    /// if drop.weight == 0 {
    ///     return Err(DomainError::validation("drop weight must be positive"));
    /// }
    /// ```
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Create an invalid state transition error
    pub fn invalid_state_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an insufficient funds error
    pub fn insufficient_funds(required: i64, available: i64) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = DomainError::validation("quantity must be at least 1");
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation failed: quantity must be at least 1"
        );
    }

    #[test]
    fn test_not_found_error() {
        let err = DomainError::not_found("Chest", "12");
        assert!(matches!(err, DomainError::NotFound { .. }));
        assert!(err.to_string().contains("Chest"));
        assert!(err.to_string().contains("12"));
    }

    #[test]
    fn test_configuration_error() {
        let err = DomainError::configuration("chest 3 has no active drops");
        assert_eq!(
            err.to_string(),
            "Configuration error: chest 3 has no active drops"
        );
    }

    #[test]
    fn test_insufficient_funds_error() {
        let err = DomainError::insufficient_funds(300, 120);
        assert_eq!(
            err.to_string(),
            "Insufficient funds: required 300, available 120"
        );
    }
}
