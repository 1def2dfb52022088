//! Errors raised by the store ports.

/// Store failure, tagged with the entity or operation it came from.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// The driver failed. `operation` names the statement for the logs.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// A stored row or JSON column no longer decodes.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A write lost to a concurrent writer or broke a store constraint.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl RepoError {
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    pub fn constraint(message: impl ToString) -> Self {
        Self::ConstraintViolation(message.to_string())
    }
}

impl From<labquest_domain::DomainError> for RepoError {
    /// Stored rows that no longer parse into domain values.
    fn from(e: labquest_domain::DomainError) -> Self {
        Self::Serialization(e.to_string())
    }
}
