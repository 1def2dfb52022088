//! Error type shared by the use cases.

use labquest_domain::DomainError;

use crate::infrastructure::ports::RepoError;

/// Failure of an engine command. Nothing here is retried by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// The command is not allowed in the current state (claiming twice,
    /// advancing a locked arc, re-awarding a held badge).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    /// Reward configuration that cannot be evaluated.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed command input.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

impl EngineError {
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<DomainError> for EngineError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(msg) => Self::Validation(msg),
            DomainError::NotFound { entity_type, id } => Self::NotFound { entity_type, id },
            DomainError::InvalidStateTransition(msg) => Self::InvalidState(msg),
            DomainError::Configuration(msg) => Self::Configuration(msg),
            DomainError::InsufficientFunds {
                required,
                available,
            } => Self::InsufficientFunds {
                required,
                available,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_onto_the_engine_taxonomy() {
        assert!(matches!(
            EngineError::from(DomainError::configuration("empty loot table")),
            EngineError::Configuration(_)
        ));
        assert!(matches!(
            EngineError::from(DomainError::invalid_state_transition("claimed")),
            EngineError::InvalidState(_)
        ));
        assert!(matches!(
            EngineError::from(DomainError::insufficient_funds(50, 10)),
            EngineError::InsufficientFunds {
                required: 50,
                available: 10
            }
        ));
    }
}
