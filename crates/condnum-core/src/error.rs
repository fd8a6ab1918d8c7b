//! Error taxonomy for condition operations

use thiserror::Error;

/// Result type alias for condition operations
pub type ConditionResult<T> = Result<T, ConditionError>;

/// Errors surfaced by storage backends and services
///
/// Backend-specific failures are translated into one of these three kinds
/// before they leave a storage implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// Unexpected backend or storage fault
    #[error("internal failure: {0}")]
    Internal(String),

    /// Duplicate condition under an active create-lock, or a lost uniqueness race
    #[error("already exists: {0}")]
    Conflict(String),

    /// The referenced condition does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

impl ConditionError {
    pub fn internal(msg: impl Into<String>) -> Self {
        ConditionError::Internal(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ConditionError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ConditionError::NotFound(msg.into())
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, ConditionError::Internal(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ConditionError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ConditionError::NotFound(_))
    }
}
