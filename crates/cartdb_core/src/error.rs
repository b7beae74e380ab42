//! Error types for the CartDB data layer.

use crate::entity::EntityId;
use thiserror::Error;

/// Result type for data layer operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while tracking or committing entities.
///
/// Errors raised by hooks and by the entity store travel through the
/// commit pipeline untouched; the pipeline never wraps or translates them.
#[derive(Debug, Error)]
pub enum DbError {
    /// A save hook failed.
    #[error("hook '{hook}' failed: {message}")]
    HookFailed {
        /// Name of the failing hook.
        hook: String,
        /// Description of the failure.
        message: String,
    },

    /// The backing store rejected a write.
    #[error("store error: {message}")]
    Store {
        /// Description of the failure.
        message: String,
    },

    /// An entity could not be encoded for change detection or storage.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The operation was cancelled through its cancel token.
    #[error("operation cancelled")]
    Cancelled,

    /// The entity is not tracked by this context.
    #[error("entity {entity_id} of kind {kind} is not tracked")]
    EntityNotTracked {
        /// Kind name of the entity.
        kind: &'static str,
        /// The untracked entity ID.
        entity_id: EntityId,
    },

    /// The entity is already tracked by this context.
    #[error("entity {entity_id} of kind {kind} is already tracked")]
    EntityAlreadyTracked {
        /// Kind name of the entity.
        kind: &'static str,
        /// The duplicate entity ID.
        entity_id: EntityId,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl DbError {
    /// Creates a hook failure error.
    pub fn hook_failed(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookFailed {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this error came from cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
