//! Error types for replicate core

use crate::record::Id;
use thiserror::Error;

/// Result type alias using the replicate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while dumping, encoding, decoding or loading records
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The codec could not decode the next unit of a stream
    #[error("Corrupt stream: {0}")]
    CorruptStream(String),

    /// A reference marker points at a record that was never loaded
    #[error("Missing reference: {target_type} {target_id} has not been loaded")]
    MissingReference {
        /// Declared type of the referenced record
        target_type: String,
        /// Producer-side id of the referenced record
        target_id: Id,
    },

    /// No reconstruction capability exists for a record type
    #[error("Unresolvable type: {0}")]
    UnresolvableType(String),

    /// A per-object capability failed while describing or reconstructing
    #[error("Replicant error for {type_name}: {message}")]
    Replicant {
        /// Record type being processed
        type_name: String,
        /// Failure description
        message: String,
    },

    /// A filter stage failed during observe or finish
    #[error("Filter error: {0}")]
    Filter(anyhow::Error),

    /// The session was already closed
    #[error("Session already closed")]
    SessionClosed,

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a corrupt stream error
    pub fn corrupt_stream(msg: impl Into<String>) -> Self {
        Self::CorruptStream(msg.into())
    }

    /// Create a missing reference error
    pub fn missing_reference(target_type: impl Into<String>, target_id: Id) -> Self {
        Self::MissingReference {
            target_type: target_type.into(),
            target_id,
        }
    }

    /// Create an unresolvable type error
    pub fn unresolvable_type(type_name: impl Into<String>) -> Self {
        Self::UnresolvableType(type_name.into())
    }

    /// Create a replicant error
    pub fn replicant(type_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Replicant {
            type_name: type_name.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap a stage failure.
    ///
    /// Stages report through `anyhow`; when the failure already is one of
    /// ours (a writer stage hitting an I/O error, say) it is unwrapped
    /// instead of nested.
    pub fn filter(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(other) => Self::Filter(other),
        }
    }

    /// True for errors raised because a record type has no capability
    pub fn is_unresolvable_type(&self) -> bool {
        matches!(self, Self::UnresolvableType(_))
    }
}
