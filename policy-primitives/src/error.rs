//! Shared error definitions for policy primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the primitives crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive policy types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided identifier could not be parsed as a UUID.
    #[error("invalid identifier: {source}")]
    InvalidId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Policy name failed the length or charset constraint.
    #[error("invalid policy name `{name}`: {reason}")]
    InvalidPolicyName {
        /// The offending name string.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Evaluation metadata failed validation.
    #[error("invalid evaluation metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The supplied value could not be interpreted as a config document.
    #[error("invalid config document: {source}")]
    InvalidDocument {
        /// Source deserialization error.
        #[from]
        source: serde_json::Error,
    },
}
