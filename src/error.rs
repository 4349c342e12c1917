//! Error types for the connection engine.
//!
//! Matching itself never fails; a failed tolerance check is simply "no
//! connection". Errors only come from collaborators feeding the engine.

use thiserror::Error;

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors that can occur while driving a connection search.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connector source could not produce connectors for a part.
    #[error("connector extraction failed for part '{part}': {message}")]
    Extraction {
        /// Name of the part definition.
        part: String,
        /// Collaborator-provided failure description.
        message: String,
    },

    /// A node handle was not part of the scene it was used with.
    #[error("unknown scene node {0}")]
    UnknownNode(String),
}

impl ConnectionError {
    /// Convenience constructor for extraction failures.
    pub fn extraction(part: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            part: part.into(),
            message: message.into(),
        }
    }
}
