//! Error types for the export/import pipelines.
//!
//! The taxonomy follows the failure classes of the pipeline: missing
//! prerequisites (aggregated), violated preconditions, external-command
//! failures, version-gate mismatches, and malformed dump contents. Fatal
//! variants abort the run with a sentinel exit status; command failures in
//! non-critical steps are counted by the sequencer instead.

use thiserror::Error;

/// Main error type for mmsport operations.
#[derive(Debug, Error)]
pub enum MmsPortError {
    /// One or more required external tools could not be resolved.
    ///
    /// Always aggregated: every missing dependency is listed so the operator
    /// can fix all of them in one pass.
    #[error("required tools not found: {}; add them to PATH or set MONGO_HOME", tools.join(", "))]
    MissingTools { tools: Vec<String> },

    /// A precondition check failed before any destructive action.
    #[error("precondition failed: {message}")]
    Precondition { message: String },

    /// An external command exited non-zero.
    #[error("command failed ({status}): {command}\n{output}")]
    CommandFailed {
        command: String,
        status: i32,
        output: String,
    },

    /// The archive's version tag does not match the live target instance.
    #[error(
        "cannot import MMS data in version {archive} into an MMS server version {target}"
    )]
    VersionMismatch { archive: String, target: String },

    /// A file every MMS dump must contain is absent.
    #[error("that does not look like an MMS database, missing collection: {path}")]
    UnexpectedDump { path: String },

    /// I/O operation failed.
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration or usage error.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

/// Convenience type alias for Results with `MmsPortError`.
pub type Result<T> = std::result::Result<T, MmsPortError>;

impl MmsPortError {
    /// Creates a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an I/O error with path context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
