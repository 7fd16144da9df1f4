//! Error types for the scene core.
//!
//! Scene mutation never fails hard: stale references degrade to documented
//! defaults with a log warning. [`SceneError`] only surfaces from operations
//! with an external failure mode, chiefly (de)serialization.

use thiserror::Error;

/// The error type for scene serialization and resource plumbing.
#[derive(Error, Debug)]
pub enum SceneError {
    /// Underlying stream error while reading or writing scene data.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with the scene magic number.
    #[error("'{0}': invalid magic marker")]
    BadMagic(String),

    /// The file is not of the expected kind (wrong marker byte).
    #[error("'{0}': invalid scene marker")]
    BadMarker(String),

    /// The file version does not match the exact supported version.
    #[error("'{name}': unsupported binary version {version}")]
    BadVersion {
        /// Name the load was invoked with, for log context.
        name: String,
        /// Version found in the file.
        version: u32,
    },

    /// A string field in the file is not valid UTF-8.
    #[error("'{0}': malformed string data")]
    BadString(String),

    /// JSON scene document error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The read provider could not supply the requested content.
    #[error("cannot read '{0}'")]
    ReadFailed(String),
}

/// Alias for `Result<T, SceneError>`.
pub type Result<T> = std::result::Result<T, SceneError>;
