use std::fmt;

use serde::Serialize;

use crate::version::VersionError;

/// Which transform of a migration is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Forward (`up`), during a migration run.
    Up,
    /// Backward (`down`), during a rollback.
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// Error during migration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MigrationError {
    /// The backing store failed to read or write.
    #[error("storage error: {0}")]
    Storage(String),
    /// A version string (marker, registry entry, or rollback target) is malformed.
    #[error(transparent)]
    InvalidVersion(#[from] VersionError),
    /// A migration's transform failed. Transforms applied earlier in the
    /// same batch are not undone.
    #[error("migration {version} ({direction}) failed: {reason}")]
    StepFailed {
        version: String,
        direction: Direction,
        reason: String,
    },
    /// A migration was registered with a version not newer than the previous one.
    #[error("migration {version} must be newer than the previously registered {previous}")]
    OutOfOrder { version: String, previous: String },
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),
    /// Free-form failure raised by a migration.
    #[error("{0}")]
    Custom(String),
}

impl MigrationError {
    /// Build a free-form error, for use inside migration transforms.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}
