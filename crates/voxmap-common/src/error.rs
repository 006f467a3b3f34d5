//! Error types shared across voxmap crates.

use thiserror::Error;

/// Invalid capability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A counter was zero or exceeded what the schema can encode
    #[error("{name} out of range: {value} (max {max})")]
    CountOutOfRange {
        /// Counter name
        name: &'static str,
        /// Supplied value
        value: u32,
        /// Largest accepted value
        max: u32,
    },

    /// A counter used as a wrap mask was not a power of two
    #[error("{name} must be a power of two, got {value}")]
    NotPowerOfTwo {
        /// Counter name
        name: &'static str,
        /// Supplied value
        value: u32,
    },

    /// The process-wide schema was already installed
    #[error("schema capability flags are already installed")]
    AlreadyInstalled,
}

/// Result type alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;
