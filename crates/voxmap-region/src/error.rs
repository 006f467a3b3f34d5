//! Region error types.

use std::io;

use thiserror::Error;
use voxmap_nbt::NbtError;

/// Errors raised while encoding, decoding or storing chunk data.
#[derive(Debug, Error)]
pub enum RegionError {
    /// The NBT layer failed
    #[error("NBT error: {0}")]
    Nbt(#[from] NbtError),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A mandatory tag is missing from a stored chunk
    #[error("missing tag '{0}'")]
    MissingTag(&'static str),

    /// A known tag carries an unexpected tag type
    #[error("tag '{name}' should be {expected}, found {found}")]
    WrongTagType {
        /// Tag name
        name: &'static str,
        /// Expected tag type name
        expected: &'static str,
        /// Tag type name found in the data
        found: &'static str,
    },
}

/// Result type for region operations.
pub type RegionResult<T> = Result<T, RegionError>;
