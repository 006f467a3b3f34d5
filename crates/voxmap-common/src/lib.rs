//! # voxmap Common
//!
//! Shared types for the voxmap map generator:
//! - Chunk, block and player coordinates
//! - Schema capability flags (vanilla vs extended encodings)
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod schema;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::schema::*;
}

pub use prelude::*;
