//! # voxmap Region
//!
//! Chunk data for the voxmap map generator:
//! - Null-tolerant packed plane reads
//! - Biome and block storage in the vanilla and extended layouts
//! - The host chunk contract and an in-memory host chunk
//! - Immutable chunk snapshots and their gzip NBT encoding
//! - The block colour table and its text format
//! - Surface rasterization and region stores

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod atomic;
mod tags;

pub mod biome;
pub mod blocks;
pub mod colours;
pub mod error;
pub mod host;
pub mod packed;
pub mod raster;
pub mod snapshot;
pub mod store;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::biome::*;
    pub use crate::blocks::*;
    pub use crate::colours::*;
    pub use crate::error::*;
    pub use crate::host::*;
    pub use crate::packed::*;
    pub use crate::raster::*;
    pub use crate::snapshot::*;
    pub use crate::store::*;
}

pub use prelude::*;
