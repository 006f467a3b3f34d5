//! # voxmap
//!
//! Maintenance commands for the map generator:
//! - `overrides <path>`: write the stock block colour overrides
//! - `normalize <in> <out>`: rewrite a colour file in its minimal form
//! - `inspect <chunk.nbt.gz> [--extended]`: summarise a stored chunk
//!
//! `--config <path>` selects the map configuration whose schema is used.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::Cli;

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("voxmap=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("voxmap {}", env!("CARGO_PKG_VERSION"));
    let report = cli.run()?;
    print!("{report}");
    Ok(())
}
