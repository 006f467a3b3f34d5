//! Command-line parsing and the maintenance commands.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use voxmap_common::{
    SchemaConfig, COLUMNS_PER_CHUNK, MAX_BITS_PER_METADATA, MAX_EXTENDED_BIOME_COUNT,
    MAX_EXTENDED_BLOCK_ID_COUNT, SUB_CHUNK_COUNT,
};
use voxmap_region::{BlockColourTable, ChunkSnapshot};
use voxmap_world::MapConfig;

/// voxmap maintenance commands.
#[derive(Parser, Debug)]
#[command(name = "voxmap", about = "Maintenance commands for voxmap colour files and stored chunks")]
pub struct Cli {
    /// Map configuration whose schema is used (vanilla when omitted)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// A maintenance command.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write the stock block colour overrides
    Overrides {
        /// Destination file
        path: PathBuf,
    },
    /// Load a colour file and save it back minimised
    Normalize {
        /// Source colour file
        input: PathBuf,
        /// Destination colour file
        output: PathBuf,
    },
    /// Decode a stored chunk and summarise it
    Inspect {
        /// Stored chunk file
        path: PathBuf,
        /// Decode with every extended encoding at its widest
        #[arg(long)]
        extended: bool,
    },
}

impl Cli {
    /// Runs the command and returns what it has to report.
    pub fn run(&self) -> Result<String> {
        match &self.command {
            Command::Overrides { path } => {
                BlockColourTable::write_overrides_file(path)?;
                Ok(format!("wrote {}\n", path.display()))
            }
            Command::Normalize { input, output } => {
                normalize(input, output, load_schema(self.config.as_deref())?)
            }
            Command::Inspect { path, extended } => {
                let schema = if *extended {
                    widest_schema()?
                } else {
                    load_schema(self.config.as_deref())?
                };
                inspect(path, schema)
            }
        }
    }
}

fn load_schema(config: Option<&Path>) -> Result<SchemaConfig> {
    let Some(path) = config else {
        return Ok(SchemaConfig::vanilla());
    };
    let config = MapConfig::try_load_from(path)
        .with_context(|| format!("loading {}", path.display()))?;
    Ok(config.schema_config()?)
}

fn widest_schema() -> Result<SchemaConfig> {
    Ok(SchemaConfig::extended(
        true,
        true,
        MAX_EXTENDED_BLOCK_ID_COUNT,
        MAX_BITS_PER_METADATA,
        MAX_EXTENDED_BIOME_COUNT,
    )?)
}

fn normalize(input: &Path, output: &Path, schema: SchemaConfig) -> Result<String> {
    let mut table = BlockColourTable::new(schema);
    let summary = table.load_from_file(input)?;
    if summary.skipped > 0 {
        warn!(skipped = summary.skipped, path = %input.display(), "ignored malformed lines");
    }
    table.save_to_file(output)?;
    info!(applied = summary.applied, path = %output.display(), "normalized colour file");
    Ok(format!(
        "{} lines applied, {} skipped, wrote {}\n",
        summary.applied,
        summary.skipped,
        output.display()
    ))
}

/// Dimension encoded in a `DIM<n>` parent directory, defaulting to 0.
fn dimension_of(path: &Path) -> i32 {
    path.parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix("DIM"))
        .and_then(|dim| dim.parse().ok())
        .unwrap_or(0)
}

fn inspect(path: &Path, schema: SchemaConfig) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let snapshot = ChunkSnapshot::decode(&bytes, dimension_of(path), &schema)
        .with_context(|| format!("decoding {}", path.display()))?;

    let present: Vec<String> = (0..SUB_CHUNK_COUNT)
        .filter(|&sub| snapshot.has_sub_chunk(sub))
        .map(|sub| sub.to_string())
        .collect();

    let mut biomes: BTreeMap<u32, usize> = BTreeMap::new();
    for column in 0..COLUMNS_PER_CHUNK {
        *biomes.entry(snapshot.biome_at(column)).or_default() += 1;
    }
    // Ties go to the lowest biome id.
    let (biome, columns) = biomes
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map_or((0, 0), |(&b, &c)| (b, c));

    let mut report = String::new();
    writeln!(report, "chunk {}", snapshot.pos())?;
    if present.is_empty() {
        writeln!(report, "sub-chunks: none")?;
    } else {
        writeln!(report, "sub-chunks: {}", present.join(" "))?;
    }
    writeln!(report, "most common biome: {biome} ({columns} of {COLUMNS_PER_CHUNK} columns)")?;
    writeln!(report, "tile entities: {}", snapshot.tile_entities().len())?;
    Ok(report)
}
