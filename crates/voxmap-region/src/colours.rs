//! Block colours, block types and per-biome shading multipliers.
//!
//! The table is loaded from a small line-oriented text format:
//!
//! ```text
//! biome     <biomeId|*> <waterHex> <grassHex> <foliageHex>
//! block     <blockId|*> <meta|*>   <argbHex>
//! blocktype <blockId|*> <meta|*>   <name>
//! ```
//!
//! `#` starts a comment. Ids are decimal, colours hex without prefix.
//! Wildcards cover the legacy ranges (256 biomes, 4096 ids, 16 metas),
//! cut short when the schema has fewer.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use thiserror::Error;
use tracing::{error, info, warn};
use voxmap_common::SchemaConfig;

use crate::atomic::write_atomic;

/// Colour of blocks with no entry.
pub const DEFAULT_COLOUR: u32 = 0;

/// Multiplier of biomes with no entry, and of unshaded block types.
pub const DEFAULT_MULTIPLIER: u32 = 0x00FF_FFFF;

const LEGACY_BIOME_RANGE: u32 = 256;
const LEGACY_BLOCK_RANGE: u32 = 4096;
const LEGACY_META_RANGE: u32 = 16;

const BIOME_PRELUDE: &str = "biome * ffffff ffffff ffffff";
const BLOCK_PRELUDE: &str = "block * * 00000000";

const OVERRIDES: &str = "\
block 37 * 60ffff00      # dandelion, more yellow
block 38 * 60ff0000      # rose, more red
blocktype 2 * grass      # grass block
blocktype 8 * water      # still water
blocktype 9 * water      # flowing water
blocktype 18 * leaves    # leaves
blocktype 18 1 opaque    # pine leaves, not biome shaded
blocktype 18 2 opaque    # birch leaves, not biome shaded
blocktype 31 * grass     # tall grass
blocktype 106 * foliage  # vines
blocktype 169 * grass    # biomes o plenty holy grass
blocktype 1920 * grass   # biomes o plenty plant
blocktype 1923 * opaque  # biomes o plenty leaves 1
blocktype 1924 * opaque  # biomes o plenty leaves 2
blocktype 1925 * foliage # biomes o plenty foliage
blocktype 1926 * opaque  # biomes o plenty fruit leaves
blocktype 1932 * foliage # biomes o plenty tree moss
blocktype 1962 * leaves  # biomes o plenty shaded leaves
blocktype 2164 * leaves  # twilight forest leaves
blocktype 2177 * leaves  # twilight forest magic leaves
blocktype 2204 * leaves  # extrabiomesXL green leaves
blocktype 2200 * opaque  # extrabiomesXL autumn leaves
blocktype 3257 * opaque  # natura berry bush
blocktype 3272 * opaque  # natura darkwood leaves
blocktype 3259 * leaves  # natura flora leaves
blocktype 3278 * opaque  # natura rare leaves
blocktype 3258 * opaque  # natura sakura leaves
";

/// Colour file errors.
#[derive(Debug, Error)]
pub enum ColourError {
    /// Reading or writing a colour file failed
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Result type for colour file operations.
pub type ColourResult<T> = Result<T, ColourError>;

/// Why a colour line was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// Unknown keyword or wrong field count
    #[error("invalid map colour line")]
    Malformed,

    /// A numeric field did not parse
    #[error("invalid number '{0}'")]
    BadNumber(String),

    /// A single id was outside the schema's range
    #[error("{kind} id {value} out of range")]
    OutOfRange {
        /// Which id
        kind: &'static str,
        /// Parsed value
        value: i64,
    },
}

/// How a block takes biome shading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// Unshaded
    #[default]
    Normal,
    /// Grass multiplier
    Grass,
    /// Foliage multiplier
    Leaves,
    /// Foliage multiplier
    Foliage,
    /// Water multiplier
    Water,
    /// Unshaded
    Opaque,
}

impl BlockType {
    /// Every block type.
    pub const ALL: [BlockType; 6] = [
        BlockType::Normal,
        BlockType::Grass,
        BlockType::Leaves,
        BlockType::Foliage,
        BlockType::Water,
        BlockType::Opaque,
    ];

    /// Name used in colour files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            BlockType::Normal => "normal",
            BlockType::Grass => "grass",
            BlockType::Leaves => "leaves",
            BlockType::Foliage => "foliage",
            BlockType::Water => "water",
            BlockType::Opaque => "opaque",
        }
    }

    /// Parses a name, ignoring case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Packs a block id and metadata into a `(meta << 32) | id` key.
#[inline]
#[must_use]
pub const fn block_and_meta(id: u32, meta: u32) -> u64 {
    ((meta as u64) << 32) | id as u64
}

/// Splits a `(meta << 32) | id` key into `(id, meta)`.
#[inline]
#[must_use]
pub const fn split_block_and_meta(key: u64) -> (u32, u32) {
    (key as u32, (key >> 32) as u32)
}

/// Multiplies the RGB channels of `colour` by `multiplier`; alpha is kept.
#[inline]
#[must_use]
pub const fn shade(colour: u32, multiplier: u32) -> u32 {
    let r = ((colour >> 16) & 0xFF) * ((multiplier >> 16) & 0xFF) / 255;
    let g = ((colour >> 8) & 0xFF) * ((multiplier >> 8) & 0xFF) / 255;
    let b = (colour & 0xFF) * (multiplier & 0xFF) / 255;
    (colour & 0xFF00_0000) | (r << 16) | (g << 8) | b
}

/// Line counts of a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Lines applied to the table
    pub applied: usize,
    /// Lines skipped with a warning
    pub skipped: usize,
}

/// Maps block states to colours and biome shading.
///
/// The maps only hold non-default entries.
#[derive(Debug, Clone)]
pub struct BlockColourTable {
    schema: SchemaConfig,
    colours: AHashMap<u64, u32>,
    types: AHashMap<u64, BlockType>,
    water: Vec<u32>,
    grass: Vec<u32>,
    foliage: Vec<u32>,
}

impl Default for BlockColourTable {
    fn default() -> Self {
        Self::new(SchemaConfig::vanilla())
    }
}

impl PartialEq for BlockColourTable {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
            && same_entries(&self.colours, &other.colours)
            && same_entries(&self.types, &other.types)
            && self.water == other.water
            && self.grass == other.grass
            && self.foliage == other.foliage
    }
}

fn same_entries<V: PartialEq>(a: &AHashMap<u64, V>, b: &AHashMap<u64, V>) -> bool {
    a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
}

impl BlockColourTable {
    /// Empty table sized for `schema`.
    #[must_use]
    pub fn new(schema: SchemaConfig) -> Self {
        let biomes = schema.biome_count() as usize;
        Self {
            schema,
            colours: AHashMap::new(),
            types: AHashMap::new(),
            water: vec![DEFAULT_MULTIPLIER; biomes],
            grass: vec![DEFAULT_MULTIPLIER; biomes],
            foliage: vec![DEFAULT_MULTIPLIER; biomes],
        }
    }

    /// Schema the table was sized for.
    #[must_use]
    pub const fn schema(&self) -> SchemaConfig {
        self.schema
    }

    /// ARGB colour of a block state.
    #[must_use]
    pub fn colour(&self, id: u32, meta: u32) -> u32 {
        self.colour_packed(block_and_meta(id, meta))
    }

    /// ARGB colour of a packed block state.
    #[must_use]
    pub fn colour_packed(&self, key: u64) -> u32 {
        self.colours.get(&key).copied().unwrap_or(DEFAULT_COLOUR)
    }

    /// Sets the ARGB colour of a block state.
    pub fn set_colour(&mut self, id: u32, meta: u32, colour: u32) {
        self.set_colour_packed(block_and_meta(id, meta), colour);
    }

    /// Sets the ARGB colour of a packed block state.
    pub fn set_colour_packed(&mut self, key: u64, colour: u32) {
        if colour == DEFAULT_COLOUR {
            self.colours.remove(&key);
        } else {
            self.colours.insert(key, colour);
        }
    }

    /// Shading type of a block state.
    #[must_use]
    pub fn block_type(&self, id: u32, meta: u32) -> BlockType {
        self.block_type_packed(block_and_meta(id, meta))
    }

    /// Shading type of a packed block state.
    #[must_use]
    pub fn block_type_packed(&self, key: u64) -> BlockType {
        self.types.get(&key).copied().unwrap_or_default()
    }

    /// Sets the shading type of a block state.
    pub fn set_block_type(&mut self, id: u32, meta: u32, block_type: BlockType) {
        let key = block_and_meta(id, meta);
        if block_type == BlockType::Normal {
            self.types.remove(&key);
        } else {
            self.types.insert(key, block_type);
        }
    }

    fn biome_slot(&self, biome: u32) -> usize {
        (biome & (self.schema.biome_count() - 1)) as usize
    }

    /// Sets the water multiplier of `biome`, wrapped into the biome count.
    pub fn set_biome_water_shading(&mut self, biome: u32, colour: u32) {
        let slot = self.biome_slot(biome);
        self.water[slot] = colour & DEFAULT_MULTIPLIER;
    }

    /// Sets the grass multiplier of `biome`, wrapped into the biome count.
    pub fn set_biome_grass_shading(&mut self, biome: u32, colour: u32) {
        let slot = self.biome_slot(biome);
        self.grass[slot] = colour & DEFAULT_MULTIPLIER;
    }

    /// Sets the foliage multiplier of `biome`, wrapped into the biome count.
    pub fn set_biome_foliage_shading(&mut self, biome: u32, colour: u32) {
        let slot = self.biome_slot(biome);
        self.foliage[slot] = colour & DEFAULT_MULTIPLIER;
    }

    /// Water multiplier of `biome`; white when out of range.
    #[must_use]
    pub fn water_multiplier(&self, biome: u32) -> u32 {
        lookup(&self.water, biome)
    }

    /// Grass multiplier of `biome`; white when out of range.
    #[must_use]
    pub fn grass_multiplier(&self, biome: u32) -> u32 {
        lookup(&self.grass, biome)
    }

    /// Foliage multiplier of `biome`; white when out of range.
    #[must_use]
    pub fn foliage_multiplier(&self, biome: u32) -> u32 {
        lookup(&self.foliage, biome)
    }

    /// Multiplier to apply to a block state in `biome`.
    #[must_use]
    pub fn biome_colour(&self, key: u64, biome: u32) -> u32 {
        match self.block_type_packed(key) {
            BlockType::Grass => self.grass_multiplier(biome),
            BlockType::Leaves | BlockType::Foliage => self.foliage_multiplier(biome),
            BlockType::Water => self.water_multiplier(biome),
            BlockType::Normal | BlockType::Opaque => DEFAULT_MULTIPLIER,
        }
    }

    /// Biome-shaded ARGB of a block state.
    #[must_use]
    pub fn pixel(&self, id: u32, meta: u32, biome: u32) -> u32 {
        self.pixel_packed(block_and_meta(id, meta), biome)
    }

    /// Biome-shaded ARGB of a packed block state.
    #[inline]
    #[must_use]
    pub fn pixel_packed(&self, key: u64, biome: u32) -> u32 {
        shade(self.colour_packed(key), self.biome_colour(key, biome))
    }

    /// Applies every line of a colour file. Bad lines are logged and skipped.
    pub fn load_from_str(&mut self, text: &str) -> LoadSummary {
        let mut summary = LoadSummary::default();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            match self.apply_line(line) {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    warn!(line = index + 1, text = line, "skipping colour line: {e}");
                    summary.skipped += 1;
                }
            }
        }
        summary
    }

    /// Applies one non-empty, comment-free line.
    pub fn apply_line(&mut self, line: &str) -> Result<(), LineError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["biome", biome, water, grass, foliage] => {
                let biomes = parse_range(biome, LEGACY_BIOME_RANGE, self.schema.biome_count(), "biome")?;
                let water = parse_hex(water)?;
                let grass = parse_hex(grass)?;
                let foliage = parse_hex(foliage)?;
                for biome in biomes {
                    self.set_biome_water_shading(biome, water);
                    self.set_biome_grass_shading(biome, grass);
                    self.set_biome_foliage_shading(biome, foliage);
                }
            }
            ["block", id, meta, colour] => {
                let (ids, metas) = self.parse_block_ranges(id, meta)?;
                let colour = parse_hex(colour)?;
                for id in ids {
                    for meta in metas.clone() {
                        self.set_colour(id, meta, colour);
                    }
                }
            }
            ["blocktype", id, meta, name] => {
                let (ids, metas) = self.parse_block_ranges(id, meta)?;
                let block_type = BlockType::parse(name).unwrap_or_else(|| {
                    warn!(name = *name, "unknown block type, using normal");
                    BlockType::Normal
                });
                for id in ids {
                    for meta in metas.clone() {
                        self.set_block_type(id, meta, block_type);
                    }
                }
            }
            _ => return Err(LineError::Malformed),
        }
        Ok(())
    }

    fn parse_block_ranges(&self, id: &str, meta: &str) -> Result<(Range<u32>, Range<u32>), LineError> {
        let ids = parse_range(id, LEGACY_BLOCK_RANGE, self.schema.block_id_count(), "block")?;
        let metas = parse_range(meta, LEGACY_META_RANGE, self.schema.meta_count(), "meta")?;
        Ok((ids, metas))
    }

    /// Loads a colour file. A read failure is logged and leaves the table
    /// unchanged.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> ColourResult<LoadSummary> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| {
            error!(path = %path.display(), "loading block colours failed: {source}");
            ColourError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let summary = self.load_from_str(&text);
        info!(
            path = %path.display(),
            applied = summary.applied,
            skipped = summary.skipped,
            "loaded block colours"
        );
        Ok(summary)
    }

    /// Writes the table in its minimal text form.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.to_text().as_bytes())
    }

    /// The minimal text form as a string.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        push_line(&mut out, BIOME_PRELUDE);
        for biome in 0..self.schema.biome_count() {
            let water = self.water_multiplier(biome);
            let grass = self.grass_multiplier(biome);
            let foliage = self.foliage_multiplier(biome);
            if [water, grass, foliage].iter().any(|&m| m != DEFAULT_MULTIPLIER) {
                push_line(&mut out, &format!("biome {biome} {water:06x} {grass:06x} {foliage:06x}"));
            }
        }

        push_line(&mut out, BLOCK_PRELUDE);
        let fold = self.schema.meta_count() >= LEGACY_META_RANGE;
        write_groups(&mut out, "blocktype", &self.types, BlockType::Normal, fold, |t| {
            t.name().to_string()
        });
        write_groups(&mut out, "block", &self.colours, DEFAULT_COLOUR, fold, |c| format!("{c:08x}"));
        out
    }

    /// Saves the table. The previous file survives a failed write.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> ColourResult<()> {
        let path = path.as_ref();
        write_atomic(path, |w| self.write_to(w)).map_err(|source| {
            error!(path = %path.display(), "saving block colours failed: {source}");
            ColourError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        info!(path = %path.display(), "saved block colours");
        Ok(())
    }

    /// Writes the stock overrides file.
    pub fn write_overrides_file(path: impl AsRef<Path>) -> ColourResult<()> {
        let path = path.as_ref();
        write_atomic(path, |w| w.write_all(OVERRIDES.as_bytes())).map_err(|source| {
            error!(path = %path.display(), "saving block overrides failed: {source}");
            ColourError::Io {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}

fn lookup(multipliers: &[u32], biome: u32) -> u32 {
    multipliers
        .get(biome as usize)
        .copied()
        .unwrap_or(DEFAULT_MULTIPLIER)
}

fn parse_range(token: &str, legacy_end: u32, count: u32, kind: &'static str) -> Result<Range<u32>, LineError> {
    if token == "*" {
        return Ok(0..legacy_end.min(count));
    }
    let value: i64 = token
        .parse()
        .map_err(|_| LineError::BadNumber(token.to_string()))?;
    if !(0..i64::from(count)).contains(&value) {
        return Err(LineError::OutOfRange { kind, value });
    }
    let value = value as u32;
    Ok(value..value + 1)
}

fn parse_hex(token: &str) -> Result<u32, LineError> {
    u64::from_str_radix(token, 16)
        .map(|v| (v & 0xFFFF_FFFF) as u32)
        .map_err(|_| LineError::BadNumber(token.to_string()))
}

/// Writes one group of lines per block id, ascending.
///
/// When one non-default value covers enough of the legacy meta range, it
/// is written once as `*` followed by the metas that differ.
fn write_groups<V: Copy + PartialEq>(
    out: &mut String,
    keyword: &str,
    entries: &AHashMap<u64, V>,
    default: V,
    fold: bool,
    format: impl Fn(V) -> String,
) {
    let mut groups: BTreeMap<u32, BTreeMap<u32, V>> = BTreeMap::new();
    for (&key, &value) in entries {
        let (id, meta) = split_block_and_meta(key);
        groups.entry(id).or_default().insert(meta, value);
    }

    for (id, metas) in &groups {
        let folded = if fold { fold_value(metas, default) } else { None };
        match folded {
            Some(common) => {
                push_line(out, &format!("{keyword} {id} * {}", format(common)));
                for meta in 0..LEGACY_META_RANGE {
                    let value = metas.get(&meta).copied().unwrap_or(default);
                    if value != common {
                        push_line(out, &format!("{keyword} {id} {meta} {}", format(value)));
                    }
                }
                for (meta, &value) in metas.range(LEGACY_META_RANGE..) {
                    if value != default {
                        push_line(out, &format!("{keyword} {id} {meta} {}", format(value)));
                    }
                }
            }
            None => {
                for (meta, &value) in metas {
                    if value != default {
                        push_line(out, &format!("{keyword} {id} {meta} {}", format(value)));
                    }
                }
            }
        }
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

/// Most common value over metas `0..16`, if folding on it writes fewer lines.
fn fold_value<V: Copy + PartialEq>(metas: &BTreeMap<u32, V>, default: V) -> Option<V> {
    let values: Vec<V> = (0..LEGACY_META_RANGE)
        .map(|meta| metas.get(&meta).copied().unwrap_or(default))
        .collect();
    let count_of = |v: V| values.iter().filter(|&&other| other == v).count();

    let mut best: Option<(V, usize)> = None;
    for &value in &values {
        let count = count_of(value);
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }

    let (common, count) = best?;
    (common != default && count > count_of(default) + 1).then_some(common)
}
