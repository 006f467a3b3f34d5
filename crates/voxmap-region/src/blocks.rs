//! Per-sub-chunk block id and metadata planes.
//!
//! Vanilla storage packs a 12-bit id and a 4-bit meta into three planes.
//! Extended storage packs a 20-bit id and a 12-bit meta into seven.
//! Both are written as a `Sections` list of compounds keyed by `Y`.

use tracing::warn;
use voxmap_common::{SchemaConfig, SUB_CHUNK_COUNT};
use voxmap_nbt::{Compound, Tag};

use crate::error::RegionResult;
use crate::host::{HostChunk, Plane};
use crate::packed::{copy_plane, fetch_safe, fetch_safe_nibble, Planes, NIBBLE_PLANE_LEN};
use crate::tags;

/// Name of the section list.
pub const SECTIONS_TAG: &str = "Sections";

/// Section height tag.
pub const Y_TAG: &str = "Y";

/// Block reads shared by both storage layouts.
pub trait BlockSource {
    /// Block id of cell `off` in sub-chunk `sub`.
    fn id_at(&self, sub: usize, off: usize) -> u32;

    /// Metadata of cell `off` in sub-chunk `sub`.
    fn meta_at(&self, sub: usize, off: usize) -> u32;

    /// Whether sub-chunk `sub` holds any data.
    fn has_sub_chunk(&self, sub: usize) -> bool;
}

/// 12-bit ids and 4-bit metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VanillaBlocks {
    lsb: Planes,
    msb: Planes,
    meta: Planes,
}

impl BlockSource for VanillaBlocks {
    #[inline]
    fn id_at(&self, sub: usize, off: usize) -> u32 {
        fetch_safe(&self.lsb, sub, off) | (fetch_safe_nibble(&self.msb, sub, off) << 8)
    }

    #[inline]
    fn meta_at(&self, sub: usize, off: usize) -> u32 {
        fetch_safe_nibble(&self.meta, sub, off)
    }

    #[inline]
    fn has_sub_chunk(&self, sub: usize) -> bool {
        self.lsb.get(sub).is_some_and(Option::is_some)
    }
}

/// 20-bit ids and 12-bit metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedBlocks {
    b1: Planes,
    b2_low: Planes,
    b2_high: Planes,
    b3: Planes,
    m1_low: Planes,
    m1_high: Planes,
    m2: Planes,
}

impl BlockSource for ExtendedBlocks {
    #[inline]
    fn id_at(&self, sub: usize, off: usize) -> u32 {
        fetch_safe(&self.b1, sub, off)
            | (fetch_safe_nibble(&self.b2_low, sub, off) << 8)
            | (fetch_safe_nibble(&self.b2_high, sub, off) << 12)
            | (fetch_safe(&self.b3, sub, off) << 16)
    }

    #[inline]
    fn meta_at(&self, sub: usize, off: usize) -> u32 {
        fetch_safe_nibble(&self.m1_low, sub, off)
            | (fetch_safe_nibble(&self.m1_high, sub, off) << 4)
            | (fetch_safe(&self.m2, sub, off) << 8)
    }

    #[inline]
    fn has_sub_chunk(&self, sub: usize) -> bool {
        self.b1.get(sub).is_some_and(Option::is_some)
    }
}

/// Block storage of one of the two layouts, chosen once per chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStorage {
    /// Three-plane layout
    Vanilla(VanillaBlocks),
    /// Seven-plane layout
    Extended(ExtendedBlocks),
}

impl BlockSource for BlockStorage {
    fn id_at(&self, sub: usize, off: usize) -> u32 {
        match self {
            Self::Vanilla(b) => b.id_at(sub, off),
            Self::Extended(b) => b.id_at(sub, off),
        }
    }

    fn meta_at(&self, sub: usize, off: usize) -> u32 {
        match self {
            Self::Vanilla(b) => b.meta_at(sub, off),
            Self::Extended(b) => b.meta_at(sub, off),
        }
    }

    fn has_sub_chunk(&self, sub: usize) -> bool {
        match self {
            Self::Vanilla(b) => b.has_sub_chunk(sub),
            Self::Extended(b) => b.has_sub_chunk(sub),
        }
    }
}

impl BlockStorage {
    /// Storage with no sub-chunks, of the layout `schema` selects.
    #[must_use]
    pub fn empty(schema: &SchemaConfig) -> Self {
        if schema.extended_blocks() {
            Self::Extended(ExtendedBlocks::default())
        } else {
            Self::Vanilla(VanillaBlocks::default())
        }
    }

    /// Block id at `(sub, off)`.
    #[inline]
    #[must_use]
    pub fn id_at(&self, sub: usize, off: usize) -> u32 {
        BlockSource::id_at(self, sub, off)
    }

    /// Metadata at `(sub, off)`.
    #[inline]
    #[must_use]
    pub fn meta_at(&self, sub: usize, off: usize) -> u32 {
        BlockSource::meta_at(self, sub, off)
    }

    /// Whether sub-chunk `sub` is present.
    #[inline]
    #[must_use]
    pub fn has_sub_chunk(&self, sub: usize) -> bool {
        BlockSource::has_sub_chunk(self, sub)
    }

    /// Indices of the present sub-chunks, ascending.
    #[must_use]
    pub fn present_sub_chunks(&self) -> Vec<usize> {
        (0..SUB_CHUNK_COUNT).filter(|&y| self.has_sub_chunk(y)).collect()
    }

    /// Copies every block plane of a host chunk by value.
    #[must_use]
    pub fn clone_from_host<H: HostChunk + ?Sized>(host: &H, schema: &SchemaConfig) -> Self {
        let mut storage = Self::empty(schema);
        for sub in 0..SUB_CHUNK_COUNT {
            let Some(blocks) = host.plane(sub, Plane::Blocks) else {
                continue;
            };
            match &mut storage {
                Self::Vanilla(v) => {
                    v.lsb[sub] = Some(blocks.to_vec());
                    v.msb[sub] = copy_plane(host.plane(sub, Plane::Add));
                    v.meta[sub] = copy_plane(host.plane(sub, Plane::Data));
                }
                Self::Extended(e) => {
                    e.b1[sub] = Some(blocks.to_vec());
                    e.b2_low[sub] = copy_plane(host.plane(sub, Plane::Add));
                    e.b2_high[sub] = copy_plane(host.plane(sub, Plane::BlocksB2Hi));
                    e.b3[sub] = copy_plane(host.plane(sub, Plane::BlocksB3));
                    e.m1_low[sub] = copy_plane(host.plane(sub, Plane::Data));
                    e.m1_high[sub] = copy_plane(host.plane(sub, Plane::Data1High));
                    e.m2[sub] = copy_plane(host.plane(sub, Plane::Data2));
                }
            }
        }
        storage
    }

    /// Writes the `Sections` list into `compound`.
    ///
    /// A section is written only for present sub-chunks; optional planes
    /// only when present. A missing `Data` plane is written as zeros.
    pub fn serialize(&self, compound: &mut Compound) {
        let mut sections = Vec::new();
        for sub in self.present_sub_chunks() {
            let mut section = Compound::new();
            section.insert(Y_TAG.into(), Tag::Byte(sub as i8));
            match self {
                Self::Vanilla(v) => {
                    put(&mut section, "Blocks", v.lsb[sub].as_deref());
                    put(&mut section, "Add", v.msb[sub].as_deref());
                    put_or_zero(&mut section, "Data", v.meta[sub].as_deref());
                }
                Self::Extended(e) => {
                    put(&mut section, "Blocks", e.b1[sub].as_deref());
                    put(&mut section, "Add", e.b2_low[sub].as_deref());
                    put(&mut section, "BlocksB2Hi", e.b2_high[sub].as_deref());
                    put(&mut section, "BlocksB3", e.b3[sub].as_deref());
                    put_or_zero(&mut section, "Data", e.m1_low[sub].as_deref());
                    put(&mut section, "Data1High", e.m1_high[sub].as_deref());
                    put(&mut section, "Data2", e.m2[sub].as_deref());
                }
            }
            sections.push(Tag::Compound(section));
        }
        compound.insert(SECTIONS_TAG.into(), Tag::List(sections));
    }

    /// Reads the `Sections` list of a stored chunk.
    ///
    /// A missing list decodes to empty storage. Sections without a usable
    /// `Y` or without `Blocks` are skipped with a warning.
    pub fn deserialize(compound: &Compound, schema: &SchemaConfig) -> RegionResult<Self> {
        let mut storage = Self::empty(schema);
        for (sub, section) in sections(compound)? {
            let Some(blocks) = tags::byte_array(section, "Blocks")? else {
                warn!(y = sub, "section without Blocks, skipping");
                continue;
            };
            match &mut storage {
                Self::Vanilla(v) => {
                    v.lsb[sub] = Some(blocks.to_vec());
                    v.msb[sub] = read(section, "Add")?;
                    v.meta[sub] = read(section, "Data")?;
                }
                Self::Extended(e) => {
                    e.b1[sub] = Some(blocks.to_vec());
                    e.b2_low[sub] = read(section, "Add")?;
                    e.b2_high[sub] = read(section, "BlocksB2Hi")?;
                    e.b3[sub] = read(section, "BlocksB3")?;
                    e.m1_low[sub] = read(section, "Data")?;
                    e.m1_high[sub] = read(section, "Data1High")?;
                    e.m2[sub] = read(section, "Data2")?;
                }
            }
        }
        Ok(storage)
    }
}

/// Sections of a stored chunk paired with their validated `Y`.
pub(crate) fn sections(compound: &Compound) -> RegionResult<Vec<(usize, &Compound)>> {
    let Some(list) = tags::list(compound, SECTIONS_TAG)? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(list.len());
    for tag in list {
        let Some(section) = tag.as_compound() else {
            warn!(found = tag.type_name(), "non-compound entry in Sections, skipping");
            continue;
        };
        match tags::int(section, Y_TAG)? {
            Some(y) if (0..SUB_CHUNK_COUNT as i32).contains(&y) => out.push((y as usize, section)),
            Some(y) => warn!(y, "section Y out of range, skipping"),
            None => warn!("section without Y, skipping"),
        }
    }
    Ok(out)
}

fn put(section: &mut Compound, name: &str, plane: Option<&[u8]>) {
    if let Some(bytes) = plane {
        section.insert(name.into(), Tag::ByteArray(bytes.to_vec()));
    }
}

fn put_or_zero(section: &mut Compound, name: &str, plane: Option<&[u8]>) {
    let bytes = plane.map_or_else(|| vec![0; NIBBLE_PLANE_LEN], <[u8]>::to_vec);
    section.insert(name.into(), Tag::ByteArray(bytes));
}

fn read(section: &Compound, name: &'static str) -> RegionResult<Option<Vec<u8>>> {
    Ok(tags::byte_array(section, name)?.map(<[u8]>::to_vec))
}
