//! # voxmap NBT
//!
//! Reader and writer for the tagged binary tree format used by the host
//! voxel world for chunk data. All numbers are big-endian; byte arrays are
//! raw bytes and callers decide whether to treat them as signed.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Deepest list/compound nesting accepted on read.
pub const MAX_DEPTH: usize = 512;

/// Named children of a compound tag.
pub type Compound = HashMap<String, Tag>;

/// NBT codec errors.
#[derive(Debug, Error)]
pub enum NbtError {
    /// Underlying reader or writer failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unknown tag type id
    #[error("invalid tag type: {0}")]
    InvalidTagType(u8),

    /// Array or list with a negative length
    #[error("negative length {0}")]
    NegativeLength(i32),

    /// Name or string payload is not UTF-8
    #[error("invalid UTF-8 in string payload")]
    InvalidUtf8,

    /// Lists or compounds nested deeper than [`MAX_DEPTH`]
    #[error("tag nesting exceeds {MAX_DEPTH} levels")]
    TooDeep,

    /// A list typed `TAG_End` that claims elements
    #[error("list of end tags with {0} elements")]
    EndListNotEmpty(usize),

    /// A list element whose type differs from the list's element type
    #[error("list of {expected} holds a {found}")]
    MixedList {
        /// Type of the first element
        expected: &'static str,
        /// Type of the offending element
        found: &'static str,
    },

    /// String or name longer than 65535 bytes
    #[error("string of {0} bytes is too long to encode")]
    StringTooLong(usize),
}

/// Result type alias for NBT operations.
pub type NbtResult<T> = Result<T, NbtError>;

/// A single NBT value.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    /// Terminates a compound
    End,
    /// Signed 8-bit integer
    Byte(i8),
    /// Signed 16-bit integer
    Short(i16),
    /// Signed 32-bit integer
    Int(i32),
    /// Signed 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Raw byte array
    ByteArray(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Homogeneous list
    List(Vec<Tag>),
    /// Named children
    Compound(Compound),
    /// Array of 32-bit integers
    IntArray(Vec<i32>),
    /// Array of 64-bit integers
    LongArray(Vec<i64>),
}

/// Tag type ids from the wire format.
pub mod tag_type {
    /// `TAG_End`
    pub const END: u8 = 0;
    /// `TAG_Byte`
    pub const BYTE: u8 = 1;
    /// `TAG_Short`
    pub const SHORT: u8 = 2;
    /// `TAG_Int`
    pub const INT: u8 = 3;
    /// `TAG_Long`
    pub const LONG: u8 = 4;
    /// `TAG_Float`
    pub const FLOAT: u8 = 5;
    /// `TAG_Double`
    pub const DOUBLE: u8 = 6;
    /// `TAG_Byte_Array`
    pub const BYTE_ARRAY: u8 = 7;
    /// `TAG_String`
    pub const STRING: u8 = 8;
    /// `TAG_List`
    pub const LIST: u8 = 9;
    /// `TAG_Compound`
    pub const COMPOUND: u8 = 10;
    /// `TAG_Int_Array`
    pub const INT_ARRAY: u8 = 11;
    /// `TAG_Long_Array`
    pub const LONG_ARRAY: u8 = 12;
}

impl Tag {
    /// Wire type id of this tag.
    #[must_use]
    pub fn type_id(&self) -> u8 {
        match self {
            Tag::End => tag_type::END,
            Tag::Byte(_) => tag_type::BYTE,
            Tag::Short(_) => tag_type::SHORT,
            Tag::Int(_) => tag_type::INT,
            Tag::Long(_) => tag_type::LONG,
            Tag::Float(_) => tag_type::FLOAT,
            Tag::Double(_) => tag_type::DOUBLE,
            Tag::ByteArray(_) => tag_type::BYTE_ARRAY,
            Tag::String(_) => tag_type::STRING,
            Tag::List(_) => tag_type::LIST,
            Tag::Compound(_) => tag_type::COMPOUND,
            Tag::IntArray(_) => tag_type::INT_ARRAY,
            Tag::LongArray(_) => tag_type::LONG_ARRAY,
        }
    }

    /// Human-readable name of this tag's type, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Tag::End => "end",
            Tag::Byte(_) => "byte",
            Tag::Short(_) => "short",
            Tag::Int(_) => "int",
            Tag::Long(_) => "long",
            Tag::Float(_) => "float",
            Tag::Double(_) => "double",
            Tag::ByteArray(_) => "byte array",
            Tag::String(_) => "string",
            Tag::List(_) => "list",
            Tag::Compound(_) => "compound",
            Tag::IntArray(_) => "int array",
            Tag::LongArray(_) => "long array",
        }
    }

    /// Reads one named tag.
    pub fn read<R: Read>(reader: &mut R) -> NbtResult<(String, Tag)> {
        Self::read_named(reader, 0)
    }

    fn read_named<R: Read>(reader: &mut R, depth: usize) -> NbtResult<(String, Tag)> {
        let type_id = reader.read_u8()?;
        if type_id == tag_type::END {
            return Ok((String::new(), Tag::End));
        }

        let name = read_string(reader)?;
        let tag = Tag::read_payload(reader, type_id, depth)?;
        Ok((name, tag))
    }

    fn read_payload<R: Read>(reader: &mut R, type_id: u8, depth: usize) -> NbtResult<Tag> {
        if depth > MAX_DEPTH {
            return Err(NbtError::TooDeep);
        }
        match type_id {
            tag_type::END => Ok(Tag::End),
            tag_type::BYTE => Ok(Tag::Byte(reader.read_i8()?)),
            tag_type::SHORT => Ok(Tag::Short(reader.read_i16::<BigEndian>()?)),
            tag_type::INT => Ok(Tag::Int(reader.read_i32::<BigEndian>()?)),
            tag_type::LONG => Ok(Tag::Long(reader.read_i64::<BigEndian>()?)),
            tag_type::FLOAT => Ok(Tag::Float(reader.read_f32::<BigEndian>()?)),
            tag_type::DOUBLE => Ok(Tag::Double(reader.read_f64::<BigEndian>()?)),
            tag_type::BYTE_ARRAY => {
                let length = read_length(reader)?;
                let mut bytes = Vec::new();
                reader.by_ref().take(length as u64).read_to_end(&mut bytes)?;
                if bytes.len() != length {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
                }
                Ok(Tag::ByteArray(bytes))
            }
            tag_type::STRING => Ok(Tag::String(read_string(reader)?)),
            tag_type::LIST => {
                let list_type = reader.read_u8()?;
                let length = read_length(reader)?;
                // End payloads are empty; only an empty list of them is well formed.
                if list_type == tag_type::END && length > 0 {
                    return Err(NbtError::EndListNotEmpty(length));
                }
                let mut list = Vec::new();
                for _ in 0..length {
                    list.push(Tag::read_payload(reader, list_type, depth + 1)?);
                }
                Ok(Tag::List(list))
            }
            tag_type::COMPOUND => {
                let mut compound = Compound::new();
                loop {
                    let (name, tag) = Tag::read_named(reader, depth + 1)?;
                    if let Tag::End = tag {
                        break;
                    }
                    compound.insert(name, tag);
                }
                Ok(Tag::Compound(compound))
            }
            tag_type::INT_ARRAY => {
                let length = read_length(reader)?;
                let mut ints = Vec::new();
                for _ in 0..length {
                    ints.push(reader.read_i32::<BigEndian>()?);
                }
                Ok(Tag::IntArray(ints))
            }
            tag_type::LONG_ARRAY => {
                let length = read_length(reader)?;
                let mut longs = Vec::new();
                for _ in 0..length {
                    longs.push(reader.read_i64::<BigEndian>()?);
                }
                Ok(Tag::LongArray(longs))
            }
            other => Err(NbtError::InvalidTagType(other)),
        }
    }

    /// Writes this tag with the given name.
    pub fn write<W: Write>(&self, writer: &mut W, name: &str) -> NbtResult<()> {
        writer.write_u8(self.type_id())?;

        if !matches!(self, Tag::End) {
            write_string(writer, name)?;
        }

        self.write_payload(writer)
    }

    fn write_payload<W: Write>(&self, writer: &mut W) -> NbtResult<()> {
        match self {
            Tag::End => {}
            Tag::Byte(v) => writer.write_i8(*v)?,
            Tag::Short(v) => writer.write_i16::<BigEndian>(*v)?,
            Tag::Int(v) => writer.write_i32::<BigEndian>(*v)?,
            Tag::Long(v) => writer.write_i64::<BigEndian>(*v)?,
            Tag::Float(v) => writer.write_f32::<BigEndian>(*v)?,
            Tag::Double(v) => writer.write_f64::<BigEndian>(*v)?,
            Tag::ByteArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                writer.write_all(v)?;
            }
            Tag::String(v) => write_string(writer, v)?,
            Tag::List(v) => {
                // Empty lists are typed TAG_End.
                let first = v.first();
                let element_type = first.map_or(tag_type::END, Tag::type_id);
                if let Some(first) = first {
                    if let Some(odd) = v.iter().find(|t| t.type_id() != element_type) {
                        return Err(NbtError::MixedList {
                            expected: first.type_name(),
                            found: odd.type_name(),
                        });
                    }
                }
                writer.write_u8(element_type)?;
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for tag in v {
                    tag.write_payload(writer)?;
                }
            }
            Tag::Compound(v) => {
                for (name, tag) in v {
                    tag.write(writer, name)?;
                }
                writer.write_u8(tag_type::END)?;
            }
            Tag::IntArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for &i in v {
                    writer.write_i32::<BigEndian>(i)?;
                }
            }
            Tag::LongArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for &l in v {
                    writer.write_i64::<BigEndian>(l)?;
                }
            }
        }
        Ok(())
    }

    /// Returns the children if this is a compound.
    #[must_use]
    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Tag::Compound(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the mutable children if this is a compound.
    pub fn as_compound_mut(&mut self) -> Option<&mut Compound> {
        match self {
            Tag::Compound(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the elements if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&Vec<Tag>> {
        match self {
            Tag::List(list) => Some(list),
            _ => None,
        }
    }

    /// Returns the bytes if this is a byte array.
    #[must_use]
    pub fn as_byte_array(&self) -> Option<&[u8]> {
        match self {
            Tag::ByteArray(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the string if this is a string tag.
    #[must_use]
    pub fn as_string(&self) -> Option<&String> {
        match self {
            Tag::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value if this is a long.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Tag::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value if this is an int.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Tag::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value if this is a short.
    #[must_use]
    pub fn as_i16(&self) -> Option<i16> {
        match self {
            Tag::Short(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value if this is a byte.
    #[must_use]
    pub fn as_i8(&self) -> Option<i8> {
        match self {
            Tag::Byte(n) => Some(*n),
            _ => None,
        }
    }
}

fn read_length<R: Read>(reader: &mut R) -> NbtResult<usize> {
    let length = reader.read_i32::<BigEndian>()?;
    usize::try_from(length).map_err(|_| NbtError::NegativeLength(length))
}

fn read_string<R: Read>(reader: &mut R) -> NbtResult<String> {
    let length = reader.read_u16::<BigEndian>()?;
    let mut bytes = vec![0u8; length as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| NbtError::InvalidUtf8)
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> NbtResult<()> {
    let length = u16::try_from(value.len()).map_err(|_| NbtError::StringTooLong(value.len()))?;
    writer.write_u16::<BigEndian>(length)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

/// A complete NBT document: one named root tag.
#[derive(Debug, Clone, PartialEq)]
pub struct NbtFile {
    /// Root tag, normally a compound
    pub root: Tag,
    /// Name of the root tag
    pub name: String,
}

impl NbtFile {
    /// Creates a document from a name and root tag.
    #[must_use]
    pub fn new(name: String, root: Tag) -> Self {
        NbtFile { root, name }
    }

    /// Reads an uncompressed document.
    pub fn read<R: Read>(reader: &mut R) -> NbtResult<Self> {
        let (name, root) = Tag::read(reader)?;
        Ok(NbtFile { root, name })
    }

    /// Writes an uncompressed document.
    pub fn write<W: Write>(&self, writer: &mut W) -> NbtResult<()> {
        self.root.write(writer, &self.name)
    }

    /// Reads a gzip-compressed document.
    pub fn read_gzip<R: Read>(reader: &mut R) -> NbtResult<Self> {
        let mut decoder = GzDecoder::new(reader);
        Self::read(&mut decoder)
    }

    /// Writes a gzip-compressed document.
    pub fn write_gzip<W: Write>(&self, writer: &mut W) -> NbtResult<()> {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        self.write(&mut encoder)?;
        encoder.finish()?;
        Ok(())
    }

    /// Root compound, if the root is a compound.
    #[must_use]
    pub fn compound(&self) -> Option<&Compound> {
        self.root.as_compound()
    }
}
