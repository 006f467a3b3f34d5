//! Typed lookups into NBT compounds.
//!
//! Absent tags are `Ok(None)`; a present tag of the wrong type is an error.

use voxmap_nbt::{Compound, Tag};

use crate::error::{RegionError, RegionResult};

fn wrong(name: &'static str, expected: &'static str, tag: &Tag) -> RegionError {
    RegionError::WrongTagType {
        name,
        expected,
        found: tag.type_name(),
    }
}

pub(crate) fn byte_array<'a>(
    compound: &'a Compound,
    name: &'static str,
) -> RegionResult<Option<&'a [u8]>> {
    match compound.get(name) {
        None => Ok(None),
        Some(tag) => tag
            .as_byte_array()
            .map(Some)
            .ok_or_else(|| wrong(name, "TAG_Byte_Array", tag)),
    }
}

pub(crate) fn list<'a>(compound: &'a Compound, name: &'static str) -> RegionResult<Option<&'a [Tag]>> {
    match compound.get(name) {
        None => Ok(None),
        Some(tag) => tag
            .as_list()
            .map(|items| Some(items.as_slice()))
            .ok_or_else(|| wrong(name, "TAG_List", tag)),
    }
}

pub(crate) fn compound<'a>(
    parent: &'a Compound,
    name: &'static str,
) -> RegionResult<Option<&'a Compound>> {
    match parent.get(name) {
        None => Ok(None),
        Some(tag) => tag
            .as_compound()
            .map(Some)
            .ok_or_else(|| wrong(name, "TAG_Compound", tag)),
    }
}

/// Reads any integral tag no wider than an int.
pub(crate) fn int(compound: &Compound, name: &'static str) -> RegionResult<Option<i32>> {
    match compound.get(name) {
        None => Ok(None),
        Some(Tag::Byte(n)) => Ok(Some(i32::from(*n))),
        Some(Tag::Short(n)) => Ok(Some(i32::from(*n))),
        Some(Tag::Int(n)) => Ok(Some(*n)),
        Some(tag) => Err(wrong(name, "TAG_Int", tag)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_and_wrong_type() {
        let mut c = Compound::new();
        c.insert("Blocks".into(), Tag::Int(3));
        c.insert("Y".into(), Tag::Byte(7));

        assert!(byte_array(&c, "Add").expect("absent is ok").is_none());
        assert!(matches!(
            byte_array(&c, "Blocks"),
            Err(RegionError::WrongTagType { name: "Blocks", .. })
        ));
        assert_eq!(int(&c, "Y").expect("byte widens"), Some(7));
        assert!(list(&c, "Y").is_err());
    }
}
