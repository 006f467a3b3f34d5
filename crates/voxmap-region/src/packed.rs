//! Null-tolerant reads over per-sub-chunk byte planes.
//!
//! Decoders see partial data where optional planes are absent, so every
//! read here resolves a missing plane or an out-of-range offset to 0.

use voxmap_common::{CELLS_PER_SUB_CHUNK, SUB_CHUNK_COUNT};

/// Length of a full-byte plane.
pub const BYTE_PLANE_LEN: usize = CELLS_PER_SUB_CHUNK;

/// Length of a nibble plane (two cells per byte).
pub const NIBBLE_PLANE_LEN: usize = CELLS_PER_SUB_CHUNK / 2;

/// One optional byte plane per sub-chunk.
pub type Planes = [Option<Vec<u8>>; SUB_CHUNK_COUNT];

/// Returns a plane set with every sub-chunk absent.
#[must_use]
pub fn empty_planes() -> Planes {
    Default::default()
}

/// Reads the nibble at `off`; low nibble at even offsets.
#[inline]
#[must_use]
pub fn nibble(bytes: &[u8], off: usize) -> u32 {
    bytes
        .get(off >> 1)
        .map_or(0, |b| u32::from((b >> ((off & 1) * 4)) & 0xF))
}

/// Writes the nibble at `off`, ignoring offsets past the end of `bytes`.
#[inline]
pub fn set_nibble(bytes: &mut [u8], off: usize, value: u8) {
    if let Some(b) = bytes.get_mut(off >> 1) {
        let shift = (off & 1) * 4;
        *b = (*b & !(0xF << shift)) | ((value & 0xF) << shift);
    }
}

/// Unsigned byte at `planes[sub][off]`, or 0 when anything is absent.
#[inline]
#[must_use]
pub fn fetch_safe(planes: &[Option<Vec<u8>>], sub: usize, off: usize) -> u32 {
    planes
        .get(sub)
        .and_then(Option::as_ref)
        .and_then(|plane| plane.get(off))
        .map_or(0, |&b| u32::from(b))
}

/// Nibble at cell `off` of `planes[sub]`, or 0 when anything is absent.
#[inline]
#[must_use]
pub fn fetch_safe_nibble(planes: &[Option<Vec<u8>>], sub: usize, off: usize) -> u32 {
    planes
        .get(sub)
        .and_then(Option::as_ref)
        .map_or(0, |plane| nibble(plane, off))
}

/// Deep copy of an optional host plane.
#[must_use]
pub fn copy_plane(plane: Option<&[u8]>) -> Option<Vec<u8>> {
    plane.map(<[u8]>::to_vec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibble_packing() {
        let bytes = [0x21, 0xF3];
        assert_eq!(nibble(&bytes, 0), 1);
        assert_eq!(nibble(&bytes, 1), 2);
        assert_eq!(nibble(&bytes, 2), 3);
        assert_eq!(nibble(&bytes, 3), 0xF);
        assert_eq!(nibble(&bytes, 4), 0);
    }

    #[test]
    fn test_set_nibble_keeps_neighbour() {
        let mut bytes = vec![0u8; 2];
        set_nibble(&mut bytes, 1, 0xA);
        set_nibble(&mut bytes, 0, 0x5);
        set_nibble(&mut bytes, 9, 0x7);
        assert_eq!(bytes, vec![0xA5, 0x00]);
    }

    #[test]
    fn test_fetch_safe_tolerates_absence() {
        let mut planes = empty_planes();
        planes[2] = Some(vec![0xFF; 4]);

        assert_eq!(fetch_safe(&planes, 2, 3), 255);
        assert_eq!(fetch_safe(&planes, 2, 4), 0);
        assert_eq!(fetch_safe(&planes, 1, 0), 0);
        assert_eq!(fetch_safe(&planes, 16, 0), 0);
        assert_eq!(fetch_safe(&[], 0, 0), 0);
        assert_eq!(fetch_safe_nibble(&planes, 2, 7), 0xF);
        assert_eq!(fetch_safe_nibble(&planes, 3, 7), 0);
    }

    #[test]
    fn test_copy_plane_is_deep() {
        let host = vec![1u8, 2, 3];
        let mut copy = copy_plane(Some(&host)).expect("present");
        copy[0] = 9;
        assert_eq!(host[0], 1);
        assert!(copy_plane(None).is_none());
    }
}
