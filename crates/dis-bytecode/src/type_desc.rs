//! Type descriptors
//!
//! A type descriptor tells the garbage collector which words of a
//! fixed-size block (module data, a frame, an ADT) hold heap pointers.
//! Each bit of the map covers one [`IBY2WD`]-byte word; the high bit of
//! byte 0 is word 0.

use serde::{Deserialize, Serialize};

use crate::encoding::{Reader, write_operand};
use crate::error::{Result, ResultExt};

/// Bytes per VM word
pub const IBY2WD: usize = 8;

/// A pointer map for one block layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDesc {
    /// Index in the module's type table
    pub id: i32,
    /// Size of the described block in bytes
    pub size: i32,
    /// Pointer bitmap, high bit first
    pub map: Vec<u8>,
}

#[inline]
fn bit_position(byte_offset: usize) -> (usize, u8) {
    let word = byte_offset / IBY2WD;
    (word / 8, 0x80 >> (word % 8))
}

impl TypeDesc {
    /// Create a descriptor with an all-zero map covering `size` bytes
    pub fn new(id: i32, size: i32) -> Self {
        let size_bytes = usize::try_from(size).unwrap_or(0);
        let nwords = size_bytes.div_ceil(IBY2WD);
        Self {
            id,
            size,
            map: vec![0; nwords.div_ceil(8)],
        }
    }

    /// Mark the word at `byte_offset` as holding a pointer
    ///
    /// Grows the map with zero bytes when the offset lies beyond it.
    pub fn set_pointer(&mut self, byte_offset: usize) {
        let (idx, mask) = bit_position(byte_offset);
        if idx >= self.map.len() {
            self.map.resize(idx + 1, 0);
        }
        self.map[idx] |= mask;
    }

    /// Check if the word at `byte_offset` holds a pointer
    pub fn has_pointer(&self, byte_offset: usize) -> bool {
        let (idx, mask) = bit_position(byte_offset);
        self.map.get(idx).is_some_and(|b| b & mask != 0)
    }

    /// Byte offsets of every pointer word, in ascending order
    pub fn pointer_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.map.iter().enumerate().flat_map(|(i, &b)| {
            (0..8)
                .filter(move |bit| b & (0x80 >> bit) != 0)
                .map(move |bit| (i * 8 + bit) * IBY2WD)
        })
    }

    /// Number of bytes in the pointer map
    #[inline]
    pub fn nmap(&self) -> usize {
        self.map.len()
    }

    /// Drop trailing all-zero bytes from the map
    pub fn trim_map(&mut self) {
        let n = self.map.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        self.map.truncate(n);
    }

    /// Append `id, size, nmap, map[nmap]`
    pub fn encode(&self, out: &mut Vec<u8>) {
        write_operand(out, self.id);
        write_operand(out, self.size);
        write_operand(out, self.map.len() as i32);
        out.extend_from_slice(&self.map);
    }

    /// Read one descriptor; any declared map length is accepted
    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let id = r.operand().context("id")?;
        let size = r.operand().context("size")?;
        let nmap = r.count().context("nmap")?;
        let map = r.bytes(nmap).context("map bytes")?;
        Ok(Self { id, size, map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn test_new_map_length() {
        assert_eq!(TypeDesc::new(0, 0).nmap(), 0);
        assert_eq!(TypeDesc::new(0, 8).nmap(), 1);
        assert_eq!(TypeDesc::new(0, 64).nmap(), 1);
        assert_eq!(TypeDesc::new(0, 65).nmap(), 2);
        assert_eq!(TypeDesc::new(0, 72).nmap(), 2);
    }

    #[test]
    fn test_pointer_bitmap() {
        let mut td = TypeDesc::new(0, 16);
        td.set_pointer(8);
        assert!(!td.has_pointer(0));
        assert!(td.has_pointer(8));
        assert_eq!(td.map, [0x40]);
    }

    #[test]
    fn test_multiple_pointers() {
        let mut td = TypeDesc::new(0, 40);
        td.set_pointer(0);
        td.set_pointer(8);
        td.set_pointer(32);
        assert_eq!(td.map, [0xC8]);
        assert_eq!(td.pointer_offsets().collect::<Vec<_>>(), [0, 8, 32]);
    }

    #[test]
    fn test_set_pointer_grows_map() {
        let mut td = TypeDesc::new(3, 8);
        td.set_pointer(0);
        td.set_pointer(8 * 17);
        assert_eq!(td.map, [0x80, 0x00, 0x40]);
        assert!(td.has_pointer(0));
        assert!(td.has_pointer(136));
        assert!(!td.has_pointer(8 * 100));
    }

    #[test]
    fn test_trim_map() {
        let mut td = TypeDesc::new(1, 256);
        td.set_pointer(8);
        assert_eq!(td.nmap(), 4);
        td.trim_map();
        assert_eq!(td.map, [0x40]);

        let mut empty = TypeDesc::new(2, 64);
        empty.trim_map();
        assert_eq!(empty.nmap(), 0);
    }

    #[test]
    fn test_codec() {
        let mut td = TypeDesc::new(1, 72);
        for reg in 0..5 {
            td.set_pointer(reg * IBY2WD);
        }
        let mut out = Vec::new();
        td.encode(&mut out);
        assert_eq!(out, [1, 0x80, 72, 2, 0xF8, 0x00]);

        let mut r = Reader::new(&out);
        assert_eq!(TypeDesc::decode(&mut r).unwrap(), td);
        assert!(r.is_empty());
    }

    #[test]
    fn test_decode_non_minimal_map() {
        // size 8 but a 3-byte map
        let bytes = [0, 8, 3, 0x80, 0, 0];
        let td = TypeDesc::decode(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(td.map, [0x80, 0, 0]);
    }

    #[test]
    fn test_decode_truncated_map() {
        let err = TypeDesc::decode(&mut Reader::new(&[0, 8, 2, 0x80])).unwrap_err();
        assert_eq!(err.to_string(), "map bytes: unexpected EOF at offset 3");
    }

    #[test]
    fn test_decode_truncated_nmap() {
        let err = TypeDesc::decode(&mut Reader::new(&[0, 8])).unwrap_err();
        assert_eq!(err.path(), vec!["nmap"]);
        assert!(matches!(err.root(), DecodeError::UnexpectedEof { offset: 2, .. }));
    }
}
