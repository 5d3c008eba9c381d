//! Primitive wire encodings
//!
//! Every count, offset and operand in a module uses the self-describing
//! variable-length integer form below; signatures and the halves of 64-bit
//! values use fixed 4-byte big-endian words.
//!
//! | range                | bytes | first byte      |
//! |----------------------|-------|-----------------|
//! | `[-64, 63]`          | 1     | `0b0s_xxxxxx`   |
//! | `[-8192, 8191]`      | 2     | `0b10_sxxxxx`   |
//! | `[-2^29, 2^29 - 1]`  | 4     | `0b11_sxxxxx`   |

use crate::error::{DecodeError, Result};

/// Smallest value representable by the 4-byte operand form
pub const OPERAND_MIN: i32 = -(1 << 29);

/// Largest value representable by the 4-byte operand form
pub const OPERAND_MAX: i32 = (1 << 29) - 1;

/// Number of bytes `write_operand` emits for `val`
#[inline]
pub const fn operand_len(val: i32) -> usize {
    if val >= -64 && val <= 63 {
        1
    } else if val >= -8192 && val <= 8191 {
        2
    } else {
        4
    }
}

/// Append a variable-length signed integer
///
/// Values outside [`OPERAND_MIN`]..=[`OPERAND_MAX`] lose their top bits, the
/// same way the reference loader would misread them.
pub fn write_operand(out: &mut Vec<u8>, val: i32) {
    match operand_len(val) {
        1 => out.push(val as u8 & 0x7F),
        2 => {
            out.push(((val >> 8) as u8 & 0x3F) | 0x80);
            out.push(val as u8);
        }
        _ => {
            out.push((val >> 24) as u8 | 0xC0);
            out.push((val >> 16) as u8);
            out.push((val >> 8) as u8);
            out.push(val as u8);
        }
    }
}

/// Append a 4-byte big-endian word
#[inline]
pub fn write_word(out: &mut Vec<u8>, val: u32) {
    out.extend_from_slice(&val.to_be_bytes());
}

/// Append a 64-bit value as high word then low word
#[inline]
pub fn write_long(out: &mut Vec<u8>, val: i64) {
    let bits = val as u64;
    write_word(out, (bits >> 32) as u32);
    write_word(out, bits as u32);
}

/// Append an IEEE-754 double in the canonical (big-endian) order
#[inline]
pub fn write_real(out: &mut Vec<u8>, val: f64) {
    write_long(out, val.to_bits() as i64);
}

/// Append a NUL-terminated string
#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Sign-extend the 6-bit payload of a multi-byte operand's first byte
#[inline]
fn high_bits(c: u8) -> i32 {
    let v = i32::from(c & 0x3F);
    if c & 0x20 != 0 { v | !0x3F } else { v }
}

/// Byte cursor over an encoded module
///
/// Every read either succeeds and advances, or fails and leaves the cursor
/// where the failed field started.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset into the input
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Check if the input is exhausted
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn ensure(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed,
            });
        }
        Ok(())
    }

    /// Read one raw byte
    pub fn byte(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    /// Read `n` raw bytes into an owned buffer
    pub fn bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n)?;
        let b = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(b)
    }

    /// Read a variable-length signed integer
    pub fn operand(&mut self) -> Result<i32> {
        let c = *self.data.get(self.pos).ok_or(DecodeError::UnexpectedEof {
            offset: self.pos,
            needed: 1,
        })?;
        let v = match c & 0xC0 {
            0x00 => i32::from(c),
            0x40 => i32::from(c) | !0x7F,
            0x80 => {
                self.ensure(2)?;
                let c2 = i32::from(self.data[self.pos + 1]);
                high_bits(c) << 8 | c2
            }
            _ => {
                self.ensure(4)?;
                let b = &self.data[self.pos + 1..self.pos + 4];
                high_bits(c) << 24 | i32::from(b[0]) << 16 | i32::from(b[1]) << 8 | i32::from(b[2])
            }
        };
        self.pos += operand_len_from_tag(c);
        Ok(v)
    }

    /// Read a variable-length count, rejecting negative values
    pub fn count(&mut self) -> Result<usize> {
        let n = self.operand()?;
        usize::try_from(n).map_err(|_| DecodeError::InvalidCount { count: n })
    }

    /// Read a 4-byte big-endian word
    pub fn word(&mut self) -> Result<u32> {
        self.ensure(4)?;
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_be_bytes(b))
    }

    /// Read a 64-bit value stored high word then low word
    pub fn long(&mut self) -> Result<i64> {
        self.ensure(8)?;
        let hi = self.word()?;
        let lo = self.word()?;
        Ok((u64::from(hi) << 32 | u64::from(lo)) as i64)
    }

    /// Read a canonical IEEE-754 double
    pub fn real(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.long()? as u64))
    }

    /// Read a NUL-terminated UTF-8 string
    pub fn cstr(&mut self) -> Result<String> {
        let start = self.pos;
        let len = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::UnterminatedString { offset: start })?;
        let s = std::str::from_utf8(&self.data[start..start + len])
            .map_err(|_| DecodeError::InvalidUtf8 { offset: start })?
            .to_owned();
        self.pos = start + len + 1;
        Ok(s)
    }

    /// Read `n` bytes of UTF-8 text with no terminator
    pub fn text(&mut self, n: usize) -> Result<String> {
        let start = self.pos;
        let bytes = self.bytes(n)?;
        String::from_utf8(bytes).map_err(|_| {
            self.pos = start;
            DecodeError::InvalidUtf8 { offset: start }
        })
    }

    /// Advance past `n` bytes without copying them
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }
}

#[inline]
fn operand_len_from_tag(c: u8) -> usize {
    match c & 0xC0 {
        0x00 | 0x40 => 1,
        0x80 => 2,
        _ => 4,
    }
}
