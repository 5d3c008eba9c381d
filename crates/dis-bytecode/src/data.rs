//! Module data initialisation items
//!
//! The data section is a list of tagged records that the loader replays to
//! fill the module's static data segment, terminated by a single zero byte.
//!
//! ```text
//! header:u8 = kind << 4 | n     (n = count when 1..=15, else 0)
//! [count]                        only when n == 0
//! offset
//! payload
//! ```

use serde::{Deserialize, Serialize};

use crate::encoding::{Reader, write_long, write_operand, write_real, write_word};
use crate::error::{DecodeError, Result, ResultExt};

/// Counts below this fit in the header's low nibble
pub const DMAX: i32 = 1 << 4;

/// Data item kind, stored in the high nibble of the item header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataKind {
    /// Reserved; a zero header byte terminates the list
    Zero = 0,
    /// Raw byte run (`DEFB`)
    Bytes = 1,
    /// 4-byte word run (`DEFW`)
    Words = 2,
    /// UTF-8 string (`DEFS`)
    String = 3,
    /// IEEE-754 double run (`DEFF`)
    Reals = 4,
    /// Array allocation (`DEFA`)
    Array = 5,
    /// Select array element as the new base (`DIND`)
    Index = 6,
    /// Restore the previous base (`DAPOP`)
    Apop = 7,
    /// 64-bit integer run (`DEFL`)
    Longs = 8,
}

impl DataKind {
    /// Convert from the header's high nibble
    pub fn from_nibble(kind: u8) -> Option<Self> {
        match kind {
            0 => Some(Self::Zero),
            1 => Some(Self::Bytes),
            2 => Some(Self::Words),
            3 => Some(Self::String),
            4 => Some(Self::Reals),
            5 => Some(Self::Array),
            6 => Some(Self::Index),
            7 => Some(Self::Apop),
            8 => Some(Self::Longs),
            _ => None,
        }
    }

    /// Convert to the header's high nibble
    #[inline]
    pub fn to_nibble(self) -> u8 {
        self as u8
    }
}

/// One data initialisation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataItem {
    /// Raw bytes at `offset`
    Bytes {
        /// Byte offset in the current base
        offset: i32,
        /// Payload
        bytes: Vec<u8>,
    },
    /// Words at `offset`, one per VM word slot
    Words {
        /// Byte offset in the current base
        offset: i32,
        /// Payload
        words: Vec<u32>,
    },
    /// String pointer at `offset`
    String {
        /// Byte offset in the current base
        offset: i32,
        /// String contents (no terminator on the wire)
        value: String,
    },
    /// Doubles at `offset`
    Reals {
        /// Byte offset in the current base
        offset: i32,
        /// Payload
        values: Vec<f64>,
    },
    /// Allocate an array and store its pointer at `offset`
    Array {
        /// Byte offset in the current base
        offset: i32,
        /// Header count (1 from every known producer)
        count: i32,
        /// Element type descriptor
        type_id: i32,
        /// Number of elements
        len: i32,
    },
    /// Make element `index` of the array at `offset` the new base
    Index {
        /// Offset field from the item header
        ///
        /// The loader ignores it in favour of `offset`; it is kept so the
        /// item re-encodes byte for byte.
        base: i32,
        /// Header count (1 from every known producer)
        count: i32,
        /// Offset of the array pointer, from the item payload
        offset: i32,
        /// Element index
        index: i32,
    },
    /// Pop the base back to the enclosing one
    Apop {
        /// Offset field from the item header (unused by the loader)
        offset: i32,
        /// Header count (1 from every known producer)
        count: i32,
    },
    /// 64-bit integers at `offset`
    Longs {
        /// Byte offset in the current base
        offset: i32,
        /// Payload
        values: Vec<i64>,
    },
}

impl DataItem {
    /// Raw byte run
    pub fn bytes(offset: i32, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes {
            offset,
            bytes: bytes.into(),
        }
    }

    /// Single word
    pub fn word(offset: i32, val: u32) -> Self {
        Self::words(offset, vec![val])
    }

    /// Word run
    pub fn words(offset: i32, words: impl Into<Vec<u32>>) -> Self {
        Self::Words {
            offset,
            words: words.into(),
        }
    }

    /// UTF-8 string
    pub fn string(offset: i32, value: impl Into<String>) -> Self {
        Self::String {
            offset,
            value: value.into(),
        }
    }

    /// Single double
    pub fn real(offset: i32, val: f64) -> Self {
        Self::reals(offset, vec![val])
    }

    /// Double run
    pub fn reals(offset: i32, values: impl Into<Vec<f64>>) -> Self {
        Self::Reals {
            offset,
            values: values.into(),
        }
    }

    /// Single 64-bit integer
    pub fn long(offset: i32, val: i64) -> Self {
        Self::longs(offset, vec![val])
    }

    /// 64-bit integer run
    pub fn longs(offset: i32, values: impl Into<Vec<i64>>) -> Self {
        Self::Longs {
            offset,
            values: values.into(),
        }
    }

    /// Array of `len` elements of type `type_id`
    pub fn array(offset: i32, type_id: i32, len: i32) -> Self {
        Self::Array {
            offset,
            count: 1,
            type_id,
            len,
        }
    }

    /// Descend into element `index` of the array at `offset`
    pub fn index(offset: i32, index: i32) -> Self {
        Self::Index {
            base: offset,
            count: 1,
            offset,
            index,
        }
    }

    /// Return to the enclosing base
    pub fn apop() -> Self {
        Self::Apop {
            offset: 0,
            count: 1,
        }
    }

    /// Kind tag
    pub fn kind(&self) -> DataKind {
        match self {
            Self::Bytes { .. } => DataKind::Bytes,
            Self::Words { .. } => DataKind::Words,
            Self::String { .. } => DataKind::String,
            Self::Reals { .. } => DataKind::Reals,
            Self::Array { .. } => DataKind::Array,
            Self::Index { .. } => DataKind::Index,
            Self::Apop { .. } => DataKind::Apop,
            Self::Longs { .. } => DataKind::Longs,
        }
    }

    /// Byte offset the item initialises
    pub fn offset(&self) -> i32 {
        match self {
            Self::Bytes { offset, .. }
            | Self::Words { offset, .. }
            | Self::String { offset, .. }
            | Self::Reals { offset, .. }
            | Self::Array { offset, .. }
            | Self::Index { offset, .. }
            | Self::Apop { offset, .. }
            | Self::Longs { offset, .. } => *offset,
        }
    }

    /// Count field written in the item header
    ///
    /// For runs this is the number of elements (bytes for strings).
    pub fn count(&self) -> i32 {
        match self {
            Self::Bytes { bytes, .. } => bytes.len() as i32,
            Self::Words { words, .. } => words.len() as i32,
            Self::String { value, .. } => value.len() as i32,
            Self::Reals { values, .. } => values.len() as i32,
            Self::Longs { values, .. } => values.len() as i32,
            Self::Array { count, .. } | Self::Index { count, .. } | Self::Apop { count, .. } => {
                *count
            }
        }
    }

    fn header_offset(&self) -> i32 {
        match self {
            Self::Index { base, .. } => *base,
            _ => self.offset(),
        }
    }

    /// Append the wire form of this item
    pub fn encode(&self, out: &mut Vec<u8>) {
        let kind = self.kind().to_nibble() << 4;
        let count = self.count();
        if count > 0 && count < DMAX {
            out.push(kind | count as u8);
        } else {
            out.push(kind);
            write_operand(out, count);
        }
        write_operand(out, self.header_offset());

        match self {
            Self::Bytes { bytes, .. } => out.extend_from_slice(bytes),
            Self::Words { words, .. } => words.iter().for_each(|&w| write_word(out, w)),
            Self::String { value, .. } => out.extend_from_slice(value.as_bytes()),
            Self::Reals { values, .. } => values.iter().for_each(|&v| write_real(out, v)),
            Self::Longs { values, .. } => values.iter().for_each(|&v| write_long(out, v)),
            Self::Array { type_id, len, .. } => {
                write_word(out, *type_id as u32);
                write_word(out, *len as u32);
            }
            Self::Index { offset, index, .. } => {
                write_word(out, *offset as u32);
                write_word(out, *index as u32);
            }
            Self::Apop { .. } => {}
        }
    }

    /// Read one item, or `None` at the terminating zero byte
    pub fn decode(r: &mut Reader<'_>) -> Result<Option<Self>> {
        let at = r.position();
        let sm = r.byte()?;
        if sm == 0 {
            return Ok(None);
        }

        let unknown = || DecodeError::UnknownDataKind {
            kind: sm >> 4,
            offset: at,
        };
        let kind = DataKind::from_nibble(sm >> 4).ok_or_else(unknown)?;

        let count = match i32::from(sm & 0x0F) {
            0 => r.operand().context("data count")?,
            n => n,
        };
        let offset = r.operand().context("data offset")?;

        let item = match kind {
            DataKind::Bytes => {
                let n = run_len(count, 1, r).context("defb data")?;
                Self::Bytes {
                    offset,
                    bytes: r.bytes(n).context("defb data")?,
                }
            }
            DataKind::Words => {
                let n = run_len(count, 4, r).context("defw data")?;
                let words = (0..n)
                    .map(|_| r.word())
                    .collect::<Result<Vec<_>>>()
                    .context("defw data")?;
                Self::Words { offset, words }
            }
            DataKind::String => {
                let n = run_len(count, 1, r).context("defs data")?;
                Self::String {
                    offset,
                    value: r.text(n).context("defs data")?,
                }
            }
            DataKind::Reals => {
                let n = run_len(count, 8, r).context("deff data")?;
                let values = (0..n)
                    .map(|_| r.real())
                    .collect::<Result<Vec<_>>>()
                    .context("deff data")?;
                Self::Reals { offset, values }
            }
            DataKind::Longs => {
                let n = run_len(count, 8, r).context("defl data")?;
                let values = (0..n)
                    .map(|_| r.long())
                    .collect::<Result<Vec<_>>>()
                    .context("defl data")?;
                Self::Longs { offset, values }
            }
            DataKind::Array => {
                let type_id = r.word().context("defa type")? as i32;
                let len = r.word().context("defa length")? as i32;
                Self::Array {
                    offset,
                    count,
                    type_id,
                    len,
                }
            }
            DataKind::Index => {
                let payload_offset = r.word().context("dind offset")? as i32;
                let index = r.word().context("dind index")? as i32;
                Self::Index {
                    base: offset,
                    count,
                    offset: payload_offset,
                    index,
                }
            }
            DataKind::Apop => Self::Apop { offset, count },
            // a zero header byte ends the list, so kind 0 with a count is bogus
            DataKind::Zero => return Err(unknown()),
        };
        Ok(Some(item))
    }
}

/// Validate a run count and make sure `count * width` bytes are available
/// before anything is allocated for it
fn run_len(count: i32, width: usize, r: &Reader<'_>) -> Result<usize> {
    let n = usize::try_from(count).map_err(|_| DecodeError::InvalidCount { count })?;
    let bytes = n
        .checked_mul(width)
        .ok_or(DecodeError::InvalidCount { count })?;
    r.ensure(bytes)?;
    Ok(n)
}

/// Append every item followed by the terminating zero byte
pub fn encode_items(items: &[DataItem], out: &mut Vec<u8>) {
    for item in items {
        item.encode(out);
    }
    out.push(0);
}

/// Read items up to and including the terminating zero byte
pub fn decode_items(r: &mut Reader<'_>) -> Result<Vec<DataItem>> {
    let mut items = Vec::new();
    while let Some(item) = DataItem::decode(r).with_context(|| format!("item {}", items.len()))? {
        items.push(item);
    }
    Ok(items)
}
