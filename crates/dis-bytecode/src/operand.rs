//! Instruction operands and addressing modes
//!
//! An instruction's address byte packs three independent mode fields:
//!
//! ```text
//!   7 6   5 4 3   2 1 0
//!  [mid] [ src ] [ dst ]
//! ```
//!
//! Source and destination use the 3-bit modes below (with [`AIND`] ORed onto
//! module- or frame-relative for the double-indirect forms); the middle
//! operand uses the 2-bit `AX*` values, already shifted into place.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoding::{Reader, write_operand};
use crate::error::{DecodeError, Result, ResultExt};

/// Module-pointer relative
pub const AMP: u8 = 0x00;
/// Frame-pointer relative
pub const AFP: u8 = 0x01;
/// Immediate value
pub const AIMM: u8 = 0x02;
/// No operand
pub const AXXX: u8 = 0x03;
/// Indirect flag, ORed with [`AMP`] or [`AFP`]
pub const AIND: u8 = 0x04;
/// Mask for a source/destination mode
pub const AMASK: u8 = 0x07;

/// No middle operand
pub const AXNON: u8 = 0x00;
/// Immediate middle operand
pub const AXIMM: u8 = 0x40;
/// Frame-relative middle operand
pub const AXINF: u8 = 0x80;
/// Module-relative middle operand
pub const AXINM: u8 = 0xC0;
/// Mask for the middle mode bits
pub const ARM: u8 = 0xC0;

/// A single instruction operand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// Unused slot
    #[default]
    None,
    /// `off(mp)`
    Mp(i32),
    /// `off(fp)`
    Fp(i32),
    /// `$val`
    Imm(i32),
    /// `ind(off(mp))`: the word at `off(mp)` is a pointer, `ind` is added to it
    MpInd(i32, i32),
    /// `ind(off(fp))`
    FpInd(i32, i32),
}

impl Operand {
    /// Module-pointer relative operand
    #[inline]
    pub const fn mp(offset: i32) -> Self {
        Self::Mp(offset)
    }

    /// Frame-pointer relative operand
    #[inline]
    pub const fn fp(offset: i32) -> Self {
        Self::Fp(offset)
    }

    /// Immediate operand
    #[inline]
    pub const fn imm(val: i32) -> Self {
        Self::Imm(val)
    }

    /// Indirect module-pointer operand: `ind(offset(mp))`
    #[inline]
    pub const fn mp_ind(offset: i32, ind: i32) -> Self {
        Self::MpInd(offset, ind)
    }

    /// Indirect frame-pointer operand: `ind(offset(fp))`
    #[inline]
    pub const fn fp_ind(offset: i32, ind: i32) -> Self {
        Self::FpInd(offset, ind)
    }

    /// Check if this slot is unused
    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Check if this operand uses double-indirect addressing
    #[inline]
    pub const fn is_indirect(&self) -> bool {
        matches!(self, Self::MpInd(..) | Self::FpInd(..))
    }

    /// Mode bits for the source or destination position (unshifted)
    pub const fn src_dst_mode(&self) -> u8 {
        match self {
            Self::None => AXXX,
            Self::Mp(_) => AMP,
            Self::Fp(_) => AFP,
            Self::Imm(_) => AIMM,
            Self::MpInd(..) => AMP | AIND,
            Self::FpInd(..) => AFP | AIND,
        }
    }

    /// Mode bits for the middle position (already in bits 6-7)
    ///
    /// The middle slot has no indirect form; indirect operands placed there
    /// encode as absent.
    pub const fn mid_mode(&self) -> u8 {
        match self {
            Self::Imm(_) => AXIMM,
            Self::Fp(_) => AXINF,
            Self::Mp(_) => AXINM,
            Self::None | Self::MpInd(..) | Self::FpInd(..) => AXNON,
        }
    }

    /// Append the operand fields for the source or destination position
    pub(crate) fn write_src_dst(&self, out: &mut Vec<u8>) {
        match *self {
            Self::None => {}
            Self::Mp(v) | Self::Fp(v) | Self::Imm(v) => write_operand(out, v),
            Self::MpInd(off, ind) | Self::FpInd(off, ind) => {
                write_operand(out, off);
                write_operand(out, ind);
            }
        }
    }

    /// Append the operand field for the middle position
    pub(crate) fn write_mid(&self, out: &mut Vec<u8>) {
        match *self {
            Self::Mp(v) | Self::Fp(v) | Self::Imm(v) => write_operand(out, v),
            Self::None | Self::MpInd(..) | Self::FpInd(..) => {}
        }
    }

    /// Read a source or destination operand selected by a 3-bit `mode`
    ///
    /// `add_offset` is the position of the address byte, reported when the
    /// mode has no wire form.
    pub(crate) fn read_src_dst(r: &mut Reader<'_>, mode: u8, add_offset: usize) -> Result<Self> {
        let op = match mode {
            AMP => Self::Mp(r.operand()?),
            AFP => Self::Fp(r.operand()?),
            AIMM => Self::Imm(r.operand()?),
            AXXX => Self::None,
            m if m == AMP | AIND => {
                let off = r.operand().context("ind first")?;
                Self::MpInd(off, r.operand().context("ind second")?)
            }
            m if m == AFP | AIND => {
                let off = r.operand().context("ind first")?;
                Self::FpInd(off, r.operand().context("ind second")?)
            }
            _ => {
                return Err(DecodeError::InvalidOperand {
                    mode,
                    offset: add_offset,
                });
            }
        };
        Ok(op)
    }

    /// Read a middle operand selected by the `ARM` bits of the address byte
    pub(crate) fn read_mid(r: &mut Reader<'_>, add: u8) -> Result<Self> {
        let op = match add & ARM {
            AXIMM => Self::Imm(r.operand()?),
            AXINF => Self::Fp(r.operand()?),
            AXINM => Self::Mp(r.operand()?),
            _ => Self::None,
        };
        Ok(op)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("-"),
            Self::Mp(off) => write!(f, "{off}(mp)"),
            Self::Fp(off) => write!(f, "{off}(fp)"),
            Self::Imm(val) => write!(f, "${val}"),
            Self::MpInd(off, ind) => write!(f, "{ind}({off}(mp))"),
            Self::FpInd(off, ind) => write!(f, "{ind}({off}(fp))"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_display() {
        assert_eq!(Operand::None.to_string(), "-");
        assert_eq!(Operand::fp(64).to_string(), "64(fp)");
        assert_eq!(Operand::mp(0).to_string(), "0(mp)");
        assert_eq!(Operand::imm(-1).to_string(), "$-1");
        assert_eq!(Operand::fp_ind(64, 8).to_string(), "8(64(fp))");
        assert_eq!(Operand::mp_ind(16, 4).to_string(), "4(16(mp))");
    }

    #[test]
    fn test_modes() {
        assert_eq!(Operand::fp_ind(0, 0).src_dst_mode(), 0x05);
        assert_eq!(Operand::mp_ind(0, 0).src_dst_mode(), 0x04);
        assert_eq!(Operand::None.src_dst_mode(), AXXX);
        assert_eq!(Operand::imm(1).mid_mode(), AXIMM);
        assert_eq!(Operand::mp_ind(1, 2).mid_mode(), AXNON);
        assert!(Operand::fp_ind(1, 2).is_indirect());
        assert!(!Operand::fp(1).is_indirect());
    }

    #[test]
    fn test_invalid_mode() {
        let mut r = Reader::new(&[0x00]);
        let err = Operand::read_src_dst(&mut r, 0x06, 1).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidOperand { mode: 6, offset: 1 }
        ));
        // nothing consumed
        assert_eq!(r.position(), 0);
    }
}
