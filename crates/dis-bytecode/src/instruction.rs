//! Dis instruction set and the per-instruction codec
//!
//! Wire form of one instruction:
//!
//! ```text
//! op:u8  add:u8  [mid]  [src | src src']  [dst | dst dst']
//! ```
//!
//! where every bracketed field is a variable-length operand whose presence is
//! decided by the address byte `add`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoding::Reader;
use crate::error::{DecodeError, Result, ResultExt};
use crate::operand::{AMASK, Operand};

/// Number of opcodes in the instruction set
pub const MAX_DIS: usize = 175;

/// Dis VM opcodes
///
/// The discriminant is the opcode byte on the wire. The set is closed: any
/// byte at or above [`MAX_DIS`] is rejected by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    // ==================== Control flow ====================
    Nop = 0,
    Alt = 1,
    Nbalt = 2,
    Goto = 3,
    Call = 4,
    Frame = 5,
    Spawn = 6,
    Runt = 7,
    Load = 8,
    Mcall = 9,
    Mspawn = 10,
    Mframe = 11,
    Ret = 12,
    Jmp = 13,
    Case = 14,
    Exit = 15,

    // ==================== Allocation ====================
    New = 16,
    Newa = 17,
    Newcb = 18,
    Newcw = 19,
    Newcf = 20,
    Newcp = 21,
    Newcm = 22,
    Newcmp = 23,

    // ==================== Channels ====================
    Send = 24,
    Recv = 25,

    // ==================== Lists ====================
    Consb = 26,
    Consw = 27,
    Consp = 28,
    Consf = 29,
    Consm = 30,
    Consmp = 31,
    Headb = 32,
    Headw = 33,
    Headp = 34,
    Headf = 35,
    Headm = 36,
    Headmp = 37,
    Tail = 38,

    // ==================== Addressing and moves ====================
    Lea = 39,
    Indx = 40,
    Movp = 41,
    Movm = 42,
    Movmp = 43,
    Movb = 44,
    Movw = 45,
    Movf = 46,

    // ==================== Conversions ====================
    Cvtbw = 47,
    Cvtwb = 48,
    Cvtfw = 49,
    Cvtwf = 50,
    Cvtca = 51,
    Cvtac = 52,
    Cvtwc = 53,
    Cvtcw = 54,
    Cvtfc = 55,
    Cvtcf = 56,

    // ==================== Arithmetic (byte, word, real) ====================
    Addb = 57,
    Addw = 58,
    Addf = 59,
    Subb = 60,
    Subw = 61,
    Subf = 62,
    Mulb = 63,
    Mulw = 64,
    Mulf = 65,
    Divb = 66,
    Divw = 67,
    Divf = 68,
    Modw = 69,
    Modb = 70,
    Andb = 71,
    Andw = 72,
    Orb = 73,
    Orw = 74,
    Xorb = 75,
    Xorw = 76,
    Shlb = 77,
    Shlw = 78,
    Shrb = 79,
    Shrw = 80,

    // ==================== Strings and lengths ====================
    Insc = 81,
    Indc = 82,
    Addc = 83,
    Lenc = 84,
    Lena = 85,
    Lenl = 86,

    // ==================== Conditional branches ====================
    Beqb = 87,
    Bneb = 88,
    Bltb = 89,
    Bleb = 90,
    Bgtb = 91,
    Bgeb = 92,
    Beqw = 93,
    Bnew = 94,
    Bltw = 95,
    Blew = 96,
    Bgtw = 97,
    Bgew = 98,
    Beqf = 99,
    Bnef = 100,
    Bltf = 101,
    Blef = 102,
    Bgtf = 103,
    Bgef = 104,
    Beqc = 105,
    Bnec = 106,
    Bltc = 107,
    Blec = 108,
    Bgtc = 109,
    Bgec = 110,

    // ==================== Slices and indexing ====================
    Slicea = 111,
    Slicela = 112,
    Slicec = 113,
    Indw = 114,
    Indf = 115,
    Indb = 116,

    // ==================== Big (64-bit) arithmetic ====================
    Negf = 117,
    Movl = 118,
    Addl = 119,
    Subl = 120,
    Divl = 121,
    Modl = 122,
    Mull = 123,
    Andl = 124,
    Orl = 125,
    Xorl = 126,
    Shll = 127,
    Shrl = 128,
    Bnel = 129,
    Bltl = 130,
    Blel = 131,
    Bgtl = 132,
    Bgel = 133,
    Beql = 134,
    Cvtlf = 135,
    Cvtfl = 136,
    Cvtlw = 137,
    Cvtwl = 138,
    Cvtlc = 139,
    Cvtcl = 140,
    Headl = 141,
    Consl = 142,
    Newcl = 143,

    // ==================== Late additions ====================
    Casec = 144,
    Indl = 145,
    Movpc = 146,
    Tcmp = 147,
    Mnewz = 148,
    Cvtrf = 149,
    Cvtfr = 150,
    Cvtws = 151,
    Cvtsw = 152,
    Lsrw = 153,
    Lsrl = 154,
    Eclr = 155,
    Newz = 156,
    Newaz = 157,
    Raise = 158,
    Casel = 159,

    // ==================== Fixed point ====================
    Mulx = 160,
    Divx = 161,
    Cvtxx = 162,
    Mulx0 = 163,
    Divx0 = 164,
    Cvtxx0 = 165,
    Mulx1 = 166,
    Divx1 = 167,
    Cvtxx1 = 168,
    Cvtfx = 169,
    Cvtxf = 170,

    // ==================== Exponentiation ====================
    Expw = 171,
    Expl = 172,
    Expf = 173,

    // ==================== Module ====================
    SelfMod = 174,
}

/// Opcodes indexed by their byte value
const OPCODES: [Opcode; MAX_DIS] = {
    use Opcode::*;
    [
        Nop, Alt, Nbalt, Goto, Call, Frame,
        Spawn, Runt, Load, Mcall, Mspawn, Mframe,
        Ret, Jmp, Case, Exit, New, Newa,
        Newcb, Newcw, Newcf, Newcp, Newcm, Newcmp,
        Send, Recv, Consb, Consw, Consp, Consf,
        Consm, Consmp, Headb, Headw, Headp, Headf,
        Headm, Headmp, Tail, Lea, Indx, Movp,
        Movm, Movmp, Movb, Movw, Movf, Cvtbw,
        Cvtwb, Cvtfw, Cvtwf, Cvtca, Cvtac, Cvtwc,
        Cvtcw, Cvtfc, Cvtcf, Addb, Addw, Addf,
        Subb, Subw, Subf, Mulb, Mulw, Mulf,
        Divb, Divw, Divf, Modw, Modb, Andb,
        Andw, Orb, Orw, Xorb, Xorw, Shlb,
        Shlw, Shrb, Shrw, Insc, Indc, Addc,
        Lenc, Lena, Lenl, Beqb, Bneb, Bltb,
        Bleb, Bgtb, Bgeb, Beqw, Bnew, Bltw,
        Blew, Bgtw, Bgew, Beqf, Bnef, Bltf,
        Blef, Bgtf, Bgef, Beqc, Bnec, Bltc,
        Blec, Bgtc, Bgec, Slicea, Slicela, Slicec,
        Indw, Indf, Indb, Negf, Movl, Addl,
        Subl, Divl, Modl, Mull, Andl, Orl,
        Xorl, Shll, Shrl, Bnel, Bltl, Blel,
        Bgtl, Bgel, Beql, Cvtlf, Cvtfl, Cvtlw,
        Cvtwl, Cvtlc, Cvtcl, Headl, Consl, Newcl,
        Casec, Indl, Movpc, Tcmp, Mnewz, Cvtrf,
        Cvtfr, Cvtws, Cvtsw, Lsrw, Lsrl, Eclr,
        Newz, Newaz, Raise, Casel, Mulx, Divx,
        Cvtxx, Mulx0, Divx0, Cvtxx0, Mulx1, Divx1,
        Cvtxx1, Cvtfx, Cvtxf, Expw, Expl, Expf,
        SelfMod,
    ]
};

impl Opcode {
    /// Convert from raw byte
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Self> {
        OPCODES.get(usize::from(byte)).copied()
    }

    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// All opcodes in byte order
    pub fn all() -> impl Iterator<Item = Self> {
        OPCODES.iter().copied()
    }

    /// Assembler mnemonic
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Alt => "alt",
            Self::Nbalt => "nbalt",
            Self::Goto => "goto",
            Self::Call => "call",
            Self::Frame => "frame",
            Self::Spawn => "spawn",
            Self::Runt => "runt",
            Self::Load => "load",
            Self::Mcall => "mcall",
            Self::Mspawn => "mspawn",
            Self::Mframe => "mframe",
            Self::Ret => "ret",
            Self::Jmp => "jmp",
            Self::Case => "case",
            Self::Exit => "exit",
            Self::New => "new",
            Self::Newa => "newa",
            Self::Newcb => "newcb",
            Self::Newcw => "newcw",
            Self::Newcf => "newcf",
            Self::Newcp => "newcp",
            Self::Newcm => "newcm",
            Self::Newcmp => "newcmp",
            Self::Send => "send",
            Self::Recv => "recv",
            Self::Consb => "consb",
            Self::Consw => "consw",
            Self::Consp => "consp",
            Self::Consf => "consf",
            Self::Consm => "consm",
            Self::Consmp => "consmp",
            Self::Headb => "headb",
            Self::Headw => "headw",
            Self::Headp => "headp",
            Self::Headf => "headf",
            Self::Headm => "headm",
            Self::Headmp => "headmp",
            Self::Tail => "tail",
            Self::Lea => "lea",
            Self::Indx => "indx",
            Self::Movp => "movp",
            Self::Movm => "movm",
            Self::Movmp => "movmp",
            Self::Movb => "movb",
            Self::Movw => "movw",
            Self::Movf => "movf",
            Self::Cvtbw => "cvtbw",
            Self::Cvtwb => "cvtwb",
            Self::Cvtfw => "cvtfw",
            Self::Cvtwf => "cvtwf",
            Self::Cvtca => "cvtca",
            Self::Cvtac => "cvtac",
            Self::Cvtwc => "cvtwc",
            Self::Cvtcw => "cvtcw",
            Self::Cvtfc => "cvtfc",
            Self::Cvtcf => "cvtcf",
            Self::Addb => "addb",
            Self::Addw => "addw",
            Self::Addf => "addf",
            Self::Subb => "subb",
            Self::Subw => "subw",
            Self::Subf => "subf",
            Self::Mulb => "mulb",
            Self::Mulw => "mulw",
            Self::Mulf => "mulf",
            Self::Divb => "divb",
            Self::Divw => "divw",
            Self::Divf => "divf",
            Self::Modw => "modw",
            Self::Modb => "modb",
            Self::Andb => "andb",
            Self::Andw => "andw",
            Self::Orb => "orb",
            Self::Orw => "orw",
            Self::Xorb => "xorb",
            Self::Xorw => "xorw",
            Self::Shlb => "shlb",
            Self::Shlw => "shlw",
            Self::Shrb => "shrb",
            Self::Shrw => "shrw",
            Self::Insc => "insc",
            Self::Indc => "indc",
            Self::Addc => "addc",
            Self::Lenc => "lenc",
            Self::Lena => "lena",
            Self::Lenl => "lenl",
            Self::Beqb => "beqb",
            Self::Bneb => "bneb",
            Self::Bltb => "bltb",
            Self::Bleb => "bleb",
            Self::Bgtb => "bgtb",
            Self::Bgeb => "bgeb",
            Self::Beqw => "beqw",
            Self::Bnew => "bnew",
            Self::Bltw => "bltw",
            Self::Blew => "blew",
            Self::Bgtw => "bgtw",
            Self::Bgew => "bgew",
            Self::Beqf => "beqf",
            Self::Bnef => "bnef",
            Self::Bltf => "bltf",
            Self::Blef => "blef",
            Self::Bgtf => "bgtf",
            Self::Bgef => "bgef",
            Self::Beqc => "beqc",
            Self::Bnec => "bnec",
            Self::Bltc => "bltc",
            Self::Blec => "blec",
            Self::Bgtc => "bgtc",
            Self::Bgec => "bgec",
            Self::Slicea => "slicea",
            Self::Slicela => "slicela",
            Self::Slicec => "slicec",
            Self::Indw => "indw",
            Self::Indf => "indf",
            Self::Indb => "indb",
            Self::Negf => "negf",
            Self::Movl => "movl",
            Self::Addl => "addl",
            Self::Subl => "subl",
            Self::Divl => "divl",
            Self::Modl => "modl",
            Self::Mull => "mull",
            Self::Andl => "andl",
            Self::Orl => "orl",
            Self::Xorl => "xorl",
            Self::Shll => "shll",
            Self::Shrl => "shrl",
            Self::Bnel => "bnel",
            Self::Bltl => "bltl",
            Self::Blel => "blel",
            Self::Bgtl => "bgtl",
            Self::Bgel => "bgel",
            Self::Beql => "beql",
            Self::Cvtlf => "cvtlf",
            Self::Cvtfl => "cvtfl",
            Self::Cvtlw => "cvtlw",
            Self::Cvtwl => "cvtwl",
            Self::Cvtlc => "cvtlc",
            Self::Cvtcl => "cvtcl",
            Self::Headl => "headl",
            Self::Consl => "consl",
            Self::Newcl => "newcl",
            Self::Casec => "casec",
            Self::Indl => "indl",
            Self::Movpc => "movpc",
            Self::Tcmp => "tcmp",
            Self::Mnewz => "mnewz",
            Self::Cvtrf => "cvtrf",
            Self::Cvtfr => "cvtfr",
            Self::Cvtws => "cvtws",
            Self::Cvtsw => "cvtsw",
            Self::Lsrw => "lsrw",
            Self::Lsrl => "lsrl",
            Self::Eclr => "eclr",
            Self::Newz => "newz",
            Self::Newaz => "newaz",
            Self::Raise => "raise",
            Self::Casel => "casel",
            Self::Mulx => "mulx",
            Self::Divx => "divx",
            Self::Cvtxx => "cvtxx",
            Self::Mulx0 => "mulx0",
            Self::Divx0 => "divx0",
            Self::Cvtxx0 => "cvtxx0",
            Self::Mulx1 => "mulx1",
            Self::Divx1 => "divx1",
            Self::Cvtxx1 => "cvtxx1",
            Self::Cvtfx => "cvtfx",
            Self::Cvtxf => "cvtxf",
            Self::Expw => "expw",
            Self::Expl => "expl",
            Self::Expf => "expf",
            Self::SelfMod => "self",
        }
    }

    /// Check if the destination operand is a branch target (instruction index)
    pub const fn is_branch(self) -> bool {
        matches!(
            self,
            Self::Call
                | Self::Jmp
                | Self::Spawn
                | Self::Beqw
                | Self::Bnew
                | Self::Bltw
                | Self::Blew
                | Self::Bgtw
                | Self::Bgew
                | Self::Beqb
                | Self::Bneb
                | Self::Bltb
                | Self::Bleb
                | Self::Bgtb
                | Self::Bgeb
                | Self::Beqf
                | Self::Bnef
                | Self::Bltf
                | Self::Blef
                | Self::Bgtf
                | Self::Bgef
                | Self::Beqc
                | Self::Bnec
                | Self::Bltc
                | Self::Blec
                | Self::Bgtc
                | Self::Bgec
                | Self::Beql
                | Self::Bnel
                | Self::Bltl
                | Self::Blel
                | Self::Bgtl
                | Self::Bgel
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single instruction with its three operand slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    /// Operation
    pub op: Opcode,
    /// Source operand
    pub src: Operand,
    /// Middle operand (never indirect)
    pub mid: Operand,
    /// Destination operand
    pub dst: Operand,
}

impl Instruction {
    /// Instruction with source, middle and destination operands
    pub const fn new(op: Opcode, src: Operand, mid: Operand, dst: Operand) -> Self {
        Self { op, src, mid, dst }
    }

    /// Instruction with source and destination, no middle operand
    pub const fn with_src_dst(op: Opcode, src: Operand, dst: Operand) -> Self {
        Self::new(op, src, Operand::None, dst)
    }

    /// Instruction with only a destination operand
    pub const fn with_dst(op: Opcode, dst: Operand) -> Self {
        Self::new(op, Operand::None, Operand::None, dst)
    }

    /// Instruction with no operands (`ret`, `exit`, ...)
    pub const fn bare(op: Opcode) -> Self {
        Self::new(op, Operand::None, Operand::None, Operand::None)
    }

    /// Packed address byte: `mid | src << 3 | dst`
    #[inline]
    pub const fn address_byte(&self) -> u8 {
        self.mid.mid_mode() | self.src.src_dst_mode() << 3 | self.dst.src_dst_mode()
    }

    /// Append the wire form of this instruction
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.op.to_byte());
        out.push(self.address_byte());
        self.mid.write_mid(out);
        self.src.write_src_dst(out);
        self.dst.write_src_dst(out);
    }

    /// Read one instruction
    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let op_offset = r.position();
        let byte = r.byte().context("opcode")?;
        let op = Opcode::from_byte(byte).ok_or(DecodeError::InvalidOpcode {
            byte,
            offset: op_offset,
        })?;

        let add_offset = r.position();
        let add = r.byte().context("address byte")?;
        let mid = Operand::read_mid(r, add).context("mid operand")?;
        let src = Operand::read_src_dst(r, (add >> 3) & AMASK, add_offset).context("src operand")?;
        let dst = Operand::read_src_dst(r, add & AMASK, add_offset).context("dst operand")?;

        Ok(Self { op, src, mid, dst })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op.name())?;
        let mut sep = " ";
        for operand in [&self.src, &self.mid, &self.dst] {
            if !operand.is_none() {
                write!(f, "{sep}{operand}")?;
                sep = ", ";
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{AFP, AIMM, AMP, AXINF, AXXX};
    use proptest::prelude::*;

    fn roundtrip(inst: Instruction) -> Instruction {
        let mut out = Vec::new();
        inst.encode(&mut out);
        assert_eq!(out[0], inst.op.to_byte());
        let mut r = Reader::new(&out);
        let decoded = Instruction::decode(&mut r).unwrap();
        assert!(r.is_empty(), "trailing bytes after {inst}");
        decoded
    }

    #[test]
    fn test_opcode_table() {
        assert_eq!(Opcode::all().count(), MAX_DIS);
        for (i, op) in Opcode::all().enumerate() {
            assert_eq!(usize::from(op.to_byte()), i);
            assert_eq!(Opcode::from_byte(i as u8), Some(op));
        }
        assert_eq!(Opcode::from_byte(175), None);
        assert_eq!(Opcode::from_byte(0xFF), None);
    }

    #[test]
    fn test_opcode_name() {
        assert_eq!(Opcode::Nop.name(), "nop");
        assert_eq!(Opcode::Addw.name(), "addw");
        assert_eq!(Opcode::Exit.to_byte(), 15);
        assert_eq!(Opcode::Movw.to_byte(), 45);
        assert_eq!(Opcode::SelfMod.name(), "self");
        assert_eq!(Opcode::Cvtxx1.to_string(), "cvtxx1");
    }

    #[test]
    fn test_is_branch() {
        assert!(Opcode::Jmp.is_branch());
        assert!(Opcode::Bgel.is_branch());
        assert!(!Opcode::Movw.is_branch());
        assert!(!Opcode::Ret.is_branch());
    }

    #[test]
    fn test_instruction_roundtrip() {
        let cases = [
            Instruction::bare(Opcode::Nop),
            Instruction::bare(Opcode::Ret),
            Instruction::bare(Opcode::Exit),
            Instruction::with_src_dst(Opcode::Movw, Operand::fp(64), Operand::fp(72)),
            Instruction::with_src_dst(Opcode::Movw, Operand::imm(42), Operand::fp(64)),
            Instruction::new(Opcode::Addw, Operand::fp(64), Operand::fp(72), Operand::fp(80)),
            Instruction::with_dst(Opcode::Jmp, Operand::imm(10)),
            Instruction::new(Opcode::Beqw, Operand::fp(64), Operand::fp(72), Operand::imm(5)),
            Instruction::with_src_dst(Opcode::Movp, Operand::mp(0), Operand::fp(64)),
            Instruction::with_src_dst(Opcode::Movw, Operand::fp_ind(64, 8), Operand::fp(72)),
            Instruction::with_src_dst(Opcode::Movw, Operand::fp(64), Operand::fp_ind(72, 8)),
            Instruction::with_src_dst(Opcode::Movw, Operand::mp_ind(8, 16), Operand::mp_ind(24, 4)),
            Instruction::with_src_dst(Opcode::Movw, Operand::fp(10_000), Operand::fp(20_000)),
            Instruction::with_src_dst(Opcode::Movw, Operand::imm(-1), Operand::fp(64)),
            Instruction::new(Opcode::Indx, Operand::mp(8), Operand::mp(16), Operand::fp(40)),
        ];

        for inst in cases {
            assert_eq!(roundtrip(inst), inst, "{inst}");
        }
    }

    #[test]
    fn test_encoded_bytes() {
        let mut out = Vec::new();
        Instruction::with_src_dst(Opcode::Movw, Operand::imm(42), Operand::fp(64)).encode(&mut out);
        // op, add = AIMM<<3 | AFP, $42, 64 (2-byte form)
        assert_eq!(out, [45, 0x11, 42, 0x80, 0x40]);

        let mut out = Vec::new();
        Instruction::with_src_dst(Opcode::Movw, Operand::fp_ind(4, 8), Operand::None)
            .encode(&mut out);
        assert_eq!(out, [45, 0x2B, 4, 8]);
    }

    #[test]
    fn test_address_byte() {
        let cases = [
            (
                Instruction::with_src_dst(Opcode::Movw, Operand::imm(42), Operand::fp(64)),
                AIMM << 3 | AFP,
            ),
            (
                Instruction::new(Opcode::Addw, Operand::fp(64), Operand::fp(72), Operand::fp(80)),
                AFP << 3 | AFP | AXINF,
            ),
            (
                Instruction::with_src_dst(Opcode::Movw, Operand::mp(0), Operand::fp(64)),
                AMP << 3 | AFP,
            ),
            (Instruction::bare(Opcode::Ret), AXXX << 3 | AXXX),
        ];
        for (inst, want) in cases {
            assert_eq!(inst.address_byte(), want, "{inst}");
        }
    }

    #[test]
    fn test_display() {
        let inst = Instruction::with_src_dst(Opcode::Movw, Operand::imm(42), Operand::fp(64));
        assert_eq!(inst.to_string(), "movw $42, 64(fp)");
        let inst =
            Instruction::new(Opcode::Addw, Operand::fp(64), Operand::imm(1), Operand::fp(64));
        assert_eq!(inst.to_string(), "addw 64(fp), $1, 64(fp)");
        assert_eq!(Instruction::with_dst(Opcode::Jmp, Operand::imm(3)).to_string(), "jmp $3");
        assert_eq!(Instruction::bare(Opcode::Ret).to_string(), "ret");
    }

    #[test]
    fn test_decode_errors() {
        let err = Instruction::decode(&mut Reader::new(&[200, 0x1B])).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidOpcode {
                byte: 200,
                offset: 0
            }
        ));

        // movw with AFP src but the operand is missing
        let err = Instruction::decode(&mut Reader::new(&[45, 0x0B])).unwrap_err();
        assert_eq!(err.path(), vec!["src operand"]);
        assert!(matches!(err.root(), DecodeError::UnexpectedEof { offset: 2, .. }));

        // src mode 6 (AIMM|AIND) has no wire form
        let err = Instruction::decode(&mut Reader::new(&[45, 0x33])).unwrap_err();
        assert!(matches!(
            err.root(),
            DecodeError::InvalidOperand { mode: 6, offset: 1 }
        ));
    }

    fn src_dst_operand() -> impl Strategy<Value = Operand> {
        prop_oneof![
            Just(Operand::None),
            any::<i16>().prop_map(|v| Operand::mp(v.into())),
            any::<i16>().prop_map(|v| Operand::fp(v.into())),
            any::<i32>().prop_map(|v| Operand::imm(v >> 3)),
            (any::<i16>(), any::<i16>()).prop_map(|(a, b)| Operand::mp_ind(a.into(), b.into())),
            (any::<i16>(), any::<i16>()).prop_map(|(a, b)| Operand::fp_ind(a.into(), b.into())),
        ]
    }

    fn mid_operand() -> impl Strategy<Value = Operand> {
        prop_oneof![
            Just(Operand::None),
            any::<i16>().prop_map(|v| Operand::mp(v.into())),
            any::<i16>().prop_map(|v| Operand::fp(v.into())),
            any::<i16>().prop_map(|v| Operand::imm(v.into())),
        ]
    }

    proptest! {
        #[test]
        fn prop_address_byte_recovers_modes(
            op in 0u8..MAX_DIS as u8,
            src in src_dst_operand(),
            mid in mid_operand(),
            dst in src_dst_operand(),
        ) {
            let inst = Instruction::new(Opcode::from_byte(op).unwrap(), src, mid, dst);
            let add = inst.address_byte();
            prop_assert_eq!((add >> 3) & AMASK, src.src_dst_mode());
            prop_assert_eq!(add & AMASK, dst.src_dst_mode());
            prop_assert_eq!(add & crate::operand::ARM, mid.mid_mode());
            prop_assert_eq!(roundtrip(inst), inst);
        }
    }
}
