//! Module format
//!
//! Section order on the wire:
//!
//! ```text
//! magic [siglen signature]
//! runtime_flags stack_size isize dsize hsize lsize entry_pc entry_type
//! instruction[isize]
//! type_desc[hsize]
//! data_item* 0
//! name\0
//! link[lsize]
//! [ldt]          if HAS_LDT
//! [handlers]     if HAS_EXCEPT
//! [source_path\0]
//! ```

use std::io::{Read, Write};
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::data::{self, DataItem};
use crate::encoding::{Reader, write_cstr, write_operand, write_word};
use crate::error::{DecodeError, EncodeError, Result, ResultExt};
use crate::instruction::Instruction;
use crate::type_desc::{IBY2WD, TypeDesc};

/// Magic of an unsigned module
pub const XMAGIC: i32 = 819_248;

/// Magic of a signed module
pub const SMAGIC: i32 = 923_426;

/// Stack size given to modules built with [`Module::new`]
pub const DEFAULT_STACK_SIZE: i32 = 64 * 1024;

/// Frame slot of the return link
pub const REGLINK: usize = 0;
/// Frame slot of the caller's frame pointer
pub const REGFRAME: usize = 1;
/// Frame slot of the caller's module pointer
pub const REGMOD: usize = 2;
/// Frame slot of the frame's type
pub const REGTYP: usize = 3;
/// Frame slot of the return value pointer
pub const REGRET: usize = 4;
/// Number of reserved frame slots
pub const NREG: usize = 5;

/// Byte offset where locals start: the reserved slots plus three temporaries
pub const MAX_TEMP: usize = (NREG + 3) * IBY2WD;

/// Module format variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Magic {
    /// Plain module ([`XMAGIC`])
    #[default]
    Plain,
    /// Signed module ([`SMAGIC`]); the loader skips the signature block
    Signed {
        /// Raw signature block, preserved as read
        signature: Vec<u8>,
    },
}

impl Magic {
    /// Header value
    pub fn value(&self) -> i32 {
        match self {
            Self::Plain => XMAGIC,
            Self::Signed { .. } => SMAGIC,
        }
    }

    /// Check if this is a signed module
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed { .. })
    }
}

/// Runtime flags word from the module header
///
/// Bits outside the named constants are carried through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeFlags(pub i32);

impl RuntimeFlags {
    /// Always compile to native code
    pub const MUST_COMPILE: Self = Self(1 << 0);
    /// Never compile to native code
    pub const DONT_COMPILE: Self = Self(1 << 1);
    /// Share the module data between instances
    pub const SHARE_MP: Self = Self(1 << 2);
    /// Dynamically loaded module
    pub const DYN_MOD: Self = Self(1 << 3);
    /// Obsolete import table flag
    pub const HAS_LDT0: Self = Self(1 << 4);
    /// Handler table present
    pub const HAS_EXCEPT: Self = Self(1 << 5);
    /// Import table present
    pub const HAS_LDT: Self = Self(1 << 6);

    /// No flags set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bits
    #[inline]
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// Check if every bit of `other` is set
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for RuntimeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Exported function, or the `.mp` data anchor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Entry instruction (-1 for the data anchor)
    pub pc: i32,
    /// Frame type descriptor (-1 for the data anchor)
    pub desc_id: i32,
    /// Type signature hash
    pub sig: u32,
    /// Exported name, e.g. `init` or `Iobuf.read`
    pub name: String,
}

/// Function expected from an external module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Import {
    /// Type signature hash
    pub sig: u32,
    /// Function name
    pub name: String,
}

impl Import {
    /// Create an import entry
    pub fn new(sig: u32, name: impl Into<String>) -> Self {
        Self {
            sig,
            name: name.into(),
        }
    }
}

/// Named exception entry in a handler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Except {
    /// Exception name
    pub name: String,
    /// Handler instruction
    pub pc: i32,
}

/// Exception handler covering `pc1..pc2`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handler {
    /// Frame offset of the exception data
    pub eoffset: i32,
    /// First covered instruction
    pub pc1: i32,
    /// One past the last covered instruction
    pub pc2: i32,
    /// Type descriptor of the exception value (-1 if none)
    pub desc_id: i32,
    /// Exception scope depth
    pub ne: i32,
    /// Named exception entries
    pub etab: Vec<Except>,
    /// Wildcard (`*`) handler instruction (-1 if none)
    pub wild_pc: i32,
}

/// A Dis module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Format variant
    pub magic: Magic,
    /// Runtime flags; `HAS_LDT` and `HAS_EXCEPT` select optional sections
    pub runtime_flags: RuntimeFlags,
    /// Recommended stack size in bytes
    pub stack_size: i32,
    /// Code
    pub instructions: Vec<Instruction>,
    /// Type descriptors
    pub type_descs: Vec<TypeDesc>,
    /// Size of the module data segment, as declared by the producer
    pub data_size: i32,
    /// Data segment initialisation
    pub data: Vec<DataItem>,
    /// Entry instruction
    pub entry_pc: i32,
    /// Frame type of the entry function
    pub entry_type: i32,
    /// Exports
    pub links: Vec<Link>,
    /// Imports, one table per external module
    pub imports: Vec<Vec<Import>>,
    /// Exception handlers
    pub handlers: Vec<Handler>,
    /// Source file the module was compiled from (trailing metadata)
    pub source_path: Option<String>,
}

impl Module {
    /// Create an empty unsigned module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack_size: DEFAULT_STACK_SIZE,
            ..Self::default()
        }
    }

    /// Add an instruction, returns its pc
    pub fn add_inst(&mut self, inst: Instruction) -> i32 {
        let pc = self.instructions.len() as i32;
        self.instructions.push(inst);
        pc
    }

    /// Add a type descriptor, assigning and returning its id
    pub fn add_type_desc(&mut self, mut td: TypeDesc) -> i32 {
        let id = self.type_descs.len() as i32;
        td.id = id;
        self.type_descs.push(td);
        id
    }

    /// Add an export
    pub fn add_link(&mut self, link: Link) {
        self.links.push(link);
    }

    /// Add the import table for one external module, returns its index
    ///
    /// Sets [`RuntimeFlags::HAS_LDT`].
    pub fn add_import_module(&mut self, imports: Vec<Import>) -> usize {
        self.runtime_flags.insert(RuntimeFlags::HAS_LDT);
        self.imports.push(imports);
        self.imports.len() - 1
    }

    /// Add an exception handler
    ///
    /// Sets [`RuntimeFlags::HAS_EXCEPT`].
    pub fn add_handler(&mut self, handler: Handler) {
        self.runtime_flags.insert(RuntimeFlags::HAS_EXCEPT);
        self.handlers.push(handler);
    }

    /// Find an export by name
    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.name == name)
    }

    /// Get the entry instruction
    pub fn entry_instruction(&self) -> Option<&Instruction> {
        usize::try_from(self.entry_pc)
            .ok()
            .and_then(|pc| self.instructions.get(pc))
    }

    /// Serialize to the wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Write the wire format to `writer`
    pub fn encode<W: Write>(&self, mut writer: W) -> std::result::Result<(), EncodeError> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Parse a module from its wire format
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }

    /// Read a whole module from `reader`
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        decode(&bytes)
    }

    /// Render the module as pretty-printed JSON for inspection
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        write_operand(out, self.magic.value());
        if let Magic::Signed { signature } = &self.magic {
            write_operand(out, signature.len() as i32);
            out.extend_from_slice(signature);
        }
        write_operand(out, self.runtime_flags.bits());
        write_operand(out, self.stack_size);
        write_operand(out, self.instructions.len() as i32);
        write_operand(out, self.data_size);
        write_operand(out, self.type_descs.len() as i32);
        write_operand(out, self.links.len() as i32);
        write_operand(out, self.entry_pc);
        write_operand(out, self.entry_type);

        for inst in &self.instructions {
            inst.encode(out);
        }
        for td in &self.type_descs {
            td.encode(out);
        }
        data::encode_items(&self.data, out);
        write_cstr(out, &self.name);

        for link in &self.links {
            write_operand(out, link.pc);
            write_operand(out, link.desc_id);
            write_word(out, link.sig);
            write_cstr(out, &link.name);
        }

        if self.runtime_flags.contains(RuntimeFlags::HAS_LDT) {
            write_operand(out, self.imports.len() as i32);
            for table in &self.imports {
                write_operand(out, table.len() as i32);
                for imp in table {
                    write_word(out, imp.sig);
                    write_cstr(out, &imp.name);
                }
            }
            write_operand(out, 0);
        }

        if self.runtime_flags.contains(RuntimeFlags::HAS_EXCEPT) {
            write_operand(out, self.handlers.len() as i32);
            for h in &self.handlers {
                write_operand(out, h.eoffset);
                write_operand(out, h.pc1);
                write_operand(out, h.pc2);
                write_operand(out, h.desc_id);
                write_operand(out, h.etab.len() as i32 | h.ne << 16);
                for e in &h.etab {
                    write_cstr(out, &e.name);
                    write_operand(out, e.pc);
                }
                write_operand(out, h.wild_pc);
            }
            write_operand(out, 0);
        }

        if let Some(path) = &self.source_path {
            write_cstr(out, path);
        }
    }
}

/// Preallocation bound for a list whose length came from untrusted input
#[inline]
fn capacity(count: usize, r: &Reader<'_>) -> usize {
    count.min(r.remaining())
}

/// Parse a module from its wire format
pub fn decode(bytes: &[u8]) -> Result<Module> {
    let mut r = Reader::new(bytes);
    let r = &mut r;

    let magic = match r.operand().context("magic")? {
        XMAGIC => Magic::Plain,
        SMAGIC => {
            let siglen = r.count().context("siglen")?;
            let signature = r.bytes(siglen).context("signature")?;
            Magic::Signed { signature }
        }
        other => return Err(DecodeError::InvalidMagic(other).context("magic")),
    };

    let runtime_flags = RuntimeFlags(r.operand().context("runtime flags")?);
    let stack_size = r.operand().context("stack size")?;
    let isize = r.count().context("isize")?;
    let data_size = r.operand().context("dsize")?;
    let hsize = r.count().context("hsize")?;
    let lsize = r.count().context("lsize")?;
    let entry_pc = r.operand().context("entry pc")?;
    let entry_type = r.operand().context("entry type")?;

    #[cfg(feature = "codec_logging")]
    tracing::debug!(
        target: "dis::codec",
        signed = magic.is_signed(),
        flags = runtime_flags.bits(),
        isize,
        hsize,
        lsize,
        "module header"
    );

    let mut instructions = Vec::with_capacity(capacity(isize, r));
    for i in 0..isize {
        instructions.push(Instruction::decode(r).with_context(|| format!("instruction {i}"))?);
    }

    let mut type_descs = Vec::with_capacity(capacity(hsize, r));
    for i in 0..hsize {
        type_descs.push(TypeDesc::decode(r).with_context(|| format!("type desc {i}"))?);
    }

    let data = data::decode_items(r).context("data")?;
    let name = r.cstr().context("module name")?;

    let mut links = Vec::with_capacity(capacity(lsize, r));
    for i in 0..lsize {
        links.push(read_link(r).with_context(|| format!("link {i}"))?);
    }

    let imports = if runtime_flags.contains(RuntimeFlags::HAS_LDT) {
        read_ldt(r).context("ldt")?
    } else {
        Vec::new()
    };

    let handlers = if runtime_flags.contains(RuntimeFlags::HAS_EXCEPT) {
        read_handlers(r).context("handlers")?
    } else {
        Vec::new()
    };

    // Trailing source path is metadata the loader never reads. A malformed
    // tail is dropped rather than failing the module.
    let source_path = if r.is_empty() {
        None
    } else {
        match r.cstr() {
            Ok(path) => Some(path),
            Err(_err) => {
                #[cfg(feature = "codec_logging")]
                tracing::warn!(
                    target: "dis::codec",
                    module = %name,
                    error = %_err,
                    "ignoring malformed source path"
                );
                None
            }
        }
    };

    #[cfg(feature = "codec_logging")]
    tracing::debug!(
        target: "dis::codec",
        module = %name,
        data_items = data.len(),
        import_modules = imports.len(),
        handlers = handlers.len(),
        "module decoded"
    );

    Ok(Module {
        name,
        magic,
        runtime_flags,
        stack_size,
        instructions,
        type_descs,
        data_size,
        data,
        entry_pc,
        entry_type,
        links,
        imports,
        handlers,
        source_path,
    })
}

fn read_link(r: &mut Reader<'_>) -> Result<Link> {
    Ok(Link {
        pc: r.operand().context("pc")?,
        desc_id: r.operand().context("desc")?,
        sig: r.word().context("sig")?,
        name: r.cstr().context("name")?,
    })
}

fn read_ldt(r: &mut Reader<'_>) -> Result<Vec<Vec<Import>>> {
    let nl = r.count().context("module count")?;
    let mut ldt = Vec::with_capacity(capacity(nl, r));
    for i in 0..nl {
        let table = read_import_table(r).with_context(|| format!("module {i}"))?;
        ldt.push(table);
    }
    r.operand().context("terminator")?;
    Ok(ldt)
}

fn read_import_table(r: &mut Reader<'_>) -> Result<Vec<Import>> {
    let n = r.count().context("import count")?;
    let mut table = Vec::with_capacity(capacity(n, r));
    for j in 0..n {
        let sig = r.word().with_context(|| format!("import {j}: sig"))?;
        let name = r.cstr().with_context(|| format!("import {j}: name"))?;
        table.push(Import { sig, name });
    }
    Ok(table)
}

fn read_handlers(r: &mut Reader<'_>) -> Result<Vec<Handler>> {
    let nh = r.count().context("handler count")?;
    let mut handlers = Vec::with_capacity(capacity(nh, r));
    for i in 0..nh {
        handlers.push(read_handler(r).with_context(|| format!("handler {i}"))?);
    }
    r.operand().context("terminator")?;
    Ok(handlers)
}

fn read_handler(r: &mut Reader<'_>) -> Result<Handler> {
    let eoffset = r.operand().context("eoffset")?;
    let pc1 = r.operand().context("pc1")?;
    let pc2 = r.operand().context("pc2")?;
    let desc_id = r.operand().context("desc")?;
    let packed = r.operand().context("nlab")?;
    let ne = packed >> 16;
    let nlab = (packed & 0xFFFF) as usize;

    let mut etab = Vec::with_capacity(capacity(nlab, r));
    for j in 0..nlab {
        let name = r.cstr().with_context(|| format!("etab {j}: name"))?;
        let pc = r.operand().with_context(|| format!("etab {j}: pc"))?;
        etab.push(Except { name, pc });
    }
    let wild_pc = r.operand().context("wildcard pc")?;

    Ok(Handler {
        eoffset,
        pc1,
        pc2,
        desc_id,
        ne,
        etab,
        wild_pc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Opcode;
    use crate::operand::Operand;

    fn minimal(name: &str) -> Module {
        let mut m = Module::new(name);
        m.add_type_desc(TypeDesc::new(0, 8));
        m.add_type_desc(TypeDesc::new(0, MAX_TEMP as i32));
        m.data_size = 8;
        m.add_inst(Instruction::bare(Opcode::Exit));
        m.entry_type = 1;
        m
    }

    #[test]
    fn test_builder_assigns_ids() {
        let mut m = Module::new("Ids");
        assert_eq!(m.add_type_desc(TypeDesc::new(42, 8)), 0);
        assert_eq!(m.add_type_desc(TypeDesc::new(42, 16)), 1);
        assert_eq!(m.type_descs[1].id, 1);
        assert_eq!(m.add_inst(Instruction::bare(Opcode::Nop)), 0);
        assert_eq!(m.add_inst(Instruction::bare(Opcode::Ret)), 1);
        assert_eq!(m.stack_size, DEFAULT_STACK_SIZE);
        assert_eq!(m.magic, Magic::Plain);
    }

    #[test]
    fn test_minimal_module_bytes() {
        let m = minimal("M");
        let bytes = m.to_bytes();
        let expected: &[u8] = &[
            0xC0, 0x0C, 0x80, 0x30, // XMAGIC
            0x00, // runtime flags
            0xC0, 0x01, 0x00, 0x00, // stack size 65536
            0x01, // isize
            0x08, // dsize
            0x02, // hsize
            0x00, // lsize
            0x00, // entry pc
            0x01, // entry type
            15, 0x1B, // exit
            0x00, 0x08, 0x01, 0x00, // type desc 0
            0x01, 0x80, 0x40, 0x01, 0x00, // type desc 1
            0x00, // end of data
            b'M', 0x00, // name
        ];
        assert_eq!(bytes, expected);
        assert_eq!(decode(&bytes).unwrap(), m);
    }

    #[test]
    fn test_runtime_flags() {
        let mut f = RuntimeFlags::HAS_LDT | RuntimeFlags::SHARE_MP;
        assert!(f.contains(RuntimeFlags::HAS_LDT));
        assert!(!f.contains(RuntimeFlags::HAS_EXCEPT));
        f.remove(RuntimeFlags::HAS_LDT);
        assert_eq!(f.bits(), 1 << 2);
        f.insert(RuntimeFlags(1 << 12));
        assert_eq!(f.bits(), 1 << 2 | 1 << 12);
    }

    #[test]
    fn test_builder_sets_section_flags() {
        let mut m = minimal("Flags");
        m.add_import_module(vec![Import::new(1, "f")]);
        assert!(m.runtime_flags.contains(RuntimeFlags::HAS_LDT));
        m.add_handler(Handler {
            eoffset: 0,
            pc1: 0,
            pc2: 1,
            desc_id: -1,
            ne: 0,
            etab: Vec::new(),
            wild_pc: -1,
        });
        assert!(m.runtime_flags.contains(RuntimeFlags::HAS_EXCEPT));
        assert_eq!(decode(&m.to_bytes()).unwrap(), m);
    }

    #[test]
    fn test_sections_skipped_without_flags() {
        let mut m = minimal("NoFlags");
        m.imports.push(vec![Import::new(1, "f")]);
        let decoded = decode(&m.to_bytes()).unwrap();
        assert!(decoded.imports.is_empty());
    }

    #[test]
    fn test_lookup_helpers() {
        let mut m = minimal("Look");
        m.add_link(Link {
            pc: 0,
            desc_id: 1,
            sig: 7,
            name: "init".into(),
        });
        assert_eq!(m.link("init").map(|l| l.sig), Some(7));
        assert!(m.link("main").is_none());
        assert_eq!(m.entry_instruction().map(|i| i.op), Some(Opcode::Exit));
        m.entry_pc = -1;
        assert!(m.entry_instruction().is_none());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = Vec::new();
        write_operand(&mut bytes, 1234);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err.root(), DecodeError::InvalidMagic(1234)));
        assert_eq!(err.to_string(), "magic: bad magic: 1234");
    }

    #[test]
    fn test_instruction_error_context() {
        let mut m = minimal("Ctx");
        m.instructions[0] =
            Instruction::with_src_dst(Opcode::Movw, Operand::fp(64), Operand::fp(72));
        let bytes = m.to_bytes();
        // 15-byte header, then op, address byte, 2-byte src; cut inside dst
        let err = decode(&bytes[..20]).unwrap_err();
        assert_eq!(err.path(), vec!["instruction 0", "dst operand"]);
    }

    #[test]
    fn test_json_dump() {
        let m = minimal("Json");
        let json = m.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "Json");
        assert_eq!(value["instructions"][0]["op"], "Exit");
        let back: Module = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
