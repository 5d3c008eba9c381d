//! # Dis Bytecode
//!
//! Reader and writer for Dis virtual machine module files (`.dis`).
//!
//! A module is a header followed by code, type descriptors, the data
//! segment initialiser, exports, and the optional import and handler
//! tables. Decoding followed by encoding reproduces the input bytes exactly.
//!
//! ```ignore
//! let bytes = std::fs::read("hello.dis")?;
//! let module = dis_bytecode::decode(&bytes)?;
//! for inst in &module.instructions {
//!     println!("{inst}");
//! }
//! assert_eq!(dis_bytecode::encode(&module), bytes);
//! ```
//!
//! ## Features
//!
//! - `codec_logging`: emit `tracing` events under the `dis::codec` target
//!   while decoding

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod data;
pub mod encoding;
pub mod error;
pub mod instruction;
pub mod module;
pub mod operand;
pub mod type_desc;

pub use data::{DataItem, DataKind};
pub use encoding::Reader;
pub use error::{DecodeError, EncodeError, Result, ResultExt};
pub use instruction::{Instruction, Opcode};
pub use module::{
    Except, Handler, Import, Link, Magic, Module, RuntimeFlags, SMAGIC, XMAGIC,
};
pub use operand::Operand;
pub use type_desc::{IBY2WD, TypeDesc};

/// Parse a module from its wire format
pub fn decode(bytes: &[u8]) -> Result<Module> {
    module::decode(bytes)
}

/// Serialize a module to its wire format
pub fn encode(module: &Module) -> Vec<u8> {
    module.to_bytes()
}
