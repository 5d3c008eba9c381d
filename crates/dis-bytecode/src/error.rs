//! Codec errors

use thiserror::Error;

/// Errors that can occur while decoding a module
///
/// Low-level failures are wrapped in [`DecodeError::Context`] by each layer
/// of the decoder, so the rendered message names the section and field that
/// was being read, e.g. `type desc 3: nmap: unexpected EOF at offset 97`.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Fewer bytes remain than the field requires
    #[error("unexpected EOF at offset {offset}")]
    UnexpectedEof {
        /// Cursor position when the read was attempted
        offset: usize,
        /// Number of bytes the field needed
        needed: usize,
    },

    /// Header magic is neither the plain nor the signed value
    #[error("bad magic: {0}")]
    InvalidMagic(i32),

    /// Data item header carries a kind tag outside the known set
    #[error("unknown data kind {kind} at offset {offset}")]
    UnknownDataKind {
        /// The high nibble of the item header
        kind: u8,
        /// Offset of the item header byte
        offset: usize,
    },

    /// A NUL-terminated text field runs off the end of the input
    #[error("unterminated string at offset {offset}")]
    UnterminatedString {
        /// Offset where the string starts
        offset: usize,
    },

    /// Text field is not valid UTF-8
    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 {
        /// Offset where the text starts
        offset: usize,
    },

    /// Address byte selects an addressing mode with no wire form
    #[error("invalid operand mode {mode:#x} at offset {offset}")]
    InvalidOperand {
        /// The 3-bit source or destination mode
        mode: u8,
        /// Offset of the address byte
        offset: usize,
    },

    /// Opcode byte outside the instruction set
    #[error("invalid opcode {byte} at offset {offset}")]
    InvalidOpcode {
        /// The raw opcode byte
        byte: u8,
        /// Offset of the opcode byte
        offset: usize,
    },

    /// A count field decoded to a negative value
    #[error("invalid count {count}")]
    InvalidCount {
        /// The decoded count
        count: i32,
    },

    /// IO error while reading the input
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A lower-level error annotated with the field or section being parsed
    #[error("{context}: {source}")]
    Context {
        /// Field or section label
        context: String,
        /// The wrapped error
        #[source]
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    /// Wrap this error with a field or section label
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with every context layer stripped
    pub fn root(&self) -> &DecodeError {
        let mut err = self;
        while let Self::Context { source, .. } = err {
            err = source;
        }
        err
    }

    /// Context labels from the outermost layer inwards
    pub fn path(&self) -> Vec<&str> {
        let mut labels = Vec::new();
        let mut err = self;
        while let Self::Context { context, source } = err {
            labels.push(context.as_str());
            err = source;
        }
        labels
    }
}

/// Errors that can occur while encoding a module
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The output sink rejected the write
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Attach context labels to decode results
pub trait ResultExt<T> {
    /// Label the error with a static field name
    fn context(self, context: &'static str) -> Result<T>;

    /// Label the error with a lazily built name (e.g. including an index)
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    #[inline]
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    #[inline]
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}

/// Result type for decode operations
pub type Result<T> = std::result::Result<T, DecodeError>;
