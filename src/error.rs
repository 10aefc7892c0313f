use thiserror::Error;

/// Result type for class model operations
pub type ClassFileResult<T> = std::result::Result<T, ClassFileError>;

/// Format errors raised while reading or querying the class model.
///
/// These are never coerced into default values: a reference to the wrong kind
/// of constant pool entry is reported with the index and both kinds involved.
#[derive(Error, Debug)]
pub enum ClassFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed class file: {0}")]
    Read(#[from] binrw::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("constant pool index {index} is out of range (pool size {size})")]
    PoolIndexOutOfRange { index: u16, size: usize },

    #[error("constant pool index {index}: expected {expected}, found {found}")]
    PoolKindMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },

    #[error("attribute {name}: declared length {declared}, parsed {parsed}")]
    AttributeLength {
        name: String,
        declared: usize,
        parsed: usize,
    },

    #[error("attribute {name} is malformed")]
    MalformedAttribute { name: String },
}

impl ClassFileError {
    pub fn kind_mismatch(index: u16, expected: &'static str, found: &'static str) -> Self {
        Self::PoolKindMismatch {
            index,
            expected,
            found,
        }
    }
}

/// Bytecode decoding failures. Every variant carries the offending offset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("offset {offset} is outside the code array (length {code_length})")]
    OffsetOutOfRange { offset: u32, code_length: u32 },

    #[error("instruction at {offset} runs past the end of the code array")]
    Truncated { offset: u32 },

    #[error("unknown opcode {opcode:#04x} at {offset}")]
    UnknownOpcode { offset: u32, opcode: u8 },

    #[error("invalid switch bounds at {offset}: low {low}, high {high}")]
    InvalidSwitch { offset: u32, low: i32, high: i32 },

    #[error("opcode {opcode:#04x} cannot follow wide at {offset}")]
    InvalidWide { offset: u32, opcode: u8 },

    #[error("branch at {offset} targets {target}, outside the code array")]
    BadBranchTarget { offset: u32, target: i64 },
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Failures that abort reconstruction of a single method or class.
///
/// Method-level errors are caught by the decompiler and turned into a raw
/// listing on the method; they never abort the rest of the class.
#[derive(Error, Debug)]
pub enum DecompileError {
    #[error(transparent)]
    Format(#[from] ClassFileError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("operand stack underflow at offset {offset}")]
    StackUnderflow { offset: u32 },

    #[error("category mismatch at offset {offset}: {op} on a {found} value")]
    CategoryMismatch {
        offset: u32,
        op: &'static str,
        found: &'static str,
    },

    #[error("malformed descriptor {descriptor:?} at offset {offset}")]
    BadDescriptor { offset: u32, descriptor: String },

    #[error("inconsistent stack height entering block {block}: {expected} vs {found}")]
    StackHeight { block: u32, expected: usize, found: usize },

    #[error("handler at {handler_pc} is outside the code array")]
    MalformedHandler { handler_pc: u32 },

    #[error("method has no code")]
    NoCode,

    #[error("class {0} not found")]
    ClassNotFound(String),
}

pub type DecompileResult<T> = std::result::Result<T, DecompileError>;
