//! Error types for class file operations

use thiserror::Error;

/// Main error type for class file operations.
///
/// Every variant describes a payload that does not conform to the class file
/// container format, or a mutation that would push the container past one of
/// its hard limits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("Bad magic number: {0:#010x}")]
    BadMagic(u32),

    #[error("Unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Truncated {context} at offset {offset:#x}: needed {needed} more byte(s)")]
    Truncated {
        context: &'static str,
        offset: usize,
        needed: usize,
    },

    #[error("Trailing {0} byte(s) after class structure")]
    TrailingBytes(usize),

    #[error("Invalid constant pool tag {tag} at index {index}")]
    InvalidConstantTag { tag: u8, index: u16 },

    #[error("Invalid constant index {index}: expected {expected}")]
    InvalidConstantIndex { index: u16, expected: &'static str },

    #[error("Invalid modified UTF-8 at byte {0}")]
    InvalidUtf8(usize),

    #[error("Constant pool overflow: more than 65535 slots")]
    ConstantPoolOverflow,

    #[error("Invalid opcode: {opcode:#04x} at offset {offset:#x}")]
    InvalidOpcode { opcode: u8, offset: usize },

    #[error("Invalid instruction format at offset {offset:#x}: {reason}")]
    InvalidInstruction { offset: usize, reason: String },

    #[error("Malformed {attribute} attribute: {reason}")]
    MalformedAttribute {
        attribute: &'static str,
        reason: String,
    },

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Code too large: {0} bytes")]
    CodeTooLarge(usize),

    #[error("Too many {what}: {count}")]
    TooMany { what: &'static str, count: usize },
}

/// Convenient Result type
pub type Result<T> = std::result::Result<T, BytecodeError>;

impl BytecodeError {
    pub(crate) fn attribute(attribute: &'static str, reason: impl Into<String>) -> Self {
        BytecodeError::MalformedAttribute {
            attribute,
            reason: reason.into(),
        }
    }
}
