//! Classweave Bytecode
//!
//! Reader, writer and typed views for JVM class files. Parsing and
//! re-serializing an untouched class reproduces the input byte for byte;
//! method bodies, stack maps and annotations are decoded on demand.

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod core;
pub mod disassembler;
pub mod error;

// Re-export commonly used types
pub use crate::core::{
    AccessFlags, Attribute, ClassFile, CodeAttribute, ConstantPool, Instruction, Member, Opcode,
};
pub use crate::disassembler::{Disassembler, DisassemblyFormat};
pub use crate::error::{BytecodeError, Result};

/// Magic number opening every class file
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Oldest major version accepted (JDK 1.1)
pub const MIN_SUPPORTED_MAJOR: u16 = 45;

/// Newest major version accepted (Java 25)
pub const MAX_SUPPORTED_MAJOR: u16 = 69;
