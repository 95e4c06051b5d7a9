//! Class file disassembler
//!
//! Provides two output formats for inspecting class files:
//! - Compact: one instruction per line, mnemonic and operands only
//! - Verbose: header, constant pool, members and annotated instructions
//!
//! ## Example
//!
//! ```ignore
//! use classweave_bytecode::{ClassFile, Disassembler};
//!
//! let class = ClassFile::parse(&bytes)?;
//! let listing = Disassembler::new().show_constant_pool(false).disassemble(&class)?;
//! println!("{listing}");
//! ```

use std::fmt::Write as _;

use crate::core::classfile::{ClassFile, Member};
use crate::core::code::CodeAttribute;
use crate::core::constants::{Constant, ConstantPool, decode_modified_utf8};
use crate::core::instructions::{Instruction, Operand};
use crate::core::opcodes::{Opcode, OperandShape};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisassemblyFormat {
    /// `aload_1`, `invokestatic #12`
    Compact,

    /// Offsets plus resolved constant comments
    /// "0003: invokestatic #12  ; a/B.check:(Ljava/lang/Object;)V"
    Verbose,
}

#[derive(Debug, Clone)]
pub struct DisassemblerConfig {
    pub format: DisassemblyFormat,
    pub show_offsets: bool,
    pub show_constant_pool: bool,
    pub show_comments: bool,
}

impl Default for DisassemblerConfig {
    fn default() -> Self {
        Self {
            format: DisassemblyFormat::Verbose,
            show_offsets: true,
            show_constant_pool: true,
            show_comments: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Disassembler {
    config: DisassemblerConfig,
}

impl Disassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(format: DisassemblyFormat) -> Self {
        Self {
            config: DisassemblerConfig {
                format,
                ..Default::default()
            },
        }
    }

    pub fn show_offsets(mut self, show: bool) -> Self {
        self.config.show_offsets = show;
        self
    }

    pub fn show_constant_pool(mut self, show: bool) -> Self {
        self.config.show_constant_pool = show;
        self
    }

    pub fn show_comments(mut self, show: bool) -> Self {
        self.config.show_comments = show;
        self
    }

    pub fn disassemble(&self, class: &ClassFile) -> Result<String> {
        match self.config.format {
            DisassemblyFormat::Compact => {
                let mut output = String::new();
                for method in &class.methods {
                    if let Some(code) = method.code(&class.constant_pool)? {
                        output.push_str(&self.disassemble_code(&code, &class.constant_pool)?);
                    }
                }
                Ok(output)
            }
            DisassemblyFormat::Verbose => self.format_verbose(class),
        }
    }

    /// Listing of a single method body
    pub fn disassemble_code(&self, code: &CodeAttribute, pool: &ConstantPool) -> Result<String> {
        let mut output = String::new();
        for inst in code.instructions()? {
            self.write_instruction(&mut output, &inst, pool);
        }
        Ok(output)
    }

    fn format_verbose(&self, class: &ClassFile) -> Result<String> {
        let pool = &class.constant_pool;
        let mut output = String::new();

        let _ = writeln!(output, "class {}", class.name()?);
        let _ = writeln!(
            output,
            "  version: {}.{}, flags: {:#06x}",
            class.major_version,
            class.minor_version,
            class.access_flags.bits()
        );
        if class.super_class != 0 {
            let _ = writeln!(output, "  extends: {}", pool.class_name(class.super_class)?);
        }
        output.push('\n');

        if self.config.show_constant_pool {
            output.push_str("Constant pool:\n");
            for (index, constant) in pool.iter() {
                let _ = writeln!(output, "  #{index:<4} {}", describe_constant(constant));
            }
            output.push('\n');
        }

        for field in &class.fields {
            let _ = writeln!(output, "field {}", member_signature(field, pool)?);
        }
        if !class.fields.is_empty() {
            output.push('\n');
        }

        for method in &class.methods {
            let _ = writeln!(output, "method {}", member_signature(method, pool)?);
            match method.code(pool)? {
                Some(code) => {
                    let _ = writeln!(
                        output,
                        "  stack={}, locals={}, exception handlers={}",
                        code.max_stack,
                        code.max_locals,
                        code.exception_table.len()
                    );
                    output.push_str(&self.disassemble_code(&code, pool)?);
                }
                None => output.push_str("  <no code>\n"),
            }
            output.push('\n');
        }

        Ok(output)
    }

    fn write_instruction(&self, output: &mut String, inst: &Instruction, pool: &ConstantPool) {
        let verbose = self.config.format == DisassemblyFormat::Verbose;
        if verbose && self.config.show_offsets {
            let _ = write!(output, "  {:04}: ", inst.offset);
        } else {
            output.push_str("  ");
        }

        output.push_str(&inst.opcode.mnemonic().to_ascii_lowercase());
        output.push_str(&format_operand(inst));

        if verbose && self.config.show_comments {
            if let Some(comment) = instruction_comment(inst, pool) {
                let _ = write!(output, "  ; {comment}");
            }
        }

        output.push('\n');
    }
}

fn member_signature(member: &Member, pool: &ConstantPool) -> Result<String> {
    Ok(format!(
        "{}{} [flags {:#06x}]",
        member.name(pool)?,
        member.descriptor(pool)?,
        member.access_flags.bits()
    ))
}

fn format_operand(inst: &Instruction) -> String {
    match &inst.operand {
        Operand::None => String::new(),
        Operand::Branch(rel) => format!(" {}", inst.offset as i64 + *rel as i64),
        Operand::TableSwitch { low, high, .. } => format!(" {low}..{high}"),
        Operand::LookupSwitch { pairs, .. } => format!(" {} pairs", pairs.len()),
        Operand::Bytes(bytes) => match inst.constant_index() {
            Some(index) => format!(" #{index}"),
            None => match inst.opcode.shape() {
                OperandShape::Byte => format!(" {}", bytes[0] as i8),
                OperandShape::Local => format!(" {}", bytes[0]),
                OperandShape::Short => format!(" {}", i16::from_be_bytes([bytes[0], bytes[1]])),
                _ => format!(" {bytes:02x?}"),
            },
        },
    }
}

/// Readable comment for instructions that reference the constant pool
fn instruction_comment(inst: &Instruction, pool: &ConstantPool) -> Option<String> {
    let index = inst.constant_index()?;
    match inst.opcode {
        Opcode::GETFIELD
        | Opcode::PUTFIELD
        | Opcode::GETSTATIC
        | Opcode::PUTSTATIC
        | Opcode::INVOKEVIRTUAL
        | Opcode::INVOKESPECIAL
        | Opcode::INVOKESTATIC
        | Opcode::INVOKEINTERFACE => pool.member_ref(index).ok().map(|m| m.to_string()),
        Opcode::NEW | Opcode::CHECKCAST | Opcode::INSTANCEOF | Opcode::ANEWARRAY => {
            pool.class_name(index).ok()
        }
        Opcode::LDC | Opcode::LDC_W => match pool.string(index) {
            Ok(text) => Some(format!("{text:?}")),
            Err(_) => pool.get(index).map(describe_constant),
        },
        _ => pool.get(index).map(describe_constant),
    }
}

fn describe_constant(constant: &Constant) -> String {
    match constant {
        Constant::Utf8(bytes) => match decode_modified_utf8(bytes) {
            Ok(text) => format!("Utf8 {text:?}"),
            Err(_) => "Utf8 <invalid>".to_string(),
        },
        Constant::Integer(v) => format!("Integer {v}"),
        Constant::Float(bits) => format!("Float {}", f32::from_bits(*bits)),
        Constant::Long(v) => format!("Long {v}"),
        Constant::Double(bits) => format!("Double {}", f64::from_bits(*bits)),
        Constant::Class { name } => format!("Class #{name}"),
        Constant::String { value } => format!("String #{value}"),
        Constant::FieldRef {
            class,
            name_and_type,
        } => format!("Fieldref #{class}.#{name_and_type}"),
        Constant::MethodRef {
            class,
            name_and_type,
        } => format!("Methodref #{class}.#{name_and_type}"),
        Constant::InterfaceMethodRef {
            class,
            name_and_type,
        } => format!("InterfaceMethodref #{class}.#{name_and_type}"),
        Constant::NameAndType { name, descriptor } => format!("NameAndType #{name}:#{descriptor}"),
        Constant::MethodHandle { kind, reference } => format!("MethodHandle {kind}:#{reference}"),
        Constant::MethodType { descriptor } => format!("MethodType #{descriptor}"),
        Constant::Dynamic {
            bootstrap,
            name_and_type,
        } => format!("Dynamic {bootstrap}:#{name_and_type}"),
        Constant::InvokeDynamic {
            bootstrap,
            name_and_type,
        } => format!("InvokeDynamic {bootstrap}:#{name_and_type}"),
        Constant::Module { name } => format!("Module #{name}"),
        Constant::Package { name } => format!("Package #{name}"),
        Constant::Unusable => "<unusable>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classfile::{AccessFlags, Attribute, attr};
    use crate::core::instructions::assemble;

    fn create_test_class() -> ClassFile {
        let mut class = ClassFile::new("demo/Greeter", Some("java/lang/Object"), 52).unwrap();
        let greet = class
            .constant_pool
            .intern_method_ref("demo/Greeter", "greet", "()Ljava/lang/String;")
            .unwrap();
        let code_name = class.constant_pool.intern_utf8(attr::CODE).unwrap();
        let mut body = vec![
            Instruction::simple(Opcode::ALOAD_0),
            Instruction::constant(Opcode::INVOKEVIRTUAL, greet),
            Instruction::simple(Opcode::ARETURN),
        ];
        let code = CodeAttribute::new(1, 1, assemble(&mut body).unwrap());
        class
            .add_method(AccessFlags::PUBLIC, "hello", "()Ljava/lang/String;")
            .unwrap()
            .attributes
            .push(Attribute::new(code_name, code.encode().unwrap()));
        class
    }

    #[test]
    fn test_compact_format() {
        let class = create_test_class();
        let output = Disassembler::with_format(DisassemblyFormat::Compact)
            .disassemble(&class)
            .unwrap();

        assert!(output.contains("aload_0"));
        assert!(output.contains("invokevirtual #"));
        assert!(output.contains("areturn"));
        assert!(!output.contains("0000:")); // No offsets in compact
        assert!(!output.contains("  ; "));
    }

    #[test]
    fn test_verbose_format() {
        let class = create_test_class();
        let output = Disassembler::new().disassemble(&class).unwrap();

        assert!(output.contains("class demo/Greeter"));
        assert!(output.contains("Constant pool:"));
        assert!(output.contains("method hello()Ljava/lang/String;"));
        assert!(output.contains("0001: invokevirtual"));
        assert!(output.contains("; demo/Greeter.greet:()Ljava/lang/String;"));
    }

    #[test]
    fn test_without_constant_pool_or_comments() {
        let class = create_test_class();
        let output = Disassembler::new()
            .show_constant_pool(false)
            .show_comments(false)
            .show_offsets(false)
            .disassemble(&class)
            .unwrap();

        assert!(!output.contains("Constant pool:"));
        assert!(!output.contains("  ; "));
        assert!(!output.contains("0001:"));
    }
}
