//! The `Code` attribute and the debug tables nested inside it

use crate::core::classfile::Attribute;
use crate::core::instructions::{Instruction, decode_instructions};
use crate::core::io::{ByteReader, ByteWriter};
use crate::error::{BytecodeError, Result};

/// Largest method body the format allows
pub const MAX_CODE_LENGTH: usize = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero for `finally`/catch-all handlers
    pub catch_type: u16,
}

/// Decoded `Code` attribute body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self {
            max_stack,
            max_locals,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn decode(info: &[u8]) -> Result<Self> {
        const CTX: &str = "Code attribute";
        let mut reader = ByteReader::new(info);
        let max_stack = reader.u16(CTX)?;
        let max_locals = reader.u16(CTX)?;
        let code = reader.blob32(CTX)?;
        if code.is_empty() || code.len() > MAX_CODE_LENGTH {
            return Err(BytecodeError::attribute(
                "Code",
                format!("code length {} out of range", code.len()),
            ));
        }

        let entries = reader.u16(CTX)?;
        let mut exception_table = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            exception_table.push(ExceptionEntry {
                start_pc: reader.u16(CTX)?,
                end_pc: reader.u16(CTX)?,
                handler_pc: reader.u16(CTX)?,
                catch_type: reader.u16(CTX)?,
            });
        }

        let attributes = Attribute::decode_list(&mut reader)?;
        if !reader.is_empty() {
            return Err(BytecodeError::attribute(
                "Code",
                format!("{} trailing byte(s)", reader.remaining()),
            ));
        }

        Ok(Self {
            max_stack,
            max_locals,
            code: code.to_vec(),
            exception_table,
            attributes,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.code.len() > MAX_CODE_LENGTH {
            return Err(BytecodeError::CodeTooLarge(self.code.len()));
        }
        let mut writer = ByteWriter::with_capacity(self.code.len() + 32);
        writer.u16(self.max_stack).u16(self.max_locals);
        writer.blob32(&self.code, "code bytes")?;
        writer.count16(self.exception_table.len(), "exception table entries")?;
        for entry in &self.exception_table {
            writer
                .u16(entry.start_pc)
                .u16(entry.end_pc)
                .u16(entry.handler_pc)
                .u16(entry.catch_type);
        }
        Attribute::encode_list(&self.attributes, &mut writer)?;
        Ok(writer.into_inner())
    }

    pub fn instructions(&self) -> Result<Vec<Instruction>> {
        decode_instructions(&self.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line: u16,
}

/// `LineNumberTable` attribute body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineNumberTable(pub Vec<LineNumber>);

impl LineNumberTable {
    pub fn decode(info: &[u8]) -> Result<Self> {
        const CTX: &str = "LineNumberTable";
        let mut reader = ByteReader::new(info);
        let count = reader.u16(CTX)?;
        let mut lines = Vec::with_capacity(count as usize);
        for _ in 0..count {
            lines.push(LineNumber {
                start_pc: reader.u16(CTX)?,
                line: reader.u16(CTX)?,
            });
        }
        expect_consumed(&reader, CTX)?;
        Ok(Self(lines))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::with_capacity(2 + 4 * self.0.len());
        writer.count16(self.0.len(), "line numbers")?;
        for entry in &self.0 {
            writer.u16(entry.start_pc).u16(entry.line);
        }
        Ok(writer.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    /// Descriptor for `LocalVariableTable`, signature for `LocalVariableTypeTable`
    pub type_index: u16,
    pub index: u16,
}

/// `LocalVariableTable` and `LocalVariableTypeTable` share one layout
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalVariableTable(pub Vec<LocalVariable>);

impl LocalVariableTable {
    pub fn decode(info: &[u8]) -> Result<Self> {
        const CTX: &str = "LocalVariableTable";
        let mut reader = ByteReader::new(info);
        let count = reader.u16(CTX)?;
        let mut vars = Vec::with_capacity(count as usize);
        for _ in 0..count {
            vars.push(LocalVariable {
                start_pc: reader.u16(CTX)?,
                length: reader.u16(CTX)?,
                name_index: reader.u16(CTX)?,
                type_index: reader.u16(CTX)?,
                index: reader.u16(CTX)?,
            });
        }
        expect_consumed(&reader, CTX)?;
        Ok(Self(vars))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::with_capacity(2 + 10 * self.0.len());
        writer.count16(self.0.len(), "local variables")?;
        for var in &self.0 {
            writer
                .u16(var.start_pc)
                .u16(var.length)
                .u16(var.name_index)
                .u16(var.type_index)
                .u16(var.index);
        }
        Ok(writer.into_inner())
    }
}

fn expect_consumed(reader: &ByteReader<'_>, attribute: &'static str) -> Result<()> {
    if reader.is_empty() {
        Ok(())
    } else {
        Err(BytecodeError::attribute(
            attribute,
            format!("{} trailing byte(s)", reader.remaining()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instructions::assemble;
    use crate::core::opcodes::Opcode;

    #[test]
    fn test_code_attribute_round_trip() {
        let mut body = vec![
            Instruction::simple(Opcode::ALOAD_1),
            Instruction::simple(Opcode::ARETURN),
        ];
        let mut code = CodeAttribute::new(1, 2, assemble(&mut body).unwrap());
        code.exception_table.push(ExceptionEntry {
            start_pc: 0,
            end_pc: 1,
            handler_pc: 1,
            catch_type: 0,
        });
        code.attributes.push(Attribute::new(
            9,
            LineNumberTable(vec![LineNumber {
                start_pc: 0,
                line: 12,
            }])
            .encode()
            .unwrap(),
        ));

        let encoded = code.encode().unwrap();
        let decoded = CodeAttribute::decode(&encoded).unwrap();
        assert_eq!(decoded, code);
        assert_eq!(decoded.instructions().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_code_is_malformed() {
        let code = CodeAttribute::new(0, 0, Vec::new());
        let encoded = code.encode().unwrap();
        assert!(matches!(
            CodeAttribute::decode(&encoded),
            Err(BytecodeError::MalformedAttribute { attribute: "Code", .. })
        ));
    }

    #[test]
    fn test_local_variable_table_trailing_bytes() {
        let mut bytes = LocalVariableTable::default().encode().unwrap();
        bytes.push(0);
        assert!(LocalVariableTable::decode(&bytes).is_err());
    }
}
