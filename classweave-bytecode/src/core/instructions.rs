//! Instruction decoding and encoding for JVM method bodies
//!
//! Instructions are variable width. Branch operands are kept relative, exactly
//! as encoded; switch padding is not stored and is recomputed from the offset
//! an instruction is encoded at.

use crate::core::io::{ByteReader, ByteWriter};
use crate::core::opcodes::{Opcode, OperandShape};
use crate::error::{BytecodeError, Result};
use smallvec::SmallVec;
use std::fmt;

/// Operand payload of one instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    None,

    /// Fixed-width operand bytes, kept verbatim. For `wide` this starts with
    /// the widened opcode byte.
    Bytes(SmallVec<[u8; 4]>),

    /// Relative branch offset (16- or 32-bit depending on the opcode)
    Branch(i32),

    TableSwitch {
        default: i32,
        low: i32,
        high: i32,
        targets: Vec<i32>,
    },

    LookupSwitch {
        default: i32,
        pairs: Vec<(i32, i32)>,
    },
}

/// One decoded instruction together with the offset it was read from
#[derive(Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: u32,
    pub opcode: Opcode,
    pub operand: Operand,
}

/// Bytes of alignment padding a switch at `offset` carries
fn switch_padding(offset: u32) -> usize {
    (3 - (offset as usize % 4)) % 4
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Self {
            offset: 0,
            opcode,
            operand,
        }
    }

    pub fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, Operand::None)
    }

    /// Instruction whose operand is a two-byte constant pool index
    pub fn constant(opcode: Opcode, index: u16) -> Self {
        Self::new(opcode, Operand::Bytes(SmallVec::from_slice(&index.to_be_bytes())))
    }

    pub fn branch(opcode: Opcode, relative: i32) -> Self {
        Self::new(opcode, Operand::Branch(relative))
    }

    /// Shortest instruction loading reference local `slot`
    pub fn load_reference(slot: u16) -> Self {
        match slot {
            0 => Self::simple(Opcode::ALOAD_0),
            1 => Self::simple(Opcode::ALOAD_1),
            2 => Self::simple(Opcode::ALOAD_2),
            3 => Self::simple(Opcode::ALOAD_3),
            4..=255 => Self::new(Opcode::ALOAD, Operand::Bytes(SmallVec::from_slice(&[slot as u8]))),
            _ => {
                let [hi, lo] = slot.to_be_bytes();
                Self::new(
                    Opcode::WIDE,
                    Operand::Bytes(SmallVec::from_slice(&[Opcode::ALOAD as u8, hi, lo])),
                )
            }
        }
    }

    /// Constant pool index carried by this instruction, if any
    pub fn constant_index(&self) -> Option<u16> {
        if !self.opcode.references_constant() {
            return None;
        }
        match &self.operand {
            Operand::Bytes(bytes) if self.opcode.shape() == OperandShape::ConstantByte => {
                bytes.first().map(|b| *b as u16)
            }
            Operand::Bytes(bytes) if bytes.len() >= 2 => {
                Some(u16::from_be_bytes([bytes[0], bytes[1]]))
            }
            _ => None,
        }
    }

    /// Absolute targets of a branch or switch, in operand order
    /// (default first for switches)
    pub fn branch_targets(&self) -> Vec<i64> {
        let base = self.offset as i64;
        match &self.operand {
            Operand::Branch(rel) => vec![base + *rel as i64],
            Operand::TableSwitch {
                default, targets, ..
            } => std::iter::once(default)
                .chain(targets.iter())
                .map(|rel| base + *rel as i64)
                .collect(),
            Operand::LookupSwitch { default, pairs } => std::iter::once(default)
                .chain(pairs.iter().map(|(_, rel)| rel))
                .map(|rel| base + *rel as i64)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Encoded size in bytes if this instruction were placed at `offset`
    pub fn encoded_len(&self, offset: u32) -> usize {
        1 + match &self.operand {
            Operand::None => 0,
            Operand::Bytes(bytes) => bytes.len(),
            Operand::Branch(_) => match self.opcode.shape() {
                OperandShape::BranchWide => 4,
                _ => 2,
            },
            Operand::TableSwitch { targets, .. } => switch_padding(offset) + 12 + 4 * targets.len(),
            Operand::LookupSwitch { pairs, .. } => switch_padding(offset) + 8 + 8 * pairs.len(),
        }
    }

    /// Encode at `offset`; 16-bit branch operands that do not fit are an error
    pub fn encode(&self, offset: u32, writer: &mut ByteWriter) -> Result<()> {
        writer.u8(self.opcode as u8);
        match &self.operand {
            Operand::None => {}
            Operand::Bytes(bytes) => {
                writer.bytes(bytes);
            }
            Operand::Branch(rel) => match self.opcode.shape() {
                OperandShape::BranchWide => {
                    writer.i32(*rel);
                }
                _ => {
                    let short = i16::try_from(*rel).map_err(|_| BytecodeError::InvalidInstruction {
                        offset: offset as usize,
                        reason: format!("branch offset {rel} does not fit 16 bits"),
                    })?;
                    writer.i16(short);
                }
            },
            Operand::TableSwitch {
                default,
                low,
                high,
                targets,
            } => {
                for _ in 0..switch_padding(offset) {
                    writer.u8(0);
                }
                writer.i32(*default).i32(*low).i32(*high);
                for target in targets {
                    writer.i32(*target);
                }
            }
            Operand::LookupSwitch { default, pairs } => {
                for _ in 0..switch_padding(offset) {
                    writer.u8(0);
                }
                writer.i32(*default);
                writer.i32(pairs.len() as i32);
                for (key, target) in pairs {
                    writer.i32(*key).i32(*target);
                }
            }
        }
        Ok(())
    }

    fn decode(reader: &mut ByteReader<'_>, code_len: usize) -> Result<Self> {
        const CTX: &str = "instruction";
        let offset = reader.position();
        let byte = reader.u8(CTX)?;
        let opcode = Opcode::from_byte(byte).ok_or(BytecodeError::InvalidOpcode {
            opcode: byte,
            offset,
        })?;
        let invalid = |reason: String| BytecodeError::InvalidInstruction { offset, reason };

        let operand = match opcode.shape() {
            OperandShape::None => Operand::None,
            OperandShape::Branch => Operand::Branch(reader.i16(CTX)? as i32),
            OperandShape::BranchWide => Operand::Branch(reader.i32(CTX)?),
            OperandShape::TableSwitch => {
                reader.skip(switch_padding(offset as u32), CTX)?;
                let default = reader.i32(CTX)?;
                let low = reader.i32(CTX)?;
                let high = reader.i32(CTX)?;
                if high < low {
                    return Err(invalid(format!("tableswitch range {low}..{high} is empty")));
                }
                let count = (high as i64 - low as i64 + 1) as usize;
                if count > code_len / 4 {
                    return Err(invalid(format!("tableswitch with {count} targets")));
                }
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    targets.push(reader.i32(CTX)?);
                }
                Operand::TableSwitch {
                    default,
                    low,
                    high,
                    targets,
                }
            }
            OperandShape::LookupSwitch => {
                reader.skip(switch_padding(offset as u32), CTX)?;
                let default = reader.i32(CTX)?;
                let npairs = reader.i32(CTX)?;
                if npairs < 0 || npairs as usize > code_len / 8 {
                    return Err(invalid(format!("lookupswitch with {npairs} pairs")));
                }
                let mut pairs = Vec::with_capacity(npairs as usize);
                for _ in 0..npairs {
                    pairs.push((reader.i32(CTX)?, reader.i32(CTX)?));
                }
                Operand::LookupSwitch { default, pairs }
            }
            OperandShape::Wide => {
                let inner_byte = reader.u8(CTX)?;
                let inner = Opcode::from_byte(inner_byte)
                    .filter(|op| op.is_widenable())
                    .ok_or_else(|| invalid(format!("{inner_byte:#04x} cannot follow wide")))?;
                let len = if inner == Opcode::IINC { 4 } else { 2 };
                let mut bytes = SmallVec::new();
                bytes.push(inner_byte);
                bytes.extend_from_slice(reader.take(len, CTX)?);
                Operand::Bytes(bytes)
            }
            shape => {
                // Every remaining shape has a fixed width.
                let len = shape.fixed_len().unwrap_or(0);
                Operand::Bytes(SmallVec::from_slice(reader.take(len, CTX)?))
            }
        };

        Ok(Self {
            offset: offset as u32,
            opcode,
            operand,
        })
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}: {}", self.offset, self.opcode.mnemonic().to_ascii_lowercase())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Bytes(bytes) => write!(f, " {bytes:02x?}"),
            Operand::Branch(rel) => write!(f, " {:+} (-> {})", rel, self.offset as i64 + *rel as i64),
            Operand::TableSwitch { low, high, .. } => write!(f, " [{low}..={high}]"),
            Operand::LookupSwitch { pairs, .. } => write!(f, " [{} pairs]", pairs.len()),
        }
    }
}

/// Decode a complete instruction stream
pub fn decode_instructions(code: &[u8]) -> Result<Vec<Instruction>> {
    let mut reader = ByteReader::new(code);
    let mut instructions = Vec::new();
    while !reader.is_empty() {
        instructions.push(Instruction::decode(&mut reader, code.len())?);
    }
    Ok(instructions)
}

/// Lay instructions out back to back starting at offset 0, updating each
/// instruction's `offset`, and return the encoded stream
pub fn assemble(instructions: &mut [Instruction]) -> Result<Vec<u8>> {
    let mut writer = ByteWriter::new();
    for instruction in instructions.iter_mut() {
        let offset = u32::try_from(writer.len()).map_err(|_| BytecodeError::CodeTooLarge(writer.len()))?;
        instruction.offset = offset;
        instruction.encode(offset, &mut writer)?;
    }
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_switch_padding_follows_offset() {
        let switch = Instruction::new(
            Opcode::TABLESWITCH,
            Operand::TableSwitch {
                default: 20,
                low: 0,
                high: 1,
                targets: vec![16, 18],
            },
        );
        // opcode at 0 -> 3 bytes of padding, at 3 -> none
        assert_eq!(switch.encoded_len(0), 1 + 3 + 12 + 8);
        assert_eq!(switch.encoded_len(3), 1 + 12 + 8);

        let mut at_one = vec![Instruction::simple(Opcode::NOP), switch];
        let bytes = assemble(&mut at_one).unwrap();
        let decoded = decode_instructions(&bytes).unwrap();
        assert_eq!(decoded[1].offset, 1);
        assert_eq!(decoded[1].operand, at_one[1].operand);
    }

    #[test]
    fn test_wide_and_load_reference() {
        assert_eq!(Instruction::load_reference(2).opcode, Opcode::ALOAD_2);
        assert_eq!(Instruction::load_reference(9).encoded_len(0), 2);

        let wide = Instruction::load_reference(300);
        let mut stream = vec![wide, Instruction::simple(Opcode::ARETURN)];
        let bytes = assemble(&mut stream).unwrap();
        assert_eq!(bytes, vec![0xc4, 0x19, 0x01, 0x2c, 0xb0]);
        let decoded = decode_instructions(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].offset, 4);
    }

    #[test]
    fn test_branch_targets_are_absolute() {
        let mut stream = vec![
            Instruction::simple(Opcode::ALOAD_0),
            Instruction::branch(Opcode::IFNULL, 4),
            Instruction::simple(Opcode::ARETURN),
            Instruction::simple(Opcode::ACONST_NULL),
            Instruction::simple(Opcode::ARETURN),
        ];
        let bytes = assemble(&mut stream).unwrap();
        let decoded = decode_instructions(&bytes).unwrap();
        assert_eq!(decoded[1].branch_targets(), vec![5]);
        assert_eq!(decoded[3].offset, 5);
    }

    #[test]
    fn test_short_branch_overflow_is_rejected() {
        let far = Instruction::branch(Opcode::GOTO, 40_000);
        let mut writer = ByteWriter::new();
        assert!(far.encode(0, &mut writer).is_err());

        let wide = Instruction::branch(Opcode::GOTO_W, 40_000);
        assert!(wide.encode(0, &mut writer).is_ok());
    }

    #[test]
    fn test_decode_rejects_bad_streams() {
        assert!(matches!(
            decode_instructions(&[0xcb]),
            Err(BytecodeError::InvalidOpcode { opcode: 0xcb, offset: 0 })
        ));
        // getfield with a single operand byte
        assert!(matches!(
            decode_instructions(&[0xb4, 0x00]),
            Err(BytecodeError::Truncated { .. })
        ));
        // wide cannot prefix nop
        assert!(matches!(
            decode_instructions(&[0xc4, 0x00, 0x00, 0x00]),
            Err(BytecodeError::InvalidInstruction { .. })
        ));
    }

    #[test]
    fn test_constant_index() {
        let ldc = Instruction::new(Opcode::LDC, Operand::Bytes(SmallVec::from_slice(&[7])));
        assert_eq!(ldc.constant_index(), Some(7));
        let invoke = Instruction::constant(Opcode::INVOKESTATIC, 0x0102);
        assert_eq!(invoke.constant_index(), Some(0x0102));
        assert_eq!(Instruction::simple(Opcode::DUP).constant_index(), None);
    }
}
