//! Splicing instruction sequences into an existing method body
//!
//! Every original instruction at old offset `o` becomes the block
//!
//! ```text
//! [entry insertions][guard insertions][original instruction]
//! ```
//!
//! Branches, handlers and stack map frames that pointed at `o` are moved to
//! the start of the guard insertions, so guards run on every path into the
//! instruction while entry insertions run once. `Uninitialized` verification
//! types name the `new` instruction itself and follow it past all insertions.
//! Operand widths never change, which lets a single pass fix the layout
//! (including switch padding) before anything is encoded.

use classweave_bytecode::core::classfile::attr;
use classweave_bytecode::core::code::{CodeAttribute, LineNumberTable, LocalVariableTable, MAX_CODE_LENGTH};
use classweave_bytecode::core::constants::ConstantPool;
use classweave_bytecode::core::instructions::{Instruction, Operand};
use classweave_bytecode::core::io::ByteWriter;
use classweave_bytecode::core::opcodes::OperandShape;
use classweave_bytecode::core::stack_map::StackMapTable;
use classweave_bytecode::BytecodeError;

use crate::error::InstrumentError;
use crate::policy::Sequence;

/// Code attributes whose offsets this module knows how to move
const RELOCATABLE: [&str; 4] = [
    attr::LINE_NUMBER_TABLE,
    attr::LOCAL_VARIABLE_TABLE,
    attr::LOCAL_VARIABLE_TYPE_TABLE,
    attr::STACK_MAP_TABLE,
];

/// Code to splice in before the instruction at `offset`
#[derive(Debug, Clone)]
pub struct Insertion {
    pub offset: u32,
    /// Redirect jumps aimed at `offset` to the inserted code. Without it the
    /// code runs only when control falls into `offset` from above (or enters
    /// the method there).
    pub retarget: bool,
    pub code: Sequence,
}

/// Old offset to new offset, for every instruction boundary plus the end
struct Layout {
    target: Vec<Option<u32>>,
    instruction: Vec<Option<u32>>,
}

impl Layout {
    fn target(&self, old: i64) -> Option<u32> {
        usize::try_from(old)
            .ok()
            .and_then(|o| self.target.get(o).copied().flatten())
    }

    fn instruction(&self, old: i64) -> Option<u32> {
        usize::try_from(old)
            .ok()
            .and_then(|o| self.instruction.get(o).copied().flatten())
    }
}

fn frame_error(reason: String) -> BytecodeError {
    BytecodeError::MalformedAttribute {
        attribute: "StackMapTable",
        reason,
    }
}

/// Apply `insertions` to `code`, relocating everything that refers to code
/// offsets, and grow `max_stack` by `stack_depth`.
///
/// Fails without touching `code` when the result cannot be expressed: an
/// attribute with unknown offsets, a 16-bit branch that no longer fits, code
/// past the 64 KiB limit or an operand stack that would overflow.
pub fn splice(
    code: &mut CodeAttribute,
    pool: &ConstantPool,
    insertions: &[Insertion],
    stack_depth: u16,
    method: &str,
) -> Result<(), InstrumentError> {
    for attribute in &code.attributes {
        if !RELOCATABLE.iter().any(|name| attribute.is_named(pool, name)) {
            let name = attribute.name(pool)?;
            return Err(InstrumentError::unsupported(
                method,
                format!("cannot relocate offsets in the {name} attribute"),
            ));
        }
    }

    let max_stack = code.max_stack.checked_add(stack_depth).ok_or_else(|| {
        InstrumentError::unsupported(method, "operand stack would exceed 65535 slots")
    })?;

    let instructions = code.instructions()?;
    let code_len = code.code.len();

    let mut at_offset: Vec<Option<usize>> = vec![None; code_len + 1];
    for (i, inst) in instructions.iter().enumerate() {
        at_offset[inst.offset as usize] = Some(i);
    }

    let mut entry: Vec<Vec<&Instruction>> = vec![Vec::new(); instructions.len()];
    let mut guard: Vec<Vec<&Instruction>> = vec![Vec::new(); instructions.len()];
    for insertion in insertions {
        if let Some(bad) = insertion
            .code
            .iter()
            .find(|i| i.opcode.is_branch() || i.opcode.is_return())
        {
            return Err(InstrumentError::unsupported(
                method,
                format!("injected {} would alter control flow", bad.opcode.mnemonic()),
            ));
        }
        let index = at_offset
            .get(insertion.offset as usize)
            .copied()
            .flatten()
            .ok_or_else(|| {
                InstrumentError::unsupported(
                    method,
                    format!("offset {} is not an instruction boundary", insertion.offset),
                )
            })?;
        let slot = if insertion.retarget {
            &mut guard[index]
        } else {
            &mut entry[index]
        };
        slot.extend(insertion.code.iter());
    }

    // Layout
    let mut layout = Layout {
        target: vec![None; code_len + 1],
        instruction: vec![None; code_len + 1],
    };
    let mut pos: usize = 0;
    for (i, inst) in instructions.iter().enumerate() {
        for inserted in &entry[i] {
            pos += inserted.encoded_len(pos as u32);
        }
        layout.target[inst.offset as usize] = Some(pos as u32);
        for inserted in &guard[i] {
            pos += inserted.encoded_len(pos as u32);
        }
        layout.instruction[inst.offset as usize] = Some(pos as u32);
        pos += inst.encoded_len(pos as u32);
    }
    if pos > MAX_CODE_LENGTH {
        return Err(InstrumentError::unsupported(
            method,
            format!("code would grow to {pos} bytes"),
        ));
    }
    layout.target[code_len] = Some(pos as u32);
    layout.instruction[code_len] = Some(pos as u32);

    // Encode
    let mut writer = ByteWriter::with_capacity(pos);
    for (i, inst) in instructions.iter().enumerate() {
        for inserted in entry[i].iter().chain(guard[i].iter()) {
            inserted.encode(writer.len() as u32, &mut writer)?;
        }
        let at = writer.len() as u32;
        let moved = retarget(inst, at, &layout, method)?;
        moved.encode(at, &mut writer)?;
    }
    let new_code = writer.into_inner();

    let mut exception_table = code.exception_table.clone();
    for handler in &mut exception_table {
        handler.start_pc = move_pc(&layout, handler.start_pc, method)?;
        handler.end_pc = move_pc(&layout, handler.end_pc, method)?;
        handler.handler_pc = move_pc(&layout, handler.handler_pc, method)?;
    }

    let mut attributes = code.attributes.clone();
    for attribute in &mut attributes {
        if attribute.is_named(pool, attr::LINE_NUMBER_TABLE) {
            let mut table = LineNumberTable::decode(&attribute.info)?;
            for line in &mut table.0 {
                line.start_pc = move_pc(&layout, line.start_pc, method)?;
            }
            attribute.info = table.encode()?;
        } else if attribute.is_named(pool, attr::STACK_MAP_TABLE) {
            let mut table = StackMapTable::decode(&attribute.info)?;
            table.relocate(
                |old| {
                    layout
                        .target(old as i64)
                        .ok_or_else(|| frame_error(format!("frame at {old} is not on an instruction")))
                },
                |old| {
                    layout
                        .instruction(old as i64)
                        .ok_or_else(|| frame_error(format!("uninitialized value from {old} has no new")))
                },
            )?;
            attribute.info = table.encode()?;
        } else {
            // LocalVariableTable or LocalVariableTypeTable
            let mut table = LocalVariableTable::decode(&attribute.info)?;
            for var in &mut table.0 {
                let end = var.start_pc as u32 + var.length as u32;
                let end = u16::try_from(end).map_err(|_| {
                    InstrumentError::unsupported(method, format!("local variable range ends at {end}"))
                })?;
                let start = move_pc(&layout, var.start_pc, method)?;
                let end = move_pc(&layout, end, method)?;
                var.start_pc = start;
                var.length = end - start;
            }
            attribute.info = table.encode()?;
        }
    }

    code.code = new_code;
    code.max_stack = max_stack;
    code.exception_table = exception_table;
    code.attributes = attributes;
    Ok(())
}

fn move_pc(layout: &Layout, old: u16, method: &str) -> Result<u16, InstrumentError> {
    layout
        .target(old as i64)
        .map(|new| new as u16)
        .ok_or_else(|| {
            InstrumentError::unsupported(method, format!("offset {old} is not an instruction boundary"))
        })
}

/// Copy of `inst` with every jump re-aimed for its new position `at`
fn retarget(inst: &Instruction, at: u32, layout: &Layout, method: &str) -> Result<Instruction, InstrumentError> {
    let relative = |rel: i32| -> Result<i32, InstrumentError> {
        let old_target = inst.offset as i64 + rel as i64;
        let new_target = layout.target(old_target).ok_or_else(|| {
            InstrumentError::unsupported(
                method,
                format!("jump at {} lands inside an instruction", inst.offset),
            )
        })?;
        Ok((new_target as i64 - at as i64) as i32)
    };

    let mut moved = inst.clone();
    moved.offset = at;
    match &mut moved.operand {
        Operand::Branch(rel) => {
            let updated = relative(*rel)?;
            if inst.opcode.shape() == OperandShape::Branch && i16::try_from(updated).is_err() {
                return Err(InstrumentError::unsupported(
                    method,
                    format!(
                        "{} at {} no longer fits a 16-bit offset",
                        inst.opcode.mnemonic().to_ascii_lowercase(),
                        inst.offset
                    ),
                ));
            }
            *rel = updated;
        }
        Operand::TableSwitch {
            default, targets, ..
        } => {
            *default = relative(*default)?;
            for target in targets.iter_mut() {
                *target = relative(*target)?;
            }
        }
        Operand::LookupSwitch { default, pairs } => {
            *default = relative(*default)?;
            for (_, target) in pairs.iter_mut() {
                *target = relative(*target)?;
            }
        }
        Operand::None | Operand::Bytes(_) => {}
    }
    Ok(moved)
}
