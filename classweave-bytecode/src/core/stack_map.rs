//! `StackMapTable` frames (JVMS 4.7.4)

use crate::core::io::{ByteReader, ByteWriter};
use crate::error::{BytecodeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    /// Constant pool index of a `Class`
    Object(u16),
    /// Offset of the `new` instruction that created the value
    Uninitialized(u16),
}

impl VerificationType {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        const CTX: &str = "verification type";
        Ok(match reader.u8(CTX)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(reader.u16(CTX)?),
            8 => VerificationType::Uninitialized(reader.u16(CTX)?),
            other => {
                return Err(BytecodeError::attribute(
                    "StackMapTable",
                    format!("unknown verification type tag {other}"),
                ));
            }
        })
    }

    fn encode(&self, writer: &mut ByteWriter) {
        match self {
            VerificationType::Top => writer.u8(0),
            VerificationType::Integer => writer.u8(1),
            VerificationType::Float => writer.u8(2),
            VerificationType::Double => writer.u8(3),
            VerificationType::Long => writer.u8(4),
            VerificationType::Null => writer.u8(5),
            VerificationType::UninitializedThis => writer.u8(6),
            VerificationType::Object(index) => writer.u8(7).u16(*index),
            VerificationType::Uninitialized(offset) => writer.u8(8).u16(*offset),
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Same,
    SameLocals1StackItem(VerificationType),
    /// Drops the last `k` locals (1..=3)
    Chop(u8),
    /// Adds 1..=3 locals
    Append(Vec<VerificationType>),
    Full {
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapFrame {
    pub offset_delta: u16,
    pub kind: FrameKind,
}

/// Decoded `StackMapTable` attribute body.
///
/// Encoding always picks the compact frame form when the delta allows it and
/// the `_extended` form otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackMapTable {
    pub frames: Vec<StackMapFrame>,
}

fn decode_types(reader: &mut ByteReader<'_>, count: usize) -> Result<Vec<VerificationType>> {
    (0..count).map(|_| VerificationType::decode(reader)).collect()
}

impl StackMapTable {
    pub fn decode(info: &[u8]) -> Result<Self> {
        const CTX: &str = "StackMapTable";
        let mut reader = ByteReader::new(info);
        let count = reader.u16(CTX)?;
        let mut frames = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let frame_type = reader.u8(CTX)?;
            let frame = match frame_type {
                0..=63 => StackMapFrame {
                    offset_delta: frame_type as u16,
                    kind: FrameKind::Same,
                },
                64..=127 => StackMapFrame {
                    offset_delta: (frame_type - 64) as u16,
                    kind: FrameKind::SameLocals1StackItem(VerificationType::decode(&mut reader)?),
                },
                247 => {
                    let offset_delta = reader.u16(CTX)?;
                    StackMapFrame {
                        offset_delta,
                        kind: FrameKind::SameLocals1StackItem(VerificationType::decode(&mut reader)?),
                    }
                }
                248..=250 => StackMapFrame {
                    offset_delta: reader.u16(CTX)?,
                    kind: FrameKind::Chop(251 - frame_type),
                },
                251 => StackMapFrame {
                    offset_delta: reader.u16(CTX)?,
                    kind: FrameKind::Same,
                },
                252..=254 => {
                    let offset_delta = reader.u16(CTX)?;
                    let locals = decode_types(&mut reader, (frame_type - 251) as usize)?;
                    StackMapFrame {
                        offset_delta,
                        kind: FrameKind::Append(locals),
                    }
                }
                255 => {
                    let offset_delta = reader.u16(CTX)?;
                    let nlocals = reader.u16(CTX)? as usize;
                    let locals = decode_types(&mut reader, nlocals)?;
                    let nstack = reader.u16(CTX)? as usize;
                    let stack = decode_types(&mut reader, nstack)?;
                    StackMapFrame {
                        offset_delta,
                        kind: FrameKind::Full { locals, stack },
                    }
                }
                reserved => {
                    return Err(BytecodeError::attribute(
                        CTX,
                        format!("reserved frame type {reserved}"),
                    ));
                }
            };
            frames.push(frame);
        }
        if !reader.is_empty() {
            return Err(BytecodeError::attribute(
                CTX,
                format!("{} trailing byte(s)", reader.remaining()),
            ));
        }
        Ok(Self { frames })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new();
        writer.count16(self.frames.len(), "stack map frames")?;
        for frame in &self.frames {
            let delta = frame.offset_delta;
            match &frame.kind {
                FrameKind::Same if delta <= 63 => {
                    writer.u8(delta as u8);
                }
                FrameKind::Same => {
                    writer.u8(251).u16(delta);
                }
                FrameKind::SameLocals1StackItem(item) => {
                    if delta <= 63 {
                        writer.u8(64 + delta as u8);
                    } else {
                        writer.u8(247).u16(delta);
                    }
                    item.encode(&mut writer);
                }
                FrameKind::Chop(k) => {
                    if !(1..=3).contains(k) {
                        return Err(BytecodeError::attribute(
                            "StackMapTable",
                            format!("chop of {k} locals"),
                        ));
                    }
                    writer.u8(251 - k).u16(delta);
                }
                FrameKind::Append(locals) => {
                    if !(1..=3).contains(&locals.len()) {
                        return Err(BytecodeError::attribute(
                            "StackMapTable",
                            format!("append of {} locals", locals.len()),
                        ));
                    }
                    writer.u8(251 + locals.len() as u8).u16(delta);
                    for local in locals {
                        local.encode(&mut writer);
                    }
                }
                FrameKind::Full { locals, stack } => {
                    writer.u8(255).u16(delta);
                    writer.count16(locals.len(), "frame locals")?;
                    for local in locals {
                        local.encode(&mut writer);
                    }
                    writer.count16(stack.len(), "frame stack items")?;
                    for item in stack {
                        item.encode(&mut writer);
                    }
                }
            }
        }
        Ok(writer.into_inner())
    }

    /// Absolute bytecode offset of every frame
    pub fn offsets(&self) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.frames.len());
        let mut previous: Option<u32> = None;
        for frame in &self.frames {
            let offset = match previous {
                None => frame.offset_delta as u32,
                Some(prev) => prev + frame.offset_delta as u32 + 1,
            };
            offsets.push(offset);
            previous = Some(offset);
        }
        offsets
    }

    /// Move every frame through `frame_offset` and every
    /// `Uninitialized(offset)` through `new_offset`, recomputing deltas.
    ///
    /// Both mappings must be monotonic; frames that would collapse onto the
    /// same offset are rejected.
    pub fn relocate<F, N>(&mut self, mut frame_offset: F, mut new_offset: N) -> Result<()>
    where
        F: FnMut(u32) -> Result<u32>,
        N: FnMut(u32) -> Result<u32>,
    {
        let old = self.offsets();
        let mut previous: Option<u32> = None;
        for (frame, old_offset) in self.frames.iter_mut().zip(old) {
            let offset = frame_offset(old_offset)?;
            let delta = match previous {
                None => offset,
                Some(prev) if offset > prev => offset - prev - 1,
                Some(prev) => {
                    return Err(BytecodeError::attribute(
                        "StackMapTable",
                        format!("frame at {offset} does not follow frame at {prev}"),
                    ));
                }
            };
            frame.offset_delta = u16::try_from(delta)
                .map_err(|_| BytecodeError::attribute("StackMapTable", "offset delta overflow"))?;
            previous = Some(offset);

            let mut remap = |ty: &mut VerificationType| -> Result<()> {
                if let VerificationType::Uninitialized(at) = ty {
                    let moved = new_offset(*at as u32)?;
                    *at = u16::try_from(moved).map_err(|_| {
                        BytecodeError::attribute("StackMapTable", "uninitialized offset overflow")
                    })?;
                }
                Ok(())
            };
            match &mut frame.kind {
                FrameKind::Same | FrameKind::Chop(_) => {}
                FrameKind::SameLocals1StackItem(item) => remap(item)?,
                FrameKind::Append(locals) => locals.iter_mut().try_for_each(&mut remap)?,
                FrameKind::Full { locals, stack } => {
                    locals.iter_mut().try_for_each(&mut remap)?;
                    stack.iter_mut().try_for_each(&mut remap)?;
                }
            }
        }
        Ok(())
    }
}
