//! Constant pool implementation

use ahash::AHashMap;
use std::fmt;

use crate::core::io::{ByteReader, ByteWriter};
use crate::error::{BytecodeError, Result};

/// Constant pool tags (JVMS 4.4)
pub mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// One constant pool slot.
///
/// Floating point values are kept as raw bits so that every entry is `Eq` and
/// `Hash` and re-encodes to the exact bytes it was read from. `Utf8` keeps the
/// raw modified UTF-8 payload for the same reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Slot 0 and the second slot of a `Long`/`Double`
    Unusable,
    Utf8(Box<[u8]>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class { name: u16 },
    String { value: u16 },
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType { descriptor: u16 },
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module { name: u16 },
    Package { name: u16 },
}

impl Constant {
    /// Build a `Utf8` entry from ordinary text
    pub fn utf8(text: &str) -> Self {
        Constant::Utf8(encode_modified_utf8(text).into_boxed_slice())
    }

    /// Number of pool slots this entry occupies
    pub fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    pub fn tag(&self) -> Option<u8> {
        Some(match self {
            Constant::Unusable => return None,
            Constant::Utf8(_) => tag::UTF8,
            Constant::Integer(_) => tag::INTEGER,
            Constant::Float(_) => tag::FLOAT,
            Constant::Long(_) => tag::LONG,
            Constant::Double(_) => tag::DOUBLE,
            Constant::Class { .. } => tag::CLASS,
            Constant::String { .. } => tag::STRING,
            Constant::FieldRef { .. } => tag::FIELD_REF,
            Constant::MethodRef { .. } => tag::METHOD_REF,
            Constant::InterfaceMethodRef { .. } => tag::INTERFACE_METHOD_REF,
            Constant::NameAndType { .. } => tag::NAME_AND_TYPE,
            Constant::MethodHandle { .. } => tag::METHOD_HANDLE,
            Constant::MethodType { .. } => tag::METHOD_TYPE,
            Constant::Dynamic { .. } => tag::DYNAMIC,
            Constant::InvokeDynamic { .. } => tag::INVOKE_DYNAMIC,
            Constant::Module { .. } => tag::MODULE,
            Constant::Package { .. } => tag::PACKAGE,
        })
    }

    fn decode(reader: &mut ByteReader<'_>, index: u16) -> Result<Self> {
        const CTX: &str = "constant pool entry";
        let tag = reader.u8(CTX)?;
        let constant = match tag {
            tag::UTF8 => {
                let len = reader.u16(CTX)? as usize;
                let bytes = reader.take(len, CTX)?;
                // Validate eagerly so later lookups cannot fail on encoding.
                decode_modified_utf8(bytes)?;
                Constant::Utf8(bytes.into())
            }
            tag::INTEGER => Constant::Integer(reader.i32(CTX)?),
            tag::FLOAT => Constant::Float(reader.u32(CTX)?),
            tag::LONG => {
                let hi = reader.u32(CTX)? as u64;
                let lo = reader.u32(CTX)? as u64;
                Constant::Long(((hi << 32) | lo) as i64)
            }
            tag::DOUBLE => {
                let hi = reader.u32(CTX)? as u64;
                let lo = reader.u32(CTX)? as u64;
                Constant::Double((hi << 32) | lo)
            }
            tag::CLASS => Constant::Class {
                name: reader.u16(CTX)?,
            },
            tag::STRING => Constant::String {
                value: reader.u16(CTX)?,
            },
            tag::FIELD_REF | tag::METHOD_REF | tag::INTERFACE_METHOD_REF => {
                let class = reader.u16(CTX)?;
                let name_and_type = reader.u16(CTX)?;
                match tag {
                    tag::FIELD_REF => Constant::FieldRef {
                        class,
                        name_and_type,
                    },
                    tag::METHOD_REF => Constant::MethodRef {
                        class,
                        name_and_type,
                    },
                    _ => Constant::InterfaceMethodRef {
                        class,
                        name_and_type,
                    },
                }
            }
            tag::NAME_AND_TYPE => Constant::NameAndType {
                name: reader.u16(CTX)?,
                descriptor: reader.u16(CTX)?,
            },
            tag::METHOD_HANDLE => Constant::MethodHandle {
                kind: reader.u8(CTX)?,
                reference: reader.u16(CTX)?,
            },
            tag::METHOD_TYPE => Constant::MethodType {
                descriptor: reader.u16(CTX)?,
            },
            tag::DYNAMIC => Constant::Dynamic {
                bootstrap: reader.u16(CTX)?,
                name_and_type: reader.u16(CTX)?,
            },
            tag::INVOKE_DYNAMIC => Constant::InvokeDynamic {
                bootstrap: reader.u16(CTX)?,
                name_and_type: reader.u16(CTX)?,
            },
            tag::MODULE => Constant::Module {
                name: reader.u16(CTX)?,
            },
            tag::PACKAGE => Constant::Package {
                name: reader.u16(CTX)?,
            },
            other => return Err(BytecodeError::InvalidConstantTag { tag: other, index }),
        };
        Ok(constant)
    }

    fn encode(&self, writer: &mut ByteWriter) {
        let Some(tag) = self.tag() else {
            return;
        };
        writer.u8(tag);
        match self {
            Constant::Unusable => {}
            Constant::Utf8(bytes) => {
                // Lengths are bounded when the entry is created.
                writer.u16(bytes.len() as u16).bytes(bytes);
            }
            Constant::Integer(v) => {
                writer.i32(*v);
            }
            Constant::Float(bits) => {
                writer.u32(*bits);
            }
            Constant::Long(v) => {
                let v = *v as u64;
                writer.u32((v >> 32) as u32).u32(v as u32);
            }
            Constant::Double(bits) => {
                writer.u32((bits >> 32) as u32).u32(*bits as u32);
            }
            Constant::Class { name }
            | Constant::Module { name }
            | Constant::Package { name } => {
                writer.u16(*name);
            }
            Constant::String { value } => {
                writer.u16(*value);
            }
            Constant::MethodType { descriptor } => {
                writer.u16(*descriptor);
            }
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                writer.u16(*class).u16(*name_and_type);
            }
            Constant::NameAndType { name, descriptor } => {
                writer.u16(*name).u16(*descriptor);
            }
            Constant::MethodHandle { kind, reference } => {
                writer.u8(*kind).u16(*reference);
            }
            Constant::Dynamic {
                bootstrap,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                writer.u16(*bootstrap).u16(*name_and_type);
            }
        }
    }
}

/// A resolved field or method reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.name, self.descriptor)
    }
}

/// The constant pool of one class file.
///
/// Entries are stored in document order; slot 0 and the slot after every
/// `Long`/`Double` hold [`Constant::Unusable`]. A reverse index maps each
/// entry to its first occurrence so that interning reuses existing slots and
/// appends only when nothing matches, which keeps rewrites deterministic.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: AHashMap<Constant, u16>,
}

impl ConstantPool {
    /// Largest `constant_pool_count` the format can express
    pub const MAX_COUNT: usize = u16::MAX as usize;

    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
            index: AHashMap::new(),
        }
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        let count = reader.u16("constant pool count")?;
        if count == 0 {
            return Err(BytecodeError::InvalidConstantIndex {
                index: 0,
                expected: "non-zero constant pool count",
            });
        }

        let mut pool = Self::new();
        pool.entries.reserve(count as usize);
        let mut index = 1u16;
        while index < count {
            let constant = Constant::decode(reader, index)?;
            let width = constant.width() as u16;
            if index as u32 + width as u32 > count as u32 {
                return Err(BytecodeError::InvalidConstantIndex {
                    index,
                    expected: "two-slot constant inside the pool",
                });
            }
            pool.index.entry(constant.clone()).or_insert(index);
            pool.entries.push(constant);
            if width == 2 {
                pool.entries.push(Constant::Unusable);
            }
            index += width;
        }

        pool.validate_references()?;
        Ok(pool)
    }

    pub(crate) fn encode(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.count16(self.entries.len(), "constant pool entries")?;
        for constant in &self.entries {
            constant.encode(writer);
        }
        Ok(())
    }

    /// Value written as `constant_pool_count`
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => None,
            Some(constant) => Some(constant),
        }
    }

    /// Iterate usable entries with their indices
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    /// Index of the first entry equal to `constant`
    pub fn find(&self, constant: &Constant) -> Option<u16> {
        self.index.get(constant).copied()
    }

    /// Return the index of `constant`, appending it if no equal entry exists
    pub fn intern(&mut self, constant: Constant) -> Result<u16> {
        if let Constant::Utf8(bytes) = &constant {
            if bytes.len() > u16::MAX as usize {
                return Err(BytecodeError::TooMany {
                    what: "bytes in a Utf8 constant",
                    count: bytes.len(),
                });
            }
        }
        if matches!(constant, Constant::Unusable) {
            return Err(BytecodeError::InvalidConstantIndex {
                index: 0,
                expected: "a usable constant",
            });
        }
        if let Some(existing) = self.find(&constant) {
            return Ok(existing);
        }

        let width = constant.width();
        if self.entries.len() + width > Self::MAX_COUNT {
            return Err(BytecodeError::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16;
        self.index.insert(constant.clone(), index);
        self.entries.push(constant);
        if width == 2 {
            self.entries.push(Constant::Unusable);
        }
        tracing::trace!(index, "appended constant pool entry");
        Ok(index)
    }

    pub fn intern_utf8(&mut self, text: &str) -> Result<u16> {
        self.intern(Constant::utf8(text))
    }

    pub fn intern_class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.intern_utf8(internal_name)?;
        self.intern(Constant::Class { name })
    }

    pub fn intern_string(&mut self, text: &str) -> Result<u16> {
        let value = self.intern_utf8(text)?;
        self.intern(Constant::String { value })
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    pub fn intern_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.intern_class(class)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    pub fn intern_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.intern_class(class)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::MethodRef {
            class,
            name_and_type,
        })
    }

    /// Resolve a `Utf8` entry to text
    pub fn utf8(&self, index: u16) -> Result<String> {
        match self.get(index) {
            Some(Constant::Utf8(bytes)) => decode_modified_utf8(bytes),
            _ => Err(BytecodeError::InvalidConstantIndex {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Compare a `Utf8` entry against text without allocating a `String`
    pub fn utf8_eq(&self, index: u16, text: &str) -> bool {
        match self.get(index) {
            Some(Constant::Utf8(bytes)) => **bytes == *encode_modified_utf8(text),
            _ => false,
        }
    }

    /// Resolve a `Class` entry to its internal name
    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index) {
            Some(Constant::Class { name }) => self.utf8(*name),
            _ => Err(BytecodeError::InvalidConstantIndex {
                index,
                expected: "Class",
            }),
        }
    }

    /// Resolve a `String` entry to its text
    pub fn string(&self, index: u16) -> Result<String> {
        match self.get(index) {
            Some(Constant::String { value }) => self.utf8(*value),
            _ => Err(BytecodeError::InvalidConstantIndex {
                index,
                expected: "String",
            }),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.get(index) {
            Some(Constant::NameAndType { name, descriptor }) => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(BytecodeError::InvalidConstantIndex {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolve a `Fieldref`, `Methodref` or `InterfaceMethodref`
    pub fn member_ref(&self, index: u16) -> Result<MemberRef> {
        match self.get(index) {
            Some(
                Constant::FieldRef {
                    class,
                    name_and_type,
                }
                | Constant::MethodRef {
                    class,
                    name_and_type,
                }
                | Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                },
            ) => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(MemberRef {
                    class: self.class_name(*class)?,
                    name,
                    descriptor,
                })
            }
            _ => Err(BytecodeError::InvalidConstantIndex {
                index,
                expected: "member reference",
            }),
        }
    }

    fn require(&self, index: u16, expected: &'static str, ok: fn(&Constant) -> bool) -> Result<()> {
        match self.get(index) {
            Some(constant) if ok(constant) => Ok(()),
            _ => Err(BytecodeError::InvalidConstantIndex { index, expected }),
        }
    }

    /// Check that structural cross references point at entries of the
    /// right kind, so that later resolution cannot trip over a dangling index
    fn validate_references(&self) -> Result<()> {
        let is_utf8 = |c: &Constant| matches!(c, Constant::Utf8(_));
        let is_class = |c: &Constant| matches!(c, Constant::Class { .. });
        let is_nat = |c: &Constant| matches!(c, Constant::NameAndType { .. });

        for (_, constant) in self.iter() {
            match constant {
                Constant::Class { name }
                | Constant::Module { name }
                | Constant::Package { name } => self.require(*name, "Utf8", is_utf8)?,
                Constant::String { value } => self.require(*value, "Utf8", is_utf8)?,
                Constant::MethodType { descriptor } => self.require(*descriptor, "Utf8", is_utf8)?,
                Constant::NameAndType { name, descriptor } => {
                    self.require(*name, "Utf8", is_utf8)?;
                    self.require(*descriptor, "Utf8", is_utf8)?;
                }
                Constant::FieldRef {
                    class,
                    name_and_type,
                }
                | Constant::MethodRef {
                    class,
                    name_and_type,
                }
                | Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    self.require(*class, "Class", is_class)?;
                    self.require(*name_and_type, "NameAndType", is_nat)?;
                }
                Constant::Dynamic { name_and_type, .. }
                | Constant::InvokeDynamic { name_and_type, .. } => {
                    self.require(*name_and_type, "NameAndType", is_nat)?;
                }
                Constant::MethodHandle { reference, .. } => {
                    self.require(*reference, "member reference", |c| {
                        matches!(
                            c,
                            Constant::FieldRef { .. }
                                | Constant::MethodRef { .. }
                                | Constant::InterfaceMethodRef { .. }
                        )
                    })?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for ConstantPool {}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode the JVM's modified UTF-8 (JVMS 4.4.7).
///
/// Unpaired surrogates are replaced rather than rejected: they are legal in
/// class files even though they have no `str` representation.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let continuation = |at: usize| -> Result<u16> {
            match bytes.get(at) {
                Some(&c) if c & 0xC0 == 0x80 => Ok((c & 0x3F) as u16),
                _ => Err(BytecodeError::InvalidUtf8(at)),
            }
        };
        match b {
            0x01..=0x7F => {
                units.push(b as u16);
                i += 1;
            }
            0xC0..=0xDF => {
                let c1 = continuation(i + 1)?;
                units.push((((b & 0x1F) as u16) << 6) | c1);
                i += 2;
            }
            0xE0..=0xEF => {
                let c1 = continuation(i + 1)?;
                let c2 = continuation(i + 2)?;
                units.push((((b & 0x0F) as u16) << 12) | (c1 << 6) | c2);
                i += 3;
            }
            _ => return Err(BytecodeError::InvalidUtf8(i)),
        }
    }
    Ok(String::from_utf16_lossy(&units))
}

/// Encode text as the JVM's modified UTF-8
pub fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
