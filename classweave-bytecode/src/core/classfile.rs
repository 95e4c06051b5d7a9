//! ClassFile implementation
//!
//! The model keeps every attribute body as raw bytes. Typed views (`Code`,
//! annotations, stack maps) are decoded on demand and written back only by
//! code that actually changes them, which is what makes serializing an
//! untouched model reproduce its input byte for byte.

use bitflags::bitflags;

use crate::core::annotations::{Annotation, decode_annotations, decode_parameter_annotations};
use crate::core::code::CodeAttribute;
use crate::core::constants::ConstantPool;
use crate::core::io::{ByteReader, ByteWriter};
use crate::error::{BytecodeError, Result};
use crate::{CLASS_MAGIC, MAX_SUPPORTED_MAJOR, MIN_SUPPORTED_MAJOR};

/// Well-known attribute names
pub mod attr {
    pub const CODE: &str = "Code";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
    pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
    pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str =
        "RuntimeInvisibleParameterAnnotations";
}

bitflags! {
    /// Access and property flags shared by classes, fields and methods.
    ///
    /// Some bits mean different things depending on where they appear
    /// (`0x0020` is `ACC_SUPER` on classes and `ACC_SYNCHRONIZED` on methods).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

/// A raw attribute: name index plus undecoded body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl Attribute {
    pub fn new(name_index: u16, info: Vec<u8>) -> Self {
        Self { name_index, info }
    }

    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.name_index)
    }

    pub fn is_named(&self, pool: &ConstantPool, name: &str) -> bool {
        pool.utf8_eq(self.name_index, name)
    }

    pub(crate) fn decode_list(reader: &mut ByteReader<'_>) -> Result<Vec<Self>> {
        const CTX: &str = "attribute";
        let count = reader.u16(CTX)?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = reader.u16(CTX)?;
            let info = reader.blob32(CTX)?.to_vec();
            attributes.push(Self { name_index, info });
        }
        Ok(attributes)
    }

    pub(crate) fn encode_list(attributes: &[Self], writer: &mut ByteWriter) -> Result<()> {
        writer.count16(attributes.len(), "attributes")?;
        for attribute in attributes {
            writer.u16(attribute.name_index);
            writer.blob32(&attribute.info, "attribute bytes")?;
        }
        Ok(())
    }
}

/// A field or a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl Member {
    pub fn new(access_flags: AccessFlags, name_index: u16, descriptor_index: u16) -> Self {
        Self {
            access_flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        }
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        const CTX: &str = "member";
        Ok(Self {
            access_flags: AccessFlags::from_bits_retain(reader.u16(CTX)?),
            name_index: reader.u16(CTX)?,
            descriptor_index: reader.u16(CTX)?,
            attributes: Attribute::decode_list(reader)?,
        })
    }

    fn encode(&self, writer: &mut ByteWriter) -> Result<()> {
        writer
            .u16(self.access_flags.bits())
            .u16(self.name_index)
            .u16(self.descriptor_index);
        Attribute::encode_list(&self.attributes, writer)
    }

    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.descriptor_index)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    pub fn find_attribute(&self, pool: &ConstantPool, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is_named(pool, name))
    }

    pub fn find_attribute_mut(&mut self, pool: &ConstantPool, name: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.is_named(pool, name))
    }

    /// Decoded `Code` attribute; `None` for abstract and native methods
    pub fn code(&self, pool: &ConstantPool) -> Result<Option<CodeAttribute>> {
        self.find_attribute(pool, attr::CODE)
            .map(|a| CodeAttribute::decode(&a.info))
            .transpose()
    }

    /// Replace the body of the existing `Code` attribute
    pub fn set_code(&mut self, pool: &ConstantPool, code: &CodeAttribute) -> Result<()> {
        let info = code.encode()?;
        match self.find_attribute_mut(pool, attr::CODE) {
            Some(attribute) => {
                attribute.info = info;
                Ok(())
            }
            None => Err(BytecodeError::attribute("Code", "member has no Code attribute")),
        }
    }

    /// Visible and invisible member annotations, visible first
    pub fn annotations(&self, pool: &ConstantPool) -> Result<Vec<Annotation>> {
        let mut all = Vec::new();
        for attribute in &self.attributes {
            if attribute.is_named(pool, attr::RUNTIME_VISIBLE_ANNOTATIONS)
                || attribute.is_named(pool, attr::RUNTIME_INVISIBLE_ANNOTATIONS)
            {
                all.extend(decode_annotations(&attribute.info)?);
            }
        }
        Ok(all)
    }

    /// Visible and invisible parameter annotations merged per parameter.
    ///
    /// The table may cover fewer parameters than the descriptor declares
    /// (compilers omit synthetic leading parameters); the result is aligned so
    /// that its last entry always belongs to the last declared parameter.
    pub fn parameter_annotations(
        &self,
        pool: &ConstantPool,
        declared: usize,
    ) -> Result<Vec<Vec<Annotation>>> {
        let mut merged: Vec<Vec<Annotation>> = vec![Vec::new(); declared];
        for attribute in &self.attributes {
            if !(attribute.is_named(pool, attr::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS)
                || attribute.is_named(pool, attr::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS))
            {
                continue;
            }
            let table = decode_parameter_annotations(&attribute.info)?;
            if table.len() > declared {
                return Err(BytecodeError::attribute(
                    "parameter annotations",
                    format!("{} entries for {declared} parameters", table.len()),
                ));
            }
            let skip = declared - table.len();
            for (i, annotations) in table.into_iter().enumerate() {
                merged[skip + i].extend(annotations);
            }
        }
        Ok(merged)
    }
}

/// In-memory model of one class file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: AccessFlags,
    pub this_class: u16,
    /// Zero only for `java/lang/Object` and module descriptors
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Create an empty public class
    pub fn new(this_class: &str, super_class: Option<&str>, major_version: u16) -> Result<Self> {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.intern_class(this_class)?;
        let super_class = match super_class {
            Some(name) => constant_pool.intern_class(name)?,
            None => 0,
        };
        Ok(Self {
            minor_version: 0,
            major_version,
            constant_pool,
            access_flags: AccessFlags::PUBLIC | AccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        })
    }

    /// Read `(major, minor)` from the header without parsing anything else
    pub fn peek_version(bytes: &[u8]) -> Option<(u16, u16)> {
        let mut reader = ByteReader::new(bytes);
        if reader.u32("magic").ok()? != CLASS_MAGIC {
            return None;
        }
        let minor = reader.u16("version").ok()?;
        let major = reader.u16("version").ok()?;
        Some((major, minor))
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);

        let magic = reader.u32("magic")?;
        if magic != CLASS_MAGIC {
            return Err(BytecodeError::BadMagic(magic));
        }
        let minor_version = reader.u16("version")?;
        let major_version = reader.u16("version")?;
        if !(MIN_SUPPORTED_MAJOR..=MAX_SUPPORTED_MAJOR).contains(&major_version) {
            return Err(BytecodeError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let constant_pool = ConstantPool::decode(&mut reader)?;
        let access_flags = AccessFlags::from_bits_retain(reader.u16("class header")?);
        let this_class = reader.u16("class header")?;
        let super_class = reader.u16("class header")?;
        constant_pool.class_name(this_class)?;
        if super_class != 0 {
            constant_pool.class_name(super_class)?;
        }

        let interface_count = reader.u16("interfaces")?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            let index = reader.u16("interfaces")?;
            constant_pool.class_name(index)?;
            interfaces.push(index);
        }

        let fields = Self::decode_members(&mut reader, &constant_pool)?;
        let methods = Self::decode_members(&mut reader, &constant_pool)?;
        let attributes = Attribute::decode_list(&mut reader)?;
        for attribute in &attributes {
            attribute.name(&constant_pool)?;
        }

        if !reader.is_empty() {
            return Err(BytecodeError::TrailingBytes(reader.remaining()));
        }

        tracing::trace!(
            major_version,
            fields = fields.len(),
            methods = methods.len(),
            "parsed class file"
        );

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn decode_members(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Vec<Member>> {
        let count = reader.u16("member count")?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let member = Member::decode(reader)?;
            member.name(pool)?;
            member.descriptor(pool)?;
            for attribute in &member.attributes {
                attribute.name(pool)?;
            }
            members.push(member);
        }
        Ok(members)
    }

    /// Serialize the model; an untouched parse result reproduces its input
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::with_capacity(1024);
        writer
            .u32(CLASS_MAGIC)
            .u16(self.minor_version)
            .u16(self.major_version);
        self.constant_pool.encode(&mut writer)?;
        writer
            .u16(self.access_flags.bits())
            .u16(self.this_class)
            .u16(self.super_class);
        writer.count16(self.interfaces.len(), "interfaces")?;
        for interface in &self.interfaces {
            writer.u16(*interface);
        }
        for members in [&self.fields, &self.methods] {
            writer.count16(members.len(), "members")?;
            for member in members {
                member.encode(&mut writer)?;
            }
        }
        Attribute::encode_list(&self.attributes, &mut writer)?;
        Ok(writer.into_inner())
    }

    /// Internal name of this class, e.g. `com/example/Foo`
    pub fn name(&self) -> Result<String> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn is_module(&self) -> bool {
        self.access_flags.contains(AccessFlags::MODULE)
    }

    pub fn find_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.is_named(&self.constant_pool, name))
    }

    /// Append a field, interning its name and descriptor
    pub fn add_field(&mut self, access_flags: AccessFlags, name: &str, descriptor: &str) -> Result<&mut Member> {
        let name_index = self.constant_pool.intern_utf8(name)?;
        let descriptor_index = self.constant_pool.intern_utf8(descriptor)?;
        let at = self.fields.len();
        self.fields
            .push(Member::new(access_flags, name_index, descriptor_index));
        Ok(&mut self.fields[at])
    }

    /// Append a method, interning its name and descriptor
    pub fn add_method(&mut self, access_flags: AccessFlags, name: &str, descriptor: &str) -> Result<&mut Member> {
        let name_index = self.constant_pool.intern_utf8(name)?;
        let descriptor_index = self.constant_pool.intern_utf8(descriptor)?;
        let at = self.methods.len();
        self.methods
            .push(Member::new(access_flags, name_index, descriptor_index));
        Ok(&mut self.methods[at])
    }
}
