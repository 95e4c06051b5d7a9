//! Annotation attributes (JVMS 4.7.16 - 4.7.19)

use crate::core::constants::ConstantPool;
use crate::core::io::{ByteReader, ByteWriter};
use crate::error::{BytecodeError, Result};

/// Nesting limit for annotation values; deeper input is rejected as malformed
const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or String constant; `tag` is one of `BCDFIJSZs`
    Const { tag: u8, index: u16 },
    Enum { type_name: u16, const_name: u16 },
    Class(u16),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPair {
    pub name_index: u16,
    pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// `Utf8` field descriptor of the annotation interface, e.g. `Lfoo/Bar;`
    pub type_index: u16,
    pub elements: Vec<ElementPair>,
}

impl ElementValue {
    fn decode(reader: &mut ByteReader<'_>, depth: usize) -> Result<Self> {
        const CTX: &str = "annotation element value";
        if depth > MAX_NESTING {
            return Err(BytecodeError::attribute("annotation", "nesting too deep"));
        }
        let tag = reader.u8(CTX)?;
        Ok(match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
                tag,
                index: reader.u16(CTX)?,
            },
            b'e' => ElementValue::Enum {
                type_name: reader.u16(CTX)?,
                const_name: reader.u16(CTX)?,
            },
            b'c' => ElementValue::Class(reader.u16(CTX)?),
            b'@' => ElementValue::Annotation(Annotation::decode(reader, depth + 1)?),
            b'[' => {
                let count = reader.u16(CTX)?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(ElementValue::decode(reader, depth + 1)?);
                }
                ElementValue::Array(values)
            }
            other => {
                return Err(BytecodeError::attribute(
                    "annotation",
                    format!("unknown element value tag {:?}", other as char),
                ));
            }
        })
    }

    fn encode(&self, writer: &mut ByteWriter) -> Result<()> {
        match self {
            ElementValue::Const { tag, index } => {
                writer.u8(*tag).u16(*index);
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                writer.u8(b'e').u16(*type_name).u16(*const_name);
            }
            ElementValue::Class(index) => {
                writer.u8(b'c').u16(*index);
            }
            ElementValue::Annotation(annotation) => {
                writer.u8(b'@');
                annotation.encode(writer)?;
            }
            ElementValue::Array(values) => {
                writer.u8(b'[');
                writer.count16(values.len(), "array element values")?;
                for value in values {
                    value.encode(writer)?;
                }
            }
        }
        Ok(())
    }
}

impl Annotation {
    pub fn new(type_index: u16) -> Self {
        Self {
            type_index,
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, name_index: u16, value: ElementValue) -> Self {
        self.elements.push(ElementPair { name_index, value });
        self
    }

    fn decode(reader: &mut ByteReader<'_>, depth: usize) -> Result<Self> {
        const CTX: &str = "annotation";
        let type_index = reader.u16(CTX)?;
        let count = reader.u16(CTX)?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = reader.u16(CTX)?;
            let value = ElementValue::decode(reader, depth)?;
            elements.push(ElementPair { name_index, value });
        }
        Ok(Self {
            type_index,
            elements,
        })
    }

    fn encode(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.u16(self.type_index);
        writer.count16(self.elements.len(), "annotation elements")?;
        for pair in &self.elements {
            writer.u16(pair.name_index);
            pair.value.encode(writer)?;
        }
        Ok(())
    }

    /// Check the annotation's type against a field descriptor such as `Lfoo/Bar;`
    pub fn is_type(&self, pool: &ConstantPool, descriptor: &str) -> bool {
        pool.utf8_eq(self.type_index, descriptor)
    }

    pub fn element(&self, pool: &ConstantPool, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|pair| pool.utf8_eq(pair.name_index, name))
            .map(|pair| &pair.value)
    }

    /// Text of a String-valued element, `None` when absent or not a String
    pub fn string_element(&self, pool: &ConstantPool, name: &str) -> Result<Option<String>> {
        match self.element(pool, name) {
            Some(ElementValue::Const { tag: b's', index }) => pool.utf8(*index).map(Some),
            _ => Ok(None),
        }
    }
}

/// Decode a `Runtime(In)VisibleAnnotations` body
pub fn decode_annotations(info: &[u8]) -> Result<Vec<Annotation>> {
    let mut reader = ByteReader::new(info);
    let count = reader.u16("annotations")?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(Annotation::decode(&mut reader, 0)?);
    }
    expect_consumed(&reader)?;
    Ok(annotations)
}

pub fn encode_annotations(annotations: &[Annotation]) -> Result<Vec<u8>> {
    let mut writer = ByteWriter::new();
    writer.count16(annotations.len(), "annotations")?;
    for annotation in annotations {
        annotation.encode(&mut writer)?;
    }
    Ok(writer.into_inner())
}

/// Decode a `Runtime(In)VisibleParameterAnnotations` body: one list per
/// parameter covered by the table
pub fn decode_parameter_annotations(info: &[u8]) -> Result<Vec<Vec<Annotation>>> {
    let mut reader = ByteReader::new(info);
    let parameters = reader.u8("parameter annotations")?;
    let mut result = Vec::with_capacity(parameters as usize);
    for _ in 0..parameters {
        let count = reader.u16("parameter annotations")?;
        let mut annotations = Vec::with_capacity(count as usize);
        for _ in 0..count {
            annotations.push(Annotation::decode(&mut reader, 0)?);
        }
        result.push(annotations);
    }
    expect_consumed(&reader)?;
    Ok(result)
}

pub fn encode_parameter_annotations(parameters: &[Vec<Annotation>]) -> Result<Vec<u8>> {
    let count = u8::try_from(parameters.len()).map_err(|_| BytecodeError::TooMany {
        what: "annotated parameters",
        count: parameters.len(),
    })?;
    let mut writer = ByteWriter::new();
    writer.u8(count);
    for annotations in parameters {
        writer.count16(annotations.len(), "annotations")?;
        for annotation in annotations {
            annotation.encode(&mut writer)?;
        }
    }
    Ok(writer.into_inner())
}

fn expect_consumed(reader: &ByteReader<'_>) -> Result<()> {
    if reader.is_empty() {
        Ok(())
    } else {
        Err(BytecodeError::attribute(
            "annotation",
            format!("{} trailing byte(s)", reader.remaining()),
        ))
    }
}
