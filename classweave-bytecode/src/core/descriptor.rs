//! Field and method descriptors (JVMS 4.3)

use crate::error::{BytecodeError, Result};
use std::fmt;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// One of `BCDFIJSZ`
    Base(char),
    /// Internal class name, e.g. `java/lang/String`
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut chars = descriptor.chars();
        let ty = Self::parse_next(&mut chars, descriptor)?;
        if chars.next().is_some() {
            return Err(BytecodeError::InvalidDescriptor(descriptor.to_string()));
        }
        Ok(ty)
    }

    fn parse_next(chars: &mut Chars<'_>, whole: &str) -> Result<Self> {
        let invalid = || BytecodeError::InvalidDescriptor(whole.to_string());
        match chars.next().ok_or_else(invalid)? {
            c @ ('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => Ok(FieldType::Base(c)),
            'L' => {
                let mut name = String::new();
                for c in chars.by_ref() {
                    if c == ';' {
                        return if name.is_empty() {
                            Err(invalid())
                        } else {
                            Ok(FieldType::Object(name))
                        };
                    }
                    name.push(c);
                }
                Err(invalid())
            }
            '[' => Ok(FieldType::Array(Box::new(Self::parse_next(chars, whole)?))),
            _ => Err(invalid()),
        }
    }

    /// Objects and arrays
    pub fn is_reference(&self) -> bool {
        !matches!(self, FieldType::Base(_))
    }

    /// Local variable slots a value of this type occupies
    pub fn slot_size(&self) -> u16 {
        match self {
            FieldType::Base('J' | 'D') => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(c) => f.write_str(match c {
                'B' => "byte",
                'C' => "char",
                'D' => "double",
                'F' => "float",
                'I' => "int",
                'J' => "long",
                'S' => "short",
                _ => "boolean",
            }),
            FieldType::Object(name) => f.write_str(&name.replace('/', ".")),
            FieldType::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    /// `None` for `void`
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let invalid = || BytecodeError::InvalidDescriptor(descriptor.to_string());
        let rest = descriptor.strip_prefix('(').ok_or_else(invalid)?;
        let close = rest.find(')').ok_or_else(invalid)?;
        let (params, ret) = (&rest[..close], &rest[close + 1..]);

        let mut parameters = Vec::new();
        let mut chars = params.chars();
        while !chars.as_str().is_empty() {
            parameters.push(FieldType::parse_next(&mut chars, descriptor)?);
        }

        let return_type = match ret {
            "V" => None,
            other => Some(FieldType::parse(other).map_err(|_| invalid())?),
        };

        Ok(Self {
            parameters,
            return_type,
        })
    }

    /// Local variable slot of each parameter; slot 0 holds `this` for
    /// instance methods
    pub fn parameter_slots(&self, is_static: bool) -> Vec<u16> {
        let mut slot = if is_static { 0 } else { 1 };
        self.parameters
            .iter()
            .map(|param| {
                let current = slot;
                slot += param.slot_size();
                current
            })
            .collect()
    }
}
