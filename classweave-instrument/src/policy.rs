//! What gets woven in at each injection site
//!
//! A policy turns one site into a straight-line instruction sequence that
//! consumes the reference on top of the operand stack. Sequences may not
//! branch: the visitor relocates existing stack map frames but never
//! computes new ones.

use classweave_bytecode::core::constants::ConstantPool;
use classweave_bytecode::core::instructions::{Instruction, Operand};
use classweave_bytecode::Opcode;
use smallvec::{smallvec, SmallVec};
use std::fmt;

use crate::config::InstrumentationConfig;
use crate::error::InstrumentError;

/// Descriptor every validator entry point must have
pub const VALIDATOR_DESCRIPTOR: &str = "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/String;)V";

pub type Sequence = SmallVec<[Instruction; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteKind {
    /// Checked once at method entry
    Parameter { index: usize, slot: u16 },
    /// Checked before every `areturn`
    Return,
    /// Checked before every store to the field from its declaring class
    Field { name: String },
}

/// One annotated element together with the pattern it must match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionSite {
    /// Internal name of the declaring class
    pub class_name: String,
    /// Method the check is woven into
    pub method_name: String,
    pub kind: SiteKind,
    pub pattern: String,
}

impl InjectionSite {
    /// Human readable location, passed to the validator at runtime
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for InjectionSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = self.class_name.replace('/', ".");
        match &self.kind {
            SiteKind::Parameter { index, .. } => {
                write!(f, "parameter {} of {}.{}", index, class, self.method_name)
            }
            SiteKind::Return => write!(f, "return value of {}.{}", class, self.method_name),
            SiteKind::Field { name } => write!(f, "field {}.{}", class, name),
        }
    }
}

pub trait InjectionPolicy: Send + Sync {
    /// Instructions consuming the checked reference from the top of the
    /// stack. New constants are interned into `pool`.
    ///
    /// The sequence must leave the operand stack as it found it minus that
    /// one reference, and must neither branch nor return. An empty sequence
    /// is rejected by the visitor.
    fn emit(&self, site: &InjectionSite, pool: &mut ConstantPool) -> Result<Sequence, InstrumentError>;

    /// Extra operand stack slots the sequence needs, counting the copy of the
    /// checked value the visitor pushes before it
    fn stack_depth(&self) -> u16;
}

/// Calls a static validator method with `(value, pattern, site)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticValidatorPolicy {
    /// Internal name of the validator class
    pub class: String,
    pub method: String,
}

impl StaticValidatorPolicy {
    pub fn new(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
        }
    }

    /// `None` when the configuration disables instrumentation
    pub fn from_config(config: &InstrumentationConfig) -> Option<Self> {
        let method = config.validator.method_for(config.mode)?;
        Some(Self::new(config.validator.internal_class_name(), method))
    }
}

fn load_string(pool: &mut ConstantPool, text: &str) -> Result<Instruction, InstrumentError> {
    let index = pool.intern_string(text)?;
    Ok(match u8::try_from(index) {
        Ok(short) => Instruction::new(Opcode::LDC, Operand::Bytes(smallvec![short])),
        Err(_) => Instruction::constant(Opcode::LDC_W, index),
    })
}

impl InjectionPolicy for StaticValidatorPolicy {
    fn emit(&self, site: &InjectionSite, pool: &mut ConstantPool) -> Result<Sequence, InstrumentError> {
        let pattern = load_string(pool, &site.pattern)?;
        let description = load_string(pool, &site.describe())?;
        let validator = pool.intern_method_ref(&self.class, &self.method, VALIDATOR_DESCRIPTOR)?;
        Ok(smallvec![
            pattern,
            description,
            Instruction::constant(Opcode::INVOKESTATIC, validator),
        ])
    }

    fn stack_depth(&self) -> u16 {
        3
    }
}
