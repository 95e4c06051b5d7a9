#![allow(dead_code)]

use anyhow::{anyhow, Result};
use classweave_bytecode::core::annotations::{
    encode_annotations, encode_parameter_annotations, Annotation, ElementValue,
};
use classweave_bytecode::core::classfile::{attr, AccessFlags, Attribute, ClassFile};
use classweave_bytecode::core::code::CodeAttribute;
use classweave_bytecode::core::instructions::{assemble, Instruction};
use classweave_bytecode::{Disassembler, DisassemblyFormat, Opcode};
use classweave_instrument::{
    CollectingSink, CompilationUnit, Diagnostic, InstrumentationConfig, InstrumentationMode,
    PatternValidatorBuilder, RewriteOutcome,
};

pub const MARKER: &str = "com.example.Pattern";
pub const MARKER_DESCRIPTOR: &str = "Lcom/example/Pattern;";

pub fn config() -> InstrumentationConfig {
    InstrumentationConfig::new(InstrumentationMode::Assert, MARKER)
}

/// Builds class files in memory, one member at a time
pub struct ClassFixture {
    pub class: ClassFile,
}

impl ClassFixture {
    /// `name` is an internal name such as `com/example/Account`
    pub fn new(name: &str) -> Self {
        Self {
            class: ClassFile::new(name, Some("java/lang/Object"), 52).expect("class header"),
        }
    }

    pub fn class_name(&self) -> String {
        self.class.name().expect("class name")
    }

    /// Marker annotation with `value = pattern`
    pub fn pattern(&mut self, pattern: &str) -> Annotation {
        let pool = &mut self.class.constant_pool;
        let ty = pool.intern_utf8(MARKER_DESCRIPTOR).unwrap();
        let name = pool.intern_utf8("value").unwrap();
        let value = pool.intern_utf8(pattern).unwrap();
        Annotation::new(ty).with_element(name, ElementValue::Const { tag: b's', index: value })
    }

    /// Marker annotation without a `value` element
    pub fn bare_marker(&mut self) -> Annotation {
        Annotation::new(self.class.constant_pool.intern_utf8(MARKER_DESCRIPTOR).unwrap())
    }

    /// Some unrelated annotation
    pub fn other_annotation(&mut self) -> Annotation {
        Annotation::new(self.class.constant_pool.intern_utf8("Ljava/lang/Deprecated;").unwrap())
    }

    fn annotations_attribute(&mut self, annotations: &[Annotation]) -> Attribute {
        let name = self
            .class
            .constant_pool
            .intern_utf8(attr::RUNTIME_INVISIBLE_ANNOTATIONS)
            .unwrap();
        Attribute::new(name, encode_annotations(annotations).unwrap())
    }

    pub fn field(&mut self, flags: AccessFlags, name: &str, descriptor: &str, annotations: &[Annotation]) -> &mut Self {
        let attribute = (!annotations.is_empty()).then(|| self.annotations_attribute(annotations));
        let field = self.class.add_field(flags, name, descriptor).unwrap();
        field.attributes.extend(attribute);
        self
    }

    /// Add a method with a body; returns its index
    pub fn method(
        &mut self,
        flags: AccessFlags,
        name: &str,
        descriptor: &str,
        max_locals: u16,
        mut body: Vec<Instruction>,
    ) -> usize {
        let code = CodeAttribute::new(2, max_locals, assemble(&mut body).unwrap());
        self.method_with_code(flags, name, descriptor, code)
    }

    pub fn method_with_code(&mut self, flags: AccessFlags, name: &str, descriptor: &str, code: CodeAttribute) -> usize {
        let code_name = self.class.constant_pool.intern_utf8(attr::CODE).unwrap();
        let method = self.class.add_method(flags, name, descriptor).unwrap();
        method
            .attributes
            .push(Attribute::new(code_name, code.encode().unwrap()));
        self.class.methods.len() - 1
    }

    pub fn abstract_method(&mut self, name: &str, descriptor: &str) -> usize {
        self.class
            .add_method(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, name, descriptor)
            .unwrap();
        self.class.methods.len() - 1
    }

    pub fn annotate_method(&mut self, index: usize, annotations: &[Annotation]) -> &mut Self {
        let attribute = self.annotations_attribute(annotations);
        self.class.methods[index].attributes.push(attribute);
        self
    }

    pub fn annotate_parameters(&mut self, index: usize, parameters: &[Vec<Annotation>]) -> &mut Self {
        let name = self
            .class
            .constant_pool
            .intern_utf8(attr::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS)
            .unwrap();
        let body = encode_parameter_annotations(parameters).unwrap();
        self.class.methods[index]
            .attributes
            .push(Attribute::new(name, body));
        self
    }

    pub fn field_ref(&mut self, name: &str, descriptor: &str) -> u16 {
        let class = self.class_name();
        self.class
            .constant_pool
            .intern_field_ref(&class, name, descriptor)
            .unwrap()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.class.to_bytes().expect("serializable fixture")
    }

    pub fn unit(&self) -> CompilationUnit {
        CompilationUnit::new(self.class_name().replace('/', "."), self.bytes())
    }
}

/// Process one unit with the default builder, returning the outcome and
/// everything reported
pub fn process(unit: &CompilationUnit, config: &InstrumentationConfig) -> (RewriteOutcome, Vec<Diagnostic>) {
    let sink = CollectingSink::new();
    let outcome = PatternValidatorBuilder::new().process(unit, config, &sink);
    (outcome, sink.take())
}

/// Bytes of a `Rewritten` outcome
pub fn rewritten(outcome: &RewriteOutcome) -> Result<&[u8]> {
    outcome
        .bytes()
        .ok_or_else(|| anyhow!("expected a rewritten unit, got {outcome:?}"))
}

/// Opcodes of the method called `name`
pub fn opcodes(bytes: &[u8], name: &str) -> Result<Vec<Opcode>> {
    Ok(code_of(bytes, name)?
        .instructions()?
        .iter()
        .map(|i| i.opcode)
        .collect())
}

pub fn code_of(bytes: &[u8], name: &str) -> Result<CodeAttribute> {
    let class = ClassFile::parse(bytes)?;
    let pool = &class.constant_pool;
    let method = class
        .methods
        .iter()
        .find(|m| m.name(pool).map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| anyhow!("no method {name}"))?;
    method
        .code(pool)?
        .ok_or_else(|| anyhow!("method {name} has no code"))
}

/// Compact listing of every method body
pub fn listing(bytes: &[u8]) -> Result<String> {
    let class = ClassFile::parse(bytes)?;
    Ok(Disassembler::with_format(DisassemblyFormat::Compact).disassemble(&class)?)
}

/// Verbose listing with constant comments
pub fn verbose_listing(bytes: &[u8]) -> Result<String> {
    let class = ClassFile::parse(bytes)?;
    Ok(Disassembler::new().show_constant_pool(false).disassemble(&class)?)
}

pub fn count_validator_calls(bytes: &[u8]) -> Result<usize> {
    Ok(verbose_listing(bytes)?.matches("PatternValidator.assertMatches").count())
}

pub fn aload(slot: u16) -> Instruction {
    Instruction::load_reference(slot)
}

pub fn op(opcode: Opcode) -> Instruction {
    Instruction::simple(opcode)
}
