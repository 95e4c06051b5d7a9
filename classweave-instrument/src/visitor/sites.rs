//! Finding the elements carrying the marker and the code locations that
//! guard them

use classweave_bytecode::core::annotations::Annotation;
use classweave_bytecode::core::classfile::{ClassFile, Member};
use classweave_bytecode::core::code::CodeAttribute;
use classweave_bytecode::core::constants::ConstantPool;
use classweave_bytecode::core::descriptor::{FieldType, MethodDescriptor};
use classweave_bytecode::core::instructions::Instruction;
use classweave_bytecode::Opcode;
use indexmap::IndexMap;

use crate::error::InstrumentError;
use crate::policy::{InjectionSite, SiteKind};

/// Annotated fields of one class, keyed by `(name, descriptor)`, mapped to
/// their pattern; in declaration order
pub type FieldPatterns = IndexMap<(String, String), String>;

/// A site bound to a location in one method body
#[derive(Debug, Clone)]
pub struct PlannedSite {
    pub offset: u32,
    pub retarget: bool,
    /// Pushes the value to check; the policy sequence follows
    pub prelude: Instruction,
    pub site: InjectionSite,
}

/// Pattern of the first marker among `annotations`.
///
/// `Ok(None)` when the marker is absent; an error when it is present but has
/// no String `value` element.
fn marker_pattern(
    annotations: &[Annotation],
    pool: &ConstantPool,
    marker: &str,
    site: impl FnOnce() -> String,
) -> Result<Option<String>, InstrumentError> {
    let Some(annotation) = annotations.iter().find(|a| a.is_type(pool, marker)) else {
        return Ok(None);
    };
    match annotation.string_element(pool, "value")? {
        Some(pattern) => Ok(Some(pattern)),
        None => Err(InstrumentError::MissingPattern { site: site() }),
    }
}

fn require_reference(ty: &FieldType, site: &str) -> Result<(), InstrumentError> {
    if ty.is_reference() {
        Ok(())
    } else {
        Err(InstrumentError::unsupported(
            site,
            format!("annotated element has primitive type {ty}"),
        ))
    }
}

pub fn annotated_fields(class: &ClassFile, class_name: &str, marker: &str) -> Result<FieldPatterns, InstrumentError> {
    let pool = &class.constant_pool;
    let mut fields = FieldPatterns::new();
    for field in &class.fields {
        let name = field.name(pool)?;
        let label = || format!("field {}.{}", class_name.replace('/', "."), name);
        let Some(pattern) = marker_pattern(&field.annotations(pool)?, pool, marker, label)? else {
            continue;
        };
        let descriptor = field.descriptor(pool)?;
        require_reference(&FieldType::parse(&descriptor)?, &label())?;
        fields.insert((name, descriptor), pattern);
    }
    Ok(fields)
}

/// Every site in `method`, parameters first, then guards by ascending offset
pub fn method_sites(
    class_name: &str,
    method: &Member,
    code: &CodeAttribute,
    pool: &ConstantPool,
    marker: &str,
    fields: &FieldPatterns,
) -> Result<Vec<PlannedSite>, InstrumentError> {
    let method_name = method.name(pool)?;
    let descriptor = MethodDescriptor::parse(&method.descriptor(pool)?)?;
    let label = format!("method {}.{}", class_name.replace('/', "."), method_name);
    let site = |kind: SiteKind, pattern: String| InjectionSite {
        class_name: class_name.to_string(),
        method_name: method_name.clone(),
        kind,
        pattern,
    };

    let mut planned = Vec::new();

    let slots = descriptor.parameter_slots(method.is_static());
    let parameters = method.parameter_annotations(pool, descriptor.parameters.len())?;
    for (index, annotations) in parameters.iter().enumerate() {
        let param_label = || format!("parameter {index} of {label}");
        let Some(pattern) = marker_pattern(annotations, pool, marker, param_label)? else {
            continue;
        };
        require_reference(&descriptor.parameters[index], &param_label())?;
        let slot = slots[index];
        planned.push(PlannedSite {
            offset: 0,
            retarget: false,
            prelude: Instruction::load_reference(slot),
            site: site(SiteKind::Parameter { index, slot }, pattern),
        });
    }

    let returns = marker_pattern(&method.annotations(pool)?, pool, marker, || label.clone())?;
    if returns.is_some() {
        match &descriptor.return_type {
            Some(ty) => require_reference(ty, &label)?,
            None => {
                return Err(InstrumentError::unsupported(&label, "annotated method returns void"));
            }
        }
    }

    if returns.is_none() && fields.is_empty() {
        return Ok(planned);
    }

    for inst in code.instructions()? {
        let pattern = match inst.opcode {
            Opcode::ARETURN => returns.clone().map(|p| (SiteKind::Return, p)),
            Opcode::PUTFIELD | Opcode::PUTSTATIC => match inst.constant_index() {
                Some(index) => {
                    let target = pool.member_ref(index)?;
                    if target.class == class_name {
                        fields
                            .get(&(target.name.clone(), target.descriptor))
                            .map(|p| (SiteKind::Field { name: target.name }, p.clone()))
                    } else {
                        None
                    }
                }
                None => None,
            },
            _ => None,
        };
        if let Some((kind, pattern)) = pattern {
            planned.push(PlannedSite {
                offset: inst.offset,
                retarget: true,
                prelude: Instruction::simple(Opcode::DUP),
                site: site(kind, pattern),
            });
        }
    }

    Ok(planned)
}
