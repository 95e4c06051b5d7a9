//! Rewriting visitor
//!
//! Walks a parsed class in document order (methods in class order; per
//! method, parameter checks first, then guards by ascending offset) and
//! weaves a policy sequence in at every site:
//!
//! - annotated parameter: `aload <slot>` + sequence at method entry
//! - annotated method: `dup` + sequence before every `areturn`
//! - annotated field: `dup` + sequence before every `putfield`/`putstatic`
//!   of that field in its declaring class
//!
//! The same input always yields the same output, constant pool included.

pub mod relocate;
pub mod sites;

use classweave_bytecode::core::classfile::{Attribute, ClassFile};

use crate::error::InstrumentError;
use crate::policy::{InjectionPolicy, Sequence};
use relocate::{splice, Insertion};

/// Class attribute recording that the class was already rewritten
pub const INSTRUMENTED_ATTRIBUTE: &str = "ClassweaveInstrumented";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitReport {
    /// Checks woven in
    pub sites: usize,
    /// Methods whose body changed
    pub methods: usize,
}

impl VisitReport {
    pub fn mutated(&self) -> bool {
        self.sites > 0
    }
}

pub struct RewritingVisitor<'a> {
    /// Field descriptor of the marker annotation
    marker: String,
    policy: &'a dyn InjectionPolicy,
}

impl<'a> RewritingVisitor<'a> {
    pub fn new(marker_descriptor: impl Into<String>, policy: &'a dyn InjectionPolicy) -> Self {
        Self {
            marker: marker_descriptor.into(),
            policy,
        }
    }

    /// Rewrite `class` in place.
    ///
    /// On error the model may be partly rewritten and must be discarded.
    pub fn visit(&self, class: &mut ClassFile) -> Result<VisitReport, InstrumentError> {
        if class.is_module() {
            return Ok(VisitReport::default());
        }
        let class_name = class.name()?;
        if class.find_attribute(INSTRUMENTED_ATTRIBUTE).is_some() {
            return Err(InstrumentError::AlreadyInstrumented(class_name.replace('/', ".")));
        }

        let fields = sites::annotated_fields(class, &class_name, &self.marker)?;
        let mut report = VisitReport::default();

        for index in 0..class.methods.len() {
            let pool = &class.constant_pool;
            let method = &class.methods[index];
            let Some(mut code) = method.code(pool)? else {
                continue;
            };
            let planned = sites::method_sites(&class_name, method, &code, pool, &self.marker, &fields)?;
            if planned.is_empty() {
                continue;
            }
            let method_label = format!(
                "{}.{}{}",
                class_name.replace('/', "."),
                method.name(pool)?,
                method.descriptor(pool)?
            );

            let mut insertions = Vec::with_capacity(planned.len());
            for site in planned {
                let sequence = self.policy.emit(&site.site, &mut class.constant_pool)?;
                if sequence.is_empty() {
                    return Err(InstrumentError::unsupported(
                        site.site.to_string(),
                        "policy emitted no code to consume the checked value",
                    ));
                }
                let mut woven = Sequence::with_capacity(sequence.len() + 1);
                woven.push(site.prelude);
                woven.extend(sequence);
                tracing::trace!(site = %site.site, offset = site.offset, "weaving check");
                insertions.push(Insertion {
                    offset: site.offset,
                    retarget: site.retarget,
                    code: woven,
                });
            }

            splice(
                &mut code,
                &class.constant_pool,
                &insertions,
                self.policy.stack_depth(),
                &method_label,
            )?;
            class.methods[index].set_code(&class.constant_pool, &code)?;

            report.sites += insertions.len();
            report.methods += 1;
        }

        if report.mutated() {
            let name = class.constant_pool.intern_utf8(INSTRUMENTED_ATTRIBUTE)?;
            class.attributes.push(Attribute::new(name, Vec::new()));
        }
        Ok(report)
    }
}
