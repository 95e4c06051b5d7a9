//! Instrumentation driver
//!
//! Per unit: filter, parse, visit, then serialize only if something changed.
//! Every unit-local failure ends as exactly one diagnostic and a `Failed`
//! outcome; nothing propagates past [`PatternValidatorBuilder::process`].

use classweave_bytecode::ClassFile;
use tracing::{debug, debug_span, warn};

use crate::config::{ConfigError, InstrumentationConfig};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{InstrumentError, UnitError};
use crate::filter::UnitFilter;
use crate::policy::{InjectionPolicy, StaticValidatorPolicy};
use crate::unit::{CompilationUnit, RewriteOutcome};
use crate::visitor::RewritingVisitor;

/// Step name attached to every diagnostic
pub const PRESENTABLE_NAME: &str = "Classweave Pattern Validator";

pub const PROGRESS_MESSAGE: &str = "Adding pattern assertions...";

/// Stateless between calls; one instance can serve a whole build from any
/// number of threads.
#[derive(Default)]
pub struct PatternValidatorBuilder {
    filter: UnitFilter,
    /// Replaces the validator call derived from the configuration
    policy: Option<Box<dyn InjectionPolicy>>,
}

impl PatternValidatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: Box<dyn InjectionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn presentable_name(&self) -> &'static str {
        PRESENTABLE_NAME
    }

    pub fn progress_message(&self) -> &'static str {
        PROGRESS_MESSAGE
    }

    pub fn filter(&self) -> &UnitFilter {
        &self.filter
    }

    pub fn process(
        &self,
        unit: &CompilationUnit,
        config: &InstrumentationConfig,
        sink: &dyn DiagnosticSink,
    ) -> RewriteOutcome {
        let span = debug_span!("instrument", unit = %unit.name);
        let _enter = span.enter();

        if !self.filter.is_enabled(config) || !self.filter.is_eligible(unit) {
            debug!("skipped");
            return RewriteOutcome::Unchanged;
        }

        match self.rewrite(unit, config) {
            Ok(Some(bytes)) => {
                debug!(size = bytes.len(), "rewritten");
                RewriteOutcome::Rewritten(bytes)
            }
            Ok(None) => {
                debug!("no annotated elements");
                RewriteOutcome::Unchanged
            }
            Err(error) => {
                let diagnostic = Diagnostic::error(PRESENTABLE_NAME, unit.name.as_str(), error.to_string());
                warn!(%diagnostic, "instrumentation failed");
                sink.report(diagnostic.clone());
                RewriteOutcome::Failed(diagnostic)
            }
        }
    }

    /// Validate `config` once, then process every unit independently
    pub fn instrument_all(
        &self,
        units: &[CompilationUnit],
        config: &InstrumentationConfig,
        sink: &dyn DiagnosticSink,
    ) -> Result<Vec<RewriteOutcome>, ConfigError> {
        config.validate()?;
        debug!(units = units.len(), "{}", PROGRESS_MESSAGE);
        Ok(units
            .iter()
            .map(|unit| self.process(unit, config, sink))
            .collect())
    }

    fn rewrite(&self, unit: &CompilationUnit, config: &InstrumentationConfig) -> Result<Option<Vec<u8>>, UnitError> {
        let mut class = ClassFile::parse(&unit.bytes)?;

        let derived;
        let policy: &dyn InjectionPolicy = match &self.policy {
            Some(policy) => &**policy,
            None => match StaticValidatorPolicy::from_config(config) {
                Some(policy) => {
                    derived = policy;
                    &derived
                }
                None => return Ok(None),
            },
        };

        // Method bodies and annotations decode lazily; their corruption is
        // still a malformed unit
        let report = RewritingVisitor::new(config.marker_descriptor(), policy)
            .visit(&mut class)
            .map_err(|error| match error {
                InstrumentError::Malformed(error) => UnitError::Malformed(error),
                other => UnitError::Instrumentation(other),
            })?;
        if !report.mutated() {
            return Ok(None);
        }
        debug!(sites = report.sites, methods = report.methods, "woven");
        Ok(Some(class.to_bytes().map_err(InstrumentError::from)?))
    }
}
