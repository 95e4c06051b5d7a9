//! Classweave Instrument
//!
//! Build step that weaves runtime pattern checks into compiled classes.
//! Elements carrying the configured marker annotation (parameters, methods
//! for their return value, fields) get a call to a static validator woven in
//! where the value enters or leaves them.
//!
//! ## Example
//!
//! ```ignore
//! use classweave_instrument::{
//!     CollectingSink, CompilationUnit, InstrumentationConfig, PatternValidatorBuilder,
//! };
//!
//! let config = InstrumentationConfig::from_json_str(r#"{"mode": "assert"}"#)?;
//! let sink = CollectingSink::new();
//! let outcomes = PatternValidatorBuilder::new().instrument_all(&units, &config, &sink)?;
//! ```

pub mod builder;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod policy;
pub mod unit;
pub mod visitor;

pub use builder::{PatternValidatorBuilder, PRESENTABLE_NAME, PROGRESS_MESSAGE};
pub use config::{ConfigError, InstrumentationConfig, InstrumentationMode, ValidatorTarget};
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, Severity};
pub use error::{InstrumentError, UnitError};
pub use filter::UnitFilter;
pub use policy::{InjectionPolicy, InjectionSite, SiteKind, StaticValidatorPolicy};
pub use unit::{CompilationUnit, RewriteOutcome};
pub use visitor::{RewritingVisitor, VisitReport, INSTRUMENTED_ATTRIBUTE};
