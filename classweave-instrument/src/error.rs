//! Unit-local failures
//!
//! Both kinds are caught at the driver boundary and turned into exactly one
//! diagnostic; neither ever aborts the build.

use classweave_bytecode::BytecodeError;
use thiserror::Error;

/// The visitor could not safely complete a rewrite
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    #[error("{0}")]
    Malformed(#[from] BytecodeError),

    #[error("Cannot instrument {site}: {reason}")]
    Unsupported { site: String, reason: String },

    #[error("Marker on {site} has no String `value` element")]
    MissingPattern { site: String },

    #[error("Class {0} was already instrumented")]
    AlreadyInstrumented(String),
}

impl InstrumentError {
    pub fn unsupported(site: impl Into<String>, reason: impl Into<String>) -> Self {
        InstrumentError::Unsupported {
            site: site.into(),
            reason: reason.into(),
        }
    }
}

/// Everything that can go wrong while processing a single unit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("Failed to parse class file: {0}")]
    Malformed(#[from] BytecodeError),

    #[error("{0}")]
    Instrumentation(#[from] InstrumentError),
}
