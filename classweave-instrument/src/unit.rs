//! Compilation units and per-unit results

use classweave_bytecode::ClassFile;

use crate::diagnostics::Diagnostic;

/// One compiled class as handed over by the build orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationUnit {
    /// Qualified class name, e.g. `com.example.Foo` or `module-info`
    pub name: String,
    pub bytes: Vec<u8>,
}

impl CompilationUnit {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// `(major, minor)` read from the header alone
    pub fn format_version(&self) -> Option<(u16, u16)> {
        ClassFile::peek_version(&self.bytes)
    }
}

/// Result of processing one unit.
///
/// `Rewritten` is produced only when at least one check was woven in; the
/// orchestrator keeps the original bytes for the other two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    Unchanged,
    Rewritten(Vec<u8>),
    /// Carries the same diagnostic that was reported to the sink
    Failed(Diagnostic),
}

impl RewriteOutcome {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, RewriteOutcome::Unchanged)
    }

    pub fn is_rewritten(&self) -> bool {
        matches!(self, RewriteOutcome::Rewritten(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RewriteOutcome::Failed(_))
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            RewriteOutcome::Rewritten(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            RewriteOutcome::Failed(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }
}
