use std::fmt;
use std::io;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, EpgmError>;

/// Errors produced while building, planning or executing queries and while
/// loading graphs, statistics or configuration.
///
/// Syntax and binding errors are raised before any dataflow work starts;
/// execution errors only after the job has terminated.
#[derive(Debug, Error)]
pub enum EpgmError {
    /// Malformed pattern or graph text.
    #[error("syntax error at position {position}: {message}")]
    QuerySyntax {
        /// Byte offset of the offending token in the input.
        position: usize,
        /// Description of what was expected or found.
        message: String,
    },
    /// A variable was declared more than once or with conflicting roles.
    #[error("duplicate variable '{var}': {reason}")]
    DuplicateVariable {
        /// Offending variable name.
        var: String,
        /// Why the second declaration conflicts.
        reason: &'static str,
    },
    /// A predicate or edge endpoint references an undeclared variable.
    #[error("unresolved variable '{var}' referenced in {context}")]
    UnresolvedVariable {
        /// Variable that could not be resolved.
        var: String,
        /// Where the reference occurred.
        context: &'static str,
    },
    /// The pattern cannot be evaluated by the available operators.
    #[error("unsupported pattern: {0}")]
    UnsupportedPattern(String),
    /// No cardinality entry exists for the requested key.
    #[error("statistics unavailable for {0}")]
    StatisticsUnavailable(String),
    /// The dataflow job failed.
    #[error("execution failed: {0}")]
    Execution(String),
    /// The dataflow job was cancelled through its token.
    #[error("execution cancelled")]
    Cancelled,
    /// Graph data violates a model invariant (e.g. dangling edge).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
    /// Configuration could not be parsed or is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Filesystem failure while reading inputs.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Malformed CSV statistics file.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// Malformed JSON document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EpgmError {
    /// Builds a [`EpgmError::QuerySyntax`] at `position`.
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        EpgmError::QuerySyntax {
            position,
            message: message.into(),
        }
    }

    /// Builds a [`EpgmError::UnresolvedVariable`] for a specific context.
    pub fn unresolved(var: impl Into<String>, context: &'static str) -> Self {
        EpgmError::UnresolvedVariable {
            var: var.into(),
            context,
        }
    }

    /// Builds a [`EpgmError::DuplicateVariable`].
    pub fn duplicate(var: impl Into<String>, reason: &'static str) -> Self {
        EpgmError::DuplicateVariable {
            var: var.into(),
            reason,
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            EpgmError::QuerySyntax { .. } => "QuerySyntax",
            EpgmError::DuplicateVariable { .. } => "DuplicateVariable",
            EpgmError::UnresolvedVariable { .. } => "UnresolvedVariable",
            EpgmError::UnsupportedPattern(_) => "UnsupportedPattern",
            EpgmError::StatisticsUnavailable(_) => "StatisticsUnavailable",
            EpgmError::Execution(_) => "ExecutionFailure",
            EpgmError::Cancelled => "Cancelled",
            EpgmError::InvalidGraph(_) => "InvalidGraph",
            EpgmError::Config(_) => "Config",
            EpgmError::Io(_) => "Io",
            EpgmError::Csv(_) => "Csv",
            EpgmError::Json(_) => "Json",
        }
    }

    /// Returns true for errors detected before execution starts.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            EpgmError::QuerySyntax { .. }
                | EpgmError::DuplicateVariable { .. }
                | EpgmError::UnresolvedVariable { .. }
                | EpgmError::UnsupportedPattern(_)
        )
    }
}

/// Convenience wrapper that formats errors with their codes.
pub struct EpgmErrorWithCode<'a>(pub &'a EpgmError);

impl fmt::Display for EpgmErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
