use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use heapq_snapshot::SnapshotUnavailable;

use crate::context::ContextState;

/// Faults raised while a query body runs against a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecError {
    TypeNotFound(String),
    FieldNotFound {
        owner: String,
        field: String,
    },
    InvalidObjectAddress(u64),
    NullReference {
        field: String,
    },
    TypeMismatch {
        context: String,
        expected: &'static str,
        found: &'static str,
    },
    DivisionByZero,
    IntegerOverflow,
    /// A sequence was pulled from while it was already being iterated.
    SequenceBusy,
    UnboundIdentifier(String),
    UnknownFunction(String),
    UnknownMethod {
        receiver: &'static str,
        method: String,
    },
}

impl ExecError {
    pub(crate) fn mismatch(
        context: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeNotFound(name) => write!(f, "no type named {name} in snapshot"),
            Self::FieldNotFound { owner, field } => write!(f, "{owner} has no field {field}"),
            Self::InvalidObjectAddress(address) => {
                write!(f, "0x{address:x} is not the start of a live object")
            }
            Self::NullReference { field } => write!(f, "cannot read {field} through null"),
            Self::TypeMismatch {
                context,
                expected,
                found,
            } => write!(f, "{context}: expected {expected}, found {found}"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::SequenceBusy => write!(f, "sequence is already being iterated"),
            Self::UnboundIdentifier(name) => write!(f, "unbound identifier {name}"),
            Self::UnknownFunction(name) => write!(f, "unknown function {name}"),
            Self::UnknownMethod { receiver, method } => {
                write!(f, "{receiver} has no method {method}")
            }
        }
    }
}

impl Error for ExecError {}

#[derive(Debug)]
pub enum QueryError {
    SnapshotUnavailable(SnapshotUnavailable),
    CompilationFailed {
        error_count: usize,
        diagnostics: String,
    },
    ExecutionFailed(ExecError),
    UnsupportedOutputFormat(String),
    UnknownPack(String),
    ContextState {
        operation: &'static str,
        state: ContextState,
    },
    Artifact {
        path: PathBuf,
        source: io::Error,
    },
    Io(io::Error),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SnapshotUnavailable(inner) => write!(f, "{inner}"),
            Self::CompilationFailed {
                error_count,
                diagnostics,
            } => {
                let plural = if *error_count == 1 { "" } else { "s" };
                write!(
                    f,
                    "query compilation failed with {error_count} error{plural}:\n{diagnostics}"
                )
            }
            Self::ExecutionFailed(inner) => write!(f, "query execution failed: {inner}"),
            Self::UnsupportedOutputFormat(name) => write!(
                f,
                "unsupported output format {name:?} (expected one of: {})",
                crate::output::OutputFormat::all_names().join(", ")
            ),
            Self::UnknownPack(name) => write!(
                f,
                "unknown query pack {name:?} (known packs: {})",
                crate::packs::pack_names().join(", ")
            ),
            Self::ContextState { operation, state } => {
                write!(f, "cannot {operation} an execution context that is {state}")
            }
            Self::Artifact { path, source } => {
                write!(f, "query artifact {}: {source}", path.display())
            }
            Self::Io(inner) => write!(f, "write query output: {inner}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SnapshotUnavailable(inner) => Some(inner),
            Self::ExecutionFailed(inner) => Some(inner),
            Self::Artifact { source, .. } => Some(source),
            Self::Io(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<ExecError> for QueryError {
    fn from(value: ExecError) -> Self {
        Self::ExecutionFailed(value)
    }
}

impl From<SnapshotUnavailable> for QueryError {
    fn from(value: SnapshotUnavailable) -> Self {
        Self::SnapshotUnavailable(value)
    }
}

impl From<io::Error> for QueryError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
