//! Query compiler and loader.
//!
//! The query text is embedded in a fixed `unit run { ... }` wrapper, written
//! to the artifact slot, then read back, parsed and resolved into a
//! [`QueryUnit`]. Diagnostics refer to positions in the wrapped source.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::capabilities::HeapCapabilities;
use crate::error::{ExecError, QueryError};
use crate::eval::{Env, Evaluator};
use crate::lang::ast::Expr;
use crate::lang::lexer::lex;
use crate::lang::parser::parse_unit;
use crate::lang::{Diagnostic, render_all, resolve};
use crate::value::Value;

pub const ARTIFACT_FILE_NAME: &str = "query_unit.hq";

/// Name of the single entry point every wrapped query declares.
pub const ENTRY_POINT: &str = "run";

// All contexts share one artifact file name, so compiles are serialized.
static COMPILE_LOCK: Mutex<()> = Mutex::new(());

/// Embeds `query` verbatim into the wrapper.
pub fn wrap_query(query: &str) -> String {
    format!("unit {ENTRY_POINT} {{\n{query}\n}}\n")
}

/// Where one context's generated source lives.
#[derive(Debug, Clone)]
pub struct ArtifactSlot {
    path: PathBuf,
}

impl ArtifactSlot {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(ARTIFACT_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the artifact. Returns whether there was one to remove.
    pub fn clear(&self) -> Result<bool, QueryError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed query artifact");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(QueryError::Artifact {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, source: &str) -> Result<(), QueryError> {
        let artifact_error = |source| QueryError::Artifact {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(artifact_error)?;
        }
        fs::write(&self.path, source).map_err(artifact_error)?;
        debug!(path = %self.path.display(), bytes = source.len(), "wrote query artifact");
        Ok(())
    }

    fn read(&self) -> Result<String, QueryError> {
        fs::read_to_string(&self.path).map_err(|source| QueryError::Artifact {
            path: self.path.clone(),
            source,
        })
    }
}

/// A compiled query, independent of any snapshot.
#[derive(Debug, Clone)]
pub struct QueryUnit {
    body: Rc<Expr>,
}

impl QueryUnit {
    pub fn bind<'h>(&self, caps: HeapCapabilities<'h>) -> BoundQuery<'h> {
        BoundQuery {
            body: self.body.clone(),
            evaluator: Evaluator::new(caps),
        }
    }
}

/// A unit bound to one snapshot's capabilities, ready to run.
pub struct BoundQuery<'h> {
    body: Rc<Expr>,
    evaluator: Evaluator<'h>,
}

impl<'h> BoundQuery<'h> {
    pub fn run(&self) -> Result<Value<'h>, ExecError> {
        self.evaluator.eval(&self.body, &Env::default())
    }
}

/// Writes the wrapped query to `slot` and loads it back as a [`QueryUnit`].
pub fn compile_query(query: &str, slot: &ArtifactSlot) -> Result<QueryUnit, QueryError> {
    let _guard = COMPILE_LOCK.lock();
    if query.trim().is_empty() {
        return Err(QueryError::CompilationFailed {
            error_count: 1,
            diagnostics: "error: query text is empty\n".to_string(),
        });
    }
    slot.write(&wrap_query(query))?;
    load_query(slot)
}

/// Reads the artifact in `slot` and compiles it into an invocable unit.
pub fn load_query(slot: &ArtifactSlot) -> Result<QueryUnit, QueryError> {
    let source = slot.read()?;
    let (tokens, mut diagnostics) = lex(&source);

    let mut body = None;
    match parse_unit(&tokens) {
        Ok(unit) if unit.name != ENTRY_POINT => diagnostics.push(Diagnostic::new(
            0..source.chars().count(),
            format!("expected entry point `{ENTRY_POINT}`, found `{}`", unit.name),
        )),
        Ok(unit) => {
            diagnostics.extend(resolve(&unit.body));
            body = Some(unit.body);
        }
        Err(diagnostic) => diagnostics.push(diagnostic),
    }

    match body {
        Some(body) if diagnostics.is_empty() => {
            info!(path = %slot.path().display(), "query compiled");
            Ok(QueryUnit { body })
        }
        _ => {
            warn!(errors = diagnostics.len(), "query compilation failed");
            Err(QueryError::CompilationFailed {
                error_count: diagnostics.len(),
                diagnostics: render_all(&source, &diagnostics),
            })
        }
    }
}
