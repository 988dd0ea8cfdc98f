use std::fmt;

use heapq_snapshot::HeapSnapshot;
use tracing::{debug, warn};

use crate::capabilities::HeapCapabilities;
use crate::compiler::{ArtifactSlot, QueryUnit, compile_query};
use crate::error::QueryError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Created,
    Compiled,
    Ran,
    Disposed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Compiled => "compiled",
            Self::Ran => "ran",
            Self::Disposed => "disposed",
        })
    }
}

/// Owns one snapshot and at most one compiled query.
///
/// States only move forward: `Created -> Compiled -> Ran -> Disposed`, and a
/// context never runs a second query. [`dispose`](Self::dispose) may be
/// called from any state, any number of times; dropping the context
/// disposes it.
pub struct ExecutionContext {
    heap: Option<Box<dyn HeapSnapshot>>,
    slot: ArtifactSlot,
    unit: Option<QueryUnit>,
    state: ContextState,
}

impl ExecutionContext {
    pub fn open(heap: Box<dyn HeapSnapshot>, slot: ArtifactSlot) -> Self {
        debug!(artifact = %slot.path().display(), "execution context created");
        Self {
            heap: Some(heap),
            slot,
            unit: None,
            state: ContextState::Created,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn compile(&mut self, query: &str) -> Result<(), QueryError> {
        self.expect_state("compile", ContextState::Created)?;
        self.unit = Some(compile_query(query, &self.slot)?);
        self.state = ContextState::Compiled;
        debug!("execution context compiled");
        Ok(())
    }

    /// Runs the compiled query. The context counts as ran whether or not
    /// the query faults.
    ///
    /// Lazy parts of the result read from the snapshot as they are
    /// enumerated, so render the value before disposing.
    pub fn execute(&mut self) -> Result<Value<'_>, QueryError> {
        self.expect_state("execute", ContextState::Compiled)?;
        self.state = ContextState::Ran;
        debug!("execution context ran");

        let (Some(heap), Some(unit)) = (self.heap.as_deref(), self.unit.as_ref()) else {
            return Err(QueryError::ContextState {
                operation: "execute",
                state: self.state,
            });
        };
        let result = unit.bind(HeapCapabilities::new(heap)).run();
        if let Err(err) = &result {
            warn!(error = %err, "query faulted");
        }
        Ok(result?)
    }

    /// Releases the snapshot, drops the compiled unit and removes the
    /// artifact. Later calls do nothing.
    pub fn dispose(&mut self) {
        if self.state == ContextState::Disposed {
            return;
        }
        if let Some(mut heap) = self.heap.take() {
            heap.release();
        }
        self.unit = None;
        if let Err(err) = self.slot.clear() {
            warn!(error = %err, "failed to remove query artifact");
        }
        debug!(from = %self.state, "execution context disposed");
        self.state = ContextState::Disposed;
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: ContextState,
    ) -> Result<(), QueryError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(QueryError::ContextState {
                operation,
                state: self.state,
            })
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use heapq_snapshot::{HeapObject, MemorySnapshot, TypeDescriptor};

    use super::*;
    use crate::error::ExecError;

    /// Wraps a snapshot and records when it is released.
    struct Tracked {
        inner: MemorySnapshot,
        releases: Arc<AtomicUsize>,
    }

    impl HeapSnapshot for Tracked {
        fn types(&self) -> Box<dyn Iterator<Item = &TypeDescriptor> + '_> {
            self.inner.types()
        }

        fn type_named(&self, name: &str) -> Option<&TypeDescriptor> {
            self.inner.type_named(name)
        }

        fn objects(&self) -> Box<dyn Iterator<Item = HeapObject<'_>> + '_> {
            self.inner.objects()
        }

        fn object_at(&self, address: u64) -> Option<HeapObject<'_>> {
            self.inner.object_at(address)
        }

        fn object_count(&self) -> usize {
            self.inner.object_count()
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.inner.release();
        }
    }

    fn context(label: &str) -> (ExecutionContext, Arc<AtomicUsize>) {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "heapq-context-{label}-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));
        let releases = Arc::new(AtomicUsize::new(0));
        let heap = Tracked {
            inner: MemorySnapshot::builder()
                .with_type(TypeDescriptor::new("Foo", vec![], vec![]).expect("valid type"))
                .with_object(0x100, "Foo", vec![])
                .build()
                .expect("valid snapshot"),
            releases: releases.clone(),
        };
        (
            ExecutionContext::open(Box::new(heap), ArtifactSlot::in_dir(dir)),
            releases,
        )
    }

    #[test]
    fn walks_the_states_in_order() {
        let (mut ctx, releases) = context("states");
        assert_eq!(ctx.state(), ContextState::Created);
        ctx.compile("allObjects().count()").expect("compiles");
        assert_eq!(ctx.state(), ContextState::Compiled);
        let artifact = ctx.slot.path().to_path_buf();
        assert!(artifact.exists());

        let rendered = ctx.execute().expect("runs").to_string();
        assert_eq!(rendered, "1");
        assert_eq!(ctx.state(), ContextState::Ran);

        ctx.dispose();
        assert_eq!(ctx.state(), ContextState::Disposed);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!artifact.exists());
    }

    #[test]
    fn a_context_runs_only_once() {
        let (mut ctx, _) = context("once");
        ctx.compile("allObjects()").expect("compiles");
        drop(ctx.execute().expect("runs"));
        let err = ctx.execute().err().expect("second run is refused");
        assert!(matches!(
            err,
            QueryError::ContextState {
                operation: "execute",
                state: ContextState::Ran
            }
        ));
        assert!(matches!(
            ctx.compile("allObjects()"),
            Err(QueryError::ContextState { .. })
        ));
    }

    #[test]
    fn dispose_is_idempotent() {
        let (mut ctx, releases) = context("twice");
        ctx.dispose();
        ctx.dispose();
        drop(ctx);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn execution_faults_still_leave_the_context_ran() {
        let (mut ctx, releases) = context("fault");
        ctx.compile("classRecord(\"Missing\")").expect("compiles");
        let err = ctx.execute().err().expect("faults");
        assert!(matches!(
            err,
            QueryError::ExecutionFailed(ExecError::TypeNotFound(ref name)) if name == "Missing"
        ));
        assert_eq!(ctx.state(), ContextState::Ran);
        drop(ctx);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_compile_can_still_be_disposed() {
        let (mut ctx, releases) = context("bad");
        assert!(ctx.compile("allObjects(").is_err());
        assert_eq!(ctx.state(), ContextState::Created);
        ctx.dispose();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!ctx.slot.path().exists());
    }
}
