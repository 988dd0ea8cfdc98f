//! Heap snapshot model for heapq.
//!
//! A snapshot is a finite, read-only set of typed objects plus the type
//! catalog that describes them. Snapshots come from dump files or from a
//! live process's agent; everything downstream sees them only through the
//! [`HeapSnapshot`] trait.

mod dump;
mod heap;
mod model;
mod provider;

pub use dump::{ObjectDump, SnapshotDump, TypeDump};
pub use heap::{HeapSnapshot, MemorySnapshot, MemorySnapshotBuilder};
pub use model::{
    FieldDescriptor, FieldKind, FieldValue, HeapObject, InvariantError, StaticField,
    TypeDescriptor,
};
pub use provider::{DEFAULT_ATTACH_TIMEOUT, SnapshotSource, SnapshotUnavailable, open_snapshot};
