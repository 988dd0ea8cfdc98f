//! Query execution over heap snapshots.
//!
//! A query is one expression in a small embedded language. It is compiled
//! into a [`QueryUnit`], run once inside an [`ExecutionContext`] that owns
//! the snapshot, and its untyped result is classified and streamed through
//! a [`RowFormatter`]. [`run_query`] does all of that in one call.

mod capabilities;
mod classify;
mod compiler;
mod config;
mod context;
mod error;
mod eval;
pub mod lang;
mod output;
mod packs;
mod record;
mod run;
mod value;

pub use capabilities::HeapCapabilities;
pub use classify::{QueryResult, render_result};
pub use compiler::{
    ARTIFACT_FILE_NAME, ArtifactSlot, BoundQuery, ENTRY_POINT, QueryUnit, compile_query,
    load_query, wrap_query,
};
pub use config::{DEFAULT_TABLE_WIDTH, QueryConfig, parse_width};
pub use context::{ContextState, ExecutionContext};
pub use error::{ExecError, QueryError};
pub use eval::Closure;
pub use output::{Cell, OutputFormat, RowFormatter, StructuredFormatter, TabularFormatter};
pub use packs::{QUERY_PACKS, QueryPack, pack_names, query_pack};
pub use record::{ClassRecord, InstanceRecord};
pub use run::run_query;
pub use value::{Sequence, ShapeRecord, Value, format_address};
