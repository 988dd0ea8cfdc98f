use std::io::Write;

use heapq_snapshot::HeapSnapshot;
use tracing::info;

use crate::classify::render_result;
use crate::compiler::ArtifactSlot;
use crate::config::QueryConfig;
use crate::context::ExecutionContext;
use crate::error::QueryError;
use crate::output::OutputFormat;

/// Compiles `query`, runs it once against `heap` and renders the result
/// into `sink`. Returns the number of rows written.
///
/// `format` is checked before anything else. The snapshot is released
/// and the artifact removed whether the query succeeds or not.
pub fn run_query(
    mut heap: Box<dyn HeapSnapshot>,
    query: &str,
    format: &str,
    sink: &mut dyn Write,
    config: &QueryConfig,
) -> Result<usize, QueryError> {
    let format: OutputFormat = match format.parse() {
        Ok(format) => format,
        Err(err) => {
            heap.release();
            return Err(err);
        }
    };

    let mut context = ExecutionContext::open(heap, ArtifactSlot::in_dir(&config.scratch_dir));
    let outcome = compile_and_render(&mut context, query, format, config.table_width, sink);
    context.dispose();
    outcome
}

fn compile_and_render(
    context: &mut ExecutionContext,
    query: &str,
    format: OutputFormat,
    width: usize,
    sink: &mut dyn Write,
) -> Result<usize, QueryError> {
    context.compile(query)?;
    let value = context.execute()?;
    let mut formatter = format.formatter(width);
    let rows = render_result(value, formatter.as_mut(), sink)?;
    sink.flush()?;
    info!(rows, format = format.name(), "query rendered");
    Ok(rows)
}
