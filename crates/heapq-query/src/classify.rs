//! Result classification and rendering.
//!
//! A query returns one untyped [`Value`]. It is classified once, after
//! execution, and every element of a sequence is classified again on its
//! own, so sequences mixing addresses, records and plain values render
//! element by element.

use std::io::Write;

use heapq_snapshot::FieldValue;

use crate::error::QueryError;
use crate::output::{Cell, RowFormatter};
use crate::value::{Sequence, Value, format_address};

pub enum QueryResult<'h> {
    Address(u64),
    Sequence(Sequence<'h>),
    /// A single shape, or an object or class rendered as one.
    Record(Vec<Cell>),
    Scalar(Value<'h>),
}

impl<'h> QueryResult<'h> {
    pub fn classify(value: Value<'h>) -> Self {
        match value {
            Value::Address(address) => Self::Address(address),
            Value::Seq(sequence) => Self::Sequence(sequence),
            other => match record_cells(&other) {
                Some(cells) => Self::Record(cells),
                None => Self::Scalar(other),
            },
        }
    }
}

enum Element {
    Address(u64),
    Record(Vec<Cell>),
    Text(String),
}

impl Element {
    fn classify(value: &Value<'_>) -> Self {
        match value {
            Value::Address(address) => Self::Address(*address),
            other => match record_cells(other) {
                Some(cells) => Self::Record(cells),
                None => Self::Text(other.to_string()),
            },
        }
    }
}

/// Streams `value` through `formatter` into `sink`, then writes the
/// trailing `Rows: N` line. Returns N.
///
/// A fault raised while a lazy sequence is enumerated stops rendering and
/// is returned as [`QueryError::ExecutionFailed`]; the row count line is
/// not written in that case.
pub fn render_result(
    value: Value<'_>,
    formatter: &mut dyn RowFormatter,
    sink: &mut dyn Write,
) -> Result<usize, QueryError> {
    let rows = match QueryResult::classify(value) {
        QueryResult::Address(address) => {
            writeln!(sink, "{}", format_address(address))?;
            1
        }
        QueryResult::Record(cells) => {
            formatter.print_header(sink, &names(&cells))?;
            formatter.print_row(sink, &cells)?;
            1
        }
        QueryResult::Scalar(value) => {
            writeln!(sink, "{value}")?;
            1
        }
        QueryResult::Sequence(sequence) => {
            let mut rows = 0;
            let mut header_written = false;
            for item in sequence {
                match Element::classify(&item?) {
                    Element::Address(address) => writeln!(sink, "{}", format_address(address))?,
                    Element::Record(cells) => {
                        if !header_written {
                            formatter.print_header(sink, &names(&cells))?;
                            header_written = true;
                        }
                        formatter.print_row(sink, &cells)?;
                    }
                    Element::Text(text) => writeln!(sink, "{text}")?,
                }
                rows += 1;
            }
            rows
        }
    };
    writeln!(sink, "Rows: {rows}")?;
    Ok(rows)
}

fn names(cells: &[Cell]) -> Vec<&str> {
    cells.iter().map(|cell| cell.name.as_str()).collect()
}

// Records without any fields have nothing to tabulate and render as text.
fn record_cells(value: &Value<'_>) -> Option<Vec<Cell>> {
    let cells: Vec<Cell> = match value {
        Value::Shape(shape) => shape
            .fields()
            .iter()
            .map(|(name, value)| Cell::new(name.clone(), value.to_string()))
            .collect(),
        Value::Instance(record) => record
            .type_of()
            .fields()
            .iter()
            .zip(record.raw_values())
            .map(|(field, raw)| Cell::new(field.name.as_str(), raw_text(raw)))
            .collect(),
        Value::Class(record) => record
            .type_of()
            .statics()
            .iter()
            .map(|field| Cell::new(field.name.as_str(), raw_text(&field.value)))
            .collect(),
        _ => return None,
    };
    if cells.is_empty() { None } else { Some(cells) }
}

// Rendering never follows references, so a dangling one cannot fail a row.
fn raw_text(raw: &FieldValue) -> String {
    match raw {
        FieldValue::Null => "null".to_string(),
        FieldValue::Bool(value) => value.to_string(),
        FieldValue::Int(value) => value.to_string(),
        FieldValue::Float(value) => value.to_string(),
        FieldValue::Str(value) => value.clone(),
        FieldValue::Ref(address) => format_address(*address),
    }
}
