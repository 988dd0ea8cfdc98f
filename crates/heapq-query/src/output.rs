//! Row formatters for rendered query results.

use std::io::{self, Write};
use std::str::FromStr;

use compact_str::CompactString;

use crate::error::QueryError;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Fixed-width columns under one header line.
    #[default]
    Tabular,
    /// One bracketed block of `name = value` lines per row.
    Structured,
}

impl OutputFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::Tabular => "table",
            Self::Structured => "structured",
        }
    }

    /// Every accepted spelling, for help and error text.
    pub fn all_names() -> &'static [&'static str] {
        &["table", "tabular", "structured", "struct"]
    }

    pub fn formatter(self, width: usize) -> Box<dyn RowFormatter> {
        match self {
            Self::Tabular => Box::new(TabularFormatter::new(width)),
            Self::Structured => Box::new(StructuredFormatter),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" | "tabular" => Ok(Self::Tabular),
            "structured" | "struct" => Ok(Self::Structured),
            _ => Err(QueryError::UnsupportedOutputFormat(s.to_string())),
        }
    }
}

/// One named, already rendered value of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub name: CompactString,
    pub text: String,
}

impl Cell {
    pub fn new(name: impl Into<CompactString>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

pub trait RowFormatter {
    fn print_header(&mut self, sink: &mut dyn Write, names: &[&str]) -> io::Result<()>;
    fn print_row(&mut self, sink: &mut dyn Write, cells: &[Cell]) -> io::Result<()>;
}

/// Splits a fixed total width evenly across the row's fields.
///
/// Every column but the last is cut or padded to exactly its share of the
/// width; the last is written whole.
#[derive(Debug, Clone, Copy)]
pub struct TabularFormatter {
    width: usize,
}

impl TabularFormatter {
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    pub fn column_width(&self, columns: usize) -> usize {
        (self.width / columns.max(1)).max(1)
    }

    fn write_line<'a>(
        &self,
        sink: &mut dyn Write,
        texts: impl ExactSizeIterator<Item = &'a str>,
    ) -> io::Result<()> {
        let columns = texts.len();
        let column = self.column_width(columns);
        let mut line = String::with_capacity(self.width);
        for (index, text) in texts.enumerate() {
            if index + 1 == columns {
                line.push_str(text);
            } else {
                line.push_str(&fit(text, column));
            }
        }
        writeln!(sink, "{line}")
    }
}

// Truncates or pads to exactly `width` characters. Columns carry no
// separator, so a value that fills its column runs into the next one.
fn fit(text: &str, width: usize) -> String {
    let mut fitted: String = text.chars().take(width).collect();
    let used = fitted.chars().count();
    fitted.extend(std::iter::repeat_n(' ', width - used));
    fitted
}

impl RowFormatter for TabularFormatter {
    fn print_header(&mut self, sink: &mut dyn Write, names: &[&str]) -> io::Result<()> {
        self.write_line(sink, names.iter().copied())
    }

    fn print_row(&mut self, sink: &mut dyn Write, cells: &[Cell]) -> io::Result<()> {
        self.write_line(sink, cells.iter().map(|cell| cell.text.as_str()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredFormatter;

impl RowFormatter for StructuredFormatter {
    fn print_header(&mut self, _sink: &mut dyn Write, _names: &[&str]) -> io::Result<()> {
        Ok(())
    }

    fn print_row(&mut self, sink: &mut dyn Write, cells: &[Cell]) -> io::Result<()> {
        writeln!(sink, "{{")?;
        for cell in cells {
            writeln!(sink, "  {} = {}", cell.name, cell.text)?;
        }
        writeln!(sink, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(formatter: &mut dyn RowFormatter, names: &[&str], rows: &[&[&str]]) -> String {
        let mut out = Vec::new();
        formatter.print_header(&mut out, names).expect("header");
        for row in rows {
            let cells: Vec<Cell> = names
                .iter()
                .zip(row.iter())
                .map(|(name, text)| Cell::new(*name, *text))
                .collect();
            formatter.print_row(&mut out, &cells).expect("row");
        }
        String::from_utf8(out).expect("utf-8")
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("table".parse::<OutputFormat>().ok(), Some(OutputFormat::Tabular));
        assert_eq!("Structured".parse::<OutputFormat>().ok(), Some(OutputFormat::Structured));
        let err = "bogus".parse::<OutputFormat>().expect_err("unknown");
        assert!(matches!(err, QueryError::UnsupportedOutputFormat(ref name) if name == "bogus"));
        assert!(err.to_string().contains("table, tabular, structured, struct"));
    }

    #[test]
    fn tabular_truncates_all_but_the_last_column() {
        let mut formatter = TabularFormatter::new(20);
        let out = render(
            &mut formatter,
            &["name", "kind"],
            &[&["averyveryverylongtypename", "a value far wider than ten characters"]],
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "name      kind");
        assert_eq!(lines[1], "averyveryva value far wider than ten characters");
    }

    #[test]
    fn values_exactly_as_wide_as_their_column_are_kept_whole() {
        let mut formatter = TabularFormatter::new(20);
        let out = render(&mut formatter, &["a", "b"], &[&["0123456789", "tail"]]);
        assert_eq!(out.lines().nth(1), Some("0123456789tail"));
    }

    #[test]
    fn tabular_columns_never_shrink_below_one() {
        let formatter = TabularFormatter::new(2);
        assert_eq!(formatter.column_width(5), 1);
        assert_eq!(fit("xyz", 1), "x");
        assert_eq!(fit("", 3), "   ");
    }

    #[test]
    fn structured_prints_blocks_without_header() {
        let out = render(&mut StructuredFormatter, &["Bar", "Baz"], &[&["1", "x"], &["2", "y"]]);
        insta::assert_snapshot!(out, @r"
        {
          Bar = 1
          Baz = x
        }
        {
          Bar = 2
          Baz = y
        }
        ");
    }
}
