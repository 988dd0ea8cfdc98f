use std::path::PathBuf;

pub const SCRATCH_DIR_ENV: &str = "HEAPQ_SCRATCH_DIR";
pub const TABLE_WIDTH_ENV: &str = "HEAPQ_TABLE_WIDTH";
pub const DEFAULT_TABLE_WIDTH: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Directory holding the compiled-artifact slot.
    pub scratch_dir: PathBuf,
    /// Total line width the tabular formatter divides across columns.
    pub table_width: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("heapq"),
            table_width: DEFAULT_TABLE_WIDTH,
        }
    }
}

impl QueryConfig {
    /// Defaults, overridden by `HEAPQ_SCRATCH_DIR` and `HEAPQ_TABLE_WIDTH`.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(dir) = lookup(SCRATCH_DIR_ENV).filter(|dir| !dir.is_empty()) {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(width) = lookup(TABLE_WIDTH_ENV) {
            config.table_width = parse_width(&width)
                .map_err(|e| format!("invalid {TABLE_WIDTH_ENV}={width:?}: {e}"))?;
        }
        Ok(config)
    }
}

/// Parses a positive column width.
pub fn parse_width(text: &str) -> Result<usize, String> {
    match text.trim().parse::<usize>() {
        Ok(0) => Err("width must be at least 1".to_string()),
        Ok(width) => Ok(width),
        Err(e) => Err(e.to_string()),
    }
}
