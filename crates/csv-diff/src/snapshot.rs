//! Tabular snapshot loading
//!
//! Policy exports arrive in a few broken shapes. The most common is every
//! line wrapped in one pair of quotes with inner quotes doubled
//! (`"0107680260,""SMITH, JOHN"",TL"`), which a plain CSV reader puts entirely
//! into the first column. The loader detects that and re-parses after
//! unwrapping.

use std::collections::BTreeMap;

use csv::ReaderBuilder;
use tracing::debug;

use crate::DiffError;

/// Rows inspected when deciding whether a parse went wrong
const SHAPE_SAMPLE_ROWS: usize = 50;

/// Ordered rows plus header names. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvSnapshot {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvSnapshot {
    /// A snapshot with no columns and no rows, used when there is no baseline yet
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from already-split cells; cells are trimmed and rows padded or
    /// cut to the header width
    pub fn from_rows<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let headers: Vec<String> = headers
            .into_iter()
            .map(|h| h.as_ref().trim().to_string())
            .collect();
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|row| {
                let mut cells: Vec<String> = row
                    .into_iter()
                    .map(|c| c.as_ref().trim().to_string())
                    .take(width)
                    .collect();
                cells.resize(width, String::new());
                cells
            })
            .collect();
        Self { headers, rows }
    }

    /// Load CSV bytes: lossy UTF-8, BOM stripped, ragged rows tolerated
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DiffError> {
        let decoded = String::from_utf8_lossy(bytes);
        let text = decoded.trim_start_matches('\u{feff}');

        let direct = parse(text);
        let suspicious = match &direct {
            Ok(snapshot) => snapshot.rows.is_empty() || snapshot.mostly_in_first_column(),
            Err(_) => true,
        };

        if suspicious {
            if let Ok(unwrapped) = parse(&unwrap_quoted_lines(text)) {
                if !unwrapped.rows.is_empty() && !unwrapped.mostly_in_first_column() {
                    debug!(rows = unwrapped.rows.len(), "csv re-parsed after unwrapping quoted lines");
                    return Ok(unwrapped);
                }
            }
        }

        let snapshot = direct?;
        if snapshot.rows.is_empty() {
            return Err(DiffError::InvalidCsvSchema("no data rows".to_string()));
        }
        Ok(snapshot)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell text, empty when the column does not exist
    pub fn cell<'a>(&'a self, row: &'a [String], column: &str) -> &'a str {
        self.column_index(column)
            .and_then(|idx| row.get(idx))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// One row as a header → value map
    pub fn row_map(&self, row: &[String]) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .collect()
    }

    /// Most sampled rows have data in the first column only
    fn mostly_in_first_column(&self) -> bool {
        if self.rows.is_empty() {
            return false;
        }
        let sample = &self.rows[..self.rows.len().min(SHAPE_SAMPLE_ROWS)];
        let only_first = sample
            .iter()
            .filter(|row| {
                row.first().is_some_and(|c| !c.is_empty())
                    && row.iter().skip(1).all(|c| c.is_empty())
            })
            .count();
        only_first >= sample.len() / 2
    }
}

fn parse(text: &str) -> Result<CsvSnapshot, DiffError> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| DiffError::InvalidCsvSchema(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(String::is_empty) {
        return Err(DiffError::InvalidCsvSchema("missing header row".to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DiffError::InvalidCsvSchema(e.to_string()))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect::<Vec<String>>());
    }

    Ok(CsvSnapshot::from_rows(headers, rows))
}

/// Strip one pair of quotes around whole lines and undouble inner quotes
fn unwrap_quoted_lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.len() >= 2 && line.starts_with('"') && line.ends_with('"') {
                line[1..line.len() - 1].replace("\"\"", "\"")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
