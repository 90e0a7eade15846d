use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::key::{resolve_pair, KeyColumns};
use crate::snapshot::CsvSnapshot;
use crate::DiffError;

/// Default allowed drift for numeric columns
pub const DEFAULT_NUMERIC_TOLERANCE: f64 = 0.01;

/// Which side of a comparison something came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Baseline,
    Candidate,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Baseline => f.write_str("baseline"),
            Side::Candidate => f.write_str("candidate"),
        }
    }
}

/// Key cell values of one row, in key-column order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(pub Vec<String>);

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" | "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub key: RowKey,
    pub kind: ChangeKind,
    /// Differing fields, only for `modified`
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub changes: Vec<FieldChange>,
    /// Full row: candidate row for `added`, baseline row for `removed`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub row: Option<BTreeMap<String, String>>,
}

/// Non-fatal conditions found while indexing rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DiffWarning {
    /// The same key appears more than once in one snapshot; the key is left
    /// out of the entries
    AmbiguousKey {
        key: RowKey,
        snapshot: Side,
        count: usize,
    },
    /// A row whose key cells are all empty (1-based data row number)
    MissingKey { snapshot: Side, row: usize },
}

impl fmt::Display for DiffWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffWarning::AmbiguousKey {
                key,
                snapshot,
                count,
            } => write!(f, "key '{}' appears {} times in {} snapshot", key, count, snapshot),
            DiffWarning::MissingKey { snapshot, row } => {
                write!(f, "row {} of {} snapshot has an empty key", row, snapshot)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub total_changes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub key_columns: Vec<String>,
    pub entries: Vec<DiffEntry>,
    pub warnings: Vec<DiffWarning>,
    pub summary: DiffSummary,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys_of(&self, kind: ChangeKind) -> BTreeSet<RowKey> {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.key.clone())
            .collect()
    }
}

/// How cell values are compared
#[derive(Debug, Clone, PartialEq)]
pub struct CompareOptions {
    /// Columns compared as numbers within `tolerance`
    pub numeric_columns: Vec<String>,
    pub tolerance: f64,
    pub case_insensitive: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            numeric_columns: Vec::new(),
            tolerance: DEFAULT_NUMERIC_TOLERANCE,
            case_insensitive: false,
        }
    }
}

impl CompareOptions {
    fn values_equal(&self, column: &str, before: &str, after: &str) -> bool {
        if self.numeric_columns.iter().any(|c| c == column) {
            if let (Some(a), Some(b)) = (numeric(before), numeric(after)) {
                return (a - b).abs() <= self.tolerance;
            }
        }
        if self.case_insensitive {
            before.to_lowercase() == after.to_lowercase()
        } else {
            before == after
        }
    }
}

/// Blank counts as zero; thousands separators are ignored
fn numeric(value: &str) -> Option<f64> {
    let cleaned = value.trim().replace(',', "");
    if cleaned.is_empty() {
        return Some(0.0);
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

struct KeyIndex<'a> {
    rows: BTreeMap<RowKey, &'a [String]>,
    ambiguous: BTreeSet<RowKey>,
}

fn index_rows<'a>(
    snapshot: &'a CsvSnapshot,
    key_columns: &[String],
    side: Side,
    warnings: &mut Vec<DiffWarning>,
) -> KeyIndex<'a> {
    let mut grouped: BTreeMap<RowKey, Vec<&'a [String]>> = BTreeMap::new();

    for (i, row) in snapshot.rows().iter().enumerate() {
        let key = RowKey(
            key_columns
                .iter()
                .map(|c| snapshot.cell(row, c).to_string())
                .collect(),
        );
        if key.0.iter().all(String::is_empty) {
            warnings.push(DiffWarning::MissingKey {
                snapshot: side,
                row: i + 1,
            });
            continue;
        }
        grouped.entry(key).or_default().push(row.as_slice());
    }

    let mut index = KeyIndex {
        rows: BTreeMap::new(),
        ambiguous: BTreeSet::new(),
    };
    for (key, rows) in grouped {
        if rows.len() > 1 {
            warnings.push(DiffWarning::AmbiguousKey {
                key: key.clone(),
                snapshot: side,
                count: rows.len(),
            });
            index.ambiguous.insert(key);
        } else {
            index.rows.insert(key, rows[0]);
        }
    }
    index
}

fn check_key_columns(
    snapshot: &CsvSnapshot,
    key_columns: &[String],
    side: Side,
) -> Result<(), DiffError> {
    // A snapshot without columns is an empty baseline
    if snapshot.headers().is_empty() {
        return Ok(());
    }
    let missing: Vec<String> = key_columns
        .iter()
        .filter(|c| snapshot.column_index(c).is_none())
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DiffError::MissingKeyColumns {
            snapshot: side,
            columns: missing,
        })
    }
}

/// Keyed field-level difference from `baseline` to `candidate`.
///
/// Entries are sorted by key. Keys that are ambiguous in either snapshot are
/// reported as warnings and produce no entry.
pub fn diff(
    baseline: &CsvSnapshot,
    candidate: &CsvSnapshot,
    keys: &KeyColumns,
    options: &CompareOptions,
) -> Result<DiffReport, DiffError> {
    let key_columns = resolve_pair(keys, baseline, candidate);
    if key_columns.is_empty() {
        return Err(DiffError::InvalidCsvSchema(
            "no key columns could be selected".to_string(),
        ));
    }
    check_key_columns(baseline, &key_columns, Side::Baseline)?;
    check_key_columns(candidate, &key_columns, Side::Candidate)?;

    let mut compared: Vec<String> = Vec::new();
    for header in candidate.headers().iter().chain(baseline.headers()) {
        if !key_columns.contains(header) && !compared.contains(header) {
            compared.push(header.clone());
        }
    }

    let mut warnings = Vec::new();
    let before = index_rows(baseline, &key_columns, Side::Baseline, &mut warnings);
    let after = index_rows(candidate, &key_columns, Side::Candidate, &mut warnings);

    let all_keys: BTreeSet<&RowKey> = before.rows.keys().chain(after.rows.keys()).collect();
    let mut entries = Vec::new();

    for key in all_keys {
        if before.ambiguous.contains(key) || after.ambiguous.contains(key) {
            continue;
        }
        match (before.rows.get(key), after.rows.get(key)) {
            (None, Some(row)) => entries.push(DiffEntry {
                key: key.clone(),
                kind: ChangeKind::Added,
                changes: Vec::new(),
                row: Some(candidate.row_map(row)),
            }),
            (Some(row), None) => entries.push(DiffEntry {
                key: key.clone(),
                kind: ChangeKind::Removed,
                changes: Vec::new(),
                row: Some(baseline.row_map(row)),
            }),
            (Some(old), Some(new)) => {
                let changes: Vec<FieldChange> = compared
                    .iter()
                    .filter_map(|column| {
                        let was = baseline.cell(old, column);
                        let now = candidate.cell(new, column);
                        (!options.values_equal(column, was, now)).then(|| FieldChange {
                            field: column.clone(),
                            before: was.to_string(),
                            after: now.to_string(),
                        })
                    })
                    .collect();
                if !changes.is_empty() {
                    entries.push(DiffEntry {
                        key: key.clone(),
                        kind: ChangeKind::Modified,
                        changes,
                        row: None,
                    });
                }
            }
            (None, None) => {}
        }
    }

    let count = |kind| entries.iter().filter(|e: &&DiffEntry| e.kind == kind).count();
    let summary = DiffSummary {
        added: count(ChangeKind::Added),
        removed: count(ChangeKind::Removed),
        modified: count(ChangeKind::Modified),
        total_changes: entries.len(),
    };

    debug!(
        added = summary.added,
        removed = summary.removed,
        modified = summary.modified,
        warnings = warnings.len(),
        "snapshots compared"
    );

    Ok(DiffReport {
        key_columns,
        entries,
        warnings,
        summary,
    })
}
