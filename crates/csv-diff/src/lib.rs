//! Keyed comparison of tabular snapshots
//!
//! ```
//! use csv_diff::{diff, ChangeKind, CompareOptions, CsvSnapshot, KeyColumns};
//!
//! let baseline = CsvSnapshot::from_bytes(b"id,qty\nA,5\nB,3\n").unwrap();
//! let candidate = CsvSnapshot::from_bytes(b"id,qty\nA,7\nC,1\n").unwrap();
//!
//! let report = diff(&baseline, &candidate, &KeyColumns::First, &CompareOptions::default()).unwrap();
//! let kinds: Vec<_> = report.entries.iter().map(|e| e.kind).collect();
//! assert_eq!(kinds, [ChangeKind::Modified, ChangeKind::Removed, ChangeKind::Added]);
//! ```

pub mod diff;
pub mod key;
pub mod snapshot;

pub use diff::{
    diff, ChangeKind, CompareOptions, DiffEntry, DiffReport, DiffSummary, DiffWarning,
    FieldChange, RowKey, Side, DEFAULT_NUMERIC_TOLERANCE,
};
pub use key::{detect_policy_column, is_valid_policy_number, resolve_pair, KeyColumns};
pub use snapshot::CsvSnapshot;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("Invalid CSV schema: {0}")]
    InvalidCsvSchema(String),

    #[error("Key column(s) {} missing from {snapshot} snapshot", .columns.join(", "))]
    MissingKeyColumns { snapshot: Side, columns: Vec<String> },
}
