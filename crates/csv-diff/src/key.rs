//! Key column selection

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::snapshot::CsvSnapshot;

/// Header names that usually hold the policy number, in priority order
pub const POLICY_COLUMN_CANDIDATES: [&str; 7] = [
    "Policy",
    "Company",
    "PolicyNumber",
    "PolicyNo",
    "Policy_Number",
    "POLICY",
    "COMPANY",
];

/// Rows sampled per column during detection
const DETECTION_SAMPLE_ROWS: usize = 100;

/// Share of sampled values that must look like policy numbers
const DETECTION_MIN_SCORE: f64 = 0.3;

lazy_static! {
    /// Nine or ten digits with an optional trailing letter
    static ref POLICY_NUMBER: Regex = Regex::new(r"^\d{9,10}[A-Z]?$").unwrap();
}

pub fn is_valid_policy_number(value: &str) -> bool {
    POLICY_NUMBER.is_match(value.trim())
}

/// How rows are identified across snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "columns")]
pub enum KeyColumns {
    /// First column of the candidate snapshot
    #[default]
    First,
    /// Explicit column names, compared as a composite key
    Named(Vec<String>),
    /// Detect the policy-number column, falling back to the first column
    Auto,
}

impl KeyColumns {
    /// Parse a caller-supplied key list: empty → first column, `auto`, or a
    /// comma-separated list of names
    pub fn parse(spec: Option<&str>) -> Self {
        let spec = spec.map(str::trim).unwrap_or("");
        if spec.is_empty() {
            return KeyColumns::First;
        }
        if spec.eq_ignore_ascii_case("auto") {
            return KeyColumns::Auto;
        }
        let names: Vec<String> = spec
            .split(',')
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            KeyColumns::First
        } else {
            KeyColumns::Named(names)
        }
    }

    /// Column names this selection picks on `snapshot`
    pub fn resolve(&self, snapshot: &CsvSnapshot) -> Vec<String> {
        match self {
            KeyColumns::Named(names) => names.clone(),
            KeyColumns::First => snapshot.headers().iter().take(1).cloned().collect(),
            KeyColumns::Auto => detect_policy_column(snapshot)
                .or_else(|| first_numeric_column(snapshot))
                .or_else(|| snapshot.headers().first().cloned())
                .into_iter()
                .collect(),
        }
    }
}

/// Key columns for comparing `baseline` against `candidate`.
///
/// Explicit and first-column selection read the candidate (the baseline when
/// the candidate has no headers). Detection runs on both sides; when they
/// disagree the column with the higher policy-number share across both
/// snapshots wins, ties going to the smaller name, so swapping the inputs
/// never changes the key.
pub fn resolve_pair(
    keys: &KeyColumns,
    baseline: &CsvSnapshot,
    candidate: &CsvSnapshot,
) -> Vec<String> {
    if *keys != KeyColumns::Auto {
        let reference = if candidate.headers().is_empty() {
            baseline
        } else {
            candidate
        };
        return keys.resolve(reference);
    }

    let picks: Vec<Vec<String>> = [baseline, candidate]
        .into_iter()
        .filter(|s| !s.headers().is_empty())
        .map(|s| KeyColumns::Auto.resolve(s))
        .filter(|k| !k.is_empty())
        .collect();

    match picks.as_slice() {
        [] => Vec::new(),
        [only] => only.clone(),
        [a, b] if a == b => a.clone(),
        [a, b] => {
            let rank = |cols: &Vec<String>| {
                let shared = cols.iter().all(|c| {
                    baseline.column_index(c).is_some() && candidate.column_index(c).is_some()
                });
                let (valid, total) = cols
                    .iter()
                    .map(|c| {
                        let (v1, t1) = policy_counts(baseline, c);
                        let (v2, t2) = policy_counts(candidate, c);
                        (v1 + v2, t1 + t2)
                    })
                    .fold((0, 0), |acc, x| (acc.0 + x.0, acc.1 + x.1));
                (shared, valid, total)
            };
            let (ra, rb) = (rank(a), rank(b));
            // Compare valid/total shares without floats: va/ta vs vb/tb
            let a_wins = match ra.0.cmp(&rb.0) {
                std::cmp::Ordering::Equal => {
                    let lhs = ra.1 * rb.2.max(1);
                    let rhs = rb.1 * ra.2.max(1);
                    lhs > rhs || (lhs == rhs && a < b)
                }
                ord => ord == std::cmp::Ordering::Greater,
            };
            if a_wins {
                a.clone()
            } else {
                b.clone()
            }
        }
        _ => unreachable!("at most two snapshots are compared"),
    }
}

/// Policy-shaped and non-empty sampled values of `column`
fn policy_counts(snapshot: &CsvSnapshot, column: &str) -> (usize, usize) {
    let Some(idx) = snapshot.column_index(column) else {
        return (0, 0);
    };
    let values: Vec<&str> = snapshot
        .rows()
        .iter()
        .take(DETECTION_SAMPLE_ROWS)
        .filter_map(|row| row.get(idx))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .collect();
    let valid = values.iter().filter(|v| is_valid_policy_number(v)).count();
    (valid, values.len())
}

/// Column whose sampled values most often look like policy numbers.
///
/// Known header names are scored first, then every other column; a column
/// only replaces the current best with a strictly higher score.
pub fn detect_policy_column(snapshot: &CsvSnapshot) -> Option<String> {
    let mut candidates: Vec<&str> = POLICY_COLUMN_CANDIDATES.to_vec();
    for header in snapshot.headers() {
        if !candidates.contains(&header.as_str()) {
            candidates.push(header);
        }
    }

    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let Some(idx) = snapshot.column_index(candidate) else {
            continue;
        };

        let (valid, total) = policy_counts(snapshot, candidate);
        if total == 0 {
            continue;
        }

        let score = valid as f64 / total as f64;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }

    best.filter(|(_, score)| *score >= DETECTION_MIN_SCORE)
        .map(|(name, _)| name.to_string())
}

fn first_numeric_column(snapshot: &CsvSnapshot) -> Option<String> {
    let first_row = snapshot.rows().first()?;
    snapshot
        .headers()
        .iter()
        .zip(first_row)
        .find(|(_, value)| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()))
        .map(|(header, _)| header.clone())
}
