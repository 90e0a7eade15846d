//! Building blocks for rule tables
//!
//! A table has two halves. Record-level [`FieldSpec`]s resolve single values
//! (a report date, a title) from the whole text. The line grammar walks the
//! text line by line: [`ContextRule`]s track headers such as statuses or page
//! regions, and [`ItemRule`]s turn data lines into items.

use std::collections::BTreeMap;

use regex::Regex;
use shared_types::FieldKind;

use crate::normalize::title_case;

/// Raw captures produced by a line matcher, keyed by field name
pub type RawFields = BTreeMap<String, String>;

/// Header state carried from line to line
pub type LineContext = BTreeMap<String, String>;

/// Portion of the text a [`PatternRule`] looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Each of the first `n` lines, in order
    FirstLines(usize),
    /// The first `n` characters as one block
    FirstChars(usize),
    /// Every line
    AllLines,
}

/// A matcher that proposes a raw value for a record-level field
pub trait FieldRule: Send + Sync {
    /// Short description used in debug logs
    fn describe(&self) -> String;

    /// Every candidate value, in text order
    fn candidates(&self, text: &str) -> Vec<String>;
}

/// Regex capture over part of the text.
///
/// With `line_filter` set, only lines containing that (upper-case) marker are
/// searched.
pub struct PatternRule {
    pub pattern: Regex,
    pub group: usize,
    pub scope: Scope,
    pub line_filter: Option<&'static str>,
}

impl PatternRule {
    pub fn new(pattern: &Regex, group: usize, scope: Scope) -> Self {
        Self {
            pattern: pattern.clone(),
            group,
            scope,
            line_filter: None,
        }
    }

    pub fn on_lines_containing(mut self, marker: &'static str) -> Self {
        self.line_filter = Some(marker);
        self
    }

    fn captures(&self, haystack: &str) -> Vec<String> {
        self.pattern
            .captures_iter(haystack)
            .filter_map(|caps| caps.get(self.group))
            .map(|m| m.as_str().to_string())
            .collect()
    }

    fn line_allowed(&self, line: &str) -> bool {
        self.line_filter
            .map(|marker| line.to_uppercase().contains(marker))
            .unwrap_or(true)
    }
}

impl FieldRule for PatternRule {
    fn describe(&self) -> String {
        format!("{} ({:?})", self.pattern.as_str(), self.scope)
    }

    fn candidates(&self, text: &str) -> Vec<String> {
        match self.scope {
            Scope::FirstChars(n) => {
                let end = text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len());
                self.captures(&text[..end])
            }
            Scope::FirstLines(n) => text
                .lines()
                .take(n)
                .filter(|line| self.line_allowed(line))
                .flat_map(|line| self.captures(line))
                .collect(),
            Scope::AllLines => text
                .lines()
                .filter(|line| self.line_allowed(line))
                .flat_map(|line| self.captures(line))
                .collect(),
        }
    }
}

/// Record-level canonical field with its ordered rules
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub rules: Vec<Box<dyn FieldRule>>,
}

impl FieldSpec {
    pub fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            rules: Vec::new(),
        }
    }

    pub fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn rule(mut self, rule: impl FieldRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }
}

/// Header lines that update the [`LineContext`] and are not data themselves
pub enum ContextRule {
    /// Regex whose capture groups are copied into context keys
    Capture {
        pattern: Regex,
        keys: Vec<(&'static str, usize)>,
    },
    /// Set `key` to `value` when the upper-cased line contains every needle
    Keywords {
        key: &'static str,
        value: &'static str,
        all_of: Vec<&'static str>,
    },
}

impl ContextRule {
    pub fn capture(pattern: &Regex, keys: &[(&'static str, usize)]) -> Self {
        ContextRule::Capture {
            pattern: pattern.clone(),
            keys: keys.to_vec(),
        }
    }

    pub fn keywords(key: &'static str, value: &'static str, all_of: &[&'static str]) -> Self {
        ContextRule::Keywords {
            key,
            value,
            all_of: all_of.to_vec(),
        }
    }

    /// Apply to `line`, returning true if the line was a header
    pub fn apply(&self, line: &str, upper: &str, context: &mut LineContext) -> bool {
        match self {
            ContextRule::Capture { pattern, keys } => {
                let Some(caps) = pattern.captures(line) else {
                    return false;
                };
                for (key, group) in keys {
                    if let Some(m) = caps.get(*group) {
                        context.insert(key.to_string(), m.as_str().trim().to_string());
                    }
                }
                true
            }
            ContextRule::Keywords { key, value, all_of } => {
                if all_of.iter().all(|needle| upper.contains(needle)) {
                    context.insert(key.to_string(), value.to_string());
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Which contexts an item rule is active in
#[derive(Debug, Clone)]
pub enum ContextPredicate {
    Always,
    /// Context `key` is one of `values`, or unset when `or_unset` holds
    KeyIn {
        key: &'static str,
        values: Vec<&'static str>,
        or_unset: bool,
    },
}

impl ContextPredicate {
    pub fn holds(&self, context: &LineContext) -> bool {
        match self {
            ContextPredicate::Always => true,
            ContextPredicate::KeyIn {
                key,
                values,
                or_unset,
            } => match context.get(*key) {
                Some(current) => values.iter().any(|v| *v == current.as_str()),
                None => *or_unset,
            },
        }
    }
}

/// Recognises one data-line layout
pub trait LineMatcher: Send + Sync {
    fn match_line(&self, line: &str) -> Option<RawFields>;
}

/// Named capture groups become raw fields
pub struct RegexLine(pub Regex);

impl LineMatcher for RegexLine {
    fn match_line(&self, line: &str) -> Option<RawFields> {
        let caps = self.0.captures(line)?;
        let fields = self
            .0
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Some(fields)
    }
}

lazy_static::lazy_static! {
    /// Column gap in fixed-width report output
    static ref COLUMN_GAP: Regex = Regex::new(r"\s{2,}").unwrap();
}

/// Split on runs of two or more spaces and validate each column
pub struct ColumnSplit {
    pub columns: Vec<(&'static str, Option<Regex>)>,
}

impl LineMatcher for ColumnSplit {
    fn match_line(&self, line: &str) -> Option<RawFields> {
        let parts: Vec<&str> = COLUMN_GAP.split(line.trim()).collect();
        if parts.len() < self.columns.len() {
            return None;
        }

        let mut fields = RawFields::new();
        for ((name, validator), part) in self.columns.iter().zip(parts) {
            if let Some(re) = validator {
                if !re.is_match(part) {
                    return None;
                }
            }
            fields.insert(name.to_string(), part.to_string());
        }
        Some(fields)
    }
}

/// Post-processing applied to a raw text value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    None,
    TitleCase,
    Upper,
}

impl Transform {
    pub fn apply(self, raw: &str) -> String {
        match self {
            Transform::None => raw.to_string(),
            Transform::TitleCase => title_case(raw),
            Transform::Upper => raw.to_uppercase(),
        }
    }
}

/// Where an item field gets its raw value
#[derive(Debug, Clone)]
pub enum Source {
    /// Raw capture of the given name
    Capture(&'static str),
    /// Line context value, with a fallback when the key is unset
    Context(&'static str, Option<&'static str>),
    /// Not produced by this layout; always null
    Absent,
}

/// One field of an item schema
#[derive(Debug, Clone)]
pub struct ItemField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub source: Source,
    pub transform: Transform,
}

impl ItemField {
    pub fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            required: false,
            source: Source::Capture(name),
            transform: Transform::None,
        }
    }

    pub fn number(name: &'static str) -> Self {
        Self {
            kind: FieldKind::Number,
            ..Self::text(name)
        }
    }

    pub fn date(name: &'static str) -> Self {
        Self {
            kind: FieldKind::Date,
            ..Self::text(name)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn from(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn titled(mut self) -> Self {
        self.transform = Transform::TitleCase;
        self
    }

    pub fn upper(mut self) -> Self {
        self.transform = Transform::Upper;
        self
    }
}

/// Data-line layout active under a context predicate
pub struct ItemRule {
    pub name: &'static str,
    pub when: ContextPredicate,
    pub matcher: Box<dyn LineMatcher>,
    pub schema: Vec<ItemField>,
}
