use std::collections::BTreeMap;

use shared_types::{DocumentType, FieldValue, RecordItem, StructuredRecord};
use tracing::debug;

use crate::normalize::normalize_value;
use crate::rules::{ContextRule, FieldSpec, ItemRule, LineContext, RawFields, Source};
use crate::ParseError;

/// Item field that receives the record's report date after resolution
pub const REPORT_DATE_FIELD: &str = "report_date";

/// Complete rule set for one document type.
///
/// The same algorithm runs every table; document types differ only in the
/// tables they are built from.
pub struct RuleTable {
    pub document_type: DocumentType,
    pub fields: Vec<FieldSpec>,
    pub context_rules: Vec<ContextRule>,
    pub item_rules: Vec<ItemRule>,
}

impl RuleTable {
    pub fn required_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.to_string())
            .collect()
    }

    /// Resolve every record field and collect items from `text`
    pub fn apply(&self, text: &str) -> Result<StructuredRecord, ParseError> {
        let fields = self.resolve_fields(text);
        let mut items = self.collect_items(text);

        if let Some(Some(report_date)) = fields.get(REPORT_DATE_FIELD) {
            for item in &mut items {
                item.set(REPORT_DATE_FIELD, Some(report_date.clone()));
            }
        } else {
            for item in &mut items {
                item.set(REPORT_DATE_FIELD, None);
            }
        }

        StructuredRecord::try_new(self.document_type, fields, self.required_fields(), items)
            .map_err(|unresolved| ParseError {
                document_type: self.document_type,
                unresolved: unresolved.0,
            })
    }

    fn resolve_fields(&self, text: &str) -> BTreeMap<String, Option<FieldValue>> {
        self.fields
            .iter()
            .map(|spec| {
                let value = spec.rules.iter().enumerate().find_map(|(i, rule)| {
                    let resolved = rule
                        .candidates(text)
                        .iter()
                        .find_map(|raw| normalize_value(raw, spec.kind));
                    if resolved.is_some() {
                        debug!(field = spec.name, rule = i, pattern = %rule.describe(), "field resolved");
                    }
                    resolved
                });
                (spec.name.to_string(), value)
            })
            .collect()
    }

    fn collect_items(&self, text: &str) -> Vec<RecordItem> {
        let mut context = LineContext::new();
        let mut items = Vec::new();

        for raw_line in text.lines() {
            let line = raw_line.trim_end();
            if line.trim().is_empty() {
                continue;
            }

            let upper = line.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
            if self
                .context_rules
                .iter()
                .any(|rule| rule.apply(line, &upper, &mut context))
            {
                continue;
            }

            if let Some(item) = self.match_item(line, &context) {
                items.push(item);
            }
        }

        items
    }

    fn match_item(&self, line: &str, context: &LineContext) -> Option<RecordItem> {
        self.item_rules
            .iter()
            .filter(|rule| rule.when.holds(context))
            .find_map(|rule| {
                let raw = rule.matcher.match_line(line)?;
                let item = build_item(rule, &raw, context);
                if item.is_none() {
                    debug!(rule = rule.name, "line matched but a required item field did not normalise");
                }
                item
            })
    }
}

fn build_item(rule: &ItemRule, raw: &RawFields, context: &LineContext) -> Option<RecordItem> {
    let mut item = RecordItem::default();

    for field in &rule.schema {
        let raw_value = match &field.source {
            Source::Capture(name) => raw.get(*name).map(String::as_str),
            Source::Context(key, fallback) => context.get(*key).map(String::as_str).or(*fallback),
            Source::Absent => None,
        };

        let value = raw_value
            .map(|v| field.transform.apply(v))
            .and_then(|v| normalize_value(&v, field.kind));

        if field.required && value.is_none() {
            return None;
        }
        item.set(field.name, value);
    }

    Some(item)
}
