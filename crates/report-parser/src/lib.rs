//! Rule-driven report parsing
//!
//! [`DocumentParser`] turns extracted report text into a
//! [`StructuredRecord`]. Each document type is described by a [`RuleTable`];
//! the algorithm that runs a table is shared:
//!
//! - every record field tries its rules in order and the first rule whose
//!   match normalises to the declared type wins
//! - data lines are matched by the first item rule active in the current
//!   header context
//! - a missing required field fails the whole parse, naming every such field

pub mod normalize;
pub mod returns;
pub mod rules;
pub mod table;
pub mod underwriting;

pub use table::{RuleTable, REPORT_DATE_FIELD};

use shared_types::{DocumentType, ExtractionResult, StructuredRecord};
use thiserror::Error;
use tracing::{info, warn};

/// Required fields that no rule could resolve
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not parse {document_type} report; unresolved fields: {}", .unresolved.join(", "))]
pub struct ParseError {
    pub document_type: DocumentType,
    pub unresolved: Vec<String>,
}

/// Holds the rule tables for every supported document type
pub struct DocumentParser {
    underwriting: RuleTable,
    returns: RuleTable,
}

impl Default for DocumentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser {
    pub fn new() -> Self {
        Self {
            underwriting: underwriting::table(),
            returns: returns::table(),
        }
    }

    pub fn table(&self, document_type: DocumentType) -> &RuleTable {
        match document_type {
            DocumentType::Underwriting => &self.underwriting,
            DocumentType::Returns => &self.returns,
        }
    }

    pub fn parse(
        &self,
        extraction: &ExtractionResult,
        document_type: DocumentType,
    ) -> Result<StructuredRecord, ParseError> {
        self.parse_text(extraction.text(), document_type)
    }

    pub fn parse_text(
        &self,
        text: &str,
        document_type: DocumentType,
    ) -> Result<StructuredRecord, ParseError> {
        match self.table(document_type).apply(text) {
            Ok(record) => {
                info!(%document_type, items = record.items().len(), "report parsed");
                Ok(record)
            }
            Err(e) => {
                warn!(%document_type, unresolved = ?e.unresolved, "report parse failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use crate::rules::{FieldSpec, PatternRule, Scope};
    use shared_types::{BackendKind, FieldKind, FieldValue};

    const UNDERWRITING_SAMPLE: &str = "\
08/22/25 DAILY NEW BUSINESS/UNDERWRITING ACTIVITY REPORT
PAGE 1

SUBMITTED
0107680260 MARY ANN LEE TL-20 1,200.00 1234567 BOB SMITH
0107680261   JOHN DOE   WL-10   350.25   123456   ANNA BELL

ISSUED
0107680262 PETER PAN & CO UL-1 99.10 7654321 JIM O'NEIL

UNDERWRITING REQUIREMENTS ADDED
0107680263 SAM HILL   PARAMEDICAL EXAM NEEDED   1234567 BOB SMITH
";

    const RETURNS_SAMPLE: &str = "\
DAILY RETURN DRAFTS REPORT 08/22/2025
REGION: SE 01-SOUTHEAST
AGENCY: FL123 0456-SUNSHINE AGENCY
RETURNED ITEMS
001 0107680260 JANE Q PUBLIC 15 03/09/24 88812 41.50 FL123 A0042 BOB SMITH NSF CHECK
RETURNED PRE-NOTES
002 0100000001 DOE JOHN 01 12/31/2023 5 .00 FL123 777 AL JONES ACCOUNT CLOSED
";

    fn text_of(record: &StructuredRecord, idx: usize, field: &str) -> Option<String> {
        record.items()[idx].text(field).map(str::to_string)
    }

    #[test]
    fn test_underwriting_report() {
        let record = DocumentParser::new()
            .parse_text(UNDERWRITING_SAMPLE, DocumentType::Underwriting)
            .unwrap();

        let report_date = FieldValue::Date(NaiveDate::from_ymd_opt(2025, 8, 22).unwrap());
        assert_eq!(record.get("report_date"), Some(&report_date));
        assert_eq!(
            record.get("report_title").and_then(FieldValue::as_text),
            Some("DAILY NEW BUSINESS/UNDERWRITING ACTIVITY REPORT")
        );
        assert_eq!(record.items().len(), 4);

        assert_eq!(text_of(&record, 0, "status").as_deref(), Some("SUBMITTED"));
        assert_eq!(text_of(&record, 0, "insured_name").as_deref(), Some("Mary Ann Lee"));
        assert_eq!(
            record.items()[0].get("annual_premium"),
            Some(&FieldValue::Number(1200.0))
        );
        assert_eq!(record.items()[0].get("report_date"), Some(&report_date));

        assert_eq!(text_of(&record, 1, "writing_agent").as_deref(), Some("Anna Bell"));
        assert_eq!(text_of(&record, 2, "status").as_deref(), Some("ISSUED"));
        assert_eq!(text_of(&record, 2, "writing_agent").as_deref(), Some("Jim O'Neil"));

        assert_eq!(
            text_of(&record, 3, "status").as_deref(),
            Some("UNDERWRITING REQUIREMENTS ADDED")
        );
        assert_eq!(
            text_of(&record, 3, "requirement_desc").as_deref(),
            Some("PARAMEDICAL EXAM NEEDED")
        );
        assert_eq!(record.items()[3].get("plan"), None);
    }

    #[test]
    fn test_lines_before_any_header_are_unknown_status() {
        let text = "01/02/25 DAILY NEW BUSINESS/UNDERWRITING ACTIVITY REPORT\n\
                    0107680260 MARY ANN LEE TL-20 1,200.00 1234567 BOB SMITH\n";
        let record = DocumentParser::new()
            .parse_text(text, DocumentType::Underwriting)
            .unwrap();
        assert_eq!(text_of(&record, 0, "status").as_deref(), Some("UNKNOWN"));
    }

    #[test]
    fn test_returns_report() {
        let record = DocumentParser::new()
            .parse_text(RETURNS_SAMPLE, DocumentType::Returns)
            .unwrap();

        assert_eq!(
            record.get("report_date"),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2025, 8, 22).unwrap()))
        );
        assert_eq!(record.items().len(), 2);
        assert_eq!(record.items_where("section", returns::RETURNED_ITEMS).count(), 1);
        assert_eq!(record.items_where("section", returns::RETURNED_PRE_NOTES).count(), 1);

        assert_eq!(text_of(&record, 0, "insured_name").as_deref(), Some("Jane Q Public"));
        assert_eq!(text_of(&record, 0, "page_region_code").as_deref(), Some("SE"));
        assert_eq!(text_of(&record, 0, "page_agency_desc").as_deref(), Some("SUNSHINE AGENCY"));
        assert_eq!(
            record.items()[0].get("issue_date"),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()))
        );
        assert_eq!(record.items()[1].get("amount"), Some(&FieldValue::Number(0.0)));
        assert_eq!(text_of(&record, 1, "agent_name").as_deref(), Some("Al Jones"));
        assert_eq!(text_of(&record, 1, "reason").as_deref(), Some("ACCOUNT CLOSED"));
    }

    #[test]
    fn test_missing_report_date_fails_with_field_name() {
        let err = DocumentParser::new()
            .parse_text("DAILY RETURN DRAFTS REPORT\nnothing dated here", DocumentType::Returns)
            .unwrap_err();
        assert_eq!(err.unresolved, vec!["report_date".to_string()]);
        assert_eq!(err.document_type, DocumentType::Returns);
    }

    #[test]
    fn test_invalid_first_rule_match_falls_back_to_next_rule() {
        let text = "99/99/99 DAILY NEW BUSINESS/UNDERWRITING ACTIVITY REPORT printed 03/04/25";
        let record = DocumentParser::new()
            .parse_text(text, DocumentType::Underwriting)
            .unwrap();
        assert_eq!(
            record.get("report_date"),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()))
        );
    }

    #[test]
    fn test_every_unresolved_required_field_is_reported() {
        lazy_static::lazy_static! {
            static ref NEVER: regex::Regex = regex::Regex::new(r"(ZZZ_NEVER_\d+)").unwrap();
            static ref ANY_DATE: regex::Regex = regex::Regex::new(r"(\d{2}/\d{2}/\d{2})").unwrap();
        }

        let table = RuleTable {
            document_type: DocumentType::Underwriting,
            fields: vec![
                FieldSpec::required("report_date", FieldKind::Date)
                    .rule(PatternRule::new(&ANY_DATE, 1, Scope::AllLines)),
                FieldSpec::required("agency", FieldKind::Text)
                    .rule(PatternRule::new(&NEVER, 1, Scope::AllLines)),
                FieldSpec::required("region", FieldKind::Text),
                FieldSpec::optional("title", FieldKind::Text)
                    .rule(PatternRule::new(&NEVER, 1, Scope::AllLines)),
            ],
            context_rules: vec![],
            item_rules: vec![],
        };

        let err = table.apply("report of 08/22/25").unwrap_err();
        assert_eq!(err.unresolved, vec!["agency".to_string(), "region".to_string()]);
    }

    #[test]
    fn test_parse_uses_extraction_text() {
        let extraction = ExtractionResult::new(
            RETURNS_SAMPLE.to_string(),
            BackendKind::LopdfText,
            1,
            vec![],
        );
        let parser = DocumentParser::new();
        let first = parser.parse(&extraction, DocumentType::Returns).unwrap();
        let second = parser.parse(&extraction, DocumentType::Returns).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    proptest! {
        #[test]
        fn prop_parsing_is_idempotent(noise in "[ A-Z0-9/.\n]{0,200}") {
            let text = format!("{}{}", UNDERWRITING_SAMPLE, noise);
            let parser = DocumentParser::new();
            let first = parser.parse_text(&text, DocumentType::Underwriting);
            let second = parser.parse_text(&text, DocumentType::Underwriting);
            prop_assert_eq!(first, second);
        }
    }
}
