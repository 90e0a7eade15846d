//! Daily new business / underwriting activity report
//!
//! Items are grouped under status headers (SUBMITTED, ISSUED, ...). Policy
//! lines carry plan and annual premium; lines under the underwriting
//! requirement headers carry a requirement description instead.

use lazy_static::lazy_static;
use regex::Regex;
use shared_types::{DocumentType, FieldKind};

use crate::rules::{
    ColumnSplit, ContextPredicate, ContextRule, FieldSpec, ItemField, ItemRule, LineMatcher,
    PatternRule, RawFields, RegexLine, Scope, Source,
};
use crate::table::RuleTable;

pub const STATUS_KEY: &str = "status";
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

const REQUIREMENT_STATUSES: [&str; 2] = [
    "UNDERWRITING REQUIREMENTS ADDED",
    "UNDERWRITING REQUIREMENTS UPDATED",
];

const POLICY_STATUSES: [&str; 7] = [
    "SUBMITTED",
    "ISSUED",
    "DELIVERED",
    "DECLINE",
    "INCOMPLETE",
    "WITHDRAWN",
    UNKNOWN_STATUS,
];

lazy_static! {
    /// Date printed right before the report banner
    static ref BANNER_DATE: Regex = Regex::new(
        r"(?i)(\d{1,2}/\d{1,2}/\d{2,4})\s+DAILY NEW BUSINESS/UNDERWRITING ACTIVITY REPORT"
    ).unwrap();

    /// Any slash date
    static ref ANY_DATE: Regex = Regex::new(r"\b(\d{1,2}/\d{1,2}/\d{2,4})\b").unwrap();

    static ref TITLE: Regex =
        Regex::new(r"(?i)DAILY NEW BUSINESS/UNDERWRITING ACTIVITY REPORT").unwrap();

    /// Policy line: policy, insured, plan, premium, agent id, agent
    static ref POLICY_LINE: Regex = Regex::new(
        r"^\s*(?P<policy_no>\d{9,10}[A-Z]?)\s+(?P<insured_name>[A-Z0-9 .,'\-&/]+?)\s+(?P<plan>[A-Z0-9\-]+)\s+(?P<annual_premium>[\d,]+\.\d{2})\s+(?P<agent_id>\d{6,7})\s+(?P<writing_agent>[A-Z0-9 .,'\-&/]+?)\s*$"
    ).unwrap();

    /// Requirement line: policy, insured, requirement, agent id, agent
    static ref REQUIREMENT_LINE: Regex = Regex::new(
        r"^\s*(?P<policy_no>\d{9,10}[A-Z]?)\s+(?P<insured_name>[A-Z0-9 .,'\-&/]+?)\s{2,}(?P<requirement_desc>[^-].*?\S)\s{2,}(?P<agent_id>\d{6,7})\s+(?P<writing_agent>[A-Z0-9 .,'\-&/]+?)\s*$"
    ).unwrap();

    static ref POLICY_NO: Regex = Regex::new(r"^\d{9,10}[A-Z]?$").unwrap();
    static ref PLAN: Regex = Regex::new(r"^[A-Z0-9\-]+$").unwrap();
    static ref PREMIUM: Regex = Regex::new(r"^[\d,]+\.\d{2}$").unwrap();
    static ref AGENT_ID: Regex = Regex::new(r"^\d{6,7}$").unwrap();
}

/// Single-space layouts: anchor on the last agent id and read the plan and
/// premium to its left
struct PolicyTokenScan;

impl LineMatcher for PolicyTokenScan {
    fn match_line(&self, line: &str) -> Option<RawFields> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 || !POLICY_NO.is_match(parts[0]) {
            return None;
        }

        let agent_idx = parts.iter().rposition(|t| AGENT_ID.is_match(t))?;
        if agent_idx < 3 {
            return None;
        }
        let premium = parts[agent_idx - 1];
        let plan = parts[agent_idx - 2];
        if !PREMIUM.is_match(premium) || !PLAN.is_match(plan) {
            return None;
        }

        let name = &parts[1..agent_idx - 2];
        let agent = &parts[agent_idx + 1..];
        if name.is_empty() || agent.is_empty() {
            return None;
        }

        let mut fields = RawFields::new();
        fields.insert("policy_no".into(), parts[0].to_string());
        fields.insert("insured_name".into(), name.join(" "));
        fields.insert("plan".into(), plan.to_string());
        fields.insert("annual_premium".into(), premium.to_string());
        fields.insert("agent_id".into(), parts[agent_idx].to_string());
        fields.insert("writing_agent".into(), agent.join(" "));
        Some(fields)
    }
}

fn status_rules() -> Vec<ContextRule> {
    vec![
        ContextRule::keywords(
            STATUS_KEY,
            REQUIREMENT_STATUSES[0],
            &["UNDERWRITING REQUIREMENTS", "ADDED"],
        ),
        ContextRule::keywords(
            STATUS_KEY,
            REQUIREMENT_STATUSES[1],
            &["UNDERWRITING REQUIREMENTS", "UPDATED"],
        ),
        ContextRule::keywords(STATUS_KEY, "SUBMITTED", &["SUBMITTED"]),
        ContextRule::keywords(STATUS_KEY, "ISSUED", &["ISSUED"]),
        ContextRule::keywords(STATUS_KEY, "DELIVERED", &["DELIVERED"]),
        ContextRule::keywords(STATUS_KEY, "DECLINE", &["DECLINE"]),
        ContextRule::keywords(STATUS_KEY, "INCOMPLETE", &["INCOMPLETE"]),
        ContextRule::keywords(STATUS_KEY, "WITHDRAWN", &["WITHDRAWN"]),
    ]
}

fn policy_schema() -> Vec<ItemField> {
    vec![
        ItemField::text("status").from(Source::Context(STATUS_KEY, Some(UNKNOWN_STATUS))),
        ItemField::text("policy_no").required(),
        ItemField::text("insured_name").required().titled(),
        ItemField::text("plan").required(),
        ItemField::number("annual_premium").required(),
        ItemField::text("agent_id").required(),
        ItemField::text("writing_agent").required().titled(),
        ItemField::text("requirement_desc").from(Source::Absent),
    ]
}

fn requirement_schema() -> Vec<ItemField> {
    vec![
        ItemField::text("status").from(Source::Context(STATUS_KEY, None)),
        ItemField::text("policy_no").required(),
        ItemField::text("insured_name").required().titled(),
        ItemField::text("plan").from(Source::Absent),
        ItemField::number("annual_premium").from(Source::Absent),
        ItemField::text("agent_id").required(),
        ItemField::text("writing_agent").required().titled(),
        ItemField::text("requirement_desc").required(),
    ]
}

pub fn table() -> RuleTable {
    let policy_context = || ContextPredicate::KeyIn {
        key: STATUS_KEY,
        values: POLICY_STATUSES.to_vec(),
        or_unset: true,
    };
    let requirement_context = || ContextPredicate::KeyIn {
        key: STATUS_KEY,
        values: REQUIREMENT_STATUSES.to_vec(),
        or_unset: false,
    };

    RuleTable {
        document_type: DocumentType::Underwriting,
        fields: vec![
            FieldSpec::required("report_date", FieldKind::Date)
                .rule(PatternRule::new(&BANNER_DATE, 1, Scope::FirstLines(20)))
                .rule(PatternRule::new(&ANY_DATE, 1, Scope::FirstChars(500))),
            FieldSpec::optional("report_title", FieldKind::Text)
                .rule(PatternRule::new(&TITLE, 0, Scope::FirstLines(20))),
        ],
        context_rules: status_rules(),
        item_rules: vec![
            ItemRule {
                name: "policy-line",
                when: policy_context(),
                matcher: Box::new(RegexLine(POLICY_LINE.clone())),
                schema: policy_schema(),
            },
            ItemRule {
                name: "policy-columns",
                when: policy_context(),
                matcher: Box::new(ColumnSplit {
                    columns: vec![
                        ("policy_no", Some(POLICY_NO.clone())),
                        ("insured_name", None),
                        ("plan", Some(PLAN.clone())),
                        ("annual_premium", Some(PREMIUM.clone())),
                        ("agent_id", Some(AGENT_ID.clone())),
                        ("writing_agent", None),
                    ],
                }),
                schema: policy_schema(),
            },
            ItemRule {
                name: "policy-tokens",
                when: policy_context(),
                matcher: Box::new(PolicyTokenScan),
                schema: policy_schema(),
            },
            ItemRule {
                name: "requirement-line",
                when: requirement_context(),
                matcher: Box::new(RegexLine(REQUIREMENT_LINE.clone())),
                schema: requirement_schema(),
            },
            ItemRule {
                name: "requirement-columns",
                when: requirement_context(),
                matcher: Box::new(ColumnSplit {
                    columns: vec![
                        ("policy_no", Some(POLICY_NO.clone())),
                        ("insured_name", None),
                        ("requirement_desc", None),
                        ("agent_id", Some(AGENT_ID.clone())),
                        ("writing_agent", None),
                    ],
                }),
                schema: requirement_schema(),
            },
        ],
    }
}
