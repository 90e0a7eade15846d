//! Daily return drafts report

use lazy_static::lazy_static;
use regex::Regex;
use shared_types::{DocumentType, FieldKind};

use crate::rules::{
    ContextPredicate, ContextRule, FieldSpec, ItemField, ItemRule, LineMatcher, PatternRule,
    RawFields, Scope, Source,
};
use crate::table::RuleTable;

pub const SECTION_KEY: &str = "section";
pub const RETURNED_ITEMS: &str = "RETURNED ITEMS";
pub const RETURNED_PRE_NOTES: &str = "RETURNED PRE-NOTES";

/// Tokens that open the free-text return reason after the agent name
const REASON_START: [&str; 20] = [
    "NSF", "RETURN", "PAYMENT", "NO", "ACCT", "ACCOUNT", "CUSTOMER", "CUST", "NOT", "UNABLE",
    "LOCATE", "LOCAT", "INVALID", "REFER", "STOPPED", "CLOSED", "CODE", "NUMBER", "AUTH", "R98",
];

/// Tokens after the company code and policy number that a real item line has
const MIN_ITEM_TOKENS: usize = 8;

lazy_static! {
    static ref ANY_DATE: Regex = Regex::new(r"\b(\d{1,2}/\d{1,2}/\d{2,4})\b").unwrap();
    static ref LOOSE_DATE: Regex = Regex::new(r"(\d{1,2}/\d{1,2}/\d{2,4})").unwrap();
    static ref TITLE: Regex = Regex::new(r"(?i)DAILY RETURN DRAFTS?(?: REPORT)?").unwrap();

    /// `REGION: SE 01-SOUTHEAST`
    static ref REGION_HEADER: Regex =
        Regex::new(r"^\s*REGION:\s+([A-Z]{2})\s+(\d+)-(.+?)\s*$").unwrap();

    /// `AGENCY: FL123 0456-SAMPLE AGENCY`
    static ref AGENCY_HEADER: Regex =
        Regex::new(r"^\s*AGENCY:\s+([A-Z]{2}\d{3})\s+(\d+)-(.+?)\s*$").unwrap();

    /// Company code, policy number, remainder
    static ref ITEM_LINE: Regex = Regex::new(r"^\s*(\d{3})\s+(\d{10}[A-Z]?)\s+(.+)$").unwrap();

    static ref BILL_DAY: Regex = Regex::new(r"^\d{2}$").unwrap();
    static ref ISSUE_DATE: Regex = Regex::new(r"^\d{2}/\d{2}/\d{2,4}$").unwrap();
    static ref AMOUNT: Regex = Regex::new(r"^[\d,]*\.\d{2}$").unwrap();
    static ref REASON_CODE: Regex = Regex::new(r"^R\d{2}$").unwrap();
}

fn is_reason_start(token: &str) -> bool {
    let upper = token.to_uppercase();
    REASON_START.contains(&upper.as_str()) || REASON_CODE.is_match(&upper)
}

/// Returned-draft line. The insured name has no fixed width, so the layout
/// is anchored on the first bill day immediately followed by an issue date.
struct ReturnedDraftLine;

impl LineMatcher for ReturnedDraftLine {
    fn match_line(&self, line: &str) -> Option<RawFields> {
        let caps = ITEM_LINE.captures(line)?;
        let tokens: Vec<&str> = caps[3].split_whitespace().collect();
        if tokens.len() < MIN_ITEM_TOKENS {
            return None;
        }

        let anchor = tokens
            .windows(2)
            .position(|pair| BILL_DAY.is_match(pair[0]) && ISSUE_DATE.is_match(pair[1]))?;

        let mut fields = RawFields::new();
        let mut put = |name: &str, value: Option<String>| {
            if let Some(v) = value {
                fields.insert(name.to_string(), v);
            }
        };
        let at = |offset: usize| tokens.get(anchor + offset).map(|t| t.to_string());

        put("company_code", Some(caps[1].to_string()));
        put("policy_no", Some(caps[2].to_string()));
        put("insured_name", Some(tokens[..anchor].join(" ")));
        put("bill_day", at(0));
        put("issue_date", at(1));
        put("bill_no", at(2));
        put("amount", at(3).filter(|a| AMOUNT.is_match(a)));
        put("agency_code_line", at(4));
        put("agent_num", at(5));

        let tail = tokens.get(anchor + 6..).unwrap_or(&[]);
        if !tail.is_empty() {
            match tail.iter().position(|t| is_reason_start(t)) {
                Some(idx) => {
                    put("agent_name", (idx > 0).then(|| tail[..idx].join(" ")));
                    put("reason", Some(tail[idx..].join(" ")));
                }
                None => {
                    let (last, rest) = tail.split_last()?;
                    put("agent_name", Some(rest.join(" ")));
                    put("reason", Some(last.to_string()));
                }
            }
        }

        Some(fields)
    }
}

fn header_rules() -> Vec<ContextRule> {
    vec![
        ContextRule::capture(
            &REGION_HEADER,
            &[("page_region_code", 1), ("page_region_desc", 3)],
        ),
        ContextRule::capture(
            &AGENCY_HEADER,
            &[("page_agency_code", 1), ("page_agency_desc", 3)],
        ),
        ContextRule::keywords(SECTION_KEY, RETURNED_ITEMS, &["RETURNED ITEMS"]),
        ContextRule::keywords(SECTION_KEY, RETURNED_PRE_NOTES, &["RETURNED PRE-NOTES"]),
        ContextRule::keywords(SECTION_KEY, RETURNED_PRE_NOTES, &["RETURNED PRE NOTES"]),
    ]
}

fn item_schema() -> Vec<ItemField> {
    vec![
        ItemField::text("section").from(Source::Context(SECTION_KEY, None)),
        ItemField::text("company_code").required(),
        ItemField::text("policy_no").required(),
        ItemField::text("insured_name").titled(),
        ItemField::text("bill_day"),
        ItemField::date("issue_date"),
        ItemField::text("bill_no"),
        ItemField::number("amount"),
        ItemField::text("agency_code_line"),
        ItemField::text("agent_num"),
        ItemField::text("agent_name").titled(),
        ItemField::text("reason").upper(),
        ItemField::text("page_region_code").from(Source::Context("page_region_code", None)),
        ItemField::text("page_region_desc").from(Source::Context("page_region_desc", None)),
        ItemField::text("page_agency_code").from(Source::Context("page_agency_code", None)),
        ItemField::text("page_agency_desc").from(Source::Context("page_agency_desc", None)),
    ]
}

pub fn table() -> RuleTable {
    RuleTable {
        document_type: DocumentType::Returns,
        fields: vec![
            FieldSpec::required("report_date", FieldKind::Date)
                .rule(
                    PatternRule::new(&LOOSE_DATE, 1, Scope::FirstLines(30))
                        .on_lines_containing("DAILY RETURN DRAFT"),
                )
                .rule(PatternRule::new(&ANY_DATE, 1, Scope::FirstChars(500))),
            FieldSpec::optional("report_title", FieldKind::Text)
                .rule(PatternRule::new(&TITLE, 0, Scope::FirstLines(30))),
        ],
        context_rules: header_rules(),
        item_rules: vec![ItemRule {
            name: "returned-draft",
            when: ContextPredicate::Always,
            matcher: Box::new(ReturnedDraftLine),
            schema: item_schema(),
        }],
    }
}
