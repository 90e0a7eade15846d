//! HTTP endpoint tests using axum-test
//!
//! Extraction runs against a fixed-text backend so the parsers see known
//! report text; forwarding goes to an in-memory recorder.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use clap::Parser;
use extraction_engine::{BackendError, BackendOutput, ExtractionEngine, TextBackend};
use pretty_assertions::assert_eq;
use report_parser::DocumentParser;
use serde_json::{json, Value};
use shared_types::{
    AuthMaterial, BackendKind, DeliveryReceipt, ForwardError, ForwardTarget, Forwarder,
};
use tokio::sync::RwLock;
use upload_cache::{ManualClock, UploadCache};

use crate::build_router;
use crate::compare::{CONFIRMED_EVENT, FIRST_FILE_MESSAGE, PREVIEW_MESSAGE};
use crate::config::Config;
use crate::state::AppState;

const UNDERWRITING_TEXT: &str = "\
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

const RETURNS_TEXT: &str = "\
DAILY RETURN DRAFTS REPORT 08/22/2025
REGION: SE 01-SOUTHEAST
AGENCY: FL123 0456-SUNSHINE AGENCY
RETURNED ITEMS
001 0107680260 JANE Q PUBLIC 15 03/09/24 88812 41.50 FL123 A0042 BOB SMITH NSF CHECK
RETURNED PRE-NOTES
002 0100000001 DOE JOHN 01 12/31/2023 5 .00 FL123 777 AL JONES ACCOUNT CLOSED
";

const FIRST_CSV: &str = "Policy,Name,Premium\n0107680260,Ann Lee,100.00\n0107680261,Bob Ray,50.00\n";
const SECOND_CSV: &str = "Policy,Name,Premium\n0107680260,Ann Lee,120.00\n0107680262,Cy Dee,75.00\n";

struct FixedText(String);

impl TextBackend for FixedText {
    fn kind(&self) -> BackendKind {
        BackendKind::PdfExtract
    }

    fn extract(&self, _bytes: &[u8]) -> Result<BackendOutput, BackendError> {
        Ok(BackendOutput::new(self.0.clone(), 1))
    }
}

#[derive(Default)]
struct RecordingForwarder {
    fail: bool,
    calls: Mutex<Vec<(ForwardTarget, Value)>>,
}

impl RecordingForwarder {
    fn calls(&self) -> Vec<(ForwardTarget, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn deliver(
        &self,
        target: &ForwardTarget,
        payload: &Value,
    ) -> Result<DeliveryReceipt, ForwardError> {
        self.calls
            .lock()
            .unwrap()
            .push((target.clone(), payload.clone()));
        if self.fail {
            Err(ForwardError::Transport("connection refused".into()))
        } else {
            Ok(DeliveryReceipt {
                status_code: 200,
                body: "received".into(),
            })
        }
    }
}

fn config(args: &[&str]) -> Config {
    let mut argv = vec!["report-api"];
    argv.extend_from_slice(args);
    Config::try_parse_from(argv).unwrap()
}

fn state_with(
    text: &str,
    config: Config,
    forwarder: Arc<RecordingForwarder>,
    uploads: UploadCache<crate::state::StagedUpload>,
) -> Arc<AppState> {
    Arc::new(AppState {
        engine: ExtractionEngine::with_backends(vec![Box::new(FixedText(text.to_string()))])
            .with_min_chars(config.min_text_chars),
        parser: DocumentParser::new(),
        uploads: Arc::new(uploads),
        baseline: RwLock::new(None),
        forwarder,
        config,
    })
}

fn create_test_server(text: &str) -> (TestServer, Arc<RecordingForwarder>) {
    let forwarder = Arc::new(RecordingForwarder::default());
    let config = config(&[]);
    let uploads = UploadCache::new(config.upload_ttl());
    let state = state_with(text, config, forwarder.clone(), uploads);
    (TestServer::new(build_router(state)).unwrap(), forwarder)
}

fn pdf_form(file_name: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "pdf",
        Part::bytes(b"%PDF-1.5 placeholder".to_vec())
            .file_name(file_name)
            .mime_type("application/pdf"),
    )
}

fn csv_part(content: &str, file_name: &str) -> Part {
    Part::bytes(content.as_bytes().to_vec())
        .file_name(file_name)
        .mime_type("text/csv")
}

#[tokio::test]
async fn test_health_returns_200() {
    let (server, _) = create_test_server(UNDERWRITING_TEXT);
    let response = server.get("/health").await;
    response.assert_status_ok();

    let json = response.json::<Value>();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "report-api");
    assert_eq!(json["staged_uploads"], 0);
}

#[tokio::test]
async fn test_extract_underwriting_report() {
    let (server, forwarder) = create_test_server(UNDERWRITING_TEXT);

    let response = server
        .post("/extract")
        .multipart(pdf_form("daily.pdf").add_text("document_type", "daily underwriting"))
        .await;
    response.assert_status_ok();

    let json = response.json::<Value>();
    assert_eq!(json["ok"], true);
    assert_eq!(json["report_type"], "underwriting");
    assert_eq!(json["document_type"], "daily underwriting");
    assert_eq!(json["report_date"], "2025-08-22");
    assert_eq!(json["count"], 4);
    assert_eq!(json["items"][0]["insured_name"], "Mary Ann Lee");
    assert_eq!(json["items"][0]["annual_premium"], 1200.0);
    assert_eq!(json["items"][3]["status"], "UNDERWRITING REQUIREMENTS ADDED");
    assert_eq!(json["file"]["name"], "daily.pdf");
    assert_eq!(json["extraction"]["page_count"], 1);
    assert_eq!(json["forwarded"], Value::Null);
    assert!(json.get("text_sample").is_none());
    assert!(forwarder.calls().is_empty());
}

#[tokio::test]
async fn test_text_sample_is_opt_in() {
    let (server, _) = create_test_server(UNDERWRITING_TEXT);

    let response = server
        .post("/extract")
        .multipart(pdf_form("daily.pdf").add_text("return_text_sample", "yes"))
        .await;
    response.assert_status_ok();

    let json = response.json::<Value>();
    let sample = json["text_sample"].as_str().unwrap();
    assert!(sample.starts_with("08/22/25 DAILY NEW BUSINESS"));
    assert_eq!(
        json["text_len"].as_u64().unwrap() as usize,
        UNDERWRITING_TEXT.chars().count()
    );
}

#[tokio::test]
async fn test_extract_returns_splits_sections() {
    let (server, _) = create_test_server(RETURNS_TEXT);

    let response = server
        .post("/returns")
        .multipart(pdf_form("returns.pdf"))
        .await;
    response.assert_status_ok();

    let json = response.json::<Value>();
    assert_eq!(json["report_type"], "returns");
    assert_eq!(json["document_type"], "returns");
    assert_eq!(
        json["count"],
        json!({"returned_items": 1, "returned_pre_notes": 1, "total": 2})
    );
    assert_eq!(json["items"]["returned_items"][0]["insured_name"], "Jane Q Public");
    assert_eq!(json["items"]["returned_pre_notes"][0]["agent_name"], "Al Jones");
}

#[tokio::test]
async fn test_returns_items_before_any_section_are_kept() {
    let text = "\
DAILY RETURN DRAFTS REPORT 08/22/2025
REGION: SE 01-SOUTHEAST
001 0107680260 JANE Q PUBLIC 15 03/09/24 88812 41.50 FL123 A0042 BOB SMITH NSF CHECK
";
    let (server, forwarder) = create_test_server(text);

    let response = server
        .post("/returns")
        .multipart(pdf_form("returns.pdf").add_text("forward_url", "http://hooks.test/returns"))
        .await;
    response.assert_status_ok();

    let json = response.json::<Value>();
    assert_eq!(
        json["count"],
        json!({"returned_items": 1, "returned_pre_notes": 0, "total": 1})
    );
    assert_eq!(json["items"]["returned_items"][0]["insured_name"], "Jane Q Public");
    assert_eq!(json["items"]["returned_items"][0]["section"], Value::Null);

    let calls = forwarder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1["returned_items"].as_array().unwrap().len(), 1);
    assert_eq!(calls[0].1["returned_pre_notes"], json!([]));
}

#[tokio::test]
async fn test_extract_by_path_type() {
    let (server, _) = create_test_server(RETURNS_TEXT);

    let response = server
        .post("/extract/returns")
        .multipart(pdf_form("returns.pdf"))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["count"]["total"], 2);

    let response = server
        .post("/extract/invoices")
        .multipart(pdf_form("returns.pdf"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "UNSUPPORTED_DOCUMENT_TYPE");
}

#[tokio::test]
async fn test_extract_rejects_non_pdf() {
    let (server, _) = create_test_server(UNDERWRITING_TEXT);

    let response = server
        .post("/extract")
        .multipart(pdf_form("daily.txt"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let json = response.json::<Value>();
    assert_eq!(json["ok"], false);
    assert_eq!(json["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_parse_error_lists_unresolved_fields() {
    let text = "DAILY RETURN DRAFTS REPORT\nno date anywhere in this text, only filler words\n";
    let (server, _) = create_test_server(text);

    let response = server
        .post("/returns")
        .multipart(pdf_form("returns.pdf"))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let json = response.json::<Value>();
    assert_eq!(json["code"], "PARSE_ERROR");
    let unresolved = json["unresolved_fields"].as_array().unwrap();
    assert!(unresolved.contains(&json!("report_date")));
}

#[tokio::test]
async fn test_inadequate_text_is_extraction_failure() {
    let (server, _) = create_test_server("too short");

    let response = server
        .post("/extract")
        .multipart(pdf_form("scan.pdf"))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], "EXTRACTION_FAILED");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let forwarder = Arc::new(RecordingForwarder::default());
    let config = config(&["--max-upload-mb", "1"]);
    let uploads = UploadCache::new(config.upload_ttl());
    let server =
        TestServer::new(build_router(state_with(UNDERWRITING_TEXT, config, forwarder, uploads)))
            .unwrap();

    let form = MultipartForm::new().add_part(
        "pdf",
        Part::bytes(vec![b'x'; 1536 * 1024]).file_name("big.pdf"),
    );
    let response = server.post("/extract").multipart(form).await;
    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.json::<Value>()["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_extract_forwards_with_request_credentials() {
    let (server, forwarder) = create_test_server(UNDERWRITING_TEXT);

    let response = server
        .post("/extract")
        .multipart(
            pdf_form("daily.pdf")
                .add_text("forward_url", "http://hooks.test/intake")
                .add_text("bearer", "secret")
                .add_text("basic", "user:pw")
                .add_text("custom_data", "batch seven"),
        )
        .await;
    response.assert_status_ok();

    let json = response.json::<Value>();
    assert_eq!(json["forwarded"]["status_code"], 200);
    assert_eq!(json["forwarded"]["body"], "received");

    let calls = forwarder.calls();
    assert_eq!(calls.len(), 1);
    let (target, payload) = &calls[0];
    assert_eq!(target.url, "http://hooks.test/intake");
    assert_eq!(target.auth, Some(AuthMaterial::Bearer("secret".into())));
    assert_eq!(payload["report_type"], "underwriting");
    assert_eq!(payload["count"], 4);
    assert_eq!(payload["report_date"], "2025-08-22");
    assert_eq!(payload["custom_data"], json!({"_raw": "batch seven"}));
}

#[tokio::test]
async fn test_preview_confirm_cycle_updates_baseline() {
    let (server, forwarder) = create_test_server(UNDERWRITING_TEXT);

    let preview = server
        .post("/compare/preview")
        .multipart(
            MultipartForm::new()
                .add_part("csv_file", csv_part(FIRST_CSV, "policies.csv"))
                .add_text("forward_url", "http://hooks.test/csv")
                .add_text("custom_data", r#"{"batch": 1}"#),
        )
        .await;
    preview.assert_status_ok();
    let json = preview.json::<Value>();
    assert_eq!(json["ok"], true);
    assert_eq!(json["message"], FIRST_FILE_MESSAGE);
    assert_eq!(json["summary"]["added"], 2);
    assert_eq!(json["key_columns"], json!(["Policy"]));
    let token = json["token"].as_str().unwrap().to_string();

    // Preview has no downstream effect
    assert!(forwarder.calls().is_empty());

    let confirm = server
        .post("/compare/confirm")
        .json(&json!({ "upload_token": token }))
        .await;
    confirm.assert_status_ok();
    let json = confirm.json::<Value>();
    assert_eq!(json["ok"], true);
    assert_eq!(json["delivery"]["status_code"], 200);

    let calls = forwarder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.url, "http://hooks.test/csv");
    assert_eq!(calls[0].1["event"], CONFIRMED_EVENT);
    assert_eq!(calls[0].1["upload_token"], token.as_str());
    assert_eq!(calls[0].1["custom_data"], json!({"batch": 1}));

    let again = server
        .post("/compare/confirm")
        .json(&json!({ "upload_token": token }))
        .await;
    again.assert_status(StatusCode::CONFLICT);
    assert_eq!(again.json::<Value>()["code"], "ALREADY_CONFIRMED");
    assert_eq!(forwarder.calls().len(), 1);

    // The confirmed file is now the baseline
    let second = server
        .post("/compare/preview")
        .multipart(MultipartForm::new().add_part("csv_file", csv_part(SECOND_CSV, "policies2.csv")))
        .await;
    second.assert_status_ok();
    let json = second.json::<Value>();
    assert_eq!(json["message"], PREVIEW_MESSAGE);
    assert_eq!(json["baseline_file"], "policies.csv");
    assert_eq!(
        json["summary"],
        json!({"added": 1, "removed": 1, "modified": 1, "total_changes": 3})
    );
    assert_eq!(json["changes"][0]["key"], json!(["0107680260"]));
    assert_eq!(
        json["changes"][0]["changes"],
        json!([{"field": "Premium", "before": "100.00", "after": "120.00"}])
    );
}

#[tokio::test]
async fn test_preview_against_explicit_baseline_file() {
    let (server, _) = create_test_server(UNDERWRITING_TEXT);

    let response = server
        .post("/compare/preview")
        .multipart(
            MultipartForm::new()
                .add_part("csv_file", csv_part(SECOND_CSV, "new.csv"))
                .add_part("baseline_file", csv_part(FIRST_CSV, "old.csv"))
                .add_text("key_columns", "Policy"),
        )
        .await;
    response.assert_status_ok();

    let json = response.json::<Value>();
    assert_eq!(json["baseline_file"], "old.csv");
    assert_eq!(json["summary"]["total_changes"], 3);
}

#[tokio::test]
async fn test_preview_validation_errors() {
    let (server, _) = create_test_server(UNDERWRITING_TEXT);

    let response = server
        .post("/compare/preview")
        .multipart(MultipartForm::new().add_part("csv_file", csv_part(FIRST_CSV, "policies.xlsx")))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_REQUEST");

    let response = server
        .post("/compare/preview")
        .multipart(
            MultipartForm::new()
                .add_part("csv_file", csv_part(FIRST_CSV, "policies.csv"))
                .add_text("key_columns", "PolicyNumber"),
        )
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_CSV_SCHEMA");
}

#[tokio::test]
async fn test_confirm_unknown_or_malformed_token() {
    let (server, _) = create_test_server(UNDERWRITING_TEXT);

    for token in ["6f1c9a52-3f43-4c4b-9d0e-2f55a0f1b7aa", "not-a-token"] {
        let response = server
            .post("/compare/confirm")
            .json(&json!({ "upload_token": token }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["code"], "TOKEN_NOT_FOUND");
    }
}

#[tokio::test]
async fn test_confirm_after_ttl_is_gone() {
    let forwarder = Arc::new(RecordingForwarder::default());
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let uploads = UploadCache::with_clock(chrono::Duration::seconds(60), clock.clone());
    let state = state_with(UNDERWRITING_TEXT, config(&[]), forwarder.clone(), uploads);
    let server = TestServer::new(build_router(state)).unwrap();

    let preview = server
        .post("/compare/preview")
        .multipart(
            MultipartForm::new()
                .add_part("csv_file", csv_part(FIRST_CSV, "policies.csv"))
                .add_text("forward_url", "http://hooks.test/csv"),
        )
        .await;
    let token = preview.json::<Value>()["token"].as_str().unwrap().to_string();

    clock.advance(chrono::Duration::seconds(61));
    let response = server
        .post("/compare/confirm")
        .json(&json!({ "upload_token": token }))
        .await;
    response.assert_status(StatusCode::GONE);
    assert_eq!(response.json::<Value>()["code"], "TOKEN_EXPIRED");
    assert!(forwarder.calls().is_empty());
}

#[tokio::test]
async fn test_failed_delivery_still_confirms() {
    let forwarder = Arc::new(RecordingForwarder {
        fail: true,
        ..Default::default()
    });
    let config = config(&[]);
    let uploads = UploadCache::new(config.upload_ttl());
    let state = state_with(UNDERWRITING_TEXT, config, forwarder.clone(), uploads);
    let server = TestServer::new(build_router(state)).unwrap();

    let preview = server
        .post("/compare/preview")
        .multipart(MultipartForm::new().add_part("csv_file", csv_part(FIRST_CSV, "policies.csv")))
        .await;
    let token = preview.json::<Value>()["token"].as_str().unwrap().to_string();

    let confirm = server
        .post("/compare/confirm")
        .json(&json!({
            "upload_token": token,
            "forward_url": "http://hooks.test/csv",
            "custom_data": "late note",
        }))
        .await;
    confirm.assert_status_ok();

    let json = confirm.json::<Value>();
    assert_eq!(json["ok"], true);
    assert!(json["delivery"]["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
    assert_eq!(forwarder.calls()[0].1["custom_data"], json!({"_raw": "late note"}));

    let again = server
        .post("/compare/confirm")
        .json(&json!({ "upload_token": token }))
        .await;
    again.assert_status(StatusCode::CONFLICT);
    assert_eq!(forwarder.calls().len(), 1);
}
