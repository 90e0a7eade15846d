//! Application state for the report API

use std::sync::Arc;

use csv_diff::{CsvSnapshot, DiffEntry, DiffSummary};
use extraction_engine::ExtractionEngine;
use report_parser::DocumentParser;
use serde_json::Value;
use shared_types::Forwarder;
use tokio::sync::RwLock;
use upload_cache::UploadCache;

use crate::config::Config;

/// Last confirmed CSV, the default baseline for the next preview
#[derive(Debug, Clone)]
pub struct Baseline {
    pub file_name: String,
    pub snapshot: CsvSnapshot,
}

/// Everything a preview stages for its confirm
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub file: Value,
    pub file_name: String,
    pub snapshot: CsvSnapshot,
    pub summary: DiffSummary,
    pub changes: Vec<DiffEntry>,
    pub custom_data: Option<Value>,
    pub forward_url: Option<String>,
    pub bearer: Option<String>,
    pub basic: Option<String>,
}

pub struct AppState {
    pub config: Config,
    pub engine: ExtractionEngine,
    pub parser: DocumentParser,
    pub uploads: Arc<UploadCache<StagedUpload>>,
    pub baseline: RwLock<Option<Baseline>>,
    pub forwarder: Arc<dyn Forwarder>,
}

impl AppState {
    pub fn new(config: Config, forwarder: Arc<dyn Forwarder>) -> Self {
        let engine = ExtractionEngine::new().with_min_chars(config.min_text_chars);
        let uploads = Arc::new(UploadCache::new(config.upload_ttl()));

        Self {
            config,
            engine,
            parser: DocumentParser::new(),
            uploads,
            baseline: RwLock::new(None),
            forwarder,
        }
    }
}
