//! Server configuration
//!
//! Every option can come from the command line or the environment (a `.env`
//! file is loaded first by `main`).

use clap::Parser;
use shared_types::{AuthMaterial, ForwardTarget};

/// Longest accepted preview lifetime (one week)
pub const MAX_UPLOAD_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Parser, Debug, Clone)]
#[command(name = "report-api")]
#[command(about = "Report intake server: PDF report extraction and CSV preview/confirm")]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Per-file upload limit in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value = "20")]
    pub max_upload_mb: usize,

    /// Lifetime of a CSV preview token
    #[arg(
        long,
        env = "UPLOAD_TTL_SECS",
        default_value = "900",
        value_parser = clap::value_parser!(i64).range(1..=MAX_UPLOAD_TTL_SECS)
    )]
    pub upload_ttl_secs: i64,

    /// How often expired previews are swept
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "60")]
    pub sweep_interval_secs: u64,

    /// Minimum characters a backend must extract to count as a success
    #[arg(long, env = "MIN_TEXT_CHARS", default_value = "50")]
    pub min_text_chars: usize,

    /// Destination used when a request names none
    #[arg(long, env = "FORWARD_URL")]
    pub forward_url: Option<String>,

    /// Bearer token used when a request supplies no credentials
    #[arg(long, env = "FORWARD_BEARER", hide_env_values = true)]
    pub forward_bearer: Option<String>,

    /// Timeout for a single forward request
    #[arg(long, env = "FORWARD_TIMEOUT_SECS", default_value = "30")]
    pub forward_timeout_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    pub fn upload_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.upload_ttl_secs)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn forward_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.forward_timeout_secs)
    }

    /// Resolve where a result goes.
    ///
    /// The first non-blank URL in `urls` wins, then the configured default.
    /// Credentials work the same way: the first source that supplies a bearer
    /// or basic credential is used, and the configured bearer is the last
    /// resort. Returns `None` when no destination is known.
    pub fn forward_target(
        &self,
        urls: &[Option<&str>],
        credentials: &[(Option<&str>, Option<&str>)],
    ) -> Option<ForwardTarget> {
        let url = urls
            .iter()
            .copied()
            .chain(std::iter::once(self.forward_url.as_deref()))
            .flatten()
            .map(str::trim)
            .find(|u| !u.is_empty())?;

        let auth = credentials
            .iter()
            .find_map(|(bearer, basic)| AuthMaterial::from_parts(*bearer, *basic))
            .or_else(|| AuthMaterial::from_parts(self.forward_bearer.as_deref(), None));

        Some(ForwardTarget::new(url, auth))
    }
}
