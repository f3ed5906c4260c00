pub mod ytdlp;

pub use ytdlp::YtDlp;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One entry of the quality menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality {
    /// Format selector passed back to the tool.
    pub selector: String,
    /// Human readable label, e.g. `1080p (webm)`.
    pub label: String,
}

impl Quality {
    pub fn best() -> Self {
        Self {
            selector: "best".to_string(),
            label: "best".to_string(),
        }
    }
}

/// What the tool reports about a source before anything is downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub id: String,
    pub title: String,
    /// Zero when the source does not report a duration.
    pub duration_seconds: u64,
    pub qualities: Vec<Quality>,
}

/// A single download the tool should perform.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    /// Window index this download belongs to, reported back in errors.
    pub index: usize,
    pub url: String,
    pub format_selector: String,
    /// `*HH:MM:SS-HH:MM:SS`, or `None` for the whole source.
    pub section: Option<String>,
    /// Output path without extension; the tool picks the container extension.
    pub output_stem: PathBuf,
    pub timeout: Duration,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn probe(&self, url: &str) -> Result<ProbeInfo>;
    /// Produce one media file next to `request.output_stem`.
    async fn extract(&self, request: &ExtractRequest) -> Result<()>;
    fn name(&self) -> &'static str;
}
