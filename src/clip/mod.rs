pub mod planner;
pub mod range;

pub use planner::{plan, plan_range};
pub use range::{format_hms, parse_range, parse_time};

use std::path::PathBuf;

/// A contiguous interval of the source to extract as one clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// 1-based position in the run.
    pub index: usize,
    pub start_seconds: u64,
    pub end_seconds: u64,
}

impl Window {
    /// Get the length of this window in seconds.
    pub fn length(&self) -> u64 {
        self.end_seconds.saturating_sub(self.start_seconds)
    }

    /// Section selector understood by yt-dlp, e.g. `*00:01:23-00:02:00`.
    pub fn section(&self) -> String {
        format!(
            "*{}-{}",
            format_hms(self.start_seconds),
            format_hms(self.end_seconds)
        )
    }
}

/// A file produced for one window, owned by the run that created it.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub window_index: usize,
}
