pub mod gofile;

pub use gofile::GofileUploader;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Offloads files too large for the chat transport.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `path` and return a public download link.
    async fn upload(&self, path: &Path) -> Result<String>;
    fn name(&self) -> &'static str;
}
