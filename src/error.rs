use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipbotError {
    #[error("Couldn't parse range: {0}")]
    Parse(String),

    #[error("{0}")]
    Selection(String),

    #[error("Failed to read the video: {0}")]
    Probe(String),

    #[error("Download failed for clip {index}: {cause}")]
    WindowExtraction { index: usize, cause: String },

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Error during processing: {0}")]
    Worker(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClipbotError {
    /// Errors the router recovers from locally by reprompting the user.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClipbotError::Parse(_) | ClipbotError::Selection(_))
    }
}

pub type Result<T> = std::result::Result<T, ClipbotError>;
