use crate::error::{ClipbotError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Hard ceiling for a single clip, whatever the configuration says.
pub const HARD_MAX_CLIP_SECONDS: u64 = 180;

/// Files strictly smaller than this are sent inline; anything else is offloaded.
pub const DIRECT_DELIVERY_LIMIT: u64 = 20 * 1024 * 1024;

/// Per-window timeout for the extraction tool.
pub const WINDOW_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for a full-video download.
pub const FULL_VIDEO_TIMEOUT: Duration = Duration::from_secs(900);

/// Shortest clip worth cutting; bounds how many clips a source can yield.
pub const MIN_CLIP_UNIT_SECONDS: u64 = 5;

/// Limits enforced by the interaction router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_clip_seconds: u64,
    pub max_clips: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_clip_seconds: HARD_MAX_CLIP_SECONDS,
            max_clips: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot_token: Option<String>,
    pub admin_id: Option<i64>,
    pub tmp_dir: PathBuf,
    pub gofile_api_key: Option<String>,
    pub max_clip_seconds: u64,
    pub max_clips: u32,
    /// Long-polling timeout for the chat transport, in seconds.
    pub poll_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            admin_id: None,
            tmp_dir: PathBuf::from("tmp_clips"),
            gofile_api_key: None,
            max_clip_seconds: HARD_MAX_CLIP_SECONDS,
            max_clips: 5,
            poll_timeout: 30,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                match toml::from_str::<Config>(&contents) {
                    Ok(file_config) => config = file_config,
                    Err(e) => tracing::warn!("Ignoring malformed {}: {}", config_path.display(), e),
                }
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `KEY=value` style overrides, then clamp the clip length.
    pub fn apply_overrides<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = get("BOT_TOKEN") {
            self.bot_token = Some(token);
        }
        if let Some(id) = get("ADMIN_ID").and_then(|v| v.parse().ok()) {
            self.admin_id = Some(id);
        }
        if let Some(dir) = get("TMP_DIR") {
            self.tmp_dir = PathBuf::from(dir);
        }
        if let Some(key) = get("GOFILE_API_KEY").filter(|k| !k.is_empty()) {
            self.gofile_api_key = Some(key);
        }
        if let Some(secs) = get("MAX_CLIP_SECONDS").and_then(|v| v.parse().ok()) {
            self.max_clip_seconds = secs;
        }
        if let Some(n) = get("MAX_CLIPS").and_then(|v| v.parse().ok()) {
            self.max_clips = n;
        }

        self.max_clip_seconds = self.max_clip_seconds.min(HARD_MAX_CLIP_SECONDS);
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot_token.as_deref().map_or(true, str::is_empty) {
            return Err(ClipbotError::Config(
                "BOT_TOKEN not set. Export it with: export BOT_TOKEN=123456:ABC...".to_string(),
            ));
        }

        if self.max_clip_seconds == 0 {
            return Err(ClipbotError::Config(
                "MAX_CLIP_SECONDS must be greater than 0".to_string(),
            ));
        }

        if self.max_clips == 0 {
            return Err(ClipbotError::Config(
                "MAX_CLIPS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_clip_seconds: self.max_clip_seconds.min(HARD_MAX_CLIP_SECONDS),
            max_clips: self.max_clips,
        }
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("clipbot").join("config.toml"))
    }
}
