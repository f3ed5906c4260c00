//! In-memory stand-ins for the chat service, the extraction tool and the uploader.

#![allow(dead_code)]

use async_trait::async_trait;
use clipbot::error::{ClipbotError, Result};
use clipbot::extract::{ExtractRequest, Extractor, ProbeInfo, Quality};
use clipbot::transport::{ChatId, ChatTransport, Menu, MessageRef};
use clipbot::upload::Uploader;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text { chat: ChatId, id: i64, text: String },
    Menu { chat: ChatId, id: i64, text: String, menu: Menu },
    Video { chat: ChatId, file: String, caption: Option<String> },
    Edit { id: i64, text: String },
    Delete { id: i64 },
    Answer { callback_id: String },
}

#[derive(Default)]
pub struct FakeTransport {
    pub next_id: AtomicI64,
    pub log: Mutex<Vec<Sent>>,
    /// When set, every video send fails.
    pub fail_videos: bool,
    /// When set, every edit fails.
    pub fail_edits: bool,
    /// When set, every delete fails.
    pub fail_deletes: bool,
}

impl FakeTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn videos(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Video { file, .. } => Some(file),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Delete { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    fn next(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef> {
        let id = self.next();
        self.log.lock().unwrap().push(Sent::Text {
            chat,
            id,
            text: text.to_string(),
        });
        Ok(MessageRef { chat, id })
    }

    async fn send_menu(&self, chat: ChatId, text: &str, menu: &Menu) -> Result<MessageRef> {
        let id = self.next();
        self.log.lock().unwrap().push(Sent::Menu {
            chat,
            id,
            text: text.to_string(),
            menu: menu.clone(),
        });
        Ok(MessageRef { chat, id })
    }

    async fn send_video(&self, chat: ChatId, path: &Path, caption: Option<&str>) -> Result<()> {
        if self.fail_videos {
            return Err(ClipbotError::Transport("sendVideo: Request Entity Too Large".to_string()));
        }
        assert!(path.exists(), "video sent after its file was removed");
        self.log.lock().unwrap().push(Sent::Video {
            chat,
            file: path.file_name().unwrap().to_string_lossy().into_owned(),
            caption: caption.map(str::to_string),
        });
        Ok(())
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<()> {
        if self.fail_edits {
            return Err(ClipbotError::Transport(
                "editMessageText: Too Many Requests: retry after 3".to_string(),
            ));
        }
        self.log.lock().unwrap().push(Sent::Edit {
            id: message.id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<()> {
        if self.fail_deletes {
            return Err(ClipbotError::Transport(
                "deleteMessage: Bad Request: message can't be deleted".to_string(),
            ));
        }
        self.log.lock().unwrap().push(Sent::Delete { id: message.id });
        Ok(())
    }

    async fn answer_button(&self, callback_id: &str) -> Result<()> {
        self.log.lock().unwrap().push(Sent::Answer {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }
}

/// Writes sparse files of configurable size instead of downloading.
pub struct FakeExtractor {
    pub probe: std::result::Result<ProbeInfo, String>,
    /// Window indices whose download fails.
    pub failing: HashSet<usize>,
    /// File size per window index; unlisted windows get 1 KiB.
    pub sizes: HashMap<usize, u64>,
    pub delay: Duration,
    pub probe_delay: Duration,
    pub requests: Mutex<Vec<ExtractRequest>>,
}

impl FakeExtractor {
    pub fn new(duration_seconds: u64) -> Self {
        Self {
            probe: Ok(ProbeInfo {
                id: "vid123".to_string(),
                title: "Test video".to_string(),
                duration_seconds,
                qualities: vec![
                    Quality {
                        selector: "137".to_string(),
                        label: "1080p (mp4)".to_string(),
                    },
                    Quality::best(),
                ],
            }),
            failing: HashSet::new(),
            sizes: HashMap::new(),
            delay: Duration::ZERO,
            probe_delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ExtractRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn probe(&self, _url: &str) -> Result<ProbeInfo> {
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        self.probe.clone().map_err(ClipbotError::Probe)
    }

    async fn extract(&self, request: &ExtractRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(&request.index) {
            return Err(ClipbotError::WindowExtraction {
                index: request.index,
                cause: "ERROR: HTTP Error 403: Forbidden".to_string(),
            });
        }

        let mut path = request.output_stem.clone().into_os_string();
        path.push(".mp4");
        let file = std::fs::File::create(PathBuf::from(path))?;
        file.set_len(self.sizes.get(&request.index).copied().unwrap_or(1024))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
pub struct FakeUploader {
    pub fail: bool,
    pub uploaded: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, path: &Path) -> Result<String> {
        if self.fail {
            return Err(ClipbotError::Delivery("GoFile upload failed: error".to_string()));
        }
        let mut uploaded = self.uploaded.lock().unwrap();
        uploaded.push(path.to_path_buf());
        Ok(format!("https://gofile.io/d/file{}", uploaded.len()))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
