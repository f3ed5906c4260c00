use crate::error::{ClipbotError, Result};
use crate::upload::Uploader;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// GoFile API endpoint for server discovery.
const GOFILE_API_URL: &str = "https://api.gofile.io";

/// Maximum attempts per upload.
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 500;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Characters of an unparseable response body kept in the error.
const MAX_BODY_EXCERPT: usize = 200;

/// Client for [GoFile](https://gofile.io) anonymous or token-authenticated uploads.
pub struct GofileUploader {
    client: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
    upload_base: Option<String>,
}

impl GofileUploader {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            api_base: GOFILE_API_URL.to_string(),
            upload_base: None,
        }
    }

    /// Point the client at other hosts; the upload host otherwise comes from server discovery.
    pub fn with_endpoints(mut self, api_base: impl Into<String>, upload_base: Option<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base;
        self
    }

    /// Ask GoFile which storage server should receive the upload.
    async fn pick_server(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/servers", self.api_base))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let parsed: ApiResponse<ServersData> = response.json().await?;
        if parsed.status != "ok" {
            return Err(ClipbotError::Delivery(format!(
                "GoFile server lookup failed: {}",
                parsed.status
            )));
        }

        parsed
            .data
            .and_then(|d| d.servers.into_iter().next())
            .map(|s| s.name)
            .ok_or_else(|| ClipbotError::Delivery("GoFile returned no servers".to_string()))
    }

    fn upload_url(&self, server: &str) -> String {
        match self.upload_base {
            Some(ref base) => format!("{base}/contents/uploadfile"),
            None => format!("https://{server}.gofile.io/contents/uploadfile"),
        }
    }

    async fn build_form(path: &Path) -> Result<Form> {
        let file = fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("clip.mp4")
            .to_string();

        let part = Part::stream_with_length(Body::from(file), length)
            .file_name(file_name)
            .mime_str("video/mp4")?;
        Ok(Form::new().part("file", part))
    }

    async fn call_api(&self, path: &Path) -> Result<String> {
        let server = self.pick_server().await?;
        let form = Self::build_form(path).await?;

        let mut request = self
            .client
            .post(self.upload_url(&server))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await?;
        let status = response.status();
        debug!("GoFile upload response status: {}", status);

        let body = response.text().await?;
        let parsed: ApiResponse<UploadData> = serde_json::from_str(&body).map_err(|_| {
            ClipbotError::Delivery(format!(
                "GoFile upload error ({}): {}",
                status,
                body.chars().take(MAX_BODY_EXCERPT).collect::<String>()
            ))
        })?;

        match parsed.data {
            Some(data) if parsed.status == "ok" => Ok(data.download_page),
            _ => Err(ClipbotError::Delivery(format!(
                "GoFile upload failed: {}",
                parsed.status
            ))),
        }
    }
}

#[async_trait]
impl Uploader for GofileUploader {
    async fn upload(&self, path: &Path) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.call_api(path).await {
                Ok(link) => {
                    info!("Uploaded {} to {}", path.display(), link);
                    return Ok(link);
                }
                Err(ClipbotError::Io(e)) => return Err(ClipbotError::Io(e)),
                Err(e) => {
                    warn!("Upload attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ClipbotError::Delivery("Unknown error".to_string())))
    }

    fn name(&self) -> &'static str {
        "GoFile"
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ServersData {
    servers: Vec<Server>,
}

#[derive(Debug, Deserialize)]
struct Server {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadData {
    download_page: String,
}
