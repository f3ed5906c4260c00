use crate::error::{ClipbotError, Result};
use crate::extract::{ExtractRequest, Extractor, ProbeInfo, Quality};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::ffi::OsString;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, trace};

pub const YT_DLP: &str = "yt-dlp";

/// Timeout for reading metadata.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Retries yt-dlp performs on its own before giving up on a download.
const TOOL_RETRIES: u32 = 3;

/// Longest cause string shown to users.
const MAX_CAUSE_LEN: usize = 200;

/// Interface for the [yt-dlp](https://github.com/yt-dlp/yt-dlp) program.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: OsString,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self {
            program: OsString::from(YT_DLP),
        }
    }
}

impl YtDlp {
    /// Use a specific executable instead of `yt-dlp` from `PATH`.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Verify that the binary is reachable and report its version.
    pub async fn check(&self) -> Result<String> {
        let output = self
            .run(vec!["--version".into()], Duration::from_secs(15))
            .await
            .map_err(|e| {
                ClipbotError::Config(format!(
                    "yt-dlp not found. Install it with: pip install yt-dlp. Error: {e}"
                ))
            })?;

        if !output.status.success() {
            return Err(ClipbotError::Config("yt-dlp check failed".to_string()));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("yt-dlp {} is available", version);
        Ok(version)
    }

    /// Run the tool, returning its raw output.
    ///
    /// Fails only if the program could not be started or exceeded `timeout`;
    /// a non-zero exit status is left for the caller to inspect.
    async fn run(&self, args: Vec<OsString>, timeout: Duration) -> Result<Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Executing command: {:?}", cmd.as_std());
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                ClipbotError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("timed out after {}s", timeout.as_secs()),
                ))
            })??;

        debug!("status: {}", output.status);
        trace!("stderr: {:?}", String::from_utf8_lossy(&output.stderr));
        Ok(output)
    }

    fn extract_args(request: &ExtractRequest) -> Vec<OsString> {
        let mut template = request.output_stem.clone().into_os_string();
        template.push(".%(ext)s");

        let mut args: Vec<OsString> = vec![
            "-4".into(),
            "--no-playlist".into(),
            "--socket-timeout".into(),
            "30".into(),
            "--retries".into(),
            TOOL_RETRIES.to_string().into(),
            "-f".into(),
            request.format_selector.clone().into(),
            "--merge-output-format".into(),
            "mp4".into(),
        ];
        if let Some(ref section) = request.section {
            args.push("--download-sections".into());
            args.push(section.into());
        }
        args.push("-o".into());
        args.push(template);
        args.push("--".into());
        args.push(request.url.clone().into());
        args
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn probe(&self, url: &str) -> Result<ProbeInfo> {
        let args: Vec<OsString> = vec![
            "-q".into(),
            "--no-warnings".into(),
            "--no-playlist".into(),
            "--skip-download".into(),
            "-j".into(),
            "--".into(),
            url.into(),
        ];
        let output = self
            .run(args, PROBE_TIMEOUT)
            .await
            .map_err(|e| ClipbotError::Probe(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp probe failed for {}: {}", url, stderr);
            return Err(ClipbotError::Probe(short_cause(&stderr)));
        }

        let info: VideoInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| ClipbotError::Probe(format!("Could not parse metadata: {e}")))?;
        let probe = info.into_probe();

        info!(
            "Probed {} ({}): {}s, {} qualities",
            probe.id,
            probe.title,
            probe.duration_seconds,
            probe.qualities.len()
        );
        Ok(probe)
    }

    async fn extract(&self, request: &ExtractRequest) -> Result<()> {
        let fail = |cause: String| ClipbotError::WindowExtraction {
            index: request.index,
            cause,
        };

        let output = self
            .run(Self::extract_args(request), request.timeout)
            .await
            .map_err(|e| fail(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            debug!("yt-dlp failed for clip {}: {}", request.index, stderr);
            let diagnostics = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(fail(short_cause(&diagnostics)));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Reduce tool diagnostics to one line fit for a chat message.
fn short_cause(diagnostics: &str) -> String {
    let lines: Vec<&str> = diagnostics
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let line = lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or(lines.last())
        .copied()
        .unwrap_or("process failed");

    let mut cause: String = line.chars().take(MAX_CAUSE_LEN).collect();
    if line.chars().count() > MAX_CAUSE_LEN {
        cause.push('…');
    }
    cause
}

// yt-dlp `-j` output, reduced to what we use

#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<VideoFormat>,
}

#[derive(Debug, Deserialize)]
struct VideoFormat {
    format_id: Option<String>,
    height: Option<u32>,
    ext: Option<String>,
    format: Option<String>,
}

impl VideoInfo {
    fn into_probe(self) -> ProbeInfo {
        let qualities = list_qualities(&self.formats);
        ProbeInfo {
            id: self.id.unwrap_or_else(|| "vid".to_string()),
            title: self.title.unwrap_or_else(|| "video".to_string()),
            duration_seconds: self.duration.map_or(0, |d| d.max(0.0) as u64),
            qualities,
        }
    }
}

/// Quality options sorted by height, tallest first.
fn list_qualities(formats: &[VideoFormat]) -> Vec<Quality> {
    let mut seen = HashSet::new();
    let mut candidates: Vec<(u32, Quality)> = formats
        .iter()
        .filter_map(|f| {
            let selector = f.format_id.clone()?;
            let height = f.height.unwrap_or(0);
            let label = if height > 0 {
                format!("{}p ({})", height, f.ext.as_deref().unwrap_or(""))
            } else {
                f.format.clone().unwrap_or_else(|| selector.clone())
            };
            seen.insert((selector.clone(), label.clone()))
                .then_some((height, Quality { selector, label }))
        })
        .collect();

    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    if candidates.is_empty() {
        return vec![Quality::best()];
    }
    candidates.into_iter().map(|(_, q)| q).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_probe_json() {
        let json = r#"{
            "id": "dQw4w9WgXcQ",
            "title": "Some title",
            "duration": 212.4,
            "formats": [
                {"format_id": "140", "ext": "m4a", "format": "140 - audio only"},
                {"format_id": "18", "height": 360, "ext": "mp4"},
                {"format_id": "137", "height": 1080, "ext": "mp4"},
                {"format_id": "18", "height": 360, "ext": "mp4"},
                {"height": 720, "ext": "mp4"}
            ]
        }"#;
        let info: VideoInfo = serde_json::from_str(json).unwrap();
        let probe = info.into_probe();

        assert_eq!(probe.id, "dQw4w9WgXcQ");
        assert_eq!(probe.duration_seconds, 212);
        let labels: Vec<&str> = probe.qualities.iter().map(|q| q.label.as_str()).collect();
        assert_eq!(labels, vec!["1080p (mp4)", "360p (mp4)", "140 - audio only"]);
        assert_eq!(probe.qualities[0].selector, "137");
    }

    #[test]
    fn test_probe_without_formats_falls_back_to_best() {
        let info: VideoInfo = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        let probe = info.into_probe();
        assert_eq!(probe.qualities, vec![Quality::best()]);
        assert_eq!(probe.duration_seconds, 0);
        assert_eq!(probe.title, "video");
    }

    #[test]
    fn test_extract_args() {
        let request = ExtractRequest {
            index: 2,
            url: "https://youtu.be/abc".to_string(),
            format_selector: "22".to_string(),
            section: Some("*00:01:00-00:01:10".to_string()),
            output_stem: PathBuf::from("/tmp/run/clip_abc_2"),
            timeout: Duration::from_secs(600),
        };
        let args: Vec<String> = YtDlp::extract_args(&request)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.windows(2).any(|w| w == ["-f", "22"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["--download-sections", "*00:01:00-00:01:10"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["-o", "/tmp/run/clip_abc_2.%(ext)s"]));
        assert_eq!(&args[args.len() - 2..], ["--", "https://youtu.be/abc"]);
    }

    #[test]
    fn test_extract_args_full_video_has_no_section() {
        let request = ExtractRequest {
            index: 1,
            url: "https://youtu.be/abc".to_string(),
            format_selector: "best".to_string(),
            section: None,
            output_stem: PathBuf::from("full_abc"),
            timeout: Duration::from_secs(900),
        };
        let args = YtDlp::extract_args(&request);
        assert!(!args.iter().any(|a| a == "--download-sections"));
    }

    #[test]
    fn test_short_cause() {
        let stderr = "[youtube] abc: Downloading webpage\nERROR: [youtube] abc: Video unavailable\n";
        assert_eq!(short_cause(stderr), "ERROR: [youtube] abc: Video unavailable");
        assert_eq!(short_cause("just one line"), "just one line");
        assert_eq!(short_cause(""), "process failed");
        assert_eq!(short_cause(&"x".repeat(500)).chars().count(), MAX_CAUSE_LEN + 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_download_times_out_and_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = dir.path().join("slow-yt-dlp");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nsleep 2\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let request = ExtractRequest {
            index: 3,
            url: "https://youtu.be/abc".to_string(),
            format_selector: "best".to_string(),
            section: Some("*00:00:00-00:00:10".to_string()),
            output_stem: dir.path().join("clip_abc_3"),
            timeout: Duration::from_secs(1),
        };
        let result = YtDlp::with_program(&script).extract(&request).await;

        match result {
            Err(ClipbotError::WindowExtraction { index, cause }) => {
                assert_eq!(index, 3);
                assert!(cause.contains("timed out after 1s"), "{cause}");
            }
            other => panic!("Expected a window failure, got {other:?}"),
        }

        // The script never reaches its last line once killed
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_missing_program_fails_probe() {
        let ytdlp = YtDlp::with_program("/nonexistent/yt-dlp");
        let result = ytdlp.probe("https://youtu.be/abc").await;
        assert!(matches!(result, Err(ClipbotError::Probe(_))));
    }
}
