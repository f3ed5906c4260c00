pub mod progress;
pub mod supervisor;

pub use progress::{ProgressReporter, Status};
pub use supervisor::RunSupervisor;

use crate::clip::{plan, plan_range, Artifact, Window};
use crate::config::{DIRECT_DELIVERY_LIMIT, FULL_VIDEO_TIMEOUT, WINDOW_TIMEOUT};
use crate::error::{ClipbotError, Result};
use crate::extract::{ExtractRequest, Extractor};
use crate::session::{Selection, SessionKey};
use crate::transport::{best_effort, ChatId, ChatTransport};
use crate::upload::Uploader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, info, warn};

/// Prefix of every per-run working directory.
pub const RUN_DIR_PREFIX: &str = "run-";

/// Marker recorded in place of a link when an offload fails.
pub const UPLOAD_FAILED: &str = "upload_failed";

/// Marker listed in the summary for a clip that could not be sent inline.
pub const SEND_FAILED: &str = "send_failed";

/// What a finalized request asks the worker to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    Clips {
        clip_length: u64,
        clip_count: usize,
        custom_range: Option<(u64, u64)>,
    },
    FullVideo,
}

/// A finalized selection, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipJob {
    pub session: SessionKey,
    pub source_url: String,
    pub source_id: String,
    pub title: String,
    pub format_selector: String,
    pub kind: JobKind,
}

impl ClipJob {
    pub fn from_selection(session: SessionKey, selection: Selection) -> Self {
        let kind = match selection.clip_length_seconds {
            Some(clip_length) => JobKind::Clips {
                clip_length,
                clip_count: selection.clip_count.unwrap_or(1),
                custom_range: selection.custom_range,
            },
            None => JobKind::FullVideo,
        };

        Self {
            session,
            source_url: selection.source_url,
            source_id: selection.source_id,
            title: selection.title,
            format_selector: selection.format_selector.unwrap_or_else(|| "best".to_string()),
            kind,
        }
    }

    pub fn chat(&self) -> ChatId {
        self.session.chat
    }

    /// Windows to cut from a source of `total` seconds. Empty for full downloads.
    ///
    /// A custom range is cut as a single window whatever count was picked.
    pub fn windows(&self, total: u64) -> Vec<Window> {
        match self.kind {
            JobKind::Clips {
                custom_range: Some((start, end)),
                ..
            } => plan_range(total, start, end),
            JobKind::Clips {
                clip_length,
                clip_count,
                ..
            } => plan(total, clip_length, clip_count),
            JobKind::FullVideo => Vec::new(),
        }
    }

    /// Short description for the acknowledgement message.
    pub fn describe(&self) -> String {
        match self.kind {
            JobKind::Clips {
                custom_range: Some(_),
                ..
            } => "your custom clip".to_string(),
            JobKind::Clips { clip_count, .. } => {
                format!("{} clip{}", clip_count, if clip_count == 1 { "" } else { "s" })
            }
            JobKind::FullVideo => "the full video".to_string(),
        }
    }
}

/// Knobs of the worker; the defaults are the production policy.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Shared root under which each run creates its own directory.
    pub work_root: PathBuf,
    /// Files strictly smaller than this are sent inline.
    pub delivery_limit: u64,
    pub window_timeout: Duration,
    pub full_video_timeout: Duration,
}

impl WorkerSettings {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            delivery_limit: DIRECT_DELIVERY_LIMIT,
            window_timeout: WINDOW_TIMEOUT,
            full_video_timeout: FULL_VIDEO_TIMEOUT,
        }
    }
}

/// What happened during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub windows_planned: usize,
    /// Indices of windows that produced nothing.
    pub failed_windows: Vec<usize>,
    /// Artifacts sent inline.
    pub delivered: usize,
    /// `(window index, link or UPLOAD_FAILED)` for offloaded artifacts.
    pub offloaded: Vec<(usize, String)>,
    /// Indices of artifacts whose inline send failed; listed as `SEND_FAILED`.
    pub send_failures: Vec<usize>,
    /// The short cause of an aborted run.
    pub error: Option<String>,
    pub summary_sent: bool,
}

/// One download the worker hands to the extractor.
struct Task {
    index: usize,
    section: Option<String>,
    stem: String,
    timeout: Duration,
    phase: String,
}

/// Cuts the windows of a job, delivers the results and cleans up after itself.
pub struct ExtractionWorker {
    extractor: Arc<dyn Extractor>,
    uploader: Arc<dyn Uploader>,
    transport: Arc<dyn ChatTransport>,
    settings: WorkerSettings,
}

impl ExtractionWorker {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        uploader: Arc<dyn Uploader>,
        transport: Arc<dyn ChatTransport>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            extractor,
            uploader,
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Execute a job to completion.
    ///
    /// Everything the user sees goes through the transport; the report is for
    /// logging and tests. The status message and the run directory are removed
    /// on every path out of this function.
    pub async fn run(&self, job: ClipJob) -> RunReport {
        let started = Instant::now();
        let chat = job.chat();
        let mut report = RunReport::default();
        let mut progress = ProgressReporter::start(self.transport.clone(), chat).await;

        info!(
            "Run for {} started: {} from {}",
            job.session,
            job.describe(),
            job.source_url
        );

        let workdir = self.create_workdir(&job.source_id).await;
        let outcome = match workdir {
            Ok(ref dir) => {
                self.execute(&job, dir.path(), &mut progress, &mut report)
                    .await
            }
            Err(ref e) => Err(ClipbotError::Worker(format!(
                "could not create working directory: {e}"
            ))),
        };

        if let Err(e) = outcome {
            warn!("Run for {} aborted: {}", job.session, e);
            let message = user_message(&e);
            report.error = Some(message.clone());
            best_effort("error message", self.transport.send_text(chat, &message)).await;
        }

        // Cleanup
        progress.finish().await;
        if let Ok(dir) = workdir {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove {}: {}", path.display(), e);
            } else {
                debug!("Removed run directory {}", path.display());
            }
        }

        info!(
            "Run for {} finished in {:.1}s: {} delivered, {} offloaded, {} failed windows",
            job.session,
            started.elapsed().as_secs_f64(),
            report.delivered,
            report.offloaded.len(),
            report.failed_windows.len()
        );
        report
    }

    async fn create_workdir(&self, source_id: &str) -> Result<TempDir> {
        fs::create_dir_all(&self.settings.work_root).await?;
        let prefix = format!("{}{}-", RUN_DIR_PREFIX, safe_filename(source_id));
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&self.settings.work_root)?;
        debug!("Using run directory {}", dir.path().display());
        Ok(dir)
    }

    async fn execute(
        &self,
        job: &ClipJob,
        dir: &Path,
        progress: &mut ProgressReporter,
        report: &mut RunReport,
    ) -> Result<()> {
        let chat = job.chat();

        progress.update(0, "Reading video info").await;
        let probe = self.extractor.probe(&job.source_url).await?;
        let id = safe_filename(&probe.id);

        let tasks = self.plan_tasks(job, probe.duration_seconds, &id);
        report.windows_planned = tasks.len();

        // Stage 1: extraction, one window at a time
        let total = tasks.len();
        let mut artifacts = Vec::with_capacity(total);
        for (done, task) in tasks.iter().enumerate() {
            progress
                .update(percent(done, total), task.phase.as_str())
                .await;

            match self.extract_one(job, dir, task).await {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => {
                    warn!("Window {} of {} failed: {}", task.index, job.session, e);
                    report.failed_windows.push(task.index);
                    best_effort(
                        "failure notice",
                        self.transport.send_text(chat, &user_message(&e)),
                    )
                    .await;
                }
            }

            progress
                .update(
                    percent(done + 1, total),
                    format!("Downloaded {}/{}", done + 1, total),
                )
                .await;
        }

        // Stage 2: delivery in window order
        let produced = artifacts.len();
        for (position, artifact) in artifacts.iter().enumerate() {
            self.deliver(chat, artifact, position + 1, produced, progress, report)
                .await;
        }

        // Stage 3: exactly one summary
        let summary = summarize(report, produced);
        self.transport.send_text(chat, &summary).await?;
        report.summary_sent = true;
        Ok(())
    }

    fn plan_tasks(&self, job: &ClipJob, total: u64, id: &str) -> Vec<Task> {
        if job.kind == JobKind::FullVideo {
            return vec![Task {
                index: 1,
                section: None,
                stem: format!("full_{id}"),
                timeout: self.settings.full_video_timeout,
                phase: "Downloading full video".to_string(),
            }];
        }

        let windows = job.windows(total);
        let count = windows.len();
        windows
            .into_iter()
            .map(|w| Task {
                index: w.index,
                section: Some(w.section()),
                stem: format!("clip_{}_{}", id, w.index),
                timeout: self.settings.window_timeout,
                phase: format!("Downloading clip {}/{}", w.index, count),
            })
            .collect()
    }

    async fn extract_one(&self, job: &ClipJob, dir: &Path, task: &Task) -> Result<Artifact> {
        let request = ExtractRequest {
            index: task.index,
            url: job.source_url.clone(),
            format_selector: job.format_selector.clone(),
            section: task.section.clone(),
            output_stem: dir.join(&task.stem),
            timeout: task.timeout,
        };
        self.extractor.extract(&request).await?;

        find_artifact(dir, &task.stem, task.index)
            .await?
            .ok_or_else(|| ClipbotError::WindowExtraction {
                index: task.index,
                cause: "file not found after download".to_string(),
            })
    }

    async fn deliver(
        &self,
        chat: ChatId,
        artifact: &Artifact,
        position: usize,
        produced: usize,
        progress: &mut ProgressReporter,
        report: &mut RunReport,
    ) {
        let path = &artifact.local_path;

        if artifact.size_bytes < self.settings.delivery_limit {
            let caption = format!("{position}/{produced}");
            match self
                .transport
                .send_video(chat, path, Some(caption.as_str()))
                .await
            {
                Ok(()) => {
                    report.delivered += 1;
                    remove_artifact(path).await;
                }
                Err(e) => {
                    warn!("Sending clip {} failed: {}", artifact.window_index, e);
                    report.send_failures.push(artifact.window_index);
                }
            }
            return;
        }

        progress.update(90, "Uploading large clip...").await;
        info!(
            "Clip {} is {} bytes, offloading to {}",
            artifact.window_index,
            artifact.size_bytes,
            self.uploader.name()
        );
        match self.uploader.upload(path).await {
            Ok(link) => {
                report.offloaded.push((artifact.window_index, link));
                remove_artifact(path).await;
            }
            Err(e) => {
                warn!("Upload of clip {} failed: {}", artifact.window_index, e);
                report
                    .offloaded
                    .push((artifact.window_index, UPLOAD_FAILED.to_string()));
            }
        }
    }
}

/// Locate the file the tool wrote for `stem`, ignoring partial downloads.
pub async fn find_artifact(dir: &Path, stem: &str, index: usize) -> Result<Option<Artifact>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut newest: Option<(std::time::SystemTime, Artifact)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let matches_stem = name
            .strip_prefix(stem)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'));
        if !matches_stem || name.ends_with(".part") || name.ends_with(".ytdl") {
            continue;
        }

        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((
                modified,
                Artifact {
                    local_path: entry.path(),
                    size_bytes: metadata.len(),
                    window_index: index,
                },
            ));
        }
    }

    Ok(newest.map(|(_, artifact)| artifact))
}

/// Replace anything but word characters, `-` and `.` so ids are safe in file names.
pub fn safe_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(180)
        .collect();
    if cleaned.is_empty() {
        "vid".to_string()
    } else {
        cleaned
    }
}

fn percent(done: usize, total: usize) -> u8 {
    (100 * done / total.max(1)).min(100) as u8
}

async fn remove_artifact(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}

fn summarize(report: &RunReport, produced: usize) -> String {
    let mut lines: Vec<(usize, &str)> = report
        .offloaded
        .iter()
        .map(|(i, link)| (*i, link.as_str()))
        .chain(report.send_failures.iter().map(|&i| (i, SEND_FAILED)))
        .collect();
    if !lines.is_empty() {
        lines.sort_by_key(|(i, _)| *i);
        let lines: Vec<&str> = lines.into_iter().map(|(_, l)| l).collect();
        return format!("Done. Large files uploaded:\n{}", lines.join("\n"));
    }
    if produced == 0 || report.delivered == 0 {
        return "Done, but no clips could be delivered.".to_string();
    }
    "Done. Clips sent.".to_string()
}

/// Shown in place of transport, IO and HTTP failures.
const GENERIC_FAILURE: &str = "something went wrong, please try again later";

/// The short text shown to the user for a failure.
fn user_message(error: &ClipbotError) -> String {
    match error {
        ClipbotError::Probe(_)
        | ClipbotError::Worker(_)
        | ClipbotError::WindowExtraction { .. }
        | ClipbotError::Delivery(_) => error.to_string(),
        // Plumbing errors stay in the log
        _ => ClipbotError::Worker(GENERIC_FAILURE.to_string()).to_string(),
    }
}
