//! Launches worker runs in the background and keeps track of them.
//!
//! Runs for different sessions proceed concurrently. Runs for the same session
//! are serialized behind a per-session lock so two requests from one user never
//! race on the same chat.

use super::{ClipJob, ExtractionWorker, RunReport, RUN_DIR_PREFIX};
use crate::error::Result;
use crate::session::SessionKey;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct RunSupervisor {
    worker: Arc<ExtractionWorker>,
    session_locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
    runs: Mutex<Vec<JoinHandle<RunReport>>>,
    active: Arc<AtomicUsize>,
}

impl RunSupervisor {
    pub fn new(worker: ExtractionWorker) -> Self {
        Self {
            worker: Arc::new(worker),
            session_locks: Mutex::new(HashMap::new()),
            runs: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start `job` in the background.
    ///
    /// Returns `true` when the job has to wait for an earlier run of the same
    /// session to finish first.
    pub async fn launch(&self, job: ClipJob) -> bool {
        let lock = {
            let mut locks = self.session_locks.lock().await;
            // Forget sessions nobody is holding or waiting on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(job.session).or_default().clone()
        };
        let queued = lock.try_lock().is_err();
        if queued {
            info!("Run for {} queued behind an earlier run", job.session);
        }

        let worker = self.worker.clone();
        let active = self.active.clone();
        let handle = tokio::spawn(async move {
            let _guard = lock.lock().await;
            active.fetch_add(1, Ordering::SeqCst);
            let report = worker.run(job).await;
            active.fetch_sub(1, Ordering::SeqCst);
            report
        });

        let mut runs = self.runs.lock().await;
        runs.retain(|h| !h.is_finished());
        runs.push(handle);
        queued
    }

    /// Number of runs currently executing.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Remove run directories left behind by a previous process.
    ///
    /// Only directories named like run directories are touched, and nothing is
    /// removed while a run is executing.
    pub async fn sweep_stale(&self) -> Result<usize> {
        if self.active() > 0 {
            debug!("Skipping sweep, {} run(s) active", self.active());
            return Ok(0);
        }

        let root = &self.worker.settings().work_root;
        if !fs::try_exists(root).await? {
            return Ok(0);
        }

        let mut removed = 0;
        let mut entries = fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(RUN_DIR_PREFIX) {
                continue;
            }
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }

        if removed > 0 {
            info!("Removed {} stale run director(ies)", removed);
        }
        Ok(removed)
    }

    /// Wait for every launched run to finish.
    pub async fn shutdown(&self) -> Vec<RunReport> {
        let handles: Vec<_> = self.runs.lock().await.drain(..).collect();
        if !handles.is_empty() {
            info!("Waiting for {} run(s) to finish", handles.len());
        }

        join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Run task failed: {}", e);
                    None
                }
            })
            .collect()
    }
}
