//! Job store: in-memory cache with write-through JSON persistence.
//!
//! Every mutation is serialized to `<workspace>/job.json` before the call
//! returns, so jobs survive a process restart. On construction the store
//! scans the jobs root and rehydrates any previously persisted jobs;
//! malformed documents are logged and skipped.

use crate::jobs::{InputKind, Job};
use crate::workspace::Workspace;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Error type for job store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// No job with the given id exists.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Failed to allocate the job workspace on disk.
    #[error("failed to create workspace: {0}")]
    Workspace(#[from] crate::workspace::WorkspaceError),

    /// IO error accessing the jobs root.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// In-memory map of jobs backed by per-job `job.json` files.
///
/// All mutating operations are serialized behind a single async mutex; the
/// JSON write happens inside the critical section so the document on disk
/// always matches the cached record.
pub struct JobStore {
    jobs: Mutex<HashMap<String, Job>>,
    jobs_root: PathBuf,
}

impl JobStore {
    /// Open a store rooted at `jobs_root`, creating the directory when
    /// missing and rehydrating any persisted jobs.
    pub fn open(jobs_root: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&jobs_root)?;

        let mut jobs = HashMap::new();
        for entry in fs::read_dir(&jobs_root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let job_id = entry.file_name().to_string_lossy().to_string();
            match load_job_document(&jobs_root, &job_id) {
                Ok(Some(job)) => {
                    jobs.insert(job.job_id.clone(), job);
                }
                Ok(None) => {
                    warn!(%job_id, "job directory without job.json, skipping");
                }
                Err(err) => {
                    warn!(%job_id, %err, "failed to load persisted job, skipping");
                }
            }
        }

        if !jobs.is_empty() {
            info!(count = jobs.len(), root = %jobs_root.display(), "rehydrated persisted jobs");
        }

        Ok(Self {
            jobs: Mutex::new(jobs),
            jobs_root,
        })
    }

    /// Create a new job, allocate its workspace, and persist it.
    pub async fn create(
        &self,
        input_kind: InputKind,
        input_filename: &str,
    ) -> Result<Job, StoreError> {
        let job = Job::new(input_kind, input_filename);

        let workspace = self.workspace(&job.job_id);
        workspace.create()?;

        let mut jobs = self.jobs.lock().await;
        persist_job(&workspace, &job);
        jobs.insert(job.job_id.clone(), job.clone());

        info!(
            job_id = %job.job_id,
            kind = %job.input_kind,
            file = %job.input_filename,
            "job created"
        );
        Ok(job)
    }

    /// Return the job with `job_id`, falling back to disk when not cached.
    pub async fn get(&self, job_id: &str) -> Option<Job> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get(job_id) {
            return Some(job.clone());
        }

        // Cold cache: recover from the persisted document if present.
        match load_job_document(&self.jobs_root, job_id) {
            Ok(Some(job)) => {
                jobs.insert(job.job_id.clone(), job.clone());
                Some(job)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(job_id, %err, "failed to read persisted job");
                None
            }
        }
    }

    /// Apply `mutate` to the job, refresh `updated_at`, and persist.
    pub async fn update<F>(&self, job_id: &str, mutate: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.lock().await;

        if !jobs.contains_key(job_id) {
            // Same disk fallback as `get`, under the same lock.
            match load_job_document(&self.jobs_root, job_id) {
                Ok(Some(job)) => {
                    jobs.insert(job.job_id.clone(), job);
                }
                _ => return Err(StoreError::NotFound(job_id.to_string())),
            }
        }

        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        mutate(job);
        job.touch();

        let updated = job.clone();
        persist_job(&self.workspace(job_id), &updated);
        debug!(job_id, status = %updated.status, "job updated");
        Ok(updated)
    }

    /// All known jobs, newest first.
    pub async fn list(&self) -> Vec<Job> {
        let jobs = self.jobs.lock().await;
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Delete a job from memory and remove its directory tree.
    ///
    /// Returns `true` when the job existed in memory or on disk.
    pub async fn delete(&self, job_id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        let in_memory = jobs.remove(job_id).is_some();

        let workspace = self.workspace(job_id);
        let on_disk = workspace.root().exists();
        if on_disk {
            if let Err(err) = workspace.destroy() {
                error!(job_id, %err, "failed to remove job directory");
            }
        }

        if in_memory || on_disk {
            info!(job_id, "job deleted");
            true
        } else {
            warn!(job_id, "delete requested for unknown job");
            false
        }
    }

    /// Workspace handle for `job_id`.
    pub fn workspace(&self, job_id: &str) -> Workspace {
        Workspace::new(&self.jobs_root, job_id)
    }
}

/// Serialize `job` to its `job.json`. Persistence failure is logged but does
/// not roll back the in-memory state.
fn persist_job(workspace: &Workspace, job: &Job) {
    let json = match serde_json::to_string_pretty(job) {
        Ok(json) => json,
        Err(err) => {
            error!(job_id = %job.job_id, %err, "failed to serialize job");
            return;
        }
    };
    if let Err(err) = fs::write(workspace.job_file(), json) {
        error!(job_id = %job.job_id, %err, "failed to persist job.json");
    }
}

/// Read one persisted job document. `Ok(None)` when the file is absent.
fn load_job_document(jobs_root: &Path, job_id: &str) -> Result<Option<Job>, io::Error> {
    let job_file = Workspace::new(jobs_root, job_id).job_file();
    if !job_file.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&job_file)?;
    let job = serde_json::from_str(&raw)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(job))
}
