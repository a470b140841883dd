//! In-memory job registry.
//!
//! The outer map lock is held only to insert or look up an entry; each job has
//! its own lock so pollers of one job never wait on another job's writer.
//! Every job has exactly one [`JobHandle`], the only way to mutate it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use afya_models::{AnalysisResult, Job, JobId, JobView, ProcessingType};
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};

type Entry = Arc<RwLock<Job>>;

/// Concurrency-safe map from job id to job state.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Entry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new queued job and return its writer handle.
    pub fn create(
        &self,
        id: JobId,
        processing_type: ProcessingType,
        file_path: impl Into<PathBuf>,
        target_language: impl Into<String>,
    ) -> WorkerResult<JobHandle> {
        let mut jobs = write(&self.jobs);
        if jobs.contains_key(&id) {
            return Err(WorkerError::DuplicateJobId(id));
        }

        let job = Job::new(id.clone(), processing_type, file_path, target_language);
        let entry = Arc::new(RwLock::new(job));
        jobs.insert(id.clone(), Arc::clone(&entry));
        debug!(job_id = %id, "Registered job");

        Ok(JobHandle { id, entry })
    }

    /// Snapshot of a job.
    pub fn get(&self, id: &JobId) -> WorkerResult<Job> {
        let entry = self.entry(id)?;
        let job = read(&entry).clone();
        Ok(job)
    }

    /// Poll view of a job.
    pub fn view(&self, id: &JobId) -> WorkerResult<JobView> {
        let entry = self.entry(id)?;
        let view = JobView::from(&*read(&entry));
        Ok(view)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        read(&self.jobs).contains_key(id)
    }

    pub fn len(&self) -> usize {
        read(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<JobId> {
        read(&self.jobs).keys().cloned().collect()
    }

    /// Drop terminal jobs that finished more than `age` ago.
    ///
    /// Returns how many were removed.
    pub fn remove_terminal_older_than(&self, age: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut jobs = write(&self.jobs);
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let job = read(entry);
            !(job.is_terminal() && job.completed_at.is_some_and(|at| at <= cutoff))
        });
        before - jobs.len()
    }

    fn entry(&self, id: &JobId) -> WorkerResult<Entry> {
        read(&self.jobs)
            .get(id)
            .cloned()
            .ok_or_else(|| WorkerError::JobNotFound(id.clone()))
    }
}

/// The single writer for one job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    entry: Entry,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Current state of the job.
    pub fn snapshot(&self) -> Job {
        read(&self.entry).clone()
    }

    pub fn is_terminal(&self) -> bool {
        read(&self.entry).is_terminal()
    }

    /// Queued to Processing.
    pub fn start(&self) -> WorkerResult<()> {
        let result = write(&self.entry).start();
        self.check(result)
    }

    /// Best-effort progress; never decreases.
    pub fn set_progress(&self, progress: u8) {
        write(&self.entry).set_progress(progress);
    }

    pub fn complete(&self, result: AnalysisResult) -> WorkerResult<()> {
        let result = write(&self.entry).complete(result);
        self.check(result)
    }

    pub fn fail(&self, error: impl Into<String>) -> WorkerResult<()> {
        let result = write(&self.entry).fail(error);
        self.check(result)
    }

    fn check(&self, result: Result<(), afya_models::InvalidTransition>) -> WorkerResult<()> {
        result.map_err(|e| {
            warn!(job_id = %self.id, "Rejected status change: {}", e);
            WorkerError::from(e)
        })
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
