//! Job executor.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use afya_inference::locale::is_supported;
use afya_media::{CancelSource, CancelToken};
use afya_models::{AnalysisResult, JobId, JobView, ProcessingType};
use futures::FutureExt;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn, Instrument};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::pipeline::{self, ensure_file, ProcessingContext};
use crate::registry::{JobHandle, JobRegistry};

/// Default target language when the caller gives none.
pub const DEFAULT_LANGUAGE: &str = "en";

/// A request to analyze a saved file.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Caller-supplied id; a UUID is generated when absent
    pub job_id: Option<JobId>,
    pub file_path: PathBuf,
    pub target_language: String,
    pub processing_type: ProcessingType,
}

impl SubmitRequest {
    pub fn new(file_path: impl Into<PathBuf>, processing_type: ProcessingType) -> Self {
        Self {
            job_id: None,
            file_path: file_path.into(),
            target_language: DEFAULT_LANGUAGE.to_string(),
            processing_type,
        }
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = language.into();
        self
    }
}

/// Runs submitted jobs on detached tasks with bounded concurrency.
pub struct JobExecutor {
    config: WorkerConfig,
    ctx: Arc<ProcessingContext>,
    registry: Arc<JobRegistry>,
    job_semaphore: Arc<Semaphore>,
    /// Jobs submitted but not yet holding a permit
    queued: Arc<AtomicUsize>,
    /// Jobs submitted and not yet terminal
    in_flight: Arc<AtomicUsize>,
    cancels: Arc<Mutex<HashMap<JobId, CancelSource>>>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    /// Create a new job executor.
    ///
    /// Starts the finished-job sweeper, so this must be called from within a
    /// Tokio runtime.
    pub fn new(config: WorkerConfig, ctx: ProcessingContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let registry = Arc::new(JobRegistry::new());

        spawn_sweeper(
            Arc::clone(&registry),
            config.job_ttl,
            config.sweep_interval,
            shutdown_rx,
        );

        Self {
            config,
            ctx: Arc::new(ctx),
            registry,
            job_semaphore,
            queued: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            cancels: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    /// Create an executor with the production context.
    pub fn from_env(config: WorkerConfig) -> WorkerResult<Self> {
        let ctx = ProcessingContext::from_env(&config)?;
        Ok(Self::new(config, ctx))
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn context(&self) -> &ProcessingContext {
        &self.ctx
    }

    /// Register a job and start it on a detached task.
    ///
    /// Returns as soon as the job is queued. Must be called from within a
    /// Tokio runtime.
    pub fn submit(&self, request: SubmitRequest) -> WorkerResult<JobId> {
        if *self.shutdown.borrow() {
            return Err(WorkerError::ShuttingDown);
        }

        let job_id = match request.job_id {
            Some(id) if id.as_str().trim().is_empty() => {
                return Err(WorkerError::invalid_input("job id is empty"));
            }
            Some(id) => id,
            None => JobId::new(),
        };
        if self.registry.contains(&job_id) {
            return Err(WorkerError::DuplicateJobId(job_id));
        }
        ensure_file(&request.file_path)?;
        let language = match request.target_language.trim() {
            "" => DEFAULT_LANGUAGE.to_string(),
            lang => lang.to_string(),
        };
        if !is_supported(&language) {
            warn!(job_id = %job_id, language = %language, "Unsupported language, recognition uses the default locale");
        }

        self.reserve_queue_slot()?;
        let handle = match self.registry.create(
            job_id.clone(),
            request.processing_type,
            request.file_path,
            language,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                self.queued.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
        };

        let (source, token) = CancelToken::new();
        lock(&self.cancels).insert(job_id.clone(), source);
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let logger = JobLogger::new(&job_id, request.processing_type);
        logger.log_progress("queued");

        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.job_semaphore);
        let queued = Arc::clone(&self.queued);
        let in_flight = Arc::clone(&self.in_flight);
        let cancels = Arc::clone(&self.cancels);
        let span = logger.create_span();

        tokio::spawn(
            async move {
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    _ = token.cancelled() => None,
                };
                queued.fetch_sub(1, Ordering::SeqCst);

                Self::execute_job(&ctx, &handle, &token, &logger, permit).await;

                lock(&cancels).remove(handle.id());
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            .instrument(span),
        );

        Ok(job_id)
    }

    fn reserve_queue_slot(&self) -> WorkerResult<()> {
        let max = self.config.max_queued_jobs;
        self.queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .map(|_| ())
            .map_err(WorkerError::QueueFull)
    }

    /// Execute a single job and record its terminal state.
    async fn execute_job(
        ctx: &ProcessingContext,
        handle: &JobHandle,
        cancel: &CancelToken,
        logger: &JobLogger,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        if let Err(e) = handle.start() {
            logger.log_error(&format!("could not start: {}", e));
            return;
        }

        let Some(_permit) = permit else {
            logger.log_warning("cancelled before start");
            Self::finish(handle, logger, Err(WorkerError::Cancelled));
            return;
        };

        logger.log_start(&handle.snapshot().file_path.display().to_string());

        let outcome = AssertUnwindSafe(pipeline::process_job(ctx, handle, cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(WorkerError::WorkerPanicked(panic_message(panic))));

        Self::finish(handle, logger, outcome);
    }

    fn finish(handle: &JobHandle, logger: &JobLogger, outcome: WorkerResult<AnalysisResult>) {
        let recorded = match outcome {
            Ok(result) => {
                let recorded = handle.complete(result);
                if recorded.is_ok() {
                    logger.log_completion("analysis ready");
                }
                recorded
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                handle.fail(e.to_string())
            }
        };
        if let Err(e) = recorded {
            logger.log_error(&format!("could not record outcome: {}", e));
        }
    }

    /// Poll a job.
    pub fn status(&self, job_id: &JobId) -> WorkerResult<JobView> {
        self.registry.view(job_id)
    }

    /// Ask a running or queued job to stop.
    ///
    /// The job ends `Failed` with error `cancelled`. Cancelling a finished job
    /// does nothing.
    pub fn cancel(&self, job_id: &JobId) -> WorkerResult<()> {
        let job = self.registry.get(job_id)?;
        if job.is_terminal() {
            return Ok(());
        }
        if let Some(source) = lock(&self.cancels).get(job_id) {
            info!(job_id = %job_id, "Cancelling job");
            source.cancel();
        }
        Ok(())
    }

    /// Number of submitted jobs that have not finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Number of jobs waiting for a worker slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Describe a single image.
    pub async fn analyze_image(&self, path: &std::path::Path, language: &str) -> WorkerResult<String> {
        pipeline::analyze_image(&self.ctx, path, language).await
    }

    /// Read the text off an image.
    pub async fn extract_text(&self, path: &std::path::Path) -> WorkerResult<String> {
        pipeline::extract_text(&self.ctx, path).await
    }

    /// Answer a typed health question.
    pub async fn answer_query(&self, message: &str, language: &str) -> WorkerResult<String> {
        pipeline::answer_query(&self.ctx, message, language).await
    }

    /// Translate text into `language`.
    pub async fn translate(&self, text: &str, language: &str) -> WorkerResult<String> {
        pipeline::translate(&self.ctx, text, language).await
    }

    /// Transcribe and analyze a voice note.
    pub async fn process_voice(
        &self,
        path: &std::path::Path,
        language: &str,
    ) -> WorkerResult<AnalysisResult> {
        pipeline::process_voice(&self.ctx, path, language).await
    }

    /// Stop accepting jobs and wait for in-flight jobs to finish.
    ///
    /// Returns `true` if everything finished within the shutdown timeout.
    pub async fn shutdown(&self) -> bool {
        let _ = self.shutdown.send(true);
        info!("Waiting for {} in-flight jobs to complete...", self.in_flight());

        let drained = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_ok();
        if !drained {
            warn!(
                "Shutdown timed out with {} jobs still running",
                self.in_flight()
            );
        }
        info!("Job executor stopped");
        drained
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Periodically drop finished jobs older than `ttl` until shutdown.
fn spawn_sweeper(
    registry: Arc<JobRegistry>,
    ttl: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = registry.remove_terminal_older_than(ttl);
                    if removed > 0 {
                        debug!(removed, remaining = registry.len(), "Swept finished jobs");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Job sweeper stopped");
    });
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
