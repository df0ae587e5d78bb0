//! Progress polling for server-side background jobs
//!
//! A poll session fetches the job snapshot, reports it, and only then sleeps
//! for the interval before the next fetch, so requests for one job never
//! overlap however slow the server is. The session ends at the first terminal
//! status, on the first fetch failure, when stopped, or when the optional
//! wall-clock timeout expires.
//!
//! Two flavours share this loop and differ only in [`PollOptions`]:
//! the quiet default reports a failed job as a final snapshot, while
//! [`PollOptions::strict`] turns it into [`PollError::JobFailed`] and gives up
//! after 30 minutes with [`PollError::Timeout`].

use crate::job::{JobStatus, ProcessingJob};
use crate::types::ApiError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);
pub const DEFAULT_STRICT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Anything that can produce the current snapshot of a job
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn fetch_progress(&self, job_id: &str) -> Result<ProcessingJob, ApiError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOptions {
    /// Pause between the end of one tick and the start of the next
    pub interval: Duration,
    /// Wall-clock limit for the whole session
    pub timeout: Option<Duration>,
    /// Report `failed`/`cancelled` jobs as [`PollError::JobFailed`]
    pub throw_on_failure: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            throw_on_failure: false,
        }
    }
}

impl PollOptions {
    /// Variant used for long generation pipelines
    pub fn strict() -> Self {
        Self {
            timeout: Some(DEFAULT_STRICT_TIMEOUT),
            throw_on_failure: true,
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PollError {
    #[error("Failed to fetch job progress: {0}")]
    Transport(#[from] ApiError),

    #[error("Job {job_id} {status}: {message}")]
    JobFailed {
        job_id: String,
        status: JobStatus,
        message: String,
    },

    #[error("Gave up waiting for job after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Polling stopped before the job finished")]
    Stopped,
}

pub type ProgressCallback = Box<dyn Fn(&ProcessingJob) + Send + Sync>;

type ActiveSessions = Arc<Mutex<HashMap<String, (u64, CancellationToken)>>>;

/// Starts poll sessions; keeps at most one live session per job id
pub struct JobProgressPoller {
    source: Arc<dyn JobStatusSource>,
    options: PollOptions,
    active: ActiveSessions,
    next_session: Arc<Mutex<u64>>,
}

impl JobProgressPoller {
    pub fn new(source: Arc<dyn JobStatusSource>) -> Self {
        Self {
            source,
            options: PollOptions::default(),
            active: Arc::new(Mutex::new(HashMap::new())),
            next_session: Arc::new(Mutex::new(0)),
        }
    }

    /// Defaults for sessions started with [`JobProgressPoller::start`]
    pub fn with_options(mut self, options: PollOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    pub fn start(&self, job_id: impl Into<String>, on_progress: ProgressCallback) -> PollHandle {
        self.start_with(
            job_id,
            on_progress,
            self.options.clone(),
            CancellationToken::new(),
        )
    }

    /// Start a session with explicit options and a caller-owned cancellation token.
    ///
    /// Cancelling `cancel` stops this session and is safe from inside
    /// `on_progress`. The session runs on a child of `cancel`, so stopping or
    /// dropping its handle never cancels `cancel` itself or other sessions
    /// sharing it. A session already running for the same job id is stopped first.
    pub fn start_with(
        &self,
        job_id: impl Into<String>,
        on_progress: ProgressCallback,
        options: PollOptions,
        cancel: CancellationToken,
    ) -> PollHandle {
        let job_id = job_id.into();
        let cancel = cancel.child_token();
        let session = self.register(&job_id, &cancel);

        let source = self.source.clone();
        let active = self.active.clone();
        let task_job_id = job_id.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let result = run_session(
                source.as_ref(),
                &task_job_id,
                &on_progress,
                &options,
                &task_cancel,
            )
            .await;
            unregister(&active, &task_job_id, session);
            result
        });

        PollHandle {
            job_id,
            cancel: cancel.clone(),
            guard: cancel.drop_guard(),
            task,
        }
    }

    /// Poll on the current task instead of spawning one
    pub async fn run(
        &self,
        job_id: &str,
        on_progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<ProcessingJob, PollError> {
        let cancel = cancel.child_token();
        let session = self.register(job_id, &cancel);
        let result =
            run_session(self.source.as_ref(), job_id, on_progress, &self.options, &cancel).await;
        unregister(&self.active, job_id, session);
        result
    }

    /// Number of sessions currently polling
    pub fn active_sessions(&self) -> usize {
        self.active.lock().map(|active| active.len()).unwrap_or(0)
    }

    fn register(&self, job_id: &str, cancel: &CancellationToken) -> u64 {
        let session = match self.next_session.lock() {
            Ok(mut next) => {
                *next += 1;
                *next
            }
            Err(_) => 0,
        };
        if let Ok(mut active) = self.active.lock() {
            if let Some((_, previous)) = active.insert(job_id.to_string(), (session, cancel.clone()))
            {
                info!(job_id = %job_id, "Replacing running poll session");
                previous.cancel();
            }
        }
        session
    }
}

fn unregister(active: &ActiveSessions, job_id: &str, session: u64) {
    if let Ok(mut active) = active.lock() {
        if active.get(job_id).map(|(id, _)| *id) == Some(session) {
            active.remove(job_id);
        }
    }
}

/// Owner of a running poll session. Dropping it stops the session.
pub struct PollHandle {
    job_id: String,
    cancel: CancellationToken,
    guard: DropGuard,
    task: JoinHandle<Result<ProcessingJob, PollError>>,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Schedule no further ticks. A fetch already in flight still reports its
    /// snapshot. Idempotent; a no-op once the job is terminal.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end
    pub async fn join(self) -> Result<ProcessingJob, PollError> {
        let PollHandle {
            job_id, guard, task, ..
        } = self;
        let result = task.await;
        guard.disarm();
        match result {
            Ok(result) => result,
            Err(e) => {
                warn!(job_id = %job_id, "Poll session aborted: {e}");
                Err(PollError::Stopped)
            }
        }
    }
}

async fn run_session(
    source: &dyn JobStatusSource,
    job_id: &str,
    on_progress: &ProgressCallback,
    options: &PollOptions,
    cancel: &CancellationToken,
) -> Result<ProcessingJob, PollError> {
    info!(job_id = %job_id, interval_ms = options.interval.as_millis() as u64, "Polling job progress");

    match options.timeout {
        Some(limit) => {
            match tokio::time::timeout(limit, poll_loop(source, job_id, on_progress, options, cancel))
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    warn!(job_id = %job_id, "Job did not finish within {} ms", limit.as_millis());
                    Err(PollError::Timeout(limit))
                }
            }
        }
        None => poll_loop(source, job_id, on_progress, options, cancel).await,
    }
}

async fn poll_loop(
    source: &dyn JobStatusSource,
    job_id: &str,
    on_progress: &ProgressCallback,
    options: &PollOptions,
    cancel: &CancellationToken,
) -> Result<ProcessingJob, PollError> {
    let mut tick: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            debug!(job_id = %job_id, tick, "Poll session stopped");
            return Err(PollError::Stopped);
        }
        tick += 1;
        debug!(job_id = %job_id, tick, "Fetching job progress");

        let mut snapshot = match source.fetch_progress(job_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(job_id = %job_id, tick, "Stopping poll session after fetch failure: {e}");
                return Err(PollError::Transport(e));
            }
        };
        if snapshot.job_id.is_empty() {
            snapshot.job_id = job_id.to_string();
        }
        if !snapshot.counts_consistent() {
            warn!(
                job_id = %job_id,
                processed = snapshot.processed,
                succeeded = snapshot.succeeded,
                failed = snapshot.failed,
                skipped = snapshot.skipped,
                "Job counts do not add up"
            );
        }

        on_progress(&snapshot);

        if snapshot.is_terminal() {
            info!(job_id = %job_id, status = %snapshot.status, tick, "Job reached terminal state");
            if options.throw_on_failure && snapshot.status.is_failure() {
                let message = snapshot
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("job {}", snapshot.status));
                return Err(PollError::JobFailed {
                    job_id: snapshot.job_id,
                    status: snapshot.status,
                    message,
                });
            }
            return Ok(snapshot);
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(job_id = %job_id, tick, "Poll session stopped");
                return Err(PollError::Stopped);
            }
            _ = tokio::time::sleep(options.interval) => {}
        }
    }
}
