//! Temporal rescatter: periodically moves every file to a fresh layout.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dimvault_common::{Error, FileId, Result};

use crate::retry::{RetryConfig, RetryExecutor};
use crate::scheduler::{
    RescatterMode, RescatterReport, RescatterRequest, RescatterScheduler,
    RescatterSchedulerHandle,
};
use crate::state::{RescatterState, RescatterStatus};
use crate::target::RescatterTarget;

/// Configuration for temporal rescatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescatterConfig {
    pub mode: RescatterMode,
    /// How long one attempt waits for a busy file.
    pub lock_timeout: Option<Duration>,
    /// Backoff between attempts on a busy file.
    pub retry: RetryConfig,
    /// How often a busy file goes back to the end of the queue before it is
    /// left for the next cycle.
    pub max_deferrals: u32,
}

impl RescatterConfig {
    pub fn with_mode(mut self, mode: RescatterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_deferrals(mut self, max_deferrals: u32) -> Self {
        self.max_deferrals = max_deferrals;
        self
    }
}

impl Default for RescatterConfig {
    fn default() -> Self {
        Self {
            mode: RescatterMode::Manual,
            lock_timeout: Some(Duration::from_secs(5)),
            retry: RetryConfig::default(),
            max_deferrals: 3,
        }
    }
}

/// FIFO of files, each queued at most once.
#[derive(Debug, Default)]
struct RescatterQueue {
    order: VecDeque<(FileId, u32)>,
    queued: HashSet<FileId>,
}

impl RescatterQueue {
    fn push(&mut self, file_id: FileId) -> bool {
        self.requeue(file_id, 0)
    }

    fn requeue(&mut self, file_id: FileId, deferrals: u32) -> bool {
        if !self.queued.insert(file_id.clone()) {
            return false;
        }
        self.order.push_back((file_id, deferrals));
        true
    }

    fn pop(&mut self) -> Option<(FileId, u32)> {
        let (file_id, deferrals) = self.order.pop_front()?;
        self.queued.remove(&file_id);
        Some((file_id, deferrals))
    }

    fn drain(&mut self) -> Vec<FileId> {
        self.queued.clear();
        self.order.drain(..).map(|(id, _)| id).collect()
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Runs rescatter cycles against a target, one file at a time.
pub struct TemporalRescatterer<T: RescatterTarget + ?Sized> {
    target: Arc<T>,
    state: Arc<RwLock<RescatterState>>,
    retry: RetryExecutor,
    scheduler: Option<RescatterScheduler>,
    config: RescatterConfig,
}

impl<T: RescatterTarget + ?Sized> TemporalRescatterer<T> {
    pub fn new(target: Arc<T>, config: RescatterConfig) -> Self {
        Self {
            target,
            state: Arc::new(RwLock::new(RescatterState::new())),
            retry: RetryExecutor::new(config.retry.clone()),
            scheduler: None,
            config,
        }
    }

    /// Initialize the scheduler and return a handle for running it.
    pub fn init_scheduler(&mut self) -> RescatterSchedulerHandle {
        let (scheduler, handle) = RescatterScheduler::new(self.config.mode.clone());
        self.scheduler = Some(scheduler);
        handle
    }

    /// Get the scheduler for requesting cycles.
    pub fn scheduler(&self) -> Option<&RescatterScheduler> {
        self.scheduler.as_ref()
    }

    pub fn state(&self) -> Arc<RwLock<RescatterState>> {
        self.state.clone()
    }

    pub fn config(&self) -> &RescatterConfig {
        &self.config
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// Serve one scheduler request.
    pub async fn handle_request(
        &self,
        request: RescatterRequest,
        cancel: &CancellationToken,
    ) -> Result<RescatterReport> {
        match request {
            RescatterRequest::File(file_id) => self.run_cycle(vec![file_id], cancel).await,
            RescatterRequest::All => {
                let files = self.target.file_ids().await?;
                self.state.write().await.retain_files(&files);
                let report = self.run_cycle(files, cancel).await?;
                self.state.write().await.last_cycle = Some(Utc::now());
                Ok(report)
            }
            RescatterRequest::Shutdown => Ok(RescatterReport::default()),
        }
    }

    /// Rescatter `files` in order, each under a fresh random salt.
    ///
    /// Busy files are retried with backoff, then moved to the end of the
    /// queue, and finally left `Deferred` for a later cycle. Other failures
    /// are recorded in the report and do not stop the cycle.
    ///
    /// # Errors
    /// - `Cancelled` if `cancel` fires; files already moved stay moved
    pub async fn run_cycle(
        &self,
        files: Vec<FileId>,
        cancel: &CancellationToken,
    ) -> Result<RescatterReport> {
        let started = Instant::now();
        let mut queue = RescatterQueue::default();
        {
            let mut state = self.state.write().await;
            state.cycle_in_progress = true;
            for file_id in files {
                if queue.push(file_id.clone()) {
                    state.entry(&file_id).mark_pending();
                }
            }
        }
        debug!(files = queue.len(), "Rescatter cycle started");

        let mut report = RescatterReport::default();
        while let Some((file_id, deferrals)) = queue.pop() {
            if cancel.is_cancelled() {
                queue.requeue(file_id, deferrals);
                return Err(self.abort_cycle(&mut queue).await);
            }

            self.state.write().await.entry(&file_id).mark_running();
            let salt: u64 = rand::random();
            let result = self
                .retry
                .execute(|| {
                    self.target
                        .rescatter_file(&file_id, salt, cancel, self.config.lock_timeout)
                })
                .await;

            let mut state = self.state.write().await;
            match result {
                Ok(()) => {
                    state.entry(&file_id).mark_rescattered();
                    report.rescattered += 1;
                }
                Err(Error::LockTimeout(_)) => {
                    state.entry(&file_id).mark_deferred();
                    if deferrals < self.config.max_deferrals {
                        debug!(file_id = %file_id, deferrals, "File busy, requeued");
                        queue.requeue(file_id, deferrals + 1);
                    } else {
                        warn!(file_id = %file_id, "File busy, deferred to next cycle");
                        report.deferred += 1;
                    }
                }
                Err(Error::Cancelled) => {
                    state.entry(&file_id).status = RescatterStatus::Idle;
                    drop(state);
                    return Err(self.abort_cycle(&mut queue).await);
                }
                Err(Error::NotFound(_)) => {
                    debug!(file_id = %file_id, "File deleted before rescatter");
                    state.remove(&file_id);
                }
                Err(e) => {
                    warn!(file_id = %file_id, error = %e, "Rescatter failed");
                    state.entry(&file_id).mark_failed(e.to_string());
                    report.failed += 1;
                    report.errors.push((file_id, e.to_string()));
                }
            }
        }

        self.state.write().await.cycle_in_progress = false;
        report.duration = started.elapsed();
        info!(
            rescattered = report.rescattered,
            deferred = report.deferred,
            failed = report.failed,
            duration_ms = report.duration.as_millis() as u64,
            "Rescatter cycle finished"
        );
        Ok(report)
    }

    async fn abort_cycle(&self, queue: &mut RescatterQueue) -> Error {
        let mut state = self.state.write().await;
        for file_id in queue.drain() {
            state.entry(&file_id).status = RescatterStatus::Idle;
        }
        state.cycle_in_progress = false;
        info!("Rescatter cycle cancelled");
        Error::Cancelled
    }
}

impl<T: RescatterTarget + ?Sized + 'static> TemporalRescatterer<T> {
    /// Start the scheduler loop on the current runtime.
    ///
    /// Requests go through [`TemporalRescatterer::scheduler`] of the returned
    /// instance; the task ends after `shutdown`.
    pub fn start(mut self) -> (Arc<Self>, JoinHandle<()>) {
        let handle = self.init_scheduler();
        let rescatterer = Arc::new(self);
        let worker = rescatterer.clone();
        let task = tokio::spawn(handle.run(move |request, cancel| {
            let worker = worker.clone();
            async move { worker.handle_request(request, &cancel).await }
        }));
        (rescatterer, task)
    }
}
