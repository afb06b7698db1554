//! Rescatter scheduling - manual and periodic modes.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use dimvault_common::{Error, FileId, Result};

/// When rescatter cycles run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RescatterMode {
    /// Only on explicit request.
    Manual,
    /// A full cycle at regular intervals, plus explicit requests.
    Periodic { interval: Duration },
}

impl RescatterMode {
    fn interval(&self) -> Option<Duration> {
        match self {
            RescatterMode::Manual => None,
            RescatterMode::Periodic { interval } => Some(*interval),
        }
    }
}

/// Rescatter request types.
#[derive(Debug, Clone, PartialEq)]
pub enum RescatterRequest {
    /// Rescatter a single file.
    File(FileId),
    /// Rescatter every file of the vault.
    All,
    /// Stop the scheduler.
    Shutdown,
}

/// Outcome of one rescatter cycle.
#[derive(Debug, Clone, Default)]
pub struct RescatterReport {
    pub rescattered: usize,
    /// Files left for a later cycle because they stayed busy.
    pub deferred: usize,
    pub failed: usize,
    pub duration: Duration,
    pub errors: Vec<(FileId, String)>,
}

type Reply = oneshot::Sender<Result<RescatterReport>>;

/// Front end for requesting rescatter cycles.
pub struct RescatterScheduler {
    mode: Arc<RwLock<RescatterMode>>,
    request_tx: mpsc::Sender<(RescatterRequest, Reply)>,
    shutdown: CancellationToken,
}

impl RescatterScheduler {
    /// Create a new scheduler with the given mode.
    pub fn new(mode: RescatterMode) -> (Self, RescatterSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(100);
        let mode = Arc::new(RwLock::new(mode));
        let shutdown = CancellationToken::new();

        let scheduler = Self {
            mode: mode.clone(),
            request_tx,
            shutdown: shutdown.clone(),
        };
        let handle = RescatterSchedulerHandle {
            mode,
            request_rx,
            shutdown,
        };

        (scheduler, handle)
    }

    /// Rescatter one file and wait for the report.
    pub async fn request_file(&self, file_id: FileId) -> Result<RescatterReport> {
        self.request(RescatterRequest::File(file_id)).await
    }

    /// Run a full cycle and wait for the report.
    pub async fn request_all(&self) -> Result<RescatterReport> {
        self.request(RescatterRequest::All).await
    }

    async fn request(&self, request: RescatterRequest) -> Result<RescatterReport> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send((request, response_tx))
            .await
            .map_err(|_| Error::Vault("Rescatter scheduler not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::Vault("Rescatter scheduler dropped the request".to_string()))?
    }

    /// Change the rescatter mode.
    pub async fn set_mode(&self, mode: RescatterMode) {
        *self.mode.write().await = mode;
    }

    /// Get current rescatter mode.
    pub async fn get_mode(&self) -> RescatterMode {
        self.mode.read().await.clone()
    }

    /// Stop the scheduler and cancel the cycle in flight.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let (response_tx, _) = oneshot::channel();
        let _ = self
            .request_tx
            .send((RescatterRequest::Shutdown, response_tx))
            .await;
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Handle for the scheduler background task.
pub struct RescatterSchedulerHandle {
    mode: Arc<RwLock<RescatterMode>>,
    request_rx: mpsc::Receiver<(RescatterRequest, Reply)>,
    shutdown: CancellationToken,
}

impl RescatterSchedulerHandle {
    /// Run the scheduler loop.
    ///
    /// Spawn this in a tokio task. `cycle_fn` is called for every request and
    /// periodic tick, one at a time, with a token that fires on shutdown.
    pub async fn run<F, Fut>(mut self, cycle_fn: F)
    where
        F: Fn(RescatterRequest, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RescatterReport>> + Send,
    {
        let mut period = self.mode.read().await.interval();
        let mut ticker = period.map(Self::ticker);

        info!("Rescatter scheduler started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Rescatter scheduler shutting down");
                    break;
                }

                received = self.request_rx.recv() => {
                    let Some((request, response_tx)) = received else {
                        debug!("All schedulers dropped");
                        break;
                    };
                    if request == RescatterRequest::Shutdown {
                        info!("Received shutdown request");
                        break;
                    }
                    debug!(?request, "Processing rescatter request");
                    let result = cycle_fn(request, self.shutdown.child_token()).await;
                    let _ = response_tx.send(result);
                }

                _ = Self::wait_for_tick(&mut ticker) => {
                    debug!("Triggering periodic rescatter");
                    match cycle_fn(RescatterRequest::All, self.shutdown.child_token()).await {
                        Ok(report) => info!(
                            rescattered = report.rescattered,
                            deferred = report.deferred,
                            failed = report.failed,
                            "Periodic rescatter completed"
                        ),
                        Err(Error::Cancelled) => {}
                        Err(e) => error!(error = %e, "Periodic rescatter failed"),
                    }
                }
            }

            let expected = self.mode.read().await.interval();
            if expected != period {
                period = expected;
                ticker = period.map(Self::ticker);
            }
        }
    }

    fn ticker(every: Duration) -> Interval {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // skip the immediate first tick
        ticker.reset();
        ticker
    }

    async fn wait_for_tick(ticker: &mut Option<Interval>) {
        match ticker {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
