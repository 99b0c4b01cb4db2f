//! Import Service
//!
//! A fixed pool of worker tasks consuming one bounded FIFO queue, plus a
//! periodic sweeper that evicts expired jobs. Submission never blocks: a full
//! queue is reported back to the caller as [`AppError::QueueFull`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::extraction::Document;
use crate::queue::error_log::{ErrorLog, ErrorRecord};
use crate::queue::jobs::{JobOutcome, JobStatusView, JobStore, QueueCounts, CANCELLED_MESSAGE};
use crate::queue::pipeline::ImportPipeline;
use crate::types::{AppError, AppResult};

struct QueuedJob {
    id: Uuid,
    document: Document,
}

#[derive(Clone)]
struct WorkerContext {
    store: JobStore,
    pipeline: Arc<ImportPipeline>,
    errors: ErrorLog,
    root: CancellationToken,
    job_timeout: Duration,
}

#[derive(Clone)]
pub struct ImportService {
    store: JobStore,
    sender: mpsc::Sender<QueuedJob>,
    errors: ErrorLog,
    root: CancellationToken,
    capacity: usize,
    pipeline: Arc<ImportPipeline>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ImportService {
    /// Spawn the worker pool and the expiry sweeper. Everything stops when `shutdown` is cancelled.
    pub fn start(
        config: &PipelineConfig,
        pipeline: Arc<ImportPipeline>,
        max_errors: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel::<QueuedJob>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let store = JobStore::new(config.job_ttl);
        let errors = ErrorLog::new(max_errors);

        let ctx = WorkerContext {
            store: store.clone(),
            pipeline: pipeline.clone(),
            errors: errors.clone(),
            root: shutdown.clone(),
            job_timeout: config.job_timeout,
        };

        let mut handles = Vec::with_capacity(config.workers + 1);
        for worker_id in 0..config.workers.max(1) {
            let ctx = ctx.clone();
            let receiver = receiver.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, receiver, ctx).await;
            }));
        }
        handles.push(tokio::spawn(sweeper(store.clone(), config.sweep_interval, shutdown.clone())));

        info!(
            workers = config.workers.max(1),
            queue_capacity = capacity,
            job_ttl_secs = config.job_ttl.as_secs(),
            "Import service started"
        );

        Self {
            store,
            sender,
            errors,
            root: shutdown,
            capacity,
            pipeline,
            handles: Arc::new(Mutex::new(handles)),
        }
    }

    pub async fn submit(&self, document: Document) -> AppResult<Uuid> {
        if self.root.is_cancelled() {
            return Err(AppError::Internal("import service is shutting down".to_string()));
        }

        let filename = document.filename.clone();
        let id = self.store.create(&filename, &self.root).await;
        match self.sender.try_send(QueuedJob { id, document }) {
            Ok(()) => {
                info!(job_id = %id, filename = %filename, "Import job queued");
                Ok(id)
            }
            Err(TrySendError::Full(_)) => {
                self.store.remove(id).await;
                warn!(filename = %filename, capacity = self.capacity, "Import queue full, rejecting submission");
                Err(AppError::QueueFull { capacity: self.capacity })
            }
            Err(TrySendError::Closed(_)) => {
                self.store.remove(id).await;
                Err(AppError::Internal("import workers are not running".to_string()))
            }
        }
    }

    pub async fn status(&self, id: Uuid) -> AppResult<JobStatusView> {
        self.store.status(id).await
    }

    pub async fn result(&self, id: Uuid) -> AppResult<JobOutcome> {
        self.store.result(id).await
    }

    pub async fn cancel(&self, id: Uuid) -> AppResult<JobStatusView> {
        let view = self.store.cancel(id).await?;
        info!(job_id = %id, status = ?view.status, "Cancel requested");
        Ok(view)
    }

    pub async fn counts(&self) -> QueueCounts {
        self.store.counts().await
    }

    pub async fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.errors.recent().await
    }

    /// Provider names in fallback order
    pub fn providers(&self) -> Vec<String> {
        self.pipeline.orchestrator().available()
    }

    /// Stop accepting work, wait for workers to wind down and fail whatever is left
    pub async fn shutdown(&self) {
        self.root.cancel();
        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Import worker ended abnormally");
            }
        }
        let failed = self.store.fail_all_active(CANCELLED_MESSAGE).await;
        info!(failed, "Import service stopped");
    }
}

async fn worker_loop(worker_id: usize, receiver: Arc<Mutex<mpsc::Receiver<QueuedJob>>>, ctx: WorkerContext) {
    debug!(worker_id, "Import worker started");
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = ctx.root.cancelled() => None,
                job = receiver.recv() => job,
            }
        };
        let Some(queued) = next else {
            break;
        };
        process(worker_id, queued, &ctx).await;
    }
    debug!(worker_id, "Import worker stopped");
}

async fn process(worker_id: usize, queued: QueuedJob, ctx: &WorkerContext) {
    let QueuedJob { id, document } = queued;
    let Some(token) = ctx.store.claim(id).await else {
        debug!(job_id = %id, "Job no longer pending, skipping");
        return;
    };

    info!(job_id = %id, worker_id, filename = %document.filename, "Processing import job");
    let started = Instant::now();

    let outcome = match tokio::time::timeout(ctx.job_timeout, ctx.pipeline.run(id, document, &ctx.store, &token)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            token.cancel();
            Err(AppError::Timeout(format!("job exceeded {}s", ctx.job_timeout.as_secs())))
        }
    };

    match outcome {
        Ok(result) => {
            if ctx.store.complete(id, result).await {
                info!(job_id = %id, elapsed_ms = started.elapsed().as_millis() as u64, "Import job completed");
            }
        }
        Err(e) => {
            error!(job_id = %id, category = e.category(), error = %e, "Import job failed");
            ctx.errors.record(id, &e).await;
            ctx.store.fail(id, e.user_message()).await;
        }
    }
}

async fn sweeper(store: JobStore, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = store.evict_expired().await;
                if evicted > 0 {
                    info!(evicted, "Evicted expired import jobs");
                }
            }
        }
    }
}
