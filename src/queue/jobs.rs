// Job records and the concurrent job store
//
// Status only moves forward: pending -> processing -> completed | failed, or
// pending -> failed when a queued job is cancelled. Terminal records are never
// rewritten; late writes from a worker are dropped with a debug log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::plan::TransformationResult;
use crate::types::{AppError, AppResult};

pub const CANCELLED_MESSAGE: &str = "Processing was cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub filename: String,
    pub status: JobStatus,
    pub progress: u8,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    result: Option<TransformationResult>,
    cancel: CancellationToken,
}

impl Job {
    fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            debug!(job_id = %self.id, from = ?self.status, to = ?next, "Ignoring invalid status transition");
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    fn view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            status: self.status,
            progress: self.progress,
            error: self.error_message.clone(),
            filename: self.filename.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// What status polling returns
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(TransformationResult),
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Owner of every job record; all cross-worker mutation goes through here
#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
    ttl: chrono::Duration,
}

impl JobStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365)),
        }
    }

    /// New pending job whose cancellation token is a child of `parent`
    pub async fn create(&self, filename: &str, parent: &CancellationToken) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let job = Job {
            id,
            filename: filename.to_string(),
            status: JobStatus::Pending,
            progress: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            result: None,
            cancel: parent.child_token(),
        };
        self.jobs.write().await.insert(id, job);
        id
    }

    pub async fn remove(&self, id: Uuid) {
        if let Some(job) = self.jobs.write().await.remove(&id) {
            job.cancel.cancel();
        }
    }

    pub async fn status(&self, id: Uuid) -> AppResult<JobStatusView> {
        let jobs = self.jobs.read().await;
        live(&jobs, id).map(Job::view)
    }

    pub async fn result(&self, id: Uuid) -> AppResult<JobOutcome> {
        let jobs = self.jobs.read().await;
        let job = live(&jobs, id)?;
        match job.status {
            JobStatus::Completed => job
                .result
                .clone()
                .map(JobOutcome::Completed)
                .ok_or_else(|| AppError::Internal(format!("job {id} completed without a result"))),
            JobStatus::Failed => Ok(JobOutcome::Failed(
                job.error_message.clone().unwrap_or_else(|| "Processing failed".to_string()),
            )),
            JobStatus::Pending | JobStatus::Processing => {
                Err(AppError::NotReady(format!("job {id} is {:?}", job.status)))
            }
        }
    }

    /// Move a pending job to processing and hand its token to the claiming worker.
    ///
    /// Returns `None` when the job is gone or no longer pending.
    pub async fn claim(&self, id: Uuid) -> Option<CancellationToken> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id)?;
        if !job.transition(JobStatus::Processing) {
            return None;
        }
        job.progress = 5;
        Some(job.cancel.clone())
    }

    /// Progress only increases and only while processing
    pub async fn set_progress(&self, id: Uuid, progress: u8) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == JobStatus::Processing && progress > job.progress {
                job.progress = progress.min(100);
                job.updated_at = Utc::now();
            }
        }
    }

    pub async fn complete(&self, id: Uuid, result: TransformationResult) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        if !job.transition(JobStatus::Completed) {
            return false;
        }
        job.progress = 100;
        job.result = Some(result);
        true
    }

    pub async fn fail(&self, id: Uuid, message: impl Into<String>) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        if !job.transition(JobStatus::Failed) {
            return false;
        }
        job.error_message = Some(message.into());
        true
    }

    /// Fail a pending or processing job and abort its in-flight work.
    /// Finished jobs are returned unchanged.
    pub async fn cancel(&self, id: Uuid) -> AppResult<JobStatusView> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .filter(|job| job.expires_at > Utc::now())
            .ok_or_else(|| AppError::NotFound(format!("job {id}")))?;
        if job.transition(JobStatus::Failed) {
            job.error_message = Some(CANCELLED_MESSAGE.to_string());
            job.cancel.cancel();
        }
        Ok(job.view())
    }

    /// Drop every job whose expiry has passed, whatever its status
    pub async fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now()).await
    }

    pub async fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            let keep = job.expires_at > now;
            if !keep {
                job.cancel.cancel();
            }
            keep
        });
        before - jobs.len()
    }

    pub async fn counts(&self) -> QueueCounts {
        let jobs = self.jobs.read().await;
        jobs.values().fold(QueueCounts::default(), |mut counts, job| {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
            counts
        })
    }

    /// Fail every non-terminal job; used on shutdown
    pub async fn fail_all_active(&self, message: &str) -> usize {
        let mut jobs = self.jobs.write().await;
        let mut failed = 0;
        for job in jobs.values_mut().filter(|job| !job.status.is_terminal()) {
            job.cancel.cancel();
            if job.transition(JobStatus::Failed) {
                job.error_message = Some(message.to_string());
                failed += 1;
            }
        }
        failed
    }
}

/// Unknown and expired ids both read as not found
fn live(jobs: &HashMap<Uuid, Job>, id: Uuid) -> AppResult<&Job> {
    jobs.get(&id)
        .filter(|job| job.expires_at > Utc::now())
        .ok_or_else(|| AppError::NotFound(format!("job {id}")))
}
