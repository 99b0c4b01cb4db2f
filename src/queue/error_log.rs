// Bounded in-memory log of recent job failures

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::AppError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub job_id: Uuid,
    pub category: &'static str,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ErrorLog {
    records: Arc<Mutex<VecDeque<ErrorRecord>>>,
    capacity: usize,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    /// Oldest entries fall off once `capacity` is reached; capacity 0 disables the log
    pub async fn record(&self, job_id: Uuid, error: &AppError) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self.records.lock().await;
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(ErrorRecord {
            job_id,
            category: error.category(),
            message: error.user_message(),
            at: Utc::now(),
        });
    }

    /// Newest first
    pub async fn recent(&self) -> Vec<ErrorRecord> {
        self.records.lock().await.iter().rev().cloned().collect()
    }
}
