//! Progress events and the per-job subscription registry (§6.3, §9
//! "Callbacks and observers"): ordered, per-job, non-blocking emission.
//! A slow consumer never stalls the scheduler — its channel is bounded and a
//! full channel just drops the event; a dropped event is always recoverable
//! because `GetProgress` can re-fetch the current snapshot.

use crate::error::ErrorInfo;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// The eight job states (spec §3, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Paused,
    Transcoding,
    Downloading,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_running(self) -> bool {
        matches!(
            self,
            JobStatus::Transcoding | JobStatus::Downloading | JobStatus::Processing
        )
    }
}

/// Wire shape emitted on every observable state change (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub status: JobStatus,
    pub progress: f64,
    pub completed_segments: u64,
    pub total_segments: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_downloaded: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_resume: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ProgressEvent {
    /// `canResume` is true iff status = failed and the completed-index set
    /// is non-empty (§6.3).
    pub fn can_resume(status: JobStatus, completed_segments: u64) -> Option<bool> {
        if status == JobStatus::Failed {
            Some(completed_segments > 0)
        } else {
            None
        }
    }
}

/// Opaque handle returned from [`ProgressBroker::subscribe`]; pass it to
/// [`ProgressBroker::unsubscribe`] to stop receiving events for that job.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    job_id: String,
    id: u64,
}

struct Subscription {
    id: u64,
    tx: mpsc::Sender<ProgressEvent>,
}

/// Registry of progress subscribers, keyed by job id.
pub struct ProgressBroker {
    subscribers: DashMap<String, Vec<Subscription>>,
    next_id: AtomicU64,
}

impl Default for ProgressBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBroker {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber for `job_id`. If `initial` is given it is
    /// delivered once, immediately, ahead of any future events ("on
    /// subscribe the current progress is delivered once", §4.1).
    pub fn subscribe(
        &self,
        job_id: &str,
        buffer: usize,
        initial: Option<ProgressEvent>,
    ) -> (mpsc::Receiver<ProgressEvent>, SubscriptionHandle) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        if let Some(event) = initial {
            let _ = tx.try_send(event);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(job_id.to_string())
            .or_default()
            .push(Subscription { id, tx });
        (
            rx,
            SubscriptionHandle {
                job_id: job_id.to_string(),
                id,
            },
        )
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if let Some(mut subs) = self.subscribers.get_mut(&handle.job_id) {
            subs.retain(|s| s.id != handle.id);
        }
    }

    /// Publish `event` to every live subscriber of its job. Non-blocking: a
    /// full or closed channel just drops this event for that subscriber.
    pub fn publish(&self, event: ProgressEvent) {
        if let Some(subs) = self.subscribers.get(&event.job_id) {
            for sub in subs.iter() {
                let _ = sub.tx.try_send(event.clone());
            }
        }
    }

    /// Drop all subscriptions for a job (called when a job is removed).
    pub fn clear(&self, job_id: &str) {
        self.subscribers.remove(job_id);
    }
}
