//! Job descriptor and mutable state (§3).

use super::state_machine::validate_transition;
use crate::config::Preset;
use crate::error::{ErrorInfo, SchedulerError};
use crate::playlist::Segment;
use crate::progress::{JobStatus, ProgressEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// The optional external-subtitle descriptor carried on a job (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtitleDescriptor {
    pub stream_index: u32,
    pub language: Option<String>,
    pub codec: Option<String>,
    pub upstream_base_url: String,
    pub bearer_credential: Option<String>,
}

/// Everything fixed at `StartJob` time; never mutated after.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDescriptor {
    pub item_id: String,
    pub media_source_id: String,
    pub title: String,
    pub file_name: String,
    pub preset: Preset,
    pub playlist_url: String,
    pub expected_duration_secs: f64,
    pub subtitle: Option<SubtitleDescriptor>,
}

/// A job's full mutable state (§3). `id` is the scheduler-assigned opaque
/// identifier; everything under `descriptor` never changes after creation.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub descriptor: JobDescriptor,
    pub status: JobStatus,
    pub completed_indices: HashSet<u64>,
    pub total_segments: u64,
    pub segments: Option<Vec<Segment>>,
    pub bytes_downloaded: u64,
    pub download_started_at: Option<DateTime<Utc>>,
    pub queue_position: Option<usize>,
    pub paused_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_error: Option<ErrorInfo>,
    pub final_artifact_path: Option<PathBuf>,
    pub temp_dir_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: String, descriptor: JobDescriptor, temp_dir_path: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            id,
            descriptor,
            status: JobStatus::Queued,
            completed_indices: HashSet::new(),
            total_segments: 0,
            segments: None,
            bytes_downloaded: 0,
            download_started_at: None,
            queue_position: None,
            paused_at: None,
            retry_count: 0,
            last_error: None,
            final_artifact_path: None,
            temp_dir_path,
            created_at: now,
        }
    }

    /// Moves `status` to `to` if the state machine (§4.1) allows it from the
    /// current status; leaves `status` untouched on rejection. Production
    /// status writes go through this rather than assigning the field
    /// directly.
    pub fn transition(&mut self, to: JobStatus) -> Result<(), SchedulerError> {
        validate_transition(self.status, to)?;
        self.status = to;
        Ok(())
    }

    /// `progress == completed / total` once the media playlist has been
    /// parsed (`total >= 1`); `0` before (§3 invariant).
    pub fn progress(&self) -> f64 {
        if self.total_segments == 0 {
            0.0
        } else {
            self.completed_indices.len() as f64 / self.total_segments as f64
        }
    }

    pub fn to_progress_event(&self) -> ProgressEvent {
        let completed = self.completed_indices.len() as u64;
        ProgressEvent {
            job_id: self.id.clone(),
            title: Some(self.descriptor.title.clone()),
            filename: Some(self.descriptor.file_name.clone()),
            status: self.status,
            progress: self.progress(),
            completed_segments: completed,
            total_segments: self.total_segments,
            bytes_downloaded: Some(self.bytes_downloaded),
            download_started_at: self.download_started_at,
            queue_position: self.queue_position,
            can_resume: ProgressEvent::can_resume(self.status, completed),
            error: self.last_error.clone(),
            created_at: Some(self.created_at),
        }
    }
}
