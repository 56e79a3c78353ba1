//! Checkpoint persistence (§3, §4.1): written after every segment
//! completion, read on startup to recover resumable jobs.

use super::job::{Job, JobDescriptor};
use crate::atomic_file::{read_json, write_json_atomic};
use crate::playlist::Segment;
use crate::progress::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const CHECKPOINT_FILE_NAME: &str = "state.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub job_id: String,
    pub descriptor: JobDescriptor,
    pub completed_indices: HashSet<u64>,
    pub segments: Option<Vec<Segment>>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn from_job(job: &Job, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id.clone(),
            descriptor: job.descriptor.clone(),
            completed_indices: job.completed_indices.clone(),
            segments: job.segments.clone(),
            status: job.status,
            created_at: job.created_at,
            updated_at: now,
        }
    }
}

pub fn path_for(temp_root: &Path, job_id: &str) -> PathBuf {
    temp_root.join(job_id).join(CHECKPOINT_FILE_NAME)
}

pub async fn write(temp_root: &Path, checkpoint: &Checkpoint) -> std::io::Result<()> {
    write_json_atomic(&path_for(temp_root, &checkpoint.job_id), checkpoint).await
}

pub async fn read(temp_root: &Path, job_id: &str) -> std::io::Result<Option<Checkpoint>> {
    read_json(&path_for(temp_root, job_id)).await
}

pub async fn delete(temp_root: &Path, job_id: &str) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(temp_root.join(job_id)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Recover every checkpoint whose status was non-terminal or `failed`
/// (i.e. everything except `completed`/`cancelled`) — the caller
/// reconstructs these as `failed` jobs awaiting an explicit `ResumeFailed`.
pub async fn scan_recoverable(temp_root: &Path) -> std::io::Result<Vec<Checkpoint>> {
    let mut recovered = Vec::new();
    let mut entries = match tokio::fs::read_dir(temp_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(recovered),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let job_id = entry.file_name().to_string_lossy().into_owned();
        if let Some(checkpoint) = read(temp_root, &job_id).await? {
            if !matches!(checkpoint.status, JobStatus::Completed | JobStatus::Cancelled) {
                recovered.push(checkpoint);
            }
        }
    }
    Ok(recovered)
}
