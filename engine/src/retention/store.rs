//! Retention store (§4.6): per-artifact metadata and the sweep that deletes
//! artifacts past their effective expiry.

use crate::atomic_file::{read_json, write_json_atomic};
use crate::error::{RetentionError, SchedulerError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const RETENTION_FILE_NAME: &str = "retention.json";

/// Path-escape guard for cache operations (§6.2): job ids are used directly
/// as a downloads-root subdirectory name, so reject anything that could
/// walk outside of it before it is ever joined onto a path.
pub fn guard_job_id(job_id: &str) -> Result<(), SchedulerError> {
    if job_id.is_empty()
        || job_id.contains('/')
        || job_id.contains('\\')
        || job_id.contains("..")
    {
        Err(SchedulerError::PathEscape)
    } else {
        Ok(())
    }
}

/// Per-artifact retention metadata (spec calls this entity "session id,
/// per-file override, downloaded-at, expires-at"; `job_id` here is that
/// session id — every completed job owns exactly one artifact).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionRecord {
    pub job_id: String,
    pub override_days: Option<u32>,
    pub downloaded_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveRetention {
    pub override_days: Option<u32>,
    pub effective_days: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_override: bool,
    pub downloaded_at: DateTime<Utc>,
}

fn validate_override(days: Option<u32>) -> Result<(), RetentionError> {
    match days {
        None => Ok(()),
        Some(d) if (1..=365).contains(&d) => Ok(()),
        Some(_) => Err(RetentionError::BadRetention),
    }
}

fn effective_days(override_days: Option<u32>, global_default: Option<u32>) -> Option<u32> {
    override_days.or(global_default)
}

fn expires_at(downloaded_at: DateTime<Utc>, effective_days: Option<u32>) -> Option<DateTime<Utc>> {
    effective_days.map(|d| downloaded_at + ChronoDuration::days(d as i64))
}

pub struct RetentionStore {
    downloads_root: PathBuf,
}

impl RetentionStore {
    pub fn new(downloads_root: impl Into<PathBuf>) -> Self {
        Self {
            downloads_root: downloads_root.into(),
        }
    }

    fn record_path(&self, job_id: &str) -> PathBuf {
        self.downloads_root.join(job_id).join(RETENTION_FILE_NAME)
    }

    fn artifact_dir(&self, job_id: &str) -> PathBuf {
        self.downloads_root.join(job_id)
    }

    pub async fn create_on_complete(
        &self,
        job_id: &str,
        global_default_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<RetentionRecord, RetentionError> {
        let record = RetentionRecord {
            job_id: job_id.to_string(),
            override_days: None,
            downloaded_at: now,
            expires_at: expires_at(now, global_default_days),
        };
        write_json_atomic(&self.record_path(job_id), &record).await?;
        Ok(record)
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<RetentionRecord>, RetentionError> {
        Ok(read_json(&self.record_path(job_id)).await?)
    }

    pub async fn update(
        &self,
        job_id: &str,
        override_days: Option<u32>,
    ) -> Result<RetentionRecord, RetentionError> {
        validate_override(override_days)?;
        let mut record = self
            .get(job_id)
            .await?
            .ok_or_else(|| RetentionError::NotFound(job_id.to_string()))?;
        record.override_days = override_days;
        record.expires_at = expires_at(record.downloaded_at, override_days);
        write_json_atomic(&self.record_path(job_id), &record).await?;
        Ok(record)
    }

    /// Legacy artifacts without a `retention.json` derive `downloaded_at`
    /// from the artifact directory's modification time and have no override.
    pub async fn effective_retention(
        &self,
        job_id: &str,
        global_default_days: Option<u32>,
    ) -> Result<EffectiveRetention, RetentionError> {
        match self.get(job_id).await? {
            Some(record) => {
                let days = effective_days(record.override_days, global_default_days);
                Ok(EffectiveRetention {
                    override_days: record.override_days,
                    effective_days: days,
                    expires_at: expires_at(record.downloaded_at, days),
                    is_override: record.override_days.is_some(),
                    downloaded_at: record.downloaded_at,
                })
            }
            None => {
                let downloaded_at = artifact_mtime(&self.artifact_dir(job_id))
                    .await
                    .unwrap_or_else(Utc::now);
                Ok(EffectiveRetention {
                    override_days: None,
                    effective_days: global_default_days,
                    expires_at: expires_at(downloaded_at, global_default_days),
                    is_override: false,
                    downloaded_at,
                })
            }
        }
    }

    /// Delete every artifact directory whose effective expiry has passed.
    pub async fn sweep(
        &self,
        global_default_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<u64, RetentionError> {
        let mut deleted = 0;
        let mut entries = match tokio::fs::read_dir(&self.downloads_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let job_id = entry.file_name().to_string_lossy().into_owned();
            let effective = self.effective_retention(&job_id, global_default_days).await?;
            if let Some(expires_at) = effective.expires_at {
                if now > expires_at {
                    tokio::fs::remove_dir_all(entry.path()).await?;
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }
}

async fn artifact_mtime(dir: &Path) -> Option<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(dir).await.ok()?;
    let modified = metadata.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}
