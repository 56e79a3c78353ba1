//! Job Scheduler (§4.1): owns job lifecycle, concurrency, progress
//! subscribers, queue operations, retry/backoff, checkpoint/resume, and
//! drives the pipeline stages. The top of the core (§2).

use super::checkpoint::{self, Checkpoint};
use super::job::{Job, JobDescriptor, SubtitleDescriptor};
use super::queue::Queue;
use super::state_machine::status_label;
use crate::config::{validate_preset, Preset};
use crate::error::{EngineError, EngineResult, ErrorInfo, PipelineError, SchedulerError};
use crate::fetch::build_client;
use crate::mux::{MuxInput, Muxer, SubtitleMuxRequest};
use crate::pipeline::{self, PipelineInput};
use crate::playlist::{self, MediaPlaylist};
use crate::progress::{JobStatus, ProgressBroker, ProgressEvent, SubscriptionHandle};
use crate::retention::RetentionStore;
use crate::upstream::{MediaServerAdapter, PlaylistRequest};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

fn stale_job_age() -> chrono::Duration {
    chrono::Duration::hours(24)
}

pub struct SchedulerConfig {
    pub temp_root: PathBuf,
    pub downloads_root: PathBuf,
    pub max_concurrent_downloads: u32,
    pub segment_concurrency: usize,
    pub default_retention_days: Option<u32>,
    pub remux_binary: String,
}

/// Request to start a new job. The playlist URL itself is resolved here
/// (via the adapter) and frozen into the job's immutable descriptor (§3);
/// `StartJob` in the spec names the descriptor directly, so this is the
/// request that produces one (decision recorded in DESIGN.md).
pub struct StartJobRequest {
    pub item_id: String,
    pub media_source_id: String,
    pub title: String,
    pub preset: Preset,
    pub audio_stream_index: u32,
    pub expected_duration_secs: f64,
    pub subtitle_stream_index: Option<u32>,
    pub subtitle_language: Option<String>,
    pub subtitle_codec: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueInfo {
    pub active_count: usize,
    pub queued_count: usize,
    pub max_concurrent: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelByItemsResult {
    pub cancelled: usize,
    pub removed: usize,
}

struct Inner {
    jobs: DashMap<String, parking_lot::Mutex<Job>>,
    queue: parking_lot::Mutex<Queue>,
    active: parking_lot::Mutex<HashSet<String>>,
    max_concurrent: parking_lot::RwLock<u32>,
    global_retention_days: parking_lot::RwLock<Option<u32>>,
    broker: ProgressBroker,
    client: reqwest::Client,
    adapter: Arc<dyn MediaServerAdapter>,
    muxer: Muxer,
    retention: RetentionStore,
    temp_root: PathBuf,
    downloads_root: PathBuf,
    segment_concurrency: usize,
    cancel_tokens: DashMap<String, CancellationToken>,
    sweeper: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// Serializes `admit()` end to end (§5): candidate selection, removal
    /// from the queue, and insertion into the active set must happen as one
    /// step, or two concurrent callers (every `run_job` completion plus
    /// `start_job`/`unpause`/`cancel`/`resume_all_paused`) can both pick the
    /// same candidate or both fill the last free slot.
    admission_lock: parking_lot::Mutex<()>,
}

/// Cheaply clonable handle onto the scheduler; every clone shares the same
/// state (§9 "Global singletons": explicit handles rather than a process
/// singleton).
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    pub fn new(adapter: Arc<dyn MediaServerAdapter>, config: SchedulerConfig) -> Self {
        let muxer = Muxer::new(crate::mux::RemuxTool::new(config.remux_binary.clone()));
        let inner = Inner {
            jobs: DashMap::new(),
            queue: parking_lot::Mutex::new(Queue::new()),
            active: parking_lot::Mutex::new(HashSet::new()),
            max_concurrent: parking_lot::RwLock::new(config.max_concurrent_downloads.clamp(1, 20)),
            global_retention_days: parking_lot::RwLock::new(config.default_retention_days),
            broker: ProgressBroker::new(),
            client: build_client(),
            adapter,
            muxer,
            retention: RetentionStore::new(config.downloads_root.clone()),
            temp_root: config.temp_root,
            downloads_root: config.downloads_root,
            segment_concurrency: config.segment_concurrency.max(1),
            cancel_tokens: DashMap::new(),
            sweeper: parking_lot::Mutex::new(None),
            admission_lock: parking_lot::Mutex::new(()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Load settings, scan checkpoints, start the sweeper. Idempotent (§9).
    pub async fn initialize(&self) -> EngineResult<()> {
        self.inner.muxer.probe().await?;

        for checkpoint in checkpoint::scan_recoverable(&self.inner.temp_root).await? {
            self.recover_checkpoint(checkpoint);
        }

        let mut sweeper = self.inner.sweeper.lock();
        if sweeper.is_none() {
            let scheduler = self.clone();
            *sweeper = Some(tokio::spawn(async move {
                scheduler.sweep_loop().await;
            }));
        }
        Ok(())
    }

    /// Stop the sweeper. Idempotent (§9).
    pub async fn shutdown(&self) {
        if let Some(handle) = self.inner.sweeper.lock().take() {
            handle.abort();
        }
    }

    async fn sweep_loop(&self) {
        let mut interval = tokio::time::interval(DEFAULT_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            self.cleanup_stale_jobs();
            let global_days = *self.inner.global_retention_days.read();
            match self.inner.retention.sweep(global_days, Utc::now()).await {
                Ok(deleted) => info!(deleted, "retention sweep completed"),
                Err(e) => warn!(error = %e, "retention sweep failed"),
            }
        }
    }

    /// Reconstructs a `failed` job from a recovered checkpoint so the user
    /// can `ResumeFailed` it. Never auto-resumed (§4.1).
    fn recover_checkpoint(&self, checkpoint: Checkpoint) {
        let mut job = Job::new(
            checkpoint.job_id.clone(),
            checkpoint.descriptor,
            self.inner.temp_root.join(&checkpoint.job_id),
            checkpoint.created_at,
        );
        // Rehydrating a job's historical state, not a live transition, so
        // this bypasses `Job::transition`'s state-machine check.
        job.status = JobStatus::Failed;
        job.completed_indices = checkpoint.completed_indices;
        if let Some(segments) = checkpoint.segments {
            job.total_segments = segments.len() as u64;
            job.segments = Some(segments);
        }
        job.last_error = Some(ErrorInfo {
            kind: "Recovered".to_string(),
            message: "recovered from checkpoint after restart".to_string(),
        });
        self.inner
            .jobs
            .insert(checkpoint.job_id, parking_lot::Mutex::new(job));
    }

    fn snapshot(&self, job_id: &str) -> Option<ProgressEvent> {
        self.inner
            .jobs
            .get(job_id)
            .map(|entry| entry.lock().to_progress_event())
    }

    fn publish(&self, job_id: &str) {
        if let Some(event) = self.snapshot(job_id) {
            self.inner.broker.publish(event);
        }
    }

    fn recompute_positions(&self) {
        let queue = self.inner.queue.lock();
        for (i, job_id) in queue.iter().enumerate() {
            if let Some(entry) = self.inner.jobs.get(job_id) {
                entry.lock().queue_position = Some(i + 1);
            }
        }
    }

    /// While `|active| < maxConcurrent`, promote the earliest queued
    /// (not paused) job in queue order (§4.1 "Admission algorithm").
    fn admit(&self) {
        let _admission = self.inner.admission_lock.lock();
        loop {
            let max = *self.inner.max_concurrent.read();
            if self.inner.active.lock().len() >= max as usize {
                return;
            }
            let job_id = {
                let mut queue = self.inner.queue.lock();
                let candidate = queue
                    .iter()
                    .find(|id| {
                        self.inner
                            .jobs
                            .get(*id)
                            .map(|e| e.lock().status == JobStatus::Queued)
                            .unwrap_or(false)
                    })
                    .cloned();
                let Some(job_id) = candidate else {
                    return;
                };
                queue.remove(&job_id);
                job_id
            };

            // The candidate was Queued the instant it was selected above,
            // but its own lock was briefly released between that check and
            // here; a concurrent cancel/remove can still have raced it out
            // from under us. Skip it rather than force an invalid
            // transition and try the next candidate on the next iteration.
            let promoted = match self.inner.jobs.get(&job_id) {
                Some(entry) => {
                    let mut job = entry.lock();
                    if job.transition(JobStatus::Transcoding).is_ok() {
                        job.queue_position = None;
                        job.download_started_at = Some(Utc::now());
                        true
                    } else {
                        false
                    }
                }
                None => false,
            };
            if !promoted {
                continue;
            }
            self.inner.active.lock().insert(job_id.clone());
            self.inner.cancel_tokens.insert(job_id.clone(), CancellationToken::new());
            self.recompute_positions();
            self.publish(&job_id);

            let scheduler = self.clone();
            let jid = job_id.clone();
            tokio::spawn(async move {
                scheduler.run_job(jid).await;
            });
        }
    }

    #[instrument(skip(self, request), fields(item_id = %request.item_id))]
    pub async fn start_job(&self, request: StartJobRequest) -> EngineResult<ProgressEvent> {
        validate_preset(&request.preset)?;

        let playlist_url = self
            .inner
            .adapter
            .resolve_playlist_url(&PlaylistRequest {
                item_id: request.item_id.clone(),
                media_source_id: request.media_source_id.clone(),
                preset_name: request.preset.name.clone(),
                audio_stream_index: request.audio_stream_index,
                subtitle_stream_index: request.subtitle_stream_index,
            })
            .await
            .map_err(SchedulerError::from)?;

        let subtitle = request.subtitle_stream_index.map(|stream_index| SubtitleDescriptor {
            stream_index,
            language: request.subtitle_language.clone(),
            codec: request.subtitle_codec.clone(),
            upstream_base_url: playlist_url.clone(),
            bearer_credential: self.inner.adapter.bearer_credential(),
        });

        let file_name = crate::config::sanitize_file_name(&request.title);
        let descriptor = JobDescriptor {
            item_id: request.item_id,
            media_source_id: request.media_source_id,
            title: request.title,
            file_name,
            preset: request.preset,
            playlist_url,
            expected_duration_secs: request.expected_duration_secs,
            subtitle,
        };

        let job_id = uuid::Uuid::new_v4().to_string();
        let job = Job::new(
            job_id.clone(),
            descriptor,
            self.inner.temp_root.join(&job_id),
            Utc::now(),
        );
        self.inner.jobs.insert(job_id.clone(), parking_lot::Mutex::new(job));
        self.inner.queue.lock().push_back(job_id.clone());
        self.recompute_positions();
        self.publish(&job_id);
        self.admit();

        Ok(self.snapshot(&job_id).expect("just inserted"))
    }

    pub fn resume_failed(&self, job_id: &str) -> EngineResult<ProgressEvent> {
        let entry = self.inner.jobs.get(job_id).ok_or(SchedulerError::NotFound)?;
        {
            let mut job = entry.lock();
            if job.status != JobStatus::Failed {
                return Err(SchedulerError::WrongState {
                    expected: "failed".into(),
                    found: status_label(job.status).into(),
                }
                .into());
            }
            job.transition(JobStatus::Queued)?;
            job.last_error = None;
        }
        self.inner.queue.lock().push_back(job_id.to_string());
        self.recompute_positions();
        self.publish(job_id);
        self.admit();
        Ok(self.snapshot(job_id).expect("exists"))
    }

    pub fn pause(&self, job_id: &str) -> EngineResult<ProgressEvent> {
        let entry = self.inner.jobs.get(job_id).ok_or(SchedulerError::NotFound)?;
        let mut job = entry.lock();
        match job.status {
            JobStatus::Queued => job.transition(JobStatus::Paused)?,
            status if status.is_running() => job.paused_at = Some(Utc::now()),
            other => {
                return Err(SchedulerError::WrongState {
                    expected: "queued or active".into(),
                    found: status_label(other).into(),
                }
                .into())
            }
        }
        let snapshot = job.to_progress_event();
        drop(job);
        self.inner.broker.publish(snapshot.clone());
        Ok(snapshot)
    }

    pub fn unpause(&self, job_id: &str) -> EngineResult<ProgressEvent> {
        let entry = self.inner.jobs.get(job_id).ok_or(SchedulerError::NotFound)?;
        {
            let mut job = entry.lock();
            if job.status != JobStatus::Paused {
                return Err(SchedulerError::WrongState {
                    expected: "paused".into(),
                    found: status_label(job.status).into(),
                }
                .into());
            }
            job.transition(JobStatus::Queued)?;
        }
        self.inner.queue.lock().reorder(job_id, usize::MAX);
        self.recompute_positions();
        self.publish(job_id);
        self.admit();
        Ok(self.snapshot(job_id).expect("exists"))
    }

    pub fn move_to_front(&self, job_id: &str) -> EngineResult<ProgressEvent> {
        self.require_queued_or_paused(job_id)?;
        if !self.inner.queue.lock().move_to_front(job_id) {
            return Err(SchedulerError::NotFound.into());
        }
        self.recompute_positions();
        self.publish(job_id);
        Ok(self.snapshot(job_id).expect("exists"))
    }

    /// Clamped to `[1, queue length]` per §4.1; the core never raises
    /// `BadPosition` for an out-of-range position, it clamps (that error is
    /// reserved for a caller layer rejecting malformed input before it
    /// reaches here — see DESIGN.md).
    pub fn reorder(&self, job_id: &str, position: usize) -> EngineResult<ProgressEvent> {
        self.require_queued_or_paused(job_id)?;
        if !self.inner.queue.lock().reorder(job_id, position) {
            return Err(SchedulerError::NotFound.into());
        }
        self.recompute_positions();
        self.publish(job_id);
        Ok(self.snapshot(job_id).expect("exists"))
    }

    fn require_queued_or_paused(&self, job_id: &str) -> EngineResult<()> {
        let entry = self.inner.jobs.get(job_id).ok_or(SchedulerError::NotFound)?;
        let job = entry.lock();
        if matches!(job.status, JobStatus::Queued | JobStatus::Paused) {
            Ok(())
        } else {
            Err(SchedulerError::WrongState {
                expected: "queued or paused".into(),
                found: status_label(job.status).into(),
            }
            .into())
        }
    }

    pub async fn cancel(&self, job_id: &str) -> EngineResult<ProgressEvent> {
        let (event, _transitioned, _was_queued) = self.cancel_inner(job_id).await?;
        Ok(event)
    }

    /// Returns `(snapshot, did_transition, was_queued_or_paused)`.
    async fn cancel_inner(&self, job_id: &str) -> EngineResult<(ProgressEvent, bool, bool)> {
        let entry = self.inner.jobs.get(job_id).ok_or(SchedulerError::NotFound)?;
        let already_terminal = entry.lock().status.is_terminal();

        if already_terminal {
            return Ok((entry.lock().to_progress_event(), false, false));
        }

        let was_queued = self.inner.queue.lock().remove(job_id);
        self.inner.active.lock().remove(job_id);
        if let Some((_, token)) = self.inner.cancel_tokens.remove(job_id) {
            token.cancel();
        }

        {
            let mut job = entry.lock();
            job.transition(JobStatus::Cancelled)?;
            job.queue_position = None;
        }

        let _ = checkpoint::delete(&self.inner.temp_root, job_id).await;
        let artifact_dir = self.inner.downloads_root.join(job_id);
        if tokio::fs::metadata(&artifact_dir).await.is_ok() {
            let _ = tokio::fs::remove_dir_all(&artifact_dir).await;
        }

        self.recompute_positions();
        self.publish(job_id);
        self.admit();

        Ok((entry.lock().to_progress_event(), true, was_queued))
    }

    pub async fn cancel_by_items(&self, item_ids: &[String]) -> CancelByItemsResult {
        let matching: Vec<String> = self
            .inner
            .jobs
            .iter()
            .filter(|entry| item_ids.iter().any(|id| id == &entry.value().lock().descriptor.item_id))
            .map(|entry| entry.key().clone())
            .collect();

        let mut result = CancelByItemsResult::default();
        for job_id in matching {
            if let Ok((_, transitioned, was_queued)) = self.cancel_inner(&job_id).await {
                if transitioned {
                    result.cancelled += 1;
                    if was_queued {
                        result.removed += 1;
                    }
                }
            }
        }
        result
    }

    /// Only for non-running states; returns `false` (not an error) if the
    /// job is running (§4.1). A caller layer may choose to surface that
    /// `false` as `NotRemovable` (§6.2).
    pub fn remove(&self, job_id: &str) -> EngineResult<bool> {
        let status = {
            let entry = self.inner.jobs.get(job_id).ok_or(SchedulerError::NotFound)?;
            entry.lock().status
        };
        if status.is_running() {
            return Ok(false);
        }
        self.inner.queue.lock().remove(job_id);
        self.inner.jobs.remove(job_id);
        self.inner.broker.clear(job_id);
        self.inner.cancel_tokens.remove(job_id);
        self.recompute_positions();
        Ok(true)
    }

    pub fn pause_all_queued(&self) -> u64 {
        let ids: Vec<String> = self
            .inner
            .jobs
            .iter()
            .filter(|e| e.value().lock().status == JobStatus::Queued)
            .map(|e| e.key().clone())
            .collect();
        for id in &ids {
            if let Some(entry) = self.inner.jobs.get(id) {
                let _ = entry.lock().transition(JobStatus::Paused);
            }
            self.publish(id);
        }
        ids.len() as u64
    }

    pub fn resume_all_paused(&self) -> u64 {
        let mut paused: Vec<(usize, String)> = self
            .inner
            .jobs
            .iter()
            .filter_map(|e| {
                let job = e.value().lock();
                (job.status == JobStatus::Paused).then(|| (job.queue_position.unwrap_or(usize::MAX), e.key().clone()))
            })
            .collect();
        paused.sort_by_key(|(pos, _)| *pos);

        for (_, id) in &paused {
            if let Some(entry) = self.inner.jobs.get(id) {
                let _ = entry.lock().transition(JobStatus::Queued);
            }
            self.inner.queue.lock().reorder(id, usize::MAX);
        }
        self.recompute_positions();
        for (_, id) in &paused {
            self.publish(id);
        }
        self.admit();
        paused.len() as u64
    }

    pub fn clear_completed(&self) -> u64 {
        let ids: Vec<String> = self
            .inner
            .jobs
            .iter()
            .filter(|e| e.value().lock().status.is_terminal())
            .map(|e| e.key().clone())
            .collect();
        for id in &ids {
            self.inner.jobs.remove(id);
            self.inner.broker.clear(id);
        }
        ids.len() as u64
    }

    pub fn queue_info(&self) -> QueueInfo {
        let queued_count = self
            .inner
            .jobs
            .iter()
            .filter(|e| e.value().lock().status == JobStatus::Queued)
            .count();
        QueueInfo {
            active_count: self.inner.active.lock().len(),
            queued_count,
            max_concurrent: *self.inner.max_concurrent.read(),
        }
    }

    /// Running first, then queued (ascending position), then paused
    /// (ascending position), then terminal jobs (created-at descending).
    pub fn get_all(&self) -> Vec<ProgressEvent> {
        let mut running = Vec::new();
        let mut queued = Vec::new();
        let mut paused = Vec::new();
        let mut terminal = Vec::new();

        for entry in self.inner.jobs.iter() {
            let job = entry.value().lock();
            let snapshot = (job.created_at, job.to_progress_event());
            match job.status {
                s if s.is_running() => running.push(snapshot),
                JobStatus::Queued => queued.push(snapshot),
                JobStatus::Paused => paused.push(snapshot),
                _ => terminal.push(snapshot),
            }
        }

        running.sort_by_key(|(created, _)| *created);
        queued.sort_by_key(|(_, event)| event.queue_position.unwrap_or(usize::MAX));
        paused.sort_by_key(|(_, event)| event.queue_position.unwrap_or(usize::MAX));
        terminal.sort_by_key(|(created, _)| std::cmp::Reverse(*created));

        running
            .into_iter()
            .chain(queued)
            .chain(paused)
            .chain(terminal)
            .map(|(_, event)| event)
            .collect()
    }

    pub fn get_progress(&self, job_id: &str) -> Option<ProgressEvent> {
        self.snapshot(job_id)
    }

    pub fn subscribe(
        &self,
        job_id: &str,
        buffer: usize,
    ) -> (mpsc::Receiver<ProgressEvent>, SubscriptionHandle) {
        let initial = self.snapshot(job_id);
        self.inner.broker.subscribe(job_id, buffer, initial)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.inner.broker.unsubscribe(handle);
    }

    fn cleanup_stale_jobs(&self) {
        let now = Utc::now();
        let ids: Vec<String> = self
            .inner
            .jobs
            .iter()
            .filter(|e| {
                let job = e.value().lock();
                !job.status.is_running() && now - job.created_at > stale_job_age()
            })
            .map(|e| e.key().clone())
            .collect();
        for id in ids {
            self.inner.jobs.remove(&id);
            self.inner.broker.clear(&id);
        }
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn run_job(&self, job_id: String) {
        let result = self.execute_pipeline(&job_id).await;
        self.inner.active.lock().remove(&job_id);
        self.inner.cancel_tokens.remove(&job_id);

        match result {
            Ok(()) => {}
            Err(err) if is_cancellation(&err) => {
                // Cancel() already performed the authoritative transition
                // and cleanup; nothing left to do.
            }
            Err(err) => self.fail_or_retry(job_id.clone(), err),
        }

        self.recompute_positions();
        self.admit();
    }

    async fn execute_pipeline(&self, job_id: &str) -> EngineResult<()> {
        let cancel = self
            .inner
            .cancel_tokens
            .get(job_id)
            .map(|t| t.clone())
            .unwrap_or_default();

        let descriptor = {
            let entry = self.inner.jobs.get(job_id).ok_or(SchedulerError::NotFound)?;
            entry.lock().descriptor.clone()
        };

        let media_playlist = self.resolve_media_playlist(&descriptor).await?;

        {
            let entry = self.inner.jobs.get(job_id).ok_or(SchedulerError::NotFound)?;
            let mut job = entry.lock();
            job.total_segments = media_playlist.segments.len() as u64;
            job.segments = Some(media_playlist.segments.clone());
            job.transition(JobStatus::Downloading)?;
        }
        self.write_checkpoint(job_id);
        self.publish(job_id);

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled.into());
        }

        let temp_dir = self.inner.temp_root.join(job_id);
        let (already_completed, init_url) = {
            let entry = self.inner.jobs.get(job_id).ok_or(SchedulerError::NotFound)?;
            let job = entry.lock();
            (job.completed_indices.clone(), media_playlist.init_segment_url.clone())
        };

        let progress_cb: pipeline::ProgressCallback = {
            let scheduler = self.clone();
            let job_id = job_id.to_string();
            Arc::new(move |_completed, _total, bytes_so_far| {
                if let Some(entry) = scheduler.inner.jobs.get(&job_id) {
                    entry.lock().bytes_downloaded = bytes_so_far;
                }
                scheduler.publish(&job_id);
            })
        };

        let on_segment_complete: pipeline::SegmentCompleteCallback = {
            let scheduler = self.clone();
            let job_id = job_id.to_string();
            Arc::new(move |index| {
                let scheduler = scheduler.clone();
                let job_id = job_id.clone();
                Box::pin(async move {
                    if let Some(entry) = scheduler.inner.jobs.get(&job_id) {
                        entry.lock().completed_indices.insert(index);
                    }
                    scheduler.write_checkpoint(&job_id);
                    scheduler.publish(&job_id);
                })
            })
        };

        let output = pipeline::run(
            &self.inner.client,
            PipelineInput {
                segments: &media_playlist.segments,
                init_segment_url: init_url.as_deref(),
                temp_dir: &temp_dir,
                concurrency: self.inner.segment_concurrency,
                already_completed: &already_completed,
            },
            progress_cb,
            on_segment_complete,
            &cancel,
        )
        .await?;

        {
            let entry = self.inner.jobs.get(job_id).ok_or(SchedulerError::NotFound)?;
            let mut job = entry.lock();
            job.transition(JobStatus::Processing)?;
        }
        self.publish(job_id);

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled.into());
        }

        let output_path = self.inner.downloads_root.join(job_id).join(&descriptor.file_name);
        let subtitle_request = descriptor.subtitle.as_ref().map(|sub| SubtitleMuxRequest {
            client: &self.inner.client,
            adapter: self.inner.adapter.as_ref(),
            item_id: &descriptor.item_id,
            media_source_id: &descriptor.media_source_id,
            stream_index: sub.stream_index,
            language: sub.language.as_deref(),
            bearer: sub.bearer_credential.as_deref(),
        });

        let final_path = self
            .inner
            .muxer
            .mux(MuxInput {
                init_segment_path: output.init_segment_path.as_deref(),
                segment_paths: &output.segment_paths,
                temp_dir: &temp_dir,
                output_path: &output_path,
                subtitle: subtitle_request,
            })
            .await?;

        {
            let entry = self.inner.jobs.get(job_id).ok_or(SchedulerError::NotFound)?;
            let mut job = entry.lock();
            job.transition(JobStatus::Completed)?;
            job.final_artifact_path = Some(final_path);
        }
        self.publish(job_id);

        let global_days = *self.inner.global_retention_days.read();
        self.inner
            .retention
            .create_on_complete(job_id, global_days, Utc::now())
            .await?;
        let _ = checkpoint::delete(&self.inner.temp_root, job_id).await;

        Ok(())
    }

    async fn resolve_media_playlist(&self, descriptor: &JobDescriptor) -> EngineResult<MediaPlaylist> {
        let master_body = http_get_text(&self.inner.client, &descriptor.playlist_url).await?;
        let master_entry = playlist::parse_master(&master_body, &descriptor.playlist_url)?;
        let media_body = http_get_text(&self.inner.client, &master_entry.url).await?;
        Ok(playlist::parse_media(&media_body, &master_entry.url)?)
    }

    fn write_checkpoint(&self, job_id: &str) {
        let Some(entry) = self.inner.jobs.get(job_id) else {
            return;
        };
        let checkpoint = Checkpoint::from_job(&entry.lock(), Utc::now());
        let temp_root = self.inner.temp_root.clone();
        tokio::spawn(async move {
            if let Err(e) = checkpoint::write(&temp_root, &checkpoint).await {
                warn!(error = %e, "checkpoint write failed");
            }
        });
    }

    fn fail_or_retry(&self, job_id: String, err: EngineError) {
        let Some(entry) = self.inner.jobs.get(&job_id) else {
            return;
        };
        let info = ErrorInfo::from(&err);
        let retry_count = {
            let mut job = entry.lock();
            job.retry_count += 1;
            job.retry_count
        };

        if retry_count <= MAX_RETRIES {
            {
                let mut job = entry.lock();
                let _ = job.transition(JobStatus::Queued);
                job.last_error = Some(ErrorInfo {
                    kind: info.kind,
                    message: format!("Retry {retry_count}/{MAX_RETRIES}: {}", info.message),
                });
            }
            drop(entry);
            self.publish(&job_id);
            let scheduler = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(RETRY_DELAY).await;
                scheduler.inner.queue.lock().push_front(job_id.clone());
                scheduler.recompute_positions();
                scheduler.publish(&job_id);
                scheduler.admit();
            });
        } else {
            {
                let mut job = entry.lock();
                let _ = job.transition(JobStatus::Failed);
                job.last_error = Some(ErrorInfo {
                    kind: info.kind,
                    message: format!("Failed after {MAX_RETRIES} retries: {}", info.message),
                });
            }
            drop(entry);
            self.publish(&job_id);
        }
    }
}

fn is_cancellation(err: &EngineError) -> bool {
    matches!(err, EngineError::Pipeline(PipelineError::Cancelled))
}

async fn http_get_text(client: &reqwest::Client, url: &str) -> Result<String, crate::error::FetchError> {
    let response = client
        .get(url)
        .timeout(Duration::from_secs(60))
        .send()
        .await
        .map_err(crate::error::FetchError::from)?;
    if !response.status().is_success() {
        return Err(crate::error::FetchError::UpstreamError(format!(
            "HTTP {}",
            response.status()
        )));
    }
    response.text().await.map_err(crate::error::FetchError::from)
}
