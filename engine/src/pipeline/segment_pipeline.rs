//! Parallel segment pipeline (§4.4): drives the Segment Fetcher across a
//! segment list under a concurrency cap, skipping already-completed
//! indices, reporting progress, and invoking a checkpoint hook on every
//! success.

use crate::error::{FetchError, PipelineError};
use crate::fetch::fetch_to_file_default;
use crate::playlist::Segment;
use futures::future::BoxFuture;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// `(completedSegments, totalSegments, bytesSoFar)`.
pub type ProgressCallback = Arc<dyn Fn(u64, u64, u64) + Send + Sync>;
/// Invoked with the completed segment's index; typically writes a checkpoint.
pub type SegmentCompleteCallback = Arc<dyn Fn(u64) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct PipelineInput<'a> {
    pub segments: &'a [Segment],
    pub init_segment_url: Option<&'a str>,
    pub temp_dir: &'a Path,
    pub concurrency: usize,
    pub already_completed: &'a HashSet<u64>,
}

pub struct PipelineOutput {
    pub init_segment_path: Option<PathBuf>,
    /// Ordered by segment index, one path per input segment.
    pub segment_paths: Vec<PathBuf>,
    pub total_bytes: u64,
}

fn segment_path(temp_dir: &Path, index: u64) -> PathBuf {
    temp_dir.join(format!("{index}.mp4"))
}

pub async fn run(
    client: &reqwest::Client,
    input: PipelineInput<'_>,
    progress: ProgressCallback,
    on_segment_complete: SegmentCompleteCallback,
    cancel: &CancellationToken,
) -> Result<PipelineOutput, PipelineError> {
    tokio::fs::create_dir_all(input.temp_dir)
        .await
        .map_err(|e| PipelineError::Io(e.to_string()))?;

    let total_segments = input.segments.len() as u64;
    let total_bytes = Arc::new(AtomicU64::new(0));
    let completed_count = Arc::new(AtomicU64::new(input.already_completed.len() as u64));

    for &index in input.already_completed {
        if let Ok(meta) = tokio::fs::metadata(segment_path(input.temp_dir, index)).await {
            total_bytes.fetch_add(meta.len(), Ordering::Relaxed);
        }
    }

    let init_segment_path = match input.init_segment_url {
        Some(url) => {
            let path = input.temp_dir.join("init.mp4");
            match tokio::fs::metadata(&path).await {
                Ok(meta) => {
                    total_bytes.fetch_add(meta.len(), Ordering::Relaxed);
                }
                Err(_) => {
                    let bytes = fetch_to_file_default(client, url, &path, None)
                        .await
                        .map_err(|e| PipelineError::Io(format!("init segment: {e}")))?;
                    total_bytes.fetch_add(bytes, Ordering::Relaxed);
                }
            }
            Some(path)
        }
        None => None,
    };

    progress(
        completed_count.load(Ordering::Relaxed),
        total_segments,
        total_bytes.load(Ordering::Relaxed),
    );

    let pending: VecDeque<Segment> = input
        .segments
        .iter()
        .filter(|s| !input.already_completed.contains(&s.index))
        .cloned()
        .collect();
    let queue = Arc::new(parking_lot::Mutex::new(pending));
    let failure: Arc<parking_lot::Mutex<Option<(u64, FetchError)>>> =
        Arc::new(parking_lot::Mutex::new(None));
    let abort = CancellationToken::new();

    let worker_count = input.concurrency.max(1);
    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let client = client.clone();
        let queue = Arc::clone(&queue);
        let failure = Arc::clone(&failure);
        let total_bytes = Arc::clone(&total_bytes);
        let completed_count = Arc::clone(&completed_count);
        let progress = Arc::clone(&progress);
        let on_segment_complete = Arc::clone(&on_segment_complete);
        let temp_dir = input.temp_dir.to_path_buf();
        let cancel = cancel.clone();
        let abort = abort.clone();

        workers.push(tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() || abort.is_cancelled() {
                    return;
                }
                let segment = {
                    let mut q = queue.lock();
                    q.pop_front()
                };
                let Some(segment) = segment else {
                    return;
                };

                let dest = segment_path(&temp_dir, segment.index);
                match fetch_to_file_default(&client, &segment.url, &dest, segment.byte_range.as_ref()).await {
                    Ok(bytes) => {
                        total_bytes.fetch_add(bytes, Ordering::Relaxed);
                        let completed = completed_count.fetch_add(1, Ordering::Relaxed) + 1;
                        progress(completed, total_segments, total_bytes.load(Ordering::Relaxed));
                        on_segment_complete(segment.index).await;
                    }
                    Err(cause) => {
                        let mut slot = failure.lock();
                        if slot.is_none() {
                            *slot = Some((segment.index, cause));
                        }
                        abort.cancel();
                        return;
                    }
                }
            }
        }));
    }

    for worker in workers {
        let _ = worker.await;
    }

    if let Some((index, cause)) = failure.lock().take() {
        return Err(PipelineError::SegmentFailed { index, cause });
    }
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let segment_paths = input
        .segments
        .iter()
        .map(|s| segment_path(input.temp_dir, s.index))
        .collect();

    Ok(PipelineOutput {
        init_segment_path,
        segment_paths,
        total_bytes: total_bytes.load(Ordering::Relaxed),
    })
}
