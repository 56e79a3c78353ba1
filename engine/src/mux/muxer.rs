//! Muxer (§4.5): binary-concatenate fragmented segments, remux for
//! fast-start, and optionally mux in a subtitle track.

use super::subtitle::fetch_first_available;
use super::tool::RemuxTool;
use crate::error::MuxError;
use crate::upstream::{MediaServerAdapter, SubtitleFormat};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{instrument, warn};

/// Optional subtitle mux parameters (job descriptor fields, §3).
pub struct SubtitleMuxRequest<'a> {
    pub client: &'a reqwest::Client,
    pub adapter: &'a dyn MediaServerAdapter,
    pub item_id: &'a str,
    pub media_source_id: &'a str,
    pub stream_index: u32,
    pub language: Option<&'a str>,
    pub bearer: Option<&'a str>,
}

pub struct MuxInput<'a> {
    pub init_segment_path: Option<&'a Path>,
    pub segment_paths: &'a [PathBuf],
    pub temp_dir: &'a Path,
    pub output_path: &'a Path,
    pub subtitle: Option<SubtitleMuxRequest<'a>>,
}

pub struct Muxer {
    tool: RemuxTool,
}

impl Muxer {
    pub fn new(tool: RemuxTool) -> Self {
        Self { tool }
    }

    /// Confirm the external tool is reachable. Call during `Initialize()`
    /// (§9 "External-tool dependency") — never discover `ToolMissing` mid-job.
    pub async fn probe(&self) -> Result<(), MuxError> {
        self.tool.probe().await
    }

    #[instrument(skip(self, input), fields(output_path = %input.output_path.display(), segment_count = input.segment_paths.len()))]
    pub async fn mux(&self, input: MuxInput<'_>) -> Result<PathBuf, MuxError> {
        let concat_path = input.temp_dir.join("concat.mp4");
        concatenate(input.init_segment_path, input.segment_paths, &concat_path).await?;

        let remux_result = self
            .tool
            .remux_fast_start(&concat_path, input.output_path)
            .await;
        let _ = tokio::fs::remove_file(&concat_path).await;
        remux_result?;

        if let Some(request) = input.subtitle {
            self.try_mux_subtitle(input.temp_dir, input.output_path, request)
                .await;
        }

        Ok(input.output_path.to_path_buf())
    }

    /// Subtitle failure never fails the job (§9); log and keep the
    /// subtitle-free output.
    async fn try_mux_subtitle(
        &self,
        temp_dir: &Path,
        output_path: &Path,
        request: SubtitleMuxRequest<'_>,
    ) {
        let Some(fetched) = fetch_first_available(
            request.client,
            request.adapter,
            request.item_id,
            request.media_source_id,
            request.stream_index,
            request.bearer,
        )
        .await
        else {
            warn!(item_id = request.item_id, "no subtitle track available in any format");
            return;
        };

        let subtitle_path = temp_dir.join(format!("subtitle.{}", fetched.format.extension()));
        if let Err(e) = write_file(&subtitle_path, &fetched.body).await {
            warn!(error = %e, "failed to write fetched subtitle to disk");
            return;
        }

        let subtitle_codec = match fetched.format {
            SubtitleFormat::Ass => "ass",
            _ => "mov_text",
        };
        let subtitled_output = temp_dir.join("with_subs.mp4");
        let mux_result = self
            .tool
            .mux_subtitle(
                output_path,
                &subtitle_path,
                &subtitled_output,
                subtitle_codec,
                request.language,
            )
            .await;

        match mux_result {
            Ok(()) => {
                if let Err(e) = tokio::fs::rename(&subtitled_output, output_path).await {
                    warn!(error = %e, "failed to replace output with subtitled version");
                }
            }
            Err(e) => warn!(error = %e, "subtitle mux failed; emitting without subtitles"),
        }
    }
}

async fn concatenate(
    init_segment_path: Option<&Path>,
    segment_paths: &[PathBuf],
    dest: &Path,
) -> Result<(), MuxError> {
    let mut out = tokio::fs::File::create(dest).await?;
    if let Some(init_path) = init_segment_path {
        append_file(&mut out, init_path).await?;
    }
    for segment_path in segment_paths {
        append_file(&mut out, segment_path).await?;
    }
    out.flush().await?;
    Ok(())
}

async fn append_file(out: &mut tokio::fs::File, path: &Path) -> Result<(), MuxError> {
    let mut input = tokio::fs::File::open(path).await?;
    tokio::io::copy(&mut input, out).await?;
    Ok(())
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn concatenate_appends_init_then_segments_in_order() {
        let dir = tempdir().unwrap();
        let init = dir.path().join("init.mp4");
        let seg0 = dir.path().join("0.mp4");
        let seg1 = dir.path().join("1.mp4");
        tokio::fs::write(&init, b"INIT").await.unwrap();
        tokio::fs::write(&seg0, b"SEG0").await.unwrap();
        tokio::fs::write(&seg1, b"SEG1").await.unwrap();

        let dest = dir.path().join("concat.mp4");
        concatenate(Some(&init), &[seg0, seg1], &dest).await.unwrap();

        let contents = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(contents, b"INITSEG0SEG1");
    }

    #[tokio::test]
    async fn concatenate_without_init_segment_starts_with_first_segment() {
        let dir = tempdir().unwrap();
        let seg0 = dir.path().join("0.mp4");
        tokio::fs::write(&seg0, b"SEG0").await.unwrap();

        let dest = dir.path().join("concat.mp4");
        concatenate(None, &[seg0], &dest).await.unwrap();

        let contents = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(contents, b"SEG0");
    }

    #[tokio::test]
    async fn concatenate_surfaces_missing_segment_as_concat_io_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.mp4");
        let dest = dir.path().join("concat.mp4");
        let err = concatenate(None, &[missing], &dest).await.unwrap_err();
        assert!(matches!(err, MuxError::ConcatIOError(_)));
    }
}
