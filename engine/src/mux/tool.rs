//! External media tool contract (§6.4): the muxer shells out to a copy-only
//! remuxer for fast-start and optional subtitle muxing. At startup, probe
//! for its presence rather than discover `ToolMissing` mid-job (§9).

use crate::error::MuxError;
use procutil::{is_tool_missing, tail_bytes, tokio_command};
use std::path::Path;

const STDERR_TAIL_BYTES: usize = 4096;

/// Handle on the external remux binary (conventionally `ffmpeg`).
#[derive(Debug, Clone)]
pub struct RemuxTool {
    binary: String,
}

impl RemuxTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Confirm the binary can be launched at all. Call once during
    /// `Initialize()`; a missing tool should fail fast, not mid-job.
    pub async fn probe(&self) -> Result<(), MuxError> {
        match tokio_command(&self.binary).arg("-version").output().await {
            Ok(_) => Ok(()),
            Err(e) if is_tool_missing(&e) => Err(self.tool_missing()),
            Err(e) => Err(MuxError::ToolMissing {
                hint: format!("failed to launch `{}`: {e}", self.binary),
            }),
        }
    }

    /// Copy-only remux of `input` into `output` with the fast-start (moov
    /// first) flag set; no re-encoding.
    pub async fn remux_fast_start(&self, input: &Path, output: &Path) -> Result<(), MuxError> {
        let args = [
            "-y",
            "-i",
            &input.to_string_lossy(),
            "-c",
            "copy",
            "-movflags",
            "+faststart",
            &output.to_string_lossy(),
        ];
        self.run(&args).await
    }

    /// Copy video and audio from `video`, mux in `subtitle`, and re-apply
    /// fast-start. Subtitle codec is `ass` for ASS input, `mov_text`
    /// otherwise; language metadata is attached when known (§6.4).
    pub async fn mux_subtitle(
        &self,
        video: &Path,
        subtitle: &Path,
        output: &Path,
        subtitle_codec: &str,
        language: Option<&str>,
    ) -> Result<(), MuxError> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-i".into(),
            video.to_string_lossy().into_owned(),
            "-i".into(),
            subtitle.to_string_lossy().into_owned(),
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "0:a".into(),
            "-map".into(),
            "1:s".into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "copy".into(),
            "-c:s".into(),
            subtitle_codec.into(),
        ];
        if let Some(lang) = language {
            args.push("-metadata:s:s:0".into());
            args.push(format!("language={lang}"));
        }
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push(output.to_string_lossy().into_owned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs).await
    }

    async fn run(&self, args: &[&str]) -> Result<(), MuxError> {
        let output = tokio_command(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                if is_tool_missing(&e) {
                    self.tool_missing()
                } else {
                    MuxError::ToolMissing {
                        hint: format!("failed to launch `{}`: {e}", self.binary),
                    }
                }
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MuxError::RemuxFailed {
                exit_code: output.status.code(),
                stderr_tail: tail_bytes(&output.stderr, STDERR_TAIL_BYTES),
            })
        }
    }

    fn tool_missing(&self) -> MuxError {
        MuxError::ToolMissing {
            hint: format!(
                "`{}` was not found on PATH; install ffmpeg and ensure it is reachable",
                self.binary
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_reports_tool_missing_for_a_nonexistent_binary() {
        let tool = RemuxTool::new("definitely-not-a-real-binary-xyz");
        let err = tool.probe().await.unwrap_err();
        assert!(matches!(err, MuxError::ToolMissing { .. }));
    }
}
