//! Upstream media-server adapter (spec §6.1, "Out of scope: external
//! collaborators"). The core depends on this narrow trait; authentication,
//! library browsing and URL construction live on the implementer's side. The
//! core treats credentials opaquely and only forwards them for subtitle
//! fetches.

use async_trait::async_trait;

/// Subtitle container formats the core knows how to ask for, tried in this
/// order until one returns a non-empty body (spec §4.5 step 3a).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    Vtt,
    Ass,
    Sub,
}

impl SubtitleFormat {
    pub const FALLBACK_ORDER: [SubtitleFormat; 4] = [
        SubtitleFormat::Srt,
        SubtitleFormat::Vtt,
        SubtitleFormat::Ass,
        SubtitleFormat::Sub,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::Vtt => "vtt",
            SubtitleFormat::Ass => "ass",
            SubtitleFormat::Sub => "sub",
        }
    }
}

/// Request parameters for resolving a master playlist URL.
#[derive(Debug, Clone)]
pub struct PlaylistRequest {
    pub item_id: String,
    pub media_source_id: String,
    pub preset_name: String,
    pub audio_stream_index: u32,
    pub subtitle_stream_index: Option<u32>,
}

/// Everything the core needs from the upstream media server.
///
/// Implementations own auth tokens and URL construction; the core forwards
/// bearer credentials verbatim for subtitle fetches and never inspects them.
#[async_trait]
pub trait MediaServerAdapter: Send + Sync {
    /// Resolve the master-playlist URL the transcoder will serve for this
    /// (item, media source, preset, audio/subtitle stream) combination.
    async fn resolve_playlist_url(
        &self,
        request: &PlaylistRequest,
    ) -> Result<String, UpstreamAdapterError>;

    /// URL for fetching a subtitle stream in a given container format.
    fn subtitle_url(
        &self,
        item_id: &str,
        media_source_id: &str,
        subtitle_stream_index: u32,
        format: SubtitleFormat,
    ) -> String;

    /// Opaque bearer credential forwarded verbatim on subtitle fetches.
    fn bearer_credential(&self) -> Option<String>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamAdapterError {
    #[error("media source not found: {0}")]
    NoMediaSource(String),
    #[error("adapter error: {0}")]
    Other(String),
}

impl From<UpstreamAdapterError> for crate::error::SchedulerError {
    fn from(err: UpstreamAdapterError) -> Self {
        match err {
            UpstreamAdapterError::NoMediaSource(msg) => {
                crate::error::SchedulerError::NoMediaSource(msg)
            }
            UpstreamAdapterError::Other(msg) => crate::error::SchedulerError::UpstreamAdapter(msg),
        }
    }
}
