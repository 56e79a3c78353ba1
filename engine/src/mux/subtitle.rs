//! Subtitle acquisition for the optional mux step (§4.5 step 3a, §5
//! timeouts). Failure to obtain any track is the caller's to log; it must
//! never fail the job (§9 "Subtitle failure policy").

use crate::upstream::{MediaServerAdapter, SubtitleFormat};
use bytes::Bytes;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SubtitleFetch {
    pub format: SubtitleFormat,
    pub body: Bytes,
}

/// Try subtitle formats in [`SubtitleFormat::FALLBACK_ORDER`], accepting the
/// first that returns a non-empty body.
pub async fn fetch_first_available(
    client: &reqwest::Client,
    adapter: &dyn MediaServerAdapter,
    item_id: &str,
    media_source_id: &str,
    subtitle_stream_index: u32,
    bearer: Option<&str>,
) -> Option<SubtitleFetch> {
    for format in SubtitleFormat::FALLBACK_ORDER {
        let url = adapter.subtitle_url(item_id, media_source_id, subtitle_stream_index, format);
        if let Some(body) = try_format(client, &url, bearer).await {
            return Some(SubtitleFetch { format, body });
        }
    }
    None
}

async fn try_format(client: &reqwest::Client, url: &str, bearer: Option<&str>) -> Option<Bytes> {
    let mut probe = client.head(url).timeout(PROBE_TIMEOUT);
    if let Some(token) = bearer {
        probe = probe.bearer_auth(token);
    }
    match probe.send().await {
        Ok(resp) if resp.status().is_success() => {}
        _ => return None,
    }

    let mut download = client.get(url).timeout(DOWNLOAD_TIMEOUT);
    if let Some(token) = bearer {
        download = download.bearer_auth(token);
    }
    let response = download.send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    let body = response.bytes().await.ok()?;
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}
