//! Segment fetcher (§4.3): download one URL to one file with validation.
//! Stateless across calls — every call opens its own request and carries no
//! state beyond its arguments.

use super::retry::{retry_with_backoff, RetryAction, DEFAULT_RETRY_BUDGET};
use super::validate::{is_recognized_fragment, looks_like_json};
use crate::error::FetchError;
use crate::playlist::ByteRange;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, RANGE};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const MIN_BODY_LEN: usize = 100;

pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .expect("static client configuration is always valid")
}

/// Download `url` to `dest`, retrying transient failures up to
/// `retry_budget` times. `byte_range`, when set, is sent as a `Range`
/// header — single-file fMP4 playlists address every segment by byte
/// range into the same resource, so fetching the whole response per
/// segment would download it once per segment and corrupt the
/// concatenated output. Returns the number of bytes written.
#[instrument(skip(client), fields(url, retry_budget))]
pub async fn fetch_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    retry_budget: u32,
    byte_range: Option<&ByteRange>,
) -> Result<u64, FetchError> {
    let body = retry_with_backoff(retry_budget.max(1), |_attempt| async move {
        match fetch_once(client, url, byte_range).await {
            Ok(bytes) => RetryAction::Success(bytes),
            Err(e) if e.is_retryable() => RetryAction::Retry(e),
            Err(e) => RetryAction::Fail(e),
        }
    })
    .await?;

    write_file(dest, &body)
        .await
        .map_err(|e| FetchError::NetworkError(format!("writing {}: {e}", dest.display())))?;

    Ok(body.len() as u64)
}

/// Default-budget convenience wrapper; see [`fetch_to_file`].
pub async fn fetch_to_file_default(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    byte_range: Option<&ByteRange>,
) -> Result<u64, FetchError> {
    fetch_to_file(client, url, dest, DEFAULT_RETRY_BUDGET, byte_range).await
}

async fn write_file(dest: &Path, body: &Bytes) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(dest).await?;
    file.write_all(body).await?;
    file.flush().await
}

/// A single GET-and-validate attempt; no retry logic here.
async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    byte_range: Option<&ByteRange>,
) -> Result<Bytes, FetchError> {
    let mut request = client.get(url).timeout(FETCH_TIMEOUT);
    if let Some(range) = byte_range {
        let start = range.offset;
        let end = start.saturating_add(range.length).saturating_sub(1);
        request = request.header(RANGE, format!("bytes={start}-{end}"));
    }
    let response = request.send().await.map_err(FetchError::from)?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = response.bytes().await.map_err(FetchError::from)?;

    if body.len() < MIN_BODY_LEN {
        return Err(FetchError::EmptyResponse);
    }

    if is_textual(&content_type) {
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(value) => return Err(FetchError::UpstreamError(extract_message(&value))),
            Err(_) => return Err(FetchError::UnexpectedContentType(content_type)),
        }
    }

    if is_recognized_fragment(&body) {
        return Ok(body);
    }

    if looks_like_json(&body) {
        return Err(FetchError::ValidationFailed(
            "response body is JSON masquerading as a media segment".into(),
        ));
    }

    Err(FetchError::ValidationFailed(
        "response body is not a recognized fragmented-container box".into(),
    ))
}

fn is_textual(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.contains("json") || lower.starts_with("text/")
}

fn extract_message(value: &serde_json::Value) -> String {
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_message_field() {
        let value = serde_json::json!({"message": "still transcoding"});
        assert_eq!(extract_message(&value), "still transcoding");
    }

    #[test]
    fn extracts_error_field_when_message_absent() {
        let value = serde_json::json!({"error": "transcoding"});
        assert_eq!(extract_message(&value), "transcoding");
    }

    #[test]
    fn falls_back_to_whole_value_when_neither_field_present() {
        let value = serde_json::json!({"status": "pending"});
        assert_eq!(extract_message(&value), value.to_string());
    }

    #[test]
    fn textual_detection_covers_json_and_text_content_types() {
        assert!(is_textual("application/json"));
        assert!(is_textual("application/json; charset=utf-8"));
        assert!(is_textual("text/plain"));
        assert!(!is_textual("video/mp4"));
        assert!(!is_textual(""));
    }

    #[tokio::test]
    async fn a_byte_range_is_sent_as_a_range_header() {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();

            let mut body = vec![0u8, 0, 0, 24];
            body.extend_from_slice(b"ftyp");
            body.resize(150, 0);
            let header = format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(header.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
            request
        });

        let client = build_client();
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("seg.mp4");
        let range = ByteRange { length: 500, offset: 1000 };
        fetch_to_file(&client, &format!("http://{addr}/seg"), &dest, 1, Some(&range))
            .await
            .unwrap();

        let request = server.join().unwrap();
        assert!(request.contains("Range: bytes=1000-1499"), "{request}");
    }
}
