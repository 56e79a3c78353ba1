//! Shared test harness: a fake upstream adapter, a minimal HTTP/1.1 server
//! for serving canned playlists and segments, and a throwaway remux binary
//! so the muxer has something to shell out to.

use async_trait::async_trait;
use dashmap::DashMap;
use offload_engine::upstream::{MediaServerAdapter, PlaylistRequest, SubtitleFormat, UpstreamAdapterError};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Fakes the one collaborator the core depends on: a media server that can
/// resolve a playlist URL for an (item, media source) pair. Routes are
/// registered per item id, mirroring `MockStreamerRepository`'s
/// `with_streamers` constructor in the teacher's streamer manager tests.
pub struct TestAdapter {
    playlist_urls: StdMutex<std::collections::HashMap<String, String>>,
}

impl TestAdapter {
    pub fn new() -> Self {
        Self {
            playlist_urls: StdMutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn route(&self, item_id: &str, playlist_url: &str) {
        self.playlist_urls
            .lock()
            .unwrap()
            .insert(item_id.to_string(), playlist_url.to_string());
    }
}

#[async_trait]
impl MediaServerAdapter for TestAdapter {
    async fn resolve_playlist_url(
        &self,
        request: &PlaylistRequest,
    ) -> Result<String, UpstreamAdapterError> {
        self.playlist_urls
            .lock()
            .unwrap()
            .get(&request.item_id)
            .cloned()
            .ok_or_else(|| UpstreamAdapterError::NoMediaSource(request.item_id.clone()))
    }

    fn subtitle_url(
        &self,
        _item_id: &str,
        _media_source_id: &str,
        _subtitle_stream_index: u32,
        _format: SubtitleFormat,
    ) -> String {
        "http://127.0.0.1:1/no-subtitle".to_string()
    }

    fn bearer_credential(&self) -> Option<String> {
        None
    }
}

type ResponseQueue = StdMutex<VecDeque<(u16, Vec<u8>)>>;

/// A minimal HTTP/1.1 server that answers GET requests from a per-path queue
/// of canned `(status, body)` responses. Once a path's queue is down to its
/// last entry, that entry repeats for every further request — enough to
/// script a sequence of transient failures followed by a steady success.
pub struct MockServer {
    pub base_url: String,
    routes: Arc<DashMap<String, ResponseQueue>>,
    hits: Arc<DashMap<String, u64>>,
    _accept_loop: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let routes: Arc<DashMap<String, ResponseQueue>> = Arc::new(DashMap::new());
        let hits: Arc<DashMap<String, u64>> = Arc::new(DashMap::new());
        let accept_routes = routes.clone();
        let accept_hits = hits.clone();
        let accept_loop = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(v) => v,
                    Err(_) => return,
                };
                let routes = accept_routes.clone();
                let hits = accept_hits.clone();
                tokio::spawn(async move {
                    let _ = serve_one(stream, routes, hits).await;
                });
            }
        });
        Self {
            base_url: format!("http://{addr}"),
            routes,
            hits,
            _accept_loop: accept_loop,
        }
    }

    /// Number of requests served for `path` so far.
    pub fn hit_count(&self, path: &str) -> u64 {
        self.hits.get(path).map(|v| *v).unwrap_or(0)
    }

    /// Always answer `path` with the same `(status, body)`.
    pub fn set(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        let mut queue = VecDeque::new();
        queue.push_back((status, body.into()));
        self.routes.insert(path.to_string(), StdMutex::new(queue));
    }

    /// Answer successive GETs of `path` with each entry in turn; the final
    /// entry then repeats for any further request.
    pub fn set_sequence(&self, path: &str, responses: Vec<(u16, Vec<u8>)>) {
        self.routes
            .insert(path.to_string(), StdMutex::new(responses.into()));
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn serve_one(
    mut stream: tokio::net::TcpStream,
    routes: Arc<DashMap<String, ResponseQueue>>,
    hits: Arc<DashMap<String, u64>>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    loop {
        let mut header_line = String::new();
        let n = reader.read_line(&mut header_line).await?;
        if n == 0 || header_line == "\r\n" || header_line == "\n" {
            break;
        }
    }

    *hits.entry(path.clone()).or_insert(0) += 1;

    let (status, body) = match routes.get(&path) {
        Some(queue) => {
            let mut guard = queue.lock().unwrap();
            if guard.len() > 1 {
                guard.pop_front().unwrap()
            } else {
                guard.front().cloned().unwrap_or((404, Vec::new()))
            }
        }
        None => (404, Vec::new()),
    };

    let reason = if status == 200 { "OK" } else { "ERR" };
    let header = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    write_half.write_all(header.as_bytes()).await?;
    write_half.write_all(&body).await?;
    write_half.flush().await?;
    Ok(())
}

/// A fragmented-MP4-looking body: a valid ISOBMFF box header (`ftyp`)
/// padded past the fetcher's minimum body length.
pub fn fake_segment_body() -> Vec<u8> {
    let mut body = vec![0u8, 0, 0, 24];
    body.extend_from_slice(b"ftyp");
    body.extend_from_slice(b"isom");
    body.resize(200, 0);
    body
}

pub fn media_playlist_body(segment_names: &[&str], durations: &[f64]) -> String {
    let mut body = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:6\n");
    for (name, duration) in segment_names.iter().zip(durations) {
        body.push_str(&format!("#EXTINF:{duration:.3},\n{name}\n"));
    }
    body.push_str("#EXT-X-ENDLIST\n");
    body
}

pub fn master_playlist_body(media_path: &str) -> String {
    format!(
        "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1000000,RESOLUTION=1920x1080\n{media_path}\n"
    )
}

/// Writes a throwaway shell script standing in for the remux binary: it
/// finds the first `-i` argument and copies that file onto the last
/// argument, emulating a copy-only remux without shelling out to ffmpeg.
#[cfg(unix)]
pub fn write_fake_remux_tool(dir: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("fake-ffmpeg.sh");
    let contents = r#"#!/bin/sh
input=""
prev=""
last=""
for arg in "$@"; do
  if [ "$prev" = "-i" ] && [ -z "$input" ]; then
    input="$arg"
  fi
  prev="$arg"
  last="$arg"
done
if [ -n "$input" ]; then
  cp "$input" "$last"
else
  exit 1
fi
"#;
    std::fs::write(&script, contents).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

pub fn scheduler_config(temp_root: std::path::PathBuf, downloads_root: std::path::PathBuf, remux_binary: String) -> offload_engine::scheduler::SchedulerConfig {
    offload_engine::scheduler::SchedulerConfig {
        temp_root,
        downloads_root,
        max_concurrent_downloads: 5,
        segment_concurrency: 2,
        default_retention_days: None,
        remux_binary,
    }
}

pub fn sample_preset() -> offload_engine::config::Preset {
    offload_engine::config::Preset {
        name: "1080p".into(),
        max_width: 1920,
        max_video_bitrate: 8_000_000,
        video_codec: offload_engine::config::VideoCodec::H264,
        audio_codec: offload_engine::config::AudioCodec::Aac,
        audio_bitrate: 128_000,
        audio_channels: 2,
    }
}

/// Binds a port and never accepts on it: connections complete the TCP
/// handshake (the kernel ACKs out of the listen backlog) but never receive a
/// response, so an HTTP request against it hangs until its own timeout. Used
/// to park a job in an admitted, running state for queue/admission
/// assertions without waiting on a real transcode.
pub struct BlackHole {
    _listener: std::net::TcpListener,
    pub addr: SocketAddr,
}

impl BlackHole {
    pub fn bind() -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        Self {
            _listener: listener,
            addr,
        }
    }

    pub fn playlist_url(&self) -> String {
        format!("http://{}/master.m3u8", self.addr)
    }
}
