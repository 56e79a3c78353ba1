//! Master playlist parsing (§4.2): selects the first stream entry, the one
//! following the first stream-info tag.

use super::attrs::parse_attributes;
use super::url_resolve::resolve_url;
use crate::error::PlaylistError;

#[derive(Debug, Clone, PartialEq)]
pub struct MasterPlaylistEntry {
    pub url: String,
    pub bandwidth: Option<u64>,
    pub resolution: Option<String>,
    pub codecs: Option<String>,
}

const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF:";

pub fn parse_master(body: &str, base_url: &str) -> Result<MasterPlaylistEntry, PlaylistError> {
    let lines: Vec<&str> = body.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        let Some(attr_str) = line.trim().strip_prefix(STREAM_INF_TAG) else {
            continue;
        };
        let Some(uri) = lines[i + 1..]
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty() && !l.starts_with('#'))
        else {
            continue;
        };

        let attrs = parse_attributes(attr_str);
        return Ok(MasterPlaylistEntry {
            url: resolve_url(base_url, uri),
            bandwidth: attrs.get("BANDWIDTH").and_then(|v| v.parse().ok()),
            resolution: attrs.get("RESOLUTION").cloned(),
            codecs: attrs.get("CODECS").cloned(),
        });
    }
    Err(PlaylistError::NoMediaPlaylist)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://server/hls/abc/master.m3u8";

    #[test]
    fn selects_first_stream_entry() {
        let body = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=1920x1080,CODECS=\"avc1.4d001f,mp4a.40.2\"\n\
1080p/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=500000,RESOLUTION=640x360\n\
360p/index.m3u8\n";
        let entry = parse_master(body, BASE).unwrap();
        assert_eq!(entry.url, "https://server/hls/abc/1080p/index.m3u8");
        assert_eq!(entry.bandwidth, Some(1_280_000));
        assert_eq!(entry.resolution.as_deref(), Some("1920x1080"));
        assert_eq!(entry.codecs.as_deref(), Some("avc1.4d001f,mp4a.40.2"));
    }

    #[test]
    fn no_stream_inf_tag_is_no_media_playlist() {
        let body = "#EXTM3U\n#EXT-X-VERSION:7\n";
        assert_eq!(parse_master(body, BASE), Err(PlaylistError::NoMediaPlaylist));
    }

    #[test]
    fn missing_attributes_are_absent_not_errors() {
        let body = "#EXTM3U\n#EXT-X-STREAM-INF:\nindex.m3u8\n";
        let entry = parse_master(body, BASE).unwrap();
        assert_eq!(entry.bandwidth, None);
        assert_eq!(entry.resolution, None);
        assert_eq!(entry.codecs, None);
    }
}
