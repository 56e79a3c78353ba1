//! Media playlist parsing (§4.2): ordered segment list, optional init
//! segment, target duration, total duration and completeness.

use super::attrs::parse_attributes;
use super::url_resolve::resolve_url;
use crate::error::PlaylistError;
use serde::{Deserialize, Serialize};

const DEFAULT_TARGET_DURATION: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ByteRange {
    pub length: u64,
    pub offset: u64,
}

/// Also the on-disk shape recorded in a job checkpoint's cached segment list
/// (spec §3, Checkpoint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub index: u64,
    pub url: String,
    pub duration: f64,
    pub byte_range: Option<ByteRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub segments: Vec<Segment>,
    pub init_segment_url: Option<String>,
    pub target_duration: f64,
    pub total_duration: f64,
    pub is_complete: bool,
}

pub fn parse_media(body: &str, base_url: &str) -> Result<MediaPlaylist, PlaylistError> {
    let mut target_duration = DEFAULT_TARGET_DURATION;
    let mut is_complete = false;
    let mut init_segment_url = None;
    let mut segments = Vec::new();

    let mut pending_duration = 0.0_f64;
    let mut pending_byte_range: Option<ByteRange> = None;
    let mut index = 0_u64;

    for raw_line in body.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            if let Ok(v) = rest.trim().parse::<f64>() {
                target_duration = v;
            }
            continue;
        }

        if line == "#EXT-X-ENDLIST" {
            is_complete = true;
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXT-X-MAP:") {
            let attrs = parse_attributes(rest);
            if let Some(uri) = attrs.get("URI") {
                init_segment_url = Some(resolve_url(base_url, uri));
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            pending_duration = parse_extinf_duration(rest);
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXT-X-BYTERANGE:") {
            pending_byte_range = parse_byte_range(rest);
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        segments.push(Segment {
            index,
            url: resolve_url(base_url, line),
            duration: pending_duration,
            byte_range: pending_byte_range.take(),
        });
        index += 1;
        pending_duration = 0.0;
    }

    let total_duration = segments.iter().map(|s| s.duration).sum();

    Ok(MediaPlaylist {
        segments,
        init_segment_url,
        target_duration,
        total_duration,
        is_complete,
    })
}

/// "Parsed as a floating-point number up to the first comma; missing or
/// invalid ⇒ 0" (§4.2).
fn parse_extinf_duration(rest: &str) -> f64 {
    rest.split(',')
        .next()
        .unwrap_or("")
        .trim()
        .parse()
        .unwrap_or(0.0)
}

/// `length[@offset]`; offset defaults to 0. An unparseable length drops the
/// byte range rather than failing the whole playlist.
fn parse_byte_range(rest: &str) -> Option<ByteRange> {
    let rest = rest.trim();
    let (length_str, offset_str) = match rest.split_once('@') {
        Some((l, o)) => (l, Some(o)),
        None => (rest, None),
    };
    let length = length_str.trim().parse::<u64>().ok()?;
    let offset = match offset_str {
        Some(o) => o.trim().parse::<u64>().ok()?,
        None => 0,
    };
    Some(ByteRange { length, offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://server/hls/abc/index.m3u8";

    #[test]
    fn parses_segments_with_most_recent_duration() {
        let body = "#EXTM3U\n\
#EXT-X-TARGETDURATION:4\n\
#EXTINF:4.004,\n\
seg0.ts\n\
#EXTINF:3.500,title\n\
seg1.ts\n\
#EXT-X-ENDLIST\n";
        let playlist = parse_media(body, BASE).unwrap();
        assert_eq!(playlist.segments.len(), 2);
        assert_eq!(playlist.segments[0].duration, 4.004);
        assert_eq!(playlist.segments[1].duration, 3.5);
        assert_eq!(playlist.segments[0].index, 0);
        assert_eq!(playlist.segments[1].index, 1);
        assert!(playlist.is_complete);
        assert_eq!(playlist.target_duration, 4.0);
        assert!((playlist.total_duration - 7.504).abs() < 1e-9);
    }

    #[test]
    fn missing_target_duration_falls_back_to_six() {
        let body = "#EXTM3U\n#EXTINF:2,\nseg0.ts\n";
        let playlist = parse_media(body, BASE).unwrap();
        assert_eq!(playlist.target_duration, 6.0);
    }

    #[test]
    fn missing_extinf_duration_is_zero() {
        let body = "#EXTM3U\nseg0.ts\n";
        let playlist = parse_media(body, BASE).unwrap();
        assert_eq!(playlist.segments[0].duration, 0.0);
    }

    #[test]
    fn init_segment_resolves_relative_to_playlist() {
        let body = "#EXTM3U\n#EXT-X-MAP:URI=\"init.mp4\"\n#EXTINF:2,\nseg0.ts\n";
        let playlist = parse_media(body, BASE).unwrap();
        assert_eq!(
            playlist.init_segment_url.as_deref(),
            Some("https://server/hls/abc/init.mp4")
        );
    }

    #[test]
    fn byte_range_with_and_without_offset() {
        let body = "#EXTM3U\n\
#EXTINF:2,\n#EXT-X-BYTERANGE:1000@500\nseg0.ts\n\
#EXTINF:2,\n#EXT-X-BYTERANGE:2000\nseg1.ts\n";
        let playlist = parse_media(body, BASE).unwrap();
        assert_eq!(
            playlist.segments[0].byte_range,
            Some(ByteRange { length: 1000, offset: 500 })
        );
        assert_eq!(
            playlist.segments[1].byte_range,
            Some(ByteRange { length: 2000, offset: 0 })
        );
    }

    #[test]
    fn invalid_byte_range_length_is_dropped_not_fatal() {
        let body = "#EXTM3U\n#EXTINF:2,\n#EXT-X-BYTERANGE:notanumber\nseg0.ts\n";
        let playlist = parse_media(body, BASE).unwrap();
        assert_eq!(playlist.segments[0].byte_range, None);
    }

    #[test]
    fn no_end_list_means_incomplete() {
        let body = "#EXTM3U\n#EXTINF:2,\nseg0.ts\n";
        let playlist = parse_media(body, BASE).unwrap();
        assert!(!playlist.is_complete);
    }

    #[test]
    fn zero_segments_is_valid_not_an_error() {
        let body = "#EXTM3U\n#EXT-X-ENDLIST\n";
        let playlist = parse_media(body, BASE).unwrap();
        assert!(playlist.segments.is_empty());
        assert_eq!(playlist.total_duration, 0.0);
    }
}
