//! Persisted settings (`settings.json`, spec §6.5) and preset validation (§4.1).

use crate::error::SchedulerError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Video codec choices accepted by a download preset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
}

/// Audio codec choices. The spec fixes this to AAC; the type still exists so
/// preset JSON round-trips and so validation has something to check against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
}

/// A transcode quality preset (spec §3, Job descriptor).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preset {
    pub name: String,
    pub max_width: u32,
    pub max_video_bitrate: u64,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub audio_bitrate: u32,
    pub audio_channels: u8,
}

/// Validate a preset against the bounds in spec §4.1.
///
/// `InvalidPreset` unless: maxWidth in [320, 7680]; maxBitrate in
/// [100_000, 100_000_000]; videoCodec in {h264, hevc}; audioCodec = aac;
/// audioBitrate in [32_000, 640_000]; audioChannels in {2, 6}.
pub fn validate_preset(preset: &Preset) -> Result<(), SchedulerError> {
    let mut problems = Vec::new();

    if !(320..=7680).contains(&preset.max_width) {
        problems.push(format!(
            "maxWidth {} out of range [320, 7680]",
            preset.max_width
        ));
    }
    if !(100_000..=100_000_000).contains(&preset.max_video_bitrate) {
        problems.push(format!(
            "maxVideoBitrate {} out of range [100000, 100000000]",
            preset.max_video_bitrate
        ));
    }
    if !(32_000..=640_000).contains(&preset.audio_bitrate) {
        problems.push(format!(
            "audioBitrate {} out of range [32000, 640000]",
            preset.audio_bitrate
        ));
    }
    if preset.audio_channels != 2 && preset.audio_channels != 6 {
        problems.push(format!(
            "audioChannels {} must be 2 or 6",
            preset.audio_channels
        ));
    }
    // video_codec and audio_codec are exhaustive enums restricted to the
    // allowed values at the type level; nothing further to check there.

    if problems.is_empty() {
        Ok(())
    } else {
        Err(SchedulerError::InvalidPreset(problems.join("; ")))
    }
}

/// A previously configured upstream media server (opaque beyond what the core
/// needs to address it; auth/browsing belong to the adapter, spec §6.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedServer {
    pub id: String,
    pub name: String,
    pub base_url: String,
}

fn default_max_concurrent() -> u32 {
    5
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("downloads")
}

/// `settings.json` (spec §6.5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: u32,
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
    #[serde(default)]
    pub presets: Vec<Preset>,
    #[serde(default)]
    pub saved_servers: Vec<SavedServer>,
    #[serde(default)]
    pub default_retention_days: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            downloads_dir: default_downloads_dir(),
            presets: Vec::new(),
            saved_servers: Vec::new(),
            default_retention_days: None,
        }
    }
}

impl Settings {
    /// Clamp `maxConcurrentDownloads` to the documented bound [1, 20].
    pub fn clamped_max_concurrent(&self) -> u32 {
        self.max_concurrent_downloads.clamp(1, 20)
    }

    pub async fn load(path: &Path) -> std::io::Result<Self> {
        Ok(crate::atomic_file::read_json(path)
            .await?
            .unwrap_or_default())
    }

    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        crate::atomic_file::write_json_atomic(path, self).await
    }
}

/// Sanitize a display title into a file name (spec §4.1):
/// strip every character outside [A-Za-z0-9 space dash underscore dot], trim,
/// append `.mp4`.
pub fn sanitize_file_name(title: &str) -> String {
    let filtered: String = title
        .chars()
        .filter(|c| {
            c.is_ascii_alphanumeric() || *c == ' ' || *c == '-' || *c == '_' || *c == '.'
        })
        .collect();
    format!("{}.mp4", filtered.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_preset() -> Preset {
        Preset {
            name: "1080p".into(),
            max_width: 1920,
            max_video_bitrate: 8_000_000,
            video_codec: VideoCodec::H264,
            audio_codec: AudioCodec::Aac,
            audio_bitrate: 128_000,
            audio_channels: 2,
        }
    }

    #[test]
    fn valid_preset_passes() {
        assert!(validate_preset(&valid_preset()).is_ok());
    }

    #[test]
    fn rejects_every_out_of_range_field() {
        let mut p = valid_preset();
        p.max_width = 100;
        assert!(validate_preset(&p).is_err());

        let mut p = valid_preset();
        p.max_width = 10_000;
        assert!(validate_preset(&p).is_err());

        let mut p = valid_preset();
        p.max_video_bitrate = 50_000;
        assert!(validate_preset(&p).is_err());

        let mut p = valid_preset();
        p.max_video_bitrate = 200_000_000;
        assert!(validate_preset(&p).is_err());

        let mut p = valid_preset();
        p.audio_bitrate = 1_000;
        assert!(validate_preset(&p).is_err());

        let mut p = valid_preset();
        p.audio_bitrate = 1_000_000;
        assert!(validate_preset(&p).is_err());

        let mut p = valid_preset();
        p.audio_channels = 4;
        assert!(validate_preset(&p).is_err());
    }

    #[test]
    fn accepts_boundary_values() {
        let mut p = valid_preset();
        p.max_width = 320;
        p.max_video_bitrate = 100_000;
        p.audio_bitrate = 32_000;
        p.audio_channels = 6;
        assert!(validate_preset(&p).is_ok());

        p.max_width = 7680;
        p.max_video_bitrate = 100_000_000;
        p.audio_bitrate = 640_000;
        assert!(validate_preset(&p).is_ok());
    }

    #[test]
    fn sanitizes_file_names() {
        assert_eq!(sanitize_file_name("My Movie (2024)!!"), "My Movie 2024.mp4");
        assert_eq!(sanitize_file_name("  spaced  "), "spaced.mp4");
        assert_eq!(sanitize_file_name("a/b\\c:d"), "abcd.mp4");
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            max_concurrent_downloads: 3,
            ..Settings::default()
        };
        settings.save(&path).await.unwrap();
        let loaded = Settings::load(&path).await.unwrap();
        assert_eq!(settings, loaded);
    }

    #[tokio::test]
    async fn missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let loaded = Settings::load(&path).await.unwrap();
        assert_eq!(loaded, Settings::default());
    }
}
