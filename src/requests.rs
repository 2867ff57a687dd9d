//! Download request bodies and validation / 下载请求与校验

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::task::TaskKind;

pub const VIDEO_FORMATS: &[&str] = &["mp4", "mp3", "wav", "m4a"];
pub const AUDIO_FORMATS: &[&str] = &["mp3", "wav", "m4a"];
pub const MUSIC_FORMATS: &[&str] = &["mp3", "m4a", "flac", "opus", "ogg", "wav"];

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?::\d{1,2}){0,2}(?:\.\d+)?$").expect("valid time pattern"));
static HEIGHT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{3,4})p$").expect("valid height pattern"));
static BITRATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2,3}k$").expect("valid bitrate pattern"));
static ITEMS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:-\d+)?(?:,\d+(?:-\d+)?)*$").expect("valid playlist items pattern"));

/// 视频站点下载请求（yt-dlp）
#[derive(Debug, Clone, Deserialize)]
pub struct VideoRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_video_format")]
    pub format: String,
    /// best / highest / 720p …
    #[serde(default = "default_video_quality")]
    pub quality: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub audio_only: bool,
    #[serde(default)]
    pub download_subtitles: bool,
    #[serde(default)]
    pub download_thumbnail: bool,
}

/// 音乐平台下载请求（spotdl）
#[derive(Debug, Clone, Deserialize)]
pub struct MusicRequest {
    #[serde(default)]
    pub url: Option<String>,
    /// 码率，例如 320k
    #[serde(default = "default_music_quality")]
    pub quality: String,
    #[serde(default = "default_true")]
    pub download_artwork: bool,
    #[serde(default)]
    pub download_lyrics: bool,
    #[serde(default = "default_music_format")]
    pub output_format: String,
    /// "1,2,3" 或 "1-10"
    #[serde(default)]
    pub playlist_items: Option<String>,
}

fn default_video_format() -> String {
    "mp4".to_string()
}

fn default_video_quality() -> String {
    "best".to_string()
}

fn default_music_quality() -> String {
    "320k".to_string()
}

fn default_music_format() -> String {
    "mp3".to_string()
}

fn default_true() -> bool {
    true
}

/// 已区分来源的下载请求
#[derive(Debug, Clone)]
pub enum FetchRequest {
    Video(VideoRequest),
    Music(MusicRequest),
}

impl FetchRequest {
    pub fn kind(&self) -> TaskKind {
        match self {
            FetchRequest::Video(_) => TaskKind::Video,
            FetchRequest::Music(_) => TaskKind::Music,
        }
    }

    pub fn url(&self) -> &str {
        let url = match self {
            FetchRequest::Video(r) => &r.url,
            FetchRequest::Music(r) => &r.url,
        };
        url.as_deref().unwrap_or("")
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            FetchRequest::Video(r) => r.validate(),
            FetchRequest::Music(r) => r.validate(),
        }
    }
}

impl VideoRequest {
    pub fn validate(&self) -> Result<()> {
        parse_http_url(self.url.as_deref())?;

        if !VIDEO_FORMATS.contains(&self.format.as_str()) {
            return Err(AppError::Validation(format!(
                "Unsupported format '{}', expected one of: {}",
                self.format,
                VIDEO_FORMATS.join(", ")
            )));
        }

        if self.quality != "best" && self.quality != "highest" && !HEIGHT_RE.is_match(&self.quality) {
            return Err(AppError::Validation(format!("Unsupported quality '{}'", self.quality)));
        }

        for time in [&self.start_time, &self.end_time].into_iter().flatten() {
            if !TIME_RE.is_match(time) {
                return Err(AppError::Validation(format!("Invalid time '{}', expected [HH:]MM:SS or seconds", time)));
            }
        }
        Ok(())
    }

    pub fn is_audio(&self) -> bool {
        self.audio_only || AUDIO_FORMATS.contains(&self.format.as_str())
    }

    /// 视频高度上限，`best` 不限制
    pub fn max_height(&self) -> Option<u32> {
        if self.quality == "highest" {
            return Some(1080);
        }
        HEIGHT_RE
            .captures(&self.quality)
            .and_then(|caps| caps[1].parse().ok())
    }
}

impl MusicRequest {
    pub fn validate(&self) -> Result<()> {
        let url = parse_http_url(self.url.as_deref())?;

        let host_ok = url
            .host_str()
            .map(|h| h == "spotify.com" || h.ends_with(".spotify.com"))
            .unwrap_or(false);
        let path_ok = ["/track/", "/album/", "/playlist/"]
            .iter()
            .any(|prefix| url.path().starts_with(prefix));
        if !host_ok || !path_ok {
            return Err(AppError::Validation("Invalid Spotify URL".to_string()));
        }

        if !MUSIC_FORMATS.contains(&self.output_format.as_str()) {
            return Err(AppError::Validation(format!(
                "Unsupported format '{}', expected one of: {}",
                self.output_format,
                MUSIC_FORMATS.join(", ")
            )));
        }

        if !BITRATE_RE.is_match(&self.quality) {
            return Err(AppError::Validation(format!("Unsupported bitrate '{}'", self.quality)));
        }

        if let Some(items) = &self.playlist_items {
            if !ITEMS_RE.is_match(items) {
                return Err(AppError::Validation(format!("Invalid playlist items '{}'", items)));
            }
        }
        Ok(())
    }
}

fn parse_http_url(raw: Option<&str>) -> Result<Url> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("URL is required".to_string()))?;

    let url = Url::parse(raw).map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::Validation(format!("Invalid URL: {}", raw)));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(json: &str) -> VideoRequest {
        serde_json::from_str(json).unwrap()
    }

    fn music(json: &str) -> MusicRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_video_defaults() {
        let req = video(r#"{"url": "https://example.com/v1"}"#);
        assert_eq!(req.format, "mp4");
        assert_eq!(req.quality, "best");
        assert!(!req.is_audio());
        assert_eq!(req.max_height(), None);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_video_missing_or_bad_url() {
        assert!(matches!(video(r#"{}"#).validate(), Err(AppError::Validation(_))));
        assert!(matches!(video(r#"{"url": "   "}"#).validate(), Err(AppError::Validation(_))));
        assert!(video(r#"{"url": "not a url"}"#).validate().is_err());
        assert!(video(r#"{"url": "ftp://example.com/v1"}"#).validate().is_err());
        assert!(video(r#"{"url": "file:///etc/passwd"}"#).validate().is_err());
    }

    #[test]
    fn test_video_format_and_quality() {
        assert!(video(r#"{"url": "https://example.com/v1", "format": "avi"}"#).validate().is_err());
        assert!(video(r#"{"url": "https://example.com/v1", "quality": "ultra"}"#).validate().is_err());

        let req = video(r#"{"url": "https://example.com/v1", "format": "mp3"}"#);
        assert!(req.validate().is_ok());
        assert!(req.is_audio());

        let req = video(r#"{"url": "https://example.com/v1", "quality": "720p"}"#);
        assert_eq!(req.max_height(), Some(720));
        let req = video(r#"{"url": "https://example.com/v1", "quality": "highest"}"#);
        assert_eq!(req.max_height(), Some(1080));
    }

    #[test]
    fn test_video_time_range() {
        assert!(video(r#"{"url": "https://example.com/v1", "start_time": "1:30", "end_time": "02:10.5"}"#)
            .validate()
            .is_ok());
        assert!(video(r#"{"url": "https://example.com/v1", "start_time": "90"}"#).validate().is_ok());
        assert!(video(r#"{"url": "https://example.com/v1", "start_time": "1m30s"}"#).validate().is_err());
    }

    #[test]
    fn test_music_validation() {
        let req = music(r#"{"url": "https://open.spotify.com/track/abc123"}"#);
        assert!(req.validate().is_ok());
        assert!(req.download_artwork);
        assert_eq!(req.quality, "320k");
        assert_eq!(req.output_format, "mp3");

        assert!(music(r#"{"url": "https://open.spotify.com/artist/abc"}"#).validate().is_err());
        assert!(music(r#"{"url": "https://example.com/track/abc"}"#).validate().is_err());
        assert!(music(r#"{"url": "https://notspotify.com/track/abc"}"#).validate().is_err());
        assert!(music(r#"{"url": "https://open.spotify.com/track/abc", "output_format": "exe"}"#)
            .validate()
            .is_err());
        assert!(music(r#"{"url": "https://open.spotify.com/track/abc", "quality": "loud"}"#)
            .validate()
            .is_err());
    }

    #[test]
    fn test_playlist_items() {
        let ok = music(r#"{"url": "https://open.spotify.com/playlist/p1", "playlist_items": "1,2,5-9"}"#);
        assert!(ok.validate().is_ok());
        let bad = music(r#"{"url": "https://open.spotify.com/playlist/p1", "playlist_items": "1;rm -rf"}"#);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_fetch_request_kind() {
        let req = FetchRequest::Music(music(r#"{"url": "https://open.spotify.com/album/x"}"#));
        assert_eq!(req.kind(), TaskKind::Music);
        assert_eq!(req.url(), "https://open.spotify.com/album/x");
    }
}
