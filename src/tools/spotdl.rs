use std::path::Path;

use async_trait::async_trait;

use super::process::run_streaming;
use super::progress::{ProgressSource, TextProgress};
use super::{FetchJob, MediaTool};
use crate::error::{AppError, Result};
use crate::requests::{FetchRequest, MusicRequest};
use crate::task::ProgressTracker;

/// spotdl：音乐平台下载，进度从文本输出解析
pub struct SpotDl {
    program: String,
}

impl SpotDl {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    pub fn build_args(request: &MusicRequest, output_dir: &Path) -> Vec<String> {
        let template = output_dir.join("{artist} - {title}.{output-ext}");
        let mut args: Vec<String> = vec![
            "download".into(),
            request.url.clone().unwrap_or_default(),
            "--output".into(),
            template.to_string_lossy().into_owned(),
            "--format".into(),
            request.output_format.clone(),
            "--bitrate".into(),
            request.quality.clone(),
        ];

        if !request.download_artwork {
            args.push("--skip-album-art".into());
        }
        if request.download_lyrics {
            args.push("--lyrics".into());
        }
        if let Some(items) = &request.playlist_items {
            args.extend(["--playlist-items".into(), items.clone()]);
        }
        args
    }
}

#[async_trait]
impl MediaTool for SpotDl {
    fn name(&self) -> &'static str {
        "spotdl"
    }

    async fn fetch(&self, job: &FetchJob, tracker: &mut ProgressTracker) -> Result<()> {
        let FetchRequest::Music(request) = &job.request else {
            return Err(AppError::Internal("spotdl only handles music requests".to_string()));
        };
        let args = Self::build_args(request, &job.work_dir);
        let mut source = TextProgress;
        run_streaming(&self.program, &args, None, |line| source.consume(line, tracker)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> MusicRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_default_args() {
        let dir = Path::new("temp/t2");
        let args = SpotDl::build_args(&request(r#"{"url": "https://open.spotify.com/track/abc"}"#), dir);
        let template = dir.join("{artist} - {title}.{output-ext}").to_string_lossy().into_owned();

        assert_eq!(
            args,
            vec![
                "download".to_string(),
                "https://open.spotify.com/track/abc".to_string(),
                "--output".to_string(),
                template,
                "--format".to_string(),
                "mp3".to_string(),
                "--bitrate".to_string(),
                "320k".to_string(),
            ]
        );
    }

    #[test]
    fn test_optional_flags() {
        let args = SpotDl::build_args(
            &request(
                r#"{"url": "https://open.spotify.com/playlist/p", "download_artwork": false, "download_lyrics": true, "playlist_items": "1-3", "output_format": "flac"}"#,
            ),
            Path::new("temp/t2"),
        );
        assert!(args.contains(&"--skip-album-art".to_string()));
        assert!(args.contains(&"--lyrics".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--playlist-items" && w[1] == "1-3"));
        assert!(args.windows(2).any(|w| w[0] == "--format" && w[1] == "flac"));
    }
}
