use std::path::Path;

use async_trait::async_trait;

use super::process::run_streaming;
use super::progress::{HookProgress, ProgressSource, HOOK_TEMPLATE};
use super::{FetchJob, MediaTool};
use crate::error::{AppError, Result};
use crate::requests::{FetchRequest, VideoRequest};
use crate::task::ProgressTracker;

/// yt-dlp：视频/音频站点下载，进度走结构化钩子
pub struct YtDlp {
    program: String,
}

impl YtDlp {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// 根据请求生成完整参数列表，输出限定在任务临时目录
    pub fn build_args(request: &VideoRequest, output_dir: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--newline".into(),
            "--no-playlist".into(),
            "--no-warnings".into(),
            "--progress-template".into(),
            HOOK_TEMPLATE.into(),
            "-f".into(),
            format_selector(request),
            "-o".into(),
            output_dir.join("%(title)s.%(ext)s").to_string_lossy().into_owned(),
        ];

        if request.is_audio() {
            let codec = audio_codec(request);
            args.extend(["-x".into(), "--audio-format".into(), codec.to_string()]);
            if codec == "mp3" {
                args.extend(["--audio-quality".into(), "320K".into()]);
            }
        }

        if request.start_time.is_some() || request.end_time.is_some() {
            let start = request.start_time.as_deref().unwrap_or("0");
            let end = request.end_time.as_deref().unwrap_or("inf");
            args.extend(["--download-sections".into(), format!("*{}-{}", start, end)]);
        }

        if request.download_subtitles {
            args.extend(["--write-subs".into(), "--convert-subs".into(), "srt".into()]);
        }

        if request.download_thumbnail {
            args.push("--write-thumbnail".into());
        }

        args.push("--".into());
        args.push(request.url.clone().unwrap_or_default());
        args
    }
}

fn format_selector(request: &VideoRequest) -> String {
    if request.is_audio() {
        return match request.format.as_str() {
            "m4a" => "bestaudio[ext=m4a]/bestaudio/best".to_string(),
            _ => "bestaudio/best".to_string(),
        };
    }
    match request.max_height() {
        Some(h) => format!(
            "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/best[height<={h}][ext=mp4]/best"
        ),
        None => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
    }
}

/// 仅音频时的目标编码，mp4 容器对应 m4a
fn audio_codec(request: &VideoRequest) -> &str {
    match request.format.as_str() {
        "mp4" => "m4a",
        other => other,
    }
}

#[async_trait]
impl MediaTool for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch(&self, job: &FetchJob, tracker: &mut ProgressTracker) -> Result<()> {
        let FetchRequest::Video(request) = &job.request else {
            return Err(AppError::Internal("yt-dlp only handles video requests".to_string()));
        };
        let args = Self::build_args(request, &job.work_dir);
        let mut source = HookProgress;
        run_streaming(&self.program, &args, None, |line| source.consume(line, tracker)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(json: &str) -> VideoRequest {
        serde_json::from_str(json).unwrap()
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_mp4_args() {
        let dir = PathBuf::from("temp/t1");
        let args = YtDlp::build_args(&request(r#"{"url": "https://example.com/v1"}"#), &dir);

        assert_eq!(value_after(&args, "-f"), Some("bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best"));
        let template = dir.join("%(title)s.%(ext)s").to_string_lossy().into_owned();
        assert_eq!(value_after(&args, "-o"), Some(template.as_str()));
        assert_eq!(value_after(&args, "--progress-template"), Some(HOOK_TEMPLATE));
        assert!(!args.contains(&"-x".to_string()));
        assert_eq!(&args[args.len() - 2..], ["--", "https://example.com/v1"]);
    }

    #[test]
    fn test_height_capped_selector() {
        let args = YtDlp::build_args(
            &request(r#"{"url": "https://example.com/v1", "quality": "720p"}"#),
            Path::new("temp/t1"),
        );
        assert!(value_after(&args, "-f").unwrap().starts_with("bestvideo[height<=720][ext=mp4]"));
    }

    #[test]
    fn test_mp3_extracts_audio() {
        let args = YtDlp::build_args(
            &request(r#"{"url": "https://example.com/v1", "format": "mp3"}"#),
            Path::new("temp/t1"),
        );
        assert_eq!(value_after(&args, "-f"), Some("bestaudio/best"));
        assert_eq!(value_after(&args, "--audio-format"), Some("mp3"));
        assert_eq!(value_after(&args, "--audio-quality"), Some("320K"));
    }

    #[test]
    fn test_audio_only_mp4_becomes_m4a() {
        let args = YtDlp::build_args(
            &request(r#"{"url": "https://example.com/v1", "audio_only": true}"#),
            Path::new("temp/t1"),
        );
        assert_eq!(value_after(&args, "--audio-format"), Some("m4a"));
        assert!(value_after(&args, "--audio-quality").is_none());
    }

    #[test]
    fn test_time_range_and_extras() {
        let args = YtDlp::build_args(
            &request(
                r#"{"url": "https://example.com/v1", "start_time": "1:00", "download_subtitles": true, "download_thumbnail": true}"#,
            ),
            Path::new("temp/t1"),
        );
        assert_eq!(value_after(&args, "--download-sections"), Some("*1:00-inf"));
        assert!(args.contains(&"--write-subs".to_string()));
        assert!(args.contains(&"--write-thumbnail".to_string()));
    }
}
