//! 进度来源适配：结构化回调（yt-dlp 进度钩子）与文本行解析（spotdl）
//!
//! 两种来源都只通过 [`ProgressTracker`] 的公开方法更新状态，
//! 新增工具只需要再实现一个 [`ProgressSource`]。

use std::path::Path;

use crate::task::{ByteProgress, ProgressTracker};

/// yt-dlp 进度钩子输出行前缀
pub const HOOK_PREFIX: &str = "[hook] ";

/// 传给 `--progress-template` 的模板，每次钩子调用输出一行
pub const HOOK_TEMPLATE: &str = "download:[hook] %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(progress.filename)s";

pub trait ProgressSource: Send {
    fn consume(&mut self, line: &str, tracker: &mut ProgressTracker);
}

/// 按行匹配文本进度（`Downloaded N%` 等）
#[derive(Debug, Default)]
pub struct TextProgress;

impl ProgressSource for TextProgress {
    fn consume(&mut self, line: &str, tracker: &mut ProgressTracker) {
        tracker.parse_external_line(line);
    }
}

/// yt-dlp 钩子事件
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    Downloading(ByteProgress),
    Finished(Option<String>),
}

impl HookEvent {
    /// 解析 `[hook] status|downloaded|total|estimate|speed|eta|filename`，缺失值为 `NA`
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix(HOOK_PREFIX)?;
        let fields: Vec<&str> = rest.splitn(7, '|').collect();
        if fields.len() != 7 {
            return None;
        }
        let filename = display_name(fields[6]);
        match fields[0] {
            "downloading" => {
                let total = parse_bytes(fields[2]).or_else(|| parse_bytes(fields[3])).unwrap_or(0);
                Some(HookEvent::Downloading(ByteProgress {
                    downloaded: parse_bytes(fields[1]).unwrap_or(0),
                    total,
                    speed: parse_number(fields[4]),
                    eta: parse_number(fields[5]).map(|eta| eta.max(0.0) as u64),
                    filename,
                }))
            }
            "finished" => Some(HookEvent::Finished(filename)),
            _ => None,
        }
    }
}

/// yt-dlp 结构化进度：钩子行走字节进度，后处理输出行标记处理阶段
#[derive(Debug, Default)]
pub struct HookProgress;

impl ProgressSource for HookProgress {
    fn consume(&mut self, line: &str, tracker: &mut ProgressTracker) {
        if let Some(event) = HookEvent::parse(line) {
            match event {
                HookEvent::Downloading(update) => tracker.on_byte_progress(&update),
                HookEvent::Finished(filename) => tracker.on_phase_finished(filename.as_deref()),
            }
        } else if let Some(target) = postprocess_target(line) {
            tracker.on_phase_finished(display_name(target).as_deref());
        }
    }
}

/// 识别 `[ExtractAudio] Destination: x`、`[Merger] Merging formats into "x"`
fn postprocess_target(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("[ExtractAudio] Destination:") {
        return Some(rest.trim());
    }
    if let Some(rest) = line.strip_prefix("[Merger] Merging formats into") {
        return Some(rest.trim().trim_matches('"'));
    }
    None
}

fn parse_number(field: &str) -> Option<f64> {
    let value: f64 = field.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

fn parse_bytes(field: &str) -> Option<u64> {
    parse_number(field).map(|v| v.max(0.0) as u64)
}

/// 只对外暴露文件名，不暴露服务器上的临时路径
fn display_name(field: &str) -> Option<String> {
    let field = field.trim();
    if field.is_empty() || field == "NA" {
        return None;
    }
    Path::new(field)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}
