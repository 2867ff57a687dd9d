//! 外部下载工具：统一的 [`MediaTool`] 接口、子进程执行与进度来源

pub mod process;
pub mod progress;
pub mod spotdl;
pub mod ytdlp;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ToolsConfig;
use crate::error::{AppError, Result};
use crate::requests::FetchRequest;
use crate::task::{ProgressTracker, TaskKind, TaskStatus};

pub use spotdl::SpotDl;
pub use ytdlp::YtDlp;

/// 下载器未完成时遗留的中间文件后缀
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

/// 一次下载所需的全部输入
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub task_id: String,
    pub request: FetchRequest,
    /// 任务独占的临时目录，工具只往这里写
    pub work_dir: PathBuf,
}

/// 外部下载工具接口
///
/// 实现方负责把进度写入 `tracker`，返回前不要调用 `complete`；
/// 产物收集和终态由调用方处理。
#[async_trait]
pub trait MediaTool: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, job: &FetchJob, tracker: &mut ProgressTracker) -> Result<()>;
}

/// 按任务类型选择工具
#[derive(Clone)]
pub struct ToolSet {
    pub video: Arc<dyn MediaTool>,
    pub music: Arc<dyn MediaTool>,
}

impl ToolSet {
    pub fn new(video: Arc<dyn MediaTool>, music: Arc<dyn MediaTool>) -> Self {
        Self { video, music }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(
            Arc::new(YtDlp::new(config.ytdlp_path.clone())),
            Arc::new(SpotDl::new(config.spotdl_path.clone())),
        )
    }

    pub fn for_kind(&self, kind: TaskKind) -> Arc<dyn MediaTool> {
        match kind {
            TaskKind::Video => self.video.clone(),
            TaskKind::Music => self.music.clone(),
        }
    }
}

/// 运行工具并返回临时目录中的产物（按文件名排序）
///
/// 工具正常退出但输出里报告过错误时同样视为失败。
pub async fn run_tool(tool: &dyn MediaTool, job: &FetchJob, tracker: &mut ProgressTracker) -> Result<Vec<PathBuf>> {
    tracing::info!("Task {} running {} for {}", job.task_id, tool.name(), job.request.url());
    tracker.start();
    tool.fetch(job, tracker).await?;

    if tracker.status() == TaskStatus::Error {
        let message = tracker.error_message().unwrap_or("download failed");
        return Err(AppError::ExternalTool(message.to_string()));
    }

    collect_outputs(&job.work_dir).await
}

/// 列出目录下的成品文件，跳过子目录和未完成的中间文件
pub async fn collect_outputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}
