use serde::{Deserialize, Serialize};

/// 任务状态
///
/// `Initializing → Downloading → Processing → {Complete | Error}`，
/// `Error` 可由任意非终态进入，终态不再迁移。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Initializing,
    Downloading,
    Processing,
    Complete,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Initializing => "initializing",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Processing => "processing",
            TaskStatus::Complete => "complete",
            TaskStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 下载来源（决定使用哪个外部工具）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// 视频/音频站点，yt-dlp
    Video,
    /// 音乐平台，spotdl
    Music,
}
