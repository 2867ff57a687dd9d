use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::TaskStatus;

/// 任务状态记录（轮询接口与WebSocket推送的内容）
///
/// 每次更新都整体替换，字段只在对应阶段出现。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// 耗时（秒，保留两位小数）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_taken: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// 空白记录，其余字段均为空
    pub fn new(task_id: &str, status: TaskStatus, progress: f64) -> Self {
        Self {
            task_id: task_id.to_string(),
            status,
            progress,
            speed: None,
            eta: None,
            filename: None,
            files: None,
            total_size: None,
            downloaded_size: None,
            error: None,
            started_at: None,
            time_taken: None,
            updated_at: Utc::now(),
        }
    }

    pub fn initializing(task_id: &str) -> Self {
        Self::new(task_id, TaskStatus::Initializing, 0.0)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 任务产物：单个文件或批量（播放列表）文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    Single(String),
    Batch(Vec<String>),
}

impl TaskOutput {
    /// 一个文件为 Single，多个为 Batch，没有文件返回 None
    pub fn from_names(mut names: Vec<String>) -> Option<Self> {
        match names.len() {
            0 => None,
            1 => names.pop().map(TaskOutput::Single),
            _ => Some(TaskOutput::Batch(names)),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            TaskOutput::Single(name) => vec![name.as_str()],
            TaskOutput::Batch(names) => names.iter().map(String::as_str).collect(),
        }
    }
}
