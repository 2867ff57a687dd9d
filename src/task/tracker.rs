use std::time::Instant;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::models::{TaskOutput, TaskRecord};
use super::registry::TaskRegistry;
use super::types::TaskStatus;

static DOWNLOADED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Downloaded (\d+(?:\.\d+)?)%").expect("valid download pattern"));
static PROCESSING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Processing (\d+(?:\.\d+)?)%").expect("valid processing pattern"));
static ERROR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Error: (.*)").expect("valid error pattern"));

/// 文本输出中的完成标记
pub const COMPLETION_MARKER: &str = "Download completed";

/// 字节进度回调参数（来自下载器的结构化进度）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ByteProgress {
    pub downloaded: u64,
    pub total: u64,
    pub speed: Option<f64>,
    pub eta: Option<u64>,
    pub filename: Option<String>,
}

/// 文本行中识别出的进度信号
#[derive(Debug, Clone, PartialEq)]
pub enum LineSignal {
    Downloading(f64),
    Processing(f64),
    Failed(String),
    Completed,
}

impl LineSignal {
    /// 按顺序匹配：下载、处理、错误、完成标记；都不匹配返回 None
    pub fn parse(line: &str) -> Option<Self> {
        if let Some(caps) = DOWNLOADED_RE.captures(line) {
            return caps[1].parse().ok().map(LineSignal::Downloading);
        }
        if let Some(caps) = PROCESSING_RE.captures(line) {
            return caps[1].parse().ok().map(LineSignal::Processing);
        }
        if let Some(caps) = ERROR_RE.captures(line) {
            return Some(LineSignal::Failed(caps[1].trim().to_string()));
        }
        if line.contains(COMPLETION_MARKER) {
            return Some(LineSignal::Completed);
        }
        None
    }
}

/// 进度跟踪器（每个任务一个）
///
/// 把不同工具的进度信号统一成 [`TaskRecord`]，每次更新都整体写入注册表。
/// 任务执行期间它是该任务记录的唯一写入者。
pub struct ProgressTracker {
    task_id: String,
    registry: TaskRegistry,
    started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    status: TaskStatus,
    progress: f64,
    error: Option<String>,
}

impl ProgressTracker {
    /// 创建跟踪器并登记 `initializing` 记录
    pub fn new(task_id: &str, registry: TaskRegistry) -> Self {
        registry.put(TaskRecord::initializing(task_id));
        Self {
            task_id: task_id.to_string(),
            registry,
            started_at: None,
            started: None,
            status: TaskStatus::Initializing,
            progress: 0.0,
            error: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// 进入终态前记录的错误信息
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.started = Some(Instant::now());
        let record = self.record(TaskStatus::Downloading, 0.0);
        self.publish(record);
    }

    pub fn on_byte_progress(&mut self, update: &ByteProgress) {
        let progress = if update.total > 0 {
            round2(update.downloaded as f64 / update.total as f64 * 100.0)
        } else {
            0.0
        };
        let mut record = self.record(TaskStatus::Downloading, progress);
        record.speed = update.speed;
        record.eta = update.eta;
        record.filename = update.filename.clone();
        record.total_size = Some(update.total);
        record.downloaded_size = Some(update.downloaded);
        self.publish(record);
    }

    /// 原始传输结束，进入后处理（转码等）
    pub fn on_phase_finished(&mut self, filename: Option<&str>) {
        let mut record = self.record(TaskStatus::Processing, 100.0);
        record.filename = filename.map(str::to_string);
        self.publish(record);
    }

    pub fn complete(&mut self, output: &TaskOutput) {
        let mut record = self.record(TaskStatus::Complete, 100.0);
        match output {
            TaskOutput::Single(name) => record.filename = Some(name.clone()),
            TaskOutput::Batch(names) => record.files = Some(names.clone()),
        }
        record.time_taken = self.started.map(|t| round2(t.elapsed().as_secs_f64()));
        self.publish(record);
    }

    pub fn fail(&mut self, message: &str) {
        let mut record = self.record(TaskStatus::Error, self.progress);
        record.error = Some(message.to_string());
        record.time_taken = self.started.map(|t| round2(t.elapsed().as_secs_f64()));
        if self.publish(record) {
            self.error = Some(message.to_string());
        }
    }

    /// 解析工具的文本输出行，返回是否识别出进度信号
    pub fn parse_external_line(&mut self, line: &str) -> bool {
        let Some(signal) = LineSignal::parse(line) else {
            return false;
        };
        match signal {
            LineSignal::Downloading(progress) => {
                let record = self.record(TaskStatus::Downloading, progress);
                self.publish(record);
            }
            LineSignal::Processing(progress) => {
                let record = self.record(TaskStatus::Processing, progress);
                self.publish(record);
            }
            LineSignal::Failed(message) => self.fail(&message),
            LineSignal::Completed => {
                let record = self.record(TaskStatus::Processing, 100.0);
                self.publish(record);
            }
        }
        true
    }

    /// 新记录骨架：进度限制在 [0, 100]，同一阶段内不回退
    fn record(&self, status: TaskStatus, progress: f64) -> TaskRecord {
        let mut progress = progress.clamp(0.0, 100.0);
        if status == self.status {
            progress = progress.max(self.progress);
        }
        let mut record = TaskRecord::new(&self.task_id, status, progress);
        record.started_at = self.started_at;
        record
    }

    fn publish(&mut self, record: TaskRecord) -> bool {
        if self.status.is_terminal() {
            tracing::debug!("Task {} already {}, dropping {} update", self.task_id, self.status, record.status);
            return false;
        }
        self.status = record.status;
        self.progress = record.progress;
        self.registry.put(record)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
