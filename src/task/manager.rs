use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::models::{TaskOutput, TaskRecord};
use super::registry::TaskRegistry;
use super::tracker::ProgressTracker;
use crate::cleanup::Sweeper;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::requests::FetchRequest;
use crate::tools::{run_tool, FetchJob, ToolSet};
use crate::utils::unique_destination;

/// `start_task` 的同步返回
#[derive(Debug, Clone, Serialize)]
pub struct StartedTask {
    pub task_id: String,
    pub status: &'static str,
    pub message: &'static str,
}

/// 任务管理器（下载编排）
///
/// 校验请求、分配任务ID、登记初始状态，然后在后台执行下载；
/// HTTP 调用在后台任务开始前就已返回。
#[derive(Clone)]
pub struct TaskManager {
    registry: TaskRegistry,
    tools: ToolSet,
    sweeper: Sweeper,
    output_root: PathBuf,
    permits: Arc<Semaphore>,
    status_grace: Duration,
    required_free_mb: u64,
}

impl TaskManager {
    pub fn new(config: &AppConfig, registry: TaskRegistry, tools: ToolSet) -> Self {
        let sweeper = Sweeper::new(registry.clone(), config.get_temp_dir(), config.get_downloads_dir());
        Self {
            registry,
            tools,
            sweeper,
            output_root: config.get_downloads_dir(),
            permits: Arc::new(Semaphore::new(config.tools.max_concurrent_downloads.max(1))),
            status_grace: config.status_grace(),
            required_free_mb: config.retention.required_free_mb,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn sweeper(&self) -> &Sweeper {
        &self.sweeper
    }

    /// 创建下载任务
    pub async fn start_task(&self, request: FetchRequest) -> Result<StartedTask> {
        request.validate()?;
        self.sweeper.ensure_disk_space(self.required_free_mb).await?;

        let task_id = Uuid::new_v4().to_string();
        let work_dir = self.sweeper.task_dir(&task_id);
        tokio::fs::create_dir_all(&work_dir).await?;

        let tracker = ProgressTracker::new(&task_id, self.registry.clone());
        tracing::info!("Task {} created ({:?}) for {}", task_id, request.kind(), request.url());

        let job = FetchJob { task_id: task_id.clone(), request, work_dir };
        let manager = self.clone();
        tokio::spawn(async move {
            manager.execute(job, tracker).await;
        });

        Ok(StartedTask {
            task_id,
            status: "started",
            message: "Download started",
        })
    }

    /// 查询任务状态
    pub fn get_status(&self, task_id: &str) -> Result<TaskRecord> {
        self.registry
            .get(task_id)
            .ok_or_else(|| AppError::NotFound("Task not found".to_string()))
    }

    /// 后台执行：排队、下载、转移产物、写入终态，最后安排清理
    async fn execute(self, job: FetchJob, mut tracker: ProgressTracker) {
        let tool = self.tools.for_kind(job.request.kind());

        let result: Result<TaskOutput> = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| AppError::Internal("Download queue closed".to_string()))?;
            let files = run_tool(tool.as_ref(), &job, &mut tracker).await?;
            self.publish_outputs(files).await
        }
        .await;

        match result {
            Ok(output) => {
                tracing::info!("Task {} complete: {}", job.task_id, output.names().join(", "));
                tracker.complete(&output);
            }
            Err(e) => {
                tracing::error!("Task {} failed: {}", job.task_id, e);
                tracker.fail(&e.to_string());
            }
        }

        self.sweeper.remove_task_dir(&job.task_id).await;
        self.schedule_cleanup(job.task_id);
    }

    /// 把产物移入输出目录，重名时自动编号
    ///
    /// 任一文件移动失败时，本次已移入的文件全部删除，任务不留下半套产物。
    async fn publish_outputs(&self, files: Vec<PathBuf>) -> Result<TaskOutput> {
        let mut published: Vec<PathBuf> = Vec::with_capacity(files.len());
        for file in files {
            let Some(name) = file.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let destination = unique_destination(&self.output_root, &name);
            if let Err(e) = move_file(&file, &destination).await {
                published.push(destination);
                self.discard_outputs(&published).await;
                return Err(e);
            }
            published.push(destination);
        }

        let names = published
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        TaskOutput::from_names(names).ok_or_else(|| AppError::ExternalTool("No output files produced".to_string()))
    }

    async fn discard_outputs(&self, paths: &[PathBuf]) {
        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::warn!("Rolled back partially published output {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to roll back output {}: {}", path.display(), e),
            }
        }
    }

    /// 宽限期后移除注册表记录，期间状态查询保持可用
    fn schedule_cleanup(&self, task_id: String) {
        let sweeper = self.sweeper.clone();
        let grace = self.status_grace;
        tokio::spawn(async move {
            if !grace.is_zero() {
                tokio::time::sleep(grace).await;
            }
            sweeper.cleanup_task(&task_id).await;
        });
    }
}

async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_err() {
        // 跨文件系统时 rename 失败，退回复制
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}
