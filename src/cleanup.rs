//! 临时文件与过期任务清理

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::task::TaskRegistry;

/// 磁盘不足时的激进清理窗口
const AGGRESSIVE_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// 一次清理的结果统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub temp_removed: usize,
    pub outputs_removed: usize,
    pub records_removed: usize,
}

/// 清理器：负责任务临时目录、输出目录和注册表的回收
///
/// 所有清理失败只记录日志，不向调用方传播。
#[derive(Clone)]
pub struct Sweeper {
    registry: TaskRegistry,
    temp_root: PathBuf,
    output_root: PathBuf,
}

impl Sweeper {
    pub fn new(registry: TaskRegistry, temp_root: PathBuf, output_root: PathBuf) -> Self {
        Self { registry, temp_root, output_root }
    }

    /// 任务专属的临时目录
    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.temp_root.join(task_id)
    }

    /// 只删除任务临时目录，保留注册表记录（终态后仍可查询）
    pub async fn remove_task_dir(&self, task_id: &str) {
        let dir = self.task_dir(task_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!("Removed temp dir {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove temp dir {}: {}", dir.display(), e),
        }
    }

    /// 任务级清理：删除临时目录并移除注册表记录
    pub async fn cleanup_task(&self, task_id: &str) {
        self.remove_task_dir(task_id).await;
        if self.registry.remove(task_id).is_some() {
            tracing::info!("Cleaned up task {}", task_id);
        }
    }

    /// 按年龄清理：临时目录超过 `max_age`、输出目录超过 `2 × max_age` 的条目
    pub async fn cleanup_old_files(&self, max_age: Duration) -> SweepReport {
        self.cleanup_old_files_at(SystemTime::now(), max_age).await
    }

    pub async fn cleanup_old_files_at(&self, now: SystemTime, max_age: Duration) -> SweepReport {
        let mut report = SweepReport::default();

        let temp_cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
        report.temp_removed = self
            .remove_older_than(&self.temp_root, temp_cutoff, |name| self.is_running(name))
            .await;

        let output_cutoff = now.checked_sub(max_age * 2).unwrap_or(SystemTime::UNIX_EPOCH);
        report.outputs_removed = self.remove_older_than(&self.output_root, output_cutoff, |_| false).await;

        let record_cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| DateTime::<Utc>::from(now).checked_sub_signed(age));
        if let Some(cutoff) = record_cutoff {
            let removed = self.registry.remove_finished_before(cutoff);
            report.records_removed = removed.len();
        }

        if report != SweepReport::default() {
            tracing::info!(
                "Sweep removed {} temp entries, {} outputs, {} task records",
                report.temp_removed, report.outputs_removed, report.records_removed
            );
        }
        report
    }

    /// 确认输出目录所在磁盘有足够空间，不足时先激进清理再检查一次
    ///
    /// 读取不到剩余空间时只记录警告并放行任务。
    pub async fn ensure_disk_space(&self, required_mb: u64) -> Result<()> {
        self.ensure_disk_space_with(required_mb, |path| fs2::available_space(path)).await
    }

    async fn ensure_disk_space_with<F>(&self, required_mb: u64, probe: F) -> Result<()>
    where
        F: Fn(&Path) -> io::Result<u64>,
    {
        let free_mb = match probe(&self.output_root) {
            Ok(bytes) => bytes / (1024 * 1024),
            Err(e) => {
                tracing::warn!("Cannot read free space of {}: {}", self.output_root.display(), e);
                return Ok(());
            }
        };
        if free_mb >= required_mb {
            return Ok(());
        }

        tracing::warn!("Low disk space ({}MB free, {}MB required), cleaning up", free_mb, required_mb);
        self.cleanup_old_files(AGGRESSIVE_MAX_AGE).await;

        let free_mb = probe(&self.output_root).map(|b| b / (1024 * 1024)).unwrap_or(free_mb);
        if free_mb < required_mb {
            return Err(AppError::DiskSpace { free_mb, required_mb });
        }
        Ok(())
    }

    /// 周期性清理任务，`interval` 之后首次执行
    pub fn spawn_periodic(&self, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即返回，启动时已清理过
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweeper.cleanup_old_files(max_age).await;
            }
        })
    }

    fn is_running(&self, task_id: &str) -> bool {
        self.registry
            .get(task_id)
            .map(|record| !record.is_terminal())
            .unwrap_or(false)
    }

    async fn remove_older_than<S>(&self, root: &Path, cutoff: SystemTime, skip: S) -> usize
    where
        S: Fn(&str) -> bool,
    {
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to scan {}: {}", root.display(), e);
                }
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to scan {}: {}", root.display(), e);
                    break;
                }
            };
            let path = entry.path();
            if skip(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Failed to stat {}: {}", path.display(), e);
                    continue;
                }
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if modified > cutoff {
                continue;
            }

            let result = if metadata.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => {
                    tracing::debug!("Removed expired {}", path.display());
                    removed += 1;
                }
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        removed
    }
}
