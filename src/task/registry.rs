use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::models::TaskRecord;

/// 每个任务的广播缓冲大小，落后的订阅者会重新读取最新记录
const EVENT_CAPACITY: usize = 64;

struct TaskEntry {
    record: TaskRecord,
    events: broadcast::Sender<TaskRecord>,
}

/// 任务注册表（进程内唯一的共享可变状态）
///
/// 记录整体替换；每个任务带一个广播通道，供WebSocket推送使用。
/// 条目被移除时发送端随之释放，订阅者收到 `Closed`。
#[derive(Clone, Default)]
pub struct TaskRegistry {
    entries: Arc<RwLock<HashMap<String, TaskEntry>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入（替换）任务记录。已处于终态的任务拒绝任何写入，返回 false
    pub fn put(&self, record: TaskRecord) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(&record.task_id) {
            Some(entry) => {
                if entry.record.is_terminal() {
                    tracing::warn!(
                        "Ignoring {} update for finished task {} ({})",
                        record.status, record.task_id, entry.record.status
                    );
                    return false;
                }
                entry.record = record.clone();
                // 没有订阅者时发送失败，忽略
                let _ = entry.events.send(record);
            }
            None => {
                let (events, _) = broadcast::channel(EVENT_CAPACITY);
                entries.insert(record.task_id.clone(), TaskEntry { record, events });
            }
        }
        true
    }

    pub fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.entries.read().get(task_id).map(|e| e.record.clone())
    }

    pub fn remove(&self, task_id: &str) -> Option<TaskRecord> {
        self.entries.write().remove(task_id).map(|e| e.record)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.read().contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// 订阅任务更新：同一把锁下取当前记录并订阅，不会漏掉中间的更新
    pub fn subscribe(&self, task_id: &str) -> Option<(TaskRecord, broadcast::Receiver<TaskRecord>)> {
        let entries = self.entries.read();
        entries
            .get(task_id)
            .map(|e| (e.record.clone(), e.events.subscribe()))
    }

    /// 移除在 `cutoff` 之前就已结束的任务，返回被移除的ID
    pub fn remove_finished_before(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut entries = self.entries.write();
        let mut removed = Vec::new();
        entries.retain(|id, e| {
            let stale = e.record.is_terminal() && e.record.updated_at < cutoff;
            if stale {
                removed.push(id.clone());
            }
            !stale
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::types::TaskStatus;

    fn record(id: &str, status: TaskStatus, progress: f64) -> TaskRecord {
        TaskRecord::new(id, status, progress)
    }

    #[test]
    fn test_put_get_remove() {
        let registry = TaskRegistry::new();
        assert!(registry.get("a").is_none());

        assert!(registry.put(record("a", TaskStatus::Initializing, 0.0)));
        assert_eq!(registry.get("a").unwrap().status, TaskStatus::Initializing);
        assert_eq!(registry.len(), 1);

        assert!(registry.put(record("a", TaskStatus::Downloading, 10.0)));
        assert_eq!(registry.get("a").unwrap().progress, 10.0);

        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_put_replaces_whole_record() {
        let registry = TaskRegistry::new();
        let mut downloading = record("a", TaskStatus::Downloading, 40.0);
        downloading.speed = Some(1024.0);
        downloading.eta = Some(3);
        registry.put(downloading);

        registry.put(record("a", TaskStatus::Processing, 100.0));
        let current = registry.get("a").unwrap();
        assert_eq!(current.speed, None);
        assert_eq!(current.eta, None);
    }

    #[test]
    fn test_terminal_record_is_frozen() {
        let registry = TaskRegistry::new();
        registry.put(record("a", TaskStatus::Complete, 100.0));

        assert!(!registry.put(record("a", TaskStatus::Downloading, 5.0)));
        assert!(!registry.put(record("a", TaskStatus::Error, 0.0)));
        assert_eq!(registry.get("a").unwrap().status, TaskStatus::Complete);
    }

    #[test]
    fn test_tasks_do_not_cross_contaminate() {
        let registry = TaskRegistry::new();
        registry.put(record("a", TaskStatus::Downloading, 10.0));
        registry.put(record("b", TaskStatus::Downloading, 20.0));

        registry.put(record("a", TaskStatus::Downloading, 90.0));
        assert_eq!(registry.get("b").unwrap().progress, 20.0);
    }

    #[tokio::test]
    async fn test_subscribe_receives_updates_and_close() {
        let registry = TaskRegistry::new();
        registry.put(record("a", TaskStatus::Initializing, 0.0));

        let (snapshot, mut rx) = registry.subscribe("a").unwrap();
        assert_eq!(snapshot.status, TaskStatus::Initializing);

        registry.put(record("a", TaskStatus::Downloading, 50.0));
        let update = rx.recv().await.unwrap();
        assert_eq!(update.progress, 50.0);

        registry.remove("a");
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Closed)));
        assert!(registry.subscribe("a").is_none());
    }

    #[test]
    fn test_remove_finished_before_keeps_active_tasks() {
        let registry = TaskRegistry::new();
        registry.put(record("done", TaskStatus::Complete, 100.0));
        registry.put(record("failed", TaskStatus::Error, 0.0));
        registry.put(record("running", TaskStatus::Downloading, 30.0));

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let mut removed = registry.remove_finished_before(cutoff);
        removed.sort();
        assert_eq!(removed, vec!["done".to_string(), "failed".to_string()]);
        assert!(registry.contains("running"));

        let past = Utc::now() - chrono::Duration::hours(1);
        registry.put(record("done2", TaskStatus::Complete, 100.0));
        assert!(registry.remove_finished_before(past).is_empty());
    }
}
