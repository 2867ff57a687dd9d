use crate::config::AppConfig;
use crate::task::{TaskManager, TaskRegistry};
use crate::tools::ToolSet;

/// Shared handler state / 处理器共享状态
pub struct AppState {
    pub config: AppConfig,
    pub task_manager: TaskManager,
}

impl AppState {
    /// Wire registry, tools and task manager from config / 根据配置组装注册表、工具和任务管理器
    pub fn new(config: AppConfig, tools: ToolSet) -> Self {
        let task_manager = TaskManager::new(&config, TaskRegistry::new(), tools);
        Self { config, task_manager }
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.task_manager.registry()
    }
}
