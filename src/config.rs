//! Application configuration module / 应用配置模块
//!
//! Manages application configuration loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config file location / 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "MEDIAGRAB_CONFIG";

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration / 服务器配置
    pub server: ServerConfig,
    /// Directory layout / 目录布局
    pub storage: StorageConfig,
    /// Retention and cleanup / 保留与清理策略
    pub retention: RetentionConfig,
    /// External downloader tools / 外部下载工具
    pub tools: ToolsConfig,
}

/// Server configuration / 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address / 服务器监听地址
    pub host: String,
    /// Server port / 服务器端口
    pub port: u16,
}

/// Storage roots / 存储目录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Log directory / 日志目录
    pub logs_dir: String,
    /// Temporary work root, one sub directory per task / 临时工作目录（每个任务一个子目录）
    pub temp_dir: String,
    /// Permanent output root / 最终输出目录
    pub downloads_dir: String,
}

/// Retention configuration / 保留策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Temp entries older than this are swept, outputs after twice as long / 临时文件过期时间（小时）
    pub max_age_hours: u64,
    /// Periodic sweep interval, 0 disables it / 定期清理间隔（分钟），0 表示关闭
    pub sweep_interval_minutes: u64,
    /// How long a finished task stays pollable / 任务结束后状态保留时间（秒）
    pub status_grace_seconds: u64,
    /// Minimum free space required before starting a task / 启动任务所需最小剩余空间（MB）
    pub required_free_mb: u64,
}

/// External tool configuration / 外部工具配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// yt-dlp executable / yt-dlp 可执行文件
    pub ytdlp_path: String,
    /// spotdl executable / spotdl 可执行文件
    pub spotdl_path: String,
    /// Max downloads running at once / 最大并发下载数
    pub max_concurrent_downloads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            logs_dir: "logs".to_string(),
            temp_dir: "temp".to_string(),
            downloads_dir: "downloads".to_string(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_hours: 24,
            sweep_interval_minutes: 60,
            status_grace_seconds: 300,
            required_free_mb: 1000,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            spotdl_path: "spotdl".to_string(),
            max_concurrent_downloads: 3,
        }
    }
}

impl AppConfig {
    /// Get the server bind address / 获取服务器绑定地址
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn get_logs_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.logs_dir)
    }

    pub fn get_temp_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.temp_dir)
    }

    pub fn get_downloads_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.downloads_dir)
    }

    /// Retention window for temp entries / 临时文件保留时长
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.retention.max_age_hours * 3600)
    }

    /// None when the periodic sweep is disabled / 关闭定期清理时返回 None
    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.retention.sweep_interval_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(minutes * 60)),
        }
    }

    pub fn status_grace(&self) -> Duration {
        Duration::from_secs(self.retention.status_grace_seconds)
    }

    /// Create logs/temp/downloads roots / 创建日志、临时、输出目录
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [self.get_logs_dir(), self.get_temp_dir(), self.get_downloads_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                tracing::info!("Created directory: {:?}", dir);
            }
        }
        Ok(())
    }
}

/// Get the config file path / 获取配置文件路径
fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config() -> Result<AppConfig, String> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(config_path: &Path) -> Result<AppConfig, String> {
    if config_path.exists() {
        // Load existing config / 加载现有配置
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        // Create default config / 创建默认配置
        let config = AppConfig::default();
        save_config_to(&config, config_path)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
pub fn save_config_to(config: &AppConfig, config_path: &Path) -> Result<(), String> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    std::fs::write(config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}
