//! Path utility functions / 路径工具函数

use std::path::{Component, Path, PathBuf};

use crate::error::{AppError, Result};

/// Resolve a client-supplied name inside `root` / 在根目录内解析客户端给出的文件名
/// 1. Reject `..`, absolute paths and drive prefixes / 拒绝 `..`、绝对路径和盘符
/// 2. Canonicalize and check the result still lives under root (symlinks) / 规范化后再次确认仍在根目录内
pub fn resolve_within(root: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    if name.is_empty() || relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
        return Err(AppError::PathSecurity(name.to_string()));
    }

    let candidate = root.join(relative);
    if !candidate.exists() {
        return Err(AppError::NotFound(format!("File not found: {}", name)));
    }

    let root = root.canonicalize()?;
    let resolved = candidate.canonicalize()?;
    if !resolved.starts_with(&root) {
        return Err(AppError::PathSecurity(name.to_string()));
    }
    Ok(resolved)
}

/// Generate conflict-free destination / 生成不冲突的目标路径
/// Input: "file.mp3", existing: ["file.mp3", "file (1).mp3"] / 输入
/// Output: "file (2).mp3" / 输出
pub fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !first.exists() {
        return first;
    }

    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|e| e.to_str());

    for i in 1..10000 {
        let candidate = match ext {
            Some(e) => format!("{} ({}).{}", stem, i, e),
            None => format!("{} ({})", stem, i),
        };
        let candidate = dir.join(candidate);
        if !candidate.exists() {
            return candidate;
        }
    }

    // 极端情况：使用时间戳
    let timestamp = chrono::Utc::now().timestamp_millis();
    match ext {
        Some(e) => dir.join(format!("{}_{}.{}", stem, timestamp, e)),
        None => dir.join(format!("{}_{}", stem, timestamp)),
    }
}
