//! 历史文档持久化
//!
//! ## 职责
//! - 维护数据根目录下的固定布局：`History.json` + `Cache/` + `Backup/`
//! - 读入历史文档；解析失败时把损坏文件挪进备份目录并重置为空，
//!   启动永远可用
//! - 整份写出历史文档；先写临时文件再改名，读取方只会看到完整提交
//!
//! ## 错误语义
//! - 读取路径上的一切失败都退化为空仓库（附带日志与备份副本）
//! - 写出失败向调用方返回 `AppError`，内存状态不回滚

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::AppError;

use super::entry::HistoryEntry;

const HISTORY_FILE_NAME: &str = "History.json";
const CACHE_DIR_NAME: &str = "Cache";
const BACKUP_DIR_NAME: &str = "Backup";

/// 数据根目录布局。
#[derive(Debug, Clone)]
pub struct HistoryPaths {
    root: PathBuf,
}

impl HistoryPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn history_file(&self) -> PathBuf {
        self.root.join(HISTORY_FILE_NAME)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR_NAME)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR_NAME)
    }
}

/// 读入历史文档。文件缺失返回空；解析失败备份后返回空。
pub fn load_document(paths: &HistoryPaths) -> Vec<HistoryEntry> {
    let file = paths.history_file();
    if !file.exists() {
        return Vec::new();
    }

    let content = match fs::read_to_string(&file) {
        Ok(content) => content,
        Err(e) => {
            log::error!("❌ 历史文档读取失败，按空历史启动: {}", e);
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<HistoryEntry>>(&content) {
        Ok(entries) => {
            log::info!("📂 历史文档加载完成，共 {} 条", entries.len());
            entries
        }
        Err(e) => {
            log::error!("❌ 历史文档解析失败，备份后重置: {}", e);
            backup_corrupted_file(paths, &file);
            Vec::new()
        }
    }
}

/// 整份写出历史文档（临时文件 + 改名，目录按需创建）。
pub fn save_document(paths: &HistoryPaths, entries: &[HistoryEntry]) -> Result<(), AppError> {
    fs::create_dir_all(paths.root())
        .map_err(|e| AppError::Storage(format!("创建数据目录失败: {}", e)))?;

    let content = serde_json::to_string_pretty(entries)?;

    let file = paths.history_file();
    let tmp = file.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, &file)?;
    Ok(())
}

/// 把损坏的文档挪进备份目录，带时间戳命名。失败只记日志。
fn backup_corrupted_file(paths: &HistoryPaths, file: &Path) {
    let backup_dir = paths.backup_dir();
    if let Err(e) = fs::create_dir_all(&backup_dir) {
        log::warn!("⚠️ 创建备份目录失败，跳过备份: {}", e);
        return;
    }

    let backup_name = format!(
        "History_corrupted_{}.json",
        Local::now().format("%Y%m%d_%H%M%S")
    );
    let target = backup_dir.join(backup_name);

    match fs::rename(file, &target) {
        Ok(()) => log::warn!("🗃️ 损坏的历史文档已备份到 {}", target.display()),
        Err(e) => log::warn!("⚠️ 备份损坏文档失败: {}", e),
    }
}
