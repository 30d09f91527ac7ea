//! 应用设置模块
//!
//! # 设计思路
//!
//! `settings.json` 固定放在默认数据根目录下，内容只有两个可选项：
//! 历史数据目录的自定义位置与监听去抖窗口。设置文件缺失或损坏时
//! 一律回退到默认值，启动永不因设置失败而中断。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// 默认数据根目录下的子目录名。
const APP_DIR_NAME: &str = "ClipVault";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// 历史数据目录覆盖项（必须是绝对路径，否则忽略）。
    #[serde(default)]
    pub data_dir: Option<String>,

    /// 剪贴板事件去抖窗口（毫秒），由监听模块负责约束范围。
    #[serde(default)]
    pub debounce_ms: Option<u64>,
}

/// 默认数据根目录：本地应用数据目录下的 `ClipVault/`。
pub fn default_data_root() -> Result<PathBuf, AppError> {
    let base = dirs::data_local_dir()
        .ok_or_else(|| AppError::Storage("无法获取本地应用数据目录".to_string()))?;
    Ok(base.join(APP_DIR_NAME))
}

fn settings_file_path(default_root: &Path) -> PathBuf {
    default_root.join("settings.json")
}

/// 读取设置；文件缺失或解析失败时返回默认值。
pub fn load_settings(default_root: &Path) -> Settings {
    let path = settings_file_path(default_root);
    if !path.exists() {
        return Settings::default();
    }

    match fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("⚠️ 设置文件解析失败，使用默认设置: {}", e);
                Settings::default()
            }
        },
        Err(e) => {
            log::warn!("⚠️ 设置文件读取失败，使用默认设置: {}", e);
            Settings::default()
        }
    }
}

/// 写回设置文件（目录按需创建）。
pub fn save_settings(default_root: &Path, settings: &Settings) -> Result<(), AppError> {
    fs::create_dir_all(default_root)
        .map_err(|e| AppError::Storage(format!("创建应用数据目录失败: {}", e)))?;

    let content = serde_json::to_string_pretty(settings)?;
    fs::write(settings_file_path(default_root), content)?;
    Ok(())
}

/// 生效的数据根目录：绝对路径的覆盖项优先，否则用默认根目录。
pub fn resolve_data_root(settings: &Settings, default_root: &Path) -> PathBuf {
    match &settings.data_dir {
        Some(dir) => {
            let candidate = PathBuf::from(dir);
            if candidate.is_absolute() {
                candidate
            } else {
                log::warn!("⚠️ 自定义数据目录不是绝对路径，已忽略: {}", dir);
                default_root.to_path_buf()
            }
        }
        None => default_root.to_path_buf(),
    }
}
