//! 注入服务：按条目类型写剪贴板 + 模拟粘贴
//!
//! # 设计思路
//!
//! 写剪贴板是主承诺，必须成功并向上报错；粘贴注入是尽力而为的附赠，
//! 任何系统层失败都吞掉——剪贴板已经写好，用户随时可以手动粘贴。
//!
//! # 实现思路
//!
//! - 每种条目类型映射到一组固定的剪贴板格式（见 `build_payload`）。
//! - 写入前武装自写抑制窗口，完成后重盖一次（重试可能拖过初始
//!   窗口），防止监听侧把自己的写入存回历史。
//! - 粘贴顺序：激活目标 → 等 30ms 让窗口进前台 → Ctrl+V，
//!   按键之间留 10ms 间隔。

use std::time::Duration;

use enigo::{
    Direction::{Click, Press, Release},
    Enigo, Key, Keyboard, Settings,
};

use crate::cache::CacheStore;
use crate::clipboard::SuppressGuard;
use crate::error::AppError;
use crate::history::{EntryKind, HistoryEntry, HistoryStore};

use super::platform;
use super::platform::ClipboardPayload;

/// 激活目标窗口后、发送按键前的等待。
const ACTIVATE_SETTLE_MS: u64 = 30;
/// 粘贴按键序列里相邻事件的间隔。
const KEY_EVENT_GAP_MS: u64 = 10;

/// 按条目类型组装剪贴板负载。
///
/// - 纯文本：仅 Unicode 文本
/// - 富文本：必带文本；`plain_text_only` 为假时附带存在的 HTML / RTF
/// - 图片：DIBv5 位图 + 指向缓存文件的文件引用 + 路径文本回退
/// - 文件列表：文件引用 + 换行连接的路径文本回退
fn build_payload(
    entry: &HistoryEntry,
    plain_text_only: bool,
    cache: &CacheStore,
) -> Result<ClipboardPayload, AppError> {
    let mut payload = ClipboardPayload::default();

    match entry.kind {
        EntryKind::PlainText => {
            payload.text = Some(entry.text_content.clone().unwrap_or_default());
        }
        EntryKind::RichText => {
            payload.text = Some(entry.text_content.clone().unwrap_or_default());
            if !plain_text_only {
                payload.html = entry.html_content.clone();
                payload.rtf = entry.rtf_content.clone();
            }
        }
        EntryKind::Image => {
            let name = entry
                .image_ref
                .as_deref()
                .ok_or_else(|| AppError::Clipboard("图片条目缺少缓存引用".to_string()))?;
            let path = cache.resolve(name);
            if !path.exists() {
                return Err(AppError::Clipboard(format!("缓存文件已不存在: {}", name)));
            }

            let decoded = image::open(&path)?.to_rgba8();
            let (width, height) = decoded.dimensions();
            payload.image_rgba = Some((width as usize, height as usize, decoded.into_raw()));

            let path_text = path.to_string_lossy().into_owned();
            payload.files = vec![path_text.clone()];
            payload.text = Some(path_text);
        }
        EntryKind::FileList => {
            let paths = entry.file_paths.clone().unwrap_or_default();
            if paths.is_empty() {
                return Err(AppError::Clipboard("文件列表条目没有路径".to_string()));
            }
            payload.text = Some(paths.join("\n"));
            payload.files = paths;
        }
    }

    Ok(payload)
}

/// 把条目写上系统剪贴板。图片的解码与格式组装在阻塞线程里完成。
pub async fn set_clipboard(
    entry: &HistoryEntry,
    plain_text_only: bool,
    cache: &CacheStore,
) -> Result<(), AppError> {
    let entry = entry.clone();
    let cache = cache.clone();

    tokio::task::spawn_blocking(move || -> Result<(), AppError> {
        let payload = build_payload(&entry, plain_text_only, &cache)?;
        let guard = SuppressGuard::new();
        platform::write_clipboard(&payload)?;
        // 写入可能历经忙重试，结束时初始窗口或已过期，重盖一次
        // 接住写入完成后系统补发的变化通知
        guard.rearm();
        Ok(())
    })
    .await
    .map_err(|e| AppError::Clipboard(format!("剪贴板写入任务失败: {}", e)))??;

    Ok(())
}

/// 弹窗显示前调用：快照当前前台窗口与焦点控件作为粘贴目标。
pub fn capture_target_context() {
    platform::capture_target_context();
}

/// 把剪贴板内容注入之前捕获的目标窗口。
/// 没有目标时是空操作；一切系统层失败都吞掉只记日志。
pub async fn inject_paste() {
    let result = tokio::task::spawn_blocking(|| -> Result<(), AppError> {
        if platform::activate_target()? {
            std::thread::sleep(Duration::from_millis(ACTIVATE_SETTLE_MS));
            send_paste_keys()?;
        }
        Ok(())
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("⚠️ 粘贴注入失败（剪贴板内容仍可手动粘贴）: {}", e),
        Err(e) => log::warn!("⚠️ 粘贴注入任务失败: {}", e),
    }
}

/// Ctrl+V 按下/抬起序列，事件之间留间隔给目标进程处理。
fn send_paste_keys() -> Result<(), AppError> {
    let mut enigo = Enigo::new(&Settings::default())
        .map_err(|e| AppError::Input(format!("初始化输入模拟失败: {}", e)))?;

    let gap = Duration::from_millis(KEY_EVENT_GAP_MS);

    enigo
        .key(Key::Control, Press)
        .map_err(|e| AppError::Input(format!("模拟粘贴按键失败: {}", e)))?;
    std::thread::sleep(gap);
    enigo
        .key(Key::Unicode('v'), Click)
        .map_err(|e| AppError::Input(format!("模拟粘贴按键失败: {}", e)))?;
    std::thread::sleep(gap);
    enigo
        .key(Key::Control, Release)
        .map_err(|e| AppError::Input(format!("模拟粘贴按键失败: {}", e)))?;

    Ok(())
}

/// 完整的"粘贴条目"动作：写剪贴板 → 注入目标 → 记一次使用。
/// 未知 id 返回 `Ok(false)`，与仓库的空操作约定一致。
pub async fn paste_entry(
    store: &HistoryStore,
    id: &str,
    plain_text_only: bool,
) -> Result<bool, AppError> {
    let Some(entry) = store.get(id).await else {
        return Ok(false);
    };

    set_clipboard(&entry, plain_text_only, store.cache()).await?;
    inject_paste().await;

    if let Err(e) = store.record_use(id).await {
        log::warn!("⚠️ 使用记录更新失败: {}", e);
    }

    Ok(true)
}
