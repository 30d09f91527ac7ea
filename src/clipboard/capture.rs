//! 剪贴板捕获模块
//!
//! # 设计思路
//!
//! 把当前剪贴板内容翻译成至多一个候选历史条目，不改动剪贴板状态。
//! 类型判定按固定优先级，首个命中即生效：文件列表 → 图片 → 文本。
//!
//! # 实现思路
//!
//! - 文件列表走 Win32 CF_HDROP（非 Windows 平台恒为无）。
//! - 图片经 `arboard` 取 RGBA，在捕获路径上只做内存 PNG 编码，
//!   缓存落盘由仓库的收录流程在后台完成。
//! - 文本存在 HTML / RTF 表示时归类为富文本，三种表示原样保留；
//!   只有纯文本时把非换行空白压成单个空格并去掉首尾，压完为空
//!   则丢弃。
//! - 来源应用名尽力获取，拿不到置空。
//! - 剪贴板被占用返回 `Err` 交给监听侧重试；内容缺失返回 `Ok(None)`。

use image::codecs::png::PngEncoder;
use image::ImageEncoder;

use crate::error::AppError;
use crate::history::HistoryEntry;
use crate::input::platform;

/// 抓取一次剪贴板快照，按优先级生成候选条目。
pub fn snapshot() -> Result<Option<HistoryEntry>, AppError> {
    let source_app = platform::source_app_name();

    if let Some(paths) = read_file_list()? {
        log::info!("📁 捕获文件列表条目: {} 个路径", paths.len());
        return Ok(Some(HistoryEntry::file_list(paths, source_app)));
    }

    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| AppError::Clipboard(format!("无法访问剪贴板: {}", e)))?;

    if let Ok(image_data) = clipboard.get_image() {
        let png_bytes = encode_png(
            image_data.width,
            image_data.height,
            &image_data.bytes,
        )?;
        log::info!(
            "🖼️ 捕获图片条目: {}x{} ({} 字节 PNG)",
            image_data.width,
            image_data.height,
            png_bytes.len()
        );
        return Ok(Some(HistoryEntry::image(png_bytes, source_app)));
    }

    let text = match clipboard.get_text() {
        Ok(text) => text,
        Err(_) => return Ok(None),
    };

    let (html, rtf) = read_rich_formats();
    let is_rich = html.is_some() || rtf.is_some();

    if is_rich {
        if text.trim().is_empty() {
            return Ok(None);
        }
        log::info!("📋 捕获富文本条目 ({} 字符)", text.chars().count());
        return Ok(Some(HistoryEntry::rich_text(text, html, rtf, source_app)));
    }

    let normalized = normalize_spaces(&text);
    if normalized.is_empty() {
        return Ok(None);
    }
    log::info!("📋 捕获纯文本条目 ({} 字符)", normalized.chars().count());
    Ok(Some(HistoryEntry::plain_text(normalized, source_app)))
}

/// 纯文本规范化：非换行空白的连续段压成单个空格，去掉首尾空白。
pub fn normalize_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;

    for c in text.chars() {
        if c.is_whitespace() && c != '\n' && c != '\r' {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(c);
            last_was_space = false;
        }
    }

    out.trim().to_string()
}

/// RGBA 像素 → 内存 PNG 字节。
fn encode_png(width: usize, height: usize, rgba: &[u8]) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            rgba,
            width as u32,
            height as u32,
            image::ColorType::Rgba8.into(),
        )
        .map_err(|e| AppError::Clipboard(format!("PNG 编码失败: {}", e)))?;
    Ok(buf)
}

/// 从剪贴板读取 CF_HDROP 文件路径列表。
#[cfg(target_os = "windows")]
fn read_file_list() -> Result<Option<Vec<String>>, AppError> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use windows::Win32::System::DataExchange::{CloseClipboard, GetClipboardData, OpenClipboard};
    use windows::Win32::System::Ole::CF_HDROP;
    use windows::Win32::UI::Shell::{DragQueryFileW, HDROP};

    unsafe {
        OpenClipboard(None).map_err(|e| AppError::Clipboard(format!("打开剪贴板失败: {:?}", e)))?;

        let result = (|| -> Option<Vec<String>> {
            let handle = GetClipboardData(CF_HDROP.0 as u32).ok()?;

            let hdrop = HDROP(handle.0);
            let count = DragQueryFileW(hdrop, 0xFFFFFFFF, None);
            if count == 0 {
                return None;
            }

            let mut paths = Vec::with_capacity(count as usize);
            for i in 0..count {
                let len = DragQueryFileW(hdrop, i, None);
                if len == 0 {
                    continue;
                }

                let mut buf = vec![0u16; (len + 1) as usize];
                DragQueryFileW(hdrop, i, Some(&mut buf));

                if let Some(pos) = buf.iter().position(|&c| c == 0) {
                    buf.truncate(pos);
                }

                paths.push(OsString::from_wide(&buf).to_string_lossy().into_owned());
            }

            if paths.is_empty() {
                None
            } else {
                Some(paths)
            }
        })();

        let _ = CloseClipboard();
        Ok(result)
    }
}

#[cfg(not(target_os = "windows"))]
fn read_file_list() -> Result<Option<Vec<String>>, AppError> {
    Ok(None)
}

/// 读取 HTML / RTF 表示（原样字节，保留 CF_HTML 偏移头）。
/// 读不到任何一种不算错，当作普通文本处理。
#[cfg(target_os = "windows")]
fn read_rich_formats() -> (Option<String>, Option<String>) {
    use windows::Win32::Foundation::HGLOBAL;
    use windows::Win32::System::DataExchange::{
        CloseClipboard, GetClipboardData, OpenClipboard, RegisterClipboardFormatW,
    };
    use windows::Win32::System::Memory::{GlobalLock, GlobalSize, GlobalUnlock};

    fn read_raw_format(name: &str) -> Option<String> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();

        let bytes = unsafe {
            let format_id = RegisterClipboardFormatW(windows::core::PCWSTR(wide.as_ptr()));
            if format_id == 0 {
                return None;
            }

            let handle = GetClipboardData(format_id).ok()?;
            let hglobal = HGLOBAL(handle.0);
            let ptr = GlobalLock(hglobal) as *const u8;
            if ptr.is_null() {
                return None;
            }

            let size = GlobalSize(hglobal);
            let bytes = std::slice::from_raw_parts(ptr, size).to_vec();
            let _ = GlobalUnlock(hglobal);
            bytes
        };

        // 全局内存常带结尾 NUL，截掉后按 UTF-8 尽力解码
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let content = String::from_utf8_lossy(&bytes[..end]).into_owned();
        if content.is_empty() {
            None
        } else {
            Some(content)
        }
    }

    unsafe {
        if OpenClipboard(None).is_err() {
            return (None, None);
        }

        let html = read_raw_format("HTML Format");
        let rtf = read_raw_format("Rich Text Format");

        let _ = CloseClipboard();
        (html, rtf)
    }
}

#[cfg(not(target_os = "windows"))]
fn read_rich_formats() -> (Option<String>, Option<String>) {
    (None, None)
}
