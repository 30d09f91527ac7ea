//! Win32 平台层：目标窗口追踪、激活与多格式剪贴板写入
//!
//! # 设计思路
//!
//! 粘贴注入要落到弹窗抢焦点**之前**的那个窗口，所以前台目标与它的
//! 焦点子控件在弹窗出现前快照、由前台变化通知随时刷新。剪贴板写入
//! 沿用"先备好全部缓冲、再极短窗口 Open→Empty→Set→Close"的方案，
//! 失败按 Busy / Transient / Fatal 分类后做带抖动的指数退避重试。
//!
//! # 实现思路
//!
//! - 目标句柄以原始整数存进全局互斥量（句柄本身不跨线程安全）。
//! - 本进程的窗口一律不作为粘贴目标。
//! - 所有编码（UTF-16、DROPFILES、DIBv5）在打开剪贴板之前完成，
//!   持锁窗口通常 < 1ms。
//! - 非 Windows 平台提供占位实现，文本经 `arboard` 写入。

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::AppError;

/// 一次剪贴板写入的全部格式负载。
/// 字段缺省即不写对应格式，调用方按条目类型填充。
#[derive(Debug, Default, Clone)]
pub struct ClipboardPayload {
    pub text: Option<String>,
    pub html: Option<String>,
    pub rtf: Option<String>,
    pub files: Vec<String>,
    /// (宽, 高, RGBA 像素)
    pub image_rgba: Option<(usize, usize, Vec<u8>)>,
}

impl ClipboardPayload {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.html.is_none()
            && self.rtf.is_none()
            && self.files.is_empty()
            && self.image_rgba.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteFailureKind {
    Busy,
    Transient,
    Fatal,
}

#[derive(Debug, Clone)]
struct WriteFailure {
    kind: WriteFailureKind,
    message: String,
}

impl WriteFailure {
    fn busy(message: impl Into<String>) -> Self {
        Self {
            kind: WriteFailureKind::Busy,
            message: message.into(),
        }
    }

    fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: WriteFailureKind::Transient,
            message: message.into(),
        }
    }

    fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: WriteFailureKind::Fatal,
            message: message.into(),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self.kind, WriteFailureKind::Busy | WriteFailureKind::Transient)
    }
}

// ── 重试参数：短促重试，总预算内放弃 ──
const WRITE_RETRIES: u32 = 3;
const WRITE_RETRY_BASE_MS: u64 = 100;
const WRITE_RETRY_MAX_DELAY_MS: u64 = 900;
const WRITE_RETRY_BUDGET_MS: u64 = 1_800;

static JITTER_STATE: AtomicU64 = AtomicU64::new(0);

fn next_jitter_u64() -> u64 {
    let mut current = JITTER_STATE.load(Ordering::Relaxed);

    loop {
        let seeded = if current == 0 {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            let seed = nanos ^ ((std::process::id() as u64) << 32) ^ 0x9E37_79B9_7F4A_7C15;
            if seed == 0 {
                0xA5A5_5A5A_0123_4567
            } else {
                seed
            }
        } else {
            current
        };

        let mut next = seeded;
        next ^= next << 13;
        next ^= next >> 7;
        next ^= next << 17;

        match JITTER_STATE.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(observed) => current = observed,
        }
    }
}

fn backoff_delay_with_jitter(attempt: u32) -> u64 {
    let exp = WRITE_RETRY_BASE_MS.saturating_mul(1_u64 << attempt.saturating_sub(1).min(8));
    let capped = exp.min(WRITE_RETRY_MAX_DELAY_MS);
    let jitter_bound = (capped / 3).max(1);
    capped.saturating_add(next_jitter_u64() % (jitter_bound + 1))
}

fn would_exceed_budget(elapsed_ms: u64, wait_ms: u64) -> bool {
    elapsed_ms.saturating_add(wait_ms) > WRITE_RETRY_BUDGET_MS
}

fn hresult_to_win32_code(hr: i32) -> Option<u32> {
    let value = hr as u32;
    if (value & 0xFFFF_0000) == 0x8007_0000 {
        Some(value & 0xFFFF)
    } else {
        None
    }
}

/// 带重试的剪贴板写入。所有缓冲在持锁之前备好。
pub fn write_clipboard(payload: &ClipboardPayload) -> Result<(), AppError> {
    use std::time::{Duration, Instant};

    if payload.is_empty() {
        return Err(AppError::Clipboard("剪贴板负载为空".to_string()));
    }

    let prepped = prepare_buffers(payload)?;

    let started = Instant::now();
    let mut last_error = None;
    for attempt in 1..=WRITE_RETRIES {
        if attempt > 1 {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if elapsed_ms >= WRITE_RETRY_BUDGET_MS {
                log::warn!("⏱️ 剪贴板写入重试预算耗尽（{}ms）", elapsed_ms);
                break;
            }

            let wait_ms = backoff_delay_with_jitter(attempt - 1);
            if would_exceed_budget(elapsed_ms, wait_ms) {
                log::warn!("⏱️ 跳过第 {} 次重试：等待 {}ms 会超出预算", attempt, wait_ms);
                break;
            }

            log::debug!("🔄 剪贴板写入重试 {}/{}，等待 {}ms", attempt, WRITE_RETRIES, wait_ms);
            std::thread::sleep(Duration::from_millis(wait_ms));
        }

        match try_fast_write(&prepped) {
            Ok(()) => {
                log::debug!("✅ 剪贴板写入成功 (尝试 {})", attempt);
                return Ok(());
            }
            Err(failure) => {
                log::warn!(
                    "❌ 剪贴板写入尝试 {} 失败: {}（kind={:?}）",
                    attempt,
                    failure.message,
                    failure.kind
                );
                let retryable = failure.is_retryable();
                last_error = Some(failure);
                if !retryable {
                    break;
                }
            }
        }
    }

    let message = last_error
        .map(|f| f.message)
        .unwrap_or_else(|| "未知错误".to_string());
    Err(AppError::Clipboard(message))
}

// ============================================================================
// Windows 实现
// ============================================================================

#[cfg(target_os = "windows")]
mod win32 {
    use super::*;
    use std::mem::size_of;
    use std::ptr::copy_nonoverlapping;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{
        CloseHandle, GlobalFree, ERROR_ACCESS_DENIED, ERROR_BUSY, ERROR_CLIPBOARD_NOT_OPEN,
        ERROR_NOT_ENOUGH_MEMORY, ERROR_NOT_ENOUGH_QUOTA, ERROR_NO_SYSTEM_RESOURCES,
        ERROR_OUTOFMEMORY, HANDLE, HWND,
    };
    use windows::Win32::Graphics::Gdi::{BITMAPV5HEADER, BI_BITFIELDS, LCS_GM_IMAGES};
    use windows::Win32::System::DataExchange::{
        CloseClipboard, EmptyClipboard, OpenClipboard, RegisterClipboardFormatW, SetClipboardData,
    };
    use windows::Win32::System::Memory::{GlobalAlloc, GlobalLock, GlobalUnlock, GMEM_MOVEABLE};
    use windows::Win32::System::Ole::{CF_DIBV5, CF_HDROP, CF_UNICODETEXT};
    use windows::Win32::System::Threading::{
        GetCurrentProcessId, GetCurrentThreadId, OpenProcess, QueryFullProcessImageNameW,
        PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows::Win32::UI::Input::KeyboardAndMouse::{AttachThreadInput, GetFocus, SetFocus};
    use windows::Win32::UI::Shell::DROPFILES;
    use windows::Win32::UI::WindowsAndMessaging::{
        AllowSetForegroundWindow, BringWindowToTop, GetForegroundWindow,
        GetWindowThreadProcessId, IsWindow, SetForegroundWindow,
    };

    const ASFW_ANY: u32 = u32::MAX;

    /// sRGB 色彩空间标识（windows-rs 中没有定义）。
    #[allow(non_upper_case_globals)]
    const LCS_sRGB: u32 = 0x7352_4742;

    fn to_wide(s: &str) -> Vec<u16> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        OsStr::new(s)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    }

    // ── 粘贴目标追踪 ───────────────────────────────────────────

    /// 粘贴目标快照（顶层窗口 + 焦点子控件，原始句柄值）。
    #[derive(Debug, Clone, Copy, Default)]
    struct TargetContext {
        window: isize,
        focus: isize,
    }

    static PASTE_TARGET: Lazy<Mutex<Option<TargetContext>>> = Lazy::new(|| Mutex::new(None));

    fn target_slot() -> std::sync::MutexGuard<'static, Option<TargetContext>> {
        match PASTE_TARGET.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("粘贴目标状态锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    fn window_belongs_to_us(hwnd: HWND) -> bool {
        let mut pid: u32 = 0;
        unsafe {
            GetWindowThreadProcessId(hwnd, Some(&mut pid));
            pid == GetCurrentProcessId()
        }
    }

    /// 在目标线程的输入上下文里取焦点子控件。
    unsafe fn focused_child_of(target: HWND) -> isize {
        let target_thread = GetWindowThreadProcessId(target, None);
        let current_thread = GetCurrentThreadId();

        let attached = target_thread != current_thread
            && AttachThreadInput(current_thread, target_thread, true).as_bool();

        let focus = GetFocus();

        if attached {
            let _ = AttachThreadInput(current_thread, target_thread, false);
        }

        focus.0 as isize
    }

    /// 快照当前前台窗口及其焦点子控件作为粘贴目标。
    /// 前台是本进程的窗口时保留上一个目标不动。
    pub fn capture_target_context() {
        unsafe {
            let foreground = GetForegroundWindow();
            if foreground.0.is_null() || window_belongs_to_us(foreground) {
                return;
            }

            let context = TargetContext {
                window: foreground.0 as isize,
                focus: focused_child_of(foreground),
            };
            *target_slot() = Some(context);
            log::debug!("🎯 粘贴目标已更新: window={:#x}", context.window);
        }
    }

    /// 重新激活粘贴目标并恢复焦点子控件。
    /// 返回是否存在有效目标；无目标时调用方应放弃注入。
    pub fn activate_target() -> Result<bool, AppError> {
        let Some(context) = *target_slot() else {
            return Ok(false);
        };

        unsafe {
            let hwnd = HWND(context.window as *mut core::ffi::c_void);
            if !IsWindow(Some(hwnd)).as_bool() {
                *target_slot() = None;
                log::debug!("🎯 粘贴目标窗口已失效，放弃注入");
                return Ok(false);
            }

            let _ = AllowSetForegroundWindow(ASFW_ANY);

            let target_thread = GetWindowThreadProcessId(hwnd, None);
            let current_thread = GetCurrentThreadId();
            let attached = target_thread != current_thread
                && AttachThreadInput(current_thread, target_thread, true).as_bool();

            let _ = SetForegroundWindow(hwnd);
            let _ = BringWindowToTop(hwnd);

            if context.focus != 0 {
                let focus = HWND(context.focus as *mut core::ffi::c_void);
                if IsWindow(Some(focus)).as_bool() {
                    let _ = SetFocus(Some(focus));
                }
            }

            if attached {
                let _ = AttachThreadInput(current_thread, target_thread, false);
            }
        }

        Ok(true)
    }

    /// 当前前台进程名（去掉路径与 .exe），尽力而为。
    pub fn source_app_name() -> Option<String> {
        unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.0.is_null() {
                return None;
            }

            let mut pid: u32 = 0;
            GetWindowThreadProcessId(hwnd, Some(&mut pid));
            if pid == 0 {
                return None;
            }

            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;

            let mut buf = vec![0u16; 512];
            let mut len = buf.len() as u32;
            let result = QueryFullProcessImageNameW(
                handle,
                PROCESS_NAME_WIN32,
                windows::core::PWSTR(buf.as_mut_ptr()),
                &mut len,
            );
            let _ = CloseHandle(handle);
            result.ok()?;

            let full = String::from_utf16_lossy(&buf[..len as usize]);
            let name = std::path::Path::new(&full)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())?;
            if name.is_empty() {
                None
            } else {
                Some(name)
            }
        }
    }

    // ── 多格式写入 ─────────────────────────────────────────────

    /// 预备好的剪贴板缓冲：(格式, 字节)。编码全部前置于持锁之前。
    pub(super) struct PreppedBuffers {
        slots: Vec<(FormatSlot, Vec<u8>)>,
    }

    enum FormatSlot {
        Standard(u32, &'static str),
        Registered(&'static str),
    }

    pub(super) fn prepare_buffers(payload: &ClipboardPayload) -> Result<PreppedBuffers, AppError> {
        let mut slots = Vec::new();

        if let Some(text) = &payload.text {
            let wide = to_wide(text);
            let mut bytes = Vec::with_capacity(wide.len() * 2);
            for unit in wide {
                bytes.extend_from_slice(&unit.to_le_bytes());
            }
            slots.push((
                FormatSlot::Standard(CF_UNICODETEXT.0 as u32, "CF_UNICODETEXT"),
                bytes,
            ));
        }

        if let Some(html) = &payload.html {
            let mut bytes = html.as_bytes().to_vec();
            bytes.push(0);
            slots.push((FormatSlot::Registered("HTML Format"), bytes));
        }

        if let Some(rtf) = &payload.rtf {
            let mut bytes = rtf.as_bytes().to_vec();
            bytes.push(0);
            slots.push((FormatSlot::Registered("Rich Text Format"), bytes));
        }

        if let Some((width, height, rgba)) = &payload.image_rgba {
            let dibv5 = build_dibv5(*width, *height, rgba)?;
            slots.push((FormatSlot::Standard(CF_DIBV5.0 as u32, "CF_DIBV5"), dibv5));
        }

        if !payload.files.is_empty() {
            let drop_buf = build_dropfiles(&payload.files);
            slots.push((FormatSlot::Standard(CF_HDROP.0 as u32, "CF_HDROP"), drop_buf));
        }

        Ok(PreppedBuffers { slots })
    }

    /// 极速写入：Open→Empty→逐格式 Set→Close，不做任何编码。
    pub(super) fn try_fast_write(prepped: &PreppedBuffers) -> Result<(), WriteFailure> {
        unsafe {
            OpenClipboard(None).map_err(|e| classify_win32_error("打开剪贴板", "N/A", &e))?;

            if let Err(e) = EmptyClipboard() {
                let _ = CloseClipboard();
                return Err(classify_win32_error("清空剪贴板", "N/A", &e));
            }

            for (slot, bytes) in &prepped.slots {
                let result = match slot {
                    FormatSlot::Standard(id, name) => set_global_data(*id, name, bytes),
                    FormatSlot::Registered(name) => set_registered_format(name, bytes),
                };
                if let Err(e) = result {
                    let _ = CloseClipboard();
                    return Err(e);
                }
            }

            let _ = CloseClipboard();
        }

        Ok(())
    }

    unsafe fn set_registered_format(name: &str, data: &[u8]) -> Result<(), WriteFailure> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let format_id = RegisterClipboardFormatW(PCWSTR(wide.as_ptr()));
        if format_id == 0 {
            return Err(WriteFailure::fatal(format!("注册格式 '{}' 失败", name)));
        }
        set_global_data(format_id, name, data)
    }

    unsafe fn set_global_data(
        format_id: u32,
        format_name: &str,
        data: &[u8],
    ) -> Result<(), WriteFailure> {
        let hglobal = GlobalAlloc(GMEM_MOVEABLE, data.len())
            .map_err(|e| classify_win32_error("GlobalAlloc", format_name, &e))?;

        let ptr = GlobalLock(hglobal) as *mut u8;
        if ptr.is_null() {
            let _ = GlobalFree(Some(hglobal));
            return Err(WriteFailure::transient("GlobalLock 返回空指针".to_string()));
        }

        copy_nonoverlapping(data.as_ptr(), ptr, data.len());
        let _ = GlobalUnlock(hglobal);

        if let Err(e) = SetClipboardData(format_id, Some(HANDLE(hglobal.0))) {
            let _ = GlobalFree(Some(hglobal));
            return Err(classify_win32_error("SetClipboardData", format_name, &e));
        }

        Ok(())
    }

    fn classify_win32_error(
        operation: &str,
        format_name: &str,
        err: &windows::core::Error,
    ) -> WriteFailure {
        let hr = err.code().0;
        let code = hresult_to_win32_code(hr);
        let message = format!(
            "{}失败: format={} hr={:#010X} code={}",
            operation,
            format_name,
            hr as u32,
            code.map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        );

        match code {
            Some(c)
                if c == ERROR_ACCESS_DENIED.0
                    || c == ERROR_CLIPBOARD_NOT_OPEN.0
                    || c == ERROR_BUSY.0 =>
            {
                WriteFailure::busy(message)
            }
            Some(c)
                if c == ERROR_NOT_ENOUGH_MEMORY.0
                    || c == ERROR_OUTOFMEMORY.0
                    || c == ERROR_NO_SYSTEM_RESOURCES.0
                    || c == ERROR_NOT_ENOUGH_QUOTA.0 =>
            {
                WriteFailure::transient(message)
            }
            _ => WriteFailure::fatal(message),
        }
    }

    /// DROPFILES 头 + 双 NUL 结尾的宽字符路径表。
    fn build_dropfiles(paths: &[String]) -> Vec<u8> {
        let encoded: Vec<Vec<u16>> = paths.iter().map(|p| to_wide(p)).collect();

        let header_size = size_of::<DROPFILES>();
        let list_units: usize = encoded.iter().map(|w| w.len()).sum::<usize>() + 1;
        let mut buf = vec![0u8; header_size + list_units * 2];

        unsafe {
            let drop_files = buf.as_mut_ptr() as *mut DROPFILES;
            (*drop_files).pFiles = header_size as u32;
            (*drop_files).pt.x = 0;
            (*drop_files).pt.y = 0;
            (*drop_files).fNC = false.into();
            (*drop_files).fWide = true.into();

            let mut dst = buf.as_mut_ptr().add(header_size) as *mut u16;
            for wide in &encoded {
                copy_nonoverlapping(wide.as_ptr(), dst, wide.len());
                dst = dst.add(wide.len());
            }
            *dst = 0;
        }

        buf
    }

    /// BITMAPV5HEADER + 垂直翻转的 ARGB 像素。
    fn build_dibv5(width: usize, height: usize, rgba: &[u8]) -> Result<Vec<u8>, AppError> {
        let header_size = size_of::<BITMAPV5HEADER>();
        let pixel_bytes = width * height * 4;

        if rgba.len() != pixel_bytes {
            return Err(AppError::Clipboard(format!(
                "像素长度不匹配: 期望 {} 实际 {}",
                pixel_bytes,
                rgba.len()
            )));
        }

        let argb_flipped = rgba_to_argb_flipped(rgba, width, height);

        // 正的 height 表示 bottom-up（Windows 标准，兼容性最好）
        let header = BITMAPV5HEADER {
            bV5Size: header_size as u32,
            bV5Width: width as i32,
            bV5Height: height as i32,
            bV5Planes: 1,
            bV5BitCount: 32,
            bV5Compression: BI_BITFIELDS,
            bV5SizeImage: pixel_bytes as u32,
            bV5XPelsPerMeter: 0,
            bV5YPelsPerMeter: 0,
            bV5ClrUsed: 0,
            bV5ClrImportant: 0,
            bV5RedMask: 0x00ff_0000,
            bV5GreenMask: 0x0000_ff00,
            bV5BlueMask: 0x0000_00ff,
            bV5AlphaMask: 0xff00_0000,
            bV5CSType: LCS_sRGB,
            bV5Endpoints: unsafe { std::mem::zeroed() },
            bV5GammaRed: 0,
            bV5GammaGreen: 0,
            bV5GammaBlue: 0,
            bV5Intent: LCS_GM_IMAGES as u32,
            bV5ProfileData: 0,
            bV5ProfileSize: 0,
            bV5Reserved: 0,
        };

        let mut buf = Vec::with_capacity(header_size + pixel_bytes);
        let header_bytes =
            unsafe { std::slice::from_raw_parts(&header as *const _ as *const u8, header_size) };
        buf.extend_from_slice(header_bytes);
        buf.extend_from_slice(&argb_flipped);

        Ok(buf)
    }

    /// RGBA → ARGB（小端内存排布 B G R A）+ 垂直翻转，一次遍历完成。
    fn rgba_to_argb_flipped(rgba: &[u8], width: usize, height: usize) -> Vec<u8> {
        let row_bytes = width * 4;
        let mut out = vec![0u8; rgba.len()];

        for y in 0..height {
            let src_row = y * row_bytes;
            let dst_row = (height - 1 - y) * row_bytes;
            for x in 0..width {
                let si = src_row + x * 4;
                let di = dst_row + x * 4;
                out[di] = rgba[si + 2];
                out[di + 1] = rgba[si + 1];
                out[di + 2] = rgba[si];
                out[di + 3] = rgba[si + 3];
            }
        }

        out
    }
}

#[cfg(target_os = "windows")]
pub use win32::{activate_target, capture_target_context, source_app_name};
#[cfg(target_os = "windows")]
use win32::{prepare_buffers, try_fast_write};

// ============================================================================
// 非 Windows 占位实现 — 文本经 arboard 写入，目标追踪为空操作
// ============================================================================

#[cfg(not(target_os = "windows"))]
mod fallback {
    use super::*;

    pub(super) struct PreppedBuffers {
        text: Option<String>,
    }

    pub(super) fn prepare_buffers(payload: &ClipboardPayload) -> Result<PreppedBuffers, AppError> {
        Ok(PreppedBuffers {
            text: payload.text.clone(),
        })
    }

    pub(super) fn try_fast_write(prepped: &PreppedBuffers) -> Result<(), WriteFailure> {
        let Some(text) = &prepped.text else {
            return Err(WriteFailure::fatal("本平台仅支持文本写入".to_string()));
        };

        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| WriteFailure::busy(format!("无法访问剪贴板: {}", e)))?;
        clipboard
            .set_text(text.clone())
            .map_err(|e| WriteFailure::transient(format!("写入失败: {}", e)))
    }

    pub fn capture_target_context() {}

    pub fn activate_target() -> Result<bool, AppError> {
        Ok(false)
    }

    pub fn source_app_name() -> Option<String> {
        None
    }
}

#[cfg(not(target_os = "windows"))]
pub use fallback::{activate_target, capture_target_context, source_app_name};
#[cfg(not(target_os = "windows"))]
use fallback::{prepare_buffers, try_fast_write};
