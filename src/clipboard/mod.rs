//! 剪贴板监听与捕获模块
//!
//! # 设计思路
//!
//! - **监听**：`clipboard-master` 驱动的独立线程监听系统剪贴板变化，
//!   经去抖聚合后把"重新检查剪贴板"的空载通知发给捕获循环
//! - **自写抑制**：应用自己写剪贴板前武装一个抑制窗口
//!   （RAII Guard + 截止时刻），监听线程在窗口内丢弃变化通知，
//!   避免回灌自己的写入
//! - **捕获**：收到通知后按递增延迟重试快照（剪贴板可能仍被写入方
//!   锁着），拿到候选条目交给历史仓库收录，预算耗尽静默放弃
//!
//! # 实现思路
//!
//! - 抑制窗口用互斥量保存截止 `Instant`，到期自然失效，一次写入
//!   触发的连串通知都会落在窗口内。
//! - 监听线程退出后按指数退避重启，锁中毒时取恢复数据继续。
//! - 去抖决策与重试计划是 `listener` 里的纯函数。

pub mod capture;
pub mod listener;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use clipboard_master::{CallbackResult, ClipboardHandler, Master};
use once_cell::sync::Lazy;
use tokio::sync::mpsc::UnboundedSender;

use crate::history::HistoryStore;

/// 自写抑制窗口时长：覆盖一次写入触发的全部变化通知。
const SUPPRESS_WINDOW_MS: u64 = 300;

static SUPPRESS_UNTIL: Lazy<Mutex<Option<Instant>>> = Lazy::new(|| Mutex::new(None));

fn suppress_deadline() -> std::sync::MutexGuard<'static, Option<Instant>> {
    match SUPPRESS_UNTIL.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("剪贴板抑制状态锁中毒，继续使用恢复数据");
            poisoned.into_inner()
        }
    }
}

/// 自写抑制窗口的 RAII 守卫
///
/// 构造时武装抑制窗口，窗口到期自然失效，`Drop` 不提前解除
/// （写入完成后系统可能还会补发变化通知）。
pub struct SuppressGuard;

impl SuppressGuard {
    pub fn new() -> Self {
        let deadline = Instant::now() + Duration::from_millis(SUPPRESS_WINDOW_MS);
        *suppress_deadline() = Some(deadline);
        log::debug!("🚫 已武装剪贴板自写抑制窗口 ({}ms)", SUPPRESS_WINDOW_MS);
        Self
    }

    /// 把截止时刻重新推到"现在 + 窗口"。写入带重试时总耗时可能
    /// 远超窗口时长，完成后重盖一次才能接住尾随的变化通知。
    pub fn rearm(&self) {
        let deadline = Instant::now() + Duration::from_millis(SUPPRESS_WINDOW_MS);
        *suppress_deadline() = Some(deadline);
        log::debug!("🚫 写入完成，重盖抑制窗口 ({}ms)", SUPPRESS_WINDOW_MS);
    }
}

impl Default for SuppressGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// 当前通知是否落在抑制窗口内。过期的窗口顺手清掉。
fn is_suppressed(now: Instant) -> bool {
    let mut deadline = suppress_deadline();
    match *deadline {
        Some(until) if now <= until => true,
        Some(_) => {
            *deadline = None;
            false
        }
        None => false,
    }
}

#[derive(Debug, Default)]
struct DebounceState {
    last_emit_at: Option<Instant>,
    pending_change: bool,
    tail_worker_running: bool,
}

/// 剪贴板事件处理器（内部实现）
///
/// 过滤抑制窗口内的通知，其余经去抖聚合后发往捕获循环。
struct Handler {
    notify: UnboundedSender<()>,
    debounce_ms: u64,
    debounce_state: Arc<Mutex<DebounceState>>,
}

impl Handler {
    fn new(notify: UnboundedSender<()>, debounce_ms: u64) -> Self {
        Self {
            notify,
            debounce_ms,
            debounce_state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    fn lock_debounce(&self) -> std::sync::MutexGuard<'_, DebounceState> {
        match self.debounce_state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("剪贴板去抖状态锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    fn spawn_tail_worker(&self, initial_wait: Duration) {
        let notify = self.notify.clone();
        let debounce_state = Arc::clone(&self.debounce_state);
        let window = Duration::from_millis(self.debounce_ms);

        thread::spawn(move || {
            let mut wait_for = initial_wait;

            loop {
                if !wait_for.is_zero() {
                    thread::sleep(wait_for);
                }

                let now = Instant::now();
                let should_emit;

                {
                    let mut state = match debounce_state.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => {
                            log::warn!("剪贴板去抖状态锁中毒，继续使用恢复数据");
                            poisoned.into_inner()
                        }
                    };

                    if !state.pending_change {
                        state.tail_worker_running = false;
                        break;
                    }

                    let elapsed = state
                        .last_emit_at
                        .map(|last| now.saturating_duration_since(last))
                        .unwrap_or(window);

                    if let Some(remaining) = listener::debounce_remaining(elapsed, window) {
                        wait_for = remaining;
                        continue;
                    }

                    state.pending_change = false;
                    state.last_emit_at = Some(now);
                    state.tail_worker_running = false;
                    should_emit = true;
                }

                if should_emit {
                    let _ = notify.send(());
                }

                break;
            }
        });
    }
}

impl ClipboardHandler for Handler {
    fn on_clipboard_change(&mut self) -> CallbackResult {
        let now = Instant::now();

        if is_suppressed(now) {
            log::debug!("⏭️ 忽略应用自身写入触发的剪贴板变化");
            return CallbackResult::Next;
        }

        let window = Duration::from_millis(self.debounce_ms);
        let mut emit_now = false;
        let mut schedule_tail_wait = None;

        {
            let mut state = self.lock_debounce();
            let elapsed = state
                .last_emit_at
                .map(|last| now.saturating_duration_since(last))
                .unwrap_or(window);

            match listener::decide_debounce_action(elapsed, window, state.tail_worker_running) {
                listener::DebounceDecision::Throttle {
                    remaining,
                    start_tail_worker,
                } => {
                    state.pending_change = true;
                    if start_tail_worker {
                        state.tail_worker_running = true;
                        schedule_tail_wait = Some(remaining);
                    }
                    log::trace!(
                        "⏱️ 剪贴板变化通知去抖：{}ms < {}ms（尾沿补发）",
                        elapsed.as_millis(),
                        self.debounce_ms
                    );
                }
                listener::DebounceDecision::EmitNow => {
                    state.last_emit_at = Some(now);
                    state.pending_change = false;
                    emit_now = true;
                }
            }
        }

        if let Some(wait_for) = schedule_tail_wait {
            self.spawn_tail_worker(wait_for);
        }

        if emit_now {
            let _ = self.notify.send(());
        }

        CallbackResult::Next
    }

    fn on_clipboard_error(&mut self, error: std::io::Error) -> CallbackResult {
        log::error!("剪贴板监听错误：{}", error);
        CallbackResult::Next
    }
}

/// 在后台线程启动剪贴板监听，变化通知发往 `notify`。
/// 监听退出后按指数退避自动重启。
pub fn start_monitoring(notify: UnboundedSender<()>, debounce_ms: u64) {
    let debounce_ms = listener::normalize_debounce_ms(debounce_ms);

    thread::spawn(move || {
        let mut restart_attempt: u32 = 0;
        loop {
            match Master::new(Handler::new(notify.clone(), debounce_ms)) {
                Ok(mut master) => {
                    restart_attempt = 0;
                    log::info!("📋 剪贴板监听已启动 (去抖 {}ms)", debounce_ms);
                    let _ = master.run();
                    log::warn!("📋 剪贴板监听已退出，将尝试重启");
                }
                Err(err) => {
                    log::error!("📋 创建剪贴板监听失败: {}", err);
                }
            }

            restart_attempt = restart_attempt.saturating_add(1);
            let backoff_ms = listener::restart_backoff_ms(restart_attempt);
            log::warn!(
                "📋 剪贴板监听 {}ms 后重试（attempt={}）",
                backoff_ms,
                restart_attempt
            );
            thread::sleep(Duration::from_millis(backoff_ms));
        }
    });
}

/// 响应一次变化通知：按递增延迟重试快照，拿到条目交给仓库收录。
/// 重试预算耗尽或确认无内容都静默结束。
pub async fn capture_and_store(store: &HistoryStore) {
    for delay in listener::capture_retry_delays() {
        tokio::time::sleep(delay).await;

        match tokio::task::spawn_blocking(capture::snapshot).await {
            Ok(Ok(Some(entry))) => {
                match store.add(entry).await {
                    Ok(true) => log::debug!("✅ 捕获完成，新条目已入库"),
                    Ok(false) => log::debug!("✅ 捕获命中既有条目，已刷新"),
                    Err(e) => log::warn!("⚠️ 条目收录失败: {}", e),
                }
                return;
            }
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                log::debug!("🔄 剪贴板暂不可用，稍后重试: {}", e);
            }
            Err(e) => {
                log::warn!("⚠️ 捕获任务执行失败: {}", e);
                return;
            }
        }
    }

    log::warn!("⏱️ 捕获重试预算耗尽，放弃本次剪贴板变化");
}

#[cfg(test)]
mod tests {
    use super::*;

    // 抑制窗口是全局状态，放在同一个用例里避免并行用例互相干扰
    #[test]
    fn suppress_guard_arms_then_expires() {
        let guard = SuppressGuard::new();
        assert!(is_suppressed(Instant::now()));

        let after_window = Instant::now() + Duration::from_millis(SUPPRESS_WINDOW_MS + 50);
        assert!(!is_suppressed(after_window));

        // 窗口过期后重盖必须再次生效（写入重试耗时超过初始窗口的情形）
        guard.rearm();
        assert!(is_suppressed(Instant::now()));
        let after_rearm = Instant::now() + Duration::from_millis(SUPPRESS_WINDOW_MS + 50);
        assert!(!is_suppressed(after_rearm));
    }
}
