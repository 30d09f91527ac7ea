//! 监听节流与捕获重试的纯逻辑
//!
//! # 设计思路
//!
//! Windows 在一次逻辑复制里常连发多个剪贴板变化通知，监听侧用一个
//! 带尾沿补发的去抖窗口把通知聚合成一次捕获请求。剪贴板还可能被
//! 写入方短暂锁住，捕获侧按递增延迟重试有限次后静默放弃。
//!
//! # 实现思路
//!
//! 去抖决策、退避计算与重试计划全部是纯函数，监听线程只负责执行，
//! 便于在不碰系统剪贴板的情况下测试。

use std::time::Duration;

/// 去抖窗口默认值与约束范围（毫秒）。
pub const DEBOUNCE_DEFAULT_MS: u64 = 80;
pub const DEBOUNCE_MIN_MS: u64 = 20;
pub const DEBOUNCE_MAX_MS: u64 = 5_000;

/// 监听线程退出后的重启退避：100ms 起倍增，顶到 5s。
pub const MONITOR_RESTART_BASE_DELAY_MS: u64 = 100;
pub const MONITOR_RESTART_MAX_DELAY_MS: u64 = 5_000;

/// 捕获重试次数与延迟步长：第 n 次尝试前等待 n × 50ms。
pub const CAPTURE_RETRY_ATTEMPTS: u32 = 3;
pub const CAPTURE_RETRY_STEP_MS: u64 = 50;

/// 把设置里的去抖窗口收敛到允许范围。
pub fn normalize_debounce_ms(value_ms: u64) -> u64 {
    value_ms.clamp(DEBOUNCE_MIN_MS, DEBOUNCE_MAX_MS)
}

/// 监听线程第 n 次重启前的等待时长。
pub fn restart_backoff_ms(restart_attempt: u32) -> u64 {
    let exp = 1_u64 << restart_attempt.saturating_sub(1).min(6);
    MONITOR_RESTART_BASE_DELAY_MS
        .saturating_mul(exp)
        .min(MONITOR_RESTART_MAX_DELAY_MS)
}

/// 捕获重试计划：每次尝试前的等待时长，按尝试序号递增。
pub fn capture_retry_delays() -> Vec<Duration> {
    (1..=CAPTURE_RETRY_ATTEMPTS)
        .map(|attempt| Duration::from_millis(CAPTURE_RETRY_STEP_MS * attempt as u64))
        .collect()
}

/// 距离去抖窗口结束还差多久；已到期则无需再等。
pub fn debounce_remaining(elapsed: Duration, window: Duration) -> Option<Duration> {
    if elapsed >= window {
        None
    } else {
        Some(window - elapsed)
    }
}

/// 一次剪贴板变化通知的去抖决策。
#[derive(Debug, PartialEq, Eq)]
pub enum DebounceDecision {
    /// 窗口已过，立即发出捕获请求。
    EmitNow,
    /// 仍在窗口内：记下待发通知，必要时启动尾沿补发。
    Throttle {
        remaining: Duration,
        start_tail_worker: bool,
    },
}

pub fn decide_debounce_action(
    elapsed: Duration,
    window: Duration,
    tail_worker_running: bool,
) -> DebounceDecision {
    match debounce_remaining(elapsed, window) {
        Some(remaining) => DebounceDecision::Throttle {
            remaining,
            start_tail_worker: !tail_worker_running,
        },
        None => DebounceDecision::EmitNow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_debounce_clamps_bounds() {
        assert_eq!(normalize_debounce_ms(5), DEBOUNCE_MIN_MS);
        assert_eq!(normalize_debounce_ms(80), 80);
        assert_eq!(normalize_debounce_ms(6_000), DEBOUNCE_MAX_MS);
    }

    #[test]
    fn restart_backoff_grows_then_caps() {
        assert_eq!(restart_backoff_ms(1), 100);
        assert_eq!(restart_backoff_ms(2), 200);
        assert_eq!(restart_backoff_ms(3), 400);
        assert_eq!(restart_backoff_ms(7), 5_000);
        assert_eq!(restart_backoff_ms(20), 5_000);
    }

    #[test]
    fn capture_retry_schedule_is_three_increasing_delays() {
        let delays = capture_retry_delays();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(50),
                Duration::from_millis(100),
                Duration::from_millis(150),
            ]
        );
    }

    #[test]
    fn debounce_remaining_returns_expected_values() {
        let window = Duration::from_millis(80);
        assert_eq!(
            debounce_remaining(Duration::from_millis(20), window),
            Some(Duration::from_millis(60))
        );
        assert_eq!(debounce_remaining(Duration::from_millis(80), window), None);
        assert_eq!(debounce_remaining(Duration::from_millis(120), window), None);
    }

    #[test]
    fn debounce_decision_emit_now_when_window_elapsed() {
        let decision = decide_debounce_action(
            Duration::from_millis(80),
            Duration::from_millis(80),
            false,
        );
        assert_eq!(decision, DebounceDecision::EmitNow);
    }

    #[test]
    fn debounce_decision_starts_tail_worker_once() {
        let first = decide_debounce_action(
            Duration::from_millis(20),
            Duration::from_millis(80),
            false,
        );
        assert_eq!(
            first,
            DebounceDecision::Throttle {
                remaining: Duration::from_millis(60),
                start_tail_worker: true,
            }
        );

        let second = decide_debounce_action(
            Duration::from_millis(10),
            Duration::from_millis(80),
            true,
        );
        assert_eq!(
            second,
            DebounceDecision::Throttle {
                remaining: Duration::from_millis(70),
                start_tail_worker: false,
            }
        );
    }
}
