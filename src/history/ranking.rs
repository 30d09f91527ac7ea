//! 五级排序模块
//!
//! # 设计思路
//!
//! 排序是本系统对用户最重要的承诺：置顶区 > 最新复制区 > 最近使用区
//! > 高频区 > 历史区。每个条目只进入它命中的第一个分区，分区内再按
//! 各自的时间或频次键降序。阈值是契约的一部分，不做配置。
//!
//! # 实现思路
//!
//! 分区归属只取决于条目自身字段，先算 `tier_of` 再按分区分桶，
//! 桶内稳定排序后顺序拼接。全程纯函数，仓库层负责缓存与失效。

use chrono::{DateTime, Duration, Utc};

use super::entry::HistoryEntry;

/// 最新复制区窗口：5 分钟。
pub const JUST_COPIED_WINDOW_MINUTES: i64 = 5;
/// 最近使用区窗口：30 分钟。
pub const RECENT_USE_WINDOW_MINUTES: i64 = 30;
/// 高频区统计周期：7 天。
pub const FREQUENT_WINDOW_DAYS: i64 = 7;
/// 高频区使用次数阈值。
pub const FREQUENT_MIN_USE_COUNT: u32 = 3;

/// 排序分区，数值顺序即展示顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Pinned,
    JustCopied,
    RecentlyUsed,
    Frequent,
    History,
}

/// 条目命中的第一个分区。
pub fn tier_of(entry: &HistoryEntry, now: DateTime<Utc>) -> Tier {
    if entry.is_pinned {
        return Tier::Pinned;
    }

    if entry.copied_at > now - Duration::minutes(JUST_COPIED_WINDOW_MINUTES) {
        return Tier::JustCopied;
    }

    let used_after = |cutoff: DateTime<Utc>| entry.last_used_at.is_some_and(|t| t > cutoff);

    if entry.use_count > 0 && used_after(now - Duration::minutes(RECENT_USE_WINDOW_MINUTES)) {
        return Tier::RecentlyUsed;
    }

    if entry.use_count >= FREQUENT_MIN_USE_COUNT
        && used_after(now - Duration::days(FREQUENT_WINDOW_DAYS))
    {
        return Tier::Frequent;
    }

    Tier::History
}

/// 按五级规则返回排序后的下标序列。
pub fn ranked_indices(entries: &[HistoryEntry], now: DateTime<Utc>) -> Vec<usize> {
    let mut pinned = Vec::new();
    let mut just_copied = Vec::new();
    let mut recently_used = Vec::new();
    let mut frequent = Vec::new();
    let mut history = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        match tier_of(entry, now) {
            Tier::Pinned => pinned.push(index),
            Tier::JustCopied => just_copied.push(index),
            Tier::RecentlyUsed => recently_used.push(index),
            Tier::Frequent => frequent.push(index),
            Tier::History => history.push(index),
        }
    }

    pinned.sort_by(|&a, &b| entries[b].pinned_at.cmp(&entries[a].pinned_at));
    just_copied.sort_by(|&a, &b| entries[b].copied_at.cmp(&entries[a].copied_at));
    recently_used.sort_by(|&a, &b| entries[b].last_used_at.cmp(&entries[a].last_used_at));
    frequent.sort_by(|&a, &b| {
        entries[b]
            .use_count
            .cmp(&entries[a].use_count)
            .then(entries[b].last_used_at.cmp(&entries[a].last_used_at))
    });
    history.sort_by(|&a, &b| entries[b].copied_at.cmp(&entries[a].copied_at));

    let mut ordered = Vec::with_capacity(entries.len());
    ordered.extend(pinned);
    ordered.extend(just_copied);
    ordered.extend(recently_used);
    ordered.extend(frequent);
    ordered.extend(history);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry_with(
        minutes_since_copy: i64,
        use_count: u32,
        minutes_since_use: Option<i64>,
        pinned_minutes_ago: Option<i64>,
        now: DateTime<Utc>,
    ) -> HistoryEntry {
        let mut entry = HistoryEntry::plain_text(
            format!("c{}_u{}_{:?}", minutes_since_copy, use_count, minutes_since_use),
            None,
        );
        entry.copied_at = now - Duration::minutes(minutes_since_copy);
        entry.use_count = use_count;
        entry.last_used_at = minutes_since_use.map(|m| now - Duration::minutes(m));
        if let Some(minutes) = pinned_minutes_ago {
            entry.is_pinned = true;
            entry.pinned_at = Some(now - Duration::minutes(minutes));
        }
        entry
    }

    #[test]
    fn pinned_wins_over_everything() {
        let now = Utc::now();
        let entry = entry_with(0, 10, Some(0), Some(10_000), now);
        assert_eq!(tier_of(&entry, now), Tier::Pinned);
    }

    #[test]
    fn fresh_copy_lands_in_just_copied() {
        let now = Utc::now();
        let entry = entry_with(2, 0, None, None, now);
        assert_eq!(tier_of(&entry, now), Tier::JustCopied);
    }

    #[test]
    fn just_copied_boundary_is_strict() {
        let now = Utc::now();
        let entry = entry_with(JUST_COPIED_WINDOW_MINUTES, 0, None, None, now);
        assert_eq!(tier_of(&entry, now), Tier::History);
    }

    #[test]
    fn recently_used_requires_positive_use_count() {
        let now = Utc::now();
        let used_but_uncounted = entry_with(60, 0, Some(10), None, now);
        assert_eq!(tier_of(&used_but_uncounted, now), Tier::History);

        let used = entry_with(60, 1, Some(10), None, now);
        assert_eq!(tier_of(&used, now), Tier::RecentlyUsed);
    }

    #[test]
    fn frequent_requires_threshold_and_recent_window() {
        let now = Utc::now();
        let frequent = entry_with(60, FREQUENT_MIN_USE_COUNT, Some(60 * 24), None, now);
        assert_eq!(tier_of(&frequent, now), Tier::Frequent);

        let below_threshold = entry_with(60, FREQUENT_MIN_USE_COUNT - 1, Some(60 * 24), None, now);
        assert_eq!(tier_of(&below_threshold, now), Tier::History);

        let too_old = entry_with(
            60,
            FREQUENT_MIN_USE_COUNT + 2,
            Some(60 * 24 * (FREQUENT_WINDOW_DAYS + 1)),
            None,
            now,
        );
        assert_eq!(tier_of(&too_old, now), Tier::History);
    }

    #[test]
    fn never_used_entry_never_enters_use_tiers() {
        let now = Utc::now();
        let entry = entry_with(600, 5, None, None, now);
        assert_eq!(tier_of(&entry, now), Tier::History);
    }

    #[test]
    fn tiers_concatenate_in_contract_order() {
        let now = Utc::now();
        let entries = vec![
            entry_with(600, 0, None, None, now),                      // History
            entry_with(60, 5, Some(60 * 10), None, now),              // Frequent
            entry_with(60, 1, Some(10), None, now),                   // RecentlyUsed
            entry_with(1, 0, None, None, now),                        // JustCopied
            entry_with(600, 0, None, Some(5), now),                   // Pinned
        ];

        let order = ranked_indices(&entries, now);
        assert_eq!(order, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn pinned_orders_by_pin_time_desc() {
        let now = Utc::now();
        let entries = vec![
            entry_with(0, 0, None, Some(30), now),
            entry_with(0, 0, None, Some(5), now),
            entry_with(0, 0, None, Some(60), now),
        ];
        let order = ranked_indices(&entries, now);
        assert_eq!(order, vec![1, 0, 2]);
    }

    #[test]
    fn frequent_orders_by_use_count_then_last_used() {
        let now = Utc::now();
        let entries = vec![
            entry_with(60, 3, Some(120), None, now),
            entry_with(60, 5, Some(300), None, now),
            entry_with(60, 3, Some(60), None, now),
        ];
        let order = ranked_indices(&entries, now);
        assert_eq!(order, vec![1, 2, 0]);
    }

    proptest! {
        #[test]
        fn ranking_is_a_permutation(
            seeds in proptest::collection::vec(
                (any::<bool>(), 0i64..20_000, 0u32..10, proptest::option::of(0i64..20_000)),
                0..40,
            )
        ) {
            let now = Utc::now();
            let entries: Vec<HistoryEntry> = seeds
                .iter()
                .enumerate()
                .map(|(i, (pinned, copy_age, uses, use_age))| {
                    let mut e = entry_with(*copy_age, *uses, *use_age, None, now);
                    e.text_content = Some(format!("unique-{}", i));
                    if *pinned {
                        e.is_pinned = true;
                        e.pinned_at = Some(now - Duration::minutes(*copy_age));
                    }
                    e
                })
                .collect();

            let order = ranked_indices(&entries, now);

            let mut seen = order.clone();
            seen.sort_unstable();
            let expected: Vec<usize> = (0..entries.len()).collect();
            prop_assert_eq!(seen, expected);
        }

        #[test]
        fn pinned_entries_form_a_prefix(
            seeds in proptest::collection::vec(
                (any::<bool>(), 0i64..20_000, 0u32..10, proptest::option::of(0i64..20_000)),
                0..40,
            )
        ) {
            let now = Utc::now();
            let entries: Vec<HistoryEntry> = seeds
                .iter()
                .map(|(pinned, copy_age, uses, use_age)| {
                    let mut e = entry_with(*copy_age, *uses, *use_age, None, now);
                    if *pinned {
                        e.is_pinned = true;
                        e.pinned_at = Some(now - Duration::minutes(*copy_age));
                    }
                    e
                })
                .collect();

            let order = ranked_indices(&entries, now);
            let mut saw_unpinned = false;
            for index in order {
                if entries[index].is_pinned {
                    prop_assert!(!saw_unpinned, "pinned entry ranked below a non-pinned one");
                } else {
                    saw_unpinned = true;
                }
            }
        }
    }
}
