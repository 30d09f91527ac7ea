//! 五级排序的对外契约：展示顺序 = 置顶 > 最新复制 > 最近使用 > 高频 > 历史。

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, Utc};

use clip_vault::history::{HistoryEntry, HistoryPaths, HistoryStore};

fn unique_root(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("clip_vault_rank_{}_{}", tag, nanos))
}

fn seeded_entry(
    label: &str,
    minutes_since_copy: i64,
    use_count: u32,
    minutes_since_use: Option<i64>,
    pinned: bool,
    now: chrono::DateTime<Utc>,
) -> HistoryEntry {
    let mut entry = HistoryEntry::plain_text(label.to_string(), None);
    entry.copied_at = now - Duration::minutes(minutes_since_copy);
    entry.use_count = use_count;
    entry.last_used_at = minutes_since_use.map(|m| now - Duration::minutes(m));
    if pinned {
        entry.is_pinned = true;
        entry.pinned_at = Some(now - Duration::minutes(minutes_since_copy));
    }
    entry
}

async fn store_with(entries: Vec<HistoryEntry>, root: &PathBuf) -> HistoryStore {
    fs::create_dir_all(root).expect("create data root failed");
    let doc = serde_json::to_string_pretty(&entries).expect("serialize seed doc failed");
    fs::write(root.join("History.json"), doc).expect("write seed doc failed");

    let store = HistoryStore::new(HistoryPaths::new(root.clone()));
    store.load().await;
    store
}

#[tokio::test]
async fn tiers_appear_in_contract_order() {
    let root = unique_root("order");
    let now = Utc::now();

    // 故意乱序投放，每条只命中一个分区
    let entries = vec![
        seeded_entry("history", 60 * 24, 0, None, false, now),
        seeded_entry("frequent", 60 * 10, 5, Some(60 * 5), false, now),
        seeded_entry("recent", 60, 1, Some(10), false, now),
        seeded_entry("just_copied", 1, 0, None, false, now),
        seeded_entry("pinned", 60 * 48, 0, None, true, now),
    ];

    let store = store_with(entries, &root).await;
    let view = store.ranked_view().await;

    let labels: Vec<_> = view
        .iter()
        .map(|e| e.text_content.clone().unwrap_or_default())
        .collect();
    assert_eq!(
        labels,
        vec!["pinned", "just_copied", "recent", "frequent", "history"]
    );

    fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn first_matching_tier_wins() {
    let root = unique_root("first_match");
    let now = Utc::now();

    // 置顶 + 刚复制 + 高频同时命中，置顶优先
    let all_tiers = seeded_entry("everything", 1, 9, Some(1), true, now);
    // 刚复制 + 最近使用同时命中，刚复制优先于最近使用的排序键
    let fresh_and_used = seeded_entry("fresh_used", 2, 2, Some(2), false, now);
    let merely_recent = seeded_entry("merely_used", 60, 1, Some(5), false, now);

    let store = store_with(vec![merely_recent, fresh_and_used, all_tiers], &root).await;
    let view = store.ranked_view().await;

    let labels: Vec<_> = view
        .iter()
        .map(|e| e.text_content.clone().unwrap_or_default())
        .collect();
    assert_eq!(labels, vec!["everything", "fresh_used", "merely_used"]);

    fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn frequent_tier_orders_by_count_then_recency() {
    let root = unique_root("frequent_keys");
    let now = Utc::now();

    let entries = vec![
        seeded_entry("used_3_recent", 60 * 20, 3, Some(60), false, now),
        seeded_entry("used_7", 60 * 20, 7, Some(60 * 30), false, now),
        seeded_entry("used_3_older", 60 * 20, 3, Some(60 * 40), false, now),
        // 次数够但最近使用超出 7 天窗口，落回历史区
        seeded_entry("used_but_stale", 60 * 20, 9, Some(60 * 24 * 8), false, now),
    ];

    let store = store_with(entries, &root).await;
    let view = store.ranked_view().await;

    let labels: Vec<_> = view
        .iter()
        .map(|e| e.text_content.clone().unwrap_or_default())
        .collect();
    assert_eq!(
        labels,
        vec!["used_7", "used_3_recent", "used_3_older", "used_but_stale"]
    );

    fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn pin_toggle_moves_entry_between_tiers() {
    let root = unique_root("pin_toggle");
    let now = Utc::now();

    let entries = vec![
        seeded_entry("fresh", 1, 0, None, false, now),
        seeded_entry("old", 60 * 24, 0, None, false, now),
    ];
    let store = store_with(entries, &root).await;

    let old_id = store
        .ranked_view()
        .await
        .iter()
        .find(|e| e.text_content.as_deref() == Some("old"))
        .expect("seeded entry missing")
        .id
        .clone();

    let pinned = store.toggle_pin(&old_id).await.expect("pin failed");
    assert_eq!(pinned, Some(true));
    let view = store.ranked_view().await;
    assert_eq!(view[0].text_content.as_deref(), Some("old"));

    let unpinned = store.toggle_pin(&old_id).await.expect("unpin failed");
    assert_eq!(unpinned, Some(false));
    let view = store.ranked_view().await;
    assert_eq!(view[0].text_content.as_deref(), Some("fresh"));
    assert_eq!(view[1].text_content.as_deref(), Some("old"));

    fs::remove_dir_all(&root).ok();
}
