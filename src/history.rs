//! 历史模块
//!
//! # 设计思路
//!
//! 剪贴板历史的全部状态集中在一个仓库里：内存集合是唯一事实，
//! 磁盘上的 `History.json` 是它的整份快照。去重、置顶、保留策略
//! 与五级排序都是仓库的内部规则，外层只消费排序视图与条目操作。
//!
//! # 模块划分
//!
//! - `entry`：条目结构与预览派生
//! - `ranking`：五级排序（纯函数）
//! - `persistence`：文档读写与损坏备份
//! - `store`：仓库操作与并发约束

mod entry;
mod persistence;
mod ranking;
mod store;

pub use entry::{EntryKind, HistoryEntry, PREVIEW_MAX_CHARS};
pub use persistence::HistoryPaths;
pub use ranking::{
    ranked_indices, tier_of, Tier, FREQUENT_MIN_USE_COUNT, FREQUENT_WINDOW_DAYS,
    JUST_COPIED_WINDOW_MINUTES, RECENT_USE_WINDOW_MINUTES,
};
pub use store::{HistoryStore, MAX_AGE_DAYS, MAX_ITEMS};
