//! 历史仓库模块
//!
//! # 设计思路
//!
//! `HistoryStore` 是条目集合的唯一权威：去重、置顶、使用计数、
//! 保留策略与五级排序视图都从这里出。所有可变操作串行经过内部
//! 状态锁（对应单一归属线程的约束），磁盘写出再经过一道保存闸门，
//! 任一时刻至多一个写盘在途。
//!
//! # 实现思路
//!
//! - 状态锁内只做内存变更；快照在保存闸门内克隆，写盘在
//!   `spawn_blocking` 里进行。
//! - 排序视图带脏标记缓存：任何变更置脏，下次读取再算。
//! - 图片条目在进锁前完成指纹与缓存落盘，捕获路径不背重活。
//! - 保存失败向调用方报告，内存状态不回滚。

use std::collections::HashSet;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use crate::cache::CacheStore;
use crate::error::AppError;
use crate::hash;

use super::entry::HistoryEntry;
use super::persistence::{self, HistoryPaths};
use super::ranking;

/// 保留上限：超出后从最旧的非置顶条目开始淘汰。
pub const MAX_ITEMS: usize = 300;
/// 保留期限：非置顶条目超过 30 天清除。
pub const MAX_AGE_DAYS: i64 = 30;

struct StoreState {
    entries: Vec<HistoryEntry>,
    /// 排序缓存（下标序列）；`None` 表示已失效待重算。
    ranked: Option<Vec<usize>>,
}

pub struct HistoryStore {
    paths: HistoryPaths,
    cache: CacheStore,
    state: Mutex<StoreState>,
    save_gate: Mutex<()>,
}

impl HistoryStore {
    pub fn new(paths: HistoryPaths) -> Self {
        let cache = CacheStore::new(paths.cache_dir());
        Self {
            paths,
            cache,
            state: Mutex::new(StoreState {
                entries: Vec::new(),
                ranked: None,
            }),
            save_gate: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// 从磁盘读入历史文档，替换内存集合。
    pub async fn load(&self) {
        let paths = self.paths.clone();
        let entries = match tokio::task::spawn_blocking(move || persistence::load_document(&paths))
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("❌ 历史加载任务失败，按空历史启动: {}", e);
                Vec::new()
            }
        };

        let mut state = self.state.lock().await;
        state.entries = entries;
        state.ranked = None;
    }

    /// 整份写出当前集合。
    pub async fn save(&self) -> Result<(), AppError> {
        self.persist().await
    }

    /// 写盘闸门。先占闸门、后取快照：两次并发变更无论谁先落盘，
    /// 较晚的快照一定包含较早的变更，磁盘不会停在旧状态上。
    async fn persist(&self) -> Result<(), AppError> {
        let _gate = self.save_gate.lock().await;
        let snapshot = self.state.lock().await.entries.clone();
        let paths = self.paths.clone();
        tokio::task::spawn_blocking(move || persistence::save_document(&paths, &snapshot))
            .await
            .map_err(|e| AppError::Storage(format!("保存任务执行失败: {}", e)))?
    }

    /// 收录候选条目。命中既有指纹时只刷新时间与使用计数，返回 false；
    /// 新条目插到集合头部，返回 true。两种情况都会触发保存。
    pub async fn add(&self, mut candidate: HistoryEntry) -> Result<bool, AppError> {
        // 图片负载先在状态锁外完成指纹与缓存落盘
        if let Some(bytes) = candidate.pending_image.take() {
            let cache = self.cache.clone();
            let (content_hash, image_ref) = tokio::task::spawn_blocking(move || {
                let content_hash = hash::fingerprint_bytes(&bytes);
                let image_ref = cache.save(&bytes)?;
                Ok::<_, AppError>((content_hash, image_ref))
            })
            .await
            .map_err(|e| AppError::Storage(format!("图片落盘任务失败: {}", e)))??;

            candidate.content_hash = content_hash;
            candidate.image_ref = Some(image_ref);
        }

        let is_new = {
            let mut state = self.state.lock().await;
            let now = Utc::now();

            let is_new = match state
                .entries
                .iter_mut()
                .find(|e| e.content_hash == candidate.content_hash)
            {
                Some(existing) => {
                    existing.touch(now);
                    log::debug!("📋 命中既有条目，刷新时间: {}", existing.preview);
                    false
                }
                None => {
                    candidate.refresh_preview();
                    log::info!("📋 新条目入库: {:?} {}", candidate.kind, candidate.preview);
                    state.entries.insert(0, candidate);
                    true
                }
            };

            state.ranked = None;
            is_new
        };

        self.persist().await?;
        Ok(is_new)
    }

    /// 删除条目并尽力删除它引用的缓存文件。未知 id 是空操作。
    pub async fn remove(&self, id: &str) -> Result<(), AppError> {
        let removed_ref = {
            let mut state = self.state.lock().await;
            let Some(index) = state.entries.iter().position(|e| e.id == id) else {
                return Ok(());
            };
            let removed = state.entries.remove(index);
            state.ranked = None;
            removed.image_ref
        };

        if let Some(name) = removed_ref {
            self.cache.remove(&name);
        }

        self.persist().await
    }

    /// 切换置顶状态，返回新的置顶态；未知 id 返回 `None` 且不保存。
    pub async fn toggle_pin(&self, id: &str) -> Result<Option<bool>, AppError> {
        let pinned = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.entries.iter_mut().find(|e| e.id == id) else {
                return Ok(None);
            };
            entry.is_pinned = !entry.is_pinned;
            entry.pinned_at = entry.is_pinned.then(Utc::now);
            let pinned = entry.is_pinned;
            state.ranked = None;
            pinned
        };

        self.persist().await?;
        Ok(Some(pinned))
    }

    /// 记一次使用：计数加一并刷新使用/复制时间。未知 id 是空操作。
    pub async fn record_use(&self, id: &str) -> Result<(), AppError> {
        {
            let mut state = self.state.lock().await;
            let Some(entry) = state.entries.iter_mut().find(|e| e.id == id) else {
                return Ok(());
            };
            entry.touch(Utc::now());
            state.ranked = None;
        }

        self.persist().await
    }

    /// 清除全部非置顶条目，返回清除数量。
    pub async fn clear_unpinned(&self) -> Result<usize, AppError> {
        let (dropped_refs, removed) = {
            let mut state = self.state.lock().await;
            let mut dropped_refs = Vec::new();
            let before = state.entries.len();
            state.entries.retain(|e| {
                if e.is_pinned {
                    true
                } else {
                    if let Some(name) = &e.image_ref {
                        dropped_refs.push(name.clone());
                    }
                    false
                }
            });
            let removed = before - state.entries.len();
            state.ranked = None;
            (dropped_refs, removed)
        };

        for name in &dropped_refs {
            self.cache.remove(name);
        }
        if removed > 0 {
            log::info!("🧹 已清除非置顶条目 {} 条", removed);
        }

        self.persist().await?;
        Ok(removed)
    }

    /// 保留策略清扫，进程启动时执行一次：
    /// 过期的非置顶条目先走，仍超上限再从最旧的非置顶条目淘汰
    /// （只剩置顶时允许停在上限之上），最后回收孤儿缓存文件。
    pub async fn cleanup(&self) -> Result<(), AppError> {
        let (dropped_refs, expired, evicted, referenced) = {
            let mut state = self.state.lock().await;
            let now = Utc::now();
            let age_cutoff = now - Duration::days(MAX_AGE_DAYS);
            let mut dropped_refs = Vec::new();

            let before = state.entries.len();
            state.entries.retain(|e| {
                if !e.is_pinned && e.copied_at < age_cutoff {
                    if let Some(name) = &e.image_ref {
                        dropped_refs.push(name.clone());
                    }
                    false
                } else {
                    true
                }
            });
            let expired = before - state.entries.len();

            let mut evicted = 0;
            while state.entries.len() > MAX_ITEMS {
                let oldest = state
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| !e.is_pinned)
                    .min_by_key(|(_, e)| e.copied_at)
                    .map(|(index, _)| index);
                let Some(index) = oldest else {
                    break;
                };
                let removed = state.entries.remove(index);
                if let Some(name) = removed.image_ref {
                    dropped_refs.push(name);
                }
                evicted += 1;
            }

            let referenced: HashSet<String> = state
                .entries
                .iter()
                .filter_map(|e| e.image_ref.clone())
                .collect();

            state.ranked = None;
            (dropped_refs, expired, evicted, referenced)
        };

        for name in &dropped_refs {
            self.cache.remove(name);
        }

        let cache = self.cache.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || cache.reclaim_orphans(&referenced)).await
        {
            log::warn!("⚠️ 孤儿回收任务失败: {}", e);
        }

        if expired > 0 || evicted > 0 {
            log::info!("🧹 清理完成: 过期 {} 条, 超额 {} 条", expired, evicted);
        }

        self.persist().await
    }

    /// 五级排序视图（惰性重算，变更后失效）。
    pub async fn ranked_view(&self) -> Vec<HistoryEntry> {
        let mut state = self.state.lock().await;
        if state.ranked.is_none() {
            state.ranked = Some(ranking::ranked_indices(&state.entries, Utc::now()));
        }
        let order = state.ranked.as_ref().map(Vec::as_slice).unwrap_or(&[]);
        order.iter().map(|&i| state.entries[i].clone()).collect()
    }

    pub async fn get(&self, id: &str) -> Option<HistoryEntry> {
        let state = self.state.lock().await;
        state.entries.iter().find(|e| e.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }
}
