//! 展示投影层
//!
//! # 设计思路
//!
//! 仓库只认原始条目，展示端需要的都是派生物：筛选后的列表、相对
//! 时间标签、类型图标、缩略图、短暂的状态提示。这些派生物集中在
//! 本模块计算，随取随算，从不写回仓库。
//!
//! # 实现思路
//!
//! - 筛选：`/` 前缀按类型选取，其余做大小写不敏感的子串匹配。
//! - 搜索防抖：新查询令旧的待算作废（纪元计数 + 150ms 延迟）。
//! - 状态提示：带约 2 秒自动消失期限的一行文案。
//! - 缩略图：信号量限 3 路并发解码，结果按缓存文件名记在有界
//!   LRU 里，输出 base64 PNG data URL。

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Local, Utc};
use lru::LruCache;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};

use crate::cache::CacheStore;
use crate::error::AppError;
use crate::history::{EntryKind, HistoryEntry, HistoryStore};
use crate::input;

/// 搜索防抖窗口。
pub const SEARCH_DEBOUNCE_MS: u64 = 150;
/// 状态提示的自动消失期限。
pub const STATUS_DISMISS_MS: u64 = 2000;
/// 缩略图最长边。
const THUMBNAIL_MAX_EDGE: u32 = 256;
/// 缩略图并发解码上限。
const THUMBNAIL_CONCURRENCY: usize = 3;
/// 缩略图备忘容量（条目数）。
const THUMBNAIL_MEMO_CAP: usize = 64;

/// 展示端看到的一行条目：原始字段加派生的显示文案。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub id: String,
    pub kind: EntryKind,
    pub preview: String,
    pub is_pinned: bool,
    pub use_count: u32,
    pub source_app: Option<String>,
    pub image_ref: Option<String>,
    /// 相对时间标签，如 "刚刚"、"5 分钟前"。
    pub time_label: String,
    pub icon: String,
    pub type_label: String,
}

impl EntryView {
    pub fn from_entry(entry: &HistoryEntry, now: DateTime<Utc>) -> Self {
        Self {
            id: entry.id.clone(),
            kind: entry.kind,
            preview: entry.preview.clone(),
            is_pinned: entry.is_pinned,
            use_count: entry.use_count,
            source_app: entry.source_app.clone(),
            image_ref: entry.image_ref.clone(),
            time_label: relative_time_label(entry.copied_at, now),
            icon: kind_icon(entry.kind).to_string(),
            type_label: type_label(entry),
        }
    }
}

fn kind_icon(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::PlainText => "📝",
        EntryKind::RichText => "🎨",
        EntryKind::Image => "🖼️",
        EntryKind::FileList => "📁",
    }
}

/// 类型标签。文件列表不走固定文案：单项按路径自身描述，
/// 多项给出文件夹/文件构成。
fn type_label(entry: &HistoryEntry) -> String {
    match entry.kind {
        EntryKind::PlainText => "文本".to_string(),
        EntryKind::RichText => "富文本".to_string(),
        EntryKind::Image => "图片".to_string(),
        EntryKind::FileList => {
            file_list_label(entry.file_paths.as_deref().unwrap_or_default())
        }
    }
}

/// 文件列表的类型描述："文件夹"、"PDF 文档"、"2个文件夹 + 3个文件"。
fn file_list_label(paths: &[String]) -> String {
    match paths {
        [] => "文件".to_string(),
        [only] => single_path_label(only),
        many => {
            let folders = many
                .iter()
                .filter(|p| std::path::Path::new(p.as_str()).is_dir())
                .count();
            let files = many.len() - folders;

            let mut parts = Vec::new();
            if folders > 0 {
                parts.push(format!("{}个文件夹", folders));
            }
            if files > 0 {
                parts.push(format!("{}个文件", files));
            }
            parts.join(" + ")
        }
    }
}

/// 单个路径的类型描述：目录归"文件夹"，文件按扩展名归类。
/// 扩展名同时认 `/` 与 `\` 分隔符，路径多来自另一套平台。
fn single_path_label(path: &str) -> String {
    if std::path::Path::new(path).is_dir() {
        return "文件夹".to_string();
    }

    let name = path
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path);
    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
        _ => return "文件".to_string(),
    };

    match ext.to_lowercase().as_str() {
        "txt" => "文本文件".to_string(),
        "doc" | "docx" => "Word 文档".to_string(),
        "xls" | "xlsx" => "Excel 表格".to_string(),
        "ppt" | "pptx" => "PowerPoint".to_string(),
        "pdf" => "PDF 文档".to_string(),
        "zip" | "rar" | "7z" => "压缩文件".to_string(),
        "exe" => "应用程序".to_string(),
        "dll" => "DLL 文件".to_string(),
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" => "图片".to_string(),
        "mp3" | "wav" | "flac" | "aac" => "音频".to_string(),
        "mp4" | "avi" | "mkv" | "mov" => "视频".to_string(),
        "html" | "htm" => "网页".to_string(),
        "css" => "样式表".to_string(),
        "js" => "JavaScript".to_string(),
        "json" => "JSON".to_string(),
        "xml" => "XML".to_string(),
        "cs" => "C# 源码".to_string(),
        "py" => "Python".to_string(),
        "java" => "Java".to_string(),
        "cpp" | "c" | "h" => "C/C++".to_string(),
        "md" => "Markdown".to_string(),
        "sql" => "SQL".to_string(),
        "iso" => "镜像文件".to_string(),
        "lnk" => "快捷方式".to_string(),
        _ => format!("{} 文件", ext),
    }
}

/// 相对时间标签：一分钟内"刚刚"，随后按分/时/天，超过一周落到日期。
pub fn relative_time_label(copied_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(copied_at);
    let minutes = elapsed.num_minutes();

    if minutes < 1 {
        "刚刚".to_string()
    } else if minutes < 60 {
        format!("{} 分钟前", minutes)
    } else if elapsed.num_hours() < 24 {
        format!("{} 小时前", elapsed.num_hours())
    } else if elapsed.num_days() < 7 {
        format!("{} 天前", elapsed.num_days())
    } else {
        copied_at
            .with_timezone(&Local)
            .format("%Y-%m-%d")
            .to_string()
    }
}

/// 查询是否命中条目。
///
/// 以 `/` 开头的查询按类型选取：`/img`·`/image`、`/file`·`/files`、
/// `/text`、`/rich`；未知前缀不构成限制，全部命中。其余查询对预览
/// 与文本内容做大小写不敏感的子串匹配。
pub fn matches_filter(entry: &HistoryEntry, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }

    if let Some(prefix) = query.strip_prefix('/') {
        return match prefix.to_lowercase().as_str() {
            "img" | "image" => entry.kind == EntryKind::Image,
            "file" | "files" => entry.kind == EntryKind::FileList,
            "text" => entry.kind == EntryKind::PlainText,
            "rich" => entry.kind == EntryKind::RichText,
            _ => true,
        };
    }

    let needle = query.to_lowercase();
    if entry.preview.to_lowercase().contains(&needle) {
        return true;
    }
    entry
        .text_content
        .as_deref()
        .map(|t| t.to_lowercase().contains(&needle))
        .unwrap_or(false)
}

/// 对排序视图套用筛选并投影成展示行。
pub async fn filtered_view(store: &HistoryStore, query: &str) -> Vec<EntryView> {
    let now = Utc::now();
    store
        .ranked_view()
        .await
        .iter()
        .filter(|e| matches_filter(e, query))
        .map(|e| EntryView::from_entry(e, now))
        .collect()
}

/// 搜索防抖器。每次调用把纪元加一并等待防抖窗口；
/// 期间再有新查询进来，旧调用醒来后发现纪元变了就放弃。
#[derive(Clone, Default)]
pub struct SearchDebouncer {
    epoch: Arc<AtomicU64>,
}

impl SearchDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 防抖后计算筛选视图；被更新的查询截胡时返回 `None`。
    pub async fn run(&self, store: &HistoryStore, query: &str) -> Option<Vec<EntryView>> {
        let ticket = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::time::sleep(Duration::from_millis(SEARCH_DEBOUNCE_MS)).await;

        if self.epoch.load(Ordering::SeqCst) != ticket {
            return None;
        }
        Some(filtered_view(store, query).await)
    }
}

/// 一行状态提示，约 2 秒后自动消失。
#[derive(Debug, Clone)]
pub struct StatusMessage {
    text: String,
    expires_at: Instant,
}

impl StatusMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            expires_at: Instant::now() + Duration::from_millis(STATUS_DISMISS_MS),
        }
    }

    pub fn text_at(&self, now: Instant) -> Option<&str> {
        (now < self.expires_at).then_some(self.text.as_str())
    }

    pub fn text(&self) -> Option<&str> {
        self.text_at(Instant::now())
    }
}

/// 条目动作的结果：是否真的发生了变更 + 要显示的状态提示。
#[derive(Debug)]
pub struct ActionOutcome {
    pub changed: bool,
    pub status: Option<StatusMessage>,
}

impl ActionOutcome {
    fn noop() -> Self {
        Self {
            changed: false,
            status: None,
        }
    }

    fn done(text: &str) -> Self {
        Self {
            changed: true,
            status: Some(StatusMessage::new(text)),
        }
    }
}

/// 粘贴条目（完整格式或仅纯文本）。
pub async fn paste_action(
    store: &HistoryStore,
    id: &str,
    plain_text_only: bool,
) -> Result<ActionOutcome, AppError> {
    if input::paste_entry(store, id, plain_text_only).await? {
        Ok(ActionOutcome::done("已粘贴"))
    } else {
        Ok(ActionOutcome::noop())
    }
}

/// 删除条目。
pub async fn delete_action(store: &HistoryStore, id: &str) -> Result<ActionOutcome, AppError> {
    if store.get(id).await.is_none() {
        return Ok(ActionOutcome::noop());
    }
    store.remove(id).await?;
    Ok(ActionOutcome::done("已删除"))
}

/// 切换置顶状态，提示文案跟随切换后的状态。
pub async fn toggle_pin_action(store: &HistoryStore, id: &str) -> Result<ActionOutcome, AppError> {
    match store.toggle_pin(id).await? {
        Some(true) => Ok(ActionOutcome::done("已置顶")),
        Some(false) => Ok(ActionOutcome::done("已取消置顶")),
        None => Ok(ActionOutcome::noop()),
    }
}

/// 清除所有非置顶条目。
pub async fn clear_unpinned_action(store: &HistoryStore) -> Result<ActionOutcome, AppError> {
    let removed = store.clear_unpinned().await?;
    if removed == 0 {
        return Ok(ActionOutcome::noop());
    }
    Ok(ActionOutcome::done("已清除非置顶记录"))
}

/// 缩略图服务：并发受限的解码 + 有界备忘。
pub struct ThumbnailService {
    permits: Arc<Semaphore>,
    memo: Mutex<LruCache<String, String>>,
}

impl Default for ThumbnailService {
    fn default() -> Self {
        Self::new()
    }
}

impl ThumbnailService {
    pub fn new() -> Self {
        let cap = NonZeroUsize::new(THUMBNAIL_MEMO_CAP).unwrap_or(NonZeroUsize::MIN);
        Self {
            permits: Arc::new(Semaphore::new(THUMBNAIL_CONCURRENCY)),
            memo: Mutex::new(LruCache::new(cap)),
        }
    }

    /// 取图片条目的缩略图 data URL，命中备忘直接返回。
    pub async fn data_url(
        &self,
        cache: &CacheStore,
        image_ref: &str,
    ) -> Result<String, AppError> {
        if let Some(hit) = self.memo.lock().await.get(image_ref) {
            return Ok(hit.clone());
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AppError::Storage(format!("缩略图并发闸门已关闭: {}", e)))?;

        let path = cache.resolve(image_ref);
        let url = tokio::task::spawn_blocking(move || decode_thumbnail(&path))
            .await
            .map_err(|e| AppError::Storage(format!("缩略图任务失败: {}", e)))??;

        self.memo
            .lock()
            .await
            .put(image_ref.to_string(), url.clone());
        Ok(url)
    }
}

/// 解码、降采样并编码为 base64 PNG data URL。
fn decode_thumbnail(path: &std::path::Path) -> Result<String, AppError> {
    let decoded = image::open(path)?;
    let scaled = decoded.thumbnail(THUMBNAIL_MAX_EDGE, THUMBNAIL_MAX_EDGE);

    let mut png = Vec::new();
    scaled.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;

    Ok(format!("data:image/png;base64,{}", BASE64.encode(&png)))
}
