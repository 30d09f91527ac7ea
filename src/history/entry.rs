//! 历史条目数据结构
//!
//! ## 职责
//! - 定义 `HistoryEntry` / `EntryKind` 及其序列化形态
//! - 构造各类型条目并维护派生的预览文本
//!
//! ## 约束
//! - 每种类型只填充对应的负载字段（文本 / 图片引用 / 路径列表）
//! - `pinned_at` 有值当且仅当 `is_pinned` 为真
//! - `content_hash` 一经设置不再变化；图片条目的指纹在缓存落盘
//!   阶段补齐（捕获路径不做重负载哈希）

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::hash;

/// 预览文本的最大字符数，超出部分截断并追加省略标记。
pub const PREVIEW_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    PlainText,
    RichText,
    Image,
    FileList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub kind: EntryKind,

    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub html_content: Option<String>,
    #[serde(default)]
    pub rtf_content: Option<String>,

    /// 缓存文件名（非拥有引用，文件归缓存仓库管）。
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub file_paths: Option<Vec<String>>,

    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub preview: String,

    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub pinned_at: Option<DateTime<Utc>>,

    pub copied_at: DateTime<Utc>,

    #[serde(default)]
    pub use_count: u32,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub source_app: Option<String>,

    /// 捕获阶段暂存的 PNG 字节，缓存落盘后清空，永不持久化。
    #[serde(skip)]
    pub pending_image: Option<Vec<u8>>,
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 生成 32 位十六进制条目标识。
fn new_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let raw = format!("{}:{}:{}", nanos, std::process::id(), seq);
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(&digest[..16])
}

impl HistoryEntry {
    fn bare(kind: EntryKind, source_app: Option<String>) -> Self {
        Self {
            id: new_id(),
            kind,
            text_content: None,
            html_content: None,
            rtf_content: None,
            image_ref: None,
            file_paths: None,
            content_hash: String::new(),
            preview: String::new(),
            is_pinned: false,
            pinned_at: None,
            copied_at: Utc::now(),
            use_count: 0,
            last_used_at: None,
            source_app,
            pending_image: None,
        }
    }

    pub fn plain_text(text: String, source_app: Option<String>) -> Self {
        let mut entry = Self::bare(EntryKind::PlainText, source_app);
        entry.content_hash = hash::fingerprint_text(&text);
        entry.text_content = Some(text);
        entry.refresh_preview();
        entry
    }

    /// 富文本条目：纯文本表示必有，HTML / RTF 原样保留。
    /// 指纹取自纯文本表示，与纯文本条目同源。
    pub fn rich_text(
        text: String,
        html: Option<String>,
        rtf: Option<String>,
        source_app: Option<String>,
    ) -> Self {
        let mut entry = Self::bare(EntryKind::RichText, source_app);
        entry.content_hash = hash::fingerprint_text(&text);
        entry.text_content = Some(text);
        entry.html_content = html;
        entry.rtf_content = rtf;
        entry.refresh_preview();
        entry
    }

    /// 图片条目：只带内存中的 PNG 字节，指纹与缓存引用由
    /// 落盘流水线补齐。
    pub fn image(png_bytes: Vec<u8>, source_app: Option<String>) -> Self {
        let mut entry = Self::bare(EntryKind::Image, source_app);
        entry.pending_image = Some(png_bytes);
        entry.refresh_preview();
        entry
    }

    pub fn file_list(paths: Vec<String>, source_app: Option<String>) -> Self {
        let mut entry = Self::bare(EntryKind::FileList, source_app);
        entry.content_hash = hash::fingerprint_paths(&paths);
        entry.file_paths = Some(paths);
        entry.refresh_preview();
        entry
    }

    /// 重新复制或再次使用：刷新复制时间并累计使用次数。
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.use_count += 1;
        self.last_used_at = Some(now);
        self.copied_at = now;
    }

    /// 重算预览文本（换行压成空格，超长截断）。
    pub fn refresh_preview(&mut self) {
        let content = match self.kind {
            EntryKind::PlainText | EntryKind::RichText => {
                self.text_content.clone().unwrap_or_default()
            }
            EntryKind::Image => "[图片]".to_string(),
            EntryKind::FileList => file_list_preview(self.file_paths.as_deref().unwrap_or(&[])),
        };

        if content.is_empty() {
            self.preview = String::new();
            return;
        }

        let flattened: String = content
            .replace("\r\n", " ")
            .replace(['\n', '\r'], " ");

        let char_count = flattened.chars().count();
        self.preview = if char_count > PREVIEW_MAX_CHARS {
            let truncated: String = flattened.chars().take(PREVIEW_MAX_CHARS).collect();
            format!("{}...", truncated)
        } else {
            flattened
        };
    }
}

/// 文件列表的预览内容：单个取文件名，多个附带总数。
fn file_list_preview(paths: &[String]) -> String {
    match paths.len() {
        0 => "[文件]".to_string(),
        1 => file_name_of(&paths[0]),
        n => format!("{} 等{}项", file_name_of(&paths[0]), n),
    }
}

/// 取路径末段。历史里存的多是 Windows 路径，所以 `/` 和 `\` 都算分隔符,
/// 不能依赖宿主平台的 `Path` 语义。
fn file_name_of(path: &str) -> String {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string())
}
