//! 内容寻址缓存模块
//!
//! # 设计思路
//!
//! 图片等二进制负载统一落在独立的缓存目录里，文件名由内容指纹加
//! 扩展名构成。同样的字节写多少次都只占一份磁盘文件，条目只持有
//! 文件名这个非拥有引用，文件生命周期由历史仓库统一驱动。
//!
//! # 实现思路
//!
//! - 目录按需创建，首次写入前才建目录。
//! - `save` 先查指纹文件是否已存在，存在即跳过写盘（幂等）。
//! - 扩展名用 `infer` 按文件签名探测，探测不出时按 PNG 处理
//!   （捕获路径总是 PNG 编码）。
//! - 孤儿回收拿引用集合做保留名单，逐个删除未引用文件，
//!   单个删除失败只记日志不中断。

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::hash;

#[derive(Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| AppError::Storage(format!("创建缓存目录失败: {}", e)))
    }

    /// 按内容指纹保存字节，返回缓存文件名。已存在的指纹直接复用。
    pub fn save(&self, bytes: &[u8]) -> Result<String, AppError> {
        let ext = infer::get(bytes)
            .map(|kind| kind.extension())
            .unwrap_or("png");
        let name = format!("{}.{}", hash::fingerprint_bytes(bytes), ext);

        self.ensure_dir()?;
        let path = self.dir.join(&name);
        if !path.exists() {
            fs::write(&path, bytes)?;
            log::debug!("💾 缓存文件已写入: {} ({} 字节)", name, bytes.len());
        }

        Ok(name)
    }

    /// 缓存文件名 → 完整路径。
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// 尽力删除一个缓存文件；文件不存在或删除失败都不算错。
    pub fn remove(&self, name: &str) -> bool {
        let path = self.resolve(name);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                log::debug!("🧹 删除缓存文件失败 '{}': {}", path.display(), e);
                false
            }
        }
    }

    /// 删除引用集合之外的所有缓存文件，返回删除数量。
    pub fn reclaim_orphans(&self, referenced: &HashSet<String>) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                log::warn!("🧹 读取缓存目录失败，跳过孤儿回收: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if referenced.contains(&name) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    log::debug!("🧹 删除孤儿文件失败 '{}': {}", path.display(), e);
                }
            }
        }

        if removed > 0 {
            log::info!("🧹 孤儿缓存回收完成，删除 {} 个文件", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("{}_{}", prefix, nanos))
    }

    fn png_like_bytes(tail: &[u8]) -> Vec<u8> {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(tail);
        bytes
    }

    #[test]
    fn save_is_idempotent_for_identical_bytes() {
        let dir = unique_temp_dir("clip_vault_cache_idempotent");
        let store = CacheStore::new(dir.clone());
        let bytes = png_like_bytes(b"payload");

        let first = store.save(&bytes).expect("first save failed");
        let second = store.save(&bytes).expect("second save failed");

        assert_eq!(first, second, "identical bytes should map to one name");
        let count = fs::read_dir(&dir).expect("read cache dir failed").count();
        assert_eq!(count, 1, "identical payload should produce one file");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_sniffs_png_extension_from_signature() {
        let dir = unique_temp_dir("clip_vault_cache_ext");
        let store = CacheStore::new(dir.clone());

        let name = store.save(&png_like_bytes(b"x")).expect("save failed");
        assert!(name.ends_with(".png"), "png signature should yield .png name");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn resolve_joins_cache_dir() {
        let dir = unique_temp_dir("clip_vault_cache_resolve");
        let store = CacheStore::new(dir.clone());
        assert_eq!(store.resolve("abc.png"), dir.join("abc.png"));
    }

    #[test]
    fn remove_is_silent_for_missing_file() {
        let dir = unique_temp_dir("clip_vault_cache_remove_missing");
        let store = CacheStore::new(dir.clone());
        assert!(!store.remove("no_such_file.png"));
    }

    #[test]
    fn reclaim_orphans_keeps_referenced_and_removes_rest() {
        let dir = unique_temp_dir("clip_vault_cache_reclaim");
        let store = CacheStore::new(dir.clone());

        let kept = store.save(&png_like_bytes(b"kept")).expect("save kept failed");
        let orphan = store.save(&png_like_bytes(b"orphan")).expect("save orphan failed");
        assert_ne!(kept, orphan);

        let mut referenced = HashSet::new();
        referenced.insert(kept.clone());

        let removed = store.reclaim_orphans(&referenced);

        assert_eq!(removed, 1, "exactly one orphan should be removed");
        assert!(store.resolve(&kept).exists(), "referenced file should be kept");
        assert!(!store.resolve(&orphan).exists(), "orphan file should be removed");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn reclaim_orphans_on_missing_dir_is_noop() {
        let dir = unique_temp_dir("clip_vault_cache_missing_dir");
        let store = CacheStore::new(dir);
        assert_eq!(store.reclaim_orphans(&HashSet::new()), 0);
    }
}
