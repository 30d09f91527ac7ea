//! 内容指纹模块
//!
//! # 设计思路
//!
//! 历史条目的去重依赖一个稳定的内容指纹：对语义负载做 SHA-256，
//! 截取前 8 字节编码为 16 位十六进制字符串。同样的字节序列无论从
//! 哪条路径进入，指纹必须一致。
//!
//! # 实现思路
//!
//! - 文本先取 UTF-8 字节再哈希，保证与字节哈希同源。
//! - 文件列表按原始顺序以 `|` 连接后哈希路径字符串本身，
//!   不读取文件内容（同一组路径重复复制会命中去重，
//!   重命名后的同内容文件不会）。
//! - 纯函数，无副作用。

use sha2::{Digest, Sha256};

/// 指纹长度：SHA-256 前 8 字节 → 16 位十六进制。
const FINGERPRINT_BYTES: usize = 8;

/// 计算字节序列的内容指纹。
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..FINGERPRINT_BYTES])
}

/// 计算文本的内容指纹（UTF-8 规范化字节）。
pub fn fingerprint_text(text: &str) -> String {
    fingerprint_bytes(text.as_bytes())
}

/// 计算文件列表的内容指纹：路径按序以 `|` 连接后哈希。
pub fn fingerprint_paths(paths: &[String]) -> String {
    fingerprint_text(&paths.join("|"))
}
