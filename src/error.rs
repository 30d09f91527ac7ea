//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，替代各模块中分散的
//! `.map_err(|e| e.to_string())`、`format!(...)`、`expect()` 等不一致模式。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `std::io::Error` / `serde_json::Error` / `image::ImageError`
//!   提供 `From` 转换，无需手动 map。
//! - 尽力而为的外部动作（粘贴注入、孤儿文件清理）在调用点消化错误，
//!   不向上传播。

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 剪贴板读写操作失败
    #[error("剪贴板操作失败: {0}")]
    Clipboard(String),

    /// 图片编解码错误
    #[error("图片处理失败: {0}")]
    Image(#[from] image::ImageError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 历史文档序列化 / 反序列化失败
    #[error("历史数据解析失败: {0}")]
    Serde(#[from] serde_json::Error),

    /// 存储目录不可用
    #[error("存储目录不可用: {0}")]
    Storage(String),

    /// 输入模拟失败
    #[error("输入模拟失败: {0}")]
    Input(String),
}
