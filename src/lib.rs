//! # 剪贴板历史引擎 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     展示端（任意宿主）                     │
//! │        列表 / 搜索框 / 缩略图 / 状态提示                   │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ view（只读投影 + 条目动作）
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕              引擎 (Rust)                          │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ history ──── HistoryStore：去重·置顶·保留·五级排序     │
//! │  │   ├─ entry        条目与预览                           │
//! │  │   ├─ ranking      排序视图                             │
//! │  │   └─ persistence  整份 JSON 读写 + 坏档备份             │
//! │  │                                                       │
//! │  ├─ clipboard ── 监控 + 抑制窗口 + 捕获快照                │
//! │  │   ├─ capture      按优先级读系统剪贴板                  │
//! │  │   └─ listener     防抖与重启退避参数                    │
//! │  │                                                       │
//! │  ├─ cache ────── 按指纹命名的图片缓存文件                  │
//! │  ├─ hash ─────── SHA-256 内容指纹                         │
//! │  ├─ input ────── 剪贴板写出 + 目标激活 + Ctrl+V 注入       │
//! │  ├─ settings ─── 数据目录与防抖配置                        │
//! │  └─ view ─────── 筛选·防抖·状态提示·缩略图                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，所有对外操作的错误出口 |
//! | [`history`] | 条目集合的唯一权威：去重、置顶、使用计数、保留、排序 |
//! | [`clipboard`] | 剪贴板监控、自写抑制、带重试的捕获快照 |
//! | [`cache`] | 图片字节按指纹落盘，孤儿文件回收 |
//! | [`hash`] | 文本 / 字节 / 路径列表的内容指纹 |
//! | [`input`] | 多格式剪贴板写出、目标窗口激活、模拟粘贴 |
//! | [`settings`] | 数据目录解析与用户可调参数 |
//! | [`view`] | 展示投影：筛选、搜索防抖、状态提示、缩略图 |

pub mod error;
pub mod cache;
pub mod clipboard;
pub mod hash;
pub mod history;
pub mod input;
pub mod settings;
pub mod view;
