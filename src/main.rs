//! # 剪贴板历史引擎 — 应用入口
//!
//! 本文件仅负责初始化与主循环：日志、设置、历史加载、启动期清理、
//! 监听线程，然后逐条消化变化通知。业务逻辑分布在各子模块中，
//! 详见 `lib.rs` 架构文档。

use std::sync::Arc;

use clip_vault::history::{HistoryPaths, HistoryStore};
use clip_vault::{clipboard, input, settings};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let default_root = match settings::default_data_root() {
        Ok(root) => root,
        Err(e) => {
            log::error!("❌ 无法确定数据目录，引擎无法启动: {}", e);
            return;
        }
    };
    let user_settings = settings::load_settings(&default_root);
    let data_root = settings::resolve_data_root(&user_settings, &default_root);
    log::info!("📂 数据目录: {}", data_root.display());

    let store = Arc::new(HistoryStore::new(HistoryPaths::new(data_root)));
    store.load().await;
    log::info!("📜 历史加载完成，共 {} 条", store.len().await);

    // 启动期保留策略：过期与超量条目此时统一清掉
    if let Err(e) = store.cleanup().await {
        log::warn!("⚠️ 启动清理失败: {}", e);
    }

    // 弹出展示端之前要先记住粘贴目标；引擎常驻时开机先记一次
    input::capture_target_context();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let debounce_ms = user_settings
        .debounce_ms
        .unwrap_or(clipboard::listener::DEBOUNCE_DEFAULT_MS);
    clipboard::start_monitoring(tx, debounce_ms);

    log::info!("✅ 剪贴板监听已启动，进入捕获循环");
    while rx.recv().await.is_some() {
        clipboard::capture_and_store(&store).await;
    }

    log::info!("监听通道关闭，引擎退出");
}
