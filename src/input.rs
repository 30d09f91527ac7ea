//! 输入与注入模块（分层门面）
//!
//! - `services`：业务编排（按条目类型组装剪贴板负载、粘贴动作）
//! - `platform`：平台相关实现（Win32 / 非 Windows 占位）

#[path = "input/platform.rs"]
pub(crate) mod platform;
#[path = "input/services.rs"]
mod services;

pub use services::{capture_target_context, inject_paste, paste_entry, set_clipboard};
