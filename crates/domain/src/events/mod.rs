//! 线路事件定义
//!
//! 客户端与服务端之间双向事件通道上的事件名与负载。

pub mod relay_event;

// 重新导出事件类型
pub use relay_event::*;
