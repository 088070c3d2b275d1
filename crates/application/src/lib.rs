//! 应用层实现。
//!
//! 提供在线用户注册表及其上的消息中继用例。注册表由单个
//! actor 任务独占，外部通过可克隆的句柄与之通信。

pub mod error;
pub mod presence;

pub use error::ApplicationError;
pub use presence::{
    ConnectionHandle, ConnectionManager, ConnectionManagerHandle, DropReason, OutboundSender,
    PresenceRegistry, RelayOutcome,
};
