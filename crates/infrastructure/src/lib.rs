//! 基础设施层实现。
//!
//! 提供外部文档数据库的连通性检查。数据库本身由 HTTP 协作方使用，
//! 中继层不依赖它。

pub mod database;

pub use database::{parse_target, ping, ping_and_log, DatabaseTarget, PingError};
