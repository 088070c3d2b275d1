//! 实时聊天中继核心领域模型
//!
//! 包含用户与连接标识、线路事件定义以及相关错误类型。

pub mod errors;
pub mod events;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use value_objects::*;
