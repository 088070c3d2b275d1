use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::UserId;

/// 客户端 -> 服务端：声明当前连接所属用户
pub const EVENT_ADD_USER: &str = "add-user";
/// 客户端 -> 服务端：向指定用户发送消息
pub const EVENT_SEND_MSG: &str = "send-msg";
/// 服务端 -> 接收方：转发的消息内容。拼写与既有客户端保持一致，不要修正。
pub const EVENT_MSG_RECIEVE: &str = "msg-recieve";

/// `send-msg` 事件负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayPayload {
    pub to: UserId,
    #[serde(default)]
    pub msg: Value,
}

/// 客户端发往服务端的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    AddUser(UserId),
    SendMsg(RelayPayload),
}

impl ClientEvent {
    /// 由事件名与原始负载构造客户端事件
    pub fn from_parts(event: &str, data: Value) -> DomainResult<Self> {
        match event {
            EVENT_ADD_USER => match data {
                Value::String(id) => Ok(Self::AddUser(UserId::from(id))),
                other => Err(DomainError::invalid_payload(
                    event,
                    format!("expected user id string, got {}", json_kind(&other)),
                )),
            },
            EVENT_SEND_MSG => serde_json::from_value::<RelayPayload>(data)
                .map(Self::SendMsg)
                .map_err(|err| DomainError::invalid_payload(event, err.to_string())),
            other => Err(DomainError::unknown_event(other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AddUser(_) => EVENT_ADD_USER,
            Self::SendMsg(_) => EVENT_SEND_MSG,
        }
    }
}

/// 服务端发往客户端的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// 只携带消息内容，不转发发送者身份
    MsgRecieve(Value),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MsgRecieve(_) => EVENT_MSG_RECIEVE,
        }
    }

    pub fn data(&self) -> &Value {
        match self {
            Self::MsgRecieve(msg) => msg,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
