//! 套接字帧编解码
//!
//! 每个文本帧是一个 JSON 对象：`{"event": <事件名>, "data": <负载>}`。

use domain::{ClientEvent, DomainError, ServerEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Deserialize)]
struct IncomingFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize)]
struct OutgoingFrame<'a> {
    event: &'a str,
    data: &'a Value,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Event(#[from] DomainError),
}

/// 解析客户端发来的文本帧
pub fn decode_client_event(text: &str) -> Result<ClientEvent, ProtocolError> {
    let frame: IncomingFrame = serde_json::from_str(text)?;
    Ok(ClientEvent::from_parts(&frame.event, frame.data)?)
}

/// 序列化发往客户端的事件
pub fn encode_server_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutgoingFrame {
        event: event.name(),
        data: event.data(),
    })
}
