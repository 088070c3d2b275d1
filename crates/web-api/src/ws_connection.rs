use std::ops::ControlFlow;
use std::sync::Arc;

use application::{ApplicationError, ConnectionHandle, OutboundSender, PresenceRegistry};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientEvent, ConnectionId, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol;
use crate::state::AppState;

/// 单个 WebSocket 连接
///
/// 连接建立时不属于任何用户，收到 `add-user` 后才进入注册表；
/// 同一连接可以先后声明多个用户。连接断开时，注册表中仍指向
/// 本连接的绑定会被移除。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    connection_id: ConnectionId,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState) -> Self {
        let connection_id = ConnectionId::new();
        tracing::info!(connection_id = %connection_id, "WebSocket 连接已建立");
        Self {
            socket,
            state,
            connection_id,
        }
    }

    /// 运行连接主循环，直到任一方向结束
    pub async fn run(self) {
        let Self {
            socket,
            state,
            connection_id,
        } = self;
        let (mut sender, mut incoming) = socket.split();

        // 注册表持有 outbound_tx 的克隆，中继消息经由它进入写任务
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => {
                        match cmd {
                            WsCommand::SendPong(data) => {
                                if sender.send(WsMessage::Pong(data)).await.is_err() {
                                    tracing::warn!("Failed to send pong message");
                                    break;
                                }
                            }
                        }
                    }
                    Some(event) = outbound_rx.recv() => {
                        let payload = match protocol::encode_server_event(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, "failed to serialize payload");
                                continue;
                            }
                        };
                        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                            tracing::warn!("Failed to send text message");
                            break;
                        }
                    }
                    else => break,
                }
            }
            tracing::debug!("WebSocket发送任务结束");
        });

        // 接收任务：处理来自客户端的帧
        let session = Session {
            presence: state.presence.clone(),
            connection_id,
            outbound: outbound_tx,
            commands: cmd_tx,
        };
        let mut recv_task = tokio::spawn(async move {
            while let Some(frame) = incoming.next().await {
                let message = match frame {
                    Ok(message) => message,
                    Err(err) => {
                        tracing::debug!(error = %err, "WebSocket读取失败");
                        break;
                    }
                };
                if session.handle_incoming(message).await.is_break() {
                    break;
                }
            }
            tracing::debug!("WebSocket接收任务结束");
        });

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        match state.presence.disconnect(connection_id).await {
            Ok(removed) => {
                tracing::info!(
                    connection_id = %connection_id,
                    removed = removed.len(),
                    "WebSocket连接已断开，在线状态已清理"
                );
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    connection_id = %connection_id,
                    "Failed to cleanup user presence"
                );
            }
        }
    }
}

/// 接收任务持有的连接上下文
struct Session {
    presence: Arc<dyn PresenceRegistry>,
    connection_id: ConnectionId,
    outbound: OutboundSender,
    commands: mpsc::Sender<WsCommand>,
}

impl Session {
    async fn handle_incoming(&self, message: WsMessage) -> ControlFlow<()> {
        match message {
            WsMessage::Text(text) => self.handle_text(text.as_str()).await,
            WsMessage::Close(_) => {
                tracing::info!(connection_id = %self.connection_id, "WebSocket收到关闭消息");
                ControlFlow::Break(())
            }
            WsMessage::Ping(data) => {
                if self.commands.send(WsCommand::SendPong(data)).await.is_err() {
                    tracing::warn!("Failed to send pong command");
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            }
            WsMessage::Pong(_) => ControlFlow::Continue(()),
            WsMessage::Binary(_) => {
                tracing::debug!(connection_id = %self.connection_id, "忽略二进制帧");
                ControlFlow::Continue(())
            }
        }
    }

    async fn handle_text(&self, text: &str) -> ControlFlow<()> {
        let event = match protocol::decode_client_event(text) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(connection_id = %self.connection_id, error = %err, "忽略无效帧");
                return ControlFlow::Continue(());
            }
        };

        tracing::debug!(connection_id = %self.connection_id, event = event.name(), "收到客户端事件");

        let result = match event {
            ClientEvent::AddUser(user_id) => {
                let handle = ConnectionHandle::new(self.connection_id, self.outbound.clone());
                self.presence.register(user_id, handle).await
            }
            ClientEvent::SendMsg(payload) => self
                .presence
                .relay(self.connection_id, payload)
                .await
                .map(|outcome| {
                    tracing::debug!(connection_id = %self.connection_id, ?outcome, "send-msg 已处理");
                }),
        };

        match result {
            Ok(()) => ControlFlow::Continue(()),
            Err(err @ ApplicationError::PresenceUnavailable) => {
                tracing::error!(
                    connection_id = %self.connection_id,
                    error = %err,
                    "在线状态管理器不可用，关闭连接"
                );
                ControlFlow::Break(())
            }
            Err(err) => {
                tracing::warn!(connection_id = %self.connection_id, error = %err, "事件处理失败");
                ControlFlow::Continue(())
            }
        }
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Bytes),
}
