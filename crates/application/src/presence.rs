use std::collections::HashMap;

use chrono::{DateTime, Utc};
use domain::{ConnectionId, RelayPayload, ServerEvent, UserId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::ApplicationError;

/// 连接写任务的入口，任何持有者都可以向该连接推送事件
pub type OutboundSender = mpsc::UnboundedSender<ServerEvent>;

/// 注册表中保存的连接句柄
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub connection_id: ConnectionId,
    pub outbound: OutboundSender,
}

impl ConnectionHandle {
    pub fn new(connection_id: ConnectionId, outbound: OutboundSender) -> Self {
        Self {
            connection_id,
            outbound,
        }
    }
}

/// 单次中继的结果，仅用于日志和测试，不会反馈给客户端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered { connection_id: ConnectionId },
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// 接收方未注册
    RecipientOffline,
    /// 接收方就是发送连接本身
    SelfTarget,
    /// 接收方连接的写通道已关闭
    ChannelClosed,
}

/// 在线状态注册表trait
#[async_trait::async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// 将用户绑定到连接，覆盖已有绑定
    async fn register(
        &self,
        user_id: UserId,
        handle: ConnectionHandle,
    ) -> Result<(), ApplicationError>;

    /// 将消息转发给接收方当前绑定的连接
    async fn relay(
        &self,
        from: ConnectionId,
        payload: RelayPayload,
    ) -> Result<RelayOutcome, ApplicationError>;

    /// 连接断开时调用，返回被移除的用户
    async fn disconnect(&self, connection_id: ConnectionId)
        -> Result<Vec<UserId>, ApplicationError>;

    /// 当前在线用户快照
    async fn online_users(&self) -> Result<Vec<UserId>, ApplicationError>;

    /// 管理器是否仍在接收命令
    fn is_running(&self) -> bool;
}

enum PresenceCommand {
    Register {
        user_id: UserId,
        handle: ConnectionHandle,
        reply: oneshot::Sender<()>,
    },
    Relay {
        from: ConnectionId,
        payload: RelayPayload,
        reply: oneshot::Sender<RelayOutcome>,
    },
    Disconnect {
        connection_id: ConnectionId,
        reply: oneshot::Sender<Vec<UserId>>,
    },
    OnlineUsers {
        reply: oneshot::Sender<Vec<UserId>>,
    },
    Shutdown,
}

struct Registration {
    handle: ConnectionHandle,
    registered_at: DateTime<Utc>,
}

/// 在线用户连接管理器
///
/// 独占注册表，按到达顺序逐条处理命令，因此注册表本身无需加锁。
pub struct ConnectionManager {
    registry: HashMap<UserId, Registration>,
    commands: mpsc::Receiver<PresenceCommand>,
}

impl ConnectionManager {
    /// 启动管理器任务，返回句柄与任务的 JoinHandle
    pub fn spawn(buffer: usize) -> (ConnectionManagerHandle, JoinHandle<()>) {
        let (sender, commands) = mpsc::channel(buffer.max(1));
        let manager = Self {
            registry: HashMap::new(),
            commands,
        };
        let task = tokio::spawn(manager.run());
        (ConnectionManagerHandle { sender }, task)
    }

    async fn run(mut self) {
        tracing::info!("在线状态管理器已启动");

        while let Some(command) = self.commands.recv().await {
            match command {
                PresenceCommand::Register {
                    user_id,
                    handle,
                    reply,
                } => {
                    self.register(user_id, handle);
                    let _ = reply.send(());
                }
                PresenceCommand::Relay {
                    from,
                    payload,
                    reply,
                } => {
                    let outcome = self.relay(from, payload);
                    let _ = reply.send(outcome);
                }
                PresenceCommand::Disconnect {
                    connection_id,
                    reply,
                } => {
                    let removed = self.disconnect(connection_id);
                    let _ = reply.send(removed);
                }
                PresenceCommand::OnlineUsers { reply } => {
                    let mut users: Vec<UserId> = self.registry.keys().cloned().collect();
                    users.sort();
                    let _ = reply.send(users);
                }
                PresenceCommand::Shutdown => break,
            }
        }

        tracing::info!(online = self.registry.len(), "在线状态管理器已停止");
    }

    fn register(&mut self, user_id: UserId, handle: ConnectionHandle) {
        let connection_id = handle.connection_id;
        let previous = self.registry.insert(
            user_id.clone(),
            Registration {
                handle,
                registered_at: Utc::now(),
            },
        );

        match previous {
            Some(old) if old.handle.connection_id != connection_id => {
                tracing::debug!(
                    user_id = %user_id,
                    old_connection = %old.handle.connection_id,
                    old_registered_at = %old.registered_at,
                    new_connection = %connection_id,
                    "用户绑定被新连接覆盖"
                );
            }
            _ => {
                tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户上线");
            }
        }
    }

    fn relay(&mut self, from: ConnectionId, payload: RelayPayload) -> RelayOutcome {
        let RelayPayload { to, msg } = payload;

        let Some(registration) = self.registry.get(&to) else {
            tracing::debug!(to = %to, from = %from, "接收方不在线，消息丢弃");
            return RelayOutcome::Dropped(DropReason::RecipientOffline);
        };

        let target = registration.handle.connection_id;
        if target == from {
            tracing::debug!(to = %to, connection_id = %from, "接收方为发送连接本身，消息丢弃");
            return RelayOutcome::Dropped(DropReason::SelfTarget);
        }

        if registration
            .handle
            .outbound
            .send(ServerEvent::MsgRecieve(msg))
            .is_err()
        {
            tracing::warn!(to = %to, connection_id = %target, "接收方写通道已关闭，移除过期绑定");
            self.registry.remove(&to);
            return RelayOutcome::Dropped(DropReason::ChannelClosed);
        }

        tracing::debug!(to = %to, from = %from, connection_id = %target, "消息已转发");
        RelayOutcome::Delivered {
            connection_id: target,
        }
    }

    fn disconnect(&mut self, connection_id: ConnectionId) -> Vec<UserId> {
        let mut removed = Vec::new();
        self.registry.retain(|user_id, registration| {
            if registration.handle.connection_id == connection_id {
                removed.push(user_id.clone());
                false
            } else {
                true
            }
        });

        for user_id in &removed {
            tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户下线");
        }
        removed
    }
}

/// 管理器句柄，克隆成本低，注入到各个请求/连接处理器中
#[derive(Clone)]
pub struct ConnectionManagerHandle {
    sender: mpsc::Sender<PresenceCommand>,
}

impl ConnectionManagerHandle {
    async fn request<T>(
        &self,
        label: &'static str,
        build: impl FnOnce(oneshot::Sender<T>) -> PresenceCommand,
    ) -> Result<T, ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| ApplicationError::PresenceUnavailable)?;
        response.await.map_err(|_| ApplicationError::NoReply(label))
    }

    /// 通知管理器停止。已停止时同样返回成功。
    pub async fn shutdown(&self) {
        if self.sender.send(PresenceCommand::Shutdown).await.is_err() {
            tracing::debug!("在线状态管理器已经停止");
        }
    }
}

#[async_trait::async_trait]
impl PresenceRegistry for ConnectionManagerHandle {
    async fn register(
        &self,
        user_id: UserId,
        handle: ConnectionHandle,
    ) -> Result<(), ApplicationError> {
        self.request("register", |reply| PresenceCommand::Register {
            user_id,
            handle,
            reply,
        })
        .await
    }

    async fn relay(
        &self,
        from: ConnectionId,
        payload: RelayPayload,
    ) -> Result<RelayOutcome, ApplicationError> {
        self.request("relay", |reply| PresenceCommand::Relay {
            from,
            payload,
            reply,
        })
        .await
    }

    async fn disconnect(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Vec<UserId>, ApplicationError> {
        self.request("disconnect", |reply| PresenceCommand::Disconnect {
            connection_id,
            reply,
        })
        .await
    }

    async fn online_users(&self) -> Result<Vec<UserId>, ApplicationError> {
        self.request("online_users", |reply| PresenceCommand::OnlineUsers { reply })
            .await
    }

    fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;

    fn connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(ConnectionId::new(), tx), rx)
    }

    fn payload(to: &str, msg: serde_json::Value) -> RelayPayload {
        RelayPayload {
            to: UserId::from(to),
            msg,
        }
    }

    #[tokio::test]
    async fn relay_delivers_exactly_once_to_registered_user() {
        let (manager, _task) = ConnectionManager::spawn(16);
        let (sender, _sender_rx) = connection();
        let (bob, mut bob_rx) = connection();
        let bob_connection = bob.connection_id;

        manager.register(UserId::from("bob"), bob).await.unwrap();
        let outcome = manager
            .relay(sender.connection_id, payload("bob", json!("hi")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RelayOutcome::Delivered {
                connection_id: bob_connection
            }
        );
        assert_eq!(bob_rx.try_recv().unwrap(), ServerEvent::MsgRecieve(json!("hi")));
        assert_eq!(bob_rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn relay_to_unregistered_user_is_silently_dropped() {
        let (manager, _task) = ConnectionManager::spawn(16);
        let (sender, mut sender_rx) = connection();

        let outcome = manager
            .relay(sender.connection_id, payload("carol", json!({"text": "hi"})))
            .await
            .unwrap();

        assert_eq!(outcome, RelayOutcome::Dropped(DropReason::RecipientOffline));
        assert_eq!(sender_rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn later_registration_wins() {
        let (manager, _task) = ConnectionManager::spawn(16);
        let (sender, _sender_rx) = connection();
        let (first, mut first_rx) = connection();
        let (second, mut second_rx) = connection();

        manager.register(UserId::from("u"), first).await.unwrap();
        manager.register(UserId::from("u"), second).await.unwrap();
        manager
            .relay(sender.connection_id, payload("u", json!("m")))
            .await
            .unwrap();

        assert_eq!(second_rx.try_recv().unwrap(), ServerEvent::MsgRecieve(json!("m")));
        // 被覆盖的句柄随注册表条目一起释放，旧连接收不到任何事件
        assert_eq!(first_rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[tokio::test]
    async fn alice_to_bob_reaches_only_bob() {
        let (manager, _task) = ConnectionManager::spawn(16);
        let (alice, mut alice_rx) = connection();
        let (bob, mut bob_rx) = connection();
        let alice_connection = alice.connection_id;

        manager.register(UserId::from("alice"), alice).await.unwrap();
        manager.register(UserId::from("bob"), bob).await.unwrap();
        manager
            .relay(alice_connection, payload("bob", json!({"text": "hi"})))
            .await
            .unwrap();

        assert_eq!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::MsgRecieve(json!({"text": "hi"}))
        );
        assert_eq!(alice_rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn relay_to_own_connection_is_not_echoed() {
        let (manager, _task) = ConnectionManager::spawn(16);
        let (alice, mut alice_rx) = connection();
        let alice_connection = alice.connection_id;

        manager.register(UserId::from("alice"), alice).await.unwrap();
        let outcome = manager
            .relay(alice_connection, payload("alice", json!("note to self")))
            .await
            .unwrap();

        assert_eq!(outcome, RelayOutcome::Dropped(DropReason::SelfTarget));
        assert_eq!(alice_rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn disconnect_removes_only_that_connections_entries() {
        let (manager, _task) = ConnectionManager::spawn(16);
        let (old, _old_rx) = connection();
        let (new, mut new_rx) = connection();
        let (shared, _shared_rx) = connection();
        let old_connection = old.connection_id;
        let shared_connection = shared.connection_id;

        manager.register(UserId::from("dave"), old).await.unwrap();
        manager.register(UserId::from("dave"), new).await.unwrap();
        manager.register(UserId::from("erin"), shared.clone()).await.unwrap();
        manager.register(UserId::from("frank"), shared).await.unwrap();

        // 旧连接已被覆盖，断开时不影响新绑定
        assert!(manager.disconnect(old_connection).await.unwrap().is_empty());

        let removed = manager.disconnect(shared_connection).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(
            manager.online_users().await.unwrap(),
            vec![UserId::from("dave")]
        );

        let (sender, _sender_rx) = connection();
        manager
            .relay(sender.connection_id, payload("dave", json!("still here")))
            .await
            .unwrap();
        assert_eq!(
            new_rx.try_recv().unwrap(),
            ServerEvent::MsgRecieve(json!("still here"))
        );

        let outcome = manager
            .relay(sender.connection_id, payload("erin", json!("gone")))
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Dropped(DropReason::RecipientOffline));
    }

    #[tokio::test]
    async fn closed_outbound_channel_evicts_registration() {
        let (manager, _task) = ConnectionManager::spawn(16);
        let (ghost, ghost_rx) = connection();
        let (sender, _sender_rx) = connection();
        drop(ghost_rx);

        manager.register(UserId::from("ghost"), ghost).await.unwrap();
        let outcome = manager
            .relay(sender.connection_id, payload("ghost", json!("boo")))
            .await
            .unwrap();

        assert_eq!(outcome, RelayOutcome::Dropped(DropReason::ChannelClosed));
        assert!(manager.online_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn handle_fails_after_shutdown() {
        let (manager, task) = ConnectionManager::spawn(16);
        manager.shutdown().await;
        task.await.unwrap();

        assert!(!manager.is_running());
        let result = manager.online_users().await;
        assert!(matches!(result, Err(ApplicationError::PresenceUnavailable)));

        // 重复关闭不报错
        manager.shutdown().await;
    }
}
