#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{ConnectionManager, ConnectionManagerHandle, PresenceRegistry};
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use web_api::{router, AppState, Collaborators, SOCKET_PATH};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub manager: ConnectionManagerHandle,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, SOCKET_PATH)
    }

    pub async fn connect(&self) -> WsClient {
        let (stream, _) = connect_async(self.ws_url()).await.expect("ws connect");
        stream
    }

    /// 等待用户出现在注册表中（或从中消失）
    pub async fn wait_online(&self, user: &str, online: bool) {
        let user = UserId::from(user);
        timeout(Duration::from_secs(2), async {
            loop {
                let users = self.manager.online_users().await.expect("online users");
                if users.contains(&user) == online {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("presence did not converge");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn spawn_server() -> TestServer {
    let (manager, _task) = ConnectionManager::spawn(64);
    let state = AppState::new(Arc::new(manager.clone()));
    let app = router(state, Collaborators::default());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        addr,
        manager,
        shutdown: Some(shutdown_tx),
    }
}

pub async fn send_event(ws: &mut WsClient, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    ws.send(Message::Text(frame.into())).await.expect("ws send");
}

pub async fn send_raw(ws: &mut WsClient, text: &str) {
    ws.send(Message::Text(text.to_string().into()))
        .await
        .expect("ws send raw");
}

/// 读取下一个文本帧并解析为 JSON；超时返回 None
pub async fn recv_event(ws: &mut WsClient, wait: Duration) -> Option<Value> {
    timeout(wait, async {
        while let Some(frame) = ws.next().await {
            match frame.expect("ws frame") {
                Message::Text(text) => {
                    return Some(serde_json::from_str(text.as_str()).expect("json frame"))
                }
                Message::Close(_) => return None,
                _ => continue,
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}
