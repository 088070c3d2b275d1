use application::ApplicationError;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header, HeaderValue, Method, Uri},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

/// WebSocket 端点路径
pub const SOCKET_PATH: &str = "/socket";

/// 外部协作方提供的路由（认证、消息 CRUD），缺省时对应路径不存在
#[derive(Default)]
pub struct Collaborators {
    pub auth: Option<Router>,
    pub messages: Option<Router>,
}

#[derive(Debug, Serialize)]
struct PingResponse {
    msg: &'static str,
}

pub fn router(state: AppState, collaborators: Collaborators) -> Router {
    let mut app = Router::new()
        .route("/ping", get(ping))
        .route(SOCKET_PATH, get(socket_upgrade))
        .with_state(state);

    if let Some(auth) = collaborators.auth {
        app = app.nest("/api/auth", auth);
    }
    if let Some(messages) = collaborators.messages {
        app = app.nest("/api/messages", messages);
    }

    app.fallback(not_found).layer(TraceLayer::new_for_http())
}

/// 根据来源白名单构造 CORS 层，允许携带凭证
///
/// 白名单中出现 `*` 时回显请求来源，因为携带凭证时不能使用通配符。
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, header::InvalidHeaderValue> {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values = origins
            .iter()
            .map(|o| HeaderValue::from_str(o))
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        msg: "Ping Successful",
    })
}

async fn socket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    if !state.presence.is_running() {
        tracing::warn!("WebSocket upgrade rejected: presence manager stopped");
        return Err(ApplicationError::PresenceUnavailable.into());
    }

    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state).run()))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("no route for {}", uri.path()))
}
