//! Document store connectivity check

use std::time::Duration;

use mongodb::{bson::doc, options::ClientOptions, Client};
use thiserror::Error;
use tokio::time::timeout;

const APP_NAME: &str = "chat-relay";

#[derive(Debug, Error)]
pub enum PingError {
    #[error("invalid database url: {0}")]
    InvalidUrl(#[source] mongodb::error::Error),
    #[error("failed to create database client: {0}")]
    Client(#[source] mongodb::error::Error),
    #[error("ping to {hosts} failed: {source}")]
    Ping {
        hosts: String,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("database did not answer within {0:?}")]
    Timeout(Duration),
}

/// 连接串解析后的目标（不含凭据）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub hosts: Vec<String>,
    pub database: Option<String>,
}

impl DatabaseTarget {
    fn from_options(options: &ClientOptions) -> Self {
        Self {
            hosts: options.hosts.iter().map(ToString::to_string).collect(),
            database: options.default_database.clone(),
        }
    }

    pub fn hosts_display(&self) -> String {
        self.hosts.join(",")
    }
}

/// 解析连接串，`+srv` 地址会在此处做 DNS 查询
pub async fn parse_target(url: &str) -> Result<(DatabaseTarget, ClientOptions), PingError> {
    let options = ClientOptions::parse(url).await.map_err(PingError::InvalidUrl)?;
    Ok((DatabaseTarget::from_options(&options), options))
}

/// 通过驱动握手并发送 `ping`，成功说明对端确实是可用的文档数据库
pub async fn ping(url: &str, connect_timeout: Duration) -> Result<DatabaseTarget, PingError> {
    timeout(connect_timeout, ping_inner(url, connect_timeout))
        .await
        .map_err(|_| PingError::Timeout(connect_timeout))?
}

async fn ping_inner(url: &str, connect_timeout: Duration) -> Result<DatabaseTarget, PingError> {
    let (target, mut options) = parse_target(url).await?;
    options.app_name = Some(APP_NAME.to_string());
    options.connect_timeout = Some(connect_timeout);
    options.server_selection_timeout = Some(connect_timeout);

    let client = Client::with_options(options).map_err(PingError::Client)?;
    let database = target.database.as_deref().unwrap_or("admin");
    client
        .database(database)
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|source| PingError::Ping {
            hosts: target.hosts_display(),
            source,
        })?;

    Ok(target)
}

/// 检查并记录结果。失败只记录日志，不阻止启动。
pub async fn ping_and_log(url: &str, connect_timeout: Duration) -> bool {
    let display_url = config::redact_credentials(url);
    match ping(url, connect_timeout).await {
        Ok(target) => {
            tracing::info!(
                url = %display_url,
                hosts = %target.hosts_display(),
                "DB Connection Successful"
            );
            true
        }
        Err(err) => {
            tracing::error!(url = %display_url, error = %err, "数据库连接失败，服务继续启动");
            false
        }
    }
}
