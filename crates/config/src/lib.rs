//! 统一配置中心
//!
//! 提供中继服务的全局配置管理，包括：
//! - HTTP 服务监听地址与 CORS 白名单
//! - 文档数据库连接
//! - 在线状态管理器的命令队列
//!
//! 加载优先级：默认值 -> 配置文件（APP_CONFIG_FILE） -> APP_* 环境变量 ->
//! 兼容旧部署的环境变量（PORT / CLIENT_URL / MONGO_URL）。旧变量优先级最高，
//! 原有部署脚本无需修改即可继续生效。

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;
use validator::Validate;

/// 默认允许的前端来源
pub const DEFAULT_CLIENT_URL: &str = "http://localhost:3000";
/// 默认文档数据库地址
pub const DEFAULT_DATABASE_URL: &str = "mongodb://127.0.0.1:27017/chat";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// 服务配置
    #[validate(nested)]
    pub server: ServerConfig,
    /// 数据库配置
    #[validate(nested)]
    pub database: DatabaseConfig,
    /// 中继配置
    #[validate(nested)]
    pub relay: RelayConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub url: String,
    #[validate(range(min = 1))]
    pub connect_timeout_ms: u64,
}

/// 中继配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RelayConfig {
    /// 在线状态管理器命令队列容量
    #[validate(range(min = 1))]
    pub command_buffer: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 5000,
                cors_origins: vec![DEFAULT_CLIENT_URL.into()],
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.into(),
                connect_timeout_ms: 3000,
            },
            relay: RelayConfig {
                command_buffer: 1024,
            },
        }
    }
}

impl AppConfig {
    /// 从进程环境加载配置
    pub fn load() -> Result<Self, ConfigError> {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));

        if let Ok(path) = env::var("APP_CONFIG_FILE") {
            fig = if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig.merge(Yaml::file(path))
            } else if path.ends_with(".json") {
                fig.merge(Json::file(path))
            } else {
                fig.merge(Toml::file(path))
            };
        }

        fig = fig.merge(Env::prefixed("APP_").split("__"));
        fig = Self::merge_legacy_env(fig, |name| env::var(name).ok())?;

        Self::from_figment(fig)
    }

    /// 从已构建的 figment 中提取并校验配置
    pub fn from_figment(fig: Figment) -> Result<Self, ConfigError> {
        let cfg: AppConfig = fig.extract().map_err(Box::new)?;
        cfg.validate()?;
        cfg.check()?;
        Ok(cfg)
    }

    /// 兼容旧部署使用的 PORT / CLIENT_URL / MONGO_URL
    fn merge_legacy_env<F>(mut fig: Figment, lookup: F) -> Result<Figment, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("PORT") {
            let port: u16 = raw.trim().parse().map_err(|_| ConfigError::InvalidEnvVar {
                name: "PORT".into(),
                value: raw.clone(),
            })?;
            fig = fig.merge(Serialized::default("server.port", port));
        }

        if let Some(raw) = lookup("CLIENT_URL") {
            let origins: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            fig = fig.merge(Serialized::default("server.cors_origins", origins));
        }

        if let Some(url) = lookup("MONGO_URL") {
            fig = fig.merge(Serialized::default("database.url", url));
        }

        Ok(fig)
    }

    /// validator 覆盖不到的检查
    fn check(&self) -> Result<(), ConfigError> {
        if self.server.cors_origins.iter().any(|o| o.trim().is_empty()) {
            return Err(ConfigError::InvalidServerConfig(
                "CORS origin cannot be empty".to_string(),
            ));
        }

        if !self.database.url.contains("://") {
            return Err(ConfigError::InvalidDatabaseUrl(format!(
                "missing scheme in '{}'",
                self.database.url
            )));
        }

        Ok(())
    }

    /// 监听地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 脱敏后的配置描述（用于日志）
    pub fn sanitize(&self) -> String {
        let mut cfg = self.clone();
        cfg.database.url = redact_credentials(&cfg.database.url);
        format!("{:?}", cfg)
    }
}

/// 隐藏 URL 中的用户名和密码
///
/// 无法解析的 URL（例如多主机的副本集地址）整体替换，避免凭据出现在日志中。
pub fn redact_credentials(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return "[unparseable url]".to_string();
    };
    if url.username().is_empty() && url.password().is_none() {
        return url.to_string();
    }
    if url.set_username("REDACTED").is_err() || url.set_password(None).is_err() {
        return "[unparseable url]".to_string();
    }
    url.to_string()
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid environment variable {name}={value}")]
    InvalidEnvVar { name: String, value: String },
    #[error("Failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}
