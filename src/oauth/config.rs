//! 授权服务器配置
//!
//! [`ServerConfig`] 在启动时构建一次，之后以 `Arc<ServerConfig>` 的形式共享给
//! 授权端点、令牌签发器和授权码兑换协调器，运行期间不可变。
//!
//! ```rust
//! use chrono::Duration;
//! use authgrant::oauth::{ScopeConfig, ServerConfig};
//!
//! let config = ServerConfig::new()
//!     .with_grant_ttl(Duration::minutes(5))
//!     .with_refresh_token(true)
//!     .with_scopes(ScopeConfig::new(
//!         "public".parse().unwrap(),
//!         "write".parse().unwrap(),
//!     ));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.access_token_expires_in(), 7200);
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::scope::ScopeConfig;
use crate::error::{ConfigError, Error, Result};

/// 本地应用使用的“带外”重定向 URI（RFC 8252 之前的约定）
pub const NATIVE_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// 授权服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 授权码有效期
    #[serde(with = "duration_secs")]
    pub grant_ttl: Duration,

    /// 访问令牌有效期
    #[serde(with = "duration_secs")]
    pub access_token_ttl: Duration,

    /// 是否为新签发的访问令牌附带刷新令牌
    pub use_refresh_token: bool,

    /// scope 未变化时是否复用已有的有效访问令牌
    pub reuse_access_token: bool,

    /// 默认 / 可选 scope
    pub scopes: ScopeConfig,

    /// 本地应用的带外重定向 URI
    pub native_redirect_uri: String,

    /// 授权码、访问令牌和刷新令牌的随机字节数
    pub token_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grant_ttl: Duration::minutes(10),
            access_token_ttl: Duration::hours(2),
            use_refresh_token: false,
            reuse_access_token: true,
            scopes: ScopeConfig::default(),
            native_redirect_uri: NATIVE_REDIRECT_URI.to_string(),
            token_length: 32,
        }
    }
}

impl ServerConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置授权码有效期
    pub fn with_grant_ttl(mut self, ttl: Duration) -> Self {
        self.grant_ttl = ttl;
        self
    }

    /// 设置访问令牌有效期
    pub fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    /// 设置是否签发刷新令牌
    pub fn with_refresh_token(mut self, enabled: bool) -> Self {
        self.use_refresh_token = enabled;
        self
    }

    /// 设置是否复用访问令牌
    pub fn with_reuse_access_token(mut self, enabled: bool) -> Self {
        self.reuse_access_token = enabled;
        self
    }

    /// 设置 scope 配置
    pub fn with_scopes(mut self, scopes: ScopeConfig) -> Self {
        self.scopes = scopes;
        self
    }

    /// 设置带外重定向 URI
    pub fn with_native_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.native_redirect_uri = uri.into();
        self
    }

    /// 设置令牌随机字节数
    pub fn with_token_length(mut self, length: usize) -> Self {
        self.token_length = length;
        self
    }

    /// 访问令牌的 `expires_in`（秒）
    pub fn access_token_expires_in(&self) -> i64 {
        self.access_token_ttl.num_seconds()
    }

    /// 验证配置是否有效
    pub fn validate(&self) -> Result<()> {
        if self.grant_ttl <= Duration::zero() {
            return Err(invalid("grant_ttl", "must be positive"));
        }

        if self.access_token_ttl <= Duration::zero() {
            return Err(invalid("access_token_ttl", "must be positive"));
        }

        // 16 字节以下的令牌可被暴力枚举
        if self.token_length < 16 {
            return Err(invalid(
                "token_length",
                format!("{} bytes is below the 16 byte minimum", self.token_length),
            ));
        }

        if self.scopes.default_scopes.overlaps(&self.scopes.optional_scopes) {
            return Err(invalid(
                "scopes",
                "default and optional scopes must not overlap",
            ));
        }

        Ok(())
    }
}

fn invalid(key: &str, message: impl Into<String>) -> Error {
    Error::Config(ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    })
}

/// 以秒为单位序列化 `chrono::Duration`
mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Duration::try_seconds(secs)
            .ok_or_else(|| serde::de::Error::custom(format!("duration out of range: {}", secs)))
    }
}
