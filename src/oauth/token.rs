//! 访问令牌
//!
//! 提供访问令牌实体、令牌存储以及 RFC 6749 Section 5.1 的令牌响应。

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scope::ScopeSet;
use crate::error::{Error, Result, StorageError};

/// OAuth Token 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Bearer Token
    #[default]
    Bearer,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Bearer => write!(f, "Bearer"),
        }
    }
}

/// OAuth 2.0 Token 响应
///
/// 符合 RFC 6749 Section 5.1 的 token 响应结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// 访问令牌
    pub access_token: String,

    /// Token 类型（序列化为 `"bearer"`）
    pub token_type: TokenType,

    /// 剩余有效时间（秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// 刷新令牌（可选）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// 授权范围（空格分隔）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// 创建新的 Token 响应
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: TokenType::Bearer,
            expires_in: None,
            refresh_token: None,
            scope: None,
        }
    }

    /// 从访问令牌构建响应
    ///
    /// `expires_in` 为 `now` 时刻的剩余有效时间，复用的令牌报告其剩余时间而非完整有效期
    pub fn from_access_token(token: &AccessToken, now: DateTime<Utc>) -> Self {
        let mut response = Self::new(&token.token).with_expires_in(token.expires_in(now));
        if let Some(refresh_token) = &token.refresh_token {
            response = response.with_refresh_token(refresh_token);
        }
        if !token.scopes.is_empty() {
            response = response.with_scope(token.scopes.to_string());
        }
        response
    }

    /// 设置过期时间
    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    /// 设置刷新令牌
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// 设置授权范围
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// OAuth 访问令牌
///
/// 由授权码兑换产生，用于服务端存储和验证
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Token 值
    pub token: String,

    /// 关联的客户端 ID
    pub client_id: String,

    /// 资源所有者 ID
    pub resource_owner_id: String,

    /// 授权范围（与来源授权码相同）
    pub scopes: ScopeSet,

    /// 创建时间
    pub created_at: DateTime<Utc>,

    /// 过期时间
    pub expires_at: DateTime<Utc>,

    /// 刷新令牌
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// 被此令牌取代的上一个令牌
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_token: Option<String>,

    /// 撤销时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// 指定时刻是否有效（未撤销且未过期）
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    /// 检查 token 是否有效
    pub fn is_valid(&self) -> bool {
        self.is_live_at(Utc::now())
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// 剩余有效时间（秒），已过期时为 0
    pub fn expires_in(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((self.expires_at - now).num_seconds()).unwrap_or(0)
    }

    /// 撤销 token，已撤销时返回 `false`
    pub fn revoke(&mut self, at: DateTime<Utc>) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        self.revoked_at = Some(at);
        true
    }
}

/// 访问令牌存储 trait
#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    /// 保存新令牌，令牌值重复时返回 `StorageError::AlreadyExists`
    async fn insert(&self, token: &AccessToken) -> Result<()>;

    /// 通过令牌值查找
    async fn find_by_token(&self, token: &str) -> Result<Option<AccessToken>>;

    /// 通过刷新令牌查找
    async fn find_by_refresh_token(&self, refresh_token: &str) -> Result<Option<AccessToken>>;

    /// 查找 (client, owner) 最近创建的有效令牌
    async fn last_live_for(
        &self,
        client_id: &str,
        resource_owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>>;

    /// 撤销令牌，只有令牌存在且尚未撤销时返回 `true`
    async fn revoke(&self, token: &str, at: DateTime<Utc>) -> Result<bool>;
}

/// 内存访问令牌存储
#[derive(Debug, Default)]
pub struct InMemoryAccessTokenStore {
    tokens: RwLock<HashMap<String, AccessToken>>,
}

impl InMemoryAccessTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 存储的令牌数量（包括已撤销的）
    pub fn len(&self) -> Result<usize> {
        let tokens = self.tokens.read().map_err(|_| Error::lock_poisoned())?;
        Ok(tokens.len())
    }

    /// 指定 (client, owner) 的全部令牌，按创建时间排序
    pub fn tokens_for(&self, client_id: &str, resource_owner_id: &str) -> Result<Vec<AccessToken>> {
        let tokens = self.tokens.read().map_err(|_| Error::lock_poisoned())?;
        let mut matching: Vec<_> = tokens
            .values()
            .filter(|t| t.client_id == client_id && t.resource_owner_id == resource_owner_id)
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.created_at);
        Ok(matching)
    }
}

#[async_trait]
impl AccessTokenStore for InMemoryAccessTokenStore {
    async fn insert(&self, token: &AccessToken) -> Result<()> {
        let mut tokens = self.tokens.write().map_err(|_| Error::lock_poisoned())?;
        if tokens.contains_key(&token.token) {
            return Err(Error::Storage(StorageError::AlreadyExists(
                "access token".into(),
            )));
        }
        tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let tokens = self.tokens.read().map_err(|_| Error::lock_poisoned())?;
        Ok(tokens.get(token).cloned())
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> Result<Option<AccessToken>> {
        let tokens = self.tokens.read().map_err(|_| Error::lock_poisoned())?;
        Ok(tokens
            .values()
            .find(|t| t.refresh_token.as_deref() == Some(refresh_token))
            .cloned())
    }

    async fn last_live_for(
        &self,
        client_id: &str,
        resource_owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>> {
        let tokens = self.tokens.read().map_err(|_| Error::lock_poisoned())?;
        Ok(tokens
            .values()
            .filter(|t| {
                t.client_id == client_id
                    && t.resource_owner_id == resource_owner_id
                    && t.is_live_at(now)
            })
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn revoke(&self, token: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut tokens = self.tokens.write().map_err(|_| Error::lock_poisoned())?;
        Ok(tokens.get_mut(token).is_some_and(|t| t.revoke(at)))
    }
}
