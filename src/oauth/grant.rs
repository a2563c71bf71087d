//! 授权码 (Authorization Grant)
//!
//! 授权码是资源所有者批准授权请求后签发的一次性凭证。生命周期：
//!
//! ```text
//!            ┌──────────► Redeemed  (兑换成功，终态)
//!   Issued ──┼──────────► Expired   (超过有效期，终态)
//!            └──────────► Revoked   (外部撤销或兑换失败，终态)
//! ```
//!
//! 所有终态对兑换请求的表现完全一致（`invalid_grant`）。授权码不会被删除，
//! 保留用于审计和重放检测。

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::client::OAuthClient;
use super::config::ServerConfig;
use super::error::{GrantError, GrantRejection};
use super::pkce::CodeChallenge;
use super::scope::ScopeSet;
use crate::error::{Error, Result, StorageError};
use crate::random::generate_random_base64_url;

/// 授权码状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    /// 已签发，可兑换
    Issued,
    /// 已兑换
    Redeemed,
    /// 已过期
    Expired,
    /// 已撤销
    Revoked,
}

impl GrantStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GrantStatus::Issued)
    }
}

/// 授权码
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    /// 授权码值（高熵、URL 安全）
    pub token: String,

    /// 签发给的客户端 ID
    pub client_id: String,

    /// 资源所有者 ID
    pub resource_owner_id: String,

    /// 授予的 scope
    pub scopes: ScopeSet,

    /// 授权请求使用的重定向 URI
    pub redirect_uri: String,

    /// PKCE challenge（可选）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<CodeChallenge>,

    /// 创建时间
    pub created_at: DateTime<Utc>,

    /// 过期时间（绝对时间，不可续期）
    pub expires_at: DateTime<Utc>,

    /// 兑换时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,

    /// 撤销时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AuthorizationGrant {
    /// 签发新的授权码
    ///
    /// 请求的 scope 必须是客户端允许范围的子集，否则返回 [`GrantError::InvalidScope`]。
    /// 返回的授权码尚未持久化。
    pub fn issue(
        client: &OAuthClient,
        resource_owner_id: impl Into<String>,
        scopes: ScopeSet,
        redirect_uri: impl Into<String>,
        code_challenge: Option<CodeChallenge>,
        config: &ServerConfig,
    ) -> std::result::Result<Self, GrantError> {
        if !scopes.is_subset_of(&client.allowed_scopes(&config.scopes)) {
            return Err(GrantError::InvalidScope);
        }

        let token = generate_random_base64_url(config.token_length)?;
        let now = Utc::now();

        Ok(Self {
            token,
            client_id: client.client_id.clone(),
            resource_owner_id: resource_owner_id.into(),
            scopes,
            redirect_uri: redirect_uri.into(),
            code_challenge,
            created_at: now,
            expires_at: now + config.grant_ttl,
            redeemed_at: None,
            revoked_at: None,
        })
    }

    /// 指定时刻的状态
    ///
    /// 兑换和撤销优先于过期：已兑换的授权码过期后仍报告为 `Redeemed`
    pub fn status_at(&self, now: DateTime<Utc>) -> GrantStatus {
        if self.redeemed_at.is_some() {
            GrantStatus::Redeemed
        } else if self.revoked_at.is_some() {
            GrantStatus::Revoked
        } else if self.expires_at <= now {
            GrantStatus::Expired
        } else {
            GrantStatus::Issued
        }
    }

    /// 当前状态
    pub fn status(&self) -> GrantStatus {
        self.status_at(Utc::now())
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// 是否启用了 PKCE
    pub fn uses_pkce(&self) -> bool {
        self.code_challenge.is_some()
    }

    /// 检查兑换请求是否与授权码匹配
    ///
    /// 依次检查状态、客户端和重定向 URI。授权码携带重定向 URI 时，兑换请求必须提交完全相同的值。
    pub fn validate_for_redemption(
        &self,
        client_id: &str,
        redirect_uri: Option<&str>,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), GrantRejection> {
        check_redeemable(self.status_at(now))?;

        if self.client_id != client_id {
            return Err(GrantRejection::ClientMismatch);
        }

        if !self.redirect_uri.is_empty() && redirect_uri != Some(self.redirect_uri.as_str()) {
            return Err(GrantRejection::RedirectMismatch);
        }

        Ok(())
    }

    /// 标记为已兑换
    ///
    /// 只有 `Issued` 状态的授权码可以兑换；存储实现必须在同一个原子操作内调用此方法
    pub fn mark_redeemed(&mut self, at: DateTime<Utc>) -> std::result::Result<(), GrantRejection> {
        check_redeemable(self.status_at(at))?;
        self.redeemed_at = Some(at);
        Ok(())
    }

    /// 标记为已撤销
    pub fn mark_revoked(&mut self, at: DateTime<Utc>) -> std::result::Result<(), GrantRejection> {
        check_redeemable(self.status_at(at))?;
        self.revoked_at = Some(at);
        Ok(())
    }
}

fn check_redeemable(status: GrantStatus) -> std::result::Result<(), GrantRejection> {
    match status {
        GrantStatus::Issued => Ok(()),
        GrantStatus::Redeemed => Err(GrantRejection::Redeemed),
        GrantStatus::Revoked => Err(GrantRejection::Revoked),
        GrantStatus::Expired => Err(GrantRejection::Expired),
    }
}

/// 授权码存储 trait
///
/// `redeem` 和 `revoke` 是条件状态转换（compare-and-set）：只有当存储中的授权码仍处于
/// `Issued` 状态时才会生效并返回 `true`。并发调用中至多一个能成功。
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// 保存新的授权码，授权码值重复时返回 `StorageError::AlreadyExists`
    async fn insert(&self, grant: &AuthorizationGrant) -> Result<()>;

    /// 通过授权码值查找
    async fn find_by_token(&self, token: &str) -> Result<Option<AuthorizationGrant>>;

    /// 原子地将 `Issued` 授权码标记为已兑换
    async fn redeem(&self, token: &str, at: DateTime<Utc>) -> Result<bool>;

    /// 原子地将 `Issued` 授权码标记为已撤销
    async fn revoke(&self, token: &str, at: DateTime<Utc>) -> Result<bool>;
}

/// 内存授权码存储
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    grants: RwLock<HashMap<String, AuthorizationGrant>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 存储的授权码数量（包括终态）
    pub fn len(&self) -> Result<usize> {
        let grants = self.grants.read().map_err(|_| Error::lock_poisoned())?;
        Ok(grants.len())
    }

    fn transition(
        &self,
        token: &str,
        apply: impl FnOnce(&mut AuthorizationGrant) -> std::result::Result<(), GrantRejection>,
    ) -> Result<bool> {
        let mut grants = self.grants.write().map_err(|_| Error::lock_poisoned())?;
        Ok(match grants.get_mut(token) {
            Some(grant) => apply(grant).is_ok(),
            None => false,
        })
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn insert(&self, grant: &AuthorizationGrant) -> Result<()> {
        let mut grants = self.grants.write().map_err(|_| Error::lock_poisoned())?;
        if grants.contains_key(&grant.token) {
            return Err(Error::Storage(StorageError::AlreadyExists(
                "authorization grant".into(),
            )));
        }
        grants.insert(grant.token.clone(), grant.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<AuthorizationGrant>> {
        let grants = self.grants.read().map_err(|_| Error::lock_poisoned())?;
        Ok(grants.get(token).cloned())
    }

    async fn redeem(&self, token: &str, at: DateTime<Utc>) -> Result<bool> {
        self.transition(token, |grant| grant.mark_redeemed(at))
    }

    async fn revoke(&self, token: &str, at: DateTime<Utc>) -> Result<bool> {
        self.transition(token, |grant| grant.mark_revoked(at))
    }
}
