//! 访问令牌签发
//!
//! [`AccessTokenIssuer`] 把一个已兑换的授权码转换为访问令牌。同一 (client, owner)
//! 在 scope 不变时复用已有的有效令牌；scope 变化时撤销旧令牌并签发新令牌，
//! 因此每个 (client, owner) 至多存在一个有效令牌。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::config::ServerConfig;
use super::grant::AuthorizationGrant;
use super::token::{AccessToken, AccessTokenStore};
use crate::audit::{AuditLogger, NoOpAuditLogger, SecurityEvent};
use crate::error::{Error, Result, StorageError};
use crate::random::generate_random_base64_url;

/// 令牌值冲突时的最大重试次数
const MAX_TOKEN_RETRIES: usize = 3;

/// 签发结果
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// 访问令牌
    pub token: AccessToken,
    /// 是否为复用的已有令牌
    pub reused: bool,
}

/// 访问令牌签发器
pub struct AccessTokenIssuer {
    store: Arc<dyn AccessTokenStore>,
    config: Arc<ServerConfig>,
    audit: Arc<dyn AuditLogger>,
}

impl AccessTokenIssuer {
    /// 创建签发器，配置无效时返回错误
    pub fn new(store: Arc<dyn AccessTokenStore>, config: Arc<ServerConfig>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            config,
            audit: Arc::new(NoOpAuditLogger),
        })
    }

    /// 设置审计日志记录器
    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// 令牌存储
    pub fn store(&self) -> &Arc<dyn AccessTokenStore> {
        &self.store
    }

    /// 为授权码签发或复用访问令牌
    ///
    /// 每次调用至多创建一个新令牌、撤销一个旧令牌
    #[instrument(
        skip(self, grant),
        fields(client_id = %grant.client_id, owner_id = %grant.resource_owner_id),
        level = "debug"
    )]
    pub async fn issue_or_reuse(&self, grant: &AuthorizationGrant) -> Result<IssuedToken> {
        let now = Utc::now();
        let previous = self
            .store
            .last_live_for(&grant.client_id, &grant.resource_owner_id, now)
            .await?;

        if let Some(existing) = previous.as_ref() {
            if self.config.reuse_access_token && existing.scopes == grant.scopes {
                debug!("reusing live access token with identical scopes");
                self.audit.log(SecurityEvent::access_token_reused(
                    &grant.client_id,
                    &grant.resource_owner_id,
                ));
                return Ok(IssuedToken {
                    token: existing.clone(),
                    reused: true,
                });
            }
        }

        let token = self
            .create(grant, previous.as_ref().map(|t| t.token.clone()), now)
            .await?;

        if let Some(previous) = previous {
            if self.store.revoke(&previous.token, now).await? {
                debug!("revoked superseded access token");
                self.audit.log(SecurityEvent::access_token_revoked(
                    &grant.client_id,
                    &grant.resource_owner_id,
                    "superseded",
                ));
            }
        }

        self.audit.log(SecurityEvent::access_token_issued(
            &grant.client_id,
            &grant.resource_owner_id,
        ));

        Ok(IssuedToken {
            token,
            reused: false,
        })
    }

    async fn create(
        &self,
        grant: &AuthorizationGrant,
        previous_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<AccessToken> {
        let mut attempt = 0;
        loop {
            let token = self.build(grant, previous_token.clone(), now)?;
            match self.store.insert(&token).await {
                Ok(()) => return Ok(token),
                Err(Error::Storage(StorageError::AlreadyExists(_)))
                    if attempt < MAX_TOKEN_RETRIES =>
                {
                    attempt += 1;
                    debug!(attempt, "access token collision, regenerating");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn build(
        &self,
        grant: &AuthorizationGrant,
        previous_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<AccessToken> {
        let refresh_token = if self.config.use_refresh_token {
            Some(generate_random_base64_url(self.config.token_length)?)
        } else {
            None
        };

        Ok(AccessToken {
            token: generate_random_base64_url(self.config.token_length)?,
            client_id: grant.client_id.clone(),
            resource_owner_id: grant.resource_owner_id.clone(),
            scopes: grant.scopes.clone(),
            created_at: now,
            expires_at: now + self.config.access_token_ttl,
            refresh_token,
            previous_token,
            revoked_at: None,
        })
    }
}
