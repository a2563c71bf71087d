//! 授权码兑换
//!
//! [`GrantExchangeCoordinator`] 编排令牌端点的 `authorization_code` 授权：
//!
//! 1. 通过授权码查找授权记录
//! 2. 检查状态、客户端和重定向 URI
//! 3. 校验 PKCE
//! 4. 在存储中原子地把授权码标记为已兑换
//! 5. 签发或复用访问令牌
//!
//! 第 1-4 步任何一步失败都不会创建令牌。授权码仍处于 `Issued` 状态时，第 2-3 步的失败会
//! 同时撤销该授权码，之后任何兑换请求都会得到 `invalid_grant`。

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::client::OAuthClient;
use super::config::ServerConfig;
use super::error::{GrantError, GrantRejection, OAuthError};
use super::grant::{AuthorizationGrant, GrantStore};
use super::issuer::AccessTokenIssuer;
use super::pkce::verify_code_verifier;
use super::token::{AccessTokenStore, TokenResponse};
use crate::audit::{AuditLogger, NoOpAuditLogger, SecurityEvent};

/// 令牌端点 `grant_type=authorization_code` 请求
///
/// 客户端认证由外部完成，因此不包含 `client_id` 和客户端密钥
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// 授权码
    pub code: String,

    /// 授权请求中使用的重定向 URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// PKCE code_verifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
}

impl TokenRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_code_verifier(mut self, code_verifier: impl Into<String>) -> Self {
        self.code_verifier = Some(code_verifier.into());
        self
    }
}

/// 令牌端点响应体
///
/// 成功时为 [`TokenResponse`]，失败时为 [`OAuthError`]，两者直接序列化为 JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExchangeResponse {
    Token(TokenResponse),
    Error(OAuthError),
}

impl ExchangeResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, ExchangeResponse::Token(_))
    }
}

impl From<Result<TokenResponse, GrantError>> for ExchangeResponse {
    fn from(result: Result<TokenResponse, GrantError>) -> Self {
        match result {
            Ok(token) => ExchangeResponse::Token(token),
            Err(err) => ExchangeResponse::Error(err.to_oauth_error()),
        }
    }
}

/// 授权码兑换协调器
pub struct GrantExchangeCoordinator {
    grants: Arc<dyn GrantStore>,
    issuer: AccessTokenIssuer,
    audit: Arc<dyn AuditLogger>,
}

impl GrantExchangeCoordinator {
    /// 创建协调器，配置无效时返回错误
    pub fn new(
        grants: Arc<dyn GrantStore>,
        tokens: Arc<dyn AccessTokenStore>,
        config: Arc<ServerConfig>,
    ) -> crate::Result<Self> {
        Ok(Self {
            grants,
            issuer: AccessTokenIssuer::new(tokens, config)?,
            audit: Arc::new(NoOpAuditLogger),
        })
    }

    /// 设置审计日志记录器（同时用于令牌签发）
    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.issuer = self.issuer.with_audit_logger(audit.clone());
        self.audit = audit;
        self
    }

    pub fn issuer(&self) -> &AccessTokenIssuer {
        &self.issuer
    }

    /// 兑换授权码
    ///
    /// `client` 必须是已通过认证的客户端
    #[instrument(skip(self, client, request), fields(client_id = %client.client_id), level = "debug")]
    pub async fn exchange(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
    ) -> Result<TokenResponse, GrantError> {
        if request.code.is_empty() {
            return Err(GrantError::invalid_request("code is required"));
        }

        let Some(grant) = self.grants.find_by_token(&request.code).await? else {
            return Err(self.reject(client, None, GrantRejection::Unknown).await);
        };

        let now = Utc::now();
        if let Err(rejection) =
            grant.validate_for_redemption(&client.client_id, request.redirect_uri.as_deref(), now)
        {
            return Err(self.reject(client, Some(&grant), rejection).await);
        }

        if let Err(err) =
            verify_code_verifier(grant.code_challenge.as_ref(), request.code_verifier.as_deref())
        {
            return Err(self.reject(client, Some(&grant), err.into()).await);
        }

        if !self.grants.redeem(&grant.token, now).await? {
            return Err(self
                .reject(client, Some(&grant), GrantRejection::ConcurrentRedemption)
                .await);
        }

        self.audit.log(SecurityEvent::grant_redeemed(
            &grant.client_id,
            &grant.resource_owner_id,
        ));

        let issued = self.issuer.issue_or_reuse(&grant).await?;
        debug!(reused = issued.reused, "authorization code exchanged");

        // 新令牌报告完整有效期，复用的令牌报告剩余时间
        let at = if issued.reused {
            Utc::now()
        } else {
            issued.token.created_at
        };
        Ok(TokenResponse::from_access_token(&issued.token, at))
    }

    /// 兑换授权码并转换为响应体
    pub async fn exchange_response(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
    ) -> ExchangeResponse {
        self.exchange(client, request).await.into()
    }

    async fn reject(
        &self,
        client: &OAuthClient,
        grant: Option<&AuthorizationGrant>,
        rejection: GrantRejection,
    ) -> GrantError {
        if rejection.is_replay() {
            warn!(reason = rejection.as_str(), "authorization code replay");
            if let Some(grant) = grant {
                self.audit.log(SecurityEvent::grant_replay_detected(
                    &grant.client_id,
                    &grant.resource_owner_id,
                ));
            }
        } else {
            debug!(reason = rejection.as_str(), "authorization code rejected");
        }

        if let Some(grant) = grant.filter(|_| burns_grant(rejection)) {
            match self.grants.revoke(&grant.token, Utc::now()).await {
                Ok(true) => debug!("authorization code revoked after failed exchange"),
                Ok(false) => {}
                Err(err) => warn!(error = %err, "failed to revoke authorization code"),
            }
        }

        self.audit.log(SecurityEvent::grant_rejected(
            &client.client_id,
            rejection.as_str(),
        ));

        rejection.into()
    }
}

/// 授权码仍然有效但请求不匹配时，撤销该授权码
fn burns_grant(rejection: GrantRejection) -> bool {
    matches!(
        rejection,
        GrantRejection::ClientMismatch
            | GrantRejection::RedirectMismatch
            | GrantRejection::MissingVerifier
            | GrantRejection::VerifierMismatch
    )
}
