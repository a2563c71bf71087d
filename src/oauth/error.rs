//! OAuth 协议错误
//!
//! - [`GrantError`]: 授权端点和令牌端点返回给调用方的错误分类
//! - [`GrantRejection`]: 授权码被拒绝的内部原因，只用于日志和审计，不会出现在响应中
//! - [`OAuthError`]: 符合 RFC 6749 Section 5.2 的错误响应体

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pkce::PkceError;

/// 所有 `invalid_grant` 响应共用的描述，不区分具体原因
pub const INVALID_GRANT_DESCRIPTION: &str = "The provided authorization grant is invalid, expired, revoked, does not match the redirection URI used in the authorization request, or was issued to another client.";

/// 授权流程错误
#[derive(Debug, Error)]
pub enum GrantError {
    /// 请求缺少必需参数或参数格式错误
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// 授权码无效（未知、过期、已撤销、已兑换、客户端或重定向 URI 不匹配、PKCE 验证失败）
    #[error("invalid_grant")]
    InvalidGrant,

    /// 请求的 scope 超出客户端允许范围
    #[error("invalid_scope")]
    InvalidScope,

    /// 存储或随机数等基础设施故障
    #[error("server_error: {0}")]
    Server(#[from] crate::Error),
}

impl GrantError {
    pub fn invalid_request(description: impl Into<String>) -> Self {
        GrantError::InvalidRequest(description.into())
    }

    /// 协议错误代码
    pub fn code(&self) -> OAuthErrorCode {
        match self {
            GrantError::InvalidRequest(_) => OAuthErrorCode::InvalidRequest,
            GrantError::InvalidGrant => OAuthErrorCode::InvalidGrant,
            GrantError::InvalidScope => OAuthErrorCode::InvalidScope,
            GrantError::Server(_) => OAuthErrorCode::ServerError,
        }
    }

    /// 转换为错误响应体
    ///
    /// 服务端错误不携带内部错误信息
    pub fn to_oauth_error(&self) -> OAuthError {
        match self {
            GrantError::InvalidRequest(description) => OAuthError::invalid_request(description),
            GrantError::InvalidGrant => {
                OAuthError::new(OAuthErrorCode::InvalidGrant)
                    .with_description(INVALID_GRANT_DESCRIPTION)
            }
            GrantError::InvalidScope => OAuthError::new(OAuthErrorCode::InvalidScope)
                .with_description("The requested scope is invalid, unknown, or malformed."),
            GrantError::Server(_) => OAuthError::new(OAuthErrorCode::ServerError),
        }
    }
}

impl From<PkceError> for GrantError {
    fn from(err: PkceError) -> Self {
        match err {
            PkceError::MissingVerifier => GrantError::invalid_request("code_verifier is required"),
            PkceError::Mismatch => GrantError::InvalidGrant,
        }
    }
}

impl From<GrantRejection> for GrantError {
    fn from(rejection: GrantRejection) -> Self {
        match rejection {
            GrantRejection::MissingVerifier => PkceError::MissingVerifier.into(),
            _ => GrantError::InvalidGrant,
        }
    }
}

/// 授权码被拒绝的内部原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GrantRejection {
    #[error("unknown authorization code")]
    Unknown,
    #[error("authorization code expired")]
    Expired,
    #[error("authorization code revoked")]
    Revoked,
    #[error("authorization code already redeemed")]
    Redeemed,
    #[error("authorization code issued to another client")]
    ClientMismatch,
    #[error("redirect_uri does not match the authorization request")]
    RedirectMismatch,
    #[error("code_verifier missing")]
    MissingVerifier,
    #[error("code_verifier mismatch")]
    VerifierMismatch,
    #[error("authorization code consumed concurrently")]
    ConcurrentRedemption,
}

impl GrantRejection {
    /// 审计日志中使用的原因标识
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantRejection::Unknown => "unknown",
            GrantRejection::Expired => "expired",
            GrantRejection::Revoked => "revoked",
            GrantRejection::Redeemed => "redeemed",
            GrantRejection::ClientMismatch => "client_mismatch",
            GrantRejection::RedirectMismatch => "redirect_mismatch",
            GrantRejection::MissingVerifier => "missing_verifier",
            GrantRejection::VerifierMismatch => "verifier_mismatch",
            GrantRejection::ConcurrentRedemption => "concurrent_redemption",
        }
    }

    /// 是否表示授权码被重复使用
    pub fn is_replay(&self) -> bool {
        matches!(
            self,
            GrantRejection::Redeemed | GrantRejection::ConcurrentRedemption
        )
    }
}

impl From<PkceError> for GrantRejection {
    fn from(err: PkceError) -> Self {
        match err {
            PkceError::MissingVerifier => GrantRejection::MissingVerifier,
            PkceError::Mismatch => GrantRejection::VerifierMismatch,
        }
    }
}

/// OAuth 错误响应
///
/// 符合 RFC 6749 Section 5.2 的错误响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthError {
    /// 错误代码
    pub error: OAuthErrorCode,

    /// 错误描述
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// OAuth 错误代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorCode {
    /// 请求缺少必需参数、包含无效参数值、多次包含某参数或格式错误
    InvalidRequest,
    /// 提供的授权许可无效、已过期、已撤销
    InvalidGrant,
    /// 请求的范围无效、未知或格式错误
    InvalidScope,
    /// 授权服务器遇到意外情况
    ServerError,
}

impl OAuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthErrorCode::InvalidRequest => "invalid_request",
            OAuthErrorCode::InvalidGrant => "invalid_grant",
            OAuthErrorCode::InvalidScope => "invalid_scope",
            OAuthErrorCode::ServerError => "server_error",
        }
    }
}

impl OAuthError {
    /// 创建新的 OAuth 错误
    pub fn new(error: OAuthErrorCode) -> Self {
        Self {
            error,
            error_description: None,
        }
    }

    /// 设置错误描述
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    /// 创建无效请求错误
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::InvalidRequest).with_description(description)
    }
}

impl std::fmt::Display for OAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error.as_str())?;
        if let Some(desc) = &self.error_description {
            write!(f, ": {}", desc)?;
        }
        Ok(())
    }
}

impl std::error::Error for OAuthError {}
