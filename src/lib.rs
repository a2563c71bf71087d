//! # authgrant
//!
//! OAuth 2.0 授权码授权（RFC 6749 Section 4.1）与 PKCE（RFC 7636）的服务端核心。
//!
//! ## 功能特性
//!
//! - **授权码**: 短时有效、一次性兑换，存储层以 compare-and-set 保证并发下只能兑换一次
//! - **PKCE**: `plain` / `S256` 校验，常量时间比较
//! - **Scope**: 默认 / 可选 scope 配置，集合语义比较
//! - **访问令牌**: scope 不变时复用已有令牌，scope 变化时撤销旧令牌并签发新令牌
//! - **审计日志**: 授权码与令牌生命周期的安全事件
//!
//! 本库不包含 HTTP 层、客户端认证和资源所有者认证，这些由宿主应用提供。
//! 存储通过 [`oauth::GrantStore`] 和 [`oauth::AccessTokenStore`] 接入，
//! 内置的内存实现用于测试和开发。
//!
//! ## Scope 示例
//!
//! ```rust
//! use authgrant::oauth::{ScopeConfig, ScopeSet};
//!
//! let config = ScopeConfig::new("public".parse().unwrap(), "write".parse().unwrap());
//!
//! let requested = ScopeSet::parse("", &config.default_scopes);
//! assert_eq!(requested.to_string(), "public");
//! assert!(requested.is_subset_of(&config.all()));
//! ```
//!
//! ## PKCE 示例
//!
//! ```rust
//! use authgrant::oauth::{CodeChallenge, PkceMethod, generate_code_challenge, verify_code_verifier};
//!
//! let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
//! let stored = CodeChallenge::new(generate_code_challenge(verifier), Some(PkceMethod::S256));
//!
//! assert!(verify_code_verifier(Some(&stored), Some(verifier)).is_ok());
//! assert!(verify_code_verifier(Some(&stored), Some("wrong")).is_err());
//! ```
//!
//! ## 错误响应示例
//!
//! ```rust
//! use authgrant::oauth::GrantError;
//!
//! let body = serde_json::to_value(GrantError::InvalidGrant.to_oauth_error()).unwrap();
//! assert_eq!(body["error"], "invalid_grant");
//! ```

pub mod audit;
pub mod error;
pub mod oauth;
pub mod random;

pub use error::{Error, Result};

// ============================================================================
// 审计日志导出
// ============================================================================

pub use audit::{AuditLogger, EventSeverity, EventType, InMemoryAuditLogger, SecurityEvent};

// ============================================================================
// OAuth 导出
// ============================================================================

pub use oauth::{
    AccessTokenIssuer, AuthorizationEndpoint, AuthorizationGrant, GrantError,
    GrantExchangeCoordinator, ScopeSet, ServerConfig,
};
