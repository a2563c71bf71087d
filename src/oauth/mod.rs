//! OAuth 2.0 授权码模块
//!
//! 实现 RFC 6749 授权码授权及 RFC 7636 PKCE 扩展的服务端核心逻辑，包括：
//!
//! - **Scope** (`scope`): scope 字符串的解析与集合比较
//! - **PKCE** (`pkce`): code_verifier 校验与客户端 challenge 生成
//! - **客户端** (`client`): 授权流程需要的客户端视图与注册表
//! - **授权码** (`grant`): 授权码实体、状态机与存储
//! - **令牌** (`token`): 访问令牌实体、存储与令牌响应
//! - **签发** (`issuer`): 访问令牌签发与复用
//! - **授权端点** (`authorize`): 校验授权请求并签发授权码
//! - **兑换** (`exchange`): 令牌端点的授权码兑换
//!
//! HTTP 层、客户端认证和资源所有者认证由宿主应用负责。
//!
//! ## 完整流程
//!
//! ```rust
//! use std::sync::Arc;
//! use authgrant::oauth::{
//!     AuthorizationEndpoint, AuthorizationRequest, GrantExchangeCoordinator,
//!     InMemoryAccessTokenStore, InMemoryGrantStore, OAuthClient, PkceChallenge, PkceMethod,
//!     ScopeConfig, ServerConfig, TokenRequest,
//! };
//!
//! # tokio_test_block_on(async {
//! let config = Arc::new(ServerConfig::new().with_scopes(ScopeConfig::new(
//!     "public".parse().unwrap(),
//!     "write".parse().unwrap(),
//! )));
//! let grants = Arc::new(InMemoryGrantStore::new());
//! let tokens = Arc::new(InMemoryAccessTokenStore::new());
//!
//! let endpoint = AuthorizationEndpoint::new(grants.clone(), config.clone()).unwrap();
//! let coordinator = GrantExchangeCoordinator::new(grants, tokens, config).unwrap();
//!
//! let client = OAuthClient::builder()
//!     .client_id("my-app")
//!     .name("My Application")
//!     .redirect_uri("https://example.com/callback")
//!     .build()
//!     .unwrap();
//!
//! // 客户端生成 PKCE 参数
//! let pkce = PkceChallenge::new(PkceMethod::S256).unwrap();
//!
//! // 资源所有者同意授权
//! let authorization = endpoint
//!     .authorize(
//!         &client,
//!         "user-42",
//!         &AuthorizationRequest::new("my-app")
//!             .with_scope("public write")
//!             .with_state("af0ifjsldkj")
//!             .with_code_challenge(pkce.challenge())
//!             .with_code_challenge_method("S256"),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(authorization.state.as_deref(), Some("af0ifjsldkj"));
//!
//! // 客户端在令牌端点兑换授权码
//! let token = coordinator
//!     .exchange(
//!         &client,
//!         &TokenRequest::new(authorization.code)
//!             .with_redirect_uri(authorization.redirect_uri)
//!             .with_code_verifier(pkce.verifier()),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(token.scope.as_deref(), Some("public write"));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod authorize;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod grant;
pub mod issuer;
pub mod pkce;
pub mod scope;
pub mod token;

// ============================================================================
// 配置与客户端导出
// ============================================================================

pub use client::{ClientRegistry, ClientType, InMemoryClientRegistry, OAuthClient, OAuthClientBuilder};
pub use config::{NATIVE_REDIRECT_URI, ServerConfig};
pub use scope::{ScopeConfig, ScopeSet};

// ============================================================================
// PKCE 导出
// ============================================================================

pub use pkce::{
    CodeChallenge, PkceChallenge, PkceConfig, PkceError, PkceMethod, generate_code_challenge,
    verify_code_verifier,
};

// ============================================================================
// 授权码与令牌导出
// ============================================================================

pub use grant::{AuthorizationGrant, GrantStatus, GrantStore, InMemoryGrantStore};
pub use issuer::{AccessTokenIssuer, IssuedToken};
pub use token::{AccessToken, AccessTokenStore, InMemoryAccessTokenStore, TokenResponse, TokenType};

// ============================================================================
// 端点导出
// ============================================================================

pub use authorize::{AuthorizationEndpoint, AuthorizationRequest, AuthorizationResponse};
pub use exchange::{ExchangeResponse, GrantExchangeCoordinator, TokenRequest};

// ============================================================================
// 错误导出
// ============================================================================

pub use error::{GrantError, GrantRejection, OAuthError, OAuthErrorCode};
