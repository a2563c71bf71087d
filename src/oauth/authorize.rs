//! 授权端点
//!
//! 资源所有者已由宿主应用认证并同意授权后，[`AuthorizationEndpoint`] 校验授权请求并签发授权码。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::client::{ClientRegistry, OAuthClient};
use super::config::ServerConfig;
use super::error::GrantError;
use super::grant::{AuthorizationGrant, GrantStore};
use super::pkce::{CodeChallenge, PkceMethod};
use super::scope::ScopeSet;
use crate::audit::{AuditLogger, NoOpAuditLogger, SecurityEvent};
use crate::error::{Error, StorageError};

/// 授权码值冲突时的最大重试次数
const MAX_GRANT_RETRIES: usize = 3;

/// 授权请求（`response_type=code`）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub client_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// 空格分隔的 scope，缺省时使用默认 scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// 客户端状态，原样返回
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
}

impl AuthorizationRequest {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_code_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.code_challenge = Some(challenge.into());
        self
    }

    pub fn with_code_challenge_method(mut self, method: impl Into<String>) -> Self {
        self.code_challenge_method = Some(method.into());
        self
    }
}

/// 授权响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    /// 授权码
    pub code: String,

    /// 原样返回的 state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// 实际使用的重定向 URI
    pub redirect_uri: String,

    /// 重定向 URI 为带外 URI 时为 `true`，授权码直接展示给资源所有者
    #[serde(default)]
    pub out_of_band: bool,
}

/// 授权端点
pub struct AuthorizationEndpoint {
    grants: Arc<dyn GrantStore>,
    config: Arc<ServerConfig>,
    audit: Arc<dyn AuditLogger>,
}

impl AuthorizationEndpoint {
    /// 创建授权端点，配置无效时返回错误
    pub fn new(grants: Arc<dyn GrantStore>, config: Arc<ServerConfig>) -> crate::Result<Self> {
        config.validate()?;

        Ok(Self {
            grants,
            config,
            audit: Arc::new(NoOpAuditLogger),
        })
    }

    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// 校验授权请求并签发授权码
    ///
    /// `resource_owner_id` 是已通过认证并同意授权的资源所有者
    #[instrument(skip(self, client, request), fields(client_id = %client.client_id), level = "debug")]
    pub async fn authorize(
        &self,
        client: &OAuthClient,
        resource_owner_id: &str,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationResponse, GrantError> {
        if !client.enabled {
            return Err(GrantError::invalid_request("client is disabled"));
        }
        if request.client_id != client.client_id {
            return Err(GrantError::invalid_request("client_id does not match"));
        }

        let redirect_uri = resolve_redirect_uri(client, request.redirect_uri.as_deref())?;
        let scopes = self.resolve_scopes(request.scope.as_deref())?;
        let code_challenge = parse_code_challenge(request)?;

        let grant = self
            .issue_grant(client, resource_owner_id, scopes, &redirect_uri, code_challenge)
            .await?;

        debug!(pkce = grant.uses_pkce(), "authorization code issued");
        self.audit.log(SecurityEvent::grant_issued(
            &client.client_id,
            resource_owner_id,
        ));

        Ok(AuthorizationResponse {
            code: grant.token,
            state: request.state.clone(),
            out_of_band: redirect_uri == self.config.native_redirect_uri,
            redirect_uri,
        })
    }

    /// 通过客户端注册表解析 `request.client_id` 后签发授权码
    ///
    /// 未注册的 client_id 返回 `invalid_request`
    pub async fn authorize_registered(
        &self,
        clients: &dyn ClientRegistry,
        resource_owner_id: &str,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationResponse, GrantError> {
        let Some(client) = clients.find_by_id(&request.client_id).await? else {
            debug!(client_id = %request.client_id, "unknown client");
            return Err(GrantError::invalid_request("unknown client_id"));
        };

        self.authorize(&client, resource_owner_id, request).await
    }

    fn resolve_scopes(&self, raw: Option<&str>) -> Result<ScopeSet, GrantError> {
        let scopes = ScopeSet::parse_optional(raw, &self.config.scopes.default_scopes);
        if scopes.is_empty() && self.config.scopes.is_configured() {
            return Err(GrantError::InvalidScope);
        }
        Ok(scopes)
    }

    async fn issue_grant(
        &self,
        client: &OAuthClient,
        resource_owner_id: &str,
        scopes: ScopeSet,
        redirect_uri: &str,
        code_challenge: Option<CodeChallenge>,
    ) -> Result<AuthorizationGrant, GrantError> {
        let mut attempt = 0;
        loop {
            let grant = AuthorizationGrant::issue(
                client,
                resource_owner_id,
                scopes.clone(),
                redirect_uri,
                code_challenge.clone(),
                &self.config,
            )?;

            match self.grants.insert(&grant).await {
                Ok(()) => return Ok(grant),
                Err(Error::Storage(StorageError::AlreadyExists(_)))
                    if attempt < MAX_GRANT_RETRIES =>
                {
                    attempt += 1;
                    debug!(attempt, "authorization code collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// 确定重定向 URI
///
/// 显式提供时必须已注册；未提供时只有在客户端恰好注册了一个 URI 时才使用它
fn resolve_redirect_uri(
    client: &OAuthClient,
    requested: Option<&str>,
) -> Result<String, GrantError> {
    match requested {
        Some(uri) if client.allows_redirect_uri(uri) => Ok(uri.to_string()),
        Some(_) => Err(GrantError::invalid_request(
            "redirect_uri is not registered for this client",
        )),
        None => match client.redirect_uris.as_slice() {
            [only] => Ok(only.clone()),
            _ => Err(GrantError::invalid_request("redirect_uri is required")),
        },
    }
}

fn parse_code_challenge(
    request: &AuthorizationRequest,
) -> Result<Option<CodeChallenge>, GrantError> {
    let method = request.code_challenge_method.as_deref();
    let Some(challenge) = request.code_challenge.as_deref() else {
        if method.is_some() {
            return Err(GrantError::invalid_request(
                "code_challenge_method requires code_challenge",
            ));
        }
        return Ok(None);
    };

    if challenge.trim().is_empty() {
        return Err(GrantError::invalid_request("code_challenge cannot be blank"));
    }

    let method = method
        .map(str::parse::<PkceMethod>)
        .transpose()
        .map_err(|_| GrantError::invalid_request("unsupported code_challenge_method"))?;

    Ok(Some(CodeChallenge::new(challenge, method)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{EventType, InMemoryAuditLogger};
    use crate::oauth::config::NATIVE_REDIRECT_URI;
    use crate::oauth::{InMemoryClientRegistry, InMemoryGrantStore, ScopeConfig};

    const REDIRECT: &str = "https://app.example.com/cb";

    fn setup() -> (AuthorizationEndpoint, Arc<InMemoryGrantStore>, OAuthClient) {
        let grants = Arc::new(InMemoryGrantStore::new());
        let config = ServerConfig::new().with_scopes(ScopeConfig::new(
            "public".parse().unwrap(),
            "write".parse().unwrap(),
        ));
        let endpoint = AuthorizationEndpoint::new(grants.clone(), Arc::new(config)).unwrap();
        let client = OAuthClient::builder()
            .client_id("client-1")
            .name("Test")
            .redirect_uri(REDIRECT)
            .build()
            .unwrap();
        (endpoint, grants, client)
    }

    #[tokio::test]
    async fn test_authorize_issues_grant() {
        let (endpoint, grants, client) = setup();
        let audit = InMemoryAuditLogger::new();
        let endpoint = endpoint.with_audit_logger(Arc::new(audit.clone()));

        let response = endpoint
            .authorize(
                &client,
                "owner-1",
                &AuthorizationRequest::new("client-1")
                    .with_redirect_uri(REDIRECT)
                    .with_state("xyz"),
            )
            .await
            .unwrap();

        assert_eq!(response.state.as_deref(), Some("xyz"));
        assert_eq!(response.redirect_uri, REDIRECT);
        assert!(!response.out_of_band);

        let grant = grants.find_by_token(&response.code).await.unwrap().unwrap();
        assert_eq!(grant.resource_owner_id, "owner-1");
        assert_eq!(grant.scopes.to_string(), "public");
        assert_eq!(audit.get_events_by_type(&EventType::GrantIssued).len(), 1);
    }

    #[tokio::test]
    async fn test_single_registered_uri_is_default() {
        let (endpoint, _, client) = setup();
        let response = endpoint
            .authorize(&client, "owner-1", &AuthorizationRequest::new("client-1"))
            .await
            .unwrap();

        assert_eq!(response.redirect_uri, REDIRECT);
        assert!(response.state.is_none());
    }

    #[tokio::test]
    async fn test_redirect_uri_required_with_multiple_registered() {
        let (endpoint, _, _) = setup();
        let client = OAuthClient::builder()
            .client_id("client-1")
            .name("Test")
            .redirect_uri(REDIRECT)
            .redirect_uri("https://app.example.com/other")
            .build()
            .unwrap();

        let err = endpoint
            .authorize(&client, "owner-1", &AuthorizationRequest::new("client-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_unregistered_redirect_uri() {
        let (endpoint, grants, client) = setup();
        let err = endpoint
            .authorize(
                &client,
                "owner-1",
                &AuthorizationRequest::new("client-1").with_redirect_uri("https://evil.example.com"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GrantError::InvalidRequest(_)));
        assert_eq!(grants.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_or_mismatched_client() {
        let (endpoint, _, mut client) = setup();

        let err = endpoint
            .authorize(&client, "owner-1", &AuthorizationRequest::new("client-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidRequest(_)));

        client.disable();
        let err = endpoint
            .authorize(&client, "owner-1", &AuthorizationRequest::new("client-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_scope_outside_allowed_set() {
        let (endpoint, grants, client) = setup();
        let err = endpoint
            .authorize(
                &client,
                "owner-1",
                &AuthorizationRequest::new("client-1").with_scope("public admin"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GrantError::InvalidScope));
        assert_eq!(grants.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_scope_without_defaults() {
        let grants = Arc::new(InMemoryGrantStore::new());
        let config = ServerConfig::new().with_scopes(ScopeConfig::new(
            ScopeSet::new(),
            "write".parse().unwrap(),
        ));
        let endpoint = AuthorizationEndpoint::new(grants, Arc::new(config)).unwrap();
        let (_, _, client) = setup();

        let err = endpoint
            .authorize(&client, "owner-1", &AuthorizationRequest::new("client-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidScope));
    }

    #[tokio::test]
    async fn test_authorize_registered_client() {
        let (endpoint, grants, client) = setup();
        let registry = InMemoryClientRegistry::new();
        registry.save(&client).await.unwrap();

        let response = endpoint
            .authorize_registered(&registry, "owner-1", &AuthorizationRequest::new("client-1"))
            .await
            .unwrap();
        assert_eq!(response.redirect_uri, REDIRECT);
        assert_eq!(grants.len().unwrap(), 1);

        let err = endpoint
            .authorize_registered(&registry, "owner-1", &AuthorizationRequest::new("unknown"))
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidRequest(_)));
        assert_eq!(grants.len().unwrap(), 1);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let write: ScopeSet = "write".parse().unwrap();

        for config in [
            ServerConfig::new().with_token_length(1),
            ServerConfig::new().with_grant_ttl(chrono::Duration::seconds(-1)),
            ServerConfig::new().with_scopes(ScopeConfig::new(write.clone(), write)),
        ] {
            let grants = Arc::new(InMemoryGrantStore::new());
            let result = AuthorizationEndpoint::new(grants, Arc::new(config));
            assert!(matches!(result, Err(Error::Config(_))));
        }
    }

    #[tokio::test]
    async fn test_pkce_method_is_case_sensitive() {
        let (endpoint, grants, client) = setup();

        for method in ["s256", "PLAIN", "Plain"] {
            let request = AuthorizationRequest::new("client-1")
                .with_code_challenge("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM")
                .with_code_challenge_method(method);
            let err = endpoint.authorize(&client, "owner-1", &request).await.unwrap_err();
            assert!(matches!(err, GrantError::InvalidRequest(_)));
        }
        assert_eq!(grants.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pkce_parameters() {
        let (endpoint, grants, client) = setup();

        let response = endpoint
            .authorize(
                &client,
                "owner-1",
                &AuthorizationRequest::new("client-1")
                    .with_code_challenge("challenge")
                    .with_code_challenge_method("S256"),
            )
            .await
            .unwrap();
        let grant = grants.find_by_token(&response.code).await.unwrap().unwrap();
        assert_eq!(
            grant.code_challenge,
            Some(CodeChallenge::new("challenge", Some(PkceMethod::S256)))
        );

        // 未指定方法时保留为 None，兑换时按 plain 处理
        let response = endpoint
            .authorize(
                &client,
                "owner-1",
                &AuthorizationRequest::new("client-1").with_code_challenge("challenge"),
            )
            .await
            .unwrap();
        let grant = grants.find_by_token(&response.code).await.unwrap().unwrap();
        assert_eq!(grant.code_challenge.unwrap().method, None);
    }

    #[test]
    fn test_invalid_pkce_parameters() {
        let method_only = AuthorizationRequest::new("c").with_code_challenge_method("S256");
        let unknown = AuthorizationRequest::new("c")
            .with_code_challenge("x")
            .with_code_challenge_method("S512");
        let blank = AuthorizationRequest::new("c").with_code_challenge("  ");

        for request in [method_only, unknown, blank] {
            assert!(matches!(
                parse_code_challenge(&request),
                Err(GrantError::InvalidRequest(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_native_redirect_uri_is_out_of_band() {
        let (endpoint, _, _) = setup();
        let client = OAuthClient::builder()
            .client_id("native")
            .name("CLI")
            .redirect_uri(NATIVE_REDIRECT_URI)
            .build()
            .unwrap();

        let response = endpoint
            .authorize(&client, "owner-1", &AuthorizationRequest::new("native"))
            .await
            .unwrap();
        assert!(response.out_of_band);
    }

    #[test]
    fn test_request_deserialization() {
        let request: AuthorizationRequest = serde_json::from_str(
            r#"{ "client_id": "c", "scope": "public write", "state": "s" }"#,
        )
        .unwrap();
        assert_eq!(request.scope.as_deref(), Some("public write"));
        assert!(request.code_challenge.is_none());
    }
}
