//! OAuth 2.0 客户端视图
//!
//! 客户端的注册与认证由外部完成，本模块只描述授权流程需要查询的那部分信息：
//! 已注册的重定向 URI、允许的 scope 以及客户端类型。

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scope::{ScopeConfig, ScopeSet};
use crate::error::{Error, Result, ValidationError};
use crate::random::generate_random_alphanumeric;

/// OAuth 客户端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// 机密客户端（可以安全存储密钥的服务端应用）
    #[default]
    Confidential,
    /// 公开客户端（无法安全存储密钥的客户端应用，如 SPA、移动 App）
    Public,
}

/// 已通过认证的 OAuth 客户端
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    /// 客户端 ID
    pub client_id: String,

    /// 客户端名称
    pub name: String,

    /// 客户端类型
    pub client_type: ClientType,

    /// 允许的重定向 URI 列表
    pub redirect_uris: Vec<String>,

    /// 客户端自身声明的 scope；为空表示使用服务端全部 scope
    #[serde(default)]
    pub scopes: ScopeSet,

    /// 是否启用
    pub enabled: bool,

    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl OAuthClient {
    /// 创建构建器
    pub fn builder() -> OAuthClientBuilder {
        OAuthClientBuilder::new()
    }

    /// 检查是否允许指定的重定向 URI（精确匹配）
    pub fn allows_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// 客户端可以请求的 scope
    ///
    /// 服务端 scope（默认 ∪ 可选），如果客户端声明了自己的 scope 则取交集
    pub fn allowed_scopes(&self, server: &ScopeConfig) -> ScopeSet {
        let all = server.all();
        if self.scopes.is_empty() {
            all
        } else {
            all.intersection(&self.scopes)
        }
    }

    pub fn is_public(&self) -> bool {
        self.client_type == ClientType::Public
    }

    /// 禁用客户端
    pub fn disable(&mut self) {
        self.enabled = false;
    }
}

/// OAuth 客户端构建器
#[derive(Debug, Default)]
pub struct OAuthClientBuilder {
    client_id: Option<String>,
    name: Option<String>,
    client_type: ClientType,
    redirect_uris: Vec<String>,
    scopes: Vec<String>,
}

impl OAuthClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用外部注册系统分配的客户端 ID；未设置时随机生成
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn client_type(mut self, client_type: ClientType) -> Self {
        self.client_type = client_type;
        self
    }

    /// 添加重定向 URI
    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.push(uri.into());
        self
    }

    /// 添加 scope
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// 构建客户端
    pub fn build(self) -> Result<OAuthClient> {
        let name = self
            .name
            .ok_or_else(|| Error::Validation(ValidationError::EmptyField("name".to_string())))?;

        if self.redirect_uris.is_empty() {
            return Err(Error::validation("At least one redirect URI is required"));
        }

        for uri in &self.redirect_uris {
            validate_redirect_uri(uri)?;
        }

        let client_id = self
            .client_id
            .unwrap_or_else(|| format!("oa_{}", generate_random_alphanumeric(24)));

        Ok(OAuthClient {
            client_id,
            name,
            client_type: self.client_type,
            redirect_uris: self.redirect_uris,
            scopes: self.scopes.into_iter().collect(),
            enabled: true,
            created_at: Utc::now(),
        })
    }
}

/// 验证重定向 URI 格式
///
/// 允许 http(s)、自定义 scheme（移动应用）和 `urn:` 形式的带外 URI，拒绝片段
fn validate_redirect_uri(uri: &str) -> Result<()> {
    if uri.trim().is_empty() {
        return Err(Error::validation("Redirect URI cannot be empty"));
    }

    if uri.starts_with("urn:") {
        return Ok(());
    }

    if !uri.contains("://") {
        return Err(Error::validation("Redirect URI must have a valid scheme"));
    }

    // RFC 6749 3.1.2: 重定向 URI 不得包含片段
    if uri.contains('#') {
        return Err(Error::validation("Redirect URI must not contain a fragment"));
    }

    Ok(())
}

/// 客户端注册表 trait
///
/// 由外部客户端管理系统实现，授权端点通过它查询客户端
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// 根据 client_id 查找客户端
    async fn find_by_id(&self, client_id: &str) -> Result<Option<OAuthClient>>;

    /// 保存客户端
    async fn save(&self, client: &OAuthClient) -> Result<()>;
}

/// 内存客户端注册表
#[derive(Debug, Default)]
pub struct InMemoryClientRegistry {
    clients: RwLock<HashMap<String, OAuthClient>>,
}

impl InMemoryClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
    async fn find_by_id(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        let clients = self.clients.read().map_err(|_| Error::lock_poisoned())?;
        Ok(clients.get(client_id).cloned())
    }

    async fn save(&self, client: &OAuthClient) -> Result<()> {
        let mut clients = self.clients.write().map_err(|_| Error::lock_poisoned())?;
        clients.insert(client.client_id.clone(), client.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_scopes() -> ScopeConfig {
        ScopeConfig::new("public".parse().unwrap(), "write admin".parse().unwrap())
    }

    #[test]
    fn test_build_client() {
        let client = OAuthClient::builder()
            .name("Test App")
            .redirect_uri("https://example.com/callback")
            .build()
            .unwrap();

        assert!(client.client_id.starts_with("oa_"));
        assert_eq!(client.client_id.len(), 27);
        assert_eq!(client.client_type, ClientType::Confidential);
        assert!(client.enabled);
        assert!(client.allows_redirect_uri("https://example.com/callback"));
        assert!(!client.allows_redirect_uri("https://example.com/callback/"));
    }

    #[test]
    fn test_build_requires_name_and_redirect() {
        assert!(
            OAuthClient::builder()
                .redirect_uri("https://example.com/cb")
                .build()
                .is_err()
        );
        assert!(OAuthClient::builder().name("No Redirect").build().is_err());
    }

    #[test]
    fn test_allowed_scopes_without_client_scopes() {
        let client = OAuthClient::builder()
            .name("Test")
            .redirect_uri("https://example.com/cb")
            .build()
            .unwrap();

        let allowed = client.allowed_scopes(&server_scopes());
        assert_eq!(allowed.to_string(), "admin public write");
    }

    #[test]
    fn test_allowed_scopes_narrowed_by_client() {
        let client = OAuthClient::builder()
            .name("Test")
            .redirect_uri("https://example.com/cb")
            .scope("public")
            .scope("write")
            .scope("unknown")
            .build()
            .unwrap();

        // 客户端声明但服务端未配置的 scope 不会被授予
        let allowed = client.allowed_scopes(&server_scopes());
        assert_eq!(allowed.to_string(), "public write");
    }

    #[test]
    fn test_redirect_uri_validation() {
        assert!(validate_redirect_uri("https://example.com/callback").is_ok());
        assert!(validate_redirect_uri("http://localhost:3000/cb").is_ok());
        assert!(validate_redirect_uri("myapp://callback").is_ok());
        assert!(validate_redirect_uri("urn:ietf:wg:oauth:2.0:oob").is_ok());

        assert!(validate_redirect_uri("").is_err());
        assert!(validate_redirect_uri("not-a-uri").is_err());
        assert!(validate_redirect_uri("https://example.com/cb#frag").is_err());
    }

    #[tokio::test]
    async fn test_in_memory_registry() {
        let registry = InMemoryClientRegistry::new();
        let client = OAuthClient::builder()
            .client_id("client-1")
            .name("Test")
            .client_type(ClientType::Public)
            .redirect_uri("myapp://callback")
            .build()
            .unwrap();

        registry.save(&client).await.unwrap();

        let found = registry.find_by_id("client-1").await.unwrap().unwrap();
        assert!(found.is_public());
        assert!(registry.find_by_id("missing").await.unwrap().is_none());
    }
}
