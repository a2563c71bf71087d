//! 集成测试：并发兑换
//!
//! 测试同一授权码被并发兑换、或在校验与提交之间被撤销时的行为。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Barrier;

use authgrant::Result;
use authgrant::oauth::{
    AuthorizationGrant, GrantError, GrantExchangeCoordinator, GrantStatus, GrantStore,
    InMemoryAccessTokenStore, InMemoryGrantStore, OAuthClient, ScopeConfig, ServerConfig,
    TokenRequest,
};

const REDIRECT: &str = "https://app.example.com/callback";

fn config() -> Arc<ServerConfig> {
    Arc::new(ServerConfig::new().with_scopes(ScopeConfig::new(
        "public".parse().unwrap(),
        "write".parse().unwrap(),
    )))
}

fn client() -> OAuthClient {
    OAuthClient::builder()
        .client_id("web-app")
        .name("Web Application")
        .redirect_uri(REDIRECT)
        .build()
        .unwrap()
}

async fn issue(store: &InMemoryGrantStore, config: &ServerConfig) -> AuthorizationGrant {
    let grant = AuthorizationGrant::issue(
        &client(),
        "user-42",
        "public".parse().unwrap(),
        REDIRECT,
        None,
        config,
    )
    .unwrap();
    store.insert(&grant).await.unwrap();
    grant
}

fn request(code: &str) -> TokenRequest {
    TokenRequest::new(code).with_redirect_uri(REDIRECT)
}

/// 查找之后、提交之前由外部撤销授权码
struct RevokeAfterLookup {
    inner: Arc<InMemoryGrantStore>,
    armed: AtomicBool,
}

#[async_trait]
impl GrantStore for RevokeAfterLookup {
    async fn insert(&self, grant: &AuthorizationGrant) -> Result<()> {
        self.inner.insert(grant).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<AuthorizationGrant>> {
        let found = self.inner.find_by_token(token).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.inner.revoke(token, Utc::now()).await?;
        }
        Ok(found)
    }

    async fn redeem(&self, token: &str, at: DateTime<Utc>) -> Result<bool> {
        self.inner.redeem(token, at).await
    }

    async fn revoke(&self, token: &str, at: DateTime<Utc>) -> Result<bool> {
        self.inner.revoke(token, at).await
    }
}

/// 所有调用者完成查找后才放行，使它们都基于 `Issued` 快照进入提交阶段
struct LookupBarrier {
    inner: Arc<InMemoryGrantStore>,
    barrier: Barrier,
}

#[async_trait]
impl GrantStore for LookupBarrier {
    async fn insert(&self, grant: &AuthorizationGrant) -> Result<()> {
        self.inner.insert(grant).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<AuthorizationGrant>> {
        let found = self.inner.find_by_token(token).await?;
        self.barrier.wait().await;
        Ok(found)
    }

    async fn redeem(&self, token: &str, at: DateTime<Utc>) -> Result<bool> {
        self.inner.redeem(token, at).await
    }

    async fn revoke(&self, token: &str, at: DateTime<Utc>) -> Result<bool> {
        self.inner.revoke(token, at).await
    }
}

/// 测试校验与提交之间被撤销
#[tokio::test]
async fn test_revoked_between_validation_and_commit() {
    let config = config();
    let inner = Arc::new(InMemoryGrantStore::new());
    let tokens = Arc::new(InMemoryAccessTokenStore::new());
    let grant = issue(&inner, &config).await;

    let store = Arc::new(RevokeAfterLookup {
        inner: inner.clone(),
        armed: AtomicBool::new(true),
    });
    let coordinator = GrantExchangeCoordinator::new(store, tokens.clone(), config).unwrap();

    let err = coordinator
        .exchange(&client(), &request(&grant.token))
        .await
        .unwrap_err();

    assert!(matches!(err, GrantError::InvalidGrant));
    assert_eq!(tokens.len().unwrap(), 0);

    let stored = inner.find_by_token(&grant.token).await.unwrap().unwrap();
    assert_eq!(stored.status(), GrantStatus::Revoked);
    assert!(stored.redeemed_at.is_none());
}

/// 测试两个请求同时通过校验后竞争提交
#[tokio::test]
async fn test_two_redemptions_race_on_commit() {
    let config = config();
    let inner = Arc::new(InMemoryGrantStore::new());
    let tokens = Arc::new(InMemoryAccessTokenStore::new());
    let grant = issue(&inner, &config).await;

    let store = Arc::new(LookupBarrier {
        inner,
        barrier: Barrier::new(2),
    });
    let coordinator = GrantExchangeCoordinator::new(store, tokens.clone(), config).unwrap();
    let client = client();
    let request = request(&grant.token);

    let (a, b) = tokio::join!(
        coordinator.exchange(&client, &request),
        coordinator.exchange(&client, &request),
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(GrantError::InvalidGrant)))
            .count(),
        1
    );
    assert_eq!(tokens.len().unwrap(), 1);
}

/// 测试多个任务并发兑换同一授权码
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redemptions_issue_one_token() {
    const ATTEMPTS: usize = 16;

    let config = config();
    let grants = Arc::new(InMemoryGrantStore::new());
    let tokens = Arc::new(InMemoryAccessTokenStore::new());
    let grant = issue(&grants, &config).await;

    let coordinator = Arc::new(GrantExchangeCoordinator::new(
        grants.clone(),
        tokens.clone(),
        config,
    )
    .unwrap());

    let mut handles = Vec::with_capacity(ATTEMPTS);
    for _ in 0..ATTEMPTS {
        let coordinator = coordinator.clone();
        let code = grant.token.clone();
        handles.push(tokio::spawn(async move {
            coordinator.exchange(&client(), &request(&code)).await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(GrantError::InvalidGrant) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(rejected, ATTEMPTS - 1);
    assert_eq!(tokens.len().unwrap(), 1);

    let stored = grants.find_by_token(&grant.token).await.unwrap().unwrap();
    assert_eq!(stored.status(), GrantStatus::Redeemed);
}

/// 测试并发兑换不同授权码互不影响
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_codes() {
    let config = config();
    let grants = Arc::new(InMemoryGrantStore::new());
    let tokens = Arc::new(InMemoryAccessTokenStore::new());

    let mut codes = Vec::new();
    for _ in 0..8 {
        codes.push(issue(&grants, &config).await.token);
    }

    let coordinator = Arc::new(GrantExchangeCoordinator::new(
        grants.clone(),
        tokens.clone(),
        config,
    )
    .unwrap());

    let handles: Vec<_> = codes
        .iter()
        .cloned()
        .map(|code| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.exchange(&client(), &request(&code)).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    for code in &codes {
        let stored = grants.find_by_token(code).await.unwrap().unwrap();
        assert_eq!(stored.status(), GrantStatus::Redeemed);
    }
    assert!(tokens.len().unwrap() >= 1);
}
