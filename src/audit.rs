//! 审计日志模块
//!
//! 记录授权码和访问令牌生命周期中的安全事件：
//!
//! - **安全事件**: 授权码签发、兑换、拒绝、重放，访问令牌签发、复用、撤销
//! - **审计日志 Trait**: 定义日志记录接口，由宿主应用接入持久化
//! - **内存实现**: 用于测试和开发的简单实现
//!
//! 事件中只记录客户端和资源所有者标识，不记录授权码或令牌的值。
//!
//! ## 使用示例
//!
//! ```rust
//! use authgrant::audit::{AuditLogger, EventSeverity, EventType, InMemoryAuditLogger, SecurityEvent};
//!
//! let logger = InMemoryAuditLogger::new();
//!
//! logger.log(SecurityEvent::grant_issued("client-1", "owner-1"));
//! logger.log(SecurityEvent::grant_rejected("client-1", "expired"));
//! logger.log(SecurityEvent::grant_replay_detected("client-1", "owner-1"));
//!
//! assert_eq!(logger.event_count(), 3);
//! assert_eq!(logger.get_events_by_type(&EventType::GrantRejected).len(), 1);
//! assert_eq!(logger.get_events_by_severity(EventSeverity::Critical).len(), 1);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// 事件严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EventSeverity {
    /// 调试信息
    Debug,
    /// 一般信息
    #[default]
    Info,
    /// 警告
    Warning,
    /// 错误
    Error,
    /// 严重/危险
    Critical,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventSeverity::Debug => write!(f, "DEBUG"),
            EventSeverity::Info => write!(f, "INFO"),
            EventSeverity::Warning => write!(f, "WARNING"),
            EventSeverity::Error => write!(f, "ERROR"),
            EventSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// 安全事件类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// 授权码签发
    GrantIssued,
    /// 授权码兑换成功
    GrantRedeemed,
    /// 授权码兑换被拒绝
    GrantRejected,
    /// 授权码重放
    GrantReplayDetected,
    /// 访问令牌签发
    AccessTokenIssued,
    /// 访问令牌复用
    AccessTokenReused,
    /// 访问令牌撤销
    AccessTokenRevoked,
    /// 自定义事件
    Custom(String),
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::GrantIssued => write!(f, "grant_issued"),
            EventType::GrantRedeemed => write!(f, "grant_redeemed"),
            EventType::GrantRejected => write!(f, "grant_rejected"),
            EventType::GrantReplayDetected => write!(f, "grant_replay_detected"),
            EventType::AccessTokenIssued => write!(f, "access_token_issued"),
            EventType::AccessTokenReused => write!(f, "access_token_reused"),
            EventType::AccessTokenRevoked => write!(f, "access_token_revoked"),
            EventType::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// 安全事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// 事件 ID
    pub id: String,

    /// 事件类型
    pub event_type: EventType,

    /// 严重程度
    pub severity: EventSeverity,

    /// 客户端 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// 资源所有者 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_owner_id: Option<String>,

    /// 事件描述
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// 附加信息
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, String>,

    /// 发生时间
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    /// 创建新的安全事件
    pub fn new(event_type: EventType, severity: EventSeverity) -> Self {
        Self {
            id: generate_event_id(),
            event_type,
            severity,
            client_id: None,
            resource_owner_id: None,
            message: None,
            details: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn custom(name: impl Into<String>, severity: EventSeverity) -> Self {
        Self::new(EventType::Custom(name.into()), severity)
    }

    // ========================================================================
    // 便捷构造方法
    // ========================================================================

    pub fn grant_issued(client_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self::new(EventType::GrantIssued, EventSeverity::Info)
            .with_client_id(client_id)
            .with_resource_owner_id(owner_id)
            .with_message("Authorization grant issued")
    }

    pub fn grant_redeemed(client_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self::new(EventType::GrantRedeemed, EventSeverity::Info)
            .with_client_id(client_id)
            .with_resource_owner_id(owner_id)
            .with_message("Authorization grant redeemed")
    }

    /// 兑换被拒绝，`reason` 为内部原因标识
    pub fn grant_rejected(client_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(EventType::GrantRejected, EventSeverity::Warning)
            .with_client_id(client_id)
            .with_message(format!("Authorization grant rejected: {}", reason))
            .with_detail("reason", reason)
    }

    pub fn grant_replay_detected(
        client_id: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self::new(EventType::GrantReplayDetected, EventSeverity::Critical)
            .with_client_id(client_id)
            .with_resource_owner_id(owner_id)
            .with_message("Authorization grant replay detected")
    }

    pub fn access_token_issued(client_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self::new(EventType::AccessTokenIssued, EventSeverity::Info)
            .with_client_id(client_id)
            .with_resource_owner_id(owner_id)
            .with_message("Access token issued")
    }

    pub fn access_token_reused(client_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self::new(EventType::AccessTokenReused, EventSeverity::Info)
            .with_client_id(client_id)
            .with_resource_owner_id(owner_id)
            .with_message("Existing access token reused")
    }

    pub fn access_token_revoked(
        client_id: impl Into<String>,
        owner_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(EventType::AccessTokenRevoked, EventSeverity::Info)
            .with_client_id(client_id)
            .with_resource_owner_id(owner_id)
            .with_message(format!("Access token revoked: {}", reason.into()))
    }

    // ========================================================================
    // Builder 方法
    // ========================================================================

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_resource_owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.resource_owner_id = Some(owner_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    // ========================================================================
    // 查询方法
    // ========================================================================

    pub fn event_name(&self) -> String {
        self.event_type.to_string()
    }

    pub fn is_high_severity(&self) -> bool {
        matches!(
            self.severity,
            EventSeverity::Error | EventSeverity::Critical
        )
    }
}

fn generate_event_id() -> String {
    use crate::random::generate_random_hex;
    format!(
        "evt_{}",
        generate_random_hex(16).unwrap_or_else(|_| "unknown".to_string())
    )
}

// ============================================================================
// AuditLogger Trait
// ============================================================================

/// 审计日志记录器
///
/// 记录失败不得影响授权流程，因此 `log` 不返回错误
pub trait AuditLogger: Send + Sync {
    fn log(&self, event: SecurityEvent);

    fn log_batch(&self, events: Vec<SecurityEvent>) {
        for event in events {
            self.log(event);
        }
    }
}

// ============================================================================
// InMemoryAuditLogger
// ============================================================================

/// 内存日志记录器
///
/// 克隆后共享同一个事件列表
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLogger {
    events: Arc<RwLock<Vec<SecurityEvent>>>,
    max_events: Option<usize>,
}

impl InMemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带有最大事件数限制的日志记录器
    pub fn with_max_events(max: usize) -> Self {
        Self {
            events: Arc::default(),
            max_events: Some(max),
        }
    }

    /// 获取所有事件
    pub fn get_events(&self) -> Vec<SecurityEvent> {
        self.filtered(|_| true)
    }

    pub fn event_count(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    /// 按客户端获取事件
    pub fn get_events_by_client(&self, client_id: &str) -> Vec<SecurityEvent> {
        self.filtered(|e| e.client_id.as_deref() == Some(client_id))
    }

    /// 按事件类型获取事件
    pub fn get_events_by_type(&self, event_type: &EventType) -> Vec<SecurityEvent> {
        self.filtered(|e| &e.event_type == event_type)
    }

    /// 按严重程度获取事件
    pub fn get_events_by_severity(&self, severity: EventSeverity) -> Vec<SecurityEvent> {
        self.filtered(|e| e.severity == severity)
    }

    pub fn get_high_severity_events(&self) -> Vec<SecurityEvent> {
        self.filtered(SecurityEvent::is_high_severity)
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    fn filtered(&self, predicate: impl Fn(&SecurityEvent) -> bool) -> Vec<SecurityEvent> {
        match self.events.read() {
            Ok(events) => events.iter().filter(|e| predicate(e)).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl AuditLogger for InMemoryAuditLogger {
    fn log(&self, event: SecurityEvent) {
        let Ok(mut events) = self.events.write() else {
            return;
        };

        // 超过上限时丢弃最旧的事件
        if let Some(max) = self.max_events {
            while events.len() >= max && !events.is_empty() {
                events.remove(0);
            }
        }

        events.push(event);
    }
}

// ============================================================================
// NoOpAuditLogger
// ============================================================================

/// 空操作日志记录器
///
/// 不执行任何操作，用于禁用审计日志
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpAuditLogger;

impl NoOpAuditLogger {
    pub fn new() -> Self {
        Self
    }
}

impl AuditLogger for NoOpAuditLogger {
    fn log(&self, _event: SecurityEvent) {}
}

// ============================================================================
// 测试
// ============================================================================
