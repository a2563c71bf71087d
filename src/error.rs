//! 统一错误类型模块
//!
//! 提供 authgrant 库中基础设施层（存储、加密、配置）的错误类型定义。
//! 协议层的 OAuth 错误见 [`crate::oauth::GrantError`]。

use thiserror::Error;

/// authgrant 库的统一结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// authgrant 库的错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 验证错误
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 存储错误
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// 加密错误
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl Error {
    /// 创建一个验证错误
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(ValidationError::Custom(msg.into()))
    }

    /// 创建一个“锁已中毒”的存储错误
    pub(crate) fn lock_poisoned() -> Self {
        Error::Storage(StorageError::OperationFailed("lock poisoned".into()))
    }
}

/// 验证相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 字段为空
    #[error("field '{0}' cannot be empty")]
    EmptyField(String),
    /// 自定义验证错误
    #[error("{0}")]
    Custom(String),
}

/// 配置相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// 无效的配置值
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// 存储相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// 记录已存在
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// 操作失败
    #[error("storage operation failed: {0}")]
    OperationFailed(String),
}

/// 加密相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// 随机数生成失败
    #[error("random number generation failed: {0}")]
    RngFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Storage(StorageError::AlreadyExists("grant".to_string()));
        assert_eq!(err.to_string(), "Storage error: already exists: grant");
    }

    #[test]
    fn test_error_from_storage() {
        let err: Error = StorageError::AlreadyExists("token".to_string()).into();
        assert!(matches!(err, Error::Storage(StorageError::AlreadyExists(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "grant_ttl".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid configuration value for 'grant_ttl': must be positive"
        );
    }

    #[test]
    fn test_lock_poisoned() {
        let err = Error::lock_poisoned();
        assert_eq!(err.to_string(), "Storage error: storage operation failed: lock poisoned");
    }
}
