//! PKCE (Proof Key for Code Exchange) 实现
//!
//! PKCE 是 OAuth 2.0 授权码流程的安全扩展，用于防止授权码拦截攻击。
//! 特别适用于无法安全存储客户端密钥的公共客户端（如移动应用、SPA）。
//!
//! ## 工作原理
//!
//! 1. 客户端生成一个随机的 `code_verifier`
//! 2. 客户端计算 `code_challenge = transform(code_verifier)`
//! 3. 客户端发送 `code_challenge` 和 `code_challenge_method` 到授权端点
//! 4. 授权服务器将 challenge 与授权码一起存储（[`CodeChallenge`]）
//! 5. 客户端用授权码和原始 `code_verifier` 换取 token
//! 6. 授权服务器验证 `transform(code_verifier) == stored_challenge`（[`verify_code_verifier`]）
//!
//! ## 示例
//!
//! ```rust
//! use authgrant::oauth::pkce::{CodeChallenge, PkceChallenge, PkceMethod, verify_code_verifier};
//!
//! // 客户端
//! let pkce = PkceChallenge::new(PkceMethod::S256).unwrap();
//!
//! // 服务端存储
//! let stored = CodeChallenge::new(pkce.challenge(), Some(PkceMethod::S256));
//!
//! // 兑换授权码时验证
//! assert!(verify_code_verifier(Some(&stored), Some(pkce.verifier())).is_ok());
//! ```

use std::str::FromStr;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::{ConfigError, Error, Result};
use crate::random::{constant_time_compare_str, generate_random_bytes};

/// PKCE challenge 方法
///
/// RFC 7636 定义了两种方法：
/// - `Plain`: code_challenge = code_verifier
/// - `S256`: code_challenge = BASE64URL(SHA256(code_verifier))（推荐）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PkceMethod {
    /// Plain 方法：challenge = verifier
    ///
    /// 授权请求未携带 `code_challenge_method` 时的默认方法
    #[serde(rename = "plain")]
    Plain,

    /// S256 方法：challenge = BASE64URL(SHA256(verifier))
    #[serde(rename = "S256")]
    S256,
}

impl PkceMethod {
    /// 转换为 OAuth 2.0 参数字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            PkceMethod::Plain => "plain",
            PkceMethod::S256 => "S256",
        }
    }

    /// 对 verifier 应用本方法的变换
    pub fn transform(&self, verifier: &str) -> String {
        match self {
            PkceMethod::Plain => verifier.to_string(),
            PkceMethod::S256 => generate_code_challenge(verifier),
        }
    }
}

impl FromStr for PkceMethod {
    type Err = Error;

    /// 方法名区分大小写
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(PkceMethod::Plain),
            "S256" => Ok(PkceMethod::S256),
            _ => Err(Error::Config(ConfigError::InvalidValue {
                key: "code_challenge_method".to_string(),
                message: format!("unsupported PKCE method: {}", s),
            })),
        }
    }
}

impl std::fmt::Display for PkceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 计算 S256 code_challenge：`BASE64URL-NOPAD(SHA256(verifier))`
///
/// ```rust
/// use authgrant::oauth::pkce::generate_code_challenge;
///
/// // RFC 7636 附录 B 的测试向量
/// assert_eq!(
///     generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
///     "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
/// );
/// ```
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// 与授权码一起存储的 code challenge
///
/// `method` 为 `None` 表示授权请求未显式指定方法，按 `plain` 处理
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChallenge {
    /// code_challenge 值
    pub challenge: String,

    /// 授权请求中携带的 challenge 方法
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<PkceMethod>,
}

impl CodeChallenge {
    pub fn new(challenge: impl Into<String>, method: Option<PkceMethod>) -> Self {
        Self {
            challenge: challenge.into(),
            method,
        }
    }

    /// 实际生效的方法
    pub fn effective_method(&self) -> PkceMethod {
        self.method.unwrap_or(PkceMethod::Plain)
    }

    /// 使用常量时间比较验证 verifier
    pub fn matches(&self, verifier: &str) -> bool {
        let computed = self.effective_method().transform(verifier);
        constant_time_compare_str(&computed, &self.challenge)
    }
}

/// PKCE 验证失败
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PkceError {
    /// 授权码绑定了 challenge，但兑换请求未携带 `code_verifier`
    #[error("code_verifier is required")]
    MissingVerifier,

    /// `code_verifier` 与存储的 challenge 不匹配
    #[error("code_verifier does not match code_challenge")]
    Mismatch,
}

/// 校验兑换请求中的 `code_verifier`
///
/// - 授权码未绑定 challenge：直接通过，忽略任何 verifier
/// - 绑定了 challenge 且 verifier 缺失：[`PkceError::MissingVerifier`]
/// - 绑定了 challenge 且 verifier 不匹配（包括空字符串）：[`PkceError::Mismatch`]
pub fn verify_code_verifier(
    stored: Option<&CodeChallenge>,
    verifier: Option<&str>,
) -> std::result::Result<(), PkceError> {
    let Some(stored) = stored else {
        return Ok(());
    };

    let verifier = verifier.ok_or(PkceError::MissingVerifier)?;
    if stored.matches(verifier) {
        Ok(())
    } else {
        Err(PkceError::Mismatch)
    }
}

/// PKCE Verifier 生成配置
#[derive(Debug, Clone)]
pub struct PkceConfig {
    /// code_verifier 的长度（字节数）
    ///
    /// RFC 7636 要求 verifier 长度在 43-128 字符之间，默认 32 字节（43 字符）
    pub verifier_length: usize,

    /// 使用的 challenge 方法
    pub method: PkceMethod,
}

impl Default for PkceConfig {
    fn default() -> Self {
        Self {
            verifier_length: 32,
            method: PkceMethod::S256,
        }
    }
}

impl PkceConfig {
    /// 验证配置是否有效
    pub fn validate(&self) -> Result<()> {
        let encoded_len = (self.verifier_length * 4 + 2) / 3;

        if !(43..=128).contains(&encoded_len) {
            return Err(Error::Config(ConfigError::InvalidValue {
                key: "verifier_length".to_string(),
                message: format!(
                    "encoded verifier length {} outside 43-128 range",
                    encoded_len
                ),
            }));
        }

        Ok(())
    }
}

/// 客户端侧的 PKCE Challenge
///
/// 包含 code_verifier 和对应的 code_challenge
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
    method: PkceMethod,
}

impl PkceChallenge {
    /// 使用指定方法创建新的 PKCE challenge
    pub fn new(method: PkceMethod) -> Result<Self> {
        Self::with_config(PkceConfig {
            method,
            ..Default::default()
        })
    }

    /// 使用配置创建新的 PKCE challenge
    pub fn with_config(config: PkceConfig) -> Result<Self> {
        config.validate()?;

        let verifier_bytes = generate_random_bytes(config.verifier_length)?;
        let verifier = URL_SAFE_NO_PAD.encode(&verifier_bytes);
        let challenge = config.method.transform(&verifier);

        Ok(Self {
            verifier,
            challenge,
            method: config.method,
        })
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn method(&self) -> PkceMethod {
        self.method
    }

    /// 转换为服务端存储形式
    pub fn to_code_challenge(&self) -> CodeChallenge {
        CodeChallenge::new(self.challenge.clone(), Some(self.method))
    }
}
