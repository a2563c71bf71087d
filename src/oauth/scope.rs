//! 授权范围 (scope) 处理
//!
//! OAuth 2.0 的 scope 参数是以空格分隔的字符串。本模块将其解析为无序、去重的集合，
//! 所有比较都是集合语义而非字符串语义：`"write public"` 与 `"public  write"` 相等。
//!
//! ## 示例
//!
//! ```rust
//! use authgrant::oauth::ScopeSet;
//!
//! let defaults: ScopeSet = "public".parse().unwrap();
//!
//! // 空 scope 使用默认值
//! assert_eq!(ScopeSet::parse("", &defaults), defaults);
//!
//! let requested = ScopeSet::parse("write  public write", &defaults);
//! assert_eq!(requested.to_string(), "public write");
//!
//! let allowed: ScopeSet = "public write admin".parse().unwrap();
//! assert!(requested.is_subset_of(&allowed));
//! ```

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 不可变的 scope 集合
///
/// 内部按字典序存储，`Display` 输出稳定的空格分隔字符串
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// 创建空集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析原始 scope 字符串
    ///
    /// 按空白字符分割、丢弃空项并去重；若结果为空则返回 `defaults`
    pub fn parse(raw: &str, defaults: &ScopeSet) -> Self {
        let parsed = Self::from_raw(raw);
        if parsed.is_empty() {
            defaults.clone()
        } else {
            parsed
        }
    }

    /// 解析可选的 scope 参数，`None` 等同于空字符串
    pub fn parse_optional(raw: Option<&str>, defaults: &ScopeSet) -> Self {
        Self::parse(raw.unwrap_or_default(), defaults)
    }

    fn from_raw(raw: &str) -> Self {
        Self(raw.split_whitespace().map(str::to_string).collect())
    }

    /// 检查是否为 `allowed` 的子集
    pub fn is_subset_of(&self, allowed: &ScopeSet) -> bool {
        self.0.is_subset(&allowed.0)
    }

    /// 是否包含指定 scope
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// 并集
    pub fn union(&self, other: &ScopeSet) -> ScopeSet {
        Self(self.0.union(&other.0).cloned().collect())
    }

    /// 交集
    pub fn intersection(&self, other: &ScopeSet) -> ScopeSet {
        Self(self.0.intersection(&other.0).cloned().collect())
    }

    /// 是否与另一个集合有交集
    pub fn overlaps(&self, other: &ScopeSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromStr for ScopeSet {
    type Err = Infallible;

    /// 不带默认值的解析：空字符串得到空集合
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_raw(s))
    }
}

impl std::fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope)?;
            first = false;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.trim().is_empty())
                .collect(),
        )
    }
}

// 在线格式与 OAuth 参数一致：空格分隔的字符串
impl Serialize for ScopeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScopeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_raw(&raw))
    }
}

/// 服务端 scope 配置
///
/// - `default_scopes`: 请求未携带 scope 时授予的范围
/// - `optional_scopes`: 客户端可以额外请求的范围
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    #[serde(default)]
    pub default_scopes: ScopeSet,
    #[serde(default)]
    pub optional_scopes: ScopeSet,
}

impl ScopeConfig {
    pub fn new(default_scopes: ScopeSet, optional_scopes: ScopeSet) -> Self {
        Self {
            default_scopes,
            optional_scopes,
        }
    }

    /// 服务端允许的全部范围（默认 ∪ 可选）
    pub fn all(&self) -> ScopeSet {
        self.default_scopes.union(&self.optional_scopes)
    }

    /// 是否配置了任何 scope
    pub fn is_configured(&self) -> bool {
        !self.default_scopes.is_empty() || !self.optional_scopes.is_empty()
    }
}
