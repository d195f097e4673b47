use std::fmt;

use crate::utils::hash_identifier;

/// 限流计数键前缀
const RATE_LIMIT_PREFIX: &str = "rate_limit";

/// 无法识别来源时共用的兜底桶（NAT 后的用户会共享此桶）
pub const SHARED_FALLBACK: &str = "unknown";

/// 计数器命名空间，不同作用域永不共享计数
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateScope {
    Ip,
    User,
    ApiKey,
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub scope: RateScope,
    pub value: String,
}

impl RateKey {
    pub fn ip(value: impl Into<String>) -> Self {
        Self {
            scope: RateScope::Ip,
            value: value.into(),
        }
    }

    pub fn user(value: impl Into<String>) -> Self {
        Self {
            scope: RateScope::User,
            value: value.into(),
        }
    }

    /// API Key 原文不进入存储，只保留哈希
    pub fn api_key(raw: &str) -> Self {
        Self {
            scope: RateScope::ApiKey,
            value: hash_identifier(raw),
        }
    }

    pub fn custom(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scope: RateScope::Custom(name.into()),
            value: value.into(),
        }
    }

    pub fn is_shared_fallback(&self) -> bool {
        self.scope == RateScope::Ip && self.value == SHARED_FALLBACK
    }

    /// 生成存储键；`bucket` 区分叠加在同一标识上的不同准入门，各自计数
    pub fn store_key(&self, bucket: &str) -> String {
        format!("{}:{}:{}", RATE_LIMIT_PREFIX, bucket, self)
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            RateScope::Ip => write!(f, "ip:{}", self.value),
            RateScope::User => write!(f, "user:{}", self.value),
            RateScope::ApiKey => write!(f, "apikey:{}", self.value),
            RateScope::Custom(name) => write!(f, "custom:{}:{}", name, self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_never_share_a_key() {
        let ip = RateKey::ip("42").store_key("default");
        let user = RateKey::user("42").store_key("default");
        let custom = RateKey::custom("ip", "42").store_key("default");
        assert_eq!(ip, "rate_limit:default:ip:42");
        assert_eq!(user, "rate_limit:default:user:42");
        assert_ne!(ip, custom);
    }

    #[test]
    fn buckets_never_share_a_key() {
        let key = RateKey::ip("192.0.2.1");
        assert_eq!(key.store_key("strict"), "rate_limit:strict:ip:192.0.2.1");
        assert_ne!(key.store_key("default"), key.store_key("strict"));
    }

    #[test]
    fn api_key_is_hashed() {
        let key = RateKey::api_key("sk_live_secret");
        assert!(!key.store_key("per_api_key").contains("sk_live_secret"));
        assert_eq!(key, RateKey::api_key("sk_live_secret"));
    }
}
