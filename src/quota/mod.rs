//! 分级配额
//!
//! 订阅等级决定各端点类别的上限；等级查询结果缓存约 60 秒，
//! 过期数据只影响上限参数，不影响原子计数。

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod lookup;
mod resolver;

pub use lookup::{PgSubscriptionLookup, StaticLookup, SubscriptionLookup};
pub use resolver::QuotaResolver;

/// 订阅等级，按顺序递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaTier {
    Free,
    Pro,
    Enterprise,
}

impl QuotaTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaTier::Free => "free",
            QuotaTier::Pro => "pro",
            QuotaTier::Enterprise => "enterprise",
        }
    }

    /// 解析数据库中的等级名，未知值按免费档处理
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pro" => QuotaTier::Pro,
            "enterprise" => QuotaTier::Enterprise,
            _ => QuotaTier::Free,
        }
    }
}

impl fmt::Display for QuotaTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 端点类别，同一次等级查询可对应多个上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Default,
    Strict,
    PerUser,
    PerApiKey,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Default => "default",
            EndpointClass::Strict => "strict",
            EndpointClass::PerUser => "per_user",
            EndpointClass::PerApiKey => "per_api_key",
        }
    }
}

/// 免费档的上限与窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLimit {
    pub max: u32,
    pub window: Duration,
}

impl ClassLimit {
    pub fn new(max: u32, window: Duration) -> Self {
        Self { max, window }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    pub default: ClassLimit,
    pub strict: ClassLimit,
    pub per_user: ClassLimit,
    pub per_api_key: ClassLimit,
    pub pro_multiplier: u32,
    pub enterprise_multiplier: u32,
}

impl Default for TierTable {
    fn default() -> Self {
        let minute = Duration::from_secs(60);
        Self {
            default: ClassLimit::new(100, minute),
            strict: ClassLimit::new(10, minute),
            per_user: ClassLimit::new(300, minute),
            per_api_key: ClassLimit::new(1000, minute),
            pro_multiplier: 5,
            enterprise_multiplier: 20,
        }
    }
}

impl TierTable {
    /// 付费档不得低于免费档，高级别不得低于低级别
    pub fn validate(&self) -> Result<(), String> {
        if self.pro_multiplier < 1 {
            return Err(format!(
                "pro multiplier must be at least 1, got {}",
                self.pro_multiplier
            ));
        }
        if self.enterprise_multiplier < self.pro_multiplier {
            return Err(format!(
                "enterprise multiplier {} is below pro multiplier {}",
                self.enterprise_multiplier, self.pro_multiplier
            ));
        }
        Ok(())
    }

    pub fn multiplier(&self, tier: QuotaTier) -> u32 {
        match tier {
            QuotaTier::Free => 1,
            QuotaTier::Pro => self.pro_multiplier.max(1),
            QuotaTier::Enterprise => self.enterprise_multiplier.max(self.pro_multiplier).max(1),
        }
    }

    pub fn base(&self, class: EndpointClass) -> ClassLimit {
        match class {
            EndpointClass::Default => self.default,
            EndpointClass::Strict => self.strict,
            EndpointClass::PerUser => self.per_user,
            EndpointClass::PerApiKey => self.per_api_key,
        }
    }

    /// 返回 (上限, 窗口)
    pub fn limit_for(&self, tier: QuotaTier, class: EndpointClass) -> (u32, Duration) {
        let base = self.base(class);
        (base.max.saturating_mul(self.multiplier(tier)), base.window)
    }
}
