use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use super::QuotaTier;
use crate::cache::keys::{RateKey, RateScope};

/// 订阅等级查询，调用方把失败当作免费档
#[async_trait]
pub trait SubscriptionLookup: Send + Sync {
    async fn get_tier(&self, key: &RateKey) -> Result<QuotaTier, sqlx::Error>;
}

/// 从 Postgres 订阅表读取等级
#[derive(Clone)]
pub struct PgSubscriptionLookup {
    pool: PgPool,
}

impl PgSubscriptionLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionLookup for PgSubscriptionLookup {
    async fn get_tier(&self, key: &RateKey) -> Result<QuotaTier, sqlx::Error> {
        let tier: Option<String> = match key.scope {
            RateScope::User => {
                sqlx::query_scalar(
                    r#"
                    SELECT tier
                    FROM subscriptions
                    WHERE user_id = $1 AND status = 'active'
                    ORDER BY updated_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(&key.value)
                .fetch_optional(&self.pool)
                .await?
            }
            RateScope::ApiKey => {
                sqlx::query_scalar(
                    r#"
                    SELECT s.tier
                    FROM api_keys k
                    JOIN subscriptions s ON s.user_id = k.user_id AND s.status = 'active'
                    WHERE k.key_hash = $1 AND k.revoked_at IS NULL
                    ORDER BY s.updated_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(&key.value)
                .fetch_optional(&self.pool)
                .await?
            }
            RateScope::Ip | RateScope::Custom(_) => None,
        };

        Ok(tier.as_deref().map(QuotaTier::parse).unwrap_or(QuotaTier::Free))
    }
}

/// 固定映射，用于单租户部署与测试
#[derive(Debug, Default, Clone)]
pub struct StaticLookup {
    tiers: HashMap<RateKey, QuotaTier>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: RateKey, tier: QuotaTier) -> Self {
        self.tiers.insert(key, tier);
        self
    }
}

#[async_trait]
impl SubscriptionLookup for StaticLookup {
    async fn get_tier(&self, key: &RateKey) -> Result<QuotaTier, sqlx::Error> {
        Ok(self.tiers.get(key).copied().unwrap_or(QuotaTier::Free))
    }
}
