use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use super::{EndpointClass, QuotaTier, SubscriptionLookup, TierTable};
use crate::cache::keys::{RateKey, RateScope};

/// 标识 → 订阅等级，带短 TTL 缓存，避免每个请求都查库
#[derive(Clone)]
pub struct QuotaResolver {
    lookup: Arc<dyn SubscriptionLookup>,
    cache: Cache<RateKey, QuotaTier>,
    table: TierTable,
}

impl QuotaResolver {
    pub fn new(lookup: Arc<dyn SubscriptionLookup>, table: TierTable, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(ttl)
            .build();

        Self {
            lookup,
            cache,
            table,
        }
    }

    pub fn table(&self) -> &TierTable {
        &self.table
    }

    /// 查询失败时返回免费档且不缓存，下个请求会重新查询
    pub async fn resolve(&self, key: &RateKey) -> QuotaTier {
        if matches!(key.scope, RateScope::Ip | RateScope::Custom(_)) {
            return QuotaTier::Free;
        }

        if let Some(tier) = self.cache.get(key).await {
            return tier;
        }

        match self.lookup.get_tier(key).await {
            Ok(tier) => {
                self.cache.insert(key.clone(), tier).await;
                tracing::debug!(key = %key, tier = %tier, "Resolved subscription tier");
                tier
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Subscription lookup failed, defaulting to free tier"
                );
                QuotaTier::Free
            }
        }
    }

    /// 返回 (等级, 上限, 窗口)
    pub async fn limit(&self, key: &RateKey, class: EndpointClass) -> (QuotaTier, u32, Duration) {
        let tier = self.resolve(key).await;
        let (max, window) = self.table.limit_for(tier, class);
        (tier, max, window)
    }
}
