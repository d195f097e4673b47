use std::sync::Arc;

use serde::Serialize;

use crate::cache::keys::RateKey;
use crate::cache::store::{CounterStore, window_ttl_secs};
use crate::failure::FailurePolicy;
use crate::utils::now_millis;

/// 一次限流判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// 窗口内最早的请求滑出窗口的时间（毫秒）
    pub reset_at_ms: i64,
}

impl RateLimitDecision {
    /// 放行时的兜底结果
    fn fail_open(max: u32, now_ms: i64, window_ms: u64) -> Self {
        Self {
            allowed: true,
            limit: max,
            remaining: max,
            reset_at_ms: now_ms + window_ms as i64,
        }
    }
}

/// 滑动窗口日志限流器
///
/// 检查与计数在存储端一次原子完成，多个服务实例共享同一存储时，
/// 同一个键上并发的两个请求不会同时看到 `count = max - 1` 而都被放行。
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn CounterStore>,
    failures: Arc<FailurePolicy>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>, failures: Arc<FailurePolicy>) -> Self {
        Self { store, failures }
    }

    pub async fn check(
        &self,
        bucket: &str,
        key: &RateKey,
        window_ms: u64,
        max: u32,
    ) -> RateLimitDecision {
        self.check_at(bucket, key, window_ms, max, now_millis()).await
    }

    /// 以指定时间判定，存储故障时放行。`bucket` 相同的调用共享计数
    pub async fn check_at(
        &self,
        bucket: &str,
        key: &RateKey,
        window_ms: u64,
        max: u32,
        now_ms: i64,
    ) -> RateLimitDecision {
        let store_key = key.store_key(bucket);
        let member = format!("{}-{}", now_ms, uuid::Uuid::new_v4());

        let outcome = match self
            .store
            .sliding_window(
                &store_key,
                now_ms,
                window_ms,
                max,
                &member,
                window_ttl_secs(window_ms),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.failures.store_unavailable("limiter", &store_key, &e);
                return RateLimitDecision::fail_open(max, now_ms, window_ms);
            }
        };

        let reset_at_ms = outcome.oldest_ms + window_ms as i64;
        if outcome.admitted {
            RateLimitDecision {
                allowed: true,
                limit: max,
                remaining: max.saturating_sub(outcome.count + 1),
                reset_at_ms,
            }
        } else {
            tracing::warn!(
                key = %key,
                count = outcome.count,
                limit = max,
                "Rate limit exceeded"
            );
            RateLimitDecision {
                allowed: false,
                limit: max,
                remaining: 0,
                reset_at_ms,
            }
        }
    }

    /// 查看当前用量，不计数
    pub async fn peek(
        &self,
        bucket: &str,
        key: &RateKey,
        window_ms: u64,
        max: u32,
    ) -> RateLimitDecision {
        let now_ms = now_millis();
        let store_key = key.store_key(bucket);
        match self.store.window_usage(&store_key, now_ms, window_ms).await {
            Ok((count, oldest)) => RateLimitDecision {
                allowed: count < max,
                limit: max,
                remaining: max.saturating_sub(count),
                reset_at_ms: oldest.unwrap_or(now_ms) + window_ms as i64,
            },
            Err(e) => {
                self.failures.store_unavailable("limiter", &store_key, &e);
                RateLimitDecision::fail_open(max, now_ms, window_ms)
            }
        }
    }

    /// 清空某个键的窗口（运维解封）
    pub async fn reset(&self, bucket: &str, key: &RateKey) {
        let store_key = key.store_key(bucket);
        match self.store.del(&store_key).await {
            Ok(()) => tracing::info!(key = %key, "Rate limit window cleared"),
            Err(e) => self.failures.store_unavailable("limiter", &store_key, &e),
        }
    }
}
