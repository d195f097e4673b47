use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{CounterStore, StoreError};
use crate::cache::models::WindowOutcome;

/// 为每次存储调用设置上限，超时视为故障，由调用方按放行策略处理
pub struct TimeoutStore<S> {
    inner: S,
    limit: Duration,
}

impl<S: CounterStore> TimeoutStore<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.limit, call)
            .await
            .map_err(|_| StoreError::Timeout(self.limit.as_millis() as u64))?
    }
}

#[async_trait]
impl<S: CounterStore> CounterStore for TimeoutStore<S> {
    async fn sliding_window(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: u64,
        max: u32,
        member: &str,
        ttl_secs: u64,
    ) -> Result<WindowOutcome, StoreError> {
        self.bounded(
            self.inner
                .sliding_window(key, now_ms, window_ms, max, member, ttl_secs),
        )
        .await
    }

    async fn window_usage(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: u64,
    ) -> Result<(u32, Option<i64>), StoreError> {
        self.bounded(self.inner.window_usage(key, now_ms, window_ms))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.bounded(self.inner.get(key)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.bounded(self.inner.set_ex(key, value, ttl_secs)).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        self.bounded(self.inner.compare_and_set(key, expected, value, ttl_secs))
            .await
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        self.bounded(self.inner.incr(key, by)).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.bounded(self.inner.expire(key, ttl_secs)).await
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.bounded(self.inner.del(key)).await
    }
}
