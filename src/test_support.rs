use async_trait::async_trait;

use crate::cache::models::WindowOutcome;
use crate::cache::store::{CounterStore, StoreError};
use crate::config::Config;

/// 每次调用都失败的存储
pub struct FailingStore;

fn down() -> StoreError {
    StoreError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

#[async_trait]
impl CounterStore for FailingStore {
    async fn sliding_window(
        &self,
        _key: &str,
        _now_ms: i64,
        _window_ms: u64,
        _max: u32,
        _member: &str,
        _ttl_secs: u64,
    ) -> Result<WindowOutcome, StoreError> {
        Err(down())
    }

    async fn window_usage(
        &self,
        _key: &str,
        _now_ms: i64,
        _window_ms: u64,
    ) -> Result<(u32, Option<i64>), StoreError> {
        Err(down())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(down())
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<(), StoreError> {
        Err(down())
    }

    async fn compare_and_set(
        &self,
        _key: &str,
        _expected: Option<&str>,
        _value: &str,
        _ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn incr(&self, _key: &str, _by: i64) -> Result<i64, StoreError> {
        Err(down())
    }

    async fn expire(&self, _key: &str, _ttl_secs: u64) -> Result<(), StoreError> {
        Err(down())
    }

    async fn del(&self, _key: &str) -> Result<(), StoreError> {
        Err(down())
    }
}

pub fn config() -> Config {
    Config {
        database_url: "postgres://localhost/test".into(),
        redis_url: None,
        jwt_secret: "test-secret".into(),
        jwt_expiration_secs: 3600,
        server_host: "127.0.0.1".into(),
        server_port: 0,
        app_env: "test".into(),
        store_timeout_ms: 50,
        trusted_proxy_hops: 0,
        rate_limit_window_secs: 60,
        rate_limit_requests: 100,
        rate_limit_strict_requests: 10,
        rate_limit_user_requests: 300,
        rate_limit_api_key_requests: 1000,
        tier_pro_multiplier: 5,
        tier_enterprise_multiplier: 20,
        tier_cache_ttl_secs: 60,
        login_captcha_threshold: 3,
        login_lockout_threshold: 5,
        login_window_secs: 60,
        login_base_lockout_secs: 900,
        login_max_lockout_multiplier: 8,
        login_backoff_memory_secs: 86_400,
        captcha_secret: None,
        captcha_verify_url: crate::captcha::DEFAULT_VERIFY_URL.into(),
        captcha_min_score: 0.5,
    }
}
