//! 计数存储抽象
//!
//! 限流与登录保护只通过 [`CounterStore`] 访问共享存储。每种后端一个适配器：
//! - [`RedisStore`]：生产环境，多实例共享
//! - [`MemoryStore`]：未配置 Redis 时的单实例降级模式，不提供跨实例保证
//! - [`TimeoutStore`]：为任意后端的每次调用加上超时

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::models::WindowOutcome;

mod memory;
mod redis_store;
mod timeout;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;
pub use self::timeout::TimeoutStore;

/// 基础设施故障，永远不直接返回给调用方
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("store call timed out after {0}ms")]
    Timeout(u64),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("concurrent update conflict on {0}")]
    Conflict(String),
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// 原子执行滑动窗口四步：删除 `score <= now_ms - window_ms` 的条目、计数、
    /// 未超限时以 `now_ms` 写入 `member`，并把键过期时间刷新为 `ttl_secs`
    async fn sliding_window(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: u64,
        max: u32,
        member: &str,
        ttl_secs: u64,
    ) -> Result<WindowOutcome, StoreError>;

    /// 只读统计窗口内条目数与最早条目时间，不写入
    async fn window_usage(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: u64,
    ) -> Result<(u32, Option<i64>), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// 仅当当前值等于 `expected`（`None` 表示键不存在）时写入，返回是否写入成功
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, StoreError>;

    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError>;

    async fn del(&self, key: &str) -> Result<(), StoreError>;
}

/// 窗口键的过期时间：`ceil(window_ms / 1000) + 1` 秒
pub fn window_ttl_secs(window_ms: u64) -> u64 {
    window_ms.div_ceil(1000) + 1
}
