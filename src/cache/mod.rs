// 缓存模块
// 包含计数存储、缓存键、数据结构和操作逻辑

pub mod keys;
pub mod models;
pub mod operations;
pub mod store;

// 重新导出常用类型和函数，方便其他模块使用
pub use keys::RateKey;
pub use operations::{RateLimitDecision, SlidingWindowLimiter};
pub use store::{CounterStore, MemoryStore, RedisStore, StoreError, TimeoutStore};
