/// 缓存操作
/// 提供基于计数存储的操作实现

// 滑动窗口限流
pub mod rate_limit;

pub use rate_limit::{RateLimitDecision, SlidingWindowLimiter};
