/// 缓存键模块
/// 提供各种缓存键生成函数

// 限流计数键
pub mod rate_limit_keys;

// 登录失败记录键
pub mod login_keys;

pub use login_keys::login_attempts_key;
pub use rate_limit_keys::{RateKey, RateScope, SHARED_FALLBACK};
