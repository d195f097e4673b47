use serde::{Deserialize, Serialize};

/// 一次滑动窗口原子操作的结果
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    /// 是否已写入本次请求
    pub admitted: bool,
    /// 写入前窗口内的有效条目数
    pub count: u32,
    /// 窗口内最早条目的时间（毫秒），窗口为空时为本次请求时间
    pub oldest_ms: i64,
}
