use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::store::StoreError;
use crate::metrics::STORE_FAILURES;

/// 存储不可用时的统一放行策略
///
/// 每次故障恰好产生一条结构化告警和一次监控计数，调用方随后按各自的放行结果继续。
#[derive(Debug, Default)]
pub struct FailurePolicy {
    events: AtomicU64,
}

impl FailurePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_unavailable(&self, component: &'static str, key: &str, err: &StoreError) {
        self.events.fetch_add(1, Ordering::Relaxed);
        STORE_FAILURES.with_label_values(&[component]).inc();
        tracing::warn!(
            component,
            key = %key,
            error = %err,
            fail_open = true,
            "Counter store unavailable, failing open"
        );
    }

    /// 本实例记录到的故障次数
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }
}
