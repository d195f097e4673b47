use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounterVec, TextEncoder, register_int_counter_vec,
};

lazy_static! {
    pub static ref STORE_FAILURES: IntCounterVec = register_int_counter_vec!(
        "admission_store_failures_total",
        "Counter store failures absorbed by the fail-open policy",
        &["component"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_DECISIONS: IntCounterVec = register_int_counter_vec!(
        "admission_rate_limit_decisions_total",
        "Admission gate decisions",
        &["class", "outcome"]
    )
    .unwrap();
    pub static ref LOGIN_EVENTS: IntCounterVec = register_int_counter_vec!(
        "admission_login_events_total",
        "Login attempt tracker events",
        &["event"]
    )
    .unwrap();
}

/// 以 Prometheus 文本格式导出默认注册表
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
