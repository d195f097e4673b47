use axum::{
    extract::{Json, State},
    http::HeaderMap,
};
use serde::Serialize;

use crate::{
    AppState,
    cache::keys::RateKey,
    cache::operations::RateLimitDecision,
    error::AppError,
    quota::{EndpointClass, QuotaTier},
};

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub tier: QuotaTier,
    #[serde(flatten)]
    pub usage: RateLimitDecision,
}

/// 查看当前 API Key 在窗口内的用量，本次查询已被按 Key 限流计数
#[axum::debug_handler]
pub async fn api_key_usage(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UsageResponse>, AppError> {
    let raw = headers
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(AppError::Unauthorized)?;

    let key = RateKey::api_key(raw);
    let class = EndpointClass::PerApiKey;
    let (tier, max, window) = state.resolver.limit(&key, class).await;
    let usage = state
        .limiter
        .peek(class.as_str(), &key, window.as_millis() as u64, max)
        .await;

    Ok(Json(UsageResponse { tier, usage }))
}
