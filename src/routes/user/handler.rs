use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Extension, Json, State},
    http::HeaderMap,
};

use crate::{
    AppState,
    cache::models::LoginAttemptRecord,
    error::AppError,
    login::LoginPolicy,
    middleware::client_ip,
    utils::{Claims, generate_token, now_millis},
};

use super::model::{LoginRequest, LoginResponse, MeResponse, verify_absent};

/// 登录失败跟踪使用的标识
fn login_identifier(user_id: &str) -> String {
    format!("login:{}", user_id.trim().to_lowercase())
}

/// 本次失败记录后的答复：已锁定返回 423，否则 401 并带上验证码要求与剩余次数
fn rejection_after_failure(
    record: Option<&LoginAttemptRecord>,
    policy: &LoginPolicy,
    now_ms: i64,
) -> AppError {
    match record {
        Some(record) if record.is_locked_at(now_ms) => AppError::AccountLocked {
            locked_until_ms: record.locked_until.unwrap_or(now_ms),
        },
        Some(record) => AppError::InvalidCredentials {
            captcha_required: record.captcha_required,
            attempts_remaining: Some(policy.lockout_threshold.saturating_sub(record.count)),
        },
        None => AppError::InvalidCredentials {
            captcha_required: false,
            attempts_remaining: None,
        },
    }
}

/// 先过登录防护，再校验密码；用户不存在也按失败计数，避免枚举账户
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<Extension<ConnectInfo<SocketAddr>>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let identifier = login_identifier(&req.user_id);
    let remote = connect_info.map(|Extension(ConnectInfo(addr))| addr);
    let remote_ip = client_ip(&headers, remote, state.config.trusted_proxy_hops);

    state
        .tracker
        .guard(&identifier, req.captcha_token.as_deref(), Some(&remote_ip))
        .await?;

    let user = state.users.find_by_id(&req.user_id).await.map_err(|e| {
        tracing::error!("Failed to load user for login: {:?}", e);
        AppError::InternalServerError
    })?;

    let verified = match &user {
        Some(user) => user.verify_login(&req.password),
        None => verify_absent(&req.password),
    }
    .map_err(|e| {
        tracing::error!("Failed to verify password hash: {}", e);
        AppError::InternalServerError
    })?;

    let Some(user) = user.filter(|_| verified) else {
        let record = state.tracker.record_failure(&identifier).await;
        return Err(rejection_after_failure(
            record.as_ref(),
            state.tracker.policy(),
            now_millis(),
        ));
    };

    state.tracker.record_success(&identifier).await;

    let (token, expires_at) = generate_token(&user.user_id, &state.config).map_err(|e| {
        tracing::error!("Failed to generate token: {}", e);
        AppError::InternalServerError
    })?;

    tracing::info!(user_id = %user.user_id, "User logged in");
    Ok(Json(LoginResponse {
        user_id: user.user_id,
        token,
        expires_at,
    }))
}

#[axum::debug_handler]
pub async fn me(Extension(claims): Extension<Claims>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: claims.sub,
        expires_at: claims.exp,
    })
}
