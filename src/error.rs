use axum::Json;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::utils::{now_millis, secs_until};

/// 面向调用方的错误，基础设施故障不在此列
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    QuotaExceeded {
        limit: u32,
        reset_at_ms: i64,
    },
    AccountLocked {
        locked_until_ms: i64,
    },
    CaptchaRequired,
    CaptchaInvalid,
    MisconfiguredVerifier,
    /// 附带本次失败后的登录防护状态，客户端据此提前展示验证码
    InvalidCredentials {
        captcha_required: bool,
        attempts_remaining: Option<u32>,
    },
    Unauthorized,
    InternalServerError,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(rename = "captchaRequired", skip_serializing_if = "Option::is_none")]
    pub captcha_required: Option<bool>,
    #[serde(rename = "attemptsRemaining", skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::AccountLocked { .. } => StatusCode::LOCKED,
            AppError::CaptchaRequired | AppError::CaptchaInvalid => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials { .. } | AppError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            AppError::MisconfiguredVerifier | AppError::InternalServerError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::QuotaExceeded { .. } => "too_many_requests",
            AppError::AccountLocked { .. } => "account_locked",
            AppError::CaptchaRequired => "captcha_required",
            AppError::CaptchaInvalid => "captcha_invalid",
            AppError::MisconfiguredVerifier => "captcha_misconfigured",
            AppError::InvalidCredentials { .. } => "invalid_credentials",
            AppError::Unauthorized => "unauthorized",
            AppError::InternalServerError => "internal_error",
        }
    }

    /// 距可重试的秒数（向上取整，最少 1 秒）
    pub fn retry_after(&self) -> Option<u64> {
        let now = now_millis();
        match self {
            AppError::QuotaExceeded { reset_at_ms, .. } => Some(secs_until(now, *reset_at_ms)),
            AppError::AccountLocked { locked_until_ms } => Some(secs_until(now, *locked_until_ms)),
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let retry_after = self.retry_after();
        let message = match self {
            AppError::QuotaExceeded { .. } => format!(
                "请求过于频繁，请在{}秒后重试",
                retry_after.unwrap_or(1)
            ),
            AppError::AccountLocked { locked_until_ms } => {
                let until = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(*locked_until_ms)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                format!("登录失败次数过多，账户已锁定至 {}", until)
            }
            AppError::CaptchaRequired => "请完成人机验证后重试".to_string(),
            AppError::CaptchaInvalid => "人机验证未通过".to_string(),
            AppError::MisconfiguredVerifier => "人机验证服务未配置".to_string(),
            AppError::InvalidCredentials { .. } => "用户名或密码错误".to_string(),
            AppError::Unauthorized => "未授权访问".to_string(),
            AppError::InternalServerError => "内部服务器错误".to_string(),
        };

        let (captcha_required, attempts_remaining) = match self {
            AppError::InvalidCredentials {
                captcha_required,
                attempts_remaining,
            } => (Some(*captcha_required), *attempts_remaining),
            _ => (None, None),
        };

        ErrorBody {
            error: self.code(),
            message,
            retry_after,
            captcha_required,
            attempts_remaining,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        let retry_after = body.retry_after;

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
