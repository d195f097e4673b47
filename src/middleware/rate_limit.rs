use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::cache::keys::{RateKey, SHARED_FALLBACK};
use crate::cache::operations::{RateLimitDecision, SlidingWindowLimiter};
use crate::error::AppError;
use crate::metrics::RATE_LIMIT_DECISIONS;
use crate::quota::{EndpointClass, QuotaResolver};
use crate::utils::Claims;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// 从请求中取限流标识，返回 None 表示该请求不适用此门
pub type KeyFn = Arc<dyn Fn(&Request<Body>) -> Option<RateKey> + Send + Sync>;

/// 来源地址
///
/// `trusted_hops` 是应用前方可信代理的层数。为 0 时代理头一概不信，只用连接地址；
/// 否则取 `x-forwarded-for` 从右数第 `trusted_hops` 个条目，即最右侧的非可信一跳，
/// 客户端自己填写的左侧条目不会被采用。
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>, trusted_hops: usize) -> String {
    let remote_ip = remote.map(|addr| addr.ip().to_string());
    if trusted_hops == 0 {
        return remote_ip.unwrap_or_else(|| SHARED_FALLBACK.to_string());
    }

    let forwarded: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(','))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .collect();

    forwarded
        .len()
        .checked_sub(trusted_hops)
        .and_then(|i| forwarded.get(i))
        .or(forwarded.first())
        .copied()
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .or(remote_ip.as_deref())
        .unwrap_or(SHARED_FALLBACK)
        .to_string()
}

pub fn address_key(req: &Request<Body>, trusted_hops: usize) -> Option<RateKey> {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    Some(RateKey::ip(client_ip(req.headers(), remote, trusted_hops)))
}

/// 认证中间件写入的用户身份
pub fn user_key(req: &Request<Body>) -> Option<RateKey> {
    req.extensions()
        .get::<Claims>()
        .map(|claims| RateKey::user(claims.sub.clone()))
}

pub fn api_key_key(req: &Request<Body>) -> Option<RateKey> {
    req.headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(RateKey::api_key)
}

/// 已认证按用户，否则按地址
pub fn identity_key(req: &Request<Body>, trusted_hops: usize) -> Option<RateKey> {
    user_key(req).or_else(|| address_key(req, trusted_hops))
}

fn address_key_fn(trusted_hops: usize) -> KeyFn {
    Arc::new(move |req: &Request<Body>| address_key(req, trusted_hops))
}

/// 准入门：提取标识、解析等级上限、原子计数，并把结果写进响应头
pub struct AdmissionGate {
    limiter: SlidingWindowLimiter,
    resolver: QuotaResolver,
    key_fn: KeyFn,
    class: EndpointClass,
    skip_anonymous: bool,
}

impl AdmissionGate {
    pub fn new(
        limiter: SlidingWindowLimiter,
        resolver: QuotaResolver,
        key_fn: KeyFn,
        class: EndpointClass,
    ) -> Self {
        Self {
            limiter,
            resolver,
            key_fn,
            class,
            skip_anonymous: false,
        }
    }

    /// 没有标识的请求直接放行，不计数
    pub fn skip_anonymous(mut self) -> Self {
        self.skip_anonymous = true;
        self
    }

    /// 全局按地址限流
    pub fn ddos_guard(
        limiter: SlidingWindowLimiter,
        resolver: QuotaResolver,
        trusted_hops: usize,
    ) -> Self {
        Self::new(
            limiter,
            resolver,
            address_key_fn(trusted_hops),
            EndpointClass::Default,
        )
    }

    /// 认证类端点，按地址收紧上限
    pub fn strict(
        limiter: SlidingWindowLimiter,
        resolver: QuotaResolver,
        trusted_hops: usize,
    ) -> Self {
        Self::new(
            limiter,
            resolver,
            address_key_fn(trusted_hops),
            EndpointClass::Strict,
        )
    }

    /// 需放在认证中间件之后；匿名请求由地址限流覆盖
    pub fn per_user(limiter: SlidingWindowLimiter, resolver: QuotaResolver) -> Self {
        Self::new(limiter, resolver, Arc::new(user_key), EndpointClass::PerUser).skip_anonymous()
    }

    pub fn per_api_key(limiter: SlidingWindowLimiter, resolver: QuotaResolver) -> Self {
        Self::new(limiter, resolver, Arc::new(api_key_key), EndpointClass::PerApiKey)
            .skip_anonymous()
    }

    pub fn class(&self) -> EndpointClass {
        self.class
    }

    /// 同步提取标识，调用方不必把请求借用带过 await
    pub fn key_for(&self, req: &Request<Body>) -> Option<RateKey> {
        (self.key_fn)(req)
    }

    /// 判定一个标识；`None` 表示此门不适用
    pub async fn admit(&self, key: Option<RateKey>) -> Option<RateLimitDecision> {
        let key = match key {
            Some(key) => key,
            None if self.skip_anonymous => return None,
            None => RateKey::ip(SHARED_FALLBACK),
        };

        if key.is_shared_fallback() {
            tracing::debug!(class = self.class.as_str(), "No client address, using shared bucket");
        }

        let (tier, max, window) = self.resolver.limit(&key, self.class).await;
        let decision = self
            .limiter
            .check(self.class.as_str(), &key, window.as_millis() as u64, max)
            .await;

        let outcome = if decision.allowed { "allowed" } else { "rejected" };
        RATE_LIMIT_DECISIONS
            .with_label_values(&[self.class.as_str(), outcome])
            .inc();

        if !decision.allowed {
            tracing::warn!(
                key = %key,
                tier = %tier,
                class = self.class.as_str(),
                limit = decision.limit,
                reset_at = decision.reset_at_ms,
                "Request rejected by admission gate"
            );
        }

        Some(decision)
    }
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let reset_secs = (decision.reset_at_ms.max(0) as u64).div_ceil(1000);
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_secs));
}

pub async fn rate_limit(
    State(gate): State<Arc<AdmissionGate>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = gate.key_for(&req);
    let Some(decision) = gate.admit(key).await else {
        return next.run(req).await;
    };

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        AppError::QuotaExceeded {
            limit: decision.limit,
            reset_at_ms: decision.reset_at_ms,
        }
        .into_response()
    };

    // 放行时保留内层（更具体的）准入门写入的头
    if !decision.allowed || !response.headers().contains_key(X_RATELIMIT_LIMIT) {
        apply_headers(response.headers_mut(), &decision);
    }
    response
}
