use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower::ServiceBuilder;

use cache::SlidingWindowLimiter;
use config::Config;
use login::LoginAttemptTracker;
use middleware::{AdmissionGate, auth_middleware, log_errors, rate_limit};
use quota::QuotaResolver;
use routes::user::UserRepository;

pub mod cache;
pub mod captcha;
pub mod config;
pub mod error;
pub mod failure;
pub mod login;
pub mod metrics;
pub mod middleware;
pub mod quota;
pub mod routes;
pub mod utils;

#[cfg(test)]
mod test_support;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub config: Config,
    pub limiter: SlidingWindowLimiter,
    pub resolver: QuotaResolver,
    pub tracker: LoginAttemptTracker,
}

impl AppState {
    /// 四个准入门共用同一个限流器与等级解析器，各自按端点类别分开计数
    pub fn gates(&self) -> Gates {
        let limiter = || self.limiter.clone();
        let resolver = || self.resolver.clone();
        let hops = self.config.trusted_proxy_hops;
        Gates {
            ddos: Arc::new(AdmissionGate::ddos_guard(limiter(), resolver(), hops)),
            strict: Arc::new(AdmissionGate::strict(limiter(), resolver(), hops)),
            per_user: Arc::new(AdmissionGate::per_user(limiter(), resolver())),
            per_api_key: Arc::new(AdmissionGate::per_api_key(limiter(), resolver())),
        }
    }
}

#[derive(Clone)]
pub struct Gates {
    pub ddos: Arc<AdmissionGate>,
    pub strict: Arc<AdmissionGate>,
    pub per_user: Arc<AdmissionGate>,
    pub per_api_key: Arc<AdmissionGate>,
}

/// 组装路由：全局按地址限流，登录走严格限流，受保护路由先认证再按用户限流
pub fn app(state: AppState, gates: Gates) -> Router {
    let auth_routes = Router::new()
        .route("/users/login", post(routes::user::login))
        .layer(from_fn_with_state(gates.strict, rate_limit));

    // layer 后加的先执行：认证在按用户限流之前
    let protected_routes = Router::new()
        .route("/users/me", get(routes::user::me))
        .layer(from_fn_with_state(gates.per_user, rate_limit))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let api_routes = Router::new()
        .route("/api/usage", get(routes::usage::api_key_usage))
        .layer(from_fn_with_state(gates.per_api_key, rate_limit));

    Router::new()
        .merge(auth_routes)
        .merge(protected_routes)
        .merge(api_routes)
        .route("/metrics", get(routes::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(gates.ddos, rate_limit))
                .layer(from_fn(log_errors)),
        )
        .with_state(state)
}
