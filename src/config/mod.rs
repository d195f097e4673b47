use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::captcha::CaptchaConfig;
use crate::login::LoginPolicy;
use crate::quota::{ClassLimit, TierTable};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub app_env: String,
    pub store_timeout_ms: u64,
    /// 前置可信代理层数，为 0 时不读取代理头
    pub trusted_proxy_hops: usize,
    // 限流
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub rate_limit_strict_requests: u32,
    pub rate_limit_user_requests: u32,
    pub rate_limit_api_key_requests: u32,
    pub tier_pro_multiplier: u32,
    pub tier_enterprise_multiplier: u32,
    pub tier_cache_ttl_secs: u64,
    // 登录保护
    pub login_captcha_threshold: u32,
    pub login_lockout_threshold: u32,
    pub login_window_secs: u64,
    pub login_base_lockout_secs: u64,
    pub login_max_lockout_multiplier: u32,
    pub login_backoff_memory_secs: u64,
    // 验证码
    pub captcha_secret: Option<String>,
    pub captcha_verify_url: String,
    pub captcha_min_score: f64,
}

/// 读取可选环境变量，缺失或解析失败时使用默认值
fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .unwrap_or_else(|_| "24h".into())
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(24);

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: non_empty("REDIS_URL"),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "::".into()),
            server_port: var_or("SERVER_PORT", 3000),
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            store_timeout_ms: var_or("STORE_TIMEOUT_MS", 50),
            trusted_proxy_hops: var_or("TRUSTED_PROXY_HOPS", 0),
            rate_limit_window_secs: var_or("RATE_LIMIT_WINDOW", 60),
            rate_limit_requests: var_or("RATE_LIMIT_REQUESTS", 100),
            rate_limit_strict_requests: var_or("RATE_LIMIT_STRICT_REQUESTS", 10),
            rate_limit_user_requests: var_or("RATE_LIMIT_USER_REQUESTS", 300),
            rate_limit_api_key_requests: var_or("RATE_LIMIT_API_KEY_REQUESTS", 1000),
            tier_pro_multiplier: var_or("TIER_PRO_MULTIPLIER", 5),
            tier_enterprise_multiplier: var_or("TIER_ENTERPRISE_MULTIPLIER", 20),
            tier_cache_ttl_secs: var_or("TIER_CACHE_TTL", 60),
            login_captcha_threshold: var_or("LOGIN_CAPTCHA_THRESHOLD", 3),
            login_lockout_threshold: var_or("LOGIN_LOCKOUT_THRESHOLD", 5),
            login_window_secs: var_or("LOGIN_WINDOW", 60),
            login_base_lockout_secs: var_or("LOGIN_BASE_LOCKOUT", 900),
            login_max_lockout_multiplier: var_or("LOGIN_MAX_LOCKOUT_MULTIPLIER", 8),
            login_backoff_memory_secs: var_or("LOGIN_BACKOFF_MEMORY", 86_400),
            captcha_secret: non_empty("CAPTCHA_SECRET"),
            captcha_verify_url: env::var("CAPTCHA_VERIFY_URL")
                .unwrap_or_else(|_| crate::captcha::DEFAULT_VERIFY_URL.into()),
            captcha_min_score: var_or("CAPTCHA_MIN_SCORE", 0.5),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn tier_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.tier_cache_ttl_secs)
    }

    /// 各端点类别的免费档上限，付费档按倍数放大
    pub fn tier_table(&self) -> TierTable {
        let window = self.rate_limit_window();
        TierTable {
            default: ClassLimit::new(self.rate_limit_requests, window),
            strict: ClassLimit::new(self.rate_limit_strict_requests, window),
            per_user: ClassLimit::new(self.rate_limit_user_requests, window),
            per_api_key: ClassLimit::new(self.rate_limit_api_key_requests, window),
            pro_multiplier: self.tier_pro_multiplier,
            enterprise_multiplier: self.tier_enterprise_multiplier,
        }
    }

    pub fn login_policy(&self) -> LoginPolicy {
        LoginPolicy {
            captcha_threshold: self.login_captcha_threshold,
            lockout_threshold: self.login_lockout_threshold,
            window: Duration::from_secs(self.login_window_secs),
            base_lockout: Duration::from_secs(self.login_base_lockout_secs),
            max_lockout_multiplier: self.login_max_lockout_multiplier,
            backoff_memory: Duration::from_secs(self.login_backoff_memory_secs),
        }
    }

    pub fn captcha(&self) -> CaptchaConfig {
        CaptchaConfig {
            secret: self.captcha_secret.clone(),
            verify_url: self.captcha_verify_url.clone(),
            min_score: self.captcha_min_score,
            production: self.is_production(),
        }
    }
}
