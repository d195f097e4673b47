use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use backend_guard::{
    AppState, app,
    cache::{CounterStore, MemoryStore, RedisStore, SlidingWindowLimiter, TimeoutStore},
    captcha::RecaptchaVerifier,
    config::Config,
    failure::FailurePolicy,
    login::LoginAttemptTracker,
    quota::{PgSubscriptionLookup, QuotaResolver},
    routes::user::PgUserRepository,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 选择计数存储：配置了 Redis 时多实例共享，否则退化为单实例内存存储
async fn counter_store(config: &Config) -> Arc<dyn CounterStore> {
    match config.redis_url.as_deref() {
        Some(url) => {
            let redis = RedisStore::connect(url)
                .await
                .expect("Failed to connect to Redis");
            tracing::info!(timeout_ms = config.store_timeout_ms, "Using Redis counter store");
            Arc::new(TimeoutStore::new(redis, config.store_timeout()))
        }
        None => {
            tracing::warn!(
                "REDIS_URL is not set: running with the in-memory counter store. \
                 Limits and lockouts are NOT shared between instances"
            );
            let memory = Arc::new(MemoryStore::new());
            // 进程退出时随运行时一起结束
            let _sweeper = memory.clone().spawn_sweeper(Duration::from_secs(30));
            memory
        }
    }
}

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");
    if let Err(e) = config.tier_table().validate() {
        panic!("Invalid rate limit configuration: {}", e);
    }

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'backend_guard';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    let store = counter_store(&config).await;
    let failures = Arc::new(FailurePolicy::new());

    // 生产环境缺少验证码密钥时拒绝启动
    let verifier = RecaptchaVerifier::new(config.captcha())
        .expect("Captcha verifier is misconfigured");

    let limiter = SlidingWindowLimiter::new(store.clone(), failures.clone());
    let resolver = QuotaResolver::new(
        Arc::new(PgSubscriptionLookup::new(pool.clone())),
        config.tier_table(),
        config.tier_cache_ttl(),
    );
    let tracker = LoginAttemptTracker::new(
        store,
        Arc::new(verifier),
        config.login_policy(),
        failures,
    );

    let state = AppState {
        users: Arc::new(PgUserRepository::new(pool)),
        config: config.clone(),
        limiter,
        resolver,
        tracker,
    };
    let gates = state.gates();
    let router = app(state, gates);

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
