use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use super::{LoginPolicy, LoginStatus};
use crate::cache::keys::login_attempts_key;
use crate::cache::models::LoginAttemptRecord;
use crate::cache::store::{CounterStore, StoreError};
use crate::captcha::{CaptchaError, CaptchaVerifier};
use crate::error::AppError;
use crate::failure::FailurePolicy;
use crate::metrics::LOGIN_EVENTS;
use crate::utils::{hash_identifier, now_millis};

/// 写冲突的重试时限。每轮冲突至少有一个写入成功，时限内同一标识上的突发都能排空
const CAS_RETRY_BUDGET: Duration = Duration::from_secs(3);

/// 前几次冲突只让出执行权，之后按次数线性退避，最多 10ms
const CAS_YIELD_ATTEMPTS: u32 = 8;

async fn cas_backoff(attempt: u32) {
    if attempt < CAS_YIELD_ATTEMPTS {
        tokio::task::yield_now().await;
    } else {
        sleep(Duration::from_millis(u64::from(attempt.min(10)))).await;
    }
}

/// 登录失败跟踪
///
/// 记录按标识保存在共享存储中，读改写通过 compare-and-set 完成，不持有进程内锁。
/// 存储不可用时锁定检查放行，事件仍尽量写日志；存储恢复后已持久化的锁定继续生效。
#[derive(Clone)]
pub struct LoginAttemptTracker {
    store: Arc<dyn CounterStore>,
    captcha: Arc<dyn CaptchaVerifier>,
    policy: LoginPolicy,
    failures: Arc<FailurePolicy>,
}

impl LoginAttemptTracker {
    pub fn new(
        store: Arc<dyn CounterStore>,
        captcha: Arc<dyn CaptchaVerifier>,
        policy: LoginPolicy,
        failures: Arc<FailurePolicy>,
    ) -> Self {
        Self {
            store,
            captcha,
            policy,
            failures,
        }
    }

    pub fn policy(&self) -> &LoginPolicy {
        &self.policy
    }

    async fn load(&self, key: &str) -> Result<Option<(String, LoginAttemptRecord)>, StoreError> {
        match self.store.get(key).await? {
            Some(json) => {
                let record = LoginAttemptRecord::from_json(&json)?;
                Ok(Some((json, record)))
            }
            None => Ok(None),
        }
    }

    /// 读改写，冲突时重试直到写入或超出时限；`apply` 返回 false 表示无需写回
    async fn update<F>(
        &self,
        identifier: &str,
        now_ms: i64,
        mut apply: F,
    ) -> Result<Option<LoginAttemptRecord>, StoreError>
    where
        F: FnMut(&mut LoginAttemptRecord) -> bool + Send,
    {
        let key = login_attempts_key(identifier);
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            let current = self.load(&key).await?;
            let (expected, mut record) = match current {
                Some((json, record)) => (Some(json), record),
                None => (None, LoginAttemptRecord::new(identifier, now_ms)),
            };

            if !apply(&mut record) {
                return Ok(expected.map(|_| record));
            }
            record.version += 1;

            let ttl = self.policy.record_ttl_secs(&record, now_ms);
            let json = record.to_json()?;
            if self
                .store
                .compare_and_set(&key, expected.as_deref(), &json, ttl)
                .await?
            {
                return Ok(Some(record));
            }

            attempt += 1;
            if started.elapsed() >= CAS_RETRY_BUDGET {
                return Err(StoreError::Conflict(key));
            }
            cas_backoff(attempt).await;
        }
    }

    pub async fn status(&self, identifier: &str) -> LoginStatus {
        self.status_at(identifier, now_millis()).await
    }

    /// 锁定检查；存储故障时放行
    pub async fn status_at(&self, identifier: &str, now_ms: i64) -> LoginStatus {
        let key = login_attempts_key(identifier);
        let record = match self.load(&key).await {
            Ok(record) => record.map(|(_, record)| record),
            Err(e) => {
                self.failures.store_unavailable("login_tracker", &key, &e);
                return LoginStatus::Clean;
            }
        };

        if record.as_ref().is_some_and(|r| r.lock_expired_at(now_ms)) {
            let policy = self.policy.clone();
            if let Err(e) = self
                .update(identifier, now_ms, |r| policy.clear_expired_lock(r, now_ms))
                .await
            {
                tracing::warn!(key = %key, error = %e, "Failed to clear expired lockout");
            }
        }

        self.policy.status_of(record.as_ref(), now_ms)
    }

    pub async fn guard(
        &self,
        identifier: &str,
        captcha_token: Option<&str>,
        remote_ip: Option<&str>,
    ) -> Result<(), AppError> {
        self.guard_at(identifier, captcha_token, remote_ip, now_millis())
            .await
    }

    /// 校验前的准入：锁定则拒绝；需要验证码时校验令牌，缺失或无效都记为一次失败
    pub async fn guard_at(
        &self,
        identifier: &str,
        captcha_token: Option<&str>,
        remote_ip: Option<&str>,
        now_ms: i64,
    ) -> Result<(), AppError> {
        match self.status_at(identifier, now_ms).await {
            LoginStatus::Locked { until_ms } => {
                LOGIN_EVENTS.with_label_values(&["locked_rejected"]).inc();
                tracing::warn!(
                    target: "audit",
                    event = "login_rejected_locked",
                    identifier_hash = %hash_identifier(identifier),
                    locked_until = until_ms,
                    "Login attempt rejected, account locked"
                );
                Err(AppError::AccountLocked {
                    locked_until_ms: until_ms,
                })
            }
            LoginStatus::CaptchaRequired { .. } => {
                let Some(token) = captcha_token.filter(|t| !t.trim().is_empty()) else {
                    self.record_failure_at(identifier, now_ms).await;
                    return Err(AppError::CaptchaRequired);
                };

                match self.captcha.verify(token, remote_ip).await {
                    Ok(verdict) if verdict.passed => Ok(()),
                    Ok(_) => {
                        self.record_failure_at(identifier, now_ms).await;
                        Err(AppError::CaptchaInvalid)
                    }
                    Err(CaptchaError::Misconfigured) => {
                        tracing::error!("Captcha verifier misconfigured, refusing login");
                        Err(AppError::MisconfiguredVerifier)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Captcha verification unavailable");
                        Err(AppError::CaptchaInvalid)
                    }
                }
            }
            LoginStatus::Clean | LoginStatus::Warned { .. } => Ok(()),
        }
    }

    pub async fn record_failure(&self, identifier: &str) -> Option<LoginAttemptRecord> {
        self.record_failure_at(identifier, now_millis()).await
    }

    /// 记一次失败，存储故障时只写日志
    pub async fn record_failure_at(
        &self,
        identifier: &str,
        now_ms: i64,
    ) -> Option<LoginAttemptRecord> {
        let policy = self.policy.clone();
        let mut newly_locked = false;
        let result = self
            .update(identifier, now_ms, |record| {
                newly_locked = policy.apply_failure(record, now_ms);
                true
            })
            .await;

        let identifier_hash = hash_identifier(identifier);
        match result {
            Ok(Some(record)) => {
                LOGIN_EVENTS.with_label_values(&["attempt_failed"]).inc();
                tracing::info!(
                    target: "audit",
                    event = "attempt_failed",
                    identifier_hash = %identifier_hash,
                    count = record.count,
                    captcha_required = record.captcha_required,
                    "Failed login attempt recorded"
                );
                if newly_locked {
                    LOGIN_EVENTS.with_label_values(&["account_locked"]).inc();
                    let duration = self.policy.lockout_duration(record.lockout_count);
                    tracing::warn!(
                        target: "audit",
                        event = "account_locked",
                        identifier_hash = %identifier_hash,
                        lockout_count = record.lockout_count,
                        lockout_secs = duration.as_secs(),
                        locked_until = ?record.locked_until,
                        "Account locked after repeated failed logins"
                    );
                }
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                if let StoreError::Conflict(key) = &e {
                    // 存储可用，只是写不进去
                    tracing::warn!(key = %key, "Login attempt record is under heavy write contention");
                } else {
                    self.failures
                        .store_unavailable("login_tracker", &login_attempts_key(identifier), &e);
                }
                tracing::info!(
                    target: "audit",
                    event = "attempt_failed",
                    identifier_hash = %identifier_hash,
                    persisted = false,
                    "Failed login attempt could not be persisted"
                );
                None
            }
        }
    }

    /// 登录成功，整条记录删除（包括退避次数）
    pub async fn record_success(&self, identifier: &str) {
        self.clear(identifier, "attempts_cleared").await;
    }

    /// 运维手动解锁
    pub async fn unlock(&self, identifier: &str) {
        self.clear(identifier, "attempts_unlocked").await;
    }

    async fn clear(&self, identifier: &str, event: &'static str) {
        let key = login_attempts_key(identifier);
        let identifier_hash = hash_identifier(identifier);
        match self.store.del(&key).await {
            Ok(()) => {
                LOGIN_EVENTS.with_label_values(&[event]).inc();
                tracing::info!(
                    target: "audit",
                    event,
                    identifier_hash = %identifier_hash,
                    "Login attempt record cleared"
                );
            }
            Err(e) => {
                self.failures.store_unavailable("login_tracker", &key, &e);
                tracing::info!(
                    target: "audit",
                    event,
                    identifier_hash = %identifier_hash,
                    persisted = false,
                    "Login attempt record could not be cleared"
                );
            }
        }
    }

    /// 读取当前记录
    pub async fn record(&self, identifier: &str) -> Result<Option<LoginAttemptRecord>, StoreError> {
        Ok(self
            .load(&login_attempts_key(identifier))
            .await?
            .map(|(_, record)| record))
    }
}
