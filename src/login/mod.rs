//! 登录暴力破解防护
//!
//! 状态：`Clean → Warned → CaptchaRequired → Locked → Clean`。失败计数在滚动窗口内累计，
//! 达到验证码阈值后要求人机验证，达到锁定阈值后按指数退避锁定账户。

use std::time::Duration;

use crate::cache::models::LoginAttemptRecord;

mod tracker;

pub use tracker::LoginAttemptTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPolicy {
    /// 达到该失败次数后要求验证码
    pub captcha_threshold: u32,
    /// 达到该失败次数后锁定
    pub lockout_threshold: u32,
    pub window: Duration,
    pub base_lockout: Duration,
    /// 退避倍数上限
    pub max_lockout_multiplier: u32,
    /// 有过锁定的记录至少保留这么久，用于累计退避
    pub backoff_memory: Duration,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            captcha_threshold: 3,
            lockout_threshold: 5,
            window: Duration::from_secs(60),
            base_lockout: Duration::from_secs(15 * 60),
            max_lockout_multiplier: 8,
            backoff_memory: Duration::from_secs(24 * 3600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    Clean,
    Warned { failures: u32 },
    CaptchaRequired { failures: u32 },
    Locked { until_ms: i64 },
}

impl LoginPolicy {
    fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }

    /// 第 `lockout_count` 次锁定的时长：`base × min(2^(n-1), cap)`
    pub fn lockout_duration(&self, lockout_count: u32) -> Duration {
        let exponent = lockout_count.saturating_sub(1).min(31);
        let multiplier = (1u32 << exponent).min(self.max_lockout_multiplier.max(1));
        self.base_lockout * multiplier
    }

    pub fn window_expired(&self, record: &LoginAttemptRecord, now_ms: i64) -> bool {
        now_ms - record.window_start > self.window_ms()
    }

    pub fn status_of(&self, record: Option<&LoginAttemptRecord>, now_ms: i64) -> LoginStatus {
        let Some(record) = record else {
            return LoginStatus::Clean;
        };

        if let Some(until_ms) = record.locked_until.filter(|until| *until > now_ms) {
            return LoginStatus::Locked { until_ms };
        }
        if record.lock_expired_at(now_ms) || self.window_expired(record, now_ms) {
            return LoginStatus::Clean;
        }

        match record.count {
            0 => LoginStatus::Clean,
            failures if record.captcha_required || failures >= self.captcha_threshold => {
                LoginStatus::CaptchaRequired { failures }
            }
            failures => LoginStatus::Warned { failures },
        }
    }

    /// 锁定过期后清除计数与锁定字段，退避次数保留
    pub fn clear_expired_lock(&self, record: &mut LoginAttemptRecord, now_ms: i64) -> bool {
        if !record.lock_expired_at(now_ms) {
            return false;
        }
        record.count = 0;
        record.window_start = now_ms;
        record.locked_until = None;
        record.captcha_required = false;
        true
    }

    /// 记一次失败，返回是否因此新触发了锁定
    pub fn apply_failure(&self, record: &mut LoginAttemptRecord, now_ms: i64) -> bool {
        self.clear_expired_lock(record, now_ms);

        if self.window_expired(record, now_ms) {
            record.count = 0;
            record.window_start = now_ms;
            record.captcha_required = false;
        }

        record.count += 1;
        record.last_attempt = now_ms;

        if record.count >= self.captcha_threshold {
            record.captcha_required = true;
        }

        // 已锁定时只计数，不重复升级，也不缩短
        if record.count >= self.lockout_threshold && !record.is_locked_at(now_ms) {
            record.lockout_count += 1;
            let until = now_ms + self.lockout_duration(record.lockout_count).as_millis() as i64;
            record.locked_until = Some(record.locked_until.map_or(until, |prev| prev.max(until)));
            return true;
        }
        false
    }

    /// 记录的存活时间（秒）
    pub fn record_ttl_secs(&self, record: &LoginAttemptRecord, now_ms: i64) -> u64 {
        let base = match record.locked_until {
            Some(until) if until > now_ms => ((until - now_ms) as u64).div_ceil(1000),
            _ => self.window.as_secs(),
        };
        let ttl = if record.lockout_count > 0 {
            base.max(self.backoff_memory.as_secs())
        } else {
            base
        };
        ttl.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;

    #[test]
    fn lockout_doubles_and_caps() {
        let policy = LoginPolicy::default();
        let base = Duration::from_secs(900);
        assert_eq!(policy.lockout_duration(1), base);
        assert_eq!(policy.lockout_duration(2), base * 2);
        assert_eq!(policy.lockout_duration(3), base * 4);
        assert_eq!(policy.lockout_duration(4), base * 8);
        assert_eq!(policy.lockout_duration(5), base * 8);
        assert_eq!(policy.lockout_duration(40), base * 8);
    }

    #[test]
    fn states_progress_with_failures() {
        let policy = LoginPolicy::default();
        let mut record = LoginAttemptRecord::new("user:alice", 0);
        let mut seen = Vec::new();
        for i in 0..5 {
            policy.apply_failure(&mut record, i * 1_000);
            seen.push(policy.status_of(Some(&record), i * 1_000));
        }

        assert_eq!(seen[0], LoginStatus::Warned { failures: 1 });
        assert_eq!(seen[1], LoginStatus::Warned { failures: 2 });
        assert_eq!(seen[2], LoginStatus::CaptchaRequired { failures: 3 });
        assert_eq!(seen[3], LoginStatus::CaptchaRequired { failures: 4 });
        assert_eq!(
            seen[4],
            LoginStatus::Locked {
                until_ms: 4_000 + 15 * MINUTE
            }
        );
    }

    #[test]
    fn window_expiry_resets_count_but_keeps_lockout_count() {
        let policy = LoginPolicy::default();
        let mut record = LoginAttemptRecord::new("x", 0);
        record.lockout_count = 2;
        record.count = 4;
        record.captcha_required = true;

        policy.apply_failure(&mut record, 2 * MINUTE);
        assert_eq!(record.count, 1);
        assert_eq!(record.lockout_count, 2);
        assert!(!record.captcha_required);
    }

    #[test]
    fn locked_until_is_never_shortened() {
        let policy = LoginPolicy {
            base_lockout: Duration::from_secs(60),
            ..LoginPolicy::default()
        };
        let mut record = LoginAttemptRecord::new("x", 0);
        for i in 0..5 {
            policy.apply_failure(&mut record, i);
        }
        let first_until = record.locked_until.unwrap();

        // 并发漏进来的失败不会再次升级
        assert!(!policy.apply_failure(&mut record, 10));
        assert_eq!(record.locked_until, Some(first_until));
        assert_eq!(record.lockout_count, 1);
    }

    #[test]
    fn expired_lock_is_cleared_lazily() {
        let policy = LoginPolicy::default();
        let mut record = LoginAttemptRecord::new("x", 0);
        for i in 0..5 {
            policy.apply_failure(&mut record, i);
        }
        let after = record.locked_until.unwrap();

        assert_eq!(policy.status_of(Some(&record), after), LoginStatus::Clean);
        assert!(policy.clear_expired_lock(&mut record, after));
        assert_eq!(record.count, 0);
        assert_eq!(record.locked_until, None);
        assert_eq!(record.lockout_count, 1);
    }

    #[test]
    fn ttl_follows_lock_then_backoff_memory() {
        let policy = LoginPolicy::default();
        let mut record = LoginAttemptRecord::new("x", 0);
        policy.apply_failure(&mut record, 0);
        assert_eq!(policy.record_ttl_secs(&record, 0), 60);

        record.lockout_count = 1;
        record.locked_until = Some(15 * MINUTE);
        assert_eq!(policy.record_ttl_secs(&record, 0), 86_400);

        let short_memory = LoginPolicy {
            backoff_memory: Duration::from_secs(1),
            ..LoginPolicy::default()
        };
        assert_eq!(short_memory.record_ttl_secs(&record, 0), 900);
    }
}
