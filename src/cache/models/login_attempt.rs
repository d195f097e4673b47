use serde::{Deserialize, Serialize};

/// 登录失败记录
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LoginAttemptRecord {
    pub identifier: String,
    pub count: u32,
    pub window_start: i64,  // 毫秒
    pub last_attempt: i64,  // 毫秒
    pub locked_until: Option<i64>,
    pub captcha_required: bool,
    /// 只有登录成功才会清零
    pub lockout_count: u32,
    /// 乐观并发版本号
    #[serde(default)]
    pub version: u64,
}

impl LoginAttemptRecord {
    pub fn new(identifier: &str, now_ms: i64) -> Self {
        Self {
            identifier: identifier.to_string(),
            count: 0,
            window_start: now_ms,
            last_attempt: now_ms,
            locked_until: None,
            captcha_required: false,
            lockout_count: 0,
            version: 0,
        }
    }

    pub fn is_locked_at(&self, now_ms: i64) -> bool {
        self.locked_until.is_some_and(|until| until > now_ms)
    }

    /// 锁定已过期
    pub fn lock_expired_at(&self, now_ms: i64) -> bool {
        self.locked_until.is_some_and(|until| until <= now_ms)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_record_reloads_exactly() {
        let record = LoginAttemptRecord {
            identifier: "user:alice".into(),
            count: 5,
            window_start: 1_700_000_000_000,
            last_attempt: 1_700_000_004_000,
            locked_until: Some(1_700_000_904_000),
            captcha_required: true,
            lockout_count: 2,
            version: 7,
        };

        let reloaded = LoginAttemptRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, record);
        assert_eq!(reloaded.count, 5);
        assert_eq!(reloaded.locked_until, Some(1_700_000_904_000));
        assert_eq!(reloaded.lockout_count, 2);
    }

    #[test]
    fn lock_window_edges() {
        let mut record = LoginAttemptRecord::new("x", 0);
        assert!(!record.is_locked_at(0));
        record.locked_until = Some(100);
        assert!(record.is_locked_at(99));
        assert!(!record.is_locked_at(100));
        assert!(record.lock_expired_at(100));
    }
}
