use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{CounterStore, StoreError};
use crate::cache::models::WindowOutcome;

#[derive(Debug)]
enum Value {
    Text(String),
    Window(Vec<(i64, String)>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// 进程内存储，仅限单实例部署
///
/// 所有操作都在一次加锁内完成，因此同一进程内计数是原子的；多个实例之间互不可见，
/// 不能提供跨实例的限流或锁定保证。Redis 不可用时作为降级模式使用。
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

fn expiry(ttl_secs: u64) -> Option<Instant> {
    Some(Instant::now() + Duration::from_secs(ttl_secs))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清除已过期的键，返回清除数量
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.live(now));
        before - entries.len()
    }

    /// 后台定期清理；内存后端没有原生 TTL，调用方可通过 `JoinHandle::abort` 取消
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired in-memory counter keys");
                }
            }
        })
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn sliding_window(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: u64,
        max: u32,
        member: &str,
        ttl_secs: u64,
    ) -> Result<WindowOutcome, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let (mut events, expires_at) = match entries.remove(key) {
            Some(Entry {
                value: Value::Window(events),
                expires_at,
            }) if expires_at.is_none_or(|at| at > now) => (events, expires_at),
            _ => (Vec::new(), None),
        };

        let floor = now_ms - window_ms as i64;
        events.retain(|(score, _)| *score > floor);
        let count = events.len() as u32;
        let oldest_ms = events.iter().map(|(score, _)| *score).min().unwrap_or(now_ms);

        let admitted = count < max;
        let expires_at = if admitted {
            events.push((now_ms, member.to_string()));
            expiry(ttl_secs)
        } else {
            expires_at
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Window(events),
                expires_at,
            },
        );

        Ok(WindowOutcome {
            admitted,
            count,
            oldest_ms,
        })
    }

    async fn window_usage(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: u64,
    ) -> Result<(u32, Option<i64>), StoreError> {
        let entries = self.entries.lock().await;
        let floor = now_ms - window_ms as i64;
        match entries.get(key) {
            Some(Entry {
                value: Value::Window(events),
                expires_at,
            }) if expires_at.is_none_or(|at| at > Instant::now()) => {
                let live: Vec<i64> = events
                    .iter()
                    .map(|(score, _)| *score)
                    .filter(|score| *score > floor)
                    .collect();
                Ok((live.len() as u32, live.iter().copied().min()))
            }
            _ => Ok((0, None)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(match entries.get(key) {
            Some(entry) if entry.live(Instant::now()) => match &entry.value {
                Value::Text(text) => Some(text.clone()),
                Value::Window(_) => None,
            },
            _ => None,
        })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: expiry(ttl_secs),
            },
        );
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let current = match entries.get(key) {
            Some(Entry {
                value: Value::Text(text),
                expires_at,
            }) if expires_at.is_none_or(|at| at > now) => Some(text.as_str()),
            _ => None,
        };
        if current != expected {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: expiry(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let (current, expires_at) = match entries.get(key) {
            Some(entry) if entry.live(now) => match &entry.value {
                Value::Text(text) => (text.parse::<i64>().unwrap_or(0), entry.expires_at),
                Value::Window(_) => (0, entry.expires_at),
            },
            _ => (0, None),
        };

        let next = current + by;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = expiry(ttl_secs);
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
