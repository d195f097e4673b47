use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};

use super::{CounterStore, StoreError};
use crate::cache::models::WindowOutcome;

/// 删除过期条目、计数、按需写入并刷新 TTL，整体在服务端原子执行
const SLIDING_WINDOW_LUA: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local max = tonumber(ARGV[3])
local member = ARGV[4]
local ttl = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)

local oldest = now
local first = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if first[2] then
    oldest = tonumber(first[2])
end

if count >= max then
    return {0, count, oldest}
end

redis.call('ZADD', key, now, member)
redis.call('EXPIRE', key, ttl)
return {1, count, oldest}
"#;

const WINDOW_USAGE_LUA: &str = r#"
local key = KEYS[1]
local floor = '(' .. (tonumber(ARGV[1]) - tonumber(ARGV[2]))
local count = redis.call('ZCOUNT', key, floor, '+inf')
local first = redis.call('ZRANGEBYSCORE', key, floor, '+inf', 'WITHSCORES', 'LIMIT', 0, 1)
if first[2] then
    return {count, tonumber(first[2])}
end
return {count}
"#;

const COMPARE_AND_SET_LUA: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '0' then
    if current then
        return 0
    end
elseif current ~= ARGV[2] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[3], 'EX', tonumber(ARGV[4]))
return 1
"#;

/// Redis 后端，多实例共享同一计数
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    sliding_window: Script,
    window_usage: Script,
    compare_and_set: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        // 启动时确认可连通
        let mut ping = conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut ping).await?;
        tracing::debug!("Connected to Redis counter store");

        Ok(Self {
            conn,
            sliding_window: Script::new(SLIDING_WINDOW_LUA),
            window_usage: Script::new(WINDOW_USAGE_LUA),
            compare_and_set: Script::new(COMPARE_AND_SET_LUA),
        })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn sliding_window(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: u64,
        max: u32,
        member: &str,
        ttl_secs: u64,
    ) -> Result<WindowOutcome, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Vec<i64> = self
            .sliding_window
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(max)
            .arg(member)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        match reply.as_slice() {
            [admitted, count, oldest] => Ok(WindowOutcome {
                admitted: *admitted == 1,
                count: (*count).max(0) as u32,
                oldest_ms: *oldest,
            }),
            _ => Err(StoreError::Redis(redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "unexpected sliding window reply",
            )))),
        }
    }

    async fn window_usage(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: u64,
    ) -> Result<(u32, Option<i64>), StoreError> {
        let mut conn = self.conn.clone();
        let reply: Vec<i64> = self
            .window_usage
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        let count = reply.first().copied().unwrap_or(0).max(0) as u32;
        Ok((count, reply.get(1).copied()))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let written: i64 = self
            .compare_and_set
            .key(key)
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or(""))
            .arg(value)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, by).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.expire(key, ttl_secs as i64).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
