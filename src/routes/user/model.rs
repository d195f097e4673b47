use async_trait::async_trait;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::utils::{hash_password, verify_password};

lazy_static! {
    /// 账户不存在或不能用密码登录时拿来比对，让这类失败与密码错误耗时相同
    static ref DUMMY_HASH: Option<String> = hash_password("backend-guard/unknown-account").ok();
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub nickname: String,
    pub is_temporary: bool,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
    /// 失败次数达到阈值后必须携带
    #[serde(default)]
    pub captcha_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub expires_at: i64,
}

/// 登录时按 ID 查用户
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, sqlx::Error> {
        User::find_by_id(&self.pool, user_id).await
    }
}

/// 对假哈希做一次完整的 bcrypt 校验，结果恒为 false
pub fn verify_absent(password: &str) -> Result<bool, bcrypt::BcryptError> {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        verify_password(password, hash)?;
    }
    Ok(false)
}

impl User {
    pub async fn find_by_id(pool: &PgPool, user_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, nickname, is_temporary, password_hash
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// 临时用户没有密码，永远校验失败
    pub fn verify_login(&self, password: &str) -> Result<bool, bcrypt::BcryptError> {
        match &self.password_hash {
            Some(hash) if !self.is_temporary => verify_password(password, hash),
            _ => verify_absent(password),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(password_hash: Option<String>, is_temporary: bool) -> User {
        User {
            user_id: "alice".into(),
            nickname: "Alice".into(),
            is_temporary,
            password_hash,
        }
    }

    #[test]
    fn verify_login_checks_bcrypt_hash() {
        let hash = hash_password("correct horse").unwrap();
        let alice = user(Some(hash), false);
        assert!(alice.verify_login("correct horse").unwrap());
        assert!(!alice.verify_login("wrong").unwrap());
    }

    #[test]
    fn temporary_users_cannot_log_in_with_password() {
        let hash = hash_password("pw").unwrap();
        assert!(!user(Some(hash), true).verify_login("pw").unwrap());
        assert!(!user(None, false).verify_login("pw").unwrap());
    }

    #[test]
    fn absent_account_runs_a_full_bcrypt_check() {
        let dummy = DUMMY_HASH.as_deref().unwrap();
        let cost = format!("${:02}$", bcrypt::DEFAULT_COST);
        assert!(dummy.starts_with("$2") && dummy.contains(&cost));

        let real = hash_password("pw").unwrap();
        let started = std::time::Instant::now();
        verify_password("guess", &real).unwrap();
        let real_cost = started.elapsed();

        let started = std::time::Instant::now();
        assert!(!verify_absent("guess").unwrap());
        assert!(started.elapsed() >= real_cost / 4);
    }

    #[test]
    fn captcha_token_is_optional() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"user_id":"alice","password":"pw"}"#).unwrap();
        assert_eq!(req.captcha_token, None);
    }
}
