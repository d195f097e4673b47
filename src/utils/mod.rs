use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Config;

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户ID
    pub exp: i64,    // 过期时间
    pub iat: i64,    // 签发时间
}

pub fn generate_token(
    user_id: &str,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiration = (now + Duration::seconds(config.jwt_expiration().as_secs() as i64)).timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok((token, expiration))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// 当前时间（毫秒）
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 从 now 到 target 的剩余秒数，向上取整且至少为 1
pub fn secs_until(now_ms: i64, target_ms: i64) -> u64 {
    let delta = (target_ms - now_ms).max(0) as u64;
    delta.div_ceil(1000).max(1)
}

/// 对标识做 SHA-256，避免原始值（邮箱、API Key）落入存储键
pub fn hash_identifier(identifier: &str) -> String {
    format!("{:x}", Sha256::digest(identifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secs_until_rounds_up() {
        assert_eq!(secs_until(0, 1), 1);
        assert_eq!(secs_until(0, 1000), 1);
        assert_eq!(secs_until(0, 1001), 2);
        assert_eq!(secs_until(5000, 1000), 1);
    }

    #[test]
    fn hash_identifier_is_stable_and_distinct() {
        let a = hash_identifier("alice@example.com");
        assert_eq!(a, hash_identifier("alice@example.com"));
        assert_ne!(a, hash_identifier("bob@example.com"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn token_round_trip() {
        let mut config = crate::test_support::config();
        config.jwt_secret = "secret".into();
        let (token, _) = generate_token("alice", &config).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(verify_token(&token, "other").is_err());
    }
}
