use crate::utils::hash_identifier;

/// 登录失败记录键前缀
const LOGIN_ATTEMPTS_PREFIX: &str = "login_attempts:";

/// 生成登录失败记录键
pub fn login_attempts_key(identifier: &str) -> String {
    format!("{}{}", LOGIN_ATTEMPTS_PREFIX, hash_identifier(identifier))
}
