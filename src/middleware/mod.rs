mod auth;
mod error_handler;
mod rate_limit;

pub use auth::auth_middleware;
pub use error_handler::log_errors;
pub use rate_limit::{
    AdmissionGate, KeyFn, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
    address_key, api_key_key, client_ip, identity_key, rate_limit, user_key,
};
