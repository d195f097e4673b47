mod handler;
mod model;

pub use handler::{login, me};
pub use model::{
    LoginRequest, LoginResponse, MeResponse, PgUserRepository, User, UserRepository,
};
