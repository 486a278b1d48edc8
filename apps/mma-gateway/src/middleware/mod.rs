//! 中间件模块

mod auth;

pub use auth::{HEALTH_PATH, bearer_token, request_context, require_token};
