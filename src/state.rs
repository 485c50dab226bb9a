use crate::middleware::RateLimiter;
use crate::services::Core;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub core: Core,
    pub session_key: Vec<u8>,
    pub login_limiter: RateLimiter,
    pub secure_cookies: bool,
}

pub type SharedState = Arc<AppState>;
