use crate::domain::models::ActorContext;
use crate::middleware::rate_limit_middleware;
use crate::state::SharedState;
use crate::web::session::{self, Actor, SESSION_TTL_HOURS};
use crate::web::{ApiError, ApiResult};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub actor: ActorContext,
}

pub fn router(state: SharedState) -> Router {
    let limited_login = post(login).layer(from_fn_with_state(
        state.login_limiter.clone(),
        rate_limit_middleware,
    ));

    Router::new()
        .route("/login", limited_login)
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state)
}

fn session_cookie(value: &str, max_age_secs: i64, secure: bool) -> ApiResult<HeaderValue> {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("session={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}{secure_flag}")
        .parse()
        .map_err(|_| ApiError::Internal)
}

async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = state
        .core
        .authenticate(&payload.username, &payload.password)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let token = session::sign_session(actor.user_id, actor.role, &state.session_key).map_err(|e| {
        tracing::error!("Session signing failed: {}", e);
        ApiError::Internal
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        session_cookie(&token, SESSION_TTL_HOURS * 3600, state.secure_cookies)?,
    );
    Ok((headers, Json(LoginResponse { token, actor })))
}

/// Tokens are stateless; logout only clears the cookie.
async fn logout(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie("", 0, state.secure_cookies)?);
    Ok((headers, Json(serde_json::json!({ "ok": true }))))
}

async fn me(Actor(actor): Actor) -> Json<ActorContext> {
    Json(actor)
}
