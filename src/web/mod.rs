pub mod admin;
pub mod auth;
pub mod employee;
pub mod governorate;
pub mod responses;
pub mod session;

use crate::db::reporting::ReportScope;
use crate::error::CoreError;
use crate::state::SharedState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/admin", admin::router(state.clone()))
        .nest("/governorate", governorate::router(state.clone()))
        .nest("/employee", employee::router(state.clone()))
        .nest("/responses", responses::router(state))
}

/// Handler error. Core errors keep their kind tag in the body.
#[derive(Debug)]
pub enum ApiError {
    Core(CoreError),
    Unauthorized,
    Internal,
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Core(err)
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Core(err) => {
                let status = match err {
                    CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                    CoreError::Authorization => StatusCode::FORBIDDEN,
                    CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    CoreError::Conflict(_) | CoreError::DuplicateSubmission => StatusCode::CONFLICT,
                    CoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.kind())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self);
        }

        let mut body = json!({ "error": kind });
        if let ApiError::Core(err) = &self {
            if !matches!(err, CoreError::Store(_)) {
                body["detail"] = json!(err.to_string());
            }
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `?scope=all|governorate|region|user&id=<uuid>` on reporting endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub scope: Option<String>,
    pub id: Option<Uuid>,
}

impl ScopeQuery {
    /// Missing or unknown scope means `All`; the core narrows it per role.
    pub fn into_scope(self) -> ReportScope {
        match (self.scope.as_deref(), self.id) {
            (Some("governorate"), Some(id)) => ReportScope::Governorate(id),
            (Some("region"), Some(id)) => ReportScope::Region(id),
            (Some("user"), Some(id)) => ReportScope::User(id),
            _ => ReportScope::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::RateLimiter;
    use crate::services::{testing, Core};
    use crate::state::AppState;
    use axum::body::{to_bytes, Body};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{header, Request};
    use serde_json::Value;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> (Router, Core) {
        let core = testing::core().await;
        let state = Arc::new(AppState {
            core: core.clone(),
            session_key: b"router-test-key-router-test-key!".to_vec(),
            login_limiter: RateLimiter::per_minute(3),
            secure_cookies: false,
        });
        let router = routes(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        (router, core)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn login_request(username: &str, password: &str) -> Request<Body> {
        Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "username": username, "password": password }).to_string(),
            ))
            .unwrap()
    }

    #[test]
    fn test_status_mapping() {
        use crate::error::{ConflictKind, Entity, ValidationIssue};
        let cases = [
            (CoreError::Validation(ValidationIssue::EmptyName), StatusCode::BAD_REQUEST),
            (CoreError::Authorization, StatusCode::FORBIDDEN),
            (CoreError::NotFound(Entity::Survey), StatusCode::NOT_FOUND),
            (CoreError::Conflict(ConflictKind::UsernameTaken), StatusCode::CONFLICT),
            (CoreError::DuplicateSubmission, StatusCode::CONFLICT),
            (CoreError::Store(sqlx::Error::RowNotFound), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_and_kind().0, status);
        }
    }

    #[test]
    fn test_scope_query() {
        let id = Uuid::new_v4();
        let query = ScopeQuery {
            scope: Some("region".into()),
            id: Some(id),
        };
        assert_eq!(query.into_scope(), ReportScope::Region(id));
        assert_eq!(ScopeQuery::default().into_scope(), ReportScope::All);
        let missing_id = ScopeQuery {
            scope: Some("user".into()),
            id: None,
        };
        assert_eq!(missing_id.into_scope(), ReportScope::All);
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = app().await;
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_then_admin_route() {
        let (router, core) = app().await;
        crate::db::seed::seed_bootstrap_admin(core.pool(), "root", "s3cret")
            .await
            .unwrap();

        let denied = router
            .clone()
            .oneshot(Request::get("/admin/governorates").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let bad = router.clone().oneshot(login_request("root", "nope")).await.unwrap();
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);

        let login = router.clone().oneshot(login_request("root", "s3cret")).await.unwrap();
        assert_eq!(login.status(), StatusCode::OK);
        assert!(login.headers().contains_key(header::SET_COOKIE));
        let token = json_body(login).await["token"].as_str().unwrap().to_string();

        let created = router
            .clone()
            .oneshot(
                Request::post("/admin/governorates")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "name": "Cairo" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::OK);

        let duplicate = router
            .clone()
            .oneshot(
                Request::post("/admin/governorates")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "name": "Cairo" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(duplicate).await["error"], "conflict");

        let listed = router
            .oneshot(
                Request::get("/admin/governorates")
                    .header(header::COOKIE, format!("session={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(listed.status(), StatusCode::OK);
        assert_eq!(json_body(listed).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_login_is_rate_limited() {
        let (router, _) = app().await;
        for _ in 0..3 {
            let response = router.clone().oneshot(login_request("ghost", "x")).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let blocked = router.oneshot(login_request("ghost", "x")).await.unwrap();
        assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_create_user_refuses_non_admin_before_hashing() {
        let (router, core) = app().await;
        let world = testing::world(&core, "Cairo", "Cairo-Central").await;
        let token = crate::web::session::sign_session(
            world.employee.user_id,
            world.employee.role,
            b"router-test-key-router-test-key!",
        )
        .unwrap();

        let create = |password: &str| {
            Request::post("/admin/users")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "username": "intruder",
                        "password": password,
                        "role": "admin",
                        "region_id": null,
                        "governorate_id": null
                    })
                    .to_string(),
                ))
                .unwrap()
        };

        // An empty password would be a validation error for an admin.
        let blank = router.clone().oneshot(create("")).await.unwrap();
        assert_eq!(blank.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(blank).await["error"], "authorization");

        let full = router.oneshot(create("long enough")).await.unwrap();
        assert_eq!(full.status(), StatusCode::FORBIDDEN);
        let users = core.list_users(&world.admin).await.unwrap();
        assert!(users.iter().all(|u| u.username != "intruder"));
    }
}
