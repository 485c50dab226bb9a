//! Review endpoints shared by every role; visibility is decided by the core.
use crate::domain::field::AnswerView;
use crate::domain::models::ResponseSummary;
use crate::state::SharedState;
use crate::web::admin::Created;
use crate::web::employee::answer_text;
use crate::web::session::Actor;
use crate::web::ApiResult;
use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct NewResponsePayload {
    pub survey_id: Uuid,
    pub user_id: Uuid,
    pub region_id: Uuid,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SaveAnswerPayload {
    pub field_id: Uuid,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct EditAnswerPayload {
    #[serde(default)]
    pub value: Value,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(create_response))
        .route("/:id", get(summary))
        .route("/:id/details", get(details))
        .route("/:id/answers", post(save_answer))
        .route("/details/:id", put(edit_answer))
        .with_state(state)
}

async fn create_response(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Json(payload): Json<NewResponsePayload>,
) -> ApiResult<Json<Created>> {
    let id = state
        .core
        .submit_response(
            &actor,
            payload.survey_id,
            payload.user_id,
            payload.region_id,
            payload.is_completed,
        )
        .await?;
    Ok(Json(Created { id }))
}

async fn summary(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ResponseSummary>> {
    Ok(Json(state.core.response_summary(&actor, id).await?))
}

async fn details(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<AnswerView>>> {
    Ok(Json(state.core.list_response_details(&actor, id).await?))
}

async fn save_answer(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<SaveAnswerPayload>,
) -> ApiResult<Json<Created>> {
    let value = answer_text(&payload.value);
    let detail_id = state
        .core
        .save_answer(&actor, id, payload.field_id, value.as_deref())
        .await?;
    Ok(Json(Created { id: detail_id }))
}

/// Last write wins.
async fn edit_answer(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditAnswerPayload>,
) -> ApiResult<Json<Value>> {
    let value = answer_text(&payload.value);
    let updated = state.core.update_answer(&actor, id, value.as_deref()).await?;
    Ok(Json(json!({ "updated": updated })))
}
