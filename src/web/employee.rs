use crate::domain::field::SurveyField;
use crate::domain::models::{ResponseSummary, Survey};
use crate::error::{CoreError, Entity};
use crate::services::directory::RegionInfo;
use crate::state::SharedState;
use crate::web::admin::Created;
use crate::web::session::Actor;
use crate::web::ApiResult;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AnswerInput {
    pub field_id: Uuid,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct SubmitPayload {
    #[serde(default)]
    pub answers: Vec<AnswerInput>,
    #[serde(default = "default_completed")]
    pub is_completed: bool,
}

fn default_completed() -> bool {
    true
}

/// Answers travel as JSON scalars and are stored as text; the core checks them
/// against the field type.
pub(crate) fn answer_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/region", get(my_region))
        .route("/surveys", get(my_surveys))
        .route("/surveys/:id/fields", get(survey_fields))
        .route("/surveys/:id/today", get(completed_today))
        .route("/surveys/:id/responses", get(my_responses).post(submit))
        .with_state(state)
}

async fn my_region(State(state): State<SharedState>, Actor(actor): Actor) -> ApiResult<Json<RegionInfo>> {
    let region_id = actor.region().ok_or(CoreError::NotFound(Entity::Region))?;
    Ok(Json(state.core.region_info(&actor, region_id).await?))
}

async fn my_surveys(State(state): State<SharedState>, Actor(actor): Actor) -> ApiResult<Json<Vec<Survey>>> {
    Ok(Json(state.core.list_allowed_surveys(&actor, actor.user_id).await?))
}

async fn survey_fields(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<SurveyField>>> {
    Ok(Json(state.core.list_fields(&actor, id).await?))
}

async fn completed_today(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let completed = state.core.has_completed_today(&actor, actor.user_id, id).await?;
    Ok(Json(json!({ "completed": completed })))
}

async fn my_responses(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ResponseSummary>>> {
    Ok(Json(state.core.list_user_responses(&actor, id).await?))
}

async fn submit(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitPayload>,
) -> ApiResult<Json<Created>> {
    let answers: Vec<(Uuid, Option<String>)> = payload
        .answers
        .iter()
        .map(|a| (a.field_id, answer_text(&a.value)))
        .collect();
    let id = state
        .core
        .submit_survey(&actor, id, &answers, payload.is_completed)
        .await?;
    Ok(Json(Created { id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_text_coercion() {
        assert_eq!(answer_text(&json!(null)), None);
        assert_eq!(answer_text(&json!("ok")).as_deref(), Some("ok"));
        assert_eq!(answer_text(&json!(true)).as_deref(), Some("true"));
        assert_eq!(answer_text(&json!(12.5)).as_deref(), Some("12.5"));
    }

    #[test]
    fn test_submit_payload_defaults() {
        let payload: SubmitPayload = serde_json::from_value(json!({
            "answers": [{ "field_id": Uuid::nil() }]
        }))
        .unwrap();
        assert!(payload.is_completed);
        assert_eq!(payload.answers[0].value, Value::Null);
    }
}
