//! Governorate admin surface. The governorate always comes from the caller's
//! binding, never from the request.
use crate::domain::field::SurveyField;
use crate::domain::models::{ActorContext, Employee, Governorate, GrantOutcome, Region, ResponseSummary, Survey, SurveyStats};
use crate::error::CoreError;
use crate::state::SharedState;
use crate::web::admin::{ActivePayload, GrantsPayload};
use crate::web::session::Actor;
use crate::web::{ApiResult, ScopeQuery};
use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct MovePayload {
    pub region_id: Uuid,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(own_governorate))
        .route("/regions", get(list_regions))
        .route("/surveys", get(list_surveys))
        .route("/surveys/:id/active", put(set_survey_active))
        .route("/surveys/:id/fields", get(list_fields))
        .route("/surveys/:id/responses", get(survey_responses))
        .route("/surveys/:id/stats", get(survey_stats))
        .route("/employees", get(list_employees))
        .route("/employees/:id/region", put(move_employee))
        .route("/employees/:id/grants", get(list_grants).put(set_grants))
        .with_state(state)
}

fn bound_governorate(actor: &ActorContext) -> Result<Uuid, CoreError> {
    actor.governorate().ok_or(CoreError::Authorization)
}

async fn own_governorate(State(state): State<SharedState>, Actor(actor): Actor) -> ApiResult<Json<Governorate>> {
    let id = bound_governorate(&actor)?;
    Ok(Json(state.core.get_governorate(&actor, id).await?))
}

async fn list_regions(State(state): State<SharedState>, Actor(actor): Actor) -> ApiResult<Json<Vec<Region>>> {
    let id = bound_governorate(&actor)?;
    Ok(Json(state.core.list_regions(&actor, Some(id)).await?))
}

async fn list_surveys(State(state): State<SharedState>, Actor(actor): Actor) -> ApiResult<Json<Vec<Survey>>> {
    let id = bound_governorate(&actor)?;
    Ok(Json(state.core.list_governorate_surveys(&actor, id).await?))
}

async fn set_survey_active(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActivePayload>,
) -> ApiResult<Json<Survey>> {
    state.core.set_survey_active(&actor, id, payload.is_active).await?;
    Ok(Json(state.core.get_survey(&actor, id).await?))
}

async fn list_fields(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<SurveyField>>> {
    Ok(Json(state.core.list_fields(&actor, id).await?))
}

async fn survey_responses(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Query(scope): Query<ScopeQuery>,
) -> ApiResult<Json<Vec<ResponseSummary>>> {
    Ok(Json(
        state
            .core
            .scoped_responses(&actor, id, scope.into_scope())
            .await?,
    ))
}

async fn survey_stats(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Query(scope): Query<ScopeQuery>,
) -> ApiResult<Json<SurveyStats>> {
    Ok(Json(state.core.survey_stats(&actor, id, scope.into_scope()).await?))
}

async fn list_employees(State(state): State<SharedState>, Actor(actor): Actor) -> ApiResult<Json<Vec<Employee>>> {
    let id = bound_governorate(&actor)?;
    Ok(Json(state.core.list_governorate_employees(&actor, id).await?))
}

async fn move_employee(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<MovePayload>,
) -> ApiResult<Json<Vec<Survey>>> {
    state.core.move_employee(&actor, id, payload.region_id).await?;
    // Grants may have been pruned by the move.
    Ok(Json(state.core.list_allowed_surveys(&actor, id).await?))
}

async fn list_grants(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Survey>>> {
    Ok(Json(state.core.list_allowed_surveys(&actor, id).await?))
}

async fn set_grants(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<GrantsPayload>,
) -> ApiResult<Json<GrantOutcome>> {
    Ok(Json(
        state
            .core
            .set_user_survey_grants(&actor, id, &payload.survey_ids)
            .await?,
    ))
}
