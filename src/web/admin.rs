use crate::db::audit::{AuditEntry, AuditFilter};
use crate::domain::field::{FieldDraft, FieldType, SurveyField};
use crate::domain::models::{
    Governorate, GrantOutcome, Region, ResponseSummary, Survey, SurveyStats, User, UserListing, UserRole,
};
use crate::error::{CoreError, ValidationIssue};
use crate::services::access::require_admin;
use crate::services::identity::hash_password;
use crate::state::SharedState;
use crate::web::session::Actor;
use crate::web::{ApiError, ApiResult, ScopeQuery};
use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct NamedPayload {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegionPayload {
    pub name: String,
    pub description: Option<String>,
    pub governorate_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RegionFilter {
    pub governorate_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserPayload {
    pub username: String,
    pub password: String,
    pub role: UserRole,
    pub region_id: Option<Uuid>,
    pub governorate_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserPayload {
    pub username: String,
    pub role: UserRole,
    pub region_id: Option<Uuid>,
    pub governorate_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct GrantsPayload {
    pub survey_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct GovernorateBindingPayload {
    pub governorate_id: Uuid,
}

/// One field row from the schema editor.
#[derive(Debug, Deserialize)]
pub struct FieldInput {
    pub id: Option<Uuid>,
    pub label: String,
    pub field_type: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub is_required: bool,
}

impl FieldInput {
    fn into_draft(self) -> Result<FieldDraft, CoreError> {
        let field_type = FieldType::from_parts(self.field_type.as_deref(), &self.options)?;
        Ok(FieldDraft {
            id: self.id,
            label: self.label,
            field_type,
            is_required: self.is_required,
        })
    }
}

fn into_drafts(fields: Vec<FieldInput>) -> Result<Vec<FieldDraft>, CoreError> {
    fields.into_iter().map(FieldInput::into_draft).collect()
}

#[derive(Debug, Deserialize)]
pub struct CreateSurveyPayload {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldInput>,
    #[serde(default)]
    pub governorate_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSurveyPayload {
    pub name: String,
    pub is_active: bool,
    #[serde(default)]
    pub fields: Vec<FieldInput>,
}

#[derive(Debug, Deserialize)]
pub struct ActivePayload {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct GovernoratesPayload {
    pub governorate_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub id: Uuid,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/governorates", get(list_governorates).post(create_governorate))
        .route(
            "/governorates/:id",
            get(get_governorate).put(update_governorate).delete(delete_governorate),
        )
        .route("/regions", get(list_regions).post(create_region))
        .route("/regions/:id", get(get_region).put(update_region).delete(delete_region))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/users/:id/grants", get(list_user_grants).put(set_user_grants))
        .route(
            "/users/:id/governorate",
            get(get_user_governorate).put(set_user_governorate),
        )
        .route("/surveys", get(list_surveys).post(create_survey))
        .route("/surveys/:id", get(get_survey).put(update_survey).delete(delete_survey))
        .route("/surveys/:id/fields", get(list_fields))
        .route("/surveys/:id/active", put(set_survey_active))
        .route(
            "/surveys/:id/governorates",
            get(survey_governorates).put(set_survey_governorates),
        )
        .route("/surveys/:id/responses", get(survey_responses))
        .route("/surveys/:id/stats", get(survey_stats))
        .route("/audit", get(query_audit))
        .with_state(state)
}

// ========== Governorates ==========

async fn list_governorates(State(state): State<SharedState>, Actor(actor): Actor) -> ApiResult<Json<Vec<Governorate>>> {
    Ok(Json(state.core.list_governorates(&actor).await?))
}

async fn create_governorate(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Json(payload): Json<NamedPayload>,
) -> ApiResult<Json<Governorate>> {
    let governorate = state
        .core
        .add_governorate(&actor, &payload.name, payload.description.as_deref())
        .await?;
    Ok(Json(governorate))
}

async fn get_governorate(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Governorate>> {
    Ok(Json(state.core.get_governorate(&actor, id).await?))
}

async fn update_governorate(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<NamedPayload>,
) -> ApiResult<Json<Governorate>> {
    let governorate = state
        .core
        .update_governorate(&actor, id, &payload.name, payload.description.as_deref())
        .await?;
    Ok(Json(governorate))
}

async fn delete_governorate(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.core.delete_governorate(&actor, id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ========== Regions ==========

async fn list_regions(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Query(filter): Query<RegionFilter>,
) -> ApiResult<Json<Vec<Region>>> {
    Ok(Json(state.core.list_regions(&actor, filter.governorate_id).await?))
}

async fn create_region(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Json(payload): Json<RegionPayload>,
) -> ApiResult<Json<Region>> {
    let region = state
        .core
        .add_region(
            &actor,
            &payload.name,
            payload.description.as_deref(),
            payload.governorate_id,
        )
        .await?;
    Ok(Json(region))
}

async fn get_region(State(state): State<SharedState>, Actor(actor): Actor, Path(id): Path<Uuid>) -> ApiResult<Json<Region>> {
    Ok(Json(state.core.get_region(&actor, id).await?))
}

async fn update_region(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<NamedPayload>,
) -> ApiResult<Json<Region>> {
    let region = state
        .core
        .update_region(&actor, id, &payload.name, payload.description.as_deref())
        .await?;
    Ok(Json(region))
}

async fn delete_region(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.core.delete_region(&actor, id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ========== Users ==========

async fn list_users(State(state): State<SharedState>, Actor(actor): Actor) -> ApiResult<Json<Vec<UserListing>>> {
    Ok(Json(state.core.list_users(&actor).await?))
}

async fn create_user(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Json(payload): Json<CreateUserPayload>,
) -> ApiResult<Json<Created>> {
    // Hashing is slow; refuse non-admins first.
    require_admin(&actor)?;
    if payload.password.is_empty() {
        return Err(CoreError::from(ValidationIssue::EmptyPassword).into());
    }
    let password_hash = hash_password(&payload.password).map_err(|e| {
        tracing::error!("Password hashing failed: {}", e);
        ApiError::Internal
    })?;

    let id = state
        .core
        .create_user(
            &actor,
            &payload.username,
            password_hash,
            payload.role,
            payload.region_id,
            payload.governorate_id,
        )
        .await?;
    Ok(Json(Created { id }))
}

async fn get_user(State(state): State<SharedState>, Actor(actor): Actor, Path(id): Path<Uuid>) -> ApiResult<Json<User>> {
    Ok(Json(state.core.get_user(&actor, id).await?))
}

async fn update_user(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserPayload>,
) -> ApiResult<Json<User>> {
    let user = state
        .core
        .update_user(
            &actor,
            id,
            &payload.username,
            payload.role,
            payload.region_id,
            payload.governorate_id,
        )
        .await?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.core.delete_user(&actor, id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn list_user_grants(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Survey>>> {
    Ok(Json(state.core.list_allowed_surveys(&actor, id).await?))
}

async fn set_user_grants(
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

async fn get_user_governorate(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Option<Governorate>>> {
    Ok(Json(state.core.get_governorate_for_admin(&actor, id).await?))
}

async fn set_user_governorate(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<GovernorateBindingPayload>,
) -> ApiResult<Json<Option<Governorate>>> {
    state
        .core
        .grant_governorate_admin(&actor, id, payload.governorate_id)
        .await?;
    Ok(Json(state.core.get_governorate_for_admin(&actor, id).await?))
}

// ========== Surveys ==========

async fn list_surveys(State(state): State<SharedState>, Actor(actor): Actor) -> ApiResult<Json<Vec<Survey>>> {
    Ok(Json(state.core.list_surveys(&actor).await?))
}

async fn create_survey(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Json(payload): Json<CreateSurveyPayload>,
) -> ApiResult<Json<Created>> {
    let drafts = into_drafts(payload.fields)?;
    let id = state
        .core
        .create_survey(&actor, &payload.name, drafts, &payload.governorate_ids)
        .await?;
    Ok(Json(Created { id }))
}

async fn get_survey(State(state): State<SharedState>, Actor(actor): Actor, Path(id): Path<Uuid>) -> ApiResult<Json<Survey>> {
    Ok(Json(state.core.get_survey(&actor, id).await?))
}

async fn update_survey(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSurveyPayload>,
) -> ApiResult<Json<Survey>> {
    let drafts = into_drafts(payload.fields)?;
    state
        .core
        .update_survey(&actor, id, &payload.name, payload.is_active, drafts)
        .await?;
    Ok(Json(state.core.get_survey(&actor, id).await?))
}

async fn delete_survey(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.core.delete_survey(&actor, id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn list_fields(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<SurveyField>>> {
    Ok(Json(state.core.list_fields(&actor, id).await?))
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

async fn survey_governorates(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Uuid>>> {
    Ok(Json(state.core.survey_governorates(&actor, id).await?))
}

async fn set_survey_governorates(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<GovernoratesPayload>,
) -> ApiResult<Json<Vec<Uuid>>> {
    state
        .core
        .set_survey_governorates(&actor, id, &payload.governorate_ids)
        .await?;
    Ok(Json(state.core.survey_governorates(&actor, id).await?))
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

// ========== Audit ==========

async fn query_audit(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Query(filter): Query<AuditFilter>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    Ok(Json(state.core.query_audit_log(&actor, &filter).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_input_conversion() {
        let dropdown = FieldInput {
            id: None,
            label: "Shift".into(),
            field_type: Some("dropdown".into()),
            options: vec![" Day ".into(), "".into(), "Night".into()],
            is_required: true,
        };
        let draft = dropdown.into_draft().unwrap();
        assert_eq!(draft.field_type, FieldType::Dropdown(vec!["Day".into(), "Night".into()]));
        assert!(draft.is_required);

        let untyped = FieldInput {
            id: None,
            label: "Mystery".into(),
            field_type: None,
            options: vec![],
            is_required: false,
        };
        assert!(matches!(
            untyped.into_draft(),
            Err(CoreError::Validation(ValidationIssue::MissingFieldType))
        ));
    }
}
