use super::access::{ensure_response_visible, survey_readable};
use super::Core;
use crate::db::audit::AuditAction;
use crate::db::{directory, responses, surveys, users};
use crate::domain::field::{AnswerView, SurveyField};
use crate::domain::models::{ActorContext, Response, ResponseSummary, UserRole};
use crate::error::{is_unique_violation, CoreError, CoreResult, Entity, ValidationIssue};
use chrono::Utc;
use serde_json::json;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use uuid::Uuid;

fn duplicate_or(err: sqlx::Error) -> CoreError {
    if is_unique_violation(&err) {
        CoreError::DuplicateSubmission
    } else {
        err.into()
    }
}

/// A completed response may not lose the answer to a required field.
fn guard_required(field: &SurveyField, value: &Option<String>, is_completed: bool) -> CoreResult<()> {
    if is_completed && field.is_required && value.is_none() {
        return Err(ValidationIssue::MissingRequired(vec![field.id]).into());
    }
    Ok(())
}

/// Field of `survey_id`, or `UnknownField` when it belongs elsewhere.
async fn survey_field(conn: &mut SqliteConnection, survey_id: Uuid, field_id: Uuid) -> CoreResult<SurveyField> {
    match surveys::find_field(conn, field_id).await? {
        Some(field) if field.survey_id == survey_id => Ok(field),
        _ => Err(ValidationIssue::UnknownField(field_id).into()),
    }
}

impl Core {
    /// Whether `user_id` already completed `survey_id` on the current local day.
    pub async fn has_completed_today(&self, actor: &ActorContext, user_id: Uuid, survey_id: Uuid) -> CoreResult<bool> {
        if actor.user_id != user_id && !actor.is_admin() {
            return Err(CoreError::Authorization);
        }
        let mut conn = self.pool.acquire().await?;
        Ok(responses::has_completed_on(&mut conn, user_id, survey_id, self.timezone.today()).await?)
    }

    /// Opens a response. A completed one is refused when the user already
    /// completed the survey today; drafts are unrestricted.
    pub async fn submit_response(
        &self,
        actor: &ActorContext,
        survey_id: Uuid,
        user_id: Uuid,
        region_id: Uuid,
        is_completed: bool,
    ) -> CoreResult<Uuid> {
        match actor.role {
            UserRole::Admin => {}
            UserRole::Employee if actor.user_id == user_id => {}
            _ => return Err(CoreError::Authorization),
        }

        let now = Utc::now();
        let day = self.timezone.local_date(now);
        let mut tx = self.begin_write().await?;

        let survey = surveys::find_survey(&mut tx, survey_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Survey))?;
        if !survey.is_active {
            return Err(ValidationIssue::SurveyInactive.into());
        }
        let user = users::find_user_by_id(&mut tx, user_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::User))?;
        directory::find_region(&mut tx, region_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Region))?;
        if actor.role == UserRole::Employee {
            if user.assigned_region != Some(region_id) {
                return Err(CoreError::Authorization);
            }
            if !users::user_has_grant(&mut tx, user_id, survey_id).await? {
                return Err(CoreError::Authorization);
            }
        }

        if is_completed && responses::has_completed_on(&mut tx, user_id, survey_id, day).await? {
            return Err(CoreError::DuplicateSubmission);
        }

        let response = Response {
            id: Uuid::new_v4(),
            survey_id,
            user_id,
            region_id,
            submitted_at: now,
            submission_day: day,
            is_completed,
        };
        responses::insert_response(&mut tx, &response)
            .await
            .map_err(duplicate_or)?;
        tx.commit().await?;

        tracing::info!(
            "Response {} opened for survey {} by {} (completed: {})",
            response.id,
            survey.name,
            user.username,
            is_completed
        );
        self.record(
            Some(actor.user_id),
            AuditAction::Insert,
            "responses",
            Some(response.id),
            None,
            super::snapshot(&response),
        )
        .await;
        Ok(response.id)
    }

    /// Employee submission: validates every answer against its field, checks
    /// required fields when completing and stores the response with one
    /// answer row per field, all in one transaction.
    pub async fn submit_survey(
        &self,
        actor: &ActorContext,
        survey_id: Uuid,
        answers: &[(Uuid, Option<String>)],
        is_completed: bool,
    ) -> CoreResult<Uuid> {
        if actor.role != UserRole::Employee {
            return Err(CoreError::Authorization);
        }

        let now = Utc::now();
        let day = self.timezone.local_date(now);
        let mut tx = self.begin_write().await?;

        let survey = survey_readable(&mut tx, actor, survey_id).await?;
        if !survey.is_active {
            return Err(ValidationIssue::SurveyInactive.into());
        }
        let region_id = users::find_user_by_id(&mut tx, actor.user_id)
            .await?
            .and_then(|u| u.assigned_region)
            .ok_or(ValidationIssue::RegionRequired)?;

        let fields = surveys::list_fields(&mut tx, survey_id).await?;
        let mut normalized: HashMap<Uuid, Option<String>> = HashMap::new();
        for (field_id, raw) in answers {
            let field = fields
                .iter()
                .find(|f| f.id == *field_id)
                .ok_or(ValidationIssue::UnknownField(*field_id))?;
            normalized.insert(field.id, field.check_answer(raw.as_deref())?);
        }

        if is_completed {
            let missing: Vec<Uuid> = fields
                .iter()
                .filter(|f| f.is_required && normalized.get(&f.id).map_or(true, Option::is_none))
                .map(|f| f.id)
                .collect();
            if !missing.is_empty() {
                return Err(ValidationIssue::MissingRequired(missing).into());
            }
            if responses::has_completed_on(&mut tx, actor.user_id, survey_id, day).await? {
                return Err(CoreError::DuplicateSubmission);
            }
        }

        let response = Response {
            id: Uuid::new_v4(),
            survey_id,
            user_id: actor.user_id,
            region_id,
            submitted_at: now,
            submission_day: day,
            is_completed,
        };
        responses::insert_response(&mut tx, &response)
            .await
            .map_err(duplicate_or)?;
        for field in &fields {
            let value = normalized.get(&field.id).cloned().flatten();
            responses::upsert_detail(&mut tx, response.id, field.id, value.as_deref()).await?;
        }
        tx.commit().await?;

        tracing::info!(
            "Survey {} submitted by {} (response {}, completed: {})",
            survey.name,
            actor.username,
            response.id,
            is_completed
        );
        self.record(
            Some(actor.user_id),
            AuditAction::Insert,
            "responses",
            Some(response.id),
            None,
            Some(json!({ "response": response, "answers": normalized })),
        )
        .await;
        Ok(response.id)
    }

    /// Stores one answer on a response, replacing any earlier answer for the field.
    pub async fn save_answer(
        &self,
        actor: &ActorContext,
        response_id: Uuid,
        field_id: Uuid,
        value: Option<&str>,
    ) -> CoreResult<Uuid> {
        let mut tx = self.begin_write().await?;
        let summary = responses::response_summary(&mut tx, response_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Response))?;
        ensure_response_visible(actor, summary.user_id, summary.governorate_id)?;

        let field = survey_field(&mut tx, summary.survey_id, field_id).await?;
        let value = field.check_answer(value)?;
        guard_required(&field, &value, summary.is_completed)?;
        let previous = responses::find_answer(&mut tx, response_id, field_id).await?;
        let detail_id = responses::upsert_detail(&mut tx, response_id, field_id, value.as_deref()).await?;
        tx.commit().await?;

        tracing::info!("Answer for field {} saved on response {} by {}", field.label, response_id, actor.username);
        let (action, old_value) = match previous {
            Some(old) => (AuditAction::Update, Some(json!({ "answer_value": old }))),
            None => (AuditAction::Insert, None),
        };
        self.record(
            Some(actor.user_id),
            action,
            "response_details",
            Some(detail_id),
            old_value,
            Some(json!({ "response_id": response_id, "field_id": field_id, "answer_value": value })),
        )
        .await;
        Ok(detail_id)
    }

    /// Overwrites a stored answer after validating it against its field. Last write wins.
    pub async fn update_answer(&self, actor: &ActorContext, detail_id: Uuid, new_value: Option<&str>) -> CoreResult<bool> {
        let mut tx = self.begin_write().await?;
        let owner = responses::find_detail_owner(&mut tx, detail_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::ResponseDetail))?;
        ensure_response_visible(actor, owner.user_id, owner.governorate_id)?;

        let field = surveys::find_field(&mut tx, owner.field_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Field))?;
        let value = field.check_answer(new_value)?;
        guard_required(&field, &value, owner.is_completed)?;
        let updated = responses::update_detail(&mut tx, detail_id, value.as_deref()).await?;
        tx.commit().await?;

        tracing::info!("Answer {} updated by {}", detail_id, actor.username);
        self.record(
            Some(actor.user_id),
            AuditAction::Update,
            "response_details",
            Some(detail_id),
            Some(json!({ "answer_value": owner.answer_value })),
            Some(json!({ "answer_value": value })),
        )
        .await;
        Ok(updated)
    }

    /// Answers of a response in field order.
    pub async fn list_response_details(&self, actor: &ActorContext, response_id: Uuid) -> CoreResult<Vec<AnswerView>> {
        let mut conn = self.pool.acquire().await?;
        let summary = responses::response_summary(&mut conn, response_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Response))?;
        ensure_response_visible(actor, summary.user_id, summary.governorate_id)?;
        Ok(responses::list_details(&mut conn, response_id).await?)
    }

    pub async fn response_summary(&self, actor: &ActorContext, response_id: Uuid) -> CoreResult<ResponseSummary> {
        let mut conn = self.pool.acquire().await?;
        let summary = responses::response_summary(&mut conn, response_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Response))?;
        ensure_response_visible(actor, summary.user_id, summary.governorate_id)?;
        Ok(summary)
    }

    /// The actor's own responses to a survey, newest first.
    pub async fn list_user_responses(&self, actor: &ActorContext, survey_id: Uuid) -> CoreResult<Vec<ResponseSummary>> {
        let mut conn = self.pool.acquire().await?;
        Ok(responses::list_user_responses(&mut conn, actor.user_id, survey_id).await?)
    }
}
