use super::access::{ensure_governorate_scope, require_admin, survey_readable};
use super::{snapshot, Core};
use crate::db::audit::AuditAction;
use crate::db::{directory, surveys, users};
use crate::domain::field::{FieldDraft, SurveyField};
use crate::domain::models::{ActorContext, Survey, UserRole};
use crate::error::{CoreError, CoreResult, Entity, ValidationIssue};
use chrono::Utc;
use serde_json::json;
use sqlx::SqliteConnection;
use uuid::Uuid;

fn clean_name(name: &str) -> CoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationIssue::EmptyName.into());
    }
    Ok(name.to_string())
}

fn normalize_drafts(fields: Vec<FieldDraft>) -> CoreResult<Vec<FieldDraft>> {
    fields
        .into_iter()
        .map(|field| field.normalized().map_err(CoreError::from))
        .collect()
}

async fn ensure_governorates_exist(conn: &mut SqliteConnection, ids: &[Uuid]) -> CoreResult<Vec<Uuid>> {
    let mut unique = Vec::with_capacity(ids.len());
    for &id in ids {
        if unique.contains(&id) {
            continue;
        }
        directory::find_governorate(conn, id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Governorate))?;
        unique.push(id);
    }
    Ok(unique)
}

impl Core {
    /// Creates a survey. Field order follows the given list, starting at 1.
    pub async fn create_survey(
        &self,
        actor: &ActorContext,
        name: &str,
        fields: Vec<FieldDraft>,
        governorate_ids: &[Uuid],
    ) -> CoreResult<Uuid> {
        require_admin(actor)?;
        let name = clean_name(name)?;
        let fields = normalize_drafts(fields)?;

        let survey_id = Uuid::new_v4();
        let mut tx = self.begin_write().await?;
        let governorate_ids = ensure_governorates_exist(&mut tx, governorate_ids).await?;
        surveys::insert_survey(&mut tx, survey_id, &name, actor.user_id, Utc::now()).await?;
        surveys::replace_survey_governorates(&mut tx, survey_id, &governorate_ids).await?;

        let mut stored = Vec::with_capacity(fields.len());
        for (position, draft) in fields.into_iter().enumerate() {
            let field = SurveyField {
                id: Uuid::new_v4(),
                survey_id,
                label: draft.label,
                field_type: draft.field_type,
                is_required: draft.is_required,
                field_order: position as i64 + 1,
            };
            surveys::insert_field(&mut tx, &field).await?;
            stored.push(field);
        }
        tx.commit().await?;

        tracing::info!(
            "Survey {} created by {} with {} fields",
            name,
            actor.username,
            stored.len()
        );
        self.record(
            Some(actor.user_id),
            AuditAction::Insert,
            "surveys",
            Some(survey_id),
            None,
            Some(json!({ "name": name, "fields": stored, "governorates": governorate_ids })),
        )
        .await;
        Ok(survey_id)
    }

    /// Renames, toggles and edits fields in place. Fields without an id are
    /// appended after the current last one. Fields are never removed.
    pub async fn update_survey(
        &self,
        actor: &ActorContext,
        survey_id: Uuid,
        name: &str,
        is_active: bool,
        fields: Vec<FieldDraft>,
    ) -> CoreResult<()> {
        require_admin(actor)?;
        let name = clean_name(name)?;
        let fields = normalize_drafts(fields)?;

        let mut tx = self.begin_write().await?;
        let old = surveys::find_survey(&mut tx, survey_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Survey))?;
        let old_fields = surveys::list_fields(&mut tx, survey_id).await?;

        surveys::update_survey(&mut tx, survey_id, &name, is_active).await?;
        let mut next_order = surveys::max_field_order(&mut tx, survey_id).await?.unwrap_or(0) + 1;
        for draft in fields {
            let label = draft.label;
            match draft.id {
                Some(field_id) => {
                    let updated = surveys::update_field(
                        &mut tx,
                        survey_id,
                        field_id,
                        &label,
                        &draft.field_type,
                        draft.is_required,
                    )
                    .await?;
                    if !updated {
                        return Err(CoreError::NotFound(Entity::Field));
                    }
                }
                None => {
                    let field = SurveyField {
                        id: Uuid::new_v4(),
                        survey_id,
                        label,
                        field_type: draft.field_type,
                        is_required: draft.is_required,
                        field_order: next_order,
                    };
                    surveys::insert_field(&mut tx, &field).await?;
                    next_order += 1;
                }
            }
        }
        let new_fields = surveys::list_fields(&mut tx, survey_id).await?;
        tx.commit().await?;

        tracing::info!("Survey {} updated by {}", survey_id, actor.username);
        self.record(
            Some(actor.user_id),
            AuditAction::Update,
            "surveys",
            Some(survey_id),
            Some(json!({ "survey": old, "fields": old_fields })),
            Some(json!({ "name": name, "is_active": is_active, "fields": new_fields })),
        )
        .await;
        Ok(())
    }

    /// Deletes a survey with its fields, grants, responses and answers.
    pub async fn delete_survey(&self, actor: &ActorContext, survey_id: Uuid) -> CoreResult<()> {
        require_admin(actor)?;

        let mut tx = self.begin_write().await?;
        let old = surveys::find_survey(&mut tx, survey_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Survey))?;
        surveys::delete_survey(&mut tx, survey_id).await?;
        tx.commit().await?;

        tracing::info!("Survey {} deleted by {}", old.name, actor.username);
        self.record(
            Some(actor.user_id),
            AuditAction::Delete,
            "surveys",
            Some(survey_id),
            snapshot(&old),
            None,
        )
        .await;
        Ok(())
    }

    /// Fields in display order.
    pub async fn list_fields(&self, actor: &ActorContext, survey_id: Uuid) -> CoreResult<Vec<SurveyField>> {
        let mut conn = self.pool.acquire().await?;
        survey_readable(&mut conn, actor, survey_id).await?;
        Ok(surveys::list_fields(&mut conn, survey_id).await?)
    }

    pub async fn get_survey(&self, actor: &ActorContext, survey_id: Uuid) -> CoreResult<Survey> {
        let mut conn = self.pool.acquire().await?;
        survey_readable(&mut conn, actor, survey_id).await
    }

    /// Every survey for admins, the governorate's surveys for governorate
    /// admins, granted surveys for employees.
    pub async fn list_surveys(&self, actor: &ActorContext) -> CoreResult<Vec<Survey>> {
        let mut conn = self.pool.acquire().await?;
        let listed = match actor.role {
            UserRole::Admin => surveys::list_surveys(&mut conn).await?,
            UserRole::GovernorateAdmin => match actor.governorate() {
                Some(governorate_id) => surveys::list_governorate_surveys(&mut conn, governorate_id).await?,
                None => Vec::new(),
            },
            UserRole::Employee => users::list_allowed_surveys(&mut conn, actor.user_id).await?,
        };
        tracing::debug!("{} surveys listed for {}", listed.len(), actor.username);
        Ok(listed)
    }

    pub async fn list_governorate_surveys(
        &self,
        actor: &ActorContext,
        governorate_id: Uuid,
    ) -> CoreResult<Vec<Survey>> {
        ensure_governorate_scope(actor, governorate_id)?;
        let mut conn = self.pool.acquire().await?;
        Ok(surveys::list_governorate_surveys(&mut conn, governorate_id).await?)
    }

    /// Admins, or governorate admins for surveys granted to their governorate.
    pub async fn set_survey_active(&self, actor: &ActorContext, survey_id: Uuid, is_active: bool) -> CoreResult<()> {
        if actor.role == UserRole::Employee {
            return Err(CoreError::Authorization);
        }
        let mut conn = self.pool.acquire().await?;
        let old = survey_readable(&mut conn, actor, survey_id).await?;
        surveys::set_survey_active(&mut conn, survey_id, is_active).await?;
        drop(conn);

        tracing::info!(
            "Survey {} set {} by {}",
            old.name,
            if is_active { "active" } else { "inactive" },
            actor.username
        );
        self.record(
            Some(actor.user_id),
            AuditAction::Update,
            "surveys",
            Some(survey_id),
            Some(json!({ "is_active": old.is_active })),
            Some(json!({ "is_active": is_active })),
        )
        .await;
        Ok(())
    }

    /// Replaces the governorates a survey is offered to. Employee grants that
    /// fall outside the new set are dropped.
    pub async fn set_survey_governorates(
        &self,
        actor: &ActorContext,
        survey_id: Uuid,
        governorate_ids: &[Uuid],
    ) -> CoreResult<()> {
        require_admin(actor)?;

        let mut tx = self.begin_write().await?;
        surveys::find_survey(&mut tx, survey_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Survey))?;
        let governorate_ids = ensure_governorates_exist(&mut tx, governorate_ids).await?;
        let previous = surveys::list_survey_governorates(&mut tx, survey_id).await?;
        surveys::replace_survey_governorates(&mut tx, survey_id, &governorate_ids).await?;
        let pruned = surveys::prune_grants_for_survey(&mut tx, survey_id).await?;
        tx.commit().await?;

        tracing::info!(
            "Survey {} offered to {} governorates by {} ({} grants dropped)",
            survey_id,
            governorate_ids.len(),
            actor.username,
            pruned
        );
        self.record(
            Some(actor.user_id),
            AuditAction::Update,
            "survey_governorates",
            Some(survey_id),
            Some(json!({ "governorates": previous })),
            Some(json!({ "governorates": governorate_ids })),
        )
        .await;
        Ok(())
    }

    pub async fn survey_governorates(&self, actor: &ActorContext, survey_id: Uuid) -> CoreResult<Vec<Uuid>> {
        require_admin(actor)?;
        let mut conn = self.pool.acquire().await?;
        surveys::find_survey(&mut conn, survey_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Survey))?;
        Ok(surveys::list_survey_governorates(&mut conn, survey_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field::FieldType;
    use crate::services::testing;

    fn drafts() -> Vec<FieldDraft> {
        vec![
            FieldDraft::new("Notes", FieldType::Text, true),
            FieldDraft::new("Visits", FieldType::Number, false),
            FieldDraft::new(
                "Status",
                FieldType::Dropdown(vec!["Open".into(), "Closed".into()]),
                true,
            ),
        ]
    }

    #[tokio::test]
    async fn test_fields_keep_given_order() {
        let core = testing::core().await;
        let admin = testing::admin(&core).await;
        let survey = core.create_survey(&admin, "Weekly", drafts(), &[]).await.unwrap();

        let fields = core.list_fields(&admin, survey).await.unwrap();
        let labels: Vec<_> = fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Notes", "Visits", "Status"]);
        assert!(fields.windows(2).all(|w| w[0].field_order < w[1].field_order));
        assert_eq!(
            fields[2].field_type,
            FieldType::Dropdown(vec!["Open".into(), "Closed".into()])
        );
    }

    #[tokio::test]
    async fn test_create_survey_validation() {
        let core = testing::core().await;
        let admin = testing::admin(&core).await;

        let err = core.create_survey(&admin, "  ", drafts(), &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationIssue::EmptyName)));

        let bad = vec![FieldDraft::new("Pick", FieldType::Dropdown(vec![]), false)];
        let err = core.create_survey(&admin, "S", bad, &[]).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationIssue::DropdownWithoutOptions)
        ));

        let err = core
            .create_survey(&admin, "S", drafts(), &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(Entity::Governorate)));
        assert!(core.list_surveys(&admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropdown_options_stored_trimmed() {
        let core = testing::core().await;
        let admin = testing::admin(&core).await;
        let status = FieldDraft::new(
            " Status ",
            FieldType::Dropdown(vec![" Open ".into(), "".into(), "Closed".into()]),
            true,
        );
        let survey = core.create_survey(&admin, "Shifts", vec![status], &[]).await.unwrap();

        let fields = core.list_fields(&admin, survey).await.unwrap();
        assert_eq!(fields[0].label, "Status");
        assert_eq!(
            fields[0].field_type,
            FieldType::Dropdown(vec!["Open".into(), "Closed".into()])
        );
        assert_eq!(fields[0].check_answer(Some(" Open ")), Ok(Some("Open".into())));
        assert_eq!(fields[0].check_answer(Some("Closed")), Ok(Some("Closed".into())));

        let mut edited = FieldDraft::new("Status", FieldType::Dropdown(vec!["  Paused".into()]), true);
        edited.id = Some(fields[0].id);
        core.update_survey(&admin, survey, "Shifts", true, vec![edited])
            .await
            .unwrap();
        let fields = core.list_fields(&admin, survey).await.unwrap();
        assert_eq!(fields[0].field_type, FieldType::Dropdown(vec!["Paused".into()]));

        let mut blank = FieldDraft::new("Status", FieldType::Dropdown(vec![" ".into(), "".into()]), true);
        blank.id = Some(fields[0].id);
        let err = core
            .update_survey(&admin, survey, "Shifts", true, vec![blank])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationIssue::DropdownWithoutOptions)
        ));
    }

    #[tokio::test]
    async fn test_update_appends_and_edits_in_place() {
        let core = testing::core().await;
        let admin = testing::admin(&core).await;
        let survey = core.create_survey(&admin, "Weekly", drafts(), &[]).await.unwrap();
        let before = core.list_fields(&admin, survey).await.unwrap();

        let mut edited = FieldDraft::new("Visit count", FieldType::Number, true);
        edited.id = Some(before[1].id);
        core.update_survey(
            &admin,
            survey,
            "Weekly v2",
            false,
            vec![edited, FieldDraft::new("Date", FieldType::Date, false)],
        )
        .await
        .unwrap();

        let after = core.list_fields(&admin, survey).await.unwrap();
        assert_eq!(after.len(), 4);
        assert_eq!(after[1].id, before[1].id);
        assert_eq!(after[1].label, "Visit count");
        assert!(after[1].is_required);
        assert_eq!(after[3].label, "Date");
        assert_eq!(after[3].field_order, before[2].field_order + 1);

        let stored = core.get_survey(&admin, survey).await.unwrap();
        assert_eq!(stored.name, "Weekly v2");
        assert!(!stored.is_active);

        let mut foreign = FieldDraft::new("X", FieldType::Text, false);
        foreign.id = Some(Uuid::new_v4());
        let err = core
            .update_survey(&admin, survey, "Weekly v3", true, vec![foreign])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(Entity::Field)));
        assert_eq!(core.get_survey(&admin, survey).await.unwrap().name, "Weekly v2");
    }

    #[tokio::test]
    async fn test_delete_survey_cascades() {
        let core = testing::core().await;
        let world = testing::world(&core, "Cairo", "Cairo-Central").await;
        let notes = core.list_fields(&world.admin, world.survey).await.unwrap()[0].id;
        let response = core
            .submit_survey(&world.employee, world.survey, &[(notes, Some("ok".into()))], true)
            .await
            .unwrap();

        core.delete_survey(&world.admin, world.survey).await.unwrap();

        let mut conn = core.pool().acquire().await.unwrap();
        let count = |table: &'static str| format!("SELECT COUNT(*) FROM {table}");
        for table in ["survey_fields", "responses", "response_details", "user_surveys", "survey_governorates"] {
            let n: i64 = sqlx::query_scalar(&count(table))
                .fetch_one(&mut *conn)
                .await
                .unwrap();
            assert_eq!(n, 0, "{table} not emptied");
        }
        drop(conn);

        let err = core.response_summary(&world.admin, response).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(Entity::Response)));
        let err = core.delete_survey(&world.admin, world.survey).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(Entity::Survey)));
    }

    #[tokio::test]
    async fn test_survey_visibility_by_role() {
        let core = testing::core().await;
        let world = testing::world(&core, "Cairo", "Cairo-Central").await;
        let hidden = core
            .create_survey(&world.admin, "Hidden", vec![testing::notes_field()], &[])
            .await
            .unwrap();

        let listed = core.list_surveys(&world.employee).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, world.survey);

        let err = core.list_fields(&world.employee, hidden).await.unwrap_err();
        assert!(matches!(err, CoreError::Authorization));
        let err = core
            .set_survey_active(&world.employee, world.survey, false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Authorization));
    }

    #[tokio::test]
    async fn test_governorate_admin_toggles_own_surveys() {
        let core = testing::core().await;
        let world = testing::world(&core, "Cairo", "Cairo-Central").await;
        let id = core
            .create_user(
                &world.admin,
                "boss",
                "h".into(),
                UserRole::GovernorateAdmin,
                None,
                Some(world.governorate),
            )
            .await
            .unwrap();
        let boss = core.resolve_actor(id).await.unwrap();
        let hidden = core
            .create_survey(&world.admin, "Hidden", vec![testing::notes_field()], &[])
            .await
            .unwrap();

        core.set_survey_active(&boss, world.survey, false).await.unwrap();
        assert!(!core.get_survey(&boss, world.survey).await.unwrap().is_active);
        assert!(core.set_survey_active(&boss, hidden, false).await.is_err());
        assert_eq!(
            core.list_governorate_surveys(&boss, world.governorate)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_narrowing_governorates_prunes_employee_grants() {
        let core = testing::core().await;
        let world = testing::world(&core, "Cairo", "Cairo-Central").await;
        let giza = core.add_governorate(&world.admin, "Giza", None).await.unwrap();

        core.set_survey_governorates(&world.admin, world.survey, &[giza.id])
            .await
            .unwrap();
        assert_eq!(
            core.survey_governorates(&world.admin, world.survey).await.unwrap(),
            vec![giza.id]
        );
        assert!(core
            .list_allowed_surveys(&world.admin, world.employee.user_id)
            .await
            .unwrap()
            .is_empty());
    }
}
