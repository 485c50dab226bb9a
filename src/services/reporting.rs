use super::access::{ensure_governorate_scope, survey_readable};
use super::Core;
use crate::db::reporting::{self, ReportScope};
use crate::domain::models::{ActorContext, ResponseSummary, SurveyStats, UserRole};
use crate::error::{CoreError, CoreResult};
use uuid::Uuid;

/// Narrows a requested scope to what the actor may read.
fn effective_scope(actor: &ActorContext, requested: ReportScope) -> CoreResult<ReportScope> {
    match actor.role {
        UserRole::Admin => Ok(requested),
        UserRole::GovernorateAdmin => {
            let own = actor.governorate().ok_or(CoreError::Authorization)?;
            match requested {
                ReportScope::All => Ok(ReportScope::Governorate(own)),
                ReportScope::Governorate(id) => {
                    ensure_governorate_scope(actor, id)?;
                    Ok(requested)
                }
                ReportScope::Region(_) | ReportScope::User(_) => Ok(requested),
            }
        }
        UserRole::Employee => match requested {
            ReportScope::User(id) if id != actor.user_id => Err(CoreError::Authorization),
            _ => Ok(ReportScope::User(actor.user_id)),
        },
    }
}

impl Core {
    /// Responses to a survey inside the scope. Governorate admins are always
    /// bounded to regions of their own governorate.
    pub async fn scoped_responses(
        &self,
        actor: &ActorContext,
        survey_id: Uuid,
        scope: ReportScope,
    ) -> CoreResult<Vec<ResponseSummary>> {
        let scope = effective_scope(actor, scope)?;
        let mut conn = self.pool.acquire().await?;
        survey_readable(&mut conn, actor, survey_id).await?;

        let rows = reporting::scoped_responses(&mut conn, survey_id, scope, actor.governorate()).await?;
        tracing::debug!("{} responses in {:?} for {}", rows.len(), scope, actor.username);
        Ok(rows)
    }

    /// Totals for the admin data screen.
    pub async fn survey_stats(&self, actor: &ActorContext, survey_id: Uuid, scope: ReportScope) -> CoreResult<SurveyStats> {
        let scope = effective_scope(actor, scope)?;
        let mut conn = self.pool.acquire().await?;
        survey_readable(&mut conn, actor, survey_id).await?;
        Ok(reporting::survey_stats(&mut conn, survey_id, scope, actor.governorate()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;

    #[tokio::test]
    async fn test_governorate_scope_excludes_other_governorates() {
        let core = testing::core().await;
        let world = testing::world(&core, "Cairo", "Cairo-Central").await;
        let admin = &world.admin;

        let giza = core.add_governorate(admin, "Giza", None).await.unwrap();
        let giza_region = core.add_region(admin, "Giza-1", None, giza.id).await.unwrap();
        core.set_survey_governorates(admin, world.survey, &[world.governorate, giza.id])
            .await
            .unwrap();
        let giza_emp_id = core
            .create_user(admin, "giza-emp", "h".into(), UserRole::Employee, Some(giza_region.id), None)
            .await
            .unwrap();
        core.set_user_survey_grants(admin, giza_emp_id, &[world.survey])
            .await
            .unwrap();
        let giza_emp = core.resolve_actor(giza_emp_id).await.unwrap();

        let notes = core.list_fields(admin, world.survey).await.unwrap()[0].id;
        let cairo_response = core
            .submit_survey(&world.employee, world.survey, &[(notes, Some("c".into()))], true)
            .await
            .unwrap();
        core.submit_survey(&giza_emp, world.survey, &[(notes, Some("g".into()))], true)
            .await
            .unwrap();
        core.submit_survey(&giza_emp, world.survey, &[], false).await.unwrap();

        let all = core
            .scoped_responses(admin, world.survey, ReportScope::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let cairo = core
            .scoped_responses(admin, world.survey, ReportScope::Governorate(world.governorate))
            .await
            .unwrap();
        assert_eq!(cairo.len(), 1);
        assert_eq!(cairo[0].response_id, cairo_response);

        let boss_id = core
            .create_user(admin, "boss", "h".into(), UserRole::GovernorateAdmin, None, Some(world.governorate))
            .await
            .unwrap();
        let boss = core.resolve_actor(boss_id).await.unwrap();
        let seen = core
            .scoped_responses(&boss, world.survey, ReportScope::All)
            .await
            .unwrap();
        assert!(seen.iter().all(|r| r.governorate_id == world.governorate));
        assert_eq!(seen.len(), 1);

        let sneaky = core
            .scoped_responses(&boss, world.survey, ReportScope::Region(giza_region.id))
            .await
            .unwrap();
        assert!(sneaky.is_empty());
        assert!(core
            .scoped_responses(&boss, world.survey, ReportScope::Governorate(giza.id))
            .await
            .is_err());

        let stats = core.survey_stats(admin, world.survey, ReportScope::All).await.unwrap();
        assert_eq!(
            stats,
            SurveyStats {
                total_responses: 3,
                completed_responses: 2,
                regions: 2
            }
        );
        let boss_stats = core.survey_stats(&boss, world.survey, ReportScope::All).await.unwrap();
        assert_eq!(boss_stats.total_responses, 1);
    }

    #[tokio::test]
    async fn test_employee_scope_is_own_responses() {
        let core = testing::core().await;
        let world = testing::world(&core, "Cairo", "Cairo-Central").await;
        core.submit_survey(&world.employee, world.survey, &[], false).await.unwrap();

        let mine = core
            .scoped_responses(&world.employee, world.survey, ReportScope::All)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert!(core
            .scoped_responses(&world.employee, world.survey, ReportScope::User(world.admin.user_id))
            .await
            .is_err());
    }
}
