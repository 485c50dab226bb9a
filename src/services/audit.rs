use super::access::require_admin;
use super::Core;
use crate::db::audit::{query_entries, AuditEntry, AuditFilter};
use crate::domain::models::ActorContext;
use crate::error::CoreResult;

impl Core {
    /// Audit entries matching `filter`, newest first. Admin only.
    pub async fn query_audit_log(&self, actor: &ActorContext, filter: &AuditFilter) -> CoreResult<Vec<AuditEntry>> {
        require_admin(actor)?;
        let mut conn = self.pool.acquire().await?;
        let entries = query_entries(&mut conn, filter).await?;
        tracing::debug!("Audit query by {} returned {} entries", actor.username, entries.len());
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::audit::AuditAction;
    use crate::error::CoreError;
    use crate::services::testing;

    #[tokio::test]
    async fn test_audit_filters_by_username_and_kind() {
        let core = testing::core().await;
        let world = testing::world(&core, "Cairo", "Cairo-Central").await;
        let notes = core.list_fields(&world.admin, world.survey).await.unwrap()[0].id;
        core.submit_survey(&world.employee, world.survey, &[(notes, Some("ok".into()))], true)
            .await
            .unwrap();

        let by_employee = core
            .query_audit_log(
                &world.admin,
                &AuditFilter {
                    username: Some("emp-".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_employee.len(), 1);
        assert_eq!(by_employee[0].table_name, "responses");
        assert_eq!(by_employee[0].actor_username.as_deref(), Some(world.employee.username.as_str()));

        let inserts = core
            .query_audit_log(
                &world.admin,
                &AuditFilter {
                    action: Some(AuditAction::Insert),
                    table: Some("surveys".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].record_id, Some(world.survey));
    }

    #[tokio::test]
    async fn test_audit_log_is_admin_only() {
        let core = testing::core().await;
        let world = testing::world(&core, "Cairo", "Cairo-Central").await;
        let err = core
            .query_audit_log(&world.employee, &AuditFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Authorization));
    }
}
