pub mod access;
pub mod audit;
pub mod directory;
pub mod identity;
pub mod reporting;
pub mod responses;
pub mod schema;

use crate::db::audit::{insert_entry, AuditAction, NewAuditEntry};
use crate::time_utils::SurveyTimezone;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

/// Entry point for every access-checked operation. Cheap to clone.
#[derive(Clone)]
pub struct Core {
    pool: SqlitePool,
    timezone: SurveyTimezone,
}

impl Core {
    pub fn new(pool: SqlitePool, timezone: SurveyTimezone) -> Self {
        Self { pool, timezone }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn timezone(&self) -> SurveyTimezone {
        self.timezone
    }

    /// Starts a transaction holding the write lock from its first statement.
    /// A deferred one would fail outright when two writers both read first.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin_with("BEGIN IMMEDIATE").await
    }

    /// Appends an audit entry. Failures are logged and swallowed so the
    /// mutation that triggered them stands.
    pub async fn record(
        &self,
        actor_id: Option<Uuid>,
        action: AuditAction,
        table_name: &'static str,
        record_id: Option<Uuid>,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) {
        let entry = NewAuditEntry {
            actor_id,
            action,
            table_name,
            record_id,
            old_value,
            new_value,
        };

        let result = match self.pool.acquire().await {
            Ok(mut conn) => insert_entry(&mut conn, &entry, Utc::now()).await.map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::warn!(
                "Audit write failed for {:?} on {} ({:?}): {}",
                action,
                table_name,
                record_id,
                e
            );
        }
    }
}

/// JSON snapshot of a value for the audit log.
pub(crate) fn snapshot<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Core;
    use crate::db::{self, users};
    use crate::domain::field::{FieldDraft, FieldType};
    use crate::domain::models::{ActorContext, ActorScope, User, UserRole};
    use crate::time_utils::SurveyTimezone;
    use chrono::Utc;
    use uuid::Uuid;

    pub async fn core() -> Core {
        Core::new(db::test_pool().await, SurveyTimezone::default())
    }

    /// Core over a file database with several connections, so writers race.
    pub async fn file_core(dir: &tempfile::TempDir, connections: u32) -> Core {
        Core::new(db::file_test_pool(dir, connections).await, SurveyTimezone::default())
    }

    /// Inserts an admin row directly and returns its actor.
    pub async fn admin(core: &Core) -> ActorContext {
        let mut conn = core.pool().acquire().await.unwrap();
        let user = User {
            id: Uuid::new_v4(),
            username: format!("admin-{}", Uuid::new_v4().simple()),
            password_hash: "unused".into(),
            role: UserRole::Admin,
            assigned_region: None,
            created_at: Utc::now(),
            last_login: None,
            last_activity: None,
        };
        users::insert_user(&mut conn, &user).await.unwrap();
        ActorContext {
            user_id: user.id,
            username: user.username,
            role: UserRole::Admin,
            scope: ActorScope::All,
        }
    }

    pub fn notes_field() -> FieldDraft {
        FieldDraft::new("Notes", FieldType::Text, true)
    }

    /// Governorate, one region, a survey granted to the governorate and an
    /// employee in the region holding a grant for it.
    pub struct World {
        pub admin: ActorContext,
        pub governorate: Uuid,
        pub region: Uuid,
        pub survey: Uuid,
        pub employee: ActorContext,
    }

    pub async fn world(core: &Core, governorate: &str, region: &str) -> World {
        let admin = admin(core).await;
        let gov = core.add_governorate(&admin, governorate, None).await.unwrap();
        let reg = core
            .add_region(&admin, region, None, gov.id)
            .await
            .unwrap();
        let survey = core
            .create_survey(&admin, "Daily Check", vec![notes_field()], &[gov.id])
            .await
            .unwrap();
        let employee_id = core
            .create_user(
                &admin,
                &format!("emp-{}", region),
                "hash".into(),
                UserRole::Employee,
                Some(reg.id),
                None,
            )
            .await
            .unwrap();
        core.set_user_survey_grants(&admin, employee_id, &[survey])
            .await
            .unwrap();
        let employee = core.resolve_actor(employee_id).await.unwrap();
        World {
            admin,
            governorate: gov.id,
            region: reg.id,
            survey,
            employee,
        }
    }
}
