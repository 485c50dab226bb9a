use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
    Login,
}

/// An entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub table_name: &'static str,
    pub record_id: Option<Uuid>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_username: Option<String>,
    pub action_kind: AuditAction,
    pub table_name: String,
    pub record_id: Option<Uuid>,
    pub old_value: Option<Json<Value>>,
    pub new_value: Option<Json<Value>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub table: Option<String>,
    pub action: Option<AuditAction>,
    pub username: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub limit: Option<i64>,
}

const DEFAULT_LIMIT: i64 = 500;

pub async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: &NewAuditEntry,
    at: DateTime<Utc>,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, actor_id, action_kind, table_name, record_id, old_value, new_value, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(entry.actor_id)
    .bind(entry.action)
    .bind(entry.table_name)
    .bind(entry.record_id)
    .bind(entry.old_value.as_ref().map(Json))
    .bind(entry.new_value.as_ref().map(Json))
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(id)
}

/// Newest first. Text filters match substrings.
pub async fn query_entries(
    conn: &mut SqliteConnection,
    filter: &AuditFilter,
) -> Result<Vec<AuditEntry>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT
            a.id,
            a.actor_id,
            u.username AS actor_username,
            a.action_kind,
            a.table_name,
            a.record_id,
            a.old_value,
            a.new_value,
            a.created_at
        FROM audit_log a
        LEFT JOIN users u ON u.id = a.actor_id
        WHERE 1 = 1
        "#,
    );

    if let Some(table) = filter.table.as_deref().filter(|t| !t.trim().is_empty()) {
        builder.push(" AND a.table_name = ").push_bind(table.trim().to_string());
    }
    if let Some(action) = filter.action {
        builder.push(" AND a.action_kind = ").push_bind(action);
    }
    if let Some(username) = filter.username.as_deref().filter(|u| !u.trim().is_empty()) {
        builder
            .push(" AND u.username LIKE ")
            .push_bind(format!("%{}%", username.trim()));
    }
    if let Some(from) = filter.from {
        builder.push(" AND a.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND a.created_at <= ").push_bind(to);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        builder
            .push(" AND (a.table_name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR COALESCE(a.old_value, '') LIKE ")
            .push_bind(pattern.clone())
            .push(" OR COALESCE(a.new_value, '') LIKE ")
            .push_bind(pattern)
            .push(")");
    }

    builder
        .push(" ORDER BY a.created_at DESC LIMIT ")
        .push_bind(filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 5000));

    builder
        .build_query_as::<AuditEntry>()
        .fetch_all(&mut *conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Duration;
    use serde_json::json;

    fn entry(table: &'static str, action: AuditAction, new_value: Value) -> NewAuditEntry {
        NewAuditEntry {
            actor_id: None,
            action,
            table_name: table,
            record_id: Some(Uuid::new_v4()),
            old_value: None,
            new_value: Some(new_value),
        }
    }

    #[tokio::test]
    async fn test_query_orders_newest_first_and_filters() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let base = Utc::now() - Duration::hours(3);

        insert_entry(&mut conn, &entry("surveys", AuditAction::Insert, json!({"name": "Daily Check"})), base)
            .await
            .unwrap();
        insert_entry(
            &mut conn,
            &entry("governorates", AuditAction::Insert, json!({"name": "Cairo"})),
            base + Duration::hours(1),
        )
        .await
        .unwrap();
        insert_entry(
            &mut conn,
            &entry("surveys", AuditAction::Delete, json!({"name": "Old"})),
            base + Duration::hours(2),
        )
        .await
        .unwrap();

        let all = query_entries(&mut conn, &AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(all[0].action_kind, AuditAction::Delete);

        let surveys = query_entries(
            &mut conn,
            &AuditFilter {
                table: Some("surveys".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(surveys.len(), 2);

        let deletes = query_entries(
            &mut conn,
            &AuditFilter {
                action: Some(AuditAction::Delete),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(deletes.len(), 1);

        let cairo = query_entries(
            &mut conn,
            &AuditFilter {
                search: Some("cairo".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(cairo.len(), 1);
        assert_eq!(cairo[0].new_value.as_ref().map(|v| v.0.clone()), Some(json!({"name": "Cairo"})));

        let window = query_entries(
            &mut conn,
            &AuditFilter {
                from: Some(base + Duration::minutes(30)),
                to: Some(base + Duration::minutes(90)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].table_name, "governorates");
    }
}
