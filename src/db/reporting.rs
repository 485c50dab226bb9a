use super::responses::SUMMARY_SELECT;
use crate::domain::models::{ResponseSummary, SurveyStats};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

/// Slice of a survey's responses a caller is allowed to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReportScope {
    All,
    Governorate(Uuid),
    Region(Uuid),
    User(Uuid),
}

/// Appends the scope predicate. Governorate filters always go through the
/// response's region, never through the submitting user. `within` bounds any
/// scope to one governorate.
fn push_scope(builder: &mut QueryBuilder<'_, Sqlite>, scope: ReportScope, within: Option<Uuid>) {
    if let Some(governorate_id) = within {
        builder.push(" AND ha.governorate_id = ").push_bind(governorate_id);
    }
    match scope {
        ReportScope::All => {}
        ReportScope::Governorate(id) => {
            builder.push(" AND ha.governorate_id = ").push_bind(id);
        }
        ReportScope::Region(id) => {
            builder.push(" AND r.region_id = ").push_bind(id);
        }
        ReportScope::User(id) => {
            builder.push(" AND r.user_id = ").push_bind(id);
        }
    }
}

pub async fn scoped_responses(
    conn: &mut SqliteConnection,
    survey_id: Uuid,
    scope: ReportScope,
    within: Option<Uuid>,
) -> Result<Vec<ResponseSummary>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(SUMMARY_SELECT);
    builder.push(" WHERE r.survey_id = ").push_bind(survey_id);
    push_scope(&mut builder, scope, within);
    builder.push(" ORDER BY r.submitted_at DESC");

    builder
        .build_query_as::<ResponseSummary>()
        .fetch_all(&mut *conn)
        .await
}

pub async fn survey_stats(
    conn: &mut SqliteConnection,
    survey_id: Uuid,
    scope: ReportScope,
    within: Option<Uuid>,
) -> Result<SurveyStats, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT
            COUNT(r.id) AS total_responses,
            COALESCE(SUM(CASE WHEN r.is_completed = 1 THEN 1 ELSE 0 END), 0) AS completed_responses,
            COUNT(DISTINCT r.region_id) AS regions
        FROM responses r
        JOIN health_administrations ha ON ha.id = r.region_id
        "#,
    );
    builder.push(" WHERE r.survey_id = ").push_bind(survey_id);
    push_scope(&mut builder, scope, within);

    builder
        .build_query_as::<SurveyStats>()
        .fetch_one(&mut *conn)
        .await
}
