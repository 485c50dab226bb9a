use crate::domain::field::{AnswerView, FieldType, SurveyField};
use crate::domain::models::{Response, ResponseSummary};
use chrono::NaiveDate;
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

/// Ownership of a stored answer, used to scope-check edits.
#[derive(Debug, Clone, FromRow)]
pub struct DetailOwner {
    pub detail_id: Uuid,
    pub response_id: Uuid,
    pub field_id: Uuid,
    pub answer_value: Option<String>,
    pub user_id: Uuid,
    pub region_id: Uuid,
    pub governorate_id: Uuid,
    pub is_completed: bool,
}

#[derive(FromRow)]
struct AnswerRow {
    detail_id: Uuid,
    response_id: Uuid,
    answer_value: Option<String>,
    field_id: Uuid,
    survey_id: Uuid,
    field_type: String,
    label: String,
    field_options: Option<String>,
    is_required: bool,
    field_order: i64,
}

pub(crate) const SUMMARY_SELECT: &str = r#"
    SELECT
        r.id AS response_id,
        s.id AS survey_id,
        s.name AS survey_name,
        u.id AS user_id,
        u.username,
        ha.id AS region_id,
        ha.name AS region_name,
        g.id AS governorate_id,
        g.name AS governorate_name,
        r.submitted_at,
        r.submission_day,
        r.is_completed
    FROM responses r
    JOIN surveys s ON s.id = r.survey_id
    JOIN users u ON u.id = r.user_id
    JOIN health_administrations ha ON ha.id = r.region_id
    JOIN governorates g ON g.id = ha.governorate_id
"#;

pub async fn has_completed_on(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    survey_id: Uuid,
    day: NaiveDate,
) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1
        FROM responses
        WHERE user_id = ? AND survey_id = ? AND submission_day = ? AND is_completed = 1
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(survey_id)
    .bind(day)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

pub async fn insert_response(conn: &mut SqliteConnection, response: &Response) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO responses (id, survey_id, user_id, region_id, submitted_at, submission_day, is_completed)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(response.id)
    .bind(response.survey_id)
    .bind(response.user_id)
    .bind(response.region_id)
    .bind(response.submitted_at)
    .bind(response.submission_day)
    .bind(response.is_completed)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Stored answer for (response, field): `None` when no row exists yet.
pub async fn find_answer(
    conn: &mut SqliteConnection,
    response_id: Uuid,
    field_id: Uuid,
) -> Result<Option<Option<String>>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT answer_value
        FROM response_details
        WHERE response_id = ? AND field_id = ?
        "#,
    )
    .bind(response_id)
    .bind(field_id)
    .fetch_optional(&mut *conn)
    .await
}

/// Stores the answer for (response, field), replacing an earlier one. Returns the detail id.
pub async fn upsert_detail(
    conn: &mut SqliteConnection,
    response_id: Uuid,
    field_id: Uuid,
    answer_value: Option<&str>,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO response_details (id, response_id, field_id, answer_value)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (response_id, field_id) DO UPDATE SET answer_value = excluded.answer_value
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(response_id)
    .bind(field_id)
    .bind(answer_value)
    .fetch_one(&mut *conn)
    .await
}

pub async fn find_detail_owner(
    conn: &mut SqliteConnection,
    detail_id: Uuid,
) -> Result<Option<DetailOwner>, sqlx::Error> {
    sqlx::query_as::<_, DetailOwner>(
        r#"
        SELECT
            d.id AS detail_id,
            d.response_id,
            d.field_id,
            d.answer_value,
            r.user_id,
            r.region_id,
            ha.governorate_id,
            r.is_completed
        FROM response_details d
        JOIN responses r ON r.id = d.response_id
        JOIN health_administrations ha ON ha.id = r.region_id
        WHERE d.id = ?
        "#,
    )
    .bind(detail_id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn update_detail(
    conn: &mut SqliteConnection,
    detail_id: Uuid,
    answer_value: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE response_details SET answer_value = ? WHERE id = ?")
        .bind(answer_value)
        .bind(detail_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_details(conn: &mut SqliteConnection, response_id: Uuid) -> Result<Vec<AnswerView>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AnswerRow>(
        r#"
        SELECT
            d.id AS detail_id,
            d.response_id,
            d.answer_value,
            f.id AS field_id,
            f.survey_id,
            f.field_type,
            f.label,
            f.field_options,
            f.is_required,
            f.field_order
        FROM response_details d
        JOIN survey_fields f ON f.id = d.field_id
        WHERE d.response_id = ?
        ORDER BY f.field_order
        "#,
    )
    .bind(response_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            let field_type = FieldType::decode(&row.field_type, row.field_options.as_deref())
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
            Ok(AnswerView {
                detail_id: row.detail_id,
                response_id: row.response_id,
                field: SurveyField {
                    id: row.field_id,
                    survey_id: row.survey_id,
                    label: row.label,
                    field_type,
                    is_required: row.is_required,
                    field_order: row.field_order,
                },
                answer_value: row.answer_value,
            })
        })
        .collect()
}

pub async fn response_summary(
    conn: &mut SqliteConnection,
    response_id: Uuid,
) -> Result<Option<ResponseSummary>, sqlx::Error> {
    let sql = format!("{SUMMARY_SELECT} WHERE r.id = ?");
    sqlx::query_as::<_, ResponseSummary>(&sql)
        .bind(response_id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn list_user_responses(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    survey_id: Uuid,
) -> Result<Vec<ResponseSummary>, sqlx::Error> {
    let sql = format!("{SUMMARY_SELECT} WHERE r.user_id = ? AND r.survey_id = ? ORDER BY r.submitted_at DESC");
    sqlx::query_as::<_, ResponseSummary>(&sql)
        .bind(user_id)
        .bind(survey_id)
        .fetch_all(&mut *conn)
        .await
}
