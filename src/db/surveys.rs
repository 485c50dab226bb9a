use crate::domain::field::{FieldType, SurveyField};
use crate::domain::models::Survey;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

#[derive(FromRow)]
struct FieldRow {
    id: Uuid,
    survey_id: Uuid,
    field_type: String,
    label: String,
    field_options: Option<String>,
    is_required: bool,
    field_order: i64,
}

impl TryFrom<FieldRow> for SurveyField {
    type Error = sqlx::Error;

    fn try_from(row: FieldRow) -> Result<Self, Self::Error> {
        let field_type = FieldType::decode(&row.field_type, row.field_options.as_deref())
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(SurveyField {
            id: row.id,
            survey_id: row.survey_id,
            label: row.label,
            field_type,
            is_required: row.is_required,
            field_order: row.field_order,
        })
    }
}

// ========== Surveys ==========

pub async fn insert_survey(
    conn: &mut SqliteConnection,
    id: Uuid,
    name: &str,
    created_by: Uuid,
    created_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO surveys (id, name, created_by, created_at, is_active)
        VALUES (?, ?, ?, ?, 1)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(created_by)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_survey(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Survey>, sqlx::Error> {
    sqlx::query_as::<_, Survey>(
        r#"
        SELECT id, name, created_by, created_at, is_active
        FROM surveys
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list_surveys(conn: &mut SqliteConnection) -> Result<Vec<Survey>, sqlx::Error> {
    sqlx::query_as::<_, Survey>(
        r#"
        SELECT id, name, created_by, created_at, is_active
        FROM surveys
        ORDER BY name
        "#,
    )
    .fetch_all(&mut *conn)
    .await
}

pub async fn list_governorate_surveys(
    conn: &mut SqliteConnection,
    governorate_id: Uuid,
) -> Result<Vec<Survey>, sqlx::Error> {
    sqlx::query_as::<_, Survey>(
        r#"
        SELECT s.id, s.name, s.created_by, s.created_at, s.is_active
        FROM surveys s
        JOIN survey_governorates sg ON sg.survey_id = s.id
        WHERE sg.governorate_id = ?
        ORDER BY s.name
        "#,
    )
    .bind(governorate_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn update_survey(
    conn: &mut SqliteConnection,
    id: Uuid,
    name: &str,
    is_active: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE surveys SET name = ?, is_active = ? WHERE id = ?")
        .bind(name)
        .bind(is_active)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_survey_active(
    conn: &mut SqliteConnection,
    id: Uuid,
    is_active: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE surveys SET is_active = ? WHERE id = ?")
        .bind(is_active)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Removes a survey; fields, grants, responses and their details go with it.
pub async fn delete_survey(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM surveys WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ========== Fields ==========

pub async fn insert_field(
    conn: &mut SqliteConnection,
    field: &SurveyField,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO survey_fields (id, survey_id, field_type, label, field_options, is_required, field_order)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(field.id)
    .bind(field.survey_id)
    .bind(field.field_type.kind())
    .bind(&field.label)
    .bind(field.field_type.options_json())
    .bind(field.is_required)
    .bind(field.field_order)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Rewrites type, label, options and required flag. Order is never changed.
pub async fn update_field(
    conn: &mut SqliteConnection,
    survey_id: Uuid,
    field_id: Uuid,
    label: &str,
    field_type: &FieldType,
    is_required: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE survey_fields
        SET field_type = ?, label = ?, field_options = ?, is_required = ?
        WHERE id = ? AND survey_id = ?
        "#,
    )
    .bind(field_type.kind())
    .bind(label)
    .bind(field_type.options_json())
    .bind(is_required)
    .bind(field_id)
    .bind(survey_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn max_field_order(conn: &mut SqliteConnection, survey_id: Uuid) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT MAX(field_order) FROM survey_fields WHERE survey_id = ?")
        .bind(survey_id)
        .fetch_one(&mut *conn)
        .await
}

pub async fn list_fields(conn: &mut SqliteConnection, survey_id: Uuid) -> Result<Vec<SurveyField>, sqlx::Error> {
    let rows = sqlx::query_as::<_, FieldRow>(
        r#"
        SELECT id, survey_id, field_type, label, field_options, is_required, field_order
        FROM survey_fields
        WHERE survey_id = ?
        ORDER BY field_order
        "#,
    )
    .bind(survey_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(SurveyField::try_from).collect()
}

pub async fn find_field(conn: &mut SqliteConnection, field_id: Uuid) -> Result<Option<SurveyField>, sqlx::Error> {
    let row = sqlx::query_as::<_, FieldRow>(
        r#"
        SELECT id, survey_id, field_type, label, field_options, is_required, field_order
        FROM survey_fields
        WHERE id = ?
        "#,
    )
    .bind(field_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(SurveyField::try_from).transpose()
}

// ========== Survey governorate grants ==========

pub async fn replace_survey_governorates(
    conn: &mut SqliteConnection,
    survey_id: Uuid,
    governorate_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM survey_governorates WHERE survey_id = ?")
        .bind(survey_id)
        .execute(&mut *conn)
        .await?;

    for governorate_id in governorate_ids {
        sqlx::query(
            r#"
            INSERT INTO survey_governorates (survey_id, governorate_id)
            VALUES (?, ?)
            ON CONFLICT (survey_id, governorate_id) DO NOTHING
            "#,
        )
        .bind(survey_id)
        .bind(governorate_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn list_survey_governorates(
    conn: &mut SqliteConnection,
    survey_id: Uuid,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT sg.governorate_id
        FROM survey_governorates sg
        JOIN governorates g ON g.id = sg.governorate_id
        WHERE sg.survey_id = ?
        ORDER BY g.name
        "#,
    )
    .bind(survey_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn survey_granted_to_governorate(
    conn: &mut SqliteConnection,
    survey_id: Uuid,
    governorate_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM survey_governorates WHERE survey_id = ? AND governorate_id = ?",
    )
    .bind(survey_id)
    .bind(governorate_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

/// Drops employee grants on `survey_id` whose region's governorate no longer holds the survey.
pub async fn prune_grants_for_survey(conn: &mut SqliteConnection, survey_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM user_surveys
        WHERE survey_id = ?
          AND user_id IN (
              SELECT u.id
              FROM users u
              LEFT JOIN health_administrations r ON r.id = u.assigned_region
              WHERE u.role = 'employee'
                AND (
                    r.governorate_id IS NULL
                    OR r.governorate_id NOT IN (
                        SELECT governorate_id FROM survey_governorates WHERE survey_id = ?
                    )
                )
          )
        "#,
    )
    .bind(survey_id)
    .bind(survey_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}
