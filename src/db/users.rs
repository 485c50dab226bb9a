use crate::domain::models::{Employee, Governorate, Survey, User, UserListing, UserRole};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

pub async fn username_taken(
    conn: &mut SqliteConnection,
    username: &str,
    exclude: Option<Uuid>,
) -> Result<bool, sqlx::Error> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(matches!(existing, Some(id) if Some(id) != exclude))
}

pub async fn insert_user(conn: &mut SqliteConnection, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (id, username, password_hash, role, assigned_region, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(user.assigned_region)
    .bind(user.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_user_by_id(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password_hash, role, assigned_region, created_at, last_login, last_activity
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn find_user_by_username(
    conn: &mut SqliteConnection,
    username: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password_hash, role, assigned_region, created_at, last_login, last_activity
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(username)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list_users(conn: &mut SqliteConnection) -> Result<Vec<UserListing>, sqlx::Error> {
    sqlx::query_as::<_, UserListing>(
        r#"
        SELECT
            u.id,
            u.username,
            u.role,
            u.assigned_region AS region_id,
            r.name AS region_name,
            g.id AS governorate_id,
            g.name AS governorate_name,
            u.last_login
        FROM users u
        LEFT JOIN health_administrations r ON r.id = u.assigned_region
        LEFT JOIN governorate_admins ga ON ga.user_id = u.id
        LEFT JOIN governorates g ON g.id = COALESCE(r.governorate_id, ga.governorate_id)
        ORDER BY u.username
        "#,
    )
    .fetch_all(&mut *conn)
    .await
}

pub async fn update_user(
    conn: &mut SqliteConnection,
    id: Uuid,
    username: &str,
    role: UserRole,
    assigned_region: Option<Uuid>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET username = ?, role = ?, assigned_region = ?
        WHERE id = ?
        "#,
    )
    .bind(username)
    .bind(role)
    .bind(assigned_region)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_user_region(
    conn: &mut SqliteConnection,
    id: Uuid,
    region_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET assigned_region = ? WHERE id = ?")
        .bind(region_id)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_user(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_user_responses(conn: &mut SqliteConnection, id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE user_id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
}

pub async fn count_admins(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(&mut *conn)
        .await
}

pub async fn mark_login(conn: &mut SqliteConnection, id: Uuid, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_login = ?, last_activity = ? WHERE id = ?")
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn mark_activity(conn: &mut SqliteConnection, id: Uuid, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_activity = ? WHERE id = ?")
        .bind(at)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ========== Governorate admin bindings ==========

pub async fn bind_governorate_admin(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    governorate_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO governorate_admins (user_id, governorate_id)
        VALUES (?, ?)
        ON CONFLICT (user_id, governorate_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(governorate_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn clear_governorate_bindings(conn: &mut SqliteConnection, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM governorate_admins WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn governorate_for_admin(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Option<Governorate>, sqlx::Error> {
    sqlx::query_as::<_, Governorate>(
        r#"
        SELECT g.id, g.name, g.description
        FROM governorate_admins ga
        JOIN governorates g ON g.id = ga.governorate_id
        WHERE ga.user_id = ?
        ORDER BY g.name
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list_governorate_employees(
    conn: &mut SqliteConnection,
    governorate_id: Uuid,
) -> Result<Vec<Employee>, sqlx::Error> {
    sqlx::query_as::<_, Employee>(
        r#"
        SELECT u.id, u.username, r.id AS region_id, r.name AS region_name
        FROM users u
        JOIN health_administrations r ON r.id = u.assigned_region
        WHERE r.governorate_id = ?
          AND u.role = 'employee'
        ORDER BY u.username
        "#,
    )
    .bind(governorate_id)
    .fetch_all(&mut *conn)
    .await
}

// ========== User survey grants ==========

/// Governorate whose survey grants bound this user's survey grants, via the assigned region.
pub async fn region_governorate_of_user(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    let governorate: Option<Option<Uuid>> = sqlx::query_scalar(
        r#"
        SELECT r.governorate_id
        FROM users u
        LEFT JOIN health_administrations r ON r.id = u.assigned_region
        WHERE u.id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(governorate.flatten())
}

pub async fn clear_user_grants(conn: &mut SqliteConnection, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM user_surveys WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn insert_user_grant(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    survey_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_surveys (user_id, survey_id)
        VALUES (?, ?)
        ON CONFLICT (user_id, survey_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(survey_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn user_has_grant(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    survey_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM user_surveys WHERE user_id = ? AND survey_id = ?")
            .bind(user_id)
            .bind(survey_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

pub async fn list_allowed_surveys(conn: &mut SqliteConnection, user_id: Uuid) -> Result<Vec<Survey>, sqlx::Error> {
    sqlx::query_as::<_, Survey>(
        r#"
        SELECT s.id, s.name, s.created_by, s.created_at, s.is_active
        FROM surveys s
        JOIN user_surveys us ON us.survey_id = s.id
        WHERE us.user_id = ?
        ORDER BY s.name
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
}

/// Drops an employee's grants for surveys not granted to `governorate_id` (all of them when `None`).
pub async fn prune_user_grants(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    governorate_id: Option<Uuid>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM user_surveys
        WHERE user_id = ?
          AND survey_id NOT IN (
              SELECT survey_id FROM survey_governorates WHERE governorate_id = ?
          )
        "#,
    )
    .bind(user_id)
    .bind(governorate_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}
