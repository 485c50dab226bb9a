use crate::domain::models::{Governorate, Region};
use sqlx::SqliteConnection;
use uuid::Uuid;

// ========== Governorates ==========

pub async fn governorate_name_taken(
    conn: &mut SqliteConnection,
    name: &str,
    exclude: Option<Uuid>,
) -> Result<bool, sqlx::Error> {
    let existing: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id
        FROM governorates
        WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(matches!(existing, Some(id) if Some(id) != exclude))
}

pub async fn insert_governorate(
    conn: &mut SqliteConnection,
    governorate: &Governorate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO governorates (id, name, description)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(governorate.id)
    .bind(&governorate.name)
    .bind(&governorate.description)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_governorate(
    conn: &mut SqliteConnection,
    id: Uuid,
    name: &str,
    description: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE governorates
        SET name = ?, description = ?
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_governorate(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM governorates WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_governorate(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<Governorate>, sqlx::Error> {
    sqlx::query_as::<_, Governorate>(
        r#"
        SELECT id, name, description
        FROM governorates
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list_governorates(conn: &mut SqliteConnection) -> Result<Vec<Governorate>, sqlx::Error> {
    sqlx::query_as::<_, Governorate>(
        r#"
        SELECT id, name, description
        FROM governorates
        ORDER BY name
        "#,
    )
    .fetch_all(&mut *conn)
    .await
}

pub async fn count_regions(conn: &mut SqliteConnection, governorate_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM health_administrations WHERE governorate_id = ?")
        .bind(governorate_id)
        .fetch_one(&mut *conn)
        .await
}

// ========== Regions (health administrations) ==========

pub async fn region_name_taken(
    conn: &mut SqliteConnection,
    name: &str,
    governorate_id: Uuid,
    exclude: Option<Uuid>,
) -> Result<bool, sqlx::Error> {
    let existing: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id
        FROM health_administrations
        WHERE name = ? AND governorate_id = ?
        "#,
    )
    .bind(name)
    .bind(governorate_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(matches!(existing, Some(id) if Some(id) != exclude))
}

pub async fn insert_region(
    conn: &mut SqliteConnection,
    id: Uuid,
    name: &str,
    description: Option<&str>,
    governorate_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO health_administrations (id, name, description, governorate_id)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(governorate_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_region(
    conn: &mut SqliteConnection,
    id: Uuid,
    name: &str,
    description: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE health_administrations
        SET name = ?, description = ?
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_region(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM health_administrations WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_region(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Region>, sqlx::Error> {
    sqlx::query_as::<_, Region>(
        r#"
        SELECT r.id, r.name, r.description, r.governorate_id, g.name AS governorate_name
        FROM health_administrations r
        JOIN governorates g ON g.id = r.governorate_id
        WHERE r.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list_regions(
    conn: &mut SqliteConnection,
    governorate_id: Option<Uuid>,
) -> Result<Vec<Region>, sqlx::Error> {
    match governorate_id {
        Some(governorate_id) => {
            sqlx::query_as::<_, Region>(
                r#"
                SELECT r.id, r.name, r.description, r.governorate_id, g.name AS governorate_name
                FROM health_administrations r
                JOIN governorates g ON g.id = r.governorate_id
                WHERE r.governorate_id = ?
                ORDER BY r.name
                "#,
            )
            .bind(governorate_id)
            .fetch_all(&mut *conn)
            .await
        }
        None => {
            sqlx::query_as::<_, Region>(
                r#"
                SELECT r.id, r.name, r.description, r.governorate_id, g.name AS governorate_name
                FROM health_administrations r
                JOIN governorates g ON g.id = r.governorate_id
                ORDER BY g.name, r.name
                "#,
            )
            .fetch_all(&mut *conn)
            .await
        }
    }
}

pub async fn count_users_in_region(conn: &mut SqliteConnection, region_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE assigned_region = ?")
        .bind(region_id)
        .fetch_one(&mut *conn)
        .await
}
