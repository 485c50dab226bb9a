use crate::db::users;
use crate::domain::models::{User, UserRole};
use crate::services::identity::hash_password;
use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Creates the first admin when the store has none. Returns whether a user was created.
pub async fn seed_bootstrap_admin(pool: &SqlitePool, username: &str, password: &str) -> Result<bool> {
    let mut conn = pool.acquire().await?;
    if users::count_admins(&mut conn).await? > 0 {
        return Ok(false);
    }

    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        anyhow::bail!("bootstrap admin needs a username and a password");
    }
    if users::username_taken(&mut conn, username, None).await? {
        anyhow::bail!("bootstrap admin username {username} belongs to a non-admin user");
    }

    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: hash_password(password)?,
        role: UserRole::Admin,
        assigned_region: None,
        created_at: Utc::now(),
        last_login: None,
        last_activity: None,
    };
    users::insert_user(&mut conn, &user).await?;
    tracing::info!("Bootstrap admin {} created", user.username);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_seed_runs_once() {
        let pool = test_pool().await;
        assert!(seed_bootstrap_admin(&pool, "root", "s3cret").await.unwrap());
        assert!(!seed_bootstrap_admin(&pool, "root", "s3cret").await.unwrap());

        let mut conn = pool.acquire().await.unwrap();
        let user = users::find_user_by_username(&mut conn, "root")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.role, UserRole::Admin);
        assert_ne!(user.password_hash, "s3cret");
    }
}
