use super::access::{ensure_governorate_scope, require_admin};
use super::{snapshot, Core};
use crate::db::audit::AuditAction;
use crate::db::{directory, surveys, users};
use crate::domain::models::{
    ActorContext, ActorScope, Employee, Governorate, GrantOutcome, Survey, User, UserListing, UserRole,
};
use crate::error::{is_unique_violation, ConflictKind, CoreError, CoreResult, Entity, ValidationIssue};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use chrono::Utc;
use rand_core::OsRng;
use serde_json::json;
use sqlx::SqliteConnection;
use uuid::Uuid;

/// Argon2 PHC string for a plaintext password, with a fresh random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn clean_username(username: &str) -> CoreResult<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ValidationIssue::EmptyName.into());
    }
    Ok(username.to_string())
}

/// Role-dependent scope columns after validation.
struct Placement {
    region: Option<Uuid>,
    governorate: Option<Uuid>,
}

/// Employees need an existing region, governorate admins an existing
/// governorate. Anything not used by the role is discarded.
async fn place(
    conn: &mut SqliteConnection,
    role: UserRole,
    region: Option<Uuid>,
    governorate: Option<Uuid>,
) -> CoreResult<Placement> {
    match role {
        UserRole::Admin => Ok(Placement {
            region: None,
            governorate: None,
        }),
        UserRole::Employee => {
            let region_id = region.ok_or(ValidationIssue::RegionRequired)?;
            directory::find_region(conn, region_id)
                .await?
                .ok_or(CoreError::NotFound(Entity::Region))?;
            Ok(Placement {
                region: Some(region_id),
                governorate: None,
            })
        }
        UserRole::GovernorateAdmin => {
            let governorate_id = governorate.ok_or(ValidationIssue::GovernorateRequired)?;
            directory::find_governorate(conn, governorate_id)
                .await?
                .ok_or(CoreError::NotFound(Entity::Governorate))?;
            Ok(Placement {
                region: None,
                governorate: Some(governorate_id),
            })
        }
    }
}

/// Admins manage everyone; governorate admins manage employees of their governorate.
async fn ensure_user_manageable(
    conn: &mut SqliteConnection,
    actor: &ActorContext,
    target: &User,
) -> CoreResult<()> {
    if actor.is_admin() {
        return Ok(());
    }
    if actor.role != UserRole::GovernorateAdmin || target.role != UserRole::Employee {
        return Err(CoreError::Authorization);
    }
    match users::region_governorate_of_user(conn, target.id).await? {
        Some(governorate_id) => ensure_governorate_scope(actor, governorate_id),
        None => Err(CoreError::Authorization),
    }
}

fn username_conflict(err: sqlx::Error) -> CoreError {
    if is_unique_violation(&err) {
        CoreError::Conflict(ConflictKind::UsernameTaken)
    } else {
        err.into()
    }
}

impl Core {
    // ========== Authentication ==========

    /// Verifies credentials and stamps the login. `None` for unknown users or wrong passwords.
    pub async fn authenticate(&self, username: &str, password: &str) -> CoreResult<Option<ActorContext>> {
        let mut conn = self.pool.acquire().await?;
        let Some(user) = users::find_user_by_username(&mut conn, username.trim()).await? else {
            tracing::warn!("Login attempt for unknown user {}", username.trim());
            return Ok(None);
        };

        if !verify_password(&user.password_hash, password) {
            tracing::warn!("Invalid password for {}", user.username);
            return Ok(None);
        }

        users::mark_login(&mut conn, user.id, Utc::now()).await?;
        drop(conn);

        let actor = self.resolve_actor(user.id).await?;
        tracing::info!("User {} logged in", actor.username);
        self.record(
            Some(user.id),
            AuditAction::Login,
            "users",
            Some(user.id),
            None,
            Some(json!({ "username": actor.username })),
        )
        .await;
        Ok(Some(actor))
    }

    /// Builds the actor context for a stored user from its role bindings.
    pub async fn resolve_actor(&self, user_id: Uuid) -> CoreResult<ActorContext> {
        let mut conn = self.pool.acquire().await?;
        let user = users::find_user_by_id(&mut conn, user_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::User))?;

        let scope = match user.role {
            UserRole::Admin => ActorScope::All,
            UserRole::GovernorateAdmin => match users::governorate_for_admin(&mut conn, user.id).await? {
                Some(governorate) => ActorScope::Governorate(governorate.id),
                None => ActorScope::Unassigned,
            },
            UserRole::Employee => match user.assigned_region {
                Some(region) => ActorScope::Region(region),
                None => ActorScope::Unassigned,
            },
        };

        Ok(ActorContext {
            user_id: user.id,
            username: user.username,
            role: user.role,
            scope,
        })
    }

    pub async fn touch_activity(&self, user_id: Uuid) -> CoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        users::mark_activity(&mut conn, user_id, Utc::now()).await?;
        Ok(())
    }

    // ========== Users ==========

    /// Creates a user from an already hashed password. A governorate admin is
    /// bound to `governorate_id` in the same transaction.
    pub async fn create_user(
        &self,
        actor: &ActorContext,
        username: &str,
        password_hash: String,
        role: UserRole,
        region_id: Option<Uuid>,
        governorate_id: Option<Uuid>,
    ) -> CoreResult<Uuid> {
        require_admin(actor)?;
        let username = clean_username(username)?;

        let mut tx = self.begin_write().await?;
        if users::username_taken(&mut tx, &username, None).await? {
            return Err(CoreError::Conflict(ConflictKind::UsernameTaken));
        }
        let placement = place(&mut tx, role, region_id, governorate_id).await?;

        let user = User {
            id: Uuid::new_v4(),
            username,
            password_hash,
            role,
            assigned_region: placement.region,
            created_at: Utc::now(),
            last_login: None,
            last_activity: None,
        };
        users::insert_user(&mut tx, &user)
            .await
            .map_err(username_conflict)?;
        if let Some(governorate_id) = placement.governorate {
            users::bind_governorate_admin(&mut tx, user.id, governorate_id).await?;
        }
        tx.commit().await?;

        tracing::info!("User {} ({}) created by {}", user.username, role.as_str(), actor.username);
        self.record(
            Some(actor.user_id),
            AuditAction::Insert,
            "users",
            Some(user.id),
            None,
            snapshot(&user),
        )
        .await;
        Ok(user.id)
    }

    /// Rewrites username, role and scope in one transaction. Stale governorate
    /// bindings are cleared and employee grants re-validated against the new region.
    pub async fn update_user(
        &self,
        actor: &ActorContext,
        user_id: Uuid,
        username: &str,
        role: UserRole,
        region_id: Option<Uuid>,
        governorate_id: Option<Uuid>,
    ) -> CoreResult<User> {
        require_admin(actor)?;
        let username = clean_username(username)?;

        let mut tx = self.begin_write().await?;
        let old = users::find_user_by_id(&mut tx, user_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::User))?;
        if users::username_taken(&mut tx, &username, Some(user_id)).await? {
            return Err(CoreError::Conflict(ConflictKind::UsernameTaken));
        }
        let placement = place(&mut tx, role, region_id, governorate_id).await?;

        users::update_user(&mut tx, user_id, &username, role, placement.region)
            .await
            .map_err(username_conflict)?;
        users::clear_governorate_bindings(&mut tx, user_id).await?;
        if let Some(governorate_id) = placement.governorate {
            users::bind_governorate_admin(&mut tx, user_id, governorate_id).await?;
        }

        let pruned = match role {
            UserRole::Admin => users::clear_user_grants(&mut tx, user_id).await?,
            UserRole::Employee => {
                let governorate = users::region_governorate_of_user(&mut tx, user_id).await?;
                users::prune_user_grants(&mut tx, user_id, governorate).await?
            }
            UserRole::GovernorateAdmin => 0,
        };
        let updated = users::find_user_by_id(&mut tx, user_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::User))?;
        tx.commit().await?;

        tracing::info!(
            "User {} updated by {} ({} grants dropped)",
            updated.username,
            actor.username,
            pruned
        );
        self.record(
            Some(actor.user_id),
            AuditAction::Update,
            "users",
            Some(user_id),
            snapshot(&old),
            snapshot(&updated),
        )
        .await;
        Ok(updated)
    }

    /// Fails with a conflict while the user owns responses.
    pub async fn delete_user(&self, actor: &ActorContext, user_id: Uuid) -> CoreResult<()> {
        require_admin(actor)?;

        let mut tx = self.begin_write().await?;
        let old = users::find_user_by_id(&mut tx, user_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::User))?;
        if users::count_user_responses(&mut tx, user_id).await? > 0 {
            return Err(CoreError::Conflict(ConflictKind::UserHasResponses));
        }
        users::delete_user(&mut tx, user_id).await?;
        tx.commit().await?;

        tracing::info!("User {} deleted by {}", old.username, actor.username);
        self.record(
            Some(actor.user_id),
            AuditAction::Delete,
            "users",
            Some(user_id),
            snapshot(&old),
            None,
        )
        .await;
        Ok(())
    }

    pub async fn get_user(&self, actor: &ActorContext, user_id: Uuid) -> CoreResult<User> {
        let mut conn = self.pool.acquire().await?;
        let user = users::find_user_by_id(&mut conn, user_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::User))?;
        if actor.user_id != user_id {
            ensure_user_manageable(&mut conn, actor, &user).await?;
        }
        Ok(user)
    }

    pub async fn list_users(&self, actor: &ActorContext) -> CoreResult<Vec<UserListing>> {
        require_admin(actor)?;
        let mut conn = self.pool.acquire().await?;
        Ok(users::list_users(&mut conn).await?)
    }

    // ========== Governorate admin bindings ==========

    /// Binds a governorate admin to `governorate_id`, replacing any earlier binding.
    pub async fn grant_governorate_admin(
        &self,
        actor: &ActorContext,
        user_id: Uuid,
        governorate_id: Uuid,
    ) -> CoreResult<()> {
        require_admin(actor)?;

        let mut tx = self.begin_write().await?;
        let user = users::find_user_by_id(&mut tx, user_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::User))?;
        if user.role != UserRole::GovernorateAdmin {
            return Err(ValidationIssue::NotAGovernorateAdmin.into());
        }
        directory::find_governorate(&mut tx, governorate_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Governorate))?;
        users::clear_governorate_bindings(&mut tx, user_id).await?;
        users::bind_governorate_admin(&mut tx, user_id, governorate_id).await?;
        tx.commit().await?;

        tracing::info!("User {} now administers governorate {}", user.username, governorate_id);
        self.record(
            Some(actor.user_id),
            AuditAction::Insert,
            "governorate_admins",
            Some(user_id),
            None,
            Some(json!({ "user_id": user_id, "governorate_id": governorate_id })),
        )
        .await;
        Ok(())
    }

    pub async fn get_governorate_for_admin(
        &self,
        actor: &ActorContext,
        user_id: Uuid,
    ) -> CoreResult<Option<Governorate>> {
        if actor.user_id != user_id {
            require_admin(actor)?;
        }
        let mut conn = self.pool.acquire().await?;
        Ok(users::governorate_for_admin(&mut conn, user_id).await?)
    }

    // ========== Survey grants ==========

    /// Replaces a user's survey grants. For employees every id is filtered
    /// against the surveys granted to their governorate; ids that do not pass
    /// (or do not exist) come back in `dropped`.
    pub async fn set_user_survey_grants(
        &self,
        actor: &ActorContext,
        user_id: Uuid,
        survey_ids: &[Uuid],
    ) -> CoreResult<GrantOutcome> {
        let mut tx = self.begin_write().await?;
        let target = users::find_user_by_id(&mut tx, user_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::User))?;
        ensure_user_manageable(&mut tx, actor, &target).await?;
        if target.role == UserRole::Admin {
            return Err(ValidationIssue::GrantsNotApplicable.into());
        }

        let employee_governorate = match target.role {
            UserRole::Employee => users::region_governorate_of_user(&mut tx, user_id).await?,
            _ => None,
        };

        let mut outcome = GrantOutcome::default();
        for &survey_id in survey_ids {
            if outcome.granted.contains(&survey_id) || outcome.dropped.contains(&survey_id) {
                continue;
            }
            let allowed = match (target.role, employee_governorate) {
                (UserRole::Employee, Some(governorate_id)) => {
                    surveys::survey_granted_to_governorate(&mut tx, survey_id, governorate_id).await?
                }
                (UserRole::Employee, None) => false,
                _ => surveys::find_survey(&mut tx, survey_id).await?.is_some(),
            };
            if allowed {
                outcome.granted.push(survey_id);
            } else {
                outcome.dropped.push(survey_id);
            }
        }

        let previous: Vec<Uuid> = users::list_allowed_surveys(&mut tx, user_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        users::clear_user_grants(&mut tx, user_id).await?;
        for survey_id in &outcome.granted {
            users::insert_user_grant(&mut tx, user_id, *survey_id).await?;
        }
        tx.commit().await?;

        if outcome.dropped.is_empty() {
            tracing::info!(
                "Grants for {} replaced by {}: {} surveys",
                target.username,
                actor.username,
                outcome.granted.len()
            );
        } else {
            tracing::warn!(
                "Grants for {} replaced by {}: {} surveys, {} outside the governorate dropped",
                target.username,
                actor.username,
                outcome.granted.len(),
                outcome.dropped.len()
            );
        }
        self.record(
            Some(actor.user_id),
            AuditAction::Update,
            "user_surveys",
            Some(user_id),
            Some(json!({ "surveys": previous })),
            Some(json!({ "surveys": outcome.granted, "dropped": outcome.dropped })),
        )
        .await;
        Ok(outcome)
    }

    /// Surveys granted to `user_id`, by name.
    pub async fn list_allowed_surveys(&self, actor: &ActorContext, user_id: Uuid) -> CoreResult<Vec<Survey>> {
        let mut conn = self.pool.acquire().await?;
        if actor.user_id != user_id {
            let target = users::find_user_by_id(&mut conn, user_id)
                .await?
                .ok_or(CoreError::NotFound(Entity::User))?;
            ensure_user_manageable(&mut conn, actor, &target).await?;
        }
        Ok(users::list_allowed_surveys(&mut conn, user_id).await?)
    }

    // ========== Governorate employees ==========

    pub async fn list_governorate_employees(
        &self,
        actor: &ActorContext,
        governorate_id: Uuid,
    ) -> CoreResult<Vec<Employee>> {
        ensure_governorate_scope(actor, governorate_id)?;
        let mut conn = self.pool.acquire().await?;
        Ok(users::list_governorate_employees(&mut conn, governorate_id).await?)
    }

    /// Moves an employee to another region. Governorate admins stay inside
    /// their governorate. Grants not valid for the new governorate are dropped.
    pub async fn move_employee(&self, actor: &ActorContext, user_id: Uuid, region_id: Uuid) -> CoreResult<()> {
        let mut tx = self.begin_write().await?;
        let target = users::find_user_by_id(&mut tx, user_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::User))?;
        if target.role != UserRole::Employee {
            return Err(ValidationIssue::NotAnEmployee.into());
        }
        ensure_user_manageable(&mut tx, actor, &target).await?;

        let region = directory::find_region(&mut tx, region_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Region))?;
        if !actor.is_admin() && actor.governorate() != Some(region.governorate_id) {
            return Err(ValidationIssue::RegionOutOfScope.into());
        }

        users::set_user_region(&mut tx, user_id, region_id).await?;
        let pruned = users::prune_user_grants(&mut tx, user_id, Some(region.governorate_id)).await?;
        tx.commit().await?;

        tracing::info!(
            "Employee {} moved to {} by {} ({} grants dropped)",
            target.username,
            region.name,
            actor.username,
            pruned
        );
        self.record(
            Some(actor.user_id),
            AuditAction::Update,
            "users",
            Some(user_id),
            Some(json!({ "assigned_region": target.assigned_region })),
            Some(json!({ "assigned_region": region_id })),
        )
        .await;
        Ok(())
    }
}
