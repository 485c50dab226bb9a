use super::access::{ensure_governorate_scope, region_in_scope, require_admin};
use super::{snapshot, Core};
use crate::db::audit::AuditAction;
use crate::db::{directory, users};
use crate::domain::models::{ActorContext, Governorate, Region, UserRole};
use crate::error::{ConflictKind, CoreError, CoreResult, Entity, ValidationIssue};
use serde::Serialize;
use uuid::Uuid;

/// Region together with its governorate, as shown on the employee dashboard.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RegionInfo {
    pub region: Region,
    pub governorate: Governorate,
}

fn clean_name(name: &str) -> CoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationIssue::EmptyName.into());
    }
    Ok(name.to_string())
}

fn clean_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

impl Core {
    // ========== Governorates ==========

    pub async fn add_governorate(
        &self,
        actor: &ActorContext,
        name: &str,
        description: Option<&str>,
    ) -> CoreResult<Governorate> {
        require_admin(actor)?;
        let governorate = Governorate {
            id: Uuid::new_v4(),
            name: clean_name(name)?,
            description: clean_description(description),
        };

        let mut conn = self.pool.acquire().await?;
        if directory::governorate_name_taken(&mut conn, &governorate.name, None).await? {
            return Err(CoreError::Conflict(ConflictKind::GovernorateNameTaken));
        }
        directory::insert_governorate(&mut conn, &governorate).await?;
        drop(conn);

        tracing::info!("Governorate {} added by {}", governorate.name, actor.username);
        self.record(
            Some(actor.user_id),
            AuditAction::Insert,
            "governorates",
            Some(governorate.id),
            None,
            snapshot(&governorate),
        )
        .await;
        Ok(governorate)
    }

    pub async fn update_governorate(
        &self,
        actor: &ActorContext,
        governorate_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> CoreResult<Governorate> {
        require_admin(actor)?;
        let name = clean_name(name)?;
        let description = clean_description(description);

        let mut conn = self.pool.acquire().await?;
        let old = directory::find_governorate(&mut conn, governorate_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Governorate))?;
        if directory::governorate_name_taken(&mut conn, &name, Some(governorate_id)).await? {
            return Err(CoreError::Conflict(ConflictKind::GovernorateNameTaken));
        }
        directory::update_governorate(&mut conn, governorate_id, &name, description.as_deref()).await?;
        drop(conn);

        let updated = Governorate {
            id: governorate_id,
            name,
            description,
        };
        tracing::info!("Governorate {} updated by {}", governorate_id, actor.username);
        self.record(
            Some(actor.user_id),
            AuditAction::Update,
            "governorates",
            Some(governorate_id),
            snapshot(&old),
            snapshot(&updated),
        )
        .await;
        Ok(updated)
    }

    /// Fails with a conflict while any region still belongs to the governorate.
    pub async fn delete_governorate(&self, actor: &ActorContext, governorate_id: Uuid) -> CoreResult<()> {
        require_admin(actor)?;

        let mut tx = self.begin_write().await?;
        let old = directory::find_governorate(&mut tx, governorate_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Governorate))?;
        if directory::count_regions(&mut tx, governorate_id).await? > 0 {
            return Err(CoreError::Conflict(ConflictKind::GovernorateHasRegions));
        }
        directory::delete_governorate(&mut tx, governorate_id).await?;
        tx.commit().await?;

        tracing::info!("Governorate {} deleted by {}", old.name, actor.username);
        self.record(
            Some(actor.user_id),
            AuditAction::Delete,
            "governorates",
            Some(governorate_id),
            snapshot(&old),
            None,
        )
        .await;
        Ok(())
    }

    /// Admins see every governorate, everyone else only their own.
    pub async fn list_governorates(&self, actor: &ActorContext) -> CoreResult<Vec<Governorate>> {
        let mut conn = self.pool.acquire().await?;
        let all = directory::list_governorates(&mut conn).await?;
        if actor.is_admin() {
            return Ok(all);
        }

        let own = self.actor_governorate(&mut conn, actor).await?;
        Ok(all.into_iter().filter(|g| Some(g.id) == own).collect())
    }

    pub async fn get_governorate(&self, actor: &ActorContext, governorate_id: Uuid) -> CoreResult<Governorate> {
        let mut conn = self.pool.acquire().await?;
        let governorate = directory::find_governorate(&mut conn, governorate_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Governorate))?;
        if actor.role == UserRole::Employee {
            if self.actor_governorate(&mut conn, actor).await? != Some(governorate_id) {
                return Err(CoreError::Authorization);
            }
        } else {
            ensure_governorate_scope(actor, governorate_id)?;
        }
        Ok(governorate)
    }

    async fn actor_governorate(
        &self,
        conn: &mut sqlx::SqliteConnection,
        actor: &ActorContext,
    ) -> CoreResult<Option<Uuid>> {
        Ok(match actor.role {
            UserRole::Admin => None,
            UserRole::GovernorateAdmin => actor.governorate(),
            UserRole::Employee => users::region_governorate_of_user(conn, actor.user_id).await?,
        })
    }

    // ========== Regions ==========

    pub async fn add_region(
        &self,
        actor: &ActorContext,
        name: &str,
        description: Option<&str>,
        governorate_id: Uuid,
    ) -> CoreResult<Region> {
        require_admin(actor)?;
        let name = clean_name(name)?;
        let description = clean_description(description);

        let mut conn = self.pool.acquire().await?;
        let governorate = directory::find_governorate(&mut conn, governorate_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Governorate))?;
        if directory::region_name_taken(&mut conn, &name, governorate_id, None).await? {
            return Err(CoreError::Conflict(ConflictKind::RegionNameTaken));
        }

        let region = Region {
            id: Uuid::new_v4(),
            name,
            description,
            governorate_id,
            governorate_name: governorate.name,
        };
        directory::insert_region(
            &mut conn,
            region.id,
            &region.name,
            region.description.as_deref(),
            governorate_id,
        )
        .await?;
        drop(conn);

        tracing::info!("Region {} added to {} by {}", region.name, region.governorate_name, actor.username);
        self.record(
            Some(actor.user_id),
            AuditAction::Insert,
            "health_administrations",
            Some(region.id),
            None,
            snapshot(&region),
        )
        .await;
        Ok(region)
    }

    /// Renames a region. The owning governorate never changes.
    pub async fn update_region(
        &self,
        actor: &ActorContext,
        region_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> CoreResult<Region> {
        require_admin(actor)?;
        let name = clean_name(name)?;
        let description = clean_description(description);

        let mut conn = self.pool.acquire().await?;
        let old = directory::find_region(&mut conn, region_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Region))?;
        if directory::region_name_taken(&mut conn, &name, old.governorate_id, Some(region_id)).await? {
            return Err(CoreError::Conflict(ConflictKind::RegionNameTaken));
        }
        directory::update_region(&mut conn, region_id, &name, description.as_deref()).await?;
        drop(conn);

        let updated = Region {
            name,
            description,
            ..old.clone()
        };
        tracing::info!("Region {} updated by {}", region_id, actor.username);
        self.record(
            Some(actor.user_id),
            AuditAction::Update,
            "health_administrations",
            Some(region_id),
            snapshot(&old),
            snapshot(&updated),
        )
        .await;
        Ok(updated)
    }

    /// Fails with a conflict while any user is assigned to the region.
    pub async fn delete_region(&self, actor: &ActorContext, region_id: Uuid) -> CoreResult<()> {
        require_admin(actor)?;

        let mut tx = self.begin_write().await?;
        let old = directory::find_region(&mut tx, region_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Region))?;
        if directory::count_users_in_region(&mut tx, region_id).await? > 0 {
            return Err(CoreError::Conflict(ConflictKind::RegionHasUsers));
        }
        directory::delete_region(&mut tx, region_id).await?;
        tx.commit().await?;

        tracing::info!("Region {} deleted by {}", old.name, actor.username);
        self.record(
            Some(actor.user_id),
            AuditAction::Delete,
            "health_administrations",
            Some(region_id),
            snapshot(&old),
            None,
        )
        .await;
        Ok(())
    }

    /// Regions visible to the actor, optionally narrowed to one governorate.
    pub async fn list_regions(
        &self,
        actor: &ActorContext,
        governorate_id: Option<Uuid>,
    ) -> CoreResult<Vec<Region>> {
        let mut conn = self.pool.acquire().await?;
        match actor.role {
            UserRole::Admin => Ok(directory::list_regions(&mut conn, governorate_id).await?),
            UserRole::GovernorateAdmin => {
                let own = actor.governorate().ok_or(CoreError::Authorization)?;
                if let Some(requested) = governorate_id {
                    ensure_governorate_scope(actor, requested)?;
                }
                Ok(directory::list_regions(&mut conn, Some(own)).await?)
            }
            UserRole::Employee => {
                let own = actor.region().ok_or(CoreError::Authorization)?;
                let region = region_in_scope(&mut conn, actor, own).await?;
                if governorate_id.is_some_and(|g| g != region.governorate_id) {
                    return Ok(Vec::new());
                }
                Ok(vec![region])
            }
        }
    }

    pub async fn get_region(&self, actor: &ActorContext, region_id: Uuid) -> CoreResult<Region> {
        let mut conn = self.pool.acquire().await?;
        region_in_scope(&mut conn, actor, region_id).await
    }

    pub async fn region_info(&self, actor: &ActorContext, region_id: Uuid) -> CoreResult<RegionInfo> {
        let mut conn = self.pool.acquire().await?;
        let region = region_in_scope(&mut conn, actor, region_id).await?;
        let governorate = directory::find_governorate(&mut conn, region.governorate_id)
            .await?
            .ok_or(CoreError::NotFound(Entity::Governorate))?;
        tracing::debug!("Region info for {} requested by {}", region.name, actor.username);
        Ok(RegionInfo { region, governorate })
    }
}
