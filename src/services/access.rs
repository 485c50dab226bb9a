use crate::db::{directory, surveys, users};
use crate::domain::models::{ActorContext, Region, Survey, UserRole};
use crate::error::{CoreError, CoreResult, Entity};
use sqlx::SqliteConnection;
use uuid::Uuid;

fn denied(actor: &ActorContext, what: &str) -> CoreError {
    tracing::warn!(
        "Access denied for {} ({}) on {}",
        actor.username,
        actor.role.as_str(),
        what
    );
    CoreError::Authorization
}

pub fn require_admin(actor: &ActorContext) -> CoreResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(denied(actor, "admin operation"))
    }
}

/// Admins, or the governorate admin bound to `governorate_id`.
pub fn ensure_governorate_scope(actor: &ActorContext, governorate_id: Uuid) -> CoreResult<()> {
    if actor.is_admin() || actor.governorate() == Some(governorate_id) {
        Ok(())
    } else {
        Err(denied(actor, "governorate"))
    }
}

/// Loads a region the actor may act on: any for admins, their governorate's
/// regions for governorate admins, their own region for employees.
pub async fn region_in_scope(
    conn: &mut SqliteConnection,
    actor: &ActorContext,
    region_id: Uuid,
) -> CoreResult<Region> {
    let region = directory::find_region(conn, region_id)
        .await?
        .ok_or(CoreError::NotFound(Entity::Region))?;

    let allowed = match actor.role {
        UserRole::Admin => true,
        UserRole::GovernorateAdmin => actor.governorate() == Some(region.governorate_id),
        UserRole::Employee => actor.region() == Some(region.id),
    };
    if allowed {
        Ok(region)
    } else {
        Err(denied(actor, "region"))
    }
}

/// Loads a survey the actor may read: governorate admins need a governorate
/// grant, employees a personal grant.
pub async fn survey_readable(
    conn: &mut SqliteConnection,
    actor: &ActorContext,
    survey_id: Uuid,
) -> CoreResult<Survey> {
    let survey = surveys::find_survey(conn, survey_id)
        .await?
        .ok_or(CoreError::NotFound(Entity::Survey))?;

    let allowed = match actor.role {
        UserRole::Admin => true,
        UserRole::GovernorateAdmin => match actor.governorate() {
            Some(governorate_id) => {
                surveys::survey_granted_to_governorate(conn, survey_id, governorate_id).await?
            }
            None => false,
        },
        UserRole::Employee => users::user_has_grant(conn, actor.user_id, survey_id).await?,
    };
    if allowed {
        Ok(survey)
    } else {
        Err(denied(actor, "survey"))
    }
}

/// Whether a response owned by `owner_id` in `governorate_id` is visible to the actor.
pub fn ensure_response_visible(
    actor: &ActorContext,
    owner_id: Uuid,
    governorate_id: Uuid,
) -> CoreResult<()> {
    let allowed = match actor.role {
        UserRole::Admin => true,
        UserRole::GovernorateAdmin => actor.governorate() == Some(governorate_id),
        UserRole::Employee => actor.user_id == owner_id,
    };
    if allowed {
        Ok(())
    } else {
        Err(denied(actor, "response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ActorScope;

    fn actor(role: UserRole, scope: ActorScope) -> ActorContext {
        ActorContext {
            user_id: Uuid::new_v4(),
            username: "someone".into(),
            role,
            scope,
        }
    }

    #[test]
    fn test_governorate_scope() {
        let gov = Uuid::new_v4();
        let admin = actor(UserRole::Admin, ActorScope::All);
        let gov_admin = actor(UserRole::GovernorateAdmin, ActorScope::Governorate(gov));
        let unbound = actor(UserRole::GovernorateAdmin, ActorScope::Unassigned);

        assert!(ensure_governorate_scope(&admin, gov).is_ok());
        assert!(ensure_governorate_scope(&gov_admin, gov).is_ok());
        assert!(matches!(
            ensure_governorate_scope(&gov_admin, Uuid::new_v4()),
            Err(CoreError::Authorization)
        ));
        assert!(ensure_governorate_scope(&unbound, gov).is_err());
    }

    #[test]
    fn test_response_visibility() {
        let gov = Uuid::new_v4();
        let employee = actor(UserRole::Employee, ActorScope::Region(Uuid::new_v4()));
        assert!(ensure_response_visible(&employee, employee.user_id, gov).is_ok());
        assert!(ensure_response_visible(&employee, Uuid::new_v4(), gov).is_err());

        let gov_admin = actor(UserRole::GovernorateAdmin, ActorScope::Governorate(gov));
        assert!(ensure_response_visible(&gov_admin, Uuid::new_v4(), gov).is_ok());
        assert!(ensure_response_visible(&gov_admin, Uuid::new_v4(), Uuid::new_v4()).is_err());
        assert!(require_admin(&gov_admin).is_err());
    }
}
