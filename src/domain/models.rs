use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    GovernorateAdmin,
    Employee,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::GovernorateAdmin => "governorate_admin",
            UserRole::Employee => "employee",
        }
    }
}

impl TryFrom<&str> for UserRole {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "governorate_admin" => Ok(UserRole::GovernorateAdmin),
            "employee" => Ok(UserRole::Employee),
            _ => Err(()),
        }
    }
}

/// What part of the directory an actor may see.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ActorScope {
    All,
    Governorate(Uuid),
    Region(Uuid),
    /// Governorate admin without binding or employee without region.
    Unassigned,
}

/// The authenticated caller, passed explicitly into every core operation.
#[derive(Clone, Debug, Serialize)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub scope: ActorScope,
}

impl ActorContext {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn governorate(&self) -> Option<Uuid> {
        match self.scope {
            ActorScope::Governorate(id) => Some(id),
            _ => None,
        }
    }

    pub fn region(&self) -> Option<Uuid> {
        match self.scope {
            ActorScope::Region(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Governorate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Region {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub governorate_id: Uuid,
    pub governorate_name: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub assigned_region: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// User joined with the names shown on the admin user list.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserListing {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub region_id: Option<Uuid>,
    pub region_name: Option<String>,
    pub governorate_id: Option<Uuid>,
    pub governorate_name: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Employee {
    pub id: Uuid,
    pub username: String,
    pub region_id: Uuid,
    pub region_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Survey {
    pub id: Uuid,
    pub name: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Response {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub user_id: Uuid,
    pub region_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub submission_day: NaiveDate,
    pub is_completed: bool,
}

/// Denormalized header shown on every review screen and in scoped listings.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct ResponseSummary {
    pub response_id: Uuid,
    pub survey_id: Uuid,
    pub survey_name: String,
    pub user_id: Uuid,
    pub username: String,
    pub region_id: Uuid,
    pub region_name: String,
    pub governorate_id: Uuid,
    pub governorate_name: String,
    pub submitted_at: DateTime<Utc>,
    pub submission_day: NaiveDate,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Default, Serialize, FromRow, PartialEq, Eq)]
pub struct SurveyStats {
    pub total_responses: i64,
    pub completed_responses: i64,
    pub regions: i64,
}

/// Result of a grant replacement: what was stored and what was filtered out.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct GrantOutcome {
    pub granted: Vec<Uuid>,
    pub dropped: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip_strings() {
        for role in [UserRole::Admin, UserRole::GovernorateAdmin, UserRole::Employee] {
            assert_eq!(UserRole::try_from(role.as_str()), Ok(role));
        }
        assert!(UserRole::try_from("founder").is_err());
        assert_eq!(
            UserRole::try_from(" Governorate_Admin "),
            Ok(UserRole::GovernorateAdmin)
        );
    }

    #[test]
    fn test_actor_scope_accessors() {
        let gov = Uuid::new_v4();
        let actor = ActorContext {
            user_id: Uuid::new_v4(),
            username: "g".into(),
            role: UserRole::GovernorateAdmin,
            scope: ActorScope::Governorate(gov),
        };
        assert_eq!(actor.governorate(), Some(gov));
        assert_eq!(actor.region(), None);
        assert!(!actor.is_admin());
    }
}
