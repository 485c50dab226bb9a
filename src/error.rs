use thiserror::Error;
use uuid::Uuid;

/// Entities the core can report as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Governorate,
    Region,
    Survey,
    Field,
    Response,
    ResponseDetail,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::User => "user",
            Entity::Governorate => "governorate",
            Entity::Region => "region",
            Entity::Survey => "survey",
            Entity::Field => "field",
            Entity::Response => "response",
            Entity::ResponseDetail => "response_detail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("name is empty")]
    EmptyName,
    #[error("password is empty")]
    EmptyPassword,
    #[error("field label is empty")]
    EmptyLabel,
    #[error("field type missing or unknown")]
    MissingFieldType,
    #[error("dropdown field has no options")]
    DropdownWithoutOptions,
    #[error("employee requires an assigned region")]
    RegionRequired,
    #[error("governorate admin requires a governorate")]
    GovernorateRequired,
    #[error("admins cannot hold survey grants")]
    GrantsNotApplicable,
    #[error("required fields missing: {0:?}")]
    MissingRequired(Vec<Uuid>),
    #[error("answer for field {0} does not match its type")]
    InvalidAnswer(Uuid),
    #[error("answer for field {0} is not one of its options")]
    OptionNotAllowed(Uuid),
    #[error("field {0} does not belong to this survey")]
    UnknownField(Uuid),
    #[error("survey is inactive")]
    SurveyInactive,
    #[error("region is outside the actor's governorate")]
    RegionOutOfScope,
    #[error("user is not an employee")]
    NotAnEmployee,
    #[error("user is not a governorate admin")]
    NotAGovernorateAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConflictKind {
    #[error("username already taken")]
    UsernameTaken,
    #[error("governorate name already taken")]
    GovernorateNameTaken,
    #[error("region name already taken in this governorate")]
    RegionNameTaken,
    #[error("governorate still owns regions")]
    GovernorateHasRegions,
    #[error("region still has assigned users")]
    RegionHasUsers,
    #[error("user still owns responses")]
    UserHasResponses,
    #[error("constraint violation")]
    Constraint,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationIssue),
    #[error("conflict: {0}")]
    Conflict(ConflictKind),
    #[error("{} not found", .0.as_str())]
    NotFound(Entity),
    #[error("a completed response was already submitted today")]
    DuplicateSubmission,
    #[error("actor lacks scope for this operation")]
    Authorization,
    #[error("store error: {0}")]
    Store(sqlx::Error),
}

impl CoreError {
    /// Short machine-readable tag, used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::Conflict(_) => "conflict",
            CoreError::NotFound(_) => "not_found",
            CoreError::DuplicateSubmission => "duplicate_submission",
            CoreError::Authorization => "authorization",
            CoreError::Store(_) => "store",
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
                return CoreError::Conflict(ConflictKind::Constraint);
            }
        }
        CoreError::Store(err)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// True when the error is a unique-constraint violation reported by the store.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(CoreError::DuplicateSubmission.kind(), "duplicate_submission");
        assert_eq!(CoreError::NotFound(Entity::Region).kind(), "not_found");
        assert_eq!(
            CoreError::from(ValidationIssue::EmptyName).kind(),
            "validation"
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = CoreError::NotFound(Entity::ResponseDetail);
        assert_eq!(err.to_string(), "response_detail not found");
    }

    #[test]
    fn test_row_not_found_is_store_error() {
        let err: CoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, CoreError::Store(_)));
    }
}
