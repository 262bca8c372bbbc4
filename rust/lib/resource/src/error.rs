use openerp_core::ServiceError;
use openerp_site::{Errors, SiteError};
use openerp_sql::SQLError;
use thiserror::Error;

/// Resource layer errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("invalid ID: {0}")]
    InvalidId(String),

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("invalid body: {0}")]
    Body(String),

    /// One or more fields failed decoding or validation.
    #[error("{0}")]
    Validation(Errors),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("unknown meta: {0}")]
    UnknownMeta(String),

    #[error("no store: {0}")]
    NoStore(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// An event handler refused the action.
    #[error("aborted by {event}: {message}")]
    Aborted { event: String, message: String },
}

impl ResourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResourceError::NotFound(_))
    }

    /// Field errors carried by a validation failure.
    pub fn errors(&self) -> Option<&Errors> {
        match self {
            ResourceError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Errors> for ResourceError {
    fn from(e: Errors) -> Self {
        ResourceError::Validation(e)
    }
}

impl From<SQLError> for ResourceError {
    fn from(e: SQLError) -> Self {
        ResourceError::Storage(e.to_string())
    }
}

impl From<SiteError> for ResourceError {
    fn from(e: SiteError) -> Self {
        ResourceError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ResourceError {
    fn from(e: serde_json::Error) -> Self {
        ResourceError::Json(e.to_string())
    }
}

impl From<ResourceError> for ServiceError {
    fn from(e: ResourceError) -> Self {
        match e {
            ResourceError::MalformedKey(_)
            | ResourceError::InvalidId(_)
            | ResourceError::Json(_)
            | ResourceError::Body(_) => ServiceError::Parse(e.to_string()),
            ResourceError::Validation(errors) => errors.into(),
            ResourceError::PermissionDenied(m) => ServiceError::PermissionDenied(m),
            ResourceError::NotFound(m) => ServiceError::NotFound(m),
            ResourceError::UnknownMeta(_) => ServiceError::validation(e.to_string()),
            ResourceError::Aborted { .. } => ServiceError::Conflict(e.to_string()),
            ResourceError::NoStore(_) | ResourceError::Storage(_) => {
                ServiceError::Storage(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use openerp_site::FieldError;

    #[test]
    fn maps_to_service_error() {
        let e: ServiceError = ResourceError::MalformedKey("x".into()).into();
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(e.error_code(), "PARSE_ERROR");

        let e: ServiceError = ResourceError::PermissionDenied("update User".into()).into();
        assert_eq!(e.status_code(), StatusCode::FORBIDDEN);

        let mut errors = Errors::new();
        errors.push_field(FieldError::cant_be_blank("Name", "Name"));
        let e: ServiceError = ResourceError::Validation(errors).into();
        match e {
            ServiceError::Validation { fields, .. } => {
                assert_eq!(fields, vec![("Name".to_string(), "cant be blank".to_string())]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
