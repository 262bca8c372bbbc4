use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Clients match on these,
// never on the human-readable message string.

/// Stable error code constants.
///
/// Clients should match on `code` from `{"code": "NOT_FOUND", "message": "..."}`.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const INTERNAL: &str = "INTERNAL";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

// ── ServiceError ────────────────────────────────────────────────────

/// Error surfaced at the HTTP boundary.
///
/// Library crates keep their own error enums; handlers convert into this
/// type so every response shares one shape:
///
/// ```json
/// {"code": "VALIDATION_FAILED", "message": "Name: cant be blank", "errors": [...]}
/// ```
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Site or record does not exist. HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate site name, host or path binding, or record key. HTTP 409.
    #[error("{0}")]
    Conflict(String),

    /// One or more fields failed validation. HTTP 400.
    ///
    /// `fields` carries `(field, message)` pairs in the order they were raised.
    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<(String, String)>,
    },

    /// Malformed form key, ID string or JSON body. HTTP 400.
    #[error("{0}")]
    Parse(String),

    /// Missing or invalid credentials. HTTP 401.
    #[error("{0}")]
    Unauthorized(String),

    /// The role engine denied the action. HTTP 403.
    #[error("{0}")]
    PermissionDenied(String),

    /// DB, subprocess or object-store failure. HTTP 500.
    #[error("{0}")]
    Storage(String),

    /// Unexpected internal error. HTTP 500.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Shorthand for a validation error without per-field details.
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::Conflict(_) => error_code::ALREADY_EXISTS,
            ServiceError::Validation { .. } => error_code::VALIDATION_FAILED,
            ServiceError::Parse(_) => error_code::PARSE_ERROR,
            ServiceError::Unauthorized(_) => error_code::UNAUTHENTICATED,
            ServiceError::PermissionDenied(_) => error_code::PERMISSION_DENIED,
            ServiceError::Storage(_) => error_code::STORAGE_ERROR,
            ServiceError::Internal(_) => error_code::INTERNAL,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Validation { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Parse(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });
        if let ServiceError::Validation { fields, .. } = &self {
            if !fields.is_empty() {
                body["errors"] = fields
                    .iter()
                    .map(|(label, message)| serde_json::json!({"label": label, "message": message}))
                    .collect();
            }
        }
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(ServiceError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ServiceError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(ServiceError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::Parse("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::PermissionDenied("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::Storage("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_code_mapping() {
        assert_eq!(ServiceError::Conflict("x".into()).error_code(), "ALREADY_EXISTS");
        assert_eq!(ServiceError::Parse("x".into()).error_code(), "PARSE_ERROR");
        assert_eq!(ServiceError::validation("x").error_code(), "VALIDATION_FAILED");
        assert_eq!(ServiceError::Unauthorized("x".into()).error_code(), "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn validation_response_lists_fields() {
        let err = ServiceError::Validation {
            message: "Name: cant be blank".into(),
            fields: vec![("Name".into(), "cant be blank".into())],
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["code"], "VALIDATION_FAILED");
        assert_eq!(json["errors"][0]["label"], "Name");
    }

    #[test]
    fn display_is_just_message() {
        assert_eq!(ServiceError::NotFound("site \"a\"".into()).to_string(), "site \"a\"");
        assert_eq!(ServiceError::validation("bad input").to_string(), "bad input");
    }
}
