use openerp_core::ServiceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("site not found: {0}")]
    NotFound(String),

    #[error("site already registered: {0}")]
    AlreadyRegistered(String),

    #[error("alone mode permits a single site, cannot add {0}")]
    AloneViolation(String),

    #[error("duplicate host: {0}")]
    DuplicateHost(String),

    #[error("duplicate path: {0}")]
    DuplicatePath(String),

    #[error("host not bound: {0}")]
    HostNotFound(String),

    #[error("path not bound: {0}")]
    PathNotFound(String),

    #[error("site {0} has no system DB configured")]
    MissingSystemDb(String),

    #[error("DB error: {0}")]
    Db(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<SiteError> for ServiceError {
    fn from(e: SiteError) -> Self {
        match e {
            SiteError::NotFound(_) | SiteError::HostNotFound(_) | SiteError::PathNotFound(_) => {
                ServiceError::NotFound(e.to_string())
            }
            SiteError::AlreadyRegistered(_)
            | SiteError::AloneViolation(_)
            | SiteError::DuplicateHost(_)
            | SiteError::DuplicatePath(_) => ServiceError::Conflict(e.to_string()),
            SiteError::MissingSystemDb(_) | SiteError::Config(_) => {
                ServiceError::validation(e.to_string())
            }
            SiteError::Db(_) | SiteError::Storage(_) => ServiceError::Storage(e.to_string()),
        }
    }
}
