pub mod auth;
pub mod config;
pub mod error;
pub mod module;
pub mod permission;
pub mod types;

pub use auth::{Anonymous, Authenticator, Identity, StaticTokens};
pub use config::ServiceConfig;
pub use error::ServiceError;
pub use module::Module;
pub use permission::{
    ANYONE, AllPermissioners, Perm, Permission, PermissionMode, Permissioner, Permissioners,
};
pub use types::{ListParams, ListResult, humanize, new_id, now_rfc3339, pluralize};
