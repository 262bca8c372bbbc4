//! Multi-tenant site layer: the registry of sites, each site's DBs and
//! storages, and the per-request context handlers work with.

pub mod config;
pub mod config_store;
pub mod context;
pub mod db;
pub mod error;
pub mod errors;
pub mod factory;
pub mod registry;
pub mod site;
pub mod translator;
pub mod tz;

pub use config::{DEFAULT_STORAGE, SYSTEM_DB, SYSTEM_STORAGE, SiteConfig};
pub use config_store::{ConfigGetter, ConfigSetter, ConfigSetterFactory, KvConfigStore, MemoryConfigStore};
pub use context::{Context, Frame, RequestInfo, ResponseSink};
pub use db::Db;
pub use error::SiteError;
pub use errors::{CANT_BE_BLANK, ErrorEntry, Errors, FieldError};
pub use factory::{AfterCreateHook, ContextFactory, RouteContext};
pub use registry::{BindingObserver, SiteObserver, SiteRegistry};
pub use site::{Site, SiteCallback, SiteOptions};
pub use translator::{MemorySession, SessionManager, StaticTranslator, Translator};
pub use tz::TimeZone;
