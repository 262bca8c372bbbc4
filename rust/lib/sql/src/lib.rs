pub mod config;
pub mod error;
pub mod factory;
pub mod raw;
pub mod sqlite;
pub mod traits;

pub use config::DbConfig;
pub use error::SQLError;
pub use factory::{AdapterFactories, AdapterOpener};
pub use raw::{CommandConnection, RawConnection, RawDb, RawOpener};
pub use sqlite::SqliteStore;
pub use traits::{Row, SQLStore, Value};
