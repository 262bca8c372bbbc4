//! Adapter factories: open a `SQLStore` or a raw connection for a `DbConfig`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::DbConfig;
use crate::error::SQLError;
use crate::raw::{CommandConnection, RawConnection, RawOpener};
use crate::sqlite::SqliteStore;
use crate::traits::SQLStore;

/// Opens a query handle for a DB config.
pub type AdapterOpener = Arc<dyn Fn(&DbConfig) -> Result<Arc<dyn SQLStore>, SQLError> + Send + Sync>;

/// Registry of adapters by name.
///
/// Built-ins: `sqlite`/`sqlite3` (file at the DSN path) and `memory`.
/// Network adapters are registered by the embedding application.
#[derive(Clone)]
pub struct AdapterFactories {
    adapters: HashMap<String, AdapterOpener>,
    raw: HashMap<String, RawOpener>,
}

impl Default for AdapterFactories {
    fn default() -> Self {
        let mut f = Self {
            adapters: HashMap::new(),
            raw: HashMap::new(),
        };

        let sqlite: AdapterOpener = Arc::new(|config: &DbConfig| {
            Ok(Arc::new(SqliteStore::open(Path::new(&config.dsn()))?) as Arc<dyn SQLStore>)
        });
        f.register("sqlite", sqlite.clone());
        f.register("sqlite3", sqlite);
        f.register(
            "memory",
            Arc::new(|_: &DbConfig| Ok(Arc::new(SqliteStore::open_in_memory()?) as Arc<dyn SQLStore>)),
        );

        let sqlite_raw: RawOpener = Arc::new(|config: &DbConfig| {
            let conn = CommandConnection::spawn("sqlite3", &[config.dsn()], "\n.quit\n")?;
            Ok(Box::new(conn) as Box<dyn RawConnection>)
        });
        f.register_raw("sqlite", sqlite_raw.clone());
        f.register_raw("sqlite3", sqlite_raw);
        f.register_raw(
            "postgres",
            Arc::new(|config: &DbConfig| {
                let conn = CommandConnection::spawn("psql", &[config.dsn()], "\n\\q\n")?;
                Ok(Box::new(conn) as Box<dyn RawConnection>)
            }),
        );
        f
    }
}

impl AdapterFactories {
    pub fn register(&mut self, adapter: &str, opener: AdapterOpener) {
        self.adapters.insert(adapter.to_string(), opener);
    }

    pub fn register_raw(&mut self, adapter: &str, opener: RawOpener) {
        self.raw.insert(adapter.to_string(), opener);
    }

    pub fn open(&self, config: &DbConfig) -> Result<Arc<dyn SQLStore>, SQLError> {
        let opener = self
            .adapters
            .get(config.adapter())
            .ok_or_else(|| SQLError::UnknownAdapter(config.adapter().to_string()))?;
        opener(config)
    }

    /// Raw opener for the config's adapter, if one is registered.
    pub fn raw_opener(&self, config: &DbConfig) -> Option<RawOpener> {
        self.raw.get(config.adapter()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/main.db");
        let config = DbConfig::sqlite(path.to_string_lossy().to_string());
        let store = AdapterFactories::default().open(&config).unwrap();
        store.exec("CREATE TABLE t (x INTEGER)", &[]).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn unknown_adapter() {
        let config = DbConfig {
            adapter: "oracle".into(),
            ..Default::default()
        };
        assert!(matches!(
            AdapterFactories::default().open(&config),
            Err(SQLError::UnknownAdapter(_))
        ));
        assert!(AdapterFactories::default().raw_opener(&config).is_none());
    }
}
