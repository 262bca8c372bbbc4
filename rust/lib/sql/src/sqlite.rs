use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

use crate::error::SQLError;
use crate::traits::{Row, SQLStore, Value};

/// SQLStore backed by rusqlite (bundled SQLite).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database file. Missing parent directories are created.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SQLError::Connection(format!("{}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(path).map_err(|e| SQLError::Connection(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SQLError> {
        let conn = Connection::open_in_memory().map_err(|e| SQLError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn from_value_ref(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

impl SQLStore for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        let conn = self.conn.lock().map_err(|e| SQLError::Query(e.to_string()))?;
        let mut stmt = conn.prepare(sql).map_err(|e| SQLError::Query(e.to_string()))?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                let mut columns = Vec::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    columns.push((name.clone(), from_value_ref(row.get_ref(i)?)));
                }
                Ok(Row { columns })
            })
            .map_err(|e| SQLError::Query(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| SQLError::Query(e.to_string()))
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        let conn = self.conn.lock().map_err(|e| SQLError::Execution(e.to_string()))?;
        let affected = conn
            .execute(sql, rusqlite::params_from_iter(params.iter()))
            .map_err(|e| SQLError::Execution(e.to_string()))?;
        Ok(affected as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_and_query() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, data BLOB)", &[])
            .unwrap();
        let n = store
            .exec(
                "INSERT INTO t (id, name, data) VALUES (?1, ?2, ?3)",
                &[Value::Integer(7), "seven".into(), Value::Blob(vec![1, 2])],
            )
            .unwrap();
        assert_eq!(n, 1);

        let rows = store.query("SELECT id, name, data FROM t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("id"), Some(7));
        assert_eq!(rows[0].get_str("name"), Some("seven"));
        assert_eq!(rows[0].get("data"), Some(&Value::Blob(vec![1, 2])));
    }

    #[test]
    fn open_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/nested/system.db");
        SqliteStore::open(&path).unwrap();
        assert!(path.is_file());
    }
}
