//! Record persistence.
//!
//! [`SqlRecordStore`] keeps each record as a JSON document in a `data`
//! column next to its rendered ID, the numeric form of that ID for
//! ordering, and the ID of its parent record when it has one. The table
//! is created the first time the store is used.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use openerp_sql::{Row, SQLStore, Value};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ResourceError;
use crate::resource::Order;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: usize,
    pub offset: usize,
    pub order: Order,
    /// Only records belonging to this parent.
    pub parent: Option<String>,
}

/// Keyed storage of one resource's records.
pub trait RecordStore<T>: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<T>, ResourceError>;

    fn list(&self, query: &ListQuery) -> Result<Vec<T>, ResourceError>;

    fn count(&self, parent: Option<&str>) -> Result<u64, ResourceError>;

    fn insert(&self, id: &str, parent: Option<&str>, record: &T) -> Result<(), ResourceError>;

    fn update(&self, id: &str, record: &T) -> Result<(), ResourceError>;

    /// `false` when no record had that ID.
    fn delete(&self, id: &str) -> Result<bool, ResourceError>;

    /// Next free integer ID.
    fn next_int_id(&self) -> Result<i64, ResourceError>;
}

pub struct SqlRecordStore<T> {
    sql: Arc<dyn SQLStore>,
    table: String,
    ready: AtomicBool,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> SqlRecordStore<T> {
    pub fn new(sql: Arc<dyn SQLStore>, table: impl Into<String>) -> Self {
        Self {
            sql,
            table: table.into(),
            ready: AtomicBool::new(false),
            _phantom: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the table and its indexes if missing.
    pub fn ensure_table(&self) -> Result<(), ResourceError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let table = &self.table;
        self.sql.exec(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{table}\" (\
                 id TEXT PRIMARY KEY, num INTEGER, parent TEXT, data TEXT NOT NULL)"
            ),
            &[],
        )?;
        self.sql.exec(
            &format!("CREATE INDEX IF NOT EXISTS \"idx_{table}_parent\" ON \"{table}\" (parent)"),
            &[],
        )?;
        self.ready.store(true, Ordering::Release);
        debug!(table = %table, "record table ready");
        Ok(())
    }

    fn numeric(id: &str) -> Value {
        id.parse::<i64>().map(Value::Integer).unwrap_or(Value::Null)
    }
}

fn decode_row<T: DeserializeOwned>(row: &Row) -> Result<Option<T>, ResourceError> {
    match row.get("data") {
        Some(Value::Text(data)) => Ok(Some(serde_json::from_str(data)?)),
        Some(Value::Blob(data)) => Ok(Some(serde_json::from_slice(data)?)),
        _ => Ok(None),
    }
}

impl<T> RecordStore<T> for SqlRecordStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn get(&self, id: &str) -> Result<Option<T>, ResourceError> {
        self.ensure_table()?;
        let sql = format!("SELECT data FROM \"{}\" WHERE id = ?1", self.table);
        let rows = self.sql.query(&sql, &[Value::from(id)])?;
        match rows.first() {
            Some(row) => decode_row(row),
            None => Ok(None),
        }
    }

    fn list(&self, query: &ListQuery) -> Result<Vec<T>, ResourceError> {
        self.ensure_table()?;
        let dir = match query.order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };
        let mut params = Vec::new();
        let filter = match &query.parent {
            Some(p) => {
                params.push(Value::from(p.as_str()));
                "WHERE parent = ?1"
            }
            None => "",
        };
        let mut sql = format!(
            "SELECT data FROM \"{}\" {filter} ORDER BY num {dir}, id {dir}",
            self.table
        );
        if query.limit > 0 {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", query.limit, query.offset));
        }
        let rows = self.sql.query(&sql, &params)?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(record) = decode_row(row)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn count(&self, parent: Option<&str>) -> Result<u64, ResourceError> {
        self.ensure_table()?;
        let rows = match parent {
            Some(p) => self.sql.query(
                &format!("SELECT COUNT(*) AS n FROM \"{}\" WHERE parent = ?1", self.table),
                &[Value::from(p)],
            )?,
            None => self
                .sql
                .query(&format!("SELECT COUNT(*) AS n FROM \"{}\"", self.table), &[])?,
        };
        Ok(rows.first().and_then(|r| r.get_i64("n")).unwrap_or(0).max(0) as u64)
    }

    fn insert(&self, id: &str, parent: Option<&str>, record: &T) -> Result<(), ResourceError> {
        self.ensure_table()?;
        let data = serde_json::to_string(record)?;
        let sql = format!(
            "INSERT INTO \"{}\" (id, num, parent, data) VALUES (?1, ?2, ?3, ?4)",
            self.table
        );
        let parent = parent.map(Value::from).unwrap_or(Value::Null);
        self.sql
            .exec(&sql, &[Value::from(id), Self::numeric(id), parent, Value::Text(data)])?;
        Ok(())
    }

    fn update(&self, id: &str, record: &T) -> Result<(), ResourceError> {
        self.ensure_table()?;
        let data = serde_json::to_string(record)?;
        let sql = format!("UPDATE \"{}\" SET data = ?1 WHERE id = ?2", self.table);
        let n = self.sql.exec(&sql, &[Value::Text(data), Value::from(id)])?;
        if n == 0 {
            return Err(ResourceError::NotFound(format!("{} {id}", self.table)));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, ResourceError> {
        self.ensure_table()?;
        let sql = format!("DELETE FROM \"{}\" WHERE id = ?1", self.table);
        Ok(self.sql.exec(&sql, &[Value::from(id)])? > 0)
    }

    fn next_int_id(&self) -> Result<i64, ResourceError> {
        self.ensure_table()?;
        let rows = self
            .sql
            .query(&format!("SELECT MAX(num) AS n FROM \"{}\"", self.table), &[])?;
        Ok(rows.first().and_then(|r| r.get_i64("n")).unwrap_or(0) + 1)
    }
}
