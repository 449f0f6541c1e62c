//! SQLite connection backed by `rusqlite`

use crate::Connection;
use bytes::Bytes;
use kbatch_core::{CompiledStatement, DialectKind, Error, Result, Value};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, ParamsFromIter};
use std::path::Path;
use std::time::Duration;

const SAVEPOINT: &str = "kbatch_keyed";

/// A [`Connection`] over one SQLite database handle
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    /// The open savepoint started the transaction
    outermost: bool,
}

impl SqliteConnection {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = rusqlite::Connection::open(path).map_err(backend_error)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(backend_error)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing handle
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn,
            outermost: false,
        }
    }

    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub fn inner_mut(&mut self) -> &mut rusqlite::Connection {
        &mut self.conn
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn execute(&mut self, statement: &CompiledStatement) -> Result<u64> {
        self.conn
            .execute(statement.sql(), bind(statement))
            .map(|n| n as u64)
            .map_err(backend_error)
    }

    fn query_scalar(&mut self, statement: &CompiledStatement) -> Result<Option<Value>> {
        let mut stmt = self.conn.prepare(statement.sql()).map_err(backend_error)?;
        let mut rows = stmt.query(bind(statement)).map_err(backend_error)?;
        match rows.next().map_err(backend_error)? {
            Some(row) => Ok(Some(value_from_ref(row.get_ref(0).map_err(backend_error)?))),
            None => Ok(None),
        }
    }

    fn query_rows(&mut self, statement: &CompiledStatement) -> Result<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare(statement.sql()).map_err(backend_error)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(bind(statement)).map_err(backend_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(backend_error)? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                values.push(value_from_ref(row.get_ref(i).map_err(backend_error)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    // Savepoints nest inside a transaction the caller may already hold
    fn begin(&mut self) -> Result<()> {
        let outermost = self.conn.is_autocommit();
        self.conn
            .execute_batch(&format!("SAVEPOINT {}", SAVEPOINT))
            .map_err(backend_error)?;
        self.outermost = outermost;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn
            .execute_batch(&format!("RELEASE SAVEPOINT {}", SAVEPOINT))
            .map_err(backend_error)?;
        self.outermost = false;
        Ok(())
    }

    // A RELEASE that failed to commit leaves the transaction open; a plain
    // ROLLBACK ends it without needing the write lock.
    fn rollback(&mut self) -> Result<()> {
        let sql = if self.outermost {
            "ROLLBACK".to_string()
        } else {
            format!("ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}", SAVEPOINT)
        };
        self.outermost = false;
        self.conn.execute_batch(&sql).map_err(backend_error)
    }

    fn set_statement_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout).map_err(backend_error)
    }
}

/// Borrowed view of a [`Value`] as a SQLite parameter
struct SqlParam<'a>(&'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self.0 {
            Value::Null => ValueRef::Null,
            Value::Integer(n) | Value::Timestamp(n) => ValueRef::Integer(*n),
            Value::Real(n) => ValueRef::Real(*n),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Bool(b) => ValueRef::Integer(i64::from(*b)),
            Value::Blob(b) => ValueRef::Blob(b.as_ref()),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

fn bind(statement: &CompiledStatement) -> ParamsFromIter<impl Iterator<Item = SqlParam<'_>>> {
    params_from_iter(statement.params().iter().map(SqlParam))
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Integer(n),
        ValueRef::Real(n) => Value::Real(n),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(Bytes::copy_from_slice(bytes)),
    }
}

/// Wrap a driver error, passing SQLite's extended result code through as text
fn backend_error(err: rusqlite::Error) -> Error {
    let code = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.extended_code.to_string()),
        _ => None,
    };
    Error::execution(code, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> SqliteConnection {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.inner()
            .execute_batch(
                "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, score REAL, flag INTEGER, data BLOB)",
            )
            .unwrap();
        conn
    }

    #[test]
    fn test_execute_binds_numbered_params() {
        let mut conn = conn();
        let insert = CompiledStatement::new(
            "INSERT INTO t (id, name, score, flag, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            vec![
                Value::Integer(1),
                Value::text("a"),
                Value::Real(1.5),
                Value::Bool(true),
                Value::blob(Bytes::from_static(b"\x01\x02")),
            ],
        );
        assert_eq!(conn.execute(&insert).unwrap(), 1);

        let rows = conn
            .query_rows(&CompiledStatement::new("SELECT id, name, score, flag, data FROM t", vec![]))
            .unwrap();
        assert_eq!(
            rows,
            vec![vec![
                Value::Integer(1),
                Value::text("a"),
                Value::Real(1.5),
                Value::Integer(1),
                Value::blob(Bytes::from_static(b"\x01\x02")),
            ]]
        );
    }

    #[test]
    fn test_query_scalar_empty() {
        let mut conn = conn();
        let stmt = CompiledStatement::new("SELECT name FROM t WHERE id = ?1", vec![Value::Integer(9)]);
        assert_eq!(conn.query_scalar(&stmt).unwrap(), None);

        let count = CompiledStatement::new("SELECT COUNT(*) FROM t", vec![]);
        assert_eq!(conn.query_scalar(&count).unwrap(), Some(Value::Integer(0)));
    }

    #[test]
    fn test_constraint_error_carries_code() {
        let mut conn = conn();
        let insert = |id: i64| {
            CompiledStatement::new(
                "INSERT INTO t (id, name) VALUES (?1, ?2)",
                vec![Value::Integer(id), Value::text("dup")],
            )
        };
        conn.execute(&insert(1)).unwrap();
        match conn.execute(&insert(2)).unwrap_err() {
            Error::Execution { backend_code, .. } => {
                // SQLITE_CONSTRAINT_UNIQUE
                assert_eq!(backend_code.as_deref(), Some("2067"));
            }
            other => panic!("Expected execution error, got {:?}", other),
        }
    }

    #[test]
    fn test_savepoint_rollback() {
        let mut conn = conn();
        conn.begin().unwrap();
        conn.execute(&CompiledStatement::new(
            "INSERT INTO t (id, name) VALUES (1, 'x')",
            vec![],
        ))
        .unwrap();
        conn.rollback().unwrap();
        assert!(conn.inner().is_autocommit());

        let count = CompiledStatement::new("SELECT COUNT(*) FROM t", vec![]);
        assert_eq!(conn.query_scalar(&count).unwrap(), Some(Value::Integer(0)));
    }

    #[test]
    fn test_savepoint_rollback_inside_caller_transaction() {
        let mut conn = conn();
        conn.inner().execute_batch("BEGIN").unwrap();
        conn.execute(&CompiledStatement::new("INSERT INTO t (id, name) VALUES (1, 'kept')", vec![]))
            .unwrap();

        conn.begin().unwrap();
        conn.execute(&CompiledStatement::new("INSERT INTO t (id, name) VALUES (2, 'undone')", vec![]))
            .unwrap();
        conn.rollback().unwrap();

        // Only the savepoint is undone; the caller's transaction stays open
        assert!(!conn.inner().is_autocommit());
        conn.inner().execute_batch("COMMIT").unwrap();

        let names = conn
            .query_rows(&CompiledStatement::new("SELECT name FROM t", vec![]))
            .unwrap();
        assert_eq!(names, vec![vec![Value::text("kept")]]);
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut conn = SqliteConnection::open(dir.path().join("batch.db")).unwrap();
        conn.set_statement_timeout(Duration::from_millis(250)).unwrap();
        assert_eq!(conn.dialect(), DialectKind::Sqlite);
    }
}
