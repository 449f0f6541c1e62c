//! Execution adapter for compiled batch operations.
//!
//! [`BatchSession`] owns one [`Connection`] and the session's [`BatchConfig`].
//! Every batch call compiles first and only then talks to the backend, so a
//! filter or mutation that cannot be translated never reaches the database.

use kbatch_core::{
    BatchCompiler, BatchConfig, BatchPlan, BatchQuery, CompiledStatement, Error, KeyedPlan,
    Mutation, Projection, Result, TableMapping, Value,
};
use std::path::Path;
use tracing::{debug, info, warn};

pub use kbatch_core::{Error as BatchError, Value as BatchValue};

pub mod connection;
pub use connection::Connection;

pub mod sqlite;
pub use sqlite::SqliteConnection;

/// Batch session over one backend connection
pub struct BatchSession<C: Connection> {
    conn: C,
    config: BatchConfig,
}

impl<C: Connection> BatchSession<C> {
    /// Create a session, validating the configuration against the connection
    pub fn new(mut conn: C, config: BatchConfig) -> Result<Self> {
        config.validate()?;

        if conn.dialect() != config.dialect {
            return Err(Error::InvalidConfig(format!(
                "configured dialect {} does not match connection dialect {}",
                config.dialect,
                conn.dialect()
            )));
        }

        if let Some(timeout) = config.statement_timeout {
            conn.set_statement_timeout(timeout)?;
        }

        Ok(Self { conn, config })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn into_inner(self) -> C {
        self.conn
    }

    fn compiler(&self) -> BatchCompiler<'static> {
        BatchCompiler::new(self.config.dialect.dialect())
    }

    /// Compile a batch delete without executing it
    pub fn compile_delete(&self, query: &BatchQuery<'_>) -> Result<BatchPlan> {
        self.compiler().compile_delete(query)
    }

    /// Compile a batch update without executing it
    pub fn compile_update(&self, query: &BatchQuery<'_>, mutation: &Mutation) -> Result<BatchPlan> {
        self.compiler().compile_update(query, mutation)
    }

    /// Delete every row of the query; returns the number of rows deleted
    pub fn batch_delete(&mut self, query: &BatchQuery<'_>) -> Result<u64> {
        let plan = self.compile_delete(query)?;
        let rows = self.run(&plan)?;
        info!("Batch delete on {} affected {} rows", query.mapping().table(), rows);
        Ok(rows)
    }

    /// Apply a mutation to every row of the query; returns the number of rows updated
    pub fn batch_update(&mut self, query: &BatchQuery<'_>, mutation: &Mutation) -> Result<u64> {
        let plan = self.compile_update(query, mutation)?;
        let rows = self.run(&plan)?;
        info!("Batch update on {} affected {} rows", query.mapping().table(), rows);
        Ok(rows)
    }

    /// Copy the projected rows of the query into `target`
    pub fn batch_insert_from_query(
        &mut self,
        query: &BatchQuery<'_>,
        target: &TableMapping,
        projection: &Projection,
    ) -> Result<()> {
        let plan = self.compiler().compile_insert(query, target, projection)?;
        let rows = self.run(&plan)?;
        info!(
            "Batch insert from {} into {} copied {} rows",
            query.mapping().table(),
            target.table(),
            rows
        );
        Ok(())
    }

    /// Run a read-back query and return its first value
    pub fn execute_scalar(&mut self, statement: &CompiledStatement) -> Result<Option<Value>> {
        self.log_statement(statement);
        self.conn.query_scalar(statement)
    }

    fn run(&mut self, plan: &BatchPlan) -> Result<u64> {
        match plan {
            BatchPlan::Single(statement) => {
                self.log_statement(statement);
                self.conn.execute(statement)
            }
            BatchPlan::Keyed(keyed) => {
                self.conn.begin()?;
                let result = self
                    .run_keyed(keyed)
                    .and_then(|rows| self.conn.commit().map(|_| rows));
                if let Err(e) = &result {
                    warn!("Keyed {} failed, rolling back: {}", keyed.statement(), e);
                    self.rollback();
                }
                result
            }
        }
    }

    fn rollback(&mut self) {
        if let Err(e) = self.conn.rollback() {
            warn!("Rollback failed: {}", e);
        }
    }

    fn run_keyed(&mut self, plan: &KeyedPlan) -> Result<u64> {
        self.log_statement(plan.select_keys());
        let keys = self.conn.query_rows(plan.select_keys())?;
        if keys.is_empty() {
            debug!("Keyed {} matched no rows", plan.statement());
            return Ok(0);
        }

        let mut total = 0;
        for chunk in keys.chunks(self.config.max_keys_per_statement) {
            let statement = plan.mutation_for_keys(chunk)?;
            self.log_statement(&statement);
            total += self.conn.execute(&statement)?;
        }
        Ok(total)
    }

    fn log_statement(&self, statement: &CompiledStatement) {
        if self.config.log_parameters {
            debug!("Executing: {} params={:?}", statement.sql(), statement.params());
        } else {
            debug!("Executing: {} ({} params)", statement.sql(), statement.param_count());
        }
    }
}

impl BatchSession<SqliteConnection> {
    /// Open a SQLite database file with a SQLite configuration
    pub fn open_sqlite(path: impl AsRef<Path>, config: BatchConfig) -> Result<Self> {
        Self::new(SqliteConnection::open(path)?, config)
    }

    pub fn sqlite_in_memory(config: BatchConfig) -> Result<Self> {
        Self::new(SqliteConnection::open_in_memory()?, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbatch_core::{ColumnType, DialectKind, Filter, Template};
    use std::time::Duration;

    fn items() -> TableMapping {
        TableMapping::builder("Item")
            .key_named("item_id", "ItemId", ColumnType::Integer)
            .column_named("name", "Name", ColumnType::Text)
            .column_named("quantity", "Quantity", ColumnType::Integer)
            .build()
            .unwrap()
    }

    fn session() -> BatchSession<SqliteConnection> {
        let session = BatchSession::sqlite_in_memory(BatchConfig::default()).unwrap();
        session
            .connection()
            .inner()
            .execute_batch(
                "CREATE TABLE Item (ItemId INTEGER PRIMARY KEY, Name TEXT, Quantity INTEGER);
                 INSERT INTO Item VALUES (1, 'a', 1), (2, 'b', 2), (3, 'c', 3);",
            )
            .unwrap();
        session
    }

    fn count(session: &mut BatchSession<SqliteConnection>) -> Value {
        session
            .execute_scalar(&CompiledStatement::new("SELECT COUNT(*) FROM Item", vec![]))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_batch_delete() {
        let mut session = session();
        let mapping = items();
        let deleted = session
            .batch_delete(&BatchQuery::new(&mapping).filter(Filter::field("quantity").ge(2)))
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(count(&mut session), Value::Integer(1));
    }

    #[test]
    fn test_batch_update_no_match_reports_zero() {
        let mut session = session();
        let mapping = items();
        let updated = session
            .batch_update(
                &BatchQuery::new(&mapping).filter(Filter::field("item_id").gt(100)),
                &Template::new().set("name", "z").into(),
            )
            .unwrap();
        assert_eq!(updated, 0);
    }

    #[test]
    fn test_keyed_delete_with_limit() {
        let mut session = session();
        let mapping = items();
        let deleted = session.batch_delete(&BatchQuery::new(&mapping).take(2)).unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(count(&mut session), Value::Integer(1));
    }

    #[test]
    fn test_dialect_mismatch() {
        let config = BatchConfig::new().with_dialect(DialectKind::PostgreSql);
        let err = BatchSession::sqlite_in_memory(config).err().unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_statement_timeout_reaches_connection() {
        let config = BatchConfig::new().with_statement_timeout(Duration::from_millis(150));
        let mut session = BatchSession::sqlite_in_memory(config).unwrap();
        let timeout = session
            .execute_scalar(&CompiledStatement::new("PRAGMA busy_timeout", vec![]))
            .unwrap();
        assert_eq!(timeout, Some(Value::Integer(150)));
    }

    #[test]
    fn test_invalid_config() {
        let config = BatchConfig::new().with_max_keys_per_statement(0);
        assert!(BatchSession::sqlite_in_memory(config).is_err());
    }
}
