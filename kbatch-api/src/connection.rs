//! Backend connection seam.
//!
//! The session only ever talks to a backend through [`Connection`]. Each call
//! runs exactly one statement; transactions bracket the keyed rewrite.

use kbatch_core::{CompiledStatement, DialectKind, Result, Value};
use std::time::Duration;

/// One open connection to a SQL backend
pub trait Connection {
    /// Dialect the backend speaks
    fn dialect(&self) -> DialectKind;

    /// Run a statement and return the number of rows it affected
    fn execute(&mut self, statement: &CompiledStatement) -> Result<u64>;

    /// Run a query and return the first column of the first row, if any
    fn query_scalar(&mut self, statement: &CompiledStatement) -> Result<Option<Value>>;

    /// Run a query and return every row
    fn query_rows(&mut self, statement: &CompiledStatement) -> Result<Vec<Vec<Value>>>;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    /// Undo everything since `begin`. Must also end the transaction when
    /// `commit` failed and left it open.
    fn rollback(&mut self) -> Result<()>;

    /// Apply a per-statement timeout. Backends without one ignore it.
    fn set_statement_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}
