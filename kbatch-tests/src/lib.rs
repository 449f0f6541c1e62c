//! Test utilities and helpers for kbatch testing
//!
//! Provides a file-backed SQLite session with the `Item` table most tests use.

use anyhow::{anyhow, Context};
use kbatch_api::{BatchSession, Connection, SqliteConnection};
use kbatch_core::{BatchConfig, ColumnType, CompiledStatement, TableMapping, Value};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

pub const ITEM_TABLE_SQL: &str = "CREATE TABLE Item (
    ItemId INTEGER PRIMARY KEY AUTOINCREMENT,
    Name TEXT,
    Description TEXT,
    Quantity INTEGER NOT NULL DEFAULT 0,
    Price REAL NOT NULL DEFAULT 0,
    TimeUpdated INTEGER
)";

/// Mapping of the `Item` entity
pub fn item_mapping() -> TableMapping {
    TableMapping::builder("Item")
        .key_named("item_id", "ItemId", ColumnType::Integer)
        .column_named("name", "Name", ColumnType::Text)
        .column_named("description", "Description", ColumnType::Text)
        .column_named("quantity", "Quantity", ColumnType::Integer)
        .column_named("price", "Price", ColumnType::Real)
        .column_named("time_updated", "TimeUpdated", ColumnType::Timestamp)
        .build()
        .expect("Item mapping is valid")
}

/// One row of the `Item` table
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub item_id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub quantity: i64,
    pub price: f64,
}

impl ItemRow {
    fn from_values(values: &[Value]) -> anyhow::Result<Self> {
        let text = |v: &Value| v.as_text().map(str::to_string);
        match values {
            [id, name, description, quantity, price] => Ok(Self {
                item_id: id.as_integer().ok_or_else(|| anyhow!("ItemId is {:?}", id))?,
                name: text(name),
                description: text(description),
                quantity: quantity.as_integer().unwrap_or_default(),
                price: price.as_real().unwrap_or_default(),
            }),
            other => Err(anyhow!("unexpected Item row shape: {:?}", other)),
        }
    }
}

/// Test database wrapper that manages temporary directory lifecycle
pub struct TestDatabase {
    pub session: BatchSession<SqliteConnection>,
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new database file with the `Item` table and default configuration
    pub fn new() -> Self {
        Self::with_config(BatchConfig::default())
    }

    pub fn with_config(config: BatchConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("batch.db");
        let session = BatchSession::open_sqlite(&path, config).expect("Failed to open database");

        let db = Self {
            session,
            path,
            _temp_dir: temp_dir,
        };
        db.execute_sql(ITEM_TABLE_SQL).expect("Failed to create Item table");
        db
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Run raw SQL outside the batch layer
    pub fn execute_sql(&self, sql: &str) -> anyhow::Result<()> {
        self.session
            .connection()
            .inner()
            .execute_batch(sql)
            .with_context(|| format!("executing {}", sql))
    }

    /// Insert `count` items with ids 1..=count
    pub fn seed_items(&mut self, count: i64) -> anyhow::Result<()> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as i64;
        self.execute_sql("BEGIN")?;
        for i in 1..=count {
            let insert = CompiledStatement::new(
                "INSERT INTO Item (Name, Description, Quantity, Price, TimeUpdated) VALUES (?1, ?2, ?3, ?4, ?5)",
                vec![
                    Value::text(format!("name {}", i)),
                    Value::text("info"),
                    Value::Integer(i % 10),
                    Value::Real((i / (i % 5 + 1)) as f64),
                    Value::Timestamp(now),
                ],
            );
            self.session.connection_mut().execute(&insert)?;
        }
        self.execute_sql("COMMIT")?;
        Ok(())
    }

    pub fn count_items(&mut self) -> anyhow::Result<i64> {
        let count = self
            .session
            .execute_scalar(&CompiledStatement::new("SELECT COUNT(*) FROM Item", vec![]))?;
        count
            .and_then(|v| v.as_integer())
            .ok_or_else(|| anyhow!("COUNT(*) returned nothing"))
    }

    pub fn item(&mut self, id: i64) -> anyhow::Result<Option<ItemRow>> {
        let rows = self.query_items("WHERE ItemId = ?1", vec![Value::Integer(id)])?;
        Ok(rows.into_iter().next())
    }

    /// All items ordered by id
    pub fn items(&mut self) -> anyhow::Result<Vec<ItemRow>> {
        self.query_items("ORDER BY ItemId", vec![])
    }

    fn query_items(&mut self, tail: &str, params: Vec<Value>) -> anyhow::Result<Vec<ItemRow>> {
        let stmt = CompiledStatement::new(
            format!("SELECT ItemId, Name, Description, Quantity, Price FROM Item {}", tail),
            params,
        );
        let rows = self.session.connection_mut().query_rows(&stmt)?;
        rows.iter().map(|r| ItemRow::from_values(r)).collect()
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}
