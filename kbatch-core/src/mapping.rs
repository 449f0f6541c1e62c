//! Table mapping supplied by the mapping layer.
//!
//! A [`TableMapping`] tells the compilers which physical table backs an entity,
//! which column each entity field lives in, the column's primitive type, and
//! which columns form the primary key. Column declaration order is preserved
//! and drives the order of emitted assignments.

use crate::{ColumnType, Error, Result};
use std::collections::HashSet;

/// One mapped entity field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Entity field name used by filters and mutations
    pub field: String,
    /// Physical column name
    pub column: String,
    pub column_type: ColumnType,
    pub is_key: bool,
}

/// Physical table of an entity with its ordered columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    schema: Option<String>,
    table: String,
    columns: Vec<ColumnMapping>,
}

impl TableMapping {
    pub fn builder(table: impl Into<String>) -> TableMappingBuilder {
        TableMappingBuilder {
            schema: None,
            table: table.into(),
            columns: Vec::new(),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    /// Look up a field by entity name
    pub fn column(&self, field: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Declaration index of a field
    pub fn position(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.field == field)
    }

    /// Resolve a field to its column, failing if the mapping does not know it
    pub fn resolve(&self, field: &str) -> Result<(usize, &ColumnMapping)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.field == field)
            .ok_or_else(|| {
                Error::UnsupportedExpression(format!(
                    "field '{}' is not mapped on table '{}'",
                    field, self.table
                ))
            })
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter(|c| c.is_key)
    }

    pub fn has_key(&self) -> bool {
        self.columns.iter().any(|c| c.is_key)
    }
}

/// Builder for [`TableMapping`]
#[derive(Debug, Clone)]
pub struct TableMappingBuilder {
    schema: Option<String>,
    table: String,
    columns: Vec<ColumnMapping>,
}

impl TableMappingBuilder {
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Add a key column whose physical name equals the field name
    pub fn key(self, field: impl Into<String>, column_type: ColumnType) -> Self {
        let field = field.into();
        self.push(field.clone(), field, column_type, true)
    }

    /// Add a key column stored under a different physical name
    pub fn key_named(
        self,
        field: impl Into<String>,
        column: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        self.push(field.into(), column.into(), column_type, true)
    }

    /// Add a column whose physical name equals the field name
    pub fn column(self, field: impl Into<String>, column_type: ColumnType) -> Self {
        let field = field.into();
        self.push(field.clone(), field, column_type, false)
    }

    /// Add a column stored under a different physical name
    pub fn column_named(
        self,
        field: impl Into<String>,
        column: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        self.push(field.into(), column.into(), column_type, false)
    }

    fn push(mut self, field: String, column: String, column_type: ColumnType, is_key: bool) -> Self {
        self.columns.push(ColumnMapping {
            field,
            column,
            column_type,
            is_key,
        });
        self
    }

    pub fn build(self) -> Result<TableMapping> {
        if self.table.is_empty() {
            return Err(Error::InvalidArgument("table name must not be empty".into()));
        }
        if self.columns.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "table '{}' must map at least one column",
                self.table
            )));
        }

        let mut fields = HashSet::new();
        let mut columns = HashSet::new();
        for c in &self.columns {
            if c.field.is_empty() || c.column.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "table '{}' has a column with an empty name",
                    self.table
                )));
            }
            if !fields.insert(c.field.as_str()) {
                return Err(Error::InvalidArgument(format!(
                    "field '{}' is mapped twice on table '{}'",
                    c.field, self.table
                )));
            }
            if !columns.insert(c.column.as_str()) {
                return Err(Error::InvalidArgument(format!(
                    "column '{}' is mapped twice on table '{}'",
                    c.column, self.table
                )));
            }
        }

        Ok(TableMapping {
            schema: self.schema,
            table: self.table,
            columns: self.columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> TableMapping {
        TableMapping::builder("Item")
            .schema("dbo")
            .key_named("item_id", "ItemId", ColumnType::Integer)
            .column_named("name", "Name", ColumnType::Text)
            .column_named("quantity", "Quantity", ColumnType::Integer)
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_field() {
        let mapping = items();
        let (pos, col) = mapping.resolve("quantity").unwrap();
        assert_eq!(pos, 2);
        assert_eq!(col.column, "Quantity");
        assert_eq!(mapping.schema(), Some("dbo"));
    }

    #[test]
    fn test_unknown_field() {
        let err = items().resolve("missing").unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_EXPRESSION");
    }

    #[test]
    fn test_key_columns() {
        let mapping = items();
        let keys: Vec<_> = mapping.key_columns().map(|c| c.column.as_str()).collect();
        assert_eq!(keys, vec!["ItemId"]);
        assert!(mapping.has_key());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = TableMapping::builder("Item")
            .column("name", ColumnType::Text)
            .column_named("name", "Name2", ColumnType::Text)
            .build();
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_mapping_rejected() {
        assert!(TableMapping::builder("Item").build().is_err());
        assert!(TableMapping::builder("")
            .column("a", ColumnType::Integer)
            .build()
            .is_err());
    }
}
