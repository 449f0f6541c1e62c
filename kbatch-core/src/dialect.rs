//! Backend dialects.
//!
//! Every syntax difference between backends lives behind the [`Dialect`] trait:
//! identifier quoting, parameter markers, string concatenation, boolean
//! literals, and where a row limit goes. Each backend implements it once and
//! [`DialectKind`] selects the implementation from configuration.

use crate::{Error, Fragment, TableMapping};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a dialect caps the number of rows a statement touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    /// `DELETE TOP (n) FROM ...` / `SELECT TOP (n) ...`
    Top,
    /// `... LIMIT n` at the end of the statement
    TrailingLimit,
    /// No native clause: select the keys of the first n matching rows, then
    /// mutate by key membership inside one transaction
    KeyedRewrite,
}

/// Supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Sqlite,
    SqlServer,
    PostgreSql,
    MySql,
}

impl DialectKind {
    pub const ALL: [DialectKind; 4] = [
        DialectKind::Sqlite,
        DialectKind::SqlServer,
        DialectKind::PostgreSql,
        DialectKind::MySql,
    ];

    /// The dialect implementation for this backend
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Sqlite => &Sqlite,
            DialectKind::SqlServer => &SqlServer,
            DialectKind::PostgreSql => &PostgreSql,
            DialectKind::MySql => &MySql,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DialectKind::Sqlite => "sqlite",
            DialectKind::SqlServer => "sqlserver",
            DialectKind::PostgreSql => "postgresql",
            DialectKind::MySql => "mysql",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DialectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DialectKind::Sqlite),
            "sqlserver" | "mssql" => Ok(DialectKind::SqlServer),
            "postgresql" | "postgres" => Ok(DialectKind::PostgreSql),
            "mysql" => Ok(DialectKind::MySql),
            other => Err(Error::InvalidConfig(format!("unknown dialect '{}'", other))),
        }
    }
}

/// Syntax rules of one backend
pub trait Dialect: fmt::Debug + Send + Sync {
    fn kind(&self) -> DialectKind;

    /// Quote a single identifier, escaping embedded quote characters
    fn quote_identifier(&self, ident: &str) -> String;

    /// Marker for the parameter at `index` (zero-based, in text order)
    fn parameter_marker(&self, index: usize) -> String;

    /// Limit placement for DELETE and UPDATE
    fn mutation_limit(&self) -> LimitStyle;

    /// Limit placement for SELECT
    fn select_limit(&self) -> LimitStyle {
        LimitStyle::TrailingLimit
    }

    /// String concatenation of two operands
    fn concat(&self, lhs: Fragment, rhs: Fragment) -> Fragment {
        Fragment::join([lhs, rhs], " || ")
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    /// Predicate that matches no row
    fn false_predicate(&self) -> &'static str {
        "1 = 0"
    }

    /// Fully quoted table reference, schema-qualified when the mapping has one
    fn quote_table(&self, mapping: &TableMapping) -> String {
        match mapping.schema() {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(mapping.table())
            ),
            None => self.quote_identifier(mapping.table()),
        }
    }
}

fn quote_with(ident: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push(open);
    for ch in ident.chars() {
        if ch == close {
            out.push(close);
        }
        out.push(ch);
    }
    out.push(close);
    out
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"', '"')
    }

    fn parameter_marker(&self, index: usize) -> String {
        format!("?{}", index + 1)
    }

    // DELETE ... LIMIT needs SQLITE_ENABLE_UPDATE_DELETE_LIMIT, which stock builds lack
    fn mutation_limit(&self) -> LimitStyle {
        LimitStyle::KeyedRewrite
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServer;

impl Dialect for SqlServer {
    fn kind(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '[', ']')
    }

    fn parameter_marker(&self, index: usize) -> String {
        format!("@p{}", index)
    }

    fn mutation_limit(&self) -> LimitStyle {
        LimitStyle::Top
    }

    fn select_limit(&self) -> LimitStyle {
        LimitStyle::Top
    }

    fn concat(&self, lhs: Fragment, rhs: Fragment) -> Fragment {
        Fragment::join([lhs, rhs], " + ")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgreSql;

impl Dialect for PostgreSql {
    fn kind(&self) -> DialectKind {
        DialectKind::PostgreSql
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"', '"')
    }

    fn parameter_marker(&self, index: usize) -> String {
        format!("${}", index + 1)
    }

    fn mutation_limit(&self) -> LimitStyle {
        LimitStyle::KeyedRewrite
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '`', '`')
    }

    fn parameter_marker(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn mutation_limit(&self) -> LimitStyle {
        LimitStyle::TrailingLimit
    }

    // MySQL has no concatenation operator outside PIPES_AS_CONCAT mode
    fn concat(&self, lhs: Fragment, rhs: Fragment) -> Fragment {
        let mut out = Fragment::sql("CONCAT");
        out.append(Fragment::join([lhs, rhs], ", ").parenthesized());
        out
    }
}
