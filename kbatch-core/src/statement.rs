//! Statement builder
//!
//! Assembles compiled predicates and assignments into full DELETE, UPDATE and
//! INSERT ... SELECT statements. Row limits are placed the way the dialect
//! allows: a `TOP (n)` prefix, a trailing `LIMIT n`, or a keyed rewrite that
//! selects the keys of the first `n` matching rows and then mutates by key.

use crate::dialect::LimitStyle;
use crate::{AssignmentSet, Dialect, DialectKind, Error, Fragment, Result, TableMapping, Value};

/// Final statement text with its ordered parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    sql: String,
    params: Vec<Value>,
}

impl CompiledStatement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    fn render(fragment: &Fragment, dialect: &dyn Dialect) -> Self {
        let (sql, params) = fragment.render(dialect);
        Self { sql, params }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

/// Statement shapes the builder knows
#[derive(Debug, Clone, Copy)]
pub enum StatementKind<'a> {
    Delete,
    Update,
    /// Insert the projected rows of the source table into `target`
    InsertFromQuery { target: &'a TableMapping },
}

impl StatementKind<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::Delete => "DELETE",
            StatementKind::Update => "UPDATE",
            StatementKind::InsertFromQuery { .. } => "INSERT",
        }
    }
}

/// What the execution adapter runs for one batch operation
#[derive(Debug, Clone, PartialEq)]
pub enum BatchPlan {
    Single(CompiledStatement),
    /// Two-step limited mutation, run inside one transaction
    Keyed(KeyedPlan),
}

impl BatchPlan {
    pub fn is_keyed(&self) -> bool {
        matches!(self, BatchPlan::Keyed(_))
    }

    pub fn as_single(&self) -> Option<&CompiledStatement> {
        match self {
            BatchPlan::Single(stmt) => Some(stmt),
            BatchPlan::Keyed(_) => None,
        }
    }
}

/// Limited DELETE/UPDATE for dialects without a native limit clause
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedPlan {
    dialect: DialectKind,
    statement: &'static str,
    select_keys: CompiledStatement,
    /// Mutation up to and including `WHERE `
    head: Fragment,
    key_columns: Vec<String>,
}

impl KeyedPlan {
    pub fn statement(&self) -> &'static str {
        self.statement
    }

    /// Selects the keys of the rows the mutation may touch
    pub fn select_keys(&self) -> &CompiledStatement {
        &self.select_keys
    }

    /// Quoted key columns, in the order the key select returns them
    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Render the mutation restricted to the given key tuples.
    ///
    /// An empty key set renders the always-false predicate.
    pub fn mutation_for_keys(&self, keys: &[Vec<Value>]) -> Result<CompiledStatement> {
        let dialect = self.dialect.dialect();
        let width = self.key_columns.len();

        if let Some(bad) = keys.iter().find(|k| k.len() != width) {
            return Err(Error::InvalidArgument(format!(
                "key tuple has {} values, table key has {} columns",
                bad.len(),
                width
            )));
        }

        let predicate = if keys.is_empty() {
            Fragment::sql(dialect.false_predicate())
        } else if width == 1 {
            let list = Fragment::join(keys.iter().map(|k| Fragment::param(k[0].clone())), ", ");
            let mut out = Fragment::sql(format!("{} IN ", self.key_columns[0]));
            out.append(list.parenthesized());
            out
        } else {
            let tuples = keys.iter().map(|key| {
                let parts = self.key_columns.iter().zip(key).map(|(column, value)| {
                    let mut part = Fragment::sql(format!("{} = ", column));
                    part.push_param(value.clone());
                    part
                });
                Fragment::join(parts, " AND ").parenthesized()
            });
            Fragment::join(tuples, " OR ").parenthesized()
        };

        let mut fragment = self.head.clone();
        fragment.append(predicate);
        Ok(CompiledStatement::render(&fragment, dialect))
    }
}

/// Builds statements for one dialect
pub struct StatementBuilder<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn delete(
        &self,
        mapping: &TableMapping,
        predicate: Option<Fragment>,
        limit: Option<u64>,
    ) -> Result<BatchPlan> {
        self.build(StatementKind::Delete, mapping, predicate, None, limit)
    }

    pub fn update(
        &self,
        mapping: &TableMapping,
        predicate: Option<Fragment>,
        assignments: &AssignmentSet,
        limit: Option<u64>,
    ) -> Result<BatchPlan> {
        self.build(StatementKind::Update, mapping, predicate, Some(assignments), limit)
    }

    pub fn insert_from_query(
        &self,
        source: &TableMapping,
        target: &TableMapping,
        predicate: Option<Fragment>,
        assignments: &AssignmentSet,
        limit: Option<u64>,
    ) -> Result<BatchPlan> {
        self.build(
            StatementKind::InsertFromQuery { target },
            source,
            predicate,
            Some(assignments),
            limit,
        )
    }

    /// Build the plan for a statement over `mapping`.
    ///
    /// `predicate` is the compiled WHERE clause without the keyword. A limit of
    /// zero means unbounded.
    pub fn build(
        &self,
        kind: StatementKind<'_>,
        mapping: &TableMapping,
        predicate: Option<Fragment>,
        assignments: Option<&AssignmentSet>,
        limit: Option<u64>,
    ) -> Result<BatchPlan> {
        let limit = limit.filter(|n| *n > 0);
        let table = self.dialect.quote_table(mapping);

        match kind {
            StatementKind::Delete => self.mutation(kind, mapping, &table, None, predicate, limit),
            StatementKind::Update => {
                let set = self.assignments_for(kind, assignments)?;
                self.mutation(kind, mapping, &table, Some(set), predicate, limit)
            }
            StatementKind::InsertFromQuery { target } => {
                let set = self.assignments_for(kind, assignments)?;
                self.insert(&table, target, predicate, set, limit).map(BatchPlan::Single)
            }
        }
    }

    fn assignments_for<'s>(
        &self,
        kind: StatementKind<'_>,
        assignments: Option<&'s AssignmentSet>,
    ) -> Result<&'s AssignmentSet> {
        let set = assignments.ok_or_else(|| {
            Error::InvalidArgument(format!("{} statement requires assignments", kind.name()))
        })?;
        if set.dialect() != self.dialect.kind() {
            return Err(Error::InvalidArgument(format!(
                "assignments were compiled for {}, statement targets {}",
                set.dialect(),
                self.dialect.kind()
            )));
        }
        Ok(set)
    }

    /// DELETE or UPDATE, depending on whether there are assignments
    fn mutation(
        &self,
        kind: StatementKind<'_>,
        mapping: &TableMapping,
        table: &str,
        assignments: Option<&AssignmentSet>,
        predicate: Option<Fragment>,
        limit: Option<u64>,
    ) -> Result<BatchPlan> {
        let Some(n) = limit else {
            let fragment = with_where(mutation_head(table, assignments, None), predicate);
            return Ok(BatchPlan::Single(CompiledStatement::render(&fragment, self.dialect)));
        };

        match self.dialect.mutation_limit() {
            LimitStyle::Top => {
                let fragment = with_where(mutation_head(table, assignments, Some(n)), predicate);
                Ok(BatchPlan::Single(CompiledStatement::render(&fragment, self.dialect)))
            }
            LimitStyle::TrailingLimit => {
                let mut fragment = with_where(mutation_head(table, assignments, None), predicate);
                fragment.push_sql(format!(" LIMIT {}", n));
                Ok(BatchPlan::Single(CompiledStatement::render(&fragment, self.dialect)))
            }
            LimitStyle::KeyedRewrite => {
                let head = mutation_head(table, assignments, None);
                self.keyed(kind, mapping, table, head, predicate, n)
            }
        }
    }

    fn insert(
        &self,
        source_table: &str,
        target: &TableMapping,
        predicate: Option<Fragment>,
        assignments: &AssignmentSet,
        limit: Option<u64>,
    ) -> Result<CompiledStatement> {
        let mut fragment = Fragment::sql(format!(
            "INSERT INTO {} ({}) SELECT ",
            self.dialect.quote_table(target),
            assignments.column_list()
        ));

        let style = self.dialect.select_limit();
        if let Some(n) = limit {
            match style {
                LimitStyle::Top => fragment.push_sql(format!("TOP ({}) ", n)),
                LimitStyle::TrailingLimit => {}
                LimitStyle::KeyedRewrite => {
                    return Err(Error::DialectLimitUnsupported {
                        dialect: self.dialect.kind().to_string(),
                        statement: "INSERT".to_string(),
                        reason: "no row limit on SELECT".to_string(),
                    })
                }
            }
        }

        fragment.append(assignments.select_list());
        fragment.push_sql(format!(" FROM {}", source_table));
        let mut fragment = with_where(fragment, predicate);

        if let (Some(n), LimitStyle::TrailingLimit) = (limit, style) {
            fragment.push_sql(format!(" LIMIT {}", n));
        }
        Ok(CompiledStatement::render(&fragment, self.dialect))
    }

    fn keyed(
        &self,
        kind: StatementKind<'_>,
        mapping: &TableMapping,
        table: &str,
        head: Fragment,
        predicate: Option<Fragment>,
        limit: u64,
    ) -> Result<BatchPlan> {
        let key_columns: Vec<String> = mapping
            .key_columns()
            .map(|c| self.dialect.quote_identifier(&c.column))
            .collect();

        if key_columns.is_empty() {
            return Err(Error::DialectLimitUnsupported {
                dialect: self.dialect.kind().to_string(),
                statement: kind.name().to_string(),
                reason: format!("table '{}' has no key columns to rewrite the limit with", mapping.table()),
            });
        }

        let mut select = Fragment::sql("SELECT ");
        if self.dialect.select_limit() == LimitStyle::Top {
            select.push_sql(format!("TOP ({}) ", limit));
        }
        select.push_sql(format!("{} FROM {}", key_columns.join(", "), table));
        let mut select = with_where(select, predicate);
        if self.dialect.select_limit() == LimitStyle::TrailingLimit {
            select.push_sql(format!(" LIMIT {}", limit));
        }

        let mut head = head;
        head.push_sql(" WHERE ");

        Ok(BatchPlan::Keyed(KeyedPlan {
            dialect: self.dialect.kind(),
            statement: kind.name(),
            select_keys: CompiledStatement::render(&select, self.dialect),
            head,
            key_columns,
        }))
    }
}

fn mutation_head(table: &str, assignments: Option<&AssignmentSet>, top: Option<u64>) -> Fragment {
    let top = top.map(|n| format!("TOP ({}) ", n)).unwrap_or_default();
    match assignments {
        None => Fragment::sql(format!("DELETE {}FROM {}", top, table)),
        Some(set) => {
            let mut head = Fragment::sql(format!("UPDATE {}{} SET ", top, table));
            head.append(set.set_clause());
            head
        }
    }
}

fn with_where(mut fragment: Fragment, predicate: Option<Fragment>) -> Fragment {
    if let Some(predicate) = predicate {
        fragment.push_sql(" WHERE ");
        fragment.append(predicate);
    }
    fragment
}
