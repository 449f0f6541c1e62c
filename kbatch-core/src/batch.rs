//! Batch queries and the compile pipeline
//!
//! A [`BatchQuery`] is what a caller hands in: the table, an optional filter
//! and an optional row limit. [`BatchCompiler`] runs the predicate compiler, the
//! assignment compiler and the statement builder in order and returns a
//! [`BatchPlan`]. Nothing here touches a connection.

use crate::{
    AssignmentCompiler, BatchPlan, Dialect, Filter, Fragment, Mutation, PredicateCompiler,
    Projection, Result, StatementBuilder, TableMapping,
};
use tracing::debug;

/// Filtered, optionally limited row set of one table
#[derive(Debug, Clone)]
pub struct BatchQuery<'m> {
    mapping: &'m TableMapping,
    filter: Option<Filter>,
    limit: Option<u64>,
}

impl<'m> BatchQuery<'m> {
    /// Every row of the table
    pub fn new(mapping: &'m TableMapping) -> Self {
        Self {
            mapping,
            filter: None,
            limit: None,
        }
    }

    /// Restrict the row set. Repeated calls are combined with AND.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Touch at most `n` rows; `0` means unbounded
    pub fn take(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn mapping(&self) -> &'m TableMapping {
        self.mapping
    }

    pub fn filter_expr(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit.filter(|n| *n > 0)
    }
}

/// Compiles batch operations for one dialect
pub struct BatchCompiler<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> BatchCompiler<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    fn predicate(&self, query: &BatchQuery<'_>) -> Result<Option<Fragment>> {
        query
            .filter
            .as_ref()
            .map(|f| PredicateCompiler::new(query.mapping, self.dialect).compile(f))
            .transpose()
    }

    pub fn compile_delete(&self, query: &BatchQuery<'_>) -> Result<BatchPlan> {
        let predicate = self.predicate(query)?;
        let plan = StatementBuilder::new(self.dialect).delete(query.mapping, predicate, query.limit())?;
        log_plan("delete", query.mapping, &plan);
        Ok(plan)
    }

    pub fn compile_update(&self, query: &BatchQuery<'_>, mutation: &Mutation) -> Result<BatchPlan> {
        let predicate = self.predicate(query)?;
        let assignments = AssignmentCompiler::new(query.mapping, self.dialect).compile(mutation)?;
        let plan = StatementBuilder::new(self.dialect).update(
            query.mapping,
            predicate,
            &assignments,
            query.limit(),
        )?;
        log_plan("update", query.mapping, &plan);
        Ok(plan)
    }

    /// Copy the projected rows of `query` into `target`
    pub fn compile_insert(
        &self,
        query: &BatchQuery<'_>,
        target: &TableMapping,
        projection: &Projection,
    ) -> Result<BatchPlan> {
        let predicate = self.predicate(query)?;
        let assignments =
            AssignmentCompiler::new(query.mapping, self.dialect).compile_insert(projection, target)?;
        let plan = StatementBuilder::new(self.dialect).insert_from_query(
            query.mapping,
            target,
            predicate,
            &assignments,
            query.limit(),
        )?;
        log_plan("insert", query.mapping, &plan);
        Ok(plan)
    }
}

fn log_plan(op: &str, mapping: &TableMapping, plan: &BatchPlan) {
    match plan {
        BatchPlan::Single(stmt) => debug!(
            "Compiled batch {} on {}: {} ({} params)",
            op,
            mapping.table(),
            stmt.sql(),
            stmt.param_count()
        ),
        BatchPlan::Keyed(keyed) => debug!(
            "Compiled keyed batch {} on {}: {} ({} params)",
            op,
            mapping.table(),
            keyed.select_keys().sql(),
            keyed.select_keys().param_count()
        ),
    }
}
