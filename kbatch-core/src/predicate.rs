//! Predicate compiler
//!
//! Turns a [`Filter`] tree into a WHERE-clause [`Fragment`]. The tree shape is
//! kept as written: every `AND`/`OR` child is parenthesized and nothing is
//! reordered or rewritten.

use crate::filter::{CompareOp, Filter, Operand};
use crate::{Dialect, Error, Fragment, Result, TableMapping, Value};

/// Compiles filters against one table mapping and dialect
pub struct PredicateCompiler<'a> {
    mapping: &'a TableMapping,
    dialect: &'a dyn Dialect,
}

impl<'a> PredicateCompiler<'a> {
    pub fn new(mapping: &'a TableMapping, dialect: &'a dyn Dialect) -> Self {
        Self { mapping, dialect }
    }

    /// Compile a filter tree into a WHERE-clause fragment (without the keyword)
    pub fn compile(&self, filter: &Filter) -> Result<Fragment> {
        match filter {
            Filter::Compare { field, op, operand } => self.compile_compare(field, *op, operand),
            Filter::And(left, right) => self.compile_logical(left, "AND", right),
            Filter::Or(left, right) => self.compile_logical(left, "OR", right),
            Filter::Not(inner) => {
                let mut out = Fragment::sql("NOT ");
                out.append(self.compile(inner)?.parenthesized());
                Ok(out)
            }
            Filter::In { field, values } | Filter::Any { values, field } => {
                self.compile_membership(field, values)
            }
            Filter::IsNull(field) => Ok(Fragment::sql(format!("{} IS NULL", self.column(field)?))),
            Filter::IsNotNull(field) => {
                Ok(Fragment::sql(format!("{} IS NOT NULL", self.column(field)?)))
            }
            Filter::Local { field, label, .. } => Err(Error::UnsupportedExpression(format!(
                "filter '{}' on field '{}' is evaluated in-process and cannot be translated to SQL",
                label, field
            ))),
        }
    }

    fn compile_logical(&self, left: &Filter, keyword: &str, right: &Filter) -> Result<Fragment> {
        let mut out = self.compile(left)?.parenthesized();
        out.push_sql(format!(" {} ", keyword));
        out.append(self.compile(right)?.parenthesized());
        Ok(out)
    }

    fn compile_compare(&self, field: &str, op: CompareOp, operand: &Operand) -> Result<Fragment> {
        let column = self.column(field)?;

        match operand {
            Operand::Field(other) => Ok(Fragment::sql(format!(
                "{} {} {}",
                column,
                op.as_sql(),
                self.column(other)?
            ))),
            Operand::Value(Value::Null) | Operand::Param(Value::Null) => match op {
                // `= NULL` never matches anything
                CompareOp::Eq => Ok(Fragment::sql(format!("{} IS NULL", column))),
                CompareOp::Ne => Ok(Fragment::sql(format!("{} IS NOT NULL", column))),
                _ => Err(Error::UnsupportedExpression(format!(
                    "ordering comparison '{}' against NULL on field '{}'",
                    op.as_sql(),
                    field
                ))),
            },
            Operand::Value(value) | Operand::Param(value) => {
                let mut out = Fragment::sql(format!("{} {} ", column, op.as_sql()));
                out.push_param(value.clone());
                Ok(out)
            }
        }
    }

    fn compile_membership(&self, field: &str, values: &[Value]) -> Result<Fragment> {
        let column = self.column(field)?;
        let has_null = values.iter().any(Value::is_null);
        let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();

        if present.is_empty() {
            return Ok(if has_null {
                Fragment::sql(format!("{} IS NULL", column))
            } else {
                Fragment::sql(self.dialect.false_predicate())
            });
        }

        let list = Fragment::join(
            present.into_iter().map(|v| Fragment::param(v.clone())),
            ", ",
        );
        let mut out = Fragment::sql(format!("{} IN ", column));
        out.append(list.parenthesized());

        if has_null {
            out.push_sql(format!(" OR {} IS NULL", column));
            out = out.parenthesized();
        }
        Ok(out)
    }

    fn column(&self, field: &str) -> Result<String> {
        let (_, mapping) = self.mapping.resolve(field)?;
        Ok(self.dialect.quote_identifier(&mapping.column))
    }
}

/// Compile a filter into WHERE-clause text and its ordered parameters.
///
/// Markers are numbered from the first parameter of the clause.
pub fn compile_filter(
    filter: &Filter,
    mapping: &TableMapping,
    dialect: &dyn Dialect,
) -> Result<(String, Vec<Value>)> {
    let fragment = PredicateCompiler::new(mapping, dialect).compile(filter)?;
    Ok(fragment.render(dialect))
}
