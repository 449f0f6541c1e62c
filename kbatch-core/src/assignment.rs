//! Mutation descriptors and the assignment compiler.
//!
//! A [`Mutation`] comes in two shapes:
//!
//! - a sparse [`Template`]: only fields that were set become assignments
//! - a [`Projection`] from the old row to the new one, where `field = field OP x`
//!   becomes a self-referential update instead of a literal overwrite
//!
//! ```
//! use kbatch_core::{Projection, Template, ValueExpr};
//!
//! let template = Template::new().set("description", "Updated").set("price", 1.5);
//!
//! let increment_step = 100;
//! let suffix = " Concatenated";
//! let projection = Projection::new()
//!     .set("name", ValueExpr::field("name") + ValueExpr::param(suffix))
//!     .set("quantity", ValueExpr::field("quantity") + increment_step);
//! ```
//!
//! Plain Rust values converted into a [`ValueExpr`] are bound as parameters.
//! Only [`ValueExpr::literal`] puts a constant into the statement text.

use crate::{ColumnMapping, ColumnType, Dialect, DialectKind, Error, Fragment, Result, TableMapping, Value};

/// Operators allowed in projected values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    /// String concatenation (rendered per dialect)
    Concat,
}

impl ArithmeticOp {
    fn as_sql(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Concat => "||",
        }
    }
}

/// New value of a field, expressed over the old row
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    /// Constant; integers, booleans and NULL are inlined, anything else is bound
    Literal(Value),
    /// Value captured from the caller's scope, always bound
    Param(Value),
    /// Old value of a field
    Field(String),
    Binary {
        lhs: Box<ValueExpr>,
        op: ArithmeticOp,
        rhs: Box<ValueExpr>,
    },
}

impl ValueExpr {
    pub fn literal(value: impl Into<Value>) -> Self {
        ValueExpr::Literal(value.into())
    }

    pub fn param(value: impl Into<Value>) -> Self {
        ValueExpr::Param(value.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        ValueExpr::Field(name.into())
    }

    pub fn binary(self, op: ArithmeticOp, rhs: impl Into<ValueExpr>) -> Self {
        ValueExpr::Binary {
            lhs: Box::new(self),
            op,
            rhs: Box::new(rhs.into()),
        }
    }

    pub fn concat(self, rhs: impl Into<ValueExpr>) -> Self {
        self.binary(ArithmeticOp::Concat, rhs)
    }
}

macro_rules! value_expr_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ValueExpr {
                fn from(v: $t) -> Self {
                    ValueExpr::Param(v.into())
                }
            }
        )*
    };
}

value_expr_from!(Value, i64, i32, f64, bool, &str, String);

macro_rules! value_expr_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<ValueExpr>> std::ops::$trait<T> for ValueExpr {
            type Output = ValueExpr;

            fn $method(self, rhs: T) -> ValueExpr {
                self.binary($op, rhs)
            }
        }
    };
}

value_expr_op!(Add, add, ArithmeticOp::Add);
value_expr_op!(Sub, sub, ArithmeticOp::Sub);
value_expr_op!(Mul, mul, ArithmeticOp::Mul);
value_expr_op!(Div, div, ArithmeticOp::Div);

#[derive(Debug, Clone, PartialEq)]
struct TemplateEntry {
    field: String,
    value: Value,
    explicit: bool,
}

/// Sparse "new entity" with only some fields set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    entries: Vec<TemplateEntry>,
    include: Vec<String>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a template from a fully populated row. Fields still holding
    /// their type's default value are treated as unset, and key fields are
    /// never assigned.
    pub fn from_row<I, K, V>(row: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            entries: row
                .into_iter()
                .map(|(field, value)| TemplateEntry {
                    field: field.into(),
                    value: value.into(),
                    explicit: false,
                })
                .collect(),
            include: Vec::new(),
        }
    }

    /// Explicitly set a field; it is assigned even when it equals the default
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push(TemplateEntry {
            field: field.into(),
            value: value.into(),
            explicit: true,
        });
        self
    }

    /// Assign this field even when it holds its type's default value
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.include.push(field.into());
        self
    }
}

/// Projection from the old row to new field values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    assignments: Vec<(String, ValueExpr)>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<ValueExpr>) -> Self {
        self.assignments.push((field.into(), value.into()));
        self
    }

    pub fn assignments(&self) -> &[(String, ValueExpr)] {
        &self.assignments
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Mutation applied by a batch update
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Template(Template),
    Projection(Projection),
}

impl From<Template> for Mutation {
    fn from(t: Template) -> Self {
        Mutation::Template(t)
    }
}

impl From<Projection> for Mutation {
    fn from(p: Projection) -> Self {
        Mutation::Projection(p)
    }
}

/// Compiled value of one assignment
#[derive(Debug, Clone, PartialEq)]
pub enum AssignedValue {
    Literal(Value),
    Param(Value),
    /// Old value of a physical column
    Column(String),
    /// Own column's old value combined with an operand
    Derived {
        op: ArithmeticOp,
        operand: Box<AssignedValue>,
    },
    Binary {
        lhs: Box<AssignedValue>,
        op: ArithmeticOp,
        rhs: Box<AssignedValue>,
    },
}

impl AssignedValue {
    pub fn is_self_referential(&self) -> bool {
        matches!(self, AssignedValue::Derived { .. })
    }
}

/// One `column = value` pair
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub field: String,
    pub column: String,
    pub value: AssignedValue,
    quoted_column: String,
    rendered: Fragment,
}

impl Assignment {
    pub fn quoted_column(&self) -> &str {
        &self.quoted_column
    }

    /// The value expression as dialect SQL
    pub fn value_fragment(&self) -> &Fragment {
        &self.rendered
    }
}

/// Ordered assignments, in the mapping's column declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentSet {
    dialect: DialectKind,
    assignments: Vec<Assignment>,
}

impl AssignmentSet {
    pub fn dialect(&self) -> DialectKind {
        self.dialect
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.field == field)
    }

    pub fn columns(&self) -> Vec<&str> {
        self.assignments.iter().map(|a| a.column.as_str()).collect()
    }

    /// `"a" = <v1>, "b" = <v2>` for an UPDATE
    pub fn set_clause(&self) -> Fragment {
        Fragment::join(
            self.assignments.iter().map(|a| {
                let mut f = Fragment::sql(format!("{} = ", a.quoted_column));
                f.append(a.rendered.clone());
                f
            }),
            ", ",
        )
    }

    /// `"a", "b"` for an INSERT column list
    pub fn column_list(&self) -> String {
        self.assignments
            .iter()
            .map(|a| a.quoted_column.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `<v1>, <v2>` for an INSERT ... SELECT list
    pub fn select_list(&self) -> Fragment {
        Fragment::join(self.assignments.iter().map(|a| a.rendered.clone()), ", ")
    }
}

/// Compiles mutations against a table mapping
pub struct AssignmentCompiler<'a> {
    mapping: &'a TableMapping,
    dialect: &'a dyn Dialect,
}

impl<'a> AssignmentCompiler<'a> {
    pub fn new(mapping: &'a TableMapping, dialect: &'a dyn Dialect) -> Self {
        Self { mapping, dialect }
    }

    pub fn compile(&self, mutation: &Mutation) -> Result<AssignmentSet> {
        let slots = match mutation {
            Mutation::Template(t) => self.compile_template(t)?,
            Mutation::Projection(p) => self.compile_projection(p, self.mapping, true)?,
        };
        self.finish(slots, self.mapping)
    }

    /// Compile the select list of an INSERT ... SELECT. Projection fields name
    /// columns of `target`; field references inside values read `self`'s table.
    pub fn compile_insert(&self, projection: &Projection, target: &TableMapping) -> Result<AssignmentSet> {
        let slots = self.compile_projection(projection, target, false)?;
        self.finish(slots, target)
    }

    fn finish(&self, slots: Vec<Option<Assignment>>, target: &TableMapping) -> Result<AssignmentSet> {
        let assignments: Vec<Assignment> = slots.into_iter().flatten().collect();
        if assignments.is_empty() {
            return Err(Error::NoAssignments(target.table().to_string()));
        }
        Ok(AssignmentSet {
            dialect: self.dialect.kind(),
            assignments,
        })
    }

    fn compile_template(&self, template: &Template) -> Result<Vec<Option<Assignment>>> {
        let mut slots = vec![None; self.mapping.columns().len()];
        let mut seen = Vec::new();

        for entry in &template.entries {
            let (pos, column) = self.mapping.resolve(&entry.field)?;
            if !column.column_type.accepts(&entry.value) {
                return Err(Error::InvalidArgument(format!(
                    "cannot assign {} value to {:?} field '{}'",
                    entry.value.type_name(),
                    column.column_type,
                    entry.field
                )));
            }
            seen.push(entry.field.as_str());

            if !entry.explicit {
                if column.is_key {
                    continue;
                }
                let included = template.include.iter().any(|f| f == &entry.field);
                if !included && is_unset(column.column_type, &entry.value) {
                    continue;
                }
            }
            slots[pos] = Some(self.assignment(column, AssignedValue::Param(entry.value.clone())));
        }

        // Included fields missing from the row are reset to their default
        for field in &template.include {
            if seen.contains(&field.as_str()) {
                continue;
            }
            let (pos, column) = self.mapping.resolve(field)?;
            let value = AssignedValue::Param(column.column_type.default_value());
            slots[pos] = Some(self.assignment(column, value));
        }

        Ok(slots)
    }

    fn compile_projection(
        &self,
        projection: &Projection,
        target: &TableMapping,
        allow_derived: bool,
    ) -> Result<Vec<Option<Assignment>>> {
        let mut slots = vec![None; target.columns().len()];

        for (field, expr) in &projection.assignments {
            let (pos, column) = target.resolve(field)?;
            let value = match expr {
                ValueExpr::Binary { lhs, op, rhs }
                    if allow_derived && matches!(lhs.as_ref(), ValueExpr::Field(f) if f == field) =>
                {
                    let op = self.resolve_op(*op, lhs, rhs)?;
                    AssignedValue::Derived {
                        op,
                        operand: Box::new(self.lower(rhs)?),
                    }
                }
                other => self.lower(other)?,
            };
            slots[pos] = Some(self.assignment(column, value));
        }

        Ok(slots)
    }

    fn assignment(&self, column: &ColumnMapping, value: AssignedValue) -> Assignment {
        let quoted_column = self.dialect.quote_identifier(&column.column);
        let rendered = self.render(&value, &quoted_column);
        Assignment {
            field: column.field.clone(),
            column: column.column.clone(),
            value,
            quoted_column,
            rendered,
        }
    }

    /// Lower a projection expression over the source row
    fn lower(&self, expr: &ValueExpr) -> Result<AssignedValue> {
        match expr {
            ValueExpr::Literal(v) => Ok(AssignedValue::Literal(v.clone())),
            ValueExpr::Param(v) => Ok(AssignedValue::Param(v.clone())),
            ValueExpr::Field(f) => {
                let (_, column) = self.mapping.resolve(f)?;
                Ok(AssignedValue::Column(column.column.clone()))
            }
            ValueExpr::Binary { lhs, op, rhs } => {
                let op = self.resolve_op(*op, lhs, rhs)?;
                Ok(AssignedValue::Binary {
                    lhs: Box::new(self.lower(lhs)?),
                    op,
                    rhs: Box::new(self.lower(rhs)?),
                })
            }
        }
    }

    /// `+` on text operands means concatenation; other arithmetic on text is rejected
    fn resolve_op(&self, op: ArithmeticOp, lhs: &ValueExpr, rhs: &ValueExpr) -> Result<ArithmeticOp> {
        let textual = self.type_of(lhs)? == Some(ColumnType::Text)
            || self.type_of(rhs)? == Some(ColumnType::Text);

        match op {
            ArithmeticOp::Add if textual => Ok(ArithmeticOp::Concat),
            ArithmeticOp::Sub | ArithmeticOp::Mul | ArithmeticOp::Div if textual => {
                Err(Error::UnsupportedExpression(format!(
                    "operator '{}' is not defined for text values",
                    op.as_sql()
                )))
            }
            other => Ok(other),
        }
    }

    fn type_of(&self, expr: &ValueExpr) -> Result<Option<ColumnType>> {
        match expr {
            ValueExpr::Literal(v) | ValueExpr::Param(v) => Ok(value_type(v)),
            ValueExpr::Field(f) => Ok(Some(self.mapping.resolve(f)?.1.column_type)),
            ValueExpr::Binary { lhs, op, rhs } => {
                if self.resolve_op(*op, lhs, rhs)? == ArithmeticOp::Concat {
                    return Ok(Some(ColumnType::Text));
                }
                match self.type_of(lhs)? {
                    Some(t) => Ok(Some(t)),
                    None => self.type_of(rhs),
                }
            }
        }
    }

    fn render(&self, value: &AssignedValue, own_column: &str) -> Fragment {
        match value {
            AssignedValue::Literal(v) => match v {
                Value::Null => Fragment::sql("NULL"),
                Value::Integer(n) => Fragment::sql(n.to_string()),
                Value::Bool(b) => Fragment::sql(self.dialect.bool_literal(*b)),
                other => Fragment::param(other.clone()),
            },
            AssignedValue::Param(v) => Fragment::param(v.clone()),
            AssignedValue::Column(c) => Fragment::sql(self.dialect.quote_identifier(c)),
            AssignedValue::Derived { op, operand } => {
                let operand = self.render_operand(operand, own_column);
                self.render_binary(Fragment::sql(own_column), *op, operand)
            }
            AssignedValue::Binary { lhs, op, rhs } => {
                let lhs = self.render_operand(lhs, own_column);
                let rhs = self.render_operand(rhs, own_column);
                self.render_binary(lhs, *op, rhs)
            }
        }
    }

    fn render_operand(&self, value: &AssignedValue, own_column: &str) -> Fragment {
        let fragment = self.render(value, own_column);
        match value {
            AssignedValue::Binary { .. } | AssignedValue::Derived { .. } => fragment.parenthesized(),
            _ => fragment,
        }
    }

    fn render_binary(&self, lhs: Fragment, op: ArithmeticOp, rhs: Fragment) -> Fragment {
        match op {
            ArithmeticOp::Concat => self.dialect.concat(lhs, rhs),
            _ => Fragment::join([lhs, rhs], &format!(" {} ", op.as_sql())),
        }
    }
}

fn value_type(value: &Value) -> Option<ColumnType> {
    match value {
        Value::Null => None,
        Value::Integer(_) => Some(ColumnType::Integer),
        Value::Real(_) => Some(ColumnType::Real),
        Value::Text(_) => Some(ColumnType::Text),
        Value::Bool(_) => Some(ColumnType::Bool),
        Value::Blob(_) => Some(ColumnType::Blob),
        Value::Timestamp(_) => Some(ColumnType::Timestamp),
    }
}

fn is_unset(column_type: ColumnType, value: &Value) -> bool {
    if value.is_null() {
        return true;
    }
    match column_type {
        ColumnType::Integer => value.as_integer() == Some(0),
        ColumnType::Real => value.as_real() == Some(0.0),
        ColumnType::Bool => matches!(value, Value::Bool(false) | Value::Integer(0)),
        ColumnType::Text | ColumnType::Blob | ColumnType::Timestamp => false,
    }
}

/// Compile a mutation into its ordered assignment set
pub fn compile_assignments(
    mutation: &Mutation,
    mapping: &TableMapping,
    dialect: &dyn Dialect,
) -> Result<AssignmentSet> {
    AssignmentCompiler::new(mapping, dialect).compile(mutation)
}
