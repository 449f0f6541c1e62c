//! Filter expressions over entity fields
//!
//! A [`Filter`] is an immutable tree built through a typed builder:
//!
//! ```
//! use kbatch_core::Filter;
//!
//! let price = 0.0;
//! let filter = Filter::field("item_id").le(500)
//!     .and(Filter::field("price").ge_param(price));
//! ```
//!
//! Membership and existential forms are both available. They compile to the
//! same `IN` clause:
//!
//! ```
//! use kbatch_core::Filter;
//!
//! let descriptions = vec!["info"];
//! let a = Filter::field("description").is_in(descriptions.clone());
//! let b = Filter::any(descriptions, "description");
//! ```

use crate::Value;
use std::fmt;
use std::sync::Arc;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Constant written into the filter
    Value(Value),
    /// Value captured from the caller's scope
    Param(Value),
    /// Another field of the same row
    Field(String),
}

/// Predicate that only exists in the application process
#[derive(Clone)]
pub struct LocalPredicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>);

impl LocalPredicate {
    pub fn new(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn evaluate(&self, value: &Value) -> bool {
        (self.0)(value)
    }
}

impl fmt::Debug for LocalPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LocalPredicate(..)")
    }
}

impl PartialEq for LocalPredicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Filter AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        field: String,
        op: CompareOp,
        operand: Operand,
    },

    // Logical operators
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),

    /// field ∈ values
    In { field: String, values: Vec<Value> },
    /// ∃ v ∈ values: v = field
    Any { values: Vec<Value>, field: String },

    IsNull(String),
    IsNotNull(String),

    /// Application-side predicate, never translatable
    Local {
        field: String,
        label: String,
        predicate: LocalPredicate,
    },
}

impl Filter {
    /// Start a predicate on a field
    pub fn field(name: impl Into<String>) -> FieldRef {
        FieldRef(name.into())
    }

    /// Existential form: any element of `values` equals `field`
    pub fn any<I, V>(values: I, field: impl Into<String>) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::Any {
            values: values.into_iter().map(Into::into).collect(),
            field: field.into(),
        }
    }

    pub fn and(self, other: Filter) -> Filter {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Filter {
        Filter::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Filter {
        Filter::Not(Box::new(self))
    }

    /// Returns true if every node of the tree can be sent to the backend
    pub fn is_translatable(&self) -> bool {
        match self {
            Filter::And(l, r) | Filter::Or(l, r) => l.is_translatable() && r.is_translatable(),
            Filter::Not(inner) => inner.is_translatable(),
            Filter::Local { .. } => false,
            _ => true,
        }
    }
}

impl std::ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        self.negate()
    }
}

/// Field handle returned by [`Filter::field`]
#[derive(Debug, Clone)]
pub struct FieldRef(String);

impl FieldRef {
    pub fn name(&self) -> &str {
        &self.0
    }

    fn compare(self, op: CompareOp, operand: Operand) -> Filter {
        Filter::Compare {
            field: self.0,
            op,
            operand,
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Eq, Operand::Value(value.into()))
    }

    pub fn ne(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Ne, Operand::Value(value.into()))
    }

    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Lt, Operand::Value(value.into()))
    }

    pub fn le(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Le, Operand::Value(value.into()))
    }

    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Gt, Operand::Value(value.into()))
    }

    pub fn ge(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Ge, Operand::Value(value.into()))
    }

    /// Compare against a value captured from the caller
    pub fn cmp_param(self, op: CompareOp, value: impl Into<Value>) -> Filter {
        self.compare(op, Operand::Param(value.into()))
    }

    pub fn eq_param(self, value: impl Into<Value>) -> Filter {
        self.cmp_param(CompareOp::Eq, value)
    }

    pub fn ge_param(self, value: impl Into<Value>) -> Filter {
        self.cmp_param(CompareOp::Ge, value)
    }

    pub fn le_param(self, value: impl Into<Value>) -> Filter {
        self.cmp_param(CompareOp::Le, value)
    }

    /// Compare against another field of the same row
    pub fn cmp_field(self, op: CompareOp, other: impl Into<String>) -> Filter {
        self.compare(op, Operand::Field(other.into()))
    }

    /// Membership: field ∈ values
    pub fn is_in<I, V>(self, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In {
            field: self.0,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(self) -> Filter {
        Filter::IsNull(self.0)
    }

    pub fn is_not_null(self) -> Filter {
        Filter::IsNotNull(self.0)
    }

    /// Filter by a closure evaluated in-process. Such filters cannot be
    /// compiled and are rejected before anything reaches the backend.
    pub fn matches(
        self,
        label: impl Into<String>,
        f: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Filter {
        Filter::Local {
            field: self.0,
            label: label.into(),
            predicate: LocalPredicate::new(f),
        }
    }
}
