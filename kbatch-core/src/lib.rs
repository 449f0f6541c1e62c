//! Batch query translation: filters and mutations compiled into dialect-specific
//! set-based SQL statements.

pub mod error;
pub mod types;
pub mod mapping;
pub mod filter;
pub mod fragment;
pub mod dialect;
pub mod predicate;
pub mod assignment;
pub mod statement;
pub mod batch;
pub mod config;

pub use error::{Error, Result};
pub use types::*;
pub use mapping::{ColumnMapping, TableMapping, TableMappingBuilder};
pub use filter::{CompareOp, FieldRef, Filter, LocalPredicate, Operand};
pub use fragment::Fragment;
pub use dialect::{Dialect, DialectKind, LimitStyle};
pub use predicate::{compile_filter, PredicateCompiler};
pub use assignment::{
    compile_assignments, ArithmeticOp, AssignedValue, Assignment, AssignmentCompiler,
    AssignmentSet, Mutation, Projection, Template, ValueExpr,
};
pub use statement::{BatchPlan, CompiledStatement, KeyedPlan, StatementBuilder, StatementKind};
pub use batch::{BatchCompiler, BatchQuery};
pub use config::BatchConfig;
