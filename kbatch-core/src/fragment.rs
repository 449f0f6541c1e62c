//! SQL fragments with deferred parameter markers.
//!
//! Compilers emit [`Fragment`]s instead of finished text: a sequence of raw SQL
//! pieces and bound values. Markers are assigned only when the statement builder
//! renders the final text, so parameters are always numbered in the order they
//! appear in the statement, regardless of which clause was compiled first.

use crate::{Dialect, Value};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Sql(String),
    Param(Value),
}

/// SQL text interleaved with parameter slots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    segments: Vec<Segment>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fragment made of raw SQL text
    pub fn sql(text: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push_sql(text);
        fragment
    }

    /// A fragment made of a single bound parameter
    pub fn param(value: Value) -> Self {
        let mut fragment = Self::new();
        fragment.push_param(value);
        fragment
    }

    pub fn push_sql(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        // Adjacent text is merged into one segment
        if let Some(Segment::Sql(last)) = self.segments.last_mut() {
            last.push_str(&text);
        } else {
            self.segments.push(Segment::Sql(text));
        }
    }

    pub fn push_param(&mut self, value: Value) {
        self.segments.push(Segment::Param(value));
    }

    pub fn append(&mut self, other: Fragment) {
        for segment in other.segments {
            match segment {
                Segment::Sql(text) => self.push_sql(text),
                Segment::Param(value) => self.push_param(value),
            }
        }
    }

    /// Join fragments with a separator
    pub fn join(parts: impl IntoIterator<Item = Fragment>, separator: &str) -> Fragment {
        let mut out = Fragment::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                out.push_sql(separator);
            }
            out.append(part);
        }
        out
    }

    /// Wrap the fragment in parentheses
    pub fn parenthesized(self) -> Fragment {
        let mut out = Fragment::sql("(");
        out.append(self);
        out.push_sql(")");
        out
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn param_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_)))
            .count()
    }

    /// Render to text with dialect markers, numbering parameters from zero.
    pub fn render(&self, dialect: &dyn Dialect) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::with_capacity(self.param_count());
        for segment in &self.segments {
            match segment {
                Segment::Sql(text) => sql.push_str(text),
                Segment::Param(value) => {
                    sql.push_str(&dialect.parameter_marker(params.len()));
                    params.push(value.clone());
                }
            }
        }
        (sql, params)
    }
}
