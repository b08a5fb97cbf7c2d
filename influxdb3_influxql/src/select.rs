//! The `SELECT` statement and the analysis the mappers perform over it.

use crate::expression::walk::{Expression, walk_expr, walk_expression, walk_top_level_calls};
use crate::expression::{Call, ConditionalExpression, Expr, VarRef};
use crate::{Error, Result};
use std::fmt::{self, Display, Formatter};
use std::ops::ControlFlow;
use std::time::Duration;

/// Names of the functions that compute a derivative of their input.
const DERIVATIVE_FUNCTIONS: [&str; 2] = ["derivative", "non_negative_derivative"];

/// A projected column of a `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl From<Expr> for Field {
    fn from(expr: Expr) -> Self {
        Self { expr, alias: None }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

/// A data source in the `FROM` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementSelection {
    Name(String),
    /// A regular expression matching measurement names. These are expanded
    /// by the query planner before statements reach a shard.
    Regex(String),
    Subquery(Box<SelectStatement>),
}

impl Display for MeasurementSelection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Regex(re) => write!(f, "/{re}/"),
            Self::Subquery(s) => write!(f, "({s})"),
        }
    }
}

/// A single `GROUP BY` dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dimension {
    /// `time(<interval>)`
    Time { interval: Duration },
    Tag(String),
    /// `*`, grouping by every tag key of the measurement.
    Wildcard,
}

impl Display for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Time { interval } => write!(
                f,
                "time({})",
                crate::expression::Literal::Duration(*interval)
            ),
            Self::Tag(name) => f.write_str(name),
            Self::Wildcard => f.write_str("*"),
        }
    }
}

/// The `GROUP BY` dimensions split into the time interval and the tag keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dimensions {
    pub interval: Option<Duration>,
    pub tags: Vec<String>,
    pub wildcard: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectStatement {
    pub fields: Vec<Field>,
    pub from: Vec<MeasurementSelection>,
    pub condition: Option<ConditionalExpression>,
    pub group_by: Vec<Dimension>,
    /// Maximum number of rows, or of intervals for aggregate queries.
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// `SLIMIT`: maximum number of series.
    pub series_limit: Option<u64>,
    /// `SOFFSET`
    pub series_offset: Option<u64>,
}

impl SelectStatement {
    /// Creates a statement selecting from the measurement `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            from: vec![MeasurementSelection::Name(name.into())],
            ..Default::default()
        }
    }

    pub fn with_field(mut self, field: impl Into<Field>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn with_condition(mut self, condition: ConditionalExpression) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_group_by(mut self, dimension: Dimension) -> Self {
        self.group_by.push(dimension);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_series_limit(mut self, limit: u64) -> Self {
        self.series_limit = Some(limit);
        self
    }

    pub fn with_series_offset(mut self, offset: u64) -> Self {
        self.series_offset = Some(offset);
        self
    }

    /// Returns the field and tag names referenced by the projection,
    /// including those inside function calls, in order of first appearance.
    pub fn names_in_select(&self) -> Vec<String> {
        let mut names = Vec::new();
        for field in &self.fields {
            let _ = walk_expr::<()>(&field.expr, &mut |e| {
                match e {
                    Expr::VarRef(VarRef { name }) | Expr::Distinct(name) => {
                        push_unique(&mut names, name)
                    }
                    _ => {}
                }
                ControlFlow::Continue(())
            });
        }
        names
    }

    /// Returns the names referenced by the `WHERE` clause, in order of first
    /// appearance. This includes `time` if the condition restricts it.
    pub fn names_in_where(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(cond) = &self.condition {
            let _ = walk_expression::<()>(cond, &mut |e| {
                if let Expression::Arithmetic(Expr::VarRef(VarRef { name })) = e {
                    push_unique(&mut names, name);
                }
                ControlFlow::Continue(())
            });
        }
        names
    }

    /// Returns the outermost function call of every field, in projection order.
    pub fn function_calls(&self) -> Vec<&Call> {
        let mut calls = Vec::new();
        for field in &self.fields {
            walk_top_level_calls(&field.expr, &mut |c| calls.push(c));
        }
        calls
    }

    /// `true` if the statement selects raw values rather than aggregates.
    pub fn is_raw_query(&self) -> bool {
        self.function_calls().is_empty()
    }

    /// `true` if the statement is a single derivative over a raw field,
    /// such as `derivative(value)`, which is computed from raw points.
    pub fn is_simple_derivative(&self) -> bool {
        let calls = self.function_calls();
        match calls.as_slice() {
            [call] => {
                DERIVATIVE_FUNCTIONS.contains(&call.name.as_str())
                    && call
                        .args
                        .first()
                        .is_some_and(|arg| arg.var_ref_name().is_some())
            }
            _ => false,
        }
    }

    /// `true` if any field applies `DISTINCT` or the `distinct` function.
    pub fn has_distinct(&self) -> bool {
        self.fields.iter().any(|f| {
            walk_expr(&f.expr, &mut |e| match e {
                Expr::Distinct(_) => ControlFlow::Break(()),
                Expr::Call(c) if c.name == "distinct" => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            })
            .is_break()
        })
    }

    /// Splits the `GROUP BY` clause into its time interval and tag keys.
    ///
    /// A zero-length interval is treated as no interval.
    pub fn dimensions(&self) -> Result<Dimensions> {
        let mut dims = Dimensions::default();
        let mut seen_time = false;
        for dim in &self.group_by {
            match dim {
                Dimension::Time { interval } => {
                    if seen_time {
                        return Err(Error::MultipleTimeDimensions);
                    }
                    seen_time = true;
                    if !interval.is_zero() {
                        dims.interval = Some(*interval);
                    }
                }
                Dimension::Tag(name) => push_unique(&mut dims.tags, name),
                Dimension::Wildcard => dims.wildcard = true,
            }
        }
        Ok(dims)
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

impl Display for SelectStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        write_list(f, &self.fields)?;
        f.write_str(" FROM ")?;
        write_list(f, &self.from)?;
        if let Some(cond) = &self.condition {
            write!(f, " WHERE {cond}")?;
        }
        if !self.group_by.is_empty() {
            f.write_str(" GROUP BY ")?;
            write_list(f, &self.group_by)?;
        }
        if let Some(n) = self.limit {
            write!(f, " LIMIT {n}")?;
        }
        if let Some(n) = self.offset {
            write!(f, " OFFSET {n}")?;
        }
        if let Some(n) = self.series_limit {
            write!(f, " SLIMIT {n}")?;
        }
        if let Some(n) = self.series_offset {
            write!(f, " SOFFSET {n}")?;
        }
        Ok(())
    }
}

fn write_list<T: Display>(f: &mut Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
