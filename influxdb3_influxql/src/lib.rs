//! The pre-parsed InfluxQL statement model consumed by the shard mappers.
//!
//! Statements reach this crate already parsed: [`SelectStatement`] and the
//! [`Expr`] / [`ConditionalExpression`] trees are plain data. What lives here
//! is the analysis the mappers need over that data: extracting the names a
//! statement references, its function calls, its `GROUP BY` interval, the
//! time range implied by its `WHERE` clause, and evaluating a residual
//! `WHERE` filter against decoded field values.

pub mod eval;
pub mod expression;
pub mod select;
pub mod time_range;
pub mod value;

pub use eval::{Valuer, eval_conditional, eval_expr, matches_where};
pub use expression::*;
pub use select::*;
pub use time_range::{TIME_COLUMN_NAME, TimeRange};
pub use value::FieldValue;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("multiple time dimensions not allowed")]
    MultipleTimeDimensions,

    #[error("invalid time literal: {0}")]
    InvalidTimeLiteral(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
