//! Extraction of the time bounds implied by a `WHERE` clause.

use crate::expression::{ConditionalBinary, ConditionalExpression, ConditionalOperator, Expr, Literal};
use crate::{Error, Result};
use chrono::DateTime;

/// The name of the time pseudo-column.
pub const TIME_COLUMN_NAME: &str = "time";

/// Inclusive lower and upper time bounds, in nanoseconds since the epoch.
/// `None` means the condition places no bound on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl TimeRange {
    pub fn new(min: Option<i64>, max: Option<i64>) -> Self {
        Self { min, max }
    }

    /// Computes the time range of `cond`. `AND` intersects the ranges of
    /// its operands and `OR` takes their union.
    pub fn from_condition(cond: Option<&ConditionalExpression>) -> Result<Self> {
        match cond {
            Some(cond) => time_range(cond),
            None => Ok(Self::default()),
        }
    }

    /// Resolves the open ends of the range: a missing minimum becomes the
    /// epoch and a missing maximum becomes `now`.
    pub fn as_epoch_nanos(&self, now: i64) -> (i64, i64) {
        (self.min.unwrap_or(0), self.max.unwrap_or(now))
    }

    fn intersect(self, other: Self) -> Self {
        Self {
            min: pick(self.min, other.min, i64::max),
            max: pick(self.max, other.max, i64::min),
        }
    }

    fn union(self, other: Self) -> Self {
        Self {
            min: self.min.zip(other.min).map(|(a, b)| a.min(b)),
            max: self.max.zip(other.max).map(|(a, b)| a.max(b)),
        }
    }
}

fn pick(a: Option<i64>, b: Option<i64>, f: fn(i64, i64) -> i64) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn time_range(cond: &ConditionalExpression) -> Result<TimeRange> {
    let ConditionalExpression::Binary(ConditionalBinary { lhs, op, rhs }) = cond else {
        return match cond {
            ConditionalExpression::Grouped(inner) => time_range(inner),
            _ => Ok(TimeRange::default()),
        };
    };

    match op {
        ConditionalOperator::And => Ok(time_range(lhs)?.intersect(time_range(rhs)?)),
        ConditionalOperator::Or => Ok(time_range(lhs)?.union(time_range(rhs)?)),
        op => {
            let (op, value) = if is_time_ref(lhs) {
                (*op, rhs)
            } else if is_time_ref(rhs) {
                (op.flip(), lhs)
            } else {
                return Ok(TimeRange::default());
            };

            let ts = timestamp(value)?;
            Ok(match op {
                ConditionalOperator::Gt => TimeRange::new(Some(ts.saturating_add(1)), None),
                ConditionalOperator::GtEq => TimeRange::new(Some(ts), None),
                ConditionalOperator::Lt => TimeRange::new(None, Some(ts.saturating_sub(1))),
                ConditionalOperator::LtEq => TimeRange::new(None, Some(ts)),
                ConditionalOperator::Eq => TimeRange::new(Some(ts), Some(ts)),
                _ => TimeRange::default(),
            })
        }
    }
}

fn is_time_ref(cond: &ConditionalExpression) -> bool {
    cond.as_expr()
        .and_then(Expr::var_ref_name)
        .is_some_and(|name| name == TIME_COLUMN_NAME)
}

/// Reads a timestamp from an integer, timestamp or RFC3339 string literal.
fn timestamp(cond: &ConditionalExpression) -> Result<i64> {
    let invalid = || Error::InvalidTimeLiteral(cond.to_string());
    match cond.as_expr().ok_or_else(invalid)? {
        Expr::Literal(Literal::Integer(ns) | Literal::Timestamp(ns)) => Ok(*ns),
        Expr::Literal(Literal::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .and_then(|t| t.timestamp_nanos_opt())
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ConditionalExpression as Cond;

    fn time() -> Expr {
        Expr::var(TIME_COLUMN_NAME)
    }

    fn range(cond: Cond) -> TimeRange {
        TimeRange::from_condition(Some(&cond)).unwrap()
    }

    #[test]
    fn bounds_are_inclusive() {
        let cond = Cond::gt_eq(time(), Expr::from(0_i64)).and(Cond::lt_eq(time(), Expr::from(10_i64)));
        assert_eq!(range(cond), TimeRange::new(Some(0), Some(10)));

        let cond = Cond::gt(time(), Expr::from(0_i64)).and(Cond::lt(time(), Expr::from(20_i64)));
        assert_eq!(range(cond), TimeRange::new(Some(1), Some(19)));
    }

    #[test]
    fn reversed_operands() {
        let cond = Cond::lt(Expr::from(5_i64), time());
        assert_eq!(range(cond), TimeRange::new(Some(6), None));
    }

    #[test]
    fn equality_and_grouping() {
        let cond = Cond::eq(time(), Expr::from(7_i64)).grouped();
        assert_eq!(range(cond), TimeRange::new(Some(7), Some(7)));
    }

    #[test]
    fn non_time_terms_are_ignored() {
        let cond = Cond::eq(Expr::var("host"), Expr::from("a"))
            .and(Cond::gt_eq(time(), Expr::from(100_i64)));
        assert_eq!(range(cond), TimeRange::new(Some(100), None));
        assert_eq!(
            TimeRange::from_condition(None).unwrap(),
            TimeRange::default()
        );
    }

    #[test]
    fn or_widens() {
        let cond = Cond::gt_eq(time(), Expr::from(10_i64))
            .and(Cond::lt(time(), Expr::from(20_i64)))
            .grouped()
            .or(Cond::gt_eq(time(), Expr::from(0_i64))
                .and(Cond::lt(time(), Expr::from(5_i64)))
                .grouped());
        assert_eq!(range(cond), TimeRange::new(Some(0), Some(19)));

        // an unbounded side stays unbounded
        let cond = Cond::gt_eq(time(), Expr::from(10_i64)).or(Cond::eq(Expr::var("host"), Expr::from("a")));
        assert_eq!(range(cond), TimeRange::default());
    }

    #[test]
    fn literal_forms() {
        let cond = Cond::gt_eq(time(), Expr::from("1970-01-01T00:00:01Z"));
        assert_eq!(range(cond), TimeRange::new(Some(1_000_000_000), None));

        let cond = Cond::lt_eq(time(), Expr::from(Literal::Timestamp(42)));
        assert_eq!(range(cond), TimeRange::new(None, Some(42)));

        let cond = Cond::gt(time(), Expr::from("yesterday"));
        let err = TimeRange::from_condition(Some(&cond)).unwrap_err();
        assert_eq!(err.to_string(), "invalid time literal: 'yesterday'");
    }

    #[test]
    fn epoch_nanos_fills_open_ends() {
        assert_eq!(TimeRange::default().as_epoch_nanos(99), (0, 99));
        assert_eq!(TimeRange::new(Some(5), Some(6)).as_epoch_nanos(99), (5, 6));
    }
}
