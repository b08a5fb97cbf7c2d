//! Evaluation of expressions against decoded field values.
//!
//! Evaluation is total: anything that cannot be computed, such as a
//! reference to a field the point does not carry or a comparison between
//! incompatible types, evaluates to `None`. A `WHERE` filter only matches
//! when it evaluates to `true`.

use crate::expression::{
    Binary, BinaryOperator, ConditionalBinary, ConditionalExpression, ConditionalOperator, Expr,
    Literal, VarRef,
};
use crate::value::FieldValue;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Resolves variable references to values.
pub trait Valuer {
    fn value(&self, name: &str) -> Option<FieldValue>;
}

impl Valuer for BTreeMap<String, FieldValue> {
    fn value(&self, name: &str) -> Option<FieldValue> {
        self.get(name).cloned()
    }
}

/// A single named value, for filters that only reference one field.
impl Valuer for (&str, &FieldValue) {
    fn value(&self, name: &str) -> Option<FieldValue> {
        (self.0 == name).then(|| self.1.clone())
    }
}

/// Returns `true` if `cond` evaluates to `true` for `valuer`.
pub fn matches_where(cond: &ConditionalExpression, valuer: &impl Valuer) -> bool {
    matches!(
        eval_conditional(cond, valuer),
        Some(FieldValue::Boolean(true))
    )
}

pub fn eval_conditional(cond: &ConditionalExpression, valuer: &impl Valuer) -> Option<FieldValue> {
    match cond {
        ConditionalExpression::Expr(e) => eval_expr(e, valuer),
        ConditionalExpression::Grouped(e) => eval_conditional(e, valuer),
        ConditionalExpression::Binary(ConditionalBinary { lhs, op, rhs }) => {
            let lhs = eval_conditional(lhs, valuer)?;
            let rhs = eval_conditional(rhs, valuer)?;
            match op {
                ConditionalOperator::And => Some((lhs.as_bool()? && rhs.as_bool()?).into()),
                ConditionalOperator::Or => Some((lhs.as_bool()? || rhs.as_bool()?).into()),
                op => compare(*op, &lhs, &rhs).map(FieldValue::Boolean),
            }
        }
    }
}

pub fn eval_expr(expr: &Expr, valuer: &impl Valuer) -> Option<FieldValue> {
    match expr {
        Expr::VarRef(VarRef { name }) => valuer.value(name),
        Expr::Literal(lit) => Some(literal_value(lit)),
        Expr::Nested(e) => eval_expr(e, valuer),
        Expr::Binary(Binary { lhs, op, rhs }) => {
            arithmetic(*op, eval_expr(lhs, valuer)?, eval_expr(rhs, valuer)?)
        }
        Expr::Call(_) | Expr::Distinct(_) | Expr::Wildcard => None,
    }
}

fn literal_value(lit: &Literal) -> FieldValue {
    match lit {
        Literal::Integer(v) | Literal::Timestamp(v) => FieldValue::Integer(*v),
        Literal::Float(v) => FieldValue::Float(*v),
        Literal::String(v) => FieldValue::String(v.clone()),
        Literal::Boolean(v) => FieldValue::Boolean(*v),
        Literal::Duration(d) => {
            FieldValue::Integer(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        }
    }
}

fn arithmetic(op: BinaryOperator, lhs: FieldValue, rhs: FieldValue) -> Option<FieldValue> {
    use FieldValue::{Float, Integer};

    match (lhs, rhs) {
        (Integer(a), Integer(b)) => match op {
            BinaryOperator::Add => a.checked_add(b).map(Integer),
            BinaryOperator::Sub => a.checked_sub(b).map(Integer),
            BinaryOperator::Mul => a.checked_mul(b).map(Integer),
            BinaryOperator::Div => (b != 0).then(|| Float(a as f64 / b as f64)),
            BinaryOperator::Mod => a.checked_rem(b).map(Integer),
        },
        (a, b) => {
            let (a, b) = (a.as_f64()?, b.as_f64()?);
            Some(Float(match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Sub => a - b,
                BinaryOperator::Mul => a * b,
                BinaryOperator::Div => a / b,
                BinaryOperator::Mod => a % b,
            }))
        }
    }
}

fn compare(op: ConditionalOperator, lhs: &FieldValue, rhs: &FieldValue) -> Option<bool> {
    let ordering = match (lhs, rhs) {
        (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
        (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
        (FieldValue::Boolean(a), FieldValue::Boolean(b)) => {
            return match op {
                ConditionalOperator::Eq => Some(a == b),
                ConditionalOperator::NotEq => Some(a != b),
                _ => None,
            };
        }
        (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?)?,
    };

    Some(match op {
        ConditionalOperator::Eq => ordering == Ordering::Equal,
        ConditionalOperator::NotEq => ordering != Ordering::Equal,
        ConditionalOperator::Lt => ordering == Ordering::Less,
        ConditionalOperator::LtEq => ordering != Ordering::Greater,
        ConditionalOperator::Gt => ordering == Ordering::Greater,
        ConditionalOperator::GtEq => ordering != Ordering::Less,
        ConditionalOperator::And | ConditionalOperator::Or => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ConditionalExpression as Cond;

    fn fields() -> BTreeMap<String, FieldValue> {
        BTreeMap::from([
            ("value".to_string(), FieldValue::Float(2.5)),
            ("count".to_string(), FieldValue::Integer(3)),
            ("up".to_string(), FieldValue::Boolean(true)),
            ("status".to_string(), FieldValue::String("ok".into())),
        ])
    }

    #[test]
    fn numeric_comparisons_promote() {
        let f = fields();
        assert!(matches_where(&Cond::gt(Expr::var("value"), Expr::from(2_i64)), &f));
        assert!(matches_where(&Cond::eq(Expr::var("count"), Expr::from(3.0)), &f));
        assert!(!matches_where(&Cond::lt(Expr::var("count"), Expr::from(3_i64)), &f));
        assert!(matches_where(
            &Cond::gt_eq(
                Expr::binary(Expr::var("count"), BinaryOperator::Mul, Expr::var("value")),
                Expr::from(7.5)
            ),
            &f
        ));
    }

    #[test]
    fn strings_and_booleans() {
        let f = fields();
        assert!(matches_where(&Cond::eq(Expr::var("status"), Expr::from("ok")), &f));
        assert!(matches_where(&Cond::not_eq(Expr::var("up"), Expr::from(false)), &f));
        // booleans are not ordered
        assert!(!matches_where(&Cond::gt(Expr::var("up"), Expr::from(false)), &f));
        // strings never equal numbers
        assert!(!matches_where(&Cond::eq(Expr::var("status"), Expr::from(1_i64)), &f));
    }

    #[test]
    fn missing_fields_never_match() {
        let f = fields();
        let missing = Cond::gt(Expr::var("absent"), Expr::from(0_i64));
        assert!(!matches_where(&missing, &f));
        assert!(!matches_where(&Cond::not_eq(Expr::var("absent"), Expr::from(0_i64)), &f));
        assert!(!matches_where(
            &missing.or(Cond::eq(Expr::var("count"), Expr::from(3_i64))),
            &f
        ));
    }

    #[test]
    fn logical_operators() {
        let f = fields();
        let cond = Cond::gt(Expr::var("value"), Expr::from(10_i64))
            .or(Cond::eq(Expr::var("status"), Expr::from("ok")))
            .grouped()
            .and(Cond::eq(Expr::var("up"), Expr::from(true)));
        assert!(matches_where(&cond, &f));
        // a non-boolean operand of AND does not match
        assert!(!matches_where(&Cond::from(Expr::var("value")).and(Cond::from(Expr::from(true))), &f));
    }

    #[test]
    fn single_field_valuer() {
        let v = FieldValue::Float(1.0);
        let valuer = ("value", &v);
        assert!(matches_where(&Cond::eq(Expr::var("value"), Expr::from(1_i64)), &valuer));
        assert!(!matches_where(&Cond::eq(Expr::var("other"), Expr::from(1_i64)), &valuer));
    }

    #[test]
    fn integer_arithmetic() {
        let f = BTreeMap::new();
        let div = Expr::binary(Expr::from(7_i64), BinaryOperator::Div, Expr::from(2_i64));
        assert_eq!(eval_expr(&div, &f), Some(FieldValue::Float(3.5)));
        let div0 = Expr::binary(Expr::from(7_i64), BinaryOperator::Div, Expr::from(0_i64));
        assert_eq!(eval_expr(&div0, &f), None);
        let overflow = Expr::binary(Expr::from(i64::MAX), BinaryOperator::Add, Expr::from(1_i64));
        assert_eq!(eval_expr(&overflow, &f), None);
    }
}
