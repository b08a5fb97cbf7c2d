use crate::expression::arithmetic::Expr;
use std::fmt::{self, Display, Formatter};

/// Comparison and logical operators of a conditional expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl ConditionalOperator {
    /// Returns the operator that yields the same result with its operands swapped.
    pub fn flip(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
            op => op,
        }
    }

    pub fn is_comparison(self) -> bool {
        !matches!(self, Self::And | Self::Or)
    }
}

impl Display for ConditionalOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBinary {
    pub lhs: Box<ConditionalExpression>,
    pub op: ConditionalOperator,
    pub rhs: Box<ConditionalExpression>,
}

impl Display for ConditionalBinary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

/// A conditional expression, such as the body of a `WHERE` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalExpression {
    /// An arithmetic expression operand.
    Expr(Box<Expr>),

    Binary(ConditionalBinary),

    /// A conditional expression wrapped in parentheses.
    Grouped(Box<ConditionalExpression>),
}

impl ConditionalExpression {
    pub fn binary(lhs: impl Into<Self>, op: ConditionalOperator, rhs: impl Into<Self>) -> Self {
        Self::Binary(ConditionalBinary {
            lhs: Box::new(lhs.into()),
            op,
            rhs: Box::new(rhs.into()),
        })
    }

    /// `lhs = rhs`
    pub fn eq(lhs: impl Into<Self>, rhs: impl Into<Self>) -> Self {
        Self::binary(lhs, ConditionalOperator::Eq, rhs)
    }

    /// `lhs != rhs`
    pub fn not_eq(lhs: impl Into<Self>, rhs: impl Into<Self>) -> Self {
        Self::binary(lhs, ConditionalOperator::NotEq, rhs)
    }

    /// `lhs < rhs`
    pub fn lt(lhs: impl Into<Self>, rhs: impl Into<Self>) -> Self {
        Self::binary(lhs, ConditionalOperator::Lt, rhs)
    }

    /// `lhs <= rhs`
    pub fn lt_eq(lhs: impl Into<Self>, rhs: impl Into<Self>) -> Self {
        Self::binary(lhs, ConditionalOperator::LtEq, rhs)
    }

    /// `lhs > rhs`
    pub fn gt(lhs: impl Into<Self>, rhs: impl Into<Self>) -> Self {
        Self::binary(lhs, ConditionalOperator::Gt, rhs)
    }

    /// `lhs >= rhs`
    pub fn gt_eq(lhs: impl Into<Self>, rhs: impl Into<Self>) -> Self {
        Self::binary(lhs, ConditionalOperator::GtEq, rhs)
    }

    /// `self AND rhs`
    pub fn and(self, rhs: impl Into<Self>) -> Self {
        Self::binary(self, ConditionalOperator::And, rhs)
    }

    /// `self OR rhs`
    pub fn or(self, rhs: impl Into<Self>) -> Self {
        Self::binary(self, ConditionalOperator::Or, rhs)
    }

    /// Wraps `self` in parentheses.
    pub fn grouped(self) -> Self {
        Self::Grouped(Box::new(self))
    }

    /// Returns the arithmetic operand if `self` is one, looking through any
    /// parentheses.
    pub fn as_expr(&self) -> Option<&Expr> {
        match self {
            Self::Expr(e) => Some(e),
            Self::Grouped(e) => e.as_expr(),
            Self::Binary(_) => None,
        }
    }
}

impl Display for ConditionalExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(e) => write!(f, "{e}"),
            Self::Binary(b) => write!(f, "{b}"),
            Self::Grouped(e) => write!(f, "({e})"),
        }
    }
}

impl From<Expr> for ConditionalExpression {
    fn from(e: Expr) -> Self {
        Self::Expr(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let cond = ConditionalExpression::eq(Expr::var("host"), Expr::from("a"))
            .and(
                ConditionalExpression::gt(Expr::var("value"), Expr::from(1.5))
                    .or(ConditionalExpression::lt_eq(Expr::var("time"), Expr::from(10_i64)))
                    .grouped(),
            );
        assert_eq!(
            cond.to_string(),
            "host = 'a' AND (value > 1.5 OR time <= 10)"
        );
    }

    #[test]
    fn flip() {
        assert_eq!(ConditionalOperator::Lt.flip(), ConditionalOperator::Gt);
        assert_eq!(ConditionalOperator::GtEq.flip(), ConditionalOperator::LtEq);
        assert_eq!(ConditionalOperator::Eq.flip(), ConditionalOperator::Eq);
    }
}
