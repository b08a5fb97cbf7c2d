use crate::expression::{Binary, Call, ConditionalBinary, ConditionalExpression, Expr};
use std::ops::ControlFlow;

/// Expression distinguishes [`ConditionalExpression`] and [`Expr`] nodes
/// when visiting a [`ConditionalExpression`] tree. See [`walk_expression`].
#[derive(Debug, Clone, Copy)]
pub enum Expression<'a> {
    Conditional(&'a ConditionalExpression),
    Arithmetic(&'a Expr),
}

/// Perform a depth-first traversal of a conditional expression tree,
/// including the arithmetic operands of its comparisons.
pub fn walk_expression<'a, B>(
    node: &'a ConditionalExpression,
    visit: &mut impl FnMut(Expression<'a>) -> ControlFlow<B>,
) -> ControlFlow<B> {
    match node {
        ConditionalExpression::Expr(n) => walk_expr(n, &mut |n| visit(Expression::Arithmetic(n)))?,
        ConditionalExpression::Binary(ConditionalBinary { lhs, rhs, .. }) => {
            walk_expression(lhs, visit)?;
            walk_expression(rhs, visit)?;
        }
        ConditionalExpression::Grouped(n) => walk_expression(n, visit)?,
    }

    visit(Expression::Conditional(node))
}

/// Perform a depth-first traversal of the arithmetic expression tree.
pub fn walk_expr<'a, B>(
    expr: &'a Expr,
    visit: &mut impl FnMut(&'a Expr) -> ControlFlow<B>,
) -> ControlFlow<B> {
    match expr {
        Expr::Binary(Binary { lhs, rhs, .. }) => {
            walk_expr(lhs, visit)?;
            walk_expr(rhs, visit)?;
        }
        Expr::Nested(n) => walk_expr(n, visit)?,
        Expr::Call(Call { args, .. }) => {
            args.iter().try_for_each(|n| walk_expr(n, visit))?;
        }
        Expr::VarRef(_) | Expr::Literal(_) | Expr::Wildcard | Expr::Distinct(_) => {}
    }

    visit(expr)
}

/// Visits the outermost [`Call`]s of `expr`, without descending into
/// their arguments.
pub fn walk_top_level_calls<'a>(expr: &'a Expr, visit: &mut impl FnMut(&'a Call)) {
    match expr {
        Expr::Call(call) => visit(call),
        Expr::Binary(Binary { lhs, rhs, .. }) => {
            walk_top_level_calls(lhs, visit);
            walk_top_level_calls(rhs, visit);
        }
        Expr::Nested(n) => walk_top_level_calls(n, visit),
        Expr::VarRef(_) | Expr::Literal(_) | Expr::Wildcard | Expr::Distinct(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::BinaryOperator;

    #[test]
    fn test_walk_expression() {
        let cond = ConditionalExpression::gt(
            Expr::call("abs", vec![Expr::var("value")]),
            Expr::from(1_i64),
        )
        .and(ConditionalExpression::eq(Expr::var("host"), Expr::from("a")).grouped());

        let mut nodes = Vec::new();
        let _ = walk_expression::<()>(&cond, &mut |n| {
            nodes.push(match n {
                Expression::Conditional(c) => format!("C: {c}"),
                Expression::Arithmetic(e) => format!("A: {e}"),
            });
            ControlFlow::Continue(())
        });
        assert_eq!(
            nodes,
            vec![
                "A: value",
                "A: abs(value)",
                "C: abs(value)",
                "A: 1",
                "C: 1",
                "C: abs(value) > 1",
                "A: host",
                "C: host",
                "A: 'a'",
                "C: 'a'",
                "C: host = 'a'",
                "C: (host = 'a')",
                "C: abs(value) > 1 AND (host = 'a')",
            ]
        );
    }

    #[test]
    fn test_walk_expr_break() {
        let expr = Expr::binary(
            Expr::var("a"),
            BinaryOperator::Add,
            Expr::call("b", vec![Expr::var("c")]),
        );
        let found = walk_expr(&expr, &mut |e| match e {
            Expr::Call(c) => ControlFlow::Break(c.name.clone()),
            _ => ControlFlow::Continue(()),
        });
        assert_eq!(found, ControlFlow::Break("b".to_string()));
    }

    #[test]
    fn test_walk_top_level_calls() {
        let expr = Expr::binary(
            Expr::call("derivative", vec![Expr::call("mean", vec![Expr::var("v")])]),
            BinaryOperator::Add,
            Expr::Nested(Box::new(Expr::call("max", vec![Expr::var("w")]))),
        );
        let mut names = Vec::new();
        walk_top_level_calls(&expr, &mut |c| names.push(c.name.as_str()));
        assert_eq!(names, vec!["derivative", "max"]);
    }
}
