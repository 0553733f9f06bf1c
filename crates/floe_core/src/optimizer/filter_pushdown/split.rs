use crate::expr::{BinaryOp, Expr};

/// Recursively split an expression on AND, putting the split expressions in
/// `out`.
pub fn split_conjunction(expr: Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            split_conjunction(*left, out);
            split_conjunction(*right, out);
        }
        other => out.push(other),
    }
}

/// Join expressions with AND. `None` if there are no expressions.
pub fn and_all(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    exprs.into_iter().reduce(|acc, expr| acc.and(expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit};

    #[test]
    fn split_conjunction_none() {
        let expr = lit(4i8);

        let mut out = Vec::new();
        split_conjunction(expr.clone(), &mut out);

        assert_eq!(vec![expr], out);
    }

    #[test]
    fn split_conjunction_nested_and() {
        let expr = col("a").eq(lit(1i64)).and(col("b").or(col("c"))).and(col("d"));

        let mut out = Vec::new();
        split_conjunction(expr, &mut out);

        let expected = vec![col("a").eq(lit(1i64)), col("b").or(col("c")), col("d")];
        assert_eq!(expected, out);
    }

    #[test]
    fn and_all_round_trip() {
        assert_eq!(None, and_all(Vec::new()));
        assert_eq!(Some(col("a").and(col("b"))), and_all([col("a"), col("b")]));
    }
}
