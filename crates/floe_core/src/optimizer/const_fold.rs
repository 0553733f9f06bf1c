use floe_error::Result;
use tracing::trace;

use super::{OptimizeRule, map_children};
use crate::expr::Expr;
use crate::expr::eval::evaluate;
use crate::frame::Table;
use crate::logical::plan::LogicalPlan;

/// Pre-compute constant expressions.
#[derive(Debug)]
pub struct ConstFold;

impl OptimizeRule for ConstFold {
    fn optimize(&mut self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let mut plan = map_children(plan, &mut |child| self.optimize(child))?;
        match &mut plan {
            LogicalPlan::Select { exprs, .. } | LogicalPlan::WithColumns { exprs, .. } => {
                exprs.iter_mut().for_each(maybe_fold);
            }
            LogicalPlan::GroupByAgg { keys, aggs, .. } => {
                keys.iter_mut().chain(aggs.iter_mut()).for_each(maybe_fold);
            }
            LogicalPlan::Filter { predicate, .. } => maybe_fold(predicate),
            LogicalPlan::Scan {
                predicate: Some(predicate),
                ..
            } => maybe_fold(predicate),
            _ => {}
        }
        Ok(plan)
    }
}

/// Fold the largest constant subtrees of `expr` into literals.
///
/// Expressions that fail to evaluate or fold to null are left alone so the
/// error or the datatype surfaces at execution.
pub fn maybe_fold(expr: &mut Expr) {
    if matches!(expr, Expr::Literal(_)) {
        return;
    }

    if expr.is_const_foldable() {
        match evaluate(expr, &Table::empty()).and_then(|c| c.get(0)) {
            Ok(value) if !value.is_null() => {
                trace!(%expr, %value, "folded constant expression");
                *expr = Expr::Literal(value);
            }
            _ => {}
        }
        return;
    }

    // Otherwise try the children.
    let _ = expr.for_each_child_mut(&mut |child| {
        maybe_fold(child);
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::datatype::DataType;
    use crate::arrays::scalar::ScalarValue;
    use crate::expr::{col, lit};

    fn fold(mut expr: Expr) -> Expr {
        maybe_fold(&mut expr);
        expr
    }

    #[test]
    fn no_fold_literal() {
        assert_eq!(lit("a"), fold(lit("a")));
    }

    #[test]
    fn fold_string_to_float_cast() {
        assert_eq!(lit(3.1f64), fold(lit("3.1").cast(DataType::Float64)));
    }

    #[test]
    fn fold_and_true_false() {
        assert_eq!(lit(false), fold(lit(true).and(lit(false))));
    }

    #[test]
    fn fold_add_numbers() {
        assert_eq!(lit(9i64), fold(lit(4i64) + lit(5i64)));
    }

    #[test]
    fn no_fold_column() {
        let expr = col("a") + lit(5i64);
        assert_eq!(expr.clone(), fold(expr));
    }

    #[test]
    fn partial_fold_column() {
        let got = fold(col("a") + (lit(4i64) + lit(5i64)));
        assert_eq!(col("a") + lit(9i64), got);
    }

    #[test]
    fn failed_fold_is_kept() {
        let expr = lit("abc").strict_cast(DataType::Int64);
        assert_eq!(expr.clone(), fold(expr));

        let expr = lit(ScalarValue::Null).cast(DataType::Int64);
        assert_eq!(expr.clone(), fold(expr));
    }

    #[test]
    fn folds_inside_plan() {
        let table = Table::try_new(vec![crate::column::Column::from_slice("a", &[1i64, 2])]).unwrap();
        let plan = LogicalPlan::Filter {
            input: Box::new(LogicalPlan::scan_table(table)),
            predicate: col("a").gt(lit(0i64) - lit(1i64)),
        };
        let plan = ConstFold.optimize(plan).unwrap();
        match plan {
            LogicalPlan::Filter { predicate, .. } => assert_eq!(col("a").gt(lit(-1i64)), predicate),
            other => panic!("unexpected plan: {other:?}"),
        }
    }
}
