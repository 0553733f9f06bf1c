pub mod split;

use floe_error::Result;
use tracing::trace;

use self::split::{and_all, split_conjunction};
use super::{OptimizeRule, map_children};
use crate::expr::{Expr, expand_exprs};
use crate::join::{JoinArgs, JoinType};
use crate::logical::plan::LogicalPlan;

/// Holds a filtering expression and all columns the expression references.
#[derive(Debug)]
struct ExtractedFilter {
    filter: Expr,
    columns: Vec<String>,
}

impl ExtractedFilter {
    fn from_expr(expr: Expr) -> Self {
        let columns = expr.referenced_columns();
        ExtractedFilter { filter: expr, columns }
    }

    fn references_any(&self, names: &[String]) -> bool {
        self.columns.iter().any(|c| names.contains(c))
    }
}

/// Moves filters as close to the scans as possible.
///
/// Only filters that look at one row at a time are moved, and only past
/// nodes that don't change which rows or values such a filter sees.
#[derive(Debug, Default)]
pub struct FilterPushdownRule {
    filters: Vec<ExtractedFilter>,
}

impl OptimizeRule for FilterPushdownRule {
    fn optimize(&mut self, plan: LogicalPlan) -> Result<LogicalPlan> {
        match plan {
            LogicalPlan::Filter { input, predicate } => self.pushdown_filter(*input, predicate),
            LogicalPlan::Sort { .. } => self.pushdown_through(plan),
            LogicalPlan::WithColumns { input, exprs } => self.pushdown_with_columns(input, exprs),
            LogicalPlan::Select { .. } => self.pushdown_select(plan),
            LogicalPlan::Join { left, right, args } => self.pushdown_join(left, right, args),
            LogicalPlan::Scan {
                source,
                projection,
                predicate,
            } => {
                let filters = self.filters.drain(..).map(|f| f.filter);
                let predicate = and_all(predicate.into_iter().chain(filters));
                trace!(source = source.name(), has_predicate = predicate.is_some(), "pushed filters into scan");
                Ok(LogicalPlan::Scan {
                    source,
                    projection,
                    predicate,
                })
            }
            other => self.stop_pushdown(other),
        }
    }
}

impl FilterPushdownRule {
    /// Adds an expression as a filter that we'll be pushing down.
    fn add_filter(&mut self, expr: Expr) {
        let mut split = Vec::new();
        split_conjunction(expr, &mut split);
        self.filters.extend(split.into_iter().map(ExtractedFilter::from_expr))
    }

    /// Stops the push down for this set of filters, and wraps the plan in a
    /// new filter node.
    ///
    /// Children still get a separate pushdown of their own.
    fn stop_pushdown(&mut self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let plan = map_children(plan, &mut |child| FilterPushdownRule::default().optimize(child))?;
        Ok(wrap_remaining(plan, std::mem::take(&mut self.filters)))
    }

    fn pushdown_filter(&mut self, input: LogicalPlan, predicate: Expr) -> Result<LogicalPlan> {
        if !predicate.is_elementwise() {
            // Filters seeing the whole column are evaluated in place.
            let input = FilterPushdownRule::default().optimize(input)?;
            let plan = LogicalPlan::Filter {
                input: Box::new(input),
                predicate,
            };
            return Ok(wrap_remaining(plan, std::mem::take(&mut self.filters)));
        }
        self.add_filter(predicate);
        self.optimize(input)
    }

    /// Continue with the same filters below a node that keeps rows and
    /// values as they are.
    fn pushdown_through(&mut self, plan: LogicalPlan) -> Result<LogicalPlan> {
        map_children(plan, &mut |child| self.optimize(child))
    }

    fn pushdown_with_columns(&mut self, input: Box<LogicalPlan>, exprs: Vec<Expr>) -> Result<LogicalPlan> {
        if !exprs.iter().all(Expr::is_elementwise) {
            return self.stop_pushdown(LogicalPlan::WithColumns { input, exprs });
        }
        let Some(produced) = produced_names(&input, &exprs) else {
            return self.stop_pushdown(LogicalPlan::WithColumns { input, exprs });
        };

        let (keep, push): (Vec<_>, Vec<_>) = self.filters.drain(..).partition(|f| f.references_any(&produced));
        let mut child_pushdown = FilterPushdownRule { filters: push };
        let input = child_pushdown.optimize(*input)?;
        let plan = LogicalPlan::WithColumns {
            input: Box::new(input),
            exprs,
        };
        Ok(wrap_remaining(plan, keep))
    }

    /// Only selects of plain columns pass filters through unchanged.
    fn pushdown_select(&mut self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let plain = matches!(&plan, LogicalPlan::Select { exprs, .. } if exprs.iter().all(|e| matches!(e, Expr::Column(_))));
        if plain {
            self.pushdown_through(plan)
        } else {
            self.stop_pushdown(plan)
        }
    }

    /// Filters on an inner join go to whichever side holds all the columns
    /// they read.
    fn pushdown_join(
        &mut self,
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        args: JoinArgs,
    ) -> Result<LogicalPlan> {
        let schemas = left.schema().and_then(|l| Ok((l, right.schema()?)));
        let (left_schema, right_schema) = match (args.how, schemas) {
            (JoinType::Inner, Ok(schemas)) => schemas,
            _ => return self.stop_pushdown(LogicalPlan::Join { left, right, args }),
        };

        let mut left_pushdown = FilterPushdownRule::default();
        let mut right_pushdown = FilterPushdownRule::default();
        let mut keep = Vec::new();
        for filter in self.filters.drain(..) {
            if filter.columns.iter().all(|c| left_schema.contains(c)) {
                left_pushdown.filters.push(filter);
            } else if filter
                .columns
                .iter()
                .all(|c| right_schema.contains(c) && !left_schema.contains(c) && !args.right_on.contains(c))
            {
                right_pushdown.filters.push(filter);
            } else {
                keep.push(filter);
            }
        }

        let left = left_pushdown.optimize(*left)?;
        let right = right_pushdown.optimize(*right)?;
        let plan = LogicalPlan::Join {
            left: Box::new(left),
            right: Box::new(right),
            args,
        };
        Ok(wrap_remaining(plan, keep))
    }
}

/// Wrap the plan in a filter node holding the remaining filters, if any.
fn wrap_remaining(plan: LogicalPlan, filters: Vec<ExtractedFilter>) -> LogicalPlan {
    match and_all(filters.into_iter().map(|f| f.filter)) {
        Some(predicate) => LogicalPlan::Filter {
            input: Box::new(plan),
            predicate,
        },
        None => plan,
    }
}

/// Names of the columns a with-columns node adds or replaces.
fn produced_names(input: &LogicalPlan, exprs: &[Expr]) -> Option<Vec<String>> {
    let schema = input.schema().ok()?;
    let exprs = expand_exprs(exprs, &schema, &[]).ok()?;
    exprs.iter().map(|e| e.output_name().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::expr::{col, lit};
    use crate::frame::Table;

    fn scan() -> LogicalPlan {
        LogicalPlan::scan_table(
            Table::try_new(vec![
                Column::from_slice("a", &[1i64, 2, 3]),
                Column::from_slice("b", &[4i64, 5, 6]),
            ])
            .unwrap(),
        )
    }

    fn filter(input: LogicalPlan, predicate: Expr) -> LogicalPlan {
        LogicalPlan::Filter {
            input: Box::new(input),
            predicate,
        }
    }

    fn scan_predicate(plan: &LogicalPlan) -> Option<&Expr> {
        match plan {
            LogicalPlan::Scan { predicate, .. } => predicate.as_ref(),
            other => scan_predicate(other.children()[0]),
        }
    }

    #[test]
    fn filter_into_scan_through_sort() {
        let plan = filter(
            LogicalPlan::Sort {
                input: Box::new(scan()),
                by: vec!["a".to_string()],
                descending: vec![false],
                nulls_last: false,
            },
            col("a").gt(lit(1i64)).and(col("b").lt(lit(6i64))),
        );
        let plan = FilterPushdownRule::default().optimize(plan).unwrap();
        assert_eq!("Sort", plan.name());
        assert_eq!(
            Some(&col("a").gt(lit(1i64)).and(col("b").lt(lit(6i64)))),
            scan_predicate(&plan)
        );
    }

    #[test]
    fn filter_on_replaced_column_stays() {
        let plan = filter(
            LogicalPlan::WithColumns {
                input: Box::new(scan()),
                exprs: vec![(col("a") * lit(2i64)).alias("a")],
            },
            col("a").gt(lit(2i64)).and(col("b").gt(lit(4i64))),
        );
        let plan = FilterPushdownRule::default().optimize(plan).unwrap();
        match &plan {
            LogicalPlan::Filter { predicate, input } => {
                assert_eq!(&col("a").gt(lit(2i64)), predicate);
                assert_eq!(Some(&col("b").gt(lit(4i64))), scan_predicate(input));
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn aggregate_filter_not_moved() {
        let predicate = col("a").gt(col("a").mean());
        let plan = filter(
            LogicalPlan::Sort {
                input: Box::new(scan()),
                by: vec!["a".to_string()],
                descending: vec![false],
                nulls_last: false,
            },
            predicate.clone(),
        );
        let plan = FilterPushdownRule::default().optimize(plan).unwrap();
        assert_eq!("Filter", plan.name());
        assert_eq!(None, scan_predicate(&plan));
    }

    #[test]
    fn filter_not_moved_past_slice() {
        let plan = filter(
            LogicalPlan::Slice {
                input: Box::new(scan()),
                offset: 0,
                len: 2,
            },
            col("a").gt(lit(1i64)),
        );
        let plan = FilterPushdownRule::default().optimize(plan).unwrap();
        assert_eq!("Filter", plan.name());
        assert_eq!(None, scan_predicate(&plan));
    }

    #[test]
    fn join_sides() {
        let right = LogicalPlan::scan_table(
            Table::try_new(vec![
                Column::from_slice("a", &[1i64, 2]),
                Column::from_slice("c", &[7i64, 8]),
            ])
            .unwrap(),
        );
        let plan = filter(
            LogicalPlan::Join {
                left: Box::new(scan()),
                right: Box::new(right),
                args: JoinArgs::new(JoinType::Inner).on(&["a"]),
            },
            col("b")
                .gt(lit(4i64))
                .and(col("c").eq(lit(8i64)))
                .and(col("b").lt(col("c"))),
        );
        let plan = FilterPushdownRule::default().optimize(plan).unwrap();
        let LogicalPlan::Filter { predicate, input } = &plan else {
            panic!("unexpected plan: {plan:?}");
        };
        assert_eq!(&col("b").lt(col("c")), predicate);
        let LogicalPlan::Join { left, right, .. } = input.as_ref() else {
            panic!("unexpected plan: {input:?}");
        };
        assert_eq!(Some(&col("b").gt(lit(4i64))), scan_predicate(left));
        assert_eq!(Some(&col("c").eq(lit(8i64))), scan_predicate(right));
    }
}
