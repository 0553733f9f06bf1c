use floe_error::Result;
use tracing::{debug, trace};

use super::plan::LogicalPlan;
use crate::expr::{Expr, expand_exprs};
use crate::frame::Table;
use crate::groupby::GroupBy;
use crate::runtime::ExecutionContext;

/// Execute a plan bottom up, materializing every node.
pub fn execute(plan: &LogicalPlan, ctx: &ExecutionContext) -> Result<Table> {
    trace!(node = plan.name(), "executing plan node");
    match plan {
        LogicalPlan::Scan {
            source,
            projection,
            predicate,
        } => {
            let table = source.read(projection.as_deref())?;
            debug!(source = source.name(), rows = table.height(), "scanned source");
            match predicate {
                Some(predicate) => table.filter_expr_with(predicate, ctx),
                None => Ok(table),
            }
        }
        LogicalPlan::Select { input, exprs } => execute(input, ctx)?.select_exprs_with(exprs, ctx),
        LogicalPlan::WithColumns { input, exprs } => execute(input, ctx)?.with_exprs_with(exprs, ctx),
        LogicalPlan::Filter { input, predicate } => execute(input, ctx)?.filter_expr_with(predicate, ctx),
        LogicalPlan::GroupByAgg {
            input,
            keys,
            aggs,
            maintain_order,
        } => {
            let table = execute(input, ctx)?;
            execute_groupby(table, keys, aggs, *maintain_order, ctx)
        }
        LogicalPlan::Join { left, right, args } => {
            let (left, right) = ctx.pool.join(|| execute(left, ctx), || execute(right, ctx));
            left?.join_in(&right?, args, ctx)
        }
        LogicalPlan::Sort {
            input,
            by,
            descending,
            nulls_last,
        } => execute(input, ctx)?.sort(by, descending, *nulls_last),
        LogicalPlan::Distinct {
            input,
            subset,
            keep,
            maintain_order,
        } => execute(input, ctx)?.distinct(subset.as_deref(), *keep, *maintain_order),
        LogicalPlan::Melt { input, args } => execute(input, ctx)?.melt_with(args),
        LogicalPlan::Explode { input, columns } => execute(input, ctx)?.explode(columns),
        LogicalPlan::Slice { input, offset, len } => Ok(execute(input, ctx)?.slice(*offset, *len)),
        LogicalPlan::Rename { input, mapping } => {
            let mut table = execute(input, ctx)?;
            table.rename(mapping)?;
            Ok(table)
        }
        LogicalPlan::Drop { input, columns } => execute(input, ctx)?.drop_many(columns),
        LogicalPlan::WithRowCount { input, name } => execute(input, ctx)?.with_row_count(Some(name.as_str())),
    }
}

/// Key expressions that aren't plain columns are computed and added to
/// the table before grouping.
fn execute_groupby(
    table: Table,
    keys: &[Expr],
    aggs: &[Expr],
    maintain_order: bool,
    ctx: &ExecutionContext,
) -> Result<Table> {
    let keys = expand_exprs(keys, &table.schema(), &[])?;
    let computed: Vec<Expr> = keys
        .iter()
        .filter(|k| !matches!(k, Expr::Column(_)))
        .cloned()
        .collect();
    let table = if computed.is_empty() {
        table
    } else {
        table.with_exprs_with(&computed, ctx)?
    };
    let names = keys.iter().map(|k| k.output_name()).collect::<Result<Vec<_>>>()?;
    GroupBy::try_new_with_order(&table, names, maintain_order, ctx)?.agg(aggs)
}
