use floe_error::Result;
use tracing::trace;

use super::{OptimizeRule, map_children};
use crate::expr::{Expr, expand_exprs};
use crate::logical::plan::{LogicalPlan, ScanSource};

/// Restrict scans to the columns read by a select or aggregation directly
/// above them.
#[derive(Debug)]
pub struct ProjectionPushdown;

impl OptimizeRule for ProjectionPushdown {
    fn optimize(&mut self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let mut plan = map_children(plan, &mut |child| self.optimize(child))?;
        match &mut plan {
            LogicalPlan::Select { input, exprs } => project_scan(input, exprs),
            LogicalPlan::GroupByAgg { input, keys, aggs, .. } => {
                let exprs: Vec<Expr> = keys.iter().chain(aggs.iter()).cloned().collect();
                project_scan(input, &exprs)
            }
            _ => {}
        }
        Ok(plan)
    }
}

fn project_scan(input: &mut LogicalPlan, exprs: &[Expr]) {
    let LogicalPlan::Scan {
        source,
        projection: projection @ None,
        predicate,
    } = input
    else {
        return;
    };
    let Some(columns) = needed_columns(source, exprs, predicate.as_ref()) else {
        return;
    };
    trace!(source = source.name(), ?columns, "pushed projection into scan");
    *projection = Some(columns);
}

/// Columns read by the expressions and the scan predicate, in source order.
/// `None` when every column is needed or nothing is read at all.
fn needed_columns(source: &ScanSource, exprs: &[Expr], predicate: Option<&Expr>) -> Option<Vec<String>> {
    let schema = source.schema().ok()?;
    let exprs = expand_exprs(exprs, &schema, &[]).ok()?;
    let mut referenced: Vec<String> = exprs.iter().flat_map(|e| e.referenced_columns()).collect();
    if let Some(predicate) = predicate {
        referenced.extend(predicate.referenced_columns());
    }

    let columns: Vec<String> = schema
        .names()
        .filter(|name| referenced.iter().any(|r| r == name))
        .map(str::to_string)
        .collect();
    if columns.is_empty() || columns.len() == schema.len() {
        return None;
    }
    Some(columns)
}
