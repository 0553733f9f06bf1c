//! Rewrites applied to lazy plans before execution.

pub mod const_fold;
pub mod filter_pushdown;
pub mod projection_pushdown;

use floe_error::Result;
use tracing::trace;

use self::const_fold::ConstFold;
use self::filter_pushdown::FilterPushdownRule;
use self::projection_pushdown::ProjectionPushdown;
use crate::logical::plan::LogicalPlan;

#[derive(Debug, Default)]
pub struct Optimizer {}

impl Optimizer {
    pub fn new() -> Self {
        Optimizer {}
    }

    /// Run a logical plan through the optimizer.
    pub fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let plan = ConstFold.optimize(plan)?;
        trace!(%plan, "plan after constant folding");

        let plan = FilterPushdownRule::default().optimize(plan)?;
        trace!(%plan, "plan after filter pushdown");

        let plan = ProjectionPushdown.optimize(plan)?;
        trace!(%plan, "plan after projection pushdown");

        Ok(plan)
    }
}

pub trait OptimizeRule {
    /// Apply an optimization rule to the logical plan.
    fn optimize(&mut self, plan: LogicalPlan) -> Result<LogicalPlan>;
}

/// Replace every child of `plan` with the result of `f`.
pub(crate) fn map_children(
    mut plan: LogicalPlan,
    f: &mut impl FnMut(LogicalPlan) -> Result<LogicalPlan>,
) -> Result<LogicalPlan> {
    for child in plan.children_mut() {
        let orig = std::mem::replace(child, LogicalPlan::scan_table(Default::default()));
        *child = f(orig)?;
    }
    Ok(plan)
}
