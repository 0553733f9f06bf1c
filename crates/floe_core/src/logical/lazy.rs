use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use floe_error::Result;
use tracing::debug;

use super::executor::execute;
use super::explain::ExplainNode;
use super::plan::{LogicalPlan, ScanSource};
use crate::arrays::schema::Schema;
use crate::expr::Expr;
use crate::frame::ops::{DEFAULT_ROW_COUNT_NAME, UniqueKeep};
use crate::frame::reshape::MeltArgs;
use crate::frame::{FromTable, Table};
use crate::join::{AsofOptions, JoinArgs, JoinType};
use crate::optimizer::Optimizer;
use crate::runtime::ExecutionContext;
use crate::source::TableSource;

/// A query that runs when collected.
///
/// Every method returns a new frame wrapping a larger plan. Nothing is
/// read or computed until [`LazyFrame::collect`].
pub struct LazyFrame<F: FromTable = Table> {
    plan: LogicalPlan,
    _frame: PhantomData<fn() -> F>,
}

impl<F: FromTable> Clone for LazyFrame<F> {
    fn clone(&self) -> Self {
        Self::from_plan(self.plan.clone())
    }
}

impl<F: FromTable> fmt::Debug for LazyFrame<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyFrame").field("plan", &self.plan).finish()
    }
}

impl LazyFrame<Table> {
    pub fn scan_table(table: Table) -> Self {
        Self::from_plan(LogicalPlan::scan_table(table))
    }

    pub fn scan_source(source: Arc<dyn TableSource>) -> Self {
        Self::from_plan(LogicalPlan::Scan {
            source: ScanSource::Source(source),
            projection: None,
            predicate: None,
        })
    }
}

impl<F: FromTable> LazyFrame<F> {
    pub fn from_plan(plan: LogicalPlan) -> Self {
        LazyFrame {
            plan,
            _frame: PhantomData,
        }
    }

    /// Collect into a different frame type.
    pub fn into_frame_type<G: FromTable>(self) -> LazyFrame<G> {
        LazyFrame::from_plan(self.plan)
    }

    pub fn plan(&self) -> &LogicalPlan {
        &self.plan
    }

    pub fn into_plan(self) -> LogicalPlan {
        self.plan
    }

    fn wrap(self, f: impl FnOnce(Box<LogicalPlan>) -> LogicalPlan) -> Self {
        Self::from_plan(f(Box::new(self.plan)))
    }

    pub fn select(self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        let exprs = exprs.into_iter().collect();
        self.wrap(|input| LogicalPlan::Select { input, exprs })
    }

    pub fn with_column(self, expr: Expr) -> Self {
        self.with_columns([expr])
    }

    pub fn with_columns(self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        let exprs = exprs.into_iter().collect();
        self.wrap(|input| LogicalPlan::WithColumns { input, exprs })
    }

    pub fn filter(self, predicate: Expr) -> Self {
        self.wrap(|input| LogicalPlan::Filter { input, predicate })
    }

    /// Group by key expressions. Group order in the output is unspecified.
    pub fn groupby(self, keys: impl IntoIterator<Item = Expr>) -> LazyGroupBy<F> {
        LazyGroupBy {
            frame: self,
            keys: keys.into_iter().collect(),
            maintain_order: false,
        }
    }

    /// Group by key expressions, emitting groups in first seen order.
    pub fn groupby_stable(self, keys: impl IntoIterator<Item = Expr>) -> LazyGroupBy<F> {
        LazyGroupBy {
            frame: self,
            keys: keys.into_iter().collect(),
            maintain_order: true,
        }
    }

    pub fn join<G: FromTable, S: AsRef<str>>(
        self,
        other: LazyFrame<G>,
        left_on: &[S],
        right_on: &[S],
        how: JoinType,
    ) -> Self {
        let args = JoinArgs::new(how).left_on(left_on).right_on(right_on);
        self.join_with(other, args)
    }

    pub fn join_with<G: FromTable>(self, other: LazyFrame<G>, args: JoinArgs) -> Self {
        Self::from_plan(LogicalPlan::Join {
            left: Box::new(self.plan),
            right: Box::new(other.plan),
            args,
        })
    }

    pub fn join_asof<G: FromTable>(
        self,
        other: LazyFrame<G>,
        left_on: &str,
        right_on: &str,
        options: AsofOptions,
    ) -> Self {
        let args = JoinArgs::new(JoinType::Asof)
            .left_on(&[left_on])
            .right_on(&[right_on])
            .with_asof(options);
        self.join_with(other, args)
    }

    pub fn sort<S: AsRef<str>>(self, by: &[S], descending: &[bool], nulls_last: bool) -> Self {
        let by = by.iter().map(|s| s.as_ref().to_string()).collect();
        let descending = descending.to_vec();
        self.wrap(|input| LogicalPlan::Sort {
            input,
            by,
            descending,
            nulls_last,
        })
    }

    pub fn distinct<S: AsRef<str>>(self, subset: Option<&[S]>, keep: UniqueKeep, maintain_order: bool) -> Self {
        let subset = subset.map(|s| s.iter().map(|n| n.as_ref().to_string()).collect());
        self.wrap(|input| LogicalPlan::Distinct {
            input,
            subset,
            keep,
            maintain_order,
        })
    }

    pub fn melt(self, args: MeltArgs) -> Self {
        self.wrap(|input| LogicalPlan::Melt { input, args })
    }

    pub fn explode<S: AsRef<str>>(self, columns: &[S]) -> Self {
        let columns = columns.iter().map(|s| s.as_ref().to_string()).collect();
        self.wrap(|input| LogicalPlan::Explode { input, columns })
    }

    pub fn slice(self, offset: i64, len: usize) -> Self {
        self.wrap(|input| LogicalPlan::Slice { input, offset, len })
    }

    pub fn head(self, n: usize) -> Self {
        self.slice(0, n)
    }

    pub fn tail(self, n: usize) -> Self {
        self.slice(-i64::try_from(n).unwrap_or(i64::MAX), n)
    }

    /// Apply a function to the frame, for chaining user defined steps.
    pub fn pipe<T>(self, f: impl FnOnce(LazyFrame<F>) -> T) -> T {
        f(self)
    }

    pub fn rename<S: AsRef<str>>(self, mapping: &[(S, S)]) -> Self {
        let mapping = mapping
            .iter()
            .map(|(old, new)| (old.as_ref().to_string(), new.as_ref().to_string()))
            .collect();
        self.wrap(|input| LogicalPlan::Rename { input, mapping })
    }

    pub fn drop<S: AsRef<str>>(self, columns: &[S]) -> Self {
        let columns = columns.iter().map(|s| s.as_ref().to_string()).collect();
        self.wrap(|input| LogicalPlan::Drop { input, columns })
    }

    pub fn with_row_count(self, name: Option<&str>) -> Self {
        let name = name.unwrap_or(DEFAULT_ROW_COUNT_NAME).to_string();
        self.wrap(|input| LogicalPlan::WithRowCount { input, name })
    }

    /// Output schema, resolved without reading any rows.
    pub fn schema(&self) -> Result<Schema> {
        self.plan.schema()
    }

    /// Indented text description of the unoptimized plan.
    pub fn describe_plan(&self) -> String {
        ExplainNode::walk(&self.plan).to_string()
    }

    pub fn describe_optimized_plan(&self) -> Result<String> {
        let plan = Optimizer::new().optimize(self.plan.clone())?;
        Ok(ExplainNode::walk(&plan).to_string())
    }

    pub fn collect(self) -> Result<F> {
        self.collect_with(ExecutionContext::global()?)
    }

    pub fn collect_with(self, ctx: &ExecutionContext) -> Result<F> {
        let plan = if ctx.config.optimize {
            Optimizer::new().optimize(self.plan)?
        } else {
            self.plan
        };
        debug!(plan = %plan, "collecting lazy frame");
        let table = execute(&plan, ctx)?;
        Ok(F::from_table(table))
    }
}

/// A lazy frame waiting for aggregations.
#[derive(Debug)]
pub struct LazyGroupBy<F: FromTable = Table> {
    frame: LazyFrame<F>,
    keys: Vec<Expr>,
    maintain_order: bool,
}

impl<F: FromTable> LazyGroupBy<F> {
    pub fn agg(self, aggs: impl IntoIterator<Item = Expr>) -> LazyFrame<F> {
        let keys = self.keys;
        let aggs = aggs.into_iter().collect();
        let maintain_order = self.maintain_order;
        self.frame.wrap(|input| LogicalPlan::GroupByAgg {
            input,
            keys,
            aggs,
            maintain_order,
        })
    }
}

#[cfg(test)]
mod tests {
    use floe_error::ErrorKind;

    use super::*;
    use crate::arrays::datatype::DataType;
    use crate::column::Column;
    use crate::config::ExecutionConfig;
    use crate::expr::{col, lit};
    use crate::frame::FrameOps;

    fn table() -> Table {
        Table::try_new(vec![
            Column::from_slice("a", &[3i64, 1, 2, 1]),
            Column::from_strs("b", &["x", "y", "z", "w"]),
        ])
        .unwrap()
    }

    #[test]
    fn chain_matches_eager() {
        let out = table()
            .lazy()
            .filter(col("a").gt(lit(1i64)))
            .with_column((col("a") * lit(10i64)).alias("c"))
            .sort(&["a"], &[false], false)
            .collect()
            .unwrap();
        assert_eq!(vec!["a", "b", "c"], out.column_names());
        assert_eq!(vec![Some(20), Some(30)], out.column("c").unwrap().native_values::<i64>().unwrap());
    }

    #[test]
    fn schema_without_execution() {
        let lf = table()
            .lazy()
            .groupby_stable([col("a")])
            .agg([col("b").first().alias("first_b"), col("b")])
            .with_row_count(None);
        let schema = lf.schema().unwrap();
        assert_eq!(vec!["row_nr", "a", "first_b", "b"], schema.names().collect::<Vec<_>>());
        assert_eq!(DataType::list(DataType::Utf8), schema.try_get("b").unwrap().datatype);

        let out = lf.collect().unwrap();
        assert_eq!(schema, out.schema());
        assert_eq!(vec![Some(3), Some(1), Some(2)], out.column("a").unwrap().native_values::<i64>().unwrap());
    }

    #[test]
    fn head_tail_slice() {
        let out = table().lazy().tail(2).collect().unwrap();
        assert_eq!(vec![Some(2), Some(1)], out.column("a").unwrap().native_values::<i64>().unwrap());
        let out = table().lazy().head(0).collect().unwrap();
        assert_eq!((0, 2), out.shape());

        let out = table().lazy().tail(usize::MAX).collect().unwrap();
        assert_eq!(vec![Some(3), Some(1), Some(2), Some(1)], out.column("a").unwrap().native_values::<i64>().unwrap());
    }

    #[test]
    fn optimizer_can_be_disabled() {
        let config = ExecutionConfig {
            optimize: false,
            ..ExecutionConfig::default()
        };
        let ctx = ExecutionContext::try_new(config).unwrap();
        let out = table()
            .lazy()
            .select([col("a") + lit(1i64) + lit(2i64)])
            .collect_with(&ctx)
            .unwrap();
        assert_eq!(vec![Some(6), Some(4), Some(5), Some(4)], out.column("a").unwrap().native_values::<i64>().unwrap());
    }

    #[test]
    fn errors_surface_on_collect() {
        let lf = table().lazy().select([col("missing")]);
        assert_eq!(ErrorKind::NotFound, lf.clone().collect().unwrap_err().kind());
        assert_eq!(ErrorKind::NotFound, lf.schema().unwrap_err().kind());
    }

    #[test]
    fn describe() {
        let lf = table().lazy().filter(col("a").eq(lit(1i64))).select([col("b")]);
        let text = lf.describe_plan();
        assert!(text.starts_with("Select"));
        let optimized = lf.describe_optimized_plan().unwrap();
        assert!(optimized.contains("Scan"));
        assert!(!optimized.contains("Filter"));
    }

    #[test]
    fn pipe_user_step() {
        fn big(lf: LazyFrame) -> LazyFrame {
            lf.filter(col("a").gt(lit(1i64)))
        }
        let out = table().lazy().pipe(big).collect().unwrap();
        assert_eq!(2, out.height());
    }
}
