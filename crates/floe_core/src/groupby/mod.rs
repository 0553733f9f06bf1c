//! Grouping rows by key columns and aggregating each group.

pub mod groups;
pub mod pivot;

use floe_error::{DbError, Result, catch_user_panic};
use tracing::debug;

pub use self::groups::{GroupIter, GroupsProxy, compute_groups};
pub use self::pivot::{Pivot, PivotAgg};
use crate::arrays::array::Array;
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::column::Column;
use crate::column::aggregate::AggregateKind;
use crate::column::cast::cast_scalar;
use crate::expr::eval::evaluate_groups;
use crate::expr::{Expr, col, expand_exprs};
use crate::frame::Table;
use crate::runtime::ExecutionContext;

/// Rows of a table grouped by one or more key columns.
///
/// Groups are ordered by the first row they appear in unless built with
/// `maintain_order` off.
#[derive(Debug)]
pub struct GroupBy<'a> {
    table: &'a Table,
    keys: Vec<String>,
    groups: GroupsProxy,
    ctx: &'a ExecutionContext,
}

impl Table {
    pub fn groupby<S: AsRef<str>>(&self, keys: &[S]) -> Result<GroupBy<'_>> {
        self.groupby_with(keys, ExecutionContext::global()?)
    }

    pub fn groupby_with<'a, S: AsRef<str>>(&'a self, keys: &[S], ctx: &'a ExecutionContext) -> Result<GroupBy<'a>> {
        GroupBy::try_new(self, keys.iter().map(|k| k.as_ref().to_string()).collect(), ctx)
    }
}

impl<'a> GroupBy<'a> {
    pub fn try_new(table: &'a Table, keys: Vec<String>, ctx: &'a ExecutionContext) -> Result<Self> {
        Self::try_new_with_order(table, keys, true, ctx)
    }

    pub fn try_new_with_order(
        table: &'a Table,
        keys: Vec<String>,
        maintain_order: bool,
        ctx: &'a ExecutionContext,
    ) -> Result<Self> {
        let key_columns = table.columns_by_name(&keys)?;
        let groups = compute_groups(&key_columns, maintain_order, ctx)?;
        debug!(keys = ?keys, groups = groups.len(), maintain_order, "grouped table");
        Ok(GroupBy {
            table,
            keys,
            groups,
            ctx,
        })
    }

    pub fn groups_proxy(&self) -> &GroupsProxy {
        &self.groups
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// One row per group holding the key values.
    pub fn keys_table(&self) -> Result<Table> {
        let first_rows = self.groups.first_rows();
        let columns = self
            .table
            .columns_by_name(&self.keys)?
            .into_iter()
            .map(|c| c.take(&first_rows))
            .collect::<Result<Vec<_>>>()?;
        Ok(Table::new_unchecked(columns))
    }

    fn value_columns(&self) -> Vec<&str> {
        self.table
            .column_names()
            .into_iter()
            .filter(|name| !self.keys.iter().any(|k| k == name))
            .collect()
    }

    /// Evaluate expressions per group. Wildcards expand to the non-key
    /// columns.
    pub fn agg(&self, exprs: &[Expr]) -> Result<Table> {
        let exprs = expand_exprs(exprs, &self.table.schema(), &self.keys)?;
        let mut columns = self.keys_table()?.into_columns();
        for expr in &exprs {
            columns.push(evaluate_groups(expr, self.table, &self.groups, self.ctx)?);
        }
        Table::try_new(columns)
    }

    /// Apply several aggregates per column. Output columns are named
    /// `{column}_{aggregate}`.
    pub fn agg_map<S: AsRef<str>>(&self, aggs: &[(S, &[AggregateKind])]) -> Result<Table> {
        let exprs: Vec<Expr> = aggs
            .iter()
            .flat_map(|(name, kinds)| {
                let name = name.as_ref();
                kinds
                    .iter()
                    .map(move |kind| col(name).aggregate(*kind).alias(format!("{name}_{kind}")))
            })
            .collect();
        self.agg(&exprs)
    }

    fn agg_values(&self, kind: AggregateKind) -> Result<Table> {
        let exprs: Vec<Expr> = self.value_columns().into_iter().map(|name| col(name).aggregate(kind)).collect();
        self.agg(&exprs)
    }

    pub fn first(&self) -> Result<Table> {
        self.agg_values(AggregateKind::First)
    }

    pub fn last(&self) -> Result<Table> {
        self.agg_values(AggregateKind::Last)
    }

    pub fn sum(&self) -> Result<Table> {
        self.agg_values(AggregateKind::Sum)
    }

    pub fn min(&self) -> Result<Table> {
        self.agg_values(AggregateKind::Min)
    }

    pub fn max(&self) -> Result<Table> {
        self.agg_values(AggregateKind::Max)
    }

    pub fn mean(&self) -> Result<Table> {
        self.agg_values(AggregateKind::Mean)
    }

    pub fn median(&self) -> Result<Table> {
        self.agg_values(AggregateKind::Median)
    }

    pub fn n_unique(&self) -> Result<Table> {
        self.agg_values(AggregateKind::NUnique)
    }

    /// Number of rows per group in a UInt32 `count` column.
    pub fn count(&self) -> Result<Table> {
        self.agg(&[Expr::Count])
    }

    /// Values of every non-key column collected into a list per group.
    pub fn agg_list(&self) -> Result<Table> {
        let exprs: Vec<Expr> = self.value_columns().into_iter().map(col).collect();
        self.agg(&exprs)
    }

    /// Keys plus a `groups` column listing the row indices of each group.
    pub fn groups(&self) -> Result<Table> {
        let parts = self
            .groups
            .iter()
            .map(|g| {
                let rows: Vec<u32> = g.map(|r| r as u32).collect();
                Some(Column::new("groups", Array::from_native(rows)))
            })
            .collect();
        let mut columns = self.keys_table()?.into_columns();
        columns.push(Column::from_list_parts("groups", Some(&DataType::UInt32), parts)?);
        Table::try_new(columns)
    }

    /// Rows of the group whose keys equal `key`.
    pub fn get_group(&self, key: &[ScalarValue]) -> Result<Table> {
        if key.len() != self.keys.len() {
            return Err(DbError::invalid_argument("Group key has wrong number of values")
                .with_field("expected", self.keys.len())
                .with_field("got", key.len()));
        }
        let keys = self.keys_table()?;
        let wanted = keys
            .columns()
            .iter()
            .zip(key)
            .map(|(c, v)| cast_scalar(v, c.datatype(), false))
            .collect::<Result<Vec<_>>>()?;

        for group in 0..self.groups.len() {
            let matches = keys
                .columns()
                .iter()
                .zip(&wanted)
                .map(|(c, v)| c.get(group).map(|k| &k == v))
                .collect::<Result<Vec<_>>>()?;
            if matches.into_iter().all(|m| m) {
                let rows: Vec<usize> = self.groups.get(group).collect();
                return self.table.take(&rows);
            }
        }

        let shown: Vec<String> = key.iter().map(|v| v.to_string()).collect();
        Err(DbError::not_found("Group not found").with_field("key", shown.join(", ")))
    }

    /// Run a function over the rows of every group and stack the results.
    pub fn apply(&self, f: impl Fn(Table) -> Result<Table> + Send + Sync) -> Result<Table> {
        let results = self.ctx.pool.try_map(self.groups.to_vecs(), |rows| {
            let sub = self.table.take(&rows)?;
            catch_user_panic(|| f(sub)).map_err(|e| DbError::with_source("Group function failed", Box::new(e)))
        })?;
        let mut iter = results.into_iter();
        let Some(mut out) = iter.next() else {
            return Ok(Table::empty_with_schema(&self.table.schema()));
        };
        for table in iter {
            out = out.vstack(&table)?;
        }
        Ok(out)
    }

    fn rows_per_group(&self, pick: impl Fn(GroupIter<'_>) -> Vec<usize>) -> Result<Table> {
        let rows: Vec<usize> = self.groups.iter().flat_map(pick).collect();
        let table = self.table.take(&rows)?;
        let keys = table.columns_by_name(&self.keys)?.into_iter().cloned();
        let values = table
            .columns()
            .iter()
            .filter(|c| !self.keys.iter().any(|k| k == c.name()))
            .cloned();
        Ok(Table::new_unchecked(keys.chain(values).collect()))
    }

    /// First `n` rows of every group, keys first.
    pub fn head(&self, n: usize) -> Result<Table> {
        self.rows_per_group(|g| g.take(n).collect())
    }

    /// Last `n` rows of every group, keys first.
    pub fn tail(&self, n: usize) -> Result<Table> {
        self.rows_per_group(|g| {
            let len = g.len();
            g.skip(len.saturating_sub(n)).collect()
        })
    }

    /// Spread the values of `values_column` into one column per distinct
    /// value of `pivot_column`.
    pub fn pivot(&self, pivot_column: &str, values_column: &str) -> Pivot<'_> {
        Pivot::new(self, pivot_column, values_column)
    }

    pub(crate) fn table(&self) -> &Table {
        self.table
    }

    pub(crate) fn ctx(&self) -> &ExecutionContext {
        self.ctx
    }
}
