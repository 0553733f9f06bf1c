use floe_error::Result;
use hashbrown::HashMap;

use super::GroupBy;
use crate::arrays::scalar::ScalarValue;
use crate::column::Column;
use crate::column::aggregate::{AggregateKind, Reducer};
use crate::column::sort::SortOptions;
use crate::frame::Table;
use crate::groupby::compute_groups;

/// Aggregate used to fill pivoted cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotAgg {
    First,
    Last,
    Sum,
    Min,
    Max,
    Mean,
    Median,
    Count,
}

impl PivotAgg {
    pub fn kind(&self) -> AggregateKind {
        match self {
            Self::First => AggregateKind::First,
            Self::Last => AggregateKind::Last,
            Self::Sum => AggregateKind::Sum,
            Self::Min => AggregateKind::Min,
            Self::Max => AggregateKind::Max,
            Self::Mean => AggregateKind::Mean,
            Self::Median => AggregateKind::Median,
            Self::Count => AggregateKind::Count,
        }
    }
}

/// A grouped table whose values are spread over one column per distinct
/// pivot value.
#[derive(Debug)]
pub struct Pivot<'a> {
    groupby: &'a GroupBy<'a>,
    pivot_column: String,
    values_columns: Vec<String>,
    sort_columns: bool,
}

impl<'a> Pivot<'a> {
    pub(crate) fn new(groupby: &'a GroupBy<'a>, pivot_column: &str, values_column: &str) -> Self {
        Pivot {
            groupby,
            pivot_column: pivot_column.to_string(),
            values_columns: vec![values_column.to_string()],
            sort_columns: false,
        }
    }

    /// Pivot several value columns at once. Output columns are then named
    /// `{value}_{pivot value}`.
    pub fn with_values_columns(mut self, values: Vec<String>) -> Self {
        self.values_columns = values;
        self
    }

    /// Order the pivoted columns by pivot value instead of first
    /// occurrence.
    pub fn sort_columns(mut self, sort: bool) -> Self {
        self.sort_columns = sort;
        self
    }

    pub fn first(&self) -> Result<Table> {
        self.aggregate(PivotAgg::First)
    }

    pub fn last(&self) -> Result<Table> {
        self.aggregate(PivotAgg::Last)
    }

    pub fn sum(&self) -> Result<Table> {
        self.aggregate(PivotAgg::Sum)
    }

    pub fn min(&self) -> Result<Table> {
        self.aggregate(PivotAgg::Min)
    }

    pub fn max(&self) -> Result<Table> {
        self.aggregate(PivotAgg::Max)
    }

    pub fn mean(&self) -> Result<Table> {
        self.aggregate(PivotAgg::Mean)
    }

    pub fn median(&self) -> Result<Table> {
        self.aggregate(PivotAgg::Median)
    }

    pub fn count(&self) -> Result<Table> {
        self.aggregate(PivotAgg::Count)
    }

    /// Build the pivoted table. Cells with no rows are null.
    pub fn aggregate(&self, agg: PivotAgg) -> Result<Table> {
        let table = self.groupby.table();
        let pivot = table.column(&self.pivot_column)?;
        let pivot_groups = compute_groups(&[pivot], true, self.groupby.ctx())?;

        let mut pivot_of_row = vec![0; table.height()];
        for (idx, rows) in pivot_groups.iter().enumerate() {
            for row in rows {
                pivot_of_row[row] = idx;
            }
        }

        let mut order: Vec<usize> = (0..pivot_groups.len()).collect();
        let pivot_values = pivot.take(&pivot_groups.first_rows())?;
        if self.sort_columns {
            order = pivot_values.arg_sort(SortOptions::default())?;
        }

        // Rows of every (group, pivot value) cell.
        let groups = self.groupby.groups_proxy();
        let mut cells: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for (group, rows) in groups.iter().enumerate() {
            for row in rows {
                cells.entry((group, pivot_of_row[row])).or_default().push(row);
            }
        }

        let mut columns = self.groupby.keys_table()?.into_columns();
        for value_name in &self.values_columns {
            let reducer = Reducer::try_new(table.column(value_name)?, agg.kind())?;
            for &pivot_idx in &order {
                let label = value_label(&pivot_values.get(pivot_idx)?);
                let name = if self.values_columns.len() > 1 {
                    format!("{value_name}_{label}")
                } else {
                    label
                };

                let values = (0..groups.len())
                    .map(|group| match cells.get(&(group, pivot_idx)) {
                        Some(rows) => reducer.reduce(rows.iter().copied()),
                        None => Ok(ScalarValue::Null),
                    })
                    .collect::<Result<Vec<_>>>()?;
                columns.push(Column::from_scalars(name, reducer.output_type(), &values)?);
            }
        }
        Table::try_new(columns)
    }
}

/// Column name fragment for a value.
pub(crate) fn value_label(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Null => "null".to_string(),
        ScalarValue::Utf8(s) | ScalarValue::Categorical(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pivot_first_with_missing_cells() {
        let t = Table::try_new(vec![
            Column::from_strs("k", &["x", "x", "y"]),
            Column::from_strs("p", &["a", "b", "a"]),
            Column::from_slice("v", &[1i64, 2, 3]),
        ])
        .unwrap();
        let gb = t.groupby(&["k"]).unwrap();
        let out = gb.pivot("p", "v").first().unwrap();
        assert_eq!(vec!["k", "a", "b"], out.column_names());
        assert_eq!(vec![Some(1), Some(3)], out.column("a").unwrap().native_values::<i64>().unwrap());
        assert_eq!(vec![Some(2), None], out.column("b").unwrap().native_values::<i64>().unwrap());
    }

    #[test]
    fn pivot_sorted_columns_and_count() {
        let t = Table::try_new(vec![
            Column::from_slice("k", &[1i32, 1, 1, 2]),
            Column::from_slice("p", &[3i32, 1, 3, 1]),
            Column::from_slice("v", &[1.0f64, 2.0, 3.0, 4.0]),
        ])
        .unwrap();
        let gb = t.groupby(&["k"]).unwrap();
        let out = gb.pivot("p", "v").sort_columns(true).count().unwrap();
        assert_eq!(vec!["k", "1", "3"], out.column_names());
        assert_eq!(vec![Some(2), None], out.column("3").unwrap().native_values::<u32>().unwrap());
    }
}
