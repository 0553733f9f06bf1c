use floe_error::{DbError, ErrorKind, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::{Rng, seq::index};
use tracing::trace;

use super::{Table, check_unique_names};
use crate::arrays::array::Array;
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::column::aggregate::AggregateKind;
use crate::column::fill::FillNullStrategy;
use crate::column::hash::hash_columns;
use crate::column::sort::{SortOptions, arg_sort_multi};
use crate::column::{Column, IsSorted};
use crate::groupby::compute_groups;
use crate::runtime::ExecutionContext;

/// Which row to keep when removing duplicate rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UniqueKeep {
    #[default]
    First,
    Last,
}

pub const DEFAULT_ROW_COUNT_NAME: &str = "row_nr";

impl Table {
    fn map_columns(&self, f: impl Fn(&Column) -> Result<Column>) -> Result<Table> {
        let columns = self.columns.iter().map(f).collect::<Result<Vec<_>>>()?;
        Ok(Table::new_unchecked(columns))
    }

    pub fn head(&self, n: usize) -> Table {
        Table::new_unchecked(self.columns.iter().map(|c| c.head(n)).collect())
    }

    pub fn tail(&self, n: usize) -> Table {
        Table::new_unchecked(self.columns.iter().map(|c| c.tail(n)).collect())
    }

    /// Zero-copy slice of rows. Negative offsets count from the end.
    pub fn slice(&self, offset: i64, len: usize) -> Table {
        Table::new_unchecked(self.columns.iter().map(|c| c.slice(offset, len)).collect())
    }

    /// Keep rows where the mask is true.
    pub fn filter(&self, mask: &Column) -> Result<Table> {
        if mask.len() != self.height() && self.width() > 0 {
            return Err(DbError::shape("Filter mask length doesn't match table height")
                .with_field("mask", mask.len())
                .with_field("height", self.height()));
        }
        self.map_columns(|c| c.filter(mask))
    }

    pub fn take(&self, indices: &[usize]) -> Result<Table> {
        self.map_columns(|c| c.take(indices))
    }

    pub(crate) fn take_opt(&self, indices: &[Option<usize>]) -> Result<Table> {
        self.map_columns(|c| c.take_opt(indices))
    }

    /// Select columns by name in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let columns = self
            .columns_by_name(names)?
            .into_iter()
            .cloned()
            .collect();
        Table::try_new(columns)
    }

    /// Add a column, replacing any existing column with the same name.
    /// Length one columns are broadcast to the table height.
    pub fn with_column(&self, column: Column) -> Result<Table> {
        let mut table = self.clone();
        table.upsert_column(column)?;
        Ok(table)
    }

    pub fn with_columns(&self, columns: Vec<Column>) -> Result<Table> {
        check_unique_names(columns.iter().map(|c| c.name()))?;
        let mut table = self.clone();
        for column in columns {
            table.upsert_column(column)?;
        }
        Ok(table)
    }

    fn upsert_column(&mut self, column: Column) -> Result<()> {
        let column = if self.width() == 0 {
            column
        } else if column.len() == 1 && self.height() != 1 {
            column.broadcast(self.height())?
        } else if column.len() != self.height() {
            return Err(DbError::shape("Column length doesn't match table height")
                .with_field("column", column.name())
                .with_field("len", column.len())
                .with_field("height", self.height()));
        } else {
            column
        };
        match self.index_of(column.name()) {
            Some(idx) => self.columns[idx] = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Table without the named column.
    pub fn drop(&self, name: &str) -> Result<Table> {
        let idx = self.try_index_of(name)?;
        let mut columns = self.columns.clone();
        columns.remove(idx);
        Ok(Table::new_unchecked(columns))
    }

    pub fn drop_many<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let mut table = self.clone();
        for name in names {
            table.drop_in_place(name.as_ref())?;
        }
        Ok(table)
    }

    /// Remove a column, returning it.
    pub fn drop_in_place(&mut self, name: &str) -> Result<Column> {
        let idx = self.try_index_of(name)?;
        Ok(self.columns.remove(idx))
    }

    /// Rename columns. All renames apply at once, so names can be swapped.
    pub fn rename<S: AsRef<str>>(&mut self, mapping: &[(S, S)]) -> Result<()> {
        let mut renamed = self.columns.clone();
        for (old, new) in mapping {
            let idx = self.try_index_of(old.as_ref())?;
            renamed[idx].rename(new.as_ref());
        }
        check_unique_names(renamed.iter().map(|c| c.name()))?;
        self.columns = renamed;
        Ok(())
    }

    /// Replace a column by name. The new column takes the replaced name.
    pub fn replace(&mut self, name: &str, column: Column) -> Result<()> {
        let idx = self.try_index_of(name)?;
        if column.len() != self.height() {
            return Err(DbError::shape("Replacement column length doesn't match table height")
                .with_field("len", column.len())
                .with_field("height", self.height()));
        }
        self.columns[idx] = column.with_name(name);
        Ok(())
    }

    pub fn insert_at(&mut self, idx: usize, column: Column) -> Result<()> {
        if idx > self.width() {
            return Err(DbError::shape("Insert position out of range")
                .with_field("index", idx)
                .with_field("width", self.width()));
        }
        if self.width() > 0 && column.len() != self.height() {
            return Err(DbError::shape("Column length doesn't match table height")
                .with_field("len", column.len())
                .with_field("height", self.height()));
        }
        if self.index_of(column.name()).is_some() {
            return Err(DbError::duplicate("Duplicate column name")
                .with_field("name", column.name().to_string()));
        }
        self.columns.insert(idx, column);
        Ok(())
    }

    /// Sort rows by one or more columns. `descending` holds either one flag
    /// for all keys or one per key.
    pub fn sort<S: AsRef<str>>(&self, by: &[S], descending: &[bool], nulls_last: bool) -> Result<Table> {
        let options = sort_options(by.len(), descending, nulls_last)?;
        let keys = self.columns_by_name(by)?;
        let indices = arg_sort_multi(&keys, &options)?;
        let mut out = self.take(&indices)?;
        if let (Some(first), Some(opts)) = (by.first(), options.first()) {
            let idx = out.try_index_of(first.as_ref())?;
            let flag = if opts.descending {
                IsSorted::Descending
            } else {
                IsSorted::Ascending
            };
            let col = out.columns[idx].clone().with_sorted(flag);
            out.columns[idx] = col;
        }
        Ok(out)
    }

    pub fn shift(&self, periods: i64) -> Result<Table> {
        self.map_columns(|c| c.shift(periods))
    }

    pub fn shift_and_fill(&self, periods: i64, fill: &ScalarValue) -> Result<Table> {
        self.map_columns(|c| c.shift_and_fill(periods, fill))
    }

    /// Fill nulls in every column. Numeric strategies only touch numeric
    /// columns.
    pub fn fill_null(&self, strategy: &FillNullStrategy) -> Result<Table> {
        let numeric_only = matches!(
            strategy,
            FillNullStrategy::Mean | FillNullStrategy::Zero | FillNullStrategy::One
        );
        self.map_columns(|c| {
            if numeric_only && !c.datatype().is_numeric() {
                Ok(c.clone())
            } else {
                c.fill_null(strategy)
            }
        })
    }

    pub fn fill_nan(&self, value: &ScalarValue) -> Result<Table> {
        self.map_columns(|c| c.fill_nan(value))
    }

    /// Drop rows containing a null in any of the subset columns (all columns
    /// by default).
    pub fn drop_nulls<S: AsRef<str>>(&self, subset: Option<&[S]>) -> Result<Table> {
        let columns = match subset {
            Some(names) => self.columns_by_name(names)?,
            None => self.columns.iter().collect(),
        };
        let mut mask = vec![true; self.height()];
        for col in columns {
            for (keep, valid) in mask.iter_mut().zip(col.validity_iter()) {
                *keep &= valid;
            }
        }
        self.filter(&Column::from_bools("mask", &mask))
    }

    /// One row table holding the null count of each column.
    pub fn null_count(&self) -> Table {
        Table::new_unchecked(
            self.columns
                .iter()
                .map(|c| Column::from_slice(c.name(), &[c.null_count() as u32]))
                .collect(),
        )
    }

    fn row_group_counts(&self) -> Result<Vec<bool>> {
        let ctx = ExecutionContext::global()?;
        let keys: Vec<&Column> = self.columns.iter().collect();
        let groups = compute_groups(&keys, true, ctx)?;
        let mut duplicated = vec![false; self.height()];
        for group in groups.iter() {
            if group.len() > 1 {
                for row in group {
                    duplicated[row] = true;
                }
            }
        }
        Ok(duplicated)
    }

    /// Mask of rows that appear more than once.
    pub fn is_duplicated(&self) -> Result<Column> {
        Ok(Column::from_bools("is_duplicated", &self.row_group_counts()?))
    }

    pub fn is_unique(&self) -> Result<Column> {
        let unique: Vec<bool> = self.row_group_counts()?.into_iter().map(|d| !d).collect();
        Ok(Column::from_bools("is_unique", &unique))
    }

    /// Remove duplicate rows considering the subset columns (all columns by
    /// default). Kept rows stay in their original order.
    pub fn distinct<S: AsRef<str>>(
        &self,
        subset: Option<&[S]>,
        keep: UniqueKeep,
        maintain_order: bool,
    ) -> Result<Table> {
        if self.width() == 0 {
            return Ok(self.clone());
        }
        let keys = match subset {
            Some(names) => self.columns_by_name(names)?,
            None => self.columns.iter().collect(),
        };
        let ctx = ExecutionContext::global()?;
        let groups = compute_groups(&keys, maintain_order, ctx)?;
        let mut rows: Vec<usize> = groups
            .iter()
            .filter_map(|group| match keep {
                UniqueKeep::First => group.clone().next(),
                UniqueKeep::Last => group.last(),
            })
            .collect();
        rows.sort_unstable();
        trace!(groups = rows.len(), "distinct rows");
        self.take(&rows)
    }

    /// Add a UInt32 row number column at the front.
    pub fn with_row_count(&self, name: Option<&str>) -> Result<Table> {
        let name = name.unwrap_or(DEFAULT_ROW_COUNT_NAME);
        let counts: Vec<u32> = (0..self.height() as u32).collect();
        let mut table = self.clone();
        table.insert_at(0, Column::from_slice(name, &counts))?;
        Ok(table)
    }

    /// Sample `n` rows.
    pub fn sample_n(&self, n: usize, with_replacement: bool, seed: Option<u64>) -> Result<Table> {
        let height = self.height();
        if !with_replacement && n > height {
            return Err(DbError::shape("Cannot sample more rows than the table has without replacement")
                .with_field("n", n)
                .with_field("height", height));
        }
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let indices: Vec<usize> = if with_replacement {
            if height == 0 && n > 0 {
                return Err(DbError::shape("Cannot sample from an empty table"));
            }
            (0..n).map(|_| rng.random_range(0..height)).collect()
        } else {
            index::sample(&mut rng, height, n).into_vec()
        };
        self.take(&indices)
    }

    pub fn sample_frac(&self, frac: f64, with_replacement: bool, seed: Option<u64>) -> Result<Table> {
        if frac.is_nan() || frac < 0.0 {
            return Err(DbError::invalid_argument("Sample fraction must be non-negative")
                .with_field("frac", frac));
        }
        let n = (self.height() as f64 * frac) as usize;
        self.sample_n(n, with_replacement, seed)
    }

    /// Hash every row to a UInt64 column.
    pub fn hash_rows(&self) -> Result<Column> {
        let columns: Vec<&Column> = self.columns.iter().collect();
        let hashes = if columns.is_empty() {
            Vec::new()
        } else {
            hash_columns(&columns)?
        };
        Ok(Column::new("hash", Array::from_native(hashes)))
    }

    pub fn rechunk(&self) -> Result<Table> {
        self.map_columns(|c| c.rechunk())
    }

    /// Largest number of chunks of any column.
    pub fn n_chunks(&self) -> usize {
        self.columns.iter().map(|c| c.n_chunks()).max().unwrap_or(0)
    }

    pub fn shrink_to_fit(&mut self) -> Result<()> {
        for col in &mut self.columns {
            col.shrink_to_fit()?;
        }
        Ok(())
    }

    /// Check if two tables have the same names, types and values.
    pub fn frame_equal(&self, other: &Table, null_equal: bool) -> bool {
        self.shape() == other.shape()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.name() == b.name() && a.series_equal(b, null_equal))
    }

    /// One row table with an aggregate of every column. Columns that don't
    /// support the aggregate produce null.
    pub fn reduce_columns(&self, kind: AggregateKind) -> Result<Table> {
        self.map_columns(|c| match c.aggregate(kind) {
            Ok(out) => Ok(out),
            Err(e) if e.kind() == ErrorKind::Compute => {
                let datatype = match kind {
                    AggregateKind::NUnique | AggregateKind::Count => DataType::UInt32,
                    _ => c.datatype().clone(),
                };
                Ok(Column::full_null(c.name(), &datatype, 1))
            }
            Err(e) => Err(e),
        })
    }

    pub fn sum(&self) -> Result<Table> {
        self.reduce_columns(AggregateKind::Sum)
    }

    pub fn mean(&self) -> Result<Table> {
        self.reduce_columns(AggregateKind::Mean)
    }

    pub fn min(&self) -> Result<Table> {
        self.reduce_columns(AggregateKind::Min)
    }

    pub fn max(&self) -> Result<Table> {
        self.reduce_columns(AggregateKind::Max)
    }

    pub fn median(&self) -> Result<Table> {
        self.reduce_columns(AggregateKind::Median)
    }

    pub fn std(&self) -> Result<Table> {
        self.reduce_columns(AggregateKind::Std)
    }

    pub fn var(&self) -> Result<Table> {
        self.reduce_columns(AggregateKind::Var)
    }

    pub fn product(&self) -> Result<Table> {
        self.reduce_columns(AggregateKind::Product)
    }

    pub fn n_unique(&self) -> Result<Table> {
        self.reduce_columns(AggregateKind::NUnique)
    }

    /// Summary statistics, one row per statistic and one Float64 column per
    /// input column. Columns that aren't numeric or boolean are all null.
    pub fn describe(&self) -> Result<Table> {
        const STATS: [AggregateKind; 5] = [
            AggregateKind::Mean,
            AggregateKind::Std,
            AggregateKind::Min,
            AggregateKind::Max,
            AggregateKind::Median,
        ];

        let labels: Vec<&str> = STATS.iter().map(|kind| kind.name()).collect();
        let mut columns = vec![Column::from_strs("describe", &labels)];

        for column in &self.columns {
            let datatype = column.datatype();
            if !datatype.is_numeric() && *datatype != DataType::Boolean {
                columns.push(Column::full_null(column.name(), &DataType::Float64, STATS.len()));
                continue;
            }

            let floats = column.cast(&DataType::Float64)?;
            let values = STATS
                .iter()
                .map(|&kind| {
                    let out = floats.aggregate(kind)?.cast(&DataType::Float64)?;
                    Ok(out.native_values::<f64>()?.into_iter().next().flatten())
                })
                .collect::<Result<Vec<_>>>()?;
            columns.push(Column::from_opt(column.name(), values));
        }

        trace!(columns = self.width(), "described table");
        Table::try_new(columns)
    }

    /// Apply a function to the table, for chaining user defined steps.
    pub fn pipe<T>(&self, f: impl FnOnce(&Table) -> T) -> T {
        f(self)
    }
}

pub(crate) fn sort_options(keys: usize, descending: &[bool], nulls_last: bool) -> Result<Vec<SortOptions>> {
    match descending.len() {
        0 => Ok(vec![SortOptions { descending: false, nulls_last }; keys]),
        1 => Ok(vec![SortOptions { descending: descending[0], nulls_last }; keys]),
        n if n == keys => Ok(descending
            .iter()
            .map(|&descending| SortOptions { descending, nulls_last })
            .collect()),
        n => Err(DbError::invalid_argument("Number of descending flags must match number of sort keys")
            .with_field("keys", keys)
            .with_field("flags", n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::try_new(vec![
            Column::from_opt("a", vec![Some(3i64), None, Some(1), Some(3)]),
            Column::from_strs("b", &["x", "y", "z", "x"]),
        ])
        .unwrap()
    }

    #[test]
    fn sort_multi_key_sets_flag() {
        let sorted = table().sort(&["a", "b"], &[false], true).unwrap();
        assert_eq!(
            vec![ScalarValue::Int64(1), ScalarValue::Int64(3), ScalarValue::Int64(3), ScalarValue::Null],
            sorted.column("a").unwrap().to_scalars()
        );
        assert_eq!(IsSorted::Ascending, sorted.column("a").unwrap().sorted());
        let err = table().sort(&["a", "b"], &[true, false, true], false).unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, err.kind());
    }

    #[test]
    fn rename_swap_and_duplicate() {
        let mut t = table();
        t.rename(&[("a", "b"), ("b", "a")]).unwrap();
        assert_eq!(vec!["b", "a"], t.column_names());
        let err = t.rename(&[("a", "b")]).unwrap_err();
        assert_eq!(ErrorKind::Duplicate, err.kind());
    }

    #[test]
    fn with_column_broadcasts_and_replaces() {
        let t = table()
            .with_column(Column::from_slice("c", &[7i32]))
            .unwrap()
            .with_column(Column::from_slice("a", &[0i64, 0, 0, 0]))
            .unwrap();
        assert_eq!(vec!["a", "b", "c"], t.column_names());
        assert_eq!(4, t.column("c").unwrap().len());
        assert!(t.with_column(Column::from_slice("d", &[1i32, 2])).is_err());
    }

    #[test]
    fn distinct_keep_last() {
        let t = table();
        let first = t.distinct::<&str>(None, UniqueKeep::First, true).unwrap();
        assert_eq!(3, first.height());
        let last = t.distinct(Some(&["b"]), UniqueKeep::Last, true).unwrap();
        assert_eq!(
            vec![ScalarValue::from("y"), ScalarValue::from("z"), ScalarValue::from("x")],
            last.column("b").unwrap().to_scalars()
        );
    }

    #[test]
    fn duplicated_rows() {
        assert_eq!(
            vec![true, false, false, true],
            table().is_duplicated().unwrap().bool_mask().unwrap()
        );
    }

    #[test]
    fn row_count_and_insert() {
        let t = table().with_row_count(None).unwrap();
        assert_eq!("row_nr", t.columns()[0].name());
        assert_eq!(ScalarValue::UInt32(3), t.column("row_nr").unwrap().get(3).unwrap());
        let err = t.with_row_count(None).unwrap_err();
        assert_eq!(ErrorKind::Duplicate, err.kind());
    }

    #[test]
    fn sample_with_seed_is_repeatable() {
        let t = table();
        let a = t.sample_n(3, false, Some(42)).unwrap();
        let b = t.sample_n(3, false, Some(42)).unwrap();
        assert!(a.frame_equal(&b, true));
        assert!(t.sample_n(5, false, None).is_err());
        assert_eq!(8, t.sample_frac(2.0, true, Some(1)).unwrap().height());
    }

    #[test]
    fn reductions_null_for_strings() {
        let sums = table().sum().unwrap();
        assert_eq!(ScalarValue::Int64(7), sums.column("a").unwrap().get(0).unwrap());
        assert_eq!(ScalarValue::Null, sums.column("b").unwrap().get(0).unwrap());
        let nulls = table().null_count();
        assert_eq!(ScalarValue::UInt32(1), nulls.column("a").unwrap().get(0).unwrap());
    }

    #[test]
    fn drop_nulls_subset() {
        let t = table().drop_nulls(Some(&["a"])).unwrap();
        assert_eq!(3, t.height());
    }

    #[test]
    fn describe_numeric_and_other_columns() {
        let table = Table::try_new(vec![
            Column::from_slice("a", &[1.0f64, 2.8, 3.0]),
            Column::from_slice("b", &[4i64, 5, 6]),
            Column::from_bools("c", &[true, false, true]),
            Column::from_strs("d", &["x", "y", "z"]),
        ])
        .unwrap();

        let out = table.describe().unwrap();
        assert_eq!(vec!["describe", "a", "b", "c", "d"], out.column_names());
        assert_eq!(
            vec![ScalarValue::from("mean"), ScalarValue::from("std"), ScalarValue::from("min")],
            out.column("describe").unwrap().to_scalars()[..3].to_vec()
        );
        assert_eq!(
            vec![Some(5.0), Some(1.0), Some(4.0), Some(6.0), Some(5.0)],
            out.column("b").unwrap().native_values::<f64>().unwrap()
        );
        assert_eq!(Some(0.0), out.column("c").unwrap().native_values::<f64>().unwrap()[2]);
        assert_eq!(5, out.column("d").unwrap().null_count());
    }

    #[test]
    fn pipe_chains_steps() {
        let height = table().pipe(|t| t.head(2)).pipe(|t| t.height());
        assert_eq!(2, height);
    }
}
