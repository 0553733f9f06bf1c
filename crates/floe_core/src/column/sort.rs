use std::cmp::Ordering;

use floe_error::{DbError, Result};
use hashbrown::raw::RawTable;

use super::hash::RowKeys;
use super::{Column, IsSorted};
use crate::arrays::array::Array;
use crate::arrays::native::NativeType;
use crate::arrays::scalar::ScalarValue;
use crate::dispatch_native_type;

/// Options for sorting by one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortOptions {
    pub descending: bool,
    pub nulls_last: bool,
}

/// Row comparisons for a single sort key.
trait SortKey {
    fn is_null(&self, idx: usize) -> bool;
    /// Compare two non-null rows.
    fn compare(&self, a: usize, b: usize) -> Ordering;
}

struct NativeKey<T> {
    values: Vec<Option<T>>,
}

impl<T: NativeType> SortKey for NativeKey<T> {
    fn is_null(&self, idx: usize) -> bool {
        self.values[idx].is_none()
    }

    fn compare(&self, a: usize, b: usize) -> Ordering {
        match (&self.values[a], &self.values[b]) {
            (Some(a), Some(b)) => a.total_cmp(b),
            _ => Ordering::Equal,
        }
    }
}

struct ScalarKey {
    values: Vec<ScalarValue>,
}

impl SortKey for ScalarKey {
    fn is_null(&self, idx: usize) -> bool {
        self.values[idx].is_null()
    }

    fn compare(&self, a: usize, b: usize) -> Ordering {
        self.values[a].total_cmp(&self.values[b])
    }
}

fn sort_key(col: &Column) -> Result<Box<dyn SortKey>> {
    if !col.datatype().is_orderable() {
        return Err(DbError::new("Cannot sort column with unorderable datatype")
            .with_field("column", col.name())
            .with_field("datatype", col.datatype()));
    }
    dispatch_native_type!(col.datatype(), T => {
        Ok(Box::new(NativeKey::<T> { values: col.native_values::<T>()? }) as Box<dyn SortKey>)
    }, _ => Ok(Box::new(ScalarKey { values: col.to_scalars() }) as Box<dyn SortKey>))
}

fn compare_rows(
    keys: &[Box<dyn SortKey>],
    options: &[SortOptions],
    a: usize,
    b: usize,
) -> Ordering {
    for (key, opts) in keys.iter().zip(options) {
        let ord = match (key.is_null(a), key.is_null(b)) {
            (true, true) => Ordering::Equal,
            (true, false) if opts.nulls_last => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, true) if opts.nulls_last => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => {
                let ord = key.compare(a, b);
                if opts.descending { ord.reverse() } else { ord }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Compute the stable permutation that sorts rows by the given columns.
pub fn arg_sort_multi(columns: &[&Column], options: &[SortOptions]) -> Result<Vec<usize>> {
    if columns.len() != options.len() {
        return Err(DbError::invalid_argument(
            "Number of sort options must match number of sort columns",
        )
        .with_field("columns", columns.len())
        .with_field("options", options.len()));
    }
    let len = columns.first().map(|c| c.len()).unwrap_or(0);
    if let Some(bad) = columns.iter().find(|c| c.len() != len) {
        return Err(DbError::shape("Sort columns have different lengths")
            .with_field("expected", len)
            .with_field("column", bad.name()));
    }

    let keys = columns
        .iter()
        .map(|c| sort_key(c))
        .collect::<Result<Vec<_>>>()?;
    let mut indices: Vec<usize> = (0..len).collect();
    indices.sort_by(|&a, &b| compare_rows(&keys, options, a, b));
    Ok(indices)
}

impl Column {
    pub fn arg_sort(&self, options: SortOptions) -> Result<Vec<usize>> {
        arg_sort_multi(&[self], &[options])
    }

    /// Sort values, recording the sort order on the output.
    pub fn sort(&self, options: SortOptions) -> Result<Column> {
        let indices = self.arg_sort(options)?;
        let sorted = if options.descending {
            IsSorted::Descending
        } else {
            IsSorted::Ascending
        };
        Ok(self.take(&indices)?.with_sorted(sorted))
    }

    /// Check if values are in ascending order, ignoring nulls.
    pub fn is_sorted_ascending(&self) -> Result<bool> {
        let key = sort_key(self)?;
        let mut prev: Option<usize> = None;
        for idx in 0..self.len() {
            if key.is_null(idx) {
                continue;
            }
            if let Some(p) = prev {
                if key.compare(p, idx) == Ordering::Greater {
                    return Ok(false);
                }
            }
            prev = Some(idx);
        }
        Ok(true)
    }

    /// Group id of every row plus the first row of each group. Group ids are
    /// assigned in order of first occurrence.
    fn distinct_rows(&self) -> Result<(Vec<usize>, Vec<usize>)> {
        let keys = RowKeys::try_new(&[self])?;
        let mut table: RawTable<(u64, usize)> = RawTable::new();
        let mut firsts = Vec::new();
        let mut group_ids = Vec::with_capacity(keys.len());
        for row in 0..keys.len() {
            let hash = keys.hash(row);
            match table.get(hash, |(h, g)| *h == hash && keys.rows_eq(firsts[*g], row)) {
                Some(&(_, group)) => group_ids.push(group),
                None => {
                    table.insert(hash, (hash, firsts.len()), |(h, _)| *h);
                    group_ids.push(firsts.len());
                    firsts.push(row);
                }
            }
        }
        Ok((firsts, group_ids))
    }

    /// Distinct values in order of first occurrence.
    pub fn unique(&self) -> Result<Column> {
        let (firsts, _) = self.distinct_rows()?;
        self.take(&firsts)
    }

    /// Number of distinct values, counting null as a value.
    pub fn n_unique(&self) -> Result<usize> {
        Ok(self.distinct_rows()?.0.len())
    }

    fn duplicated_mask(&self, want_duplicated: bool) -> Result<Column> {
        let (firsts, group_ids) = self.distinct_rows()?;
        let mut counts = vec![0usize; firsts.len()];
        for &group in &group_ids {
            counts[group] += 1;
        }
        let out = group_ids
            .iter()
            .map(|&group| (counts[group] > 1) == want_duplicated)
            .collect();
        Ok(Column::new(self.name(), Array::from_bools(out)))
    }

    /// True for every value appearing more than once.
    pub fn is_duplicated(&self) -> Result<Column> {
        self.duplicated_mask(true)
    }

    /// True for every value appearing exactly once.
    pub fn is_unique(&self) -> Result<Column> {
        self.duplicated_mask(false)
    }
}
