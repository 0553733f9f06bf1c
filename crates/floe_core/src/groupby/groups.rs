//! Computing groups of rows with equal keys.
//!
//! Three strategies are used:
//!
//! - A single key column known to be sorted is split into runs of equal
//!   values without hashing.
//! - Keys with few distinct values are grouped in a single pass over a raw
//!   hash table holding `(hash, group index)` entries.
//! - Keys estimated to have many distinct values are split into partitions
//!   by hash, each partition grouped on the thread pool.
//!
//! Every strategy emits groups ordered by their first row, so results don't
//! depend on the strategy or the number of threads.

use std::ops::Range;

use floe_error::{DbError, Result};
use hashbrown::HashSet;
use hashbrown::raw::RawTable;
use tracing::debug;

use crate::column::hash::{RowKeys, partition_for_hash};
use crate::column::{Column, IsSorted};
use crate::runtime::ExecutionContext;

/// Row indices of every group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupsProxy {
    /// Arbitrary row indices per group.
    Idx(Vec<Vec<usize>>),
    /// Contiguous `(start, len)` ranges, produced for sorted keys.
    Slice(Vec<(usize, usize)>),
}

impl GroupsProxy {
    pub fn len(&self) -> usize {
        match self {
            Self::Idx(groups) => groups.len(),
            Self::Slice(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows of a single group.
    pub fn get(&self, group: usize) -> GroupIter<'_> {
        match self {
            Self::Idx(groups) => GroupIter::Idx(groups[group].iter()),
            Self::Slice(groups) => {
                let (start, len) = groups[group];
                GroupIter::Slice(start..start + len)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = GroupIter<'_>> + '_ {
        (0..self.len()).map(|g| self.get(g))
    }

    /// First row of every group.
    pub fn first_rows(&self) -> Vec<usize> {
        match self {
            Self::Idx(groups) => groups.iter().map(|g| g[0]).collect(),
            Self::Slice(groups) => groups.iter().map(|(start, _)| *start).collect(),
        }
    }

    pub fn group_lengths(&self) -> Vec<usize> {
        self.iter().map(|g| g.len()).collect()
    }

    pub fn to_vecs(&self) -> Vec<Vec<usize>> {
        self.iter().map(|g| g.collect()).collect()
    }
}

/// Iterator over the rows of one group.
#[derive(Debug, Clone)]
pub enum GroupIter<'a> {
    Idx(std::slice::Iter<'a, usize>),
    Slice(Range<usize>),
}

impl Iterator for GroupIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            Self::Idx(iter) => iter.next().copied(),
            Self::Slice(range) => range.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Idx(iter) => iter.size_hint(),
            Self::Slice(range) => range.size_hint(),
        }
    }
}

impl ExactSizeIterator for GroupIter<'_> {}

impl DoubleEndedIterator for GroupIter<'_> {
    fn next_back(&mut self) -> Option<usize> {
        match self {
            Self::Idx(iter) => iter.next_back().copied(),
            Self::Slice(range) => range.next_back(),
        }
    }
}

/// Compute groups for the given key columns.
///
/// Null keys compare equal to each other and form their own group. Groups
/// are always emitted in order of first occurrence. `maintain_order` is
/// accepted for callers that require it explicitly.
pub fn compute_groups(
    keys: &[&Column],
    maintain_order: bool,
    ctx: &ExecutionContext,
) -> Result<GroupsProxy> {
    if keys.is_empty() {
        return Err(DbError::invalid_argument("Grouping requires at least one key column"));
    }

    if let [key] = keys {
        if key.sorted() != IsSorted::Not {
            debug!(rows = key.len(), "grouping sorted key");
            return sorted_groups(key);
        }
    }

    let row_keys = RowKeys::try_new(keys)?;
    let num_rows = row_keys.len();
    let config = &ctx.config;

    if config.partitions > 1 && num_rows > config.partitioned_groupby_sample_size {
        let estimate = estimate_groups(&row_keys, config.partitioned_groupby_sample_size);
        if estimate >= config.partitioned_groupby_threshold {
            debug!(rows = num_rows, estimate, partitions = config.partitions, maintain_order, "partitioned grouping");
            return partitioned_groups(&row_keys, config.partitions, ctx);
        }
    }

    debug!(rows = num_rows, maintain_order, "single pass grouping");
    let groups = hash_groups(&row_keys, 0..num_rows);
    Ok(GroupsProxy::Idx(groups))
}

fn sorted_groups(key: &Column) -> Result<GroupsProxy> {
    let row_keys = RowKeys::try_new(&[key])?;
    let mut groups = Vec::new();
    let mut start = 0;
    for row in 1..row_keys.len() {
        if !row_keys.rows_eq(start, row) {
            groups.push((start, row - start));
            start = row;
        }
    }
    if !row_keys.is_empty() {
        groups.push((start, row_keys.len() - start));
    }
    Ok(GroupsProxy::Slice(groups))
}

/// Group the given rows in a single pass, groups in first occurrence order.
fn hash_groups(keys: &RowKeys, rows: impl Iterator<Item = usize>) -> Vec<Vec<usize>> {
    let mut table: RawTable<(u64, usize)> = RawTable::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for row in rows {
        let hash = keys.hash(row);
        let found = table.get(hash, |(h, group)| *h == hash && keys.rows_eq(groups[*group][0], row));
        match found {
            Some(&(_, group)) => groups[group].push(row),
            None => {
                table.insert(hash, (hash, groups.len()), |(h, _)| *h);
                groups.push(vec![row]);
            }
        }
    }

    groups
}

/// Estimate the number of distinct keys from an evenly spaced sample of
/// rows.
fn estimate_groups(keys: &RowKeys, sample_size: usize) -> usize {
    let num_rows = keys.len();
    if num_rows == 0 {
        return 0;
    }
    let step = (num_rows / sample_size.max(1)).max(1);
    let sample: HashSet<u64> = (0..num_rows).step_by(step).map(|row| keys.hash(row)).collect();
    let sampled = num_rows.div_ceil(step);
    (sample.len() as f64 / sampled as f64 * num_rows as f64) as usize
}

fn partitioned_groups(keys: &RowKeys, partitions: usize, ctx: &ExecutionContext) -> Result<GroupsProxy> {
    let mut partition_rows: Vec<Vec<usize>> = vec![Vec::new(); partitions];
    for row in 0..keys.len() {
        partition_rows[partition_for_hash(keys.hash(row), partitions)].push(row);
    }

    let grouped = ctx
        .pool
        .try_map(partition_rows, |rows| Ok(hash_groups(keys, rows.into_iter())))?;

    let mut groups: Vec<Vec<usize>> = grouped.into_iter().flatten().collect();
    groups.sort_unstable_by_key(|g| g[0]);
    Ok(GroupsProxy::Idx(groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::sort::SortOptions;
    use crate::config::ExecutionConfig;

    fn ctx_with(partitions: usize, threshold: usize, sample: usize) -> ExecutionContext {
        let mut config = ExecutionConfig::with_threads(partitions);
        config.partitioned_groupby_threshold = threshold;
        config.partitioned_groupby_sample_size = sample;
        ExecutionContext::try_new(config).unwrap()
    }

    #[test]
    fn first_occurrence_order_with_null_group() {
        let key = Column::from_opt("k", vec![Some(2i64), None, Some(1), Some(2), None]);
        let groups = compute_groups(&[&key], true, &ctx_with(1, 1000, 1024)).unwrap();
        assert_eq!(vec![vec![0, 3], vec![1, 4], vec![2]], groups.to_vecs());
    }

    #[test]
    fn sorted_key_uses_slices() {
        let key = Column::from_slice("k", &[3i64, 1, 3, 2])
            .sort(SortOptions::default())
            .unwrap();
        let groups = compute_groups(&[&key], true, &ctx_with(1, 1000, 1024)).unwrap();
        assert!(matches!(groups, GroupsProxy::Slice(_)));
        assert_eq!(vec![1, 1, 2], groups.group_lengths());
    }

    #[test]
    fn partitioned_matches_single_pass() {
        let values: Vec<i64> = (0..5000).map(|v| (v * 7919) % 1500).collect();
        let key = Column::from_slice("k", &values);
        let single = compute_groups(&[&key], true, &ctx_with(1, 1000, 64)).unwrap();
        let partitioned = compute_groups(&[&key], true, &ctx_with(4, 10, 64)).unwrap();
        assert_eq!(1500, single.len());
        assert_eq!(single, partitioned);
    }

    #[test]
    fn multi_key() {
        let a = Column::from_slice("a", &[1i32, 1, 2, 1]);
        let b = Column::from_strs("b", &["x", "y", "x", "x"]);
        let groups = compute_groups(&[&a, &b], true, &ctx_with(1, 1000, 1024)).unwrap();
        assert_eq!(vec![vec![0, 3], vec![1], vec![2]], groups.to_vecs());
    }
}
