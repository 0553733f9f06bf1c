//! Joining tables on key columns.
//!
//! Inner, left and outer joins hash the right table and look up each row of
//! the left table in it in parallel chunks. Cross joins produce the cartesian product.
//! Asof joins are in [`asof`].

pub mod asof;

use std::fmt;

use floe_error::{DbError, Result};
use hashbrown::raw::RawTable;
use tracing::debug;

pub use self::asof::{AsofOptions, AsofStrategy};
use crate::arrays::bitmap::Bitmap;
use crate::arrays::datatype::supertype;
use crate::arrays::scalar::ScalarValue;
use crate::column::Column;
use crate::column::cmp::check_categoricals;
use crate::column::hash::RowKeys;
use crate::frame::Table;
use crate::runtime::ExecutionContext;

pub const DEFAULT_SUFFIX: &str = "_right";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Outer,
    Cross,
    Asof,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER"),
            Self::Left => write!(f, "LEFT"),
            Self::Outer => write!(f, "OUTER"),
            Self::Cross => write!(f, "CROSS"),
            Self::Asof => write!(f, "ASOF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinArgs {
    pub how: JoinType,
    pub left_on: Vec<String>,
    pub right_on: Vec<String>,
    /// Appended to right column names colliding with left names.
    pub suffix: String,
    pub asof: AsofOptions,
}

impl JoinArgs {
    pub fn new(how: JoinType) -> Self {
        JoinArgs {
            how,
            left_on: Vec::new(),
            right_on: Vec::new(),
            suffix: DEFAULT_SUFFIX.to_string(),
            asof: AsofOptions::default(),
        }
    }

    pub fn on<S: AsRef<str>>(self, on: &[S]) -> Self {
        self.left_on(on).right_on(on)
    }

    pub fn left_on<S: AsRef<str>>(mut self, on: &[S]) -> Self {
        self.left_on = on.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn right_on<S: AsRef<str>>(mut self, on: &[S]) -> Self {
        self.right_on = on.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_asof(mut self, asof: AsofOptions) -> Self {
        self.asof = asof;
        self
    }

    /// Check key arity before running the join.
    pub fn validate(&self) -> Result<()> {
        if self.how == JoinType::Cross {
            return Ok(());
        }
        if self.left_on.is_empty() || self.right_on.is_empty() {
            return Err(DbError::invalid_argument("Join requires key columns on both sides")
                .with_field("how", self.how));
        }
        if self.left_on.len() != self.right_on.len() {
            return Err(DbError::invalid_argument("Join key arity mismatch")
                .with_field("left", self.left_on.len())
                .with_field("right", self.right_on.len()));
        }
        if self.how == JoinType::Asof {
            if self.left_on.len() != 1 {
                return Err(DbError::invalid_argument("Asof join takes exactly one key column per side")
                    .with_field("keys", self.left_on.len()));
            }
            self.asof.validate()?;
        }
        Ok(())
    }
}

impl Table {
    pub fn join<S: AsRef<str>>(&self, other: &Table, left_on: &[S], right_on: &[S], how: JoinType) -> Result<Table> {
        self.join_with(other, &JoinArgs::new(how).left_on(left_on).right_on(right_on))
    }

    pub fn join_with(&self, other: &Table, args: &JoinArgs) -> Result<Table> {
        self.join_in(other, args, ExecutionContext::global()?)
    }

    pub fn join_in(&self, other: &Table, args: &JoinArgs, ctx: &ExecutionContext) -> Result<Table> {
        args.validate()?;
        debug!(how = %args.how, left = self.height(), right = other.height(), "join");
        match args.how {
            JoinType::Cross => cross_join(self, other, &args.suffix),
            JoinType::Asof => asof::asof_join(self, other, args, ctx),
            how => hash_join(self, other, args, how, ctx),
        }
    }

    pub fn cross_join(&self, other: &Table) -> Result<Table> {
        cross_join(self, other, DEFAULT_SUFFIX)
    }
}

/// Cast paired key columns to their common type.
pub(crate) fn coerce_keys(left: &[&Column], right: &[&Column]) -> Result<(Vec<Column>, Vec<Column>)> {
    let mut l_out = Vec::with_capacity(left.len());
    let mut r_out = Vec::with_capacity(right.len());
    for (l, r) in left.iter().zip(right) {
        check_categoricals(l, r)?;
        let common = supertype(l.datatype(), r.datatype()).ok_or_else(|| {
            DbError::schema("Join keys have incompatible datatypes")
                .with_field("left", format!("{}: {}", l.name(), l.datatype()))
                .with_field("right", format!("{}: {}", r.name(), r.datatype()))
        })?;
        l_out.push(l.cast(&common)?);
        r_out.push(r.cast(&common)?);
    }
    Ok((l_out, r_out))
}

/// Right rows grouped by key, for probing. Rows with a null key are left
/// out since they never match.
pub(crate) struct BuildTable<'a> {
    keys: RowKeys<'a>,
    table: RawTable<(u64, usize)>,
    groups: Vec<Vec<usize>>,
}

impl<'a> BuildTable<'a> {
    pub(crate) fn try_new(keys: &[&'a Column]) -> Result<Self> {
        let keys = RowKeys::try_new(keys)?;
        let mut table: RawTable<(u64, usize)> = RawTable::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for row in 0..keys.len() {
            if keys.has_null(row) {
                continue;
            }
            let hash = keys.hash(row);
            match table.get(hash, |(h, g)| *h == hash && keys.rows_eq(groups[*g][0], row)) {
                Some(&(_, group)) => groups[group].push(row),
                None => {
                    table.insert(hash, (hash, groups.len()), |(h, _)| *h);
                    groups.push(vec![row]);
                }
            }
        }
        Ok(BuildTable { keys, table, groups })
    }

    /// Build rows matching a left row, in build order.
    pub(crate) fn lookup(&self, keys: &RowKeys, row: usize) -> Option<&[usize]> {
        self.find_group(keys, row).map(|g| self.groups[g].as_slice())
    }

    /// Index into `groups` of the build rows matching a left row.
    pub(crate) fn find_group(&self, keys: &RowKeys, row: usize) -> Option<usize> {
        if keys.has_null(row) {
            return None;
        }
        let hash = keys.hash(row);
        self.table
            .get(hash, |(h, g)| *h == hash && keys.rows_eq_other(row, &self.keys, self.groups[*g][0]))
            .map(|(_, g)| *g)
    }

    /// Build rows per distinct key, in order of first occurrence.
    pub(crate) fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }
}

#[derive(Debug, Default)]
struct JoinOutput {
    left: Vec<usize>,
    right: Vec<Option<usize>>,
}

fn hash_join(left: &Table, right: &Table, args: &JoinArgs, how: JoinType, ctx: &ExecutionContext) -> Result<Table> {
    let left_keys = left.columns_by_name(&args.left_on)?;
    let right_keys = right.columns_by_name(&args.right_on)?;
    let (left_keys, right_keys) = coerce_keys(&left_keys, &right_keys)?;

    let right_refs: Vec<&Column> = right_keys.iter().collect();
    let build = BuildTable::try_new(&right_refs)?;
    let left_refs: Vec<&Column> = left_keys.iter().collect();
    let lookup = RowKeys::try_new(&left_refs)?;

    let chunk_size = ctx.config.join_chunk_size.max(1);
    let ranges: Vec<(usize, usize)> = (0..lookup.len())
        .step_by(chunk_size)
        .map(|start| (start, (start + chunk_size).min(lookup.len())))
        .collect();

    let keep_unmatched_left = matches!(how, JoinType::Left | JoinType::Outer);
    let outputs = ctx.pool.try_map(ranges, |(start, end)| {
        let mut out = JoinOutput::default();
        for row in start..end {
            match build.lookup(&lookup, row) {
                Some(matches) => {
                    for &m in matches {
                        out.left.push(row);
                        out.right.push(Some(m));
                    }
                }
                None if keep_unmatched_left => {
                    out.left.push(row);
                    out.right.push(None);
                }
                None => {}
            }
        }
        Ok(out)
    })?;

    let mut left_idx: Vec<Option<usize>> = Vec::new();
    let mut right_idx: Vec<Option<usize>> = Vec::new();
    for out in outputs {
        left_idx.extend(out.left.into_iter().map(Some));
        right_idx.extend(out.right);
    }

    if how == JoinType::Outer {
        let mut visited = Bitmap::new_with_all_false(right.height());
        for &r in right_idx.iter().flatten() {
            visited.set_unchecked(r, true);
        }
        for (row, seen) in visited.iter().enumerate() {
            if !seen {
                left_idx.push(None);
                right_idx.push(Some(row));
            }
        }
    }
    debug!(rows = left_idx.len(), "join lookup complete");

    let left_rows: Vec<usize> = left_idx.iter().flatten().copied().collect();
    let mut columns = Vec::with_capacity(left.width() + right.width());
    for column in left.columns() {
        let key_pos = args.left_on.iter().position(|k| k == column.name());
        let out = match (how, key_pos) {
            (JoinType::Outer, Some(pos)) => coalesce(
                &left_keys[pos].take_opt(&left_idx)?,
                &right_keys[pos].take_opt(&right_idx)?,
            )?
            .with_name(column.name()),
            _ if how == JoinType::Outer => column.take_opt(&left_idx)?,
            _ => column.take(&left_rows)?,
        };
        columns.push(out);
    }

    append_right_columns(&mut columns, left, right, &args.right_on, &args.suffix, |c| c.take_opt(&right_idx))?;
    Table::try_new(columns)
}

/// Left value where present, otherwise the right value.
fn coalesce(left: &Column, right: &Column) -> Result<Column> {
    let values: Vec<ScalarValue> = left
        .iter()
        .zip(right.iter())
        .map(|(l, r)| if l.is_null() { r } else { l })
        .collect();
    Column::from_scalars(left.name(), left.datatype(), &values)
}

/// Add the right columns not in `skip`, suffixing names already used on
/// the left.
pub(crate) fn append_right_columns<S: AsRef<str>>(
    columns: &mut Vec<Column>,
    left: &Table,
    right: &Table,
    skip: &[S],
    suffix: &str,
    take: impl Fn(&Column) -> Result<Column>,
) -> Result<()> {
    for column in right.columns() {
        if skip.iter().any(|s| s.as_ref() == column.name()) {
            continue;
        }
        let mut out = take(column)?;
        if left.index_of(column.name()).is_some() {
            out.rename(format!("{}{suffix}", column.name()));
        }
        columns.push(out);
    }
    Ok(())
}

fn cross_join(left: &Table, right: &Table, suffix: &str) -> Result<Table> {
    let (lh, rh) = (left.height(), right.height());
    let left_idx: Vec<usize> = (0..lh).flat_map(|l| std::iter::repeat_n(l, rh)).collect();
    let right_idx: Vec<usize> = (0..lh).flat_map(|_| 0..rh).collect();

    let mut columns = left
        .columns()
        .iter()
        .map(|c| c.take(&left_idx))
        .collect::<Result<Vec<_>>>()?;
    append_right_columns(&mut columns, left, right, &[] as &[&str], suffix, |c| c.take(&right_idx))?;
    Table::try_new(columns)
}

#[cfg(test)]
mod tests {
    use floe_error::ErrorKind;

    use super::*;
    use crate::config::ExecutionConfig;

    fn left() -> Table {
        Table::try_new(vec![
            Column::from_strs("a", &["a", "b", "a", "z"]),
            Column::from_slice("b", &[0.1f64, 0.2, 0.3, 0.4]),
        ])
        .unwrap()
    }

    fn right() -> Table {
        Table::try_new(vec![
            Column::from_strs("a", &["b", "c", "b", "a"]),
            Column::from_slice("b", &[1i64, 3, 2, 2]),
        ])
        .unwrap()
    }

    #[test]
    fn inner_keeps_left_order() {
        let out = left().join(&right(), &["a"], &["a"], JoinType::Inner).unwrap();
        assert_eq!(vec!["a", "b", "b_right"], out.column_names());
        assert_eq!(
            vec![ScalarValue::from("a"), ScalarValue::from("b"), ScalarValue::from("b"), ScalarValue::from("a")],
            out.column("a").unwrap().to_scalars()
        );
        assert_eq!(vec![Some(2), Some(1), Some(2), Some(2)], out.column("b_right").unwrap().native_values::<i64>().unwrap());
    }

    #[test]
    fn left_join_nulls_unmatched() {
        let out = left().join(&right(), &["a"], &["a"], JoinType::Left).unwrap();
        assert_eq!(5, out.height());
        assert_eq!(ScalarValue::Null, out.column("b_right").unwrap().get(4).unwrap());
    }

    #[test]
    fn outer_coalesces_keys() {
        let out = left().join(&right(), &["a"], &["a"], JoinType::Outer).unwrap();
        assert_eq!(6, out.height());
        assert_eq!(ScalarValue::from("c"), out.column("a").unwrap().get(5).unwrap());
        assert_eq!(ScalarValue::Null, out.column("b").unwrap().get(5).unwrap());
    }

    #[test]
    fn null_keys_never_match() {
        let l = Table::try_new(vec![Column::from_opt("k", vec![Some(1i64), None])]).unwrap();
        let r = Table::try_new(vec![
            Column::from_opt("k", vec![None, Some(1i64)]),
            Column::from_slice("v", &[10i64, 20]),
        ])
        .unwrap();
        let out = l.join(&r, &["k"], &["k"], JoinType::Inner).unwrap();
        assert_eq!(vec![Some(20)], out.column("v").unwrap().native_values::<i64>().unwrap());
    }

    #[test]
    fn keys_widen_and_match_in_chunks() {
        let l = Table::try_new(vec![Column::from_slice("k", &(0..100).collect::<Vec<i32>>())]).unwrap();
        let r = Table::try_new(vec![
            Column::from_slice("k", &(0..100).rev().map(|v| v as i64).collect::<Vec<_>>()),
            Column::from_slice("v", &(0..100).collect::<Vec<u32>>()),
        ])
        .unwrap();
        let mut config = ExecutionConfig::with_threads(4);
        config.join_chunk_size = 7;
        let ctx = ExecutionContext::try_new(config).unwrap();
        let out = l
            .join_in(&r, &JoinArgs::new(JoinType::Inner).on(&["k"]), &ctx)
            .unwrap();
        assert_eq!(100, out.height());
        assert_eq!(Some(99), out.column("v").unwrap().native_values::<u32>().unwrap()[0]);
    }

    #[test]
    fn cross_join_shape() {
        let out = left().cross_join(&right()).unwrap();
        assert_eq!((16, 4), out.shape());
        assert_eq!(vec!["a", "b", "a_right", "b_right"], out.column_names());
    }

    #[test]
    fn invalid_arguments() {
        let err = left().join(&right(), &["a"], &[] as &[&str], JoinType::Inner).unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, err.kind());
        let err = left().join(&right(), &["a", "b"], &["a"], JoinType::Left).unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, err.kind());
        let err = left().join(&right(), &["nope"], &["a"], JoinType::Inner).unwrap_err();
        assert_eq!(ErrorKind::NotFound, err.kind());
    }
}
