use std::fmt;

use floe_error::{DbError, Result};
use tracing::debug;

use super::{BuildTable, JoinArgs, append_right_columns, coerce_keys};
use crate::arrays::datatype::{DataType, TimeUnit};
use crate::arrays::scalar::ScalarValue;
use crate::column::Column;
use crate::column::hash::RowKeys;
use crate::frame::Table;
use crate::runtime::ExecutionContext;

const NANOS_PER_DAY: i128 = 86_400 * 1_000_000_000;

/// Direction of the search for a matching right row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AsofStrategy {
    /// Last right row with a key less than or equal to the left key.
    #[default]
    Backward,
    /// First right row with a key greater than or equal to the left key.
    Forward,
    /// Closest right row in either direction. Ties go backward.
    Nearest,
}

impl fmt::Display for AsofStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backward => write!(f, "backward"),
            Self::Forward => write!(f, "forward"),
            Self::Nearest => write!(f, "nearest"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AsofOptions {
    pub strategy: AsofStrategy,
    /// Columns matched exactly before searching on the ordered key.
    pub by_left: Vec<String>,
    pub by_right: Vec<String>,
    /// Maximum distance between matched keys. Durations are accepted for
    /// temporal keys.
    pub tolerance: Option<ScalarValue>,
}

impl AsofOptions {
    pub fn new(strategy: AsofStrategy) -> Self {
        AsofOptions {
            strategy,
            ..Default::default()
        }
    }

    pub fn by<S: AsRef<str>>(self, by: &[S]) -> Self {
        self.by_left(by).by_right(by)
    }

    pub fn by_left<S: AsRef<str>>(mut self, by: &[S]) -> Self {
        self.by_left = by.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn by_right<S: AsRef<str>>(mut self, by: &[S]) -> Self {
        self.by_right = by.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_tolerance(mut self, tolerance: ScalarValue) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.by_left.len() != self.by_right.len() {
            return Err(DbError::invalid_argument("Asof 'by' arity mismatch")
                .with_field("left", self.by_left.len())
                .with_field("right", self.by_right.len()));
        }
        if let Some(tolerance) = &self.tolerance {
            let negative = match tolerance {
                ScalarValue::Null => true,
                ScalarValue::Float32(_) | ScalarValue::Float64(_) => {
                    tolerance.try_as_f64().is_none_or(|v| v.is_nan() || v < 0.0)
                }
                other => other.try_as_i128().is_none_or(|v| v < 0),
            };
            if negative {
                return Err(DbError::invalid_argument("Asof tolerance must be a non-negative number or duration")
                    .with_field("tolerance", tolerance));
            }
        }
        Ok(())
    }
}

impl Table {
    /// Join each row with the closest row of `other` on a sorted key.
    pub fn join_asof(&self, other: &Table, left_on: &str, right_on: &str, options: AsofOptions) -> Result<Table> {
        let args = JoinArgs::new(super::JoinType::Asof)
            .left_on(&[left_on])
            .right_on(&[right_on])
            .with_asof(options);
        self.join_with(other, &args)
    }
}

/// Ordered key values extracted from an `on` column.
trait AsofKey: Copy + PartialOrd + Send + Sync {
    fn distance(self, other: Self) -> Self;
}

impl AsofKey for i128 {
    fn distance(self, other: Self) -> Self {
        (self - other).abs()
    }
}

impl AsofKey for f64 {
    fn distance(self, other: Self) -> Self {
        (self - other).abs()
    }
}

pub(crate) fn asof_join(left: &Table, right: &Table, args: &JoinArgs, ctx: &ExecutionContext) -> Result<Table> {
    let opts = &args.asof;
    let left_on = left.column(&args.left_on[0])?;
    let right_on = right.column(&args.right_on[0])?;
    let (mut l, mut r) = coerce_keys(&[left_on], &[right_on])?;
    let (left_on, right_on) = (l.remove(0), r.remove(0));

    for col in [&left_on, &right_on] {
        if !col.is_sorted_ascending()? {
            return Err(DbError::new("Asof join key must be sorted ascending").with_field("column", col.name()));
        }
    }

    // Right rows with a non-null key, one list per distinct `by` key. Left
    // rows point at the list they search.
    let left_by = left.columns_by_name(&opts.by_left)?;
    let right_by = right.columns_by_name(&opts.by_right)?;
    let (left_by, right_by) = coerce_keys(&left_by, &right_by)?;
    let valid = |rows: &[usize]| -> Vec<usize> { rows.iter().copied().filter(|&r| right_on.is_valid(r)).collect() };
    let (groups, left_group): (Vec<Vec<usize>>, Vec<Option<usize>>) = if left_by.is_empty() {
        let all: Vec<usize> = (0..right.height()).collect();
        (vec![valid(&all)], vec![Some(0); left.height()])
    } else {
        let right_refs: Vec<&Column> = right_by.iter().collect();
        let build = BuildTable::try_new(&right_refs)?;
        let left_refs: Vec<&Column> = left_by.iter().collect();
        let lookup = RowKeys::try_new(&left_refs)?;
        let groups = build.groups().iter().map(|rows| valid(rows)).collect();
        let left_group = (0..left.height()).map(|row| build.find_group(&lookup, row)).collect();
        (groups, left_group)
    };
    let candidates = Candidates {
        groups: &groups,
        left_group: &left_group,
    };

    let datatype = left_on.datatype().clone();
    let right_idx = if datatype.is_float() {
        let lk = float_keys(&left_on);
        let rk = float_keys(&right_on);
        let tol = match &opts.tolerance {
            Some(t) => Some(t.try_as_f64().ok_or_else(|| tolerance_error(t, &datatype))?),
            None => None,
        };
        search_asof(&lk, &rk, &candidates, opts.strategy, tol, ctx)?
    } else if datatype.is_integer() || datatype.is_temporal() {
        let lk = int_keys(&left_on);
        let rk = int_keys(&right_on);
        let tol = match &opts.tolerance {
            Some(t) => Some(int_tolerance(t, &datatype)?),
            None => None,
        };
        search_asof(&lk, &rk, &candidates, opts.strategy, tol, ctx)?
    } else {
        return Err(DbError::schema("Asof join key must be numeric or temporal").with_field("datatype", datatype));
    };
    debug!(strategy = %opts.strategy, matched = right_idx.iter().flatten().count(), "asof join");

    let mut skip = vec![args.right_on[0].clone()];
    skip.extend(opts.by_right.iter().cloned());
    let mut columns = left.columns().to_vec();
    append_right_columns(&mut columns, left, right, &skip, &args.suffix, |c| c.take_opt(&right_idx))?;
    Table::try_new(columns)
}

/// Right rows each left row may match. Groups are shared between all left
/// rows with the same `by` key.
struct Candidates<'a> {
    groups: &'a [Vec<usize>],
    left_group: &'a [Option<usize>],
}

impl Candidates<'_> {
    fn for_row(&self, row: usize) -> Option<&[usize]> {
        self.left_group[row].map(|g| self.groups[g].as_slice())
    }
}

fn search_asof<K: AsofKey>(
    left: &[Option<K>],
    right: &[Option<K>],
    candidates: &Candidates<'_>,
    strategy: AsofStrategy,
    tolerance: Option<K>,
    ctx: &ExecutionContext,
) -> Result<Vec<Option<usize>>> {
    let chunk_size = ctx.config.join_chunk_size.max(1);
    let ranges: Vec<(usize, usize)> = (0..left.len())
        .step_by(chunk_size)
        .map(|start| (start, (start + chunk_size).min(left.len())))
        .collect();

    let chunks = ctx.pool.try_map(ranges, |(start, end)| {
        let matches = (start..end)
            .map(|row| {
                let (Some(value), Some(rows)) = (left[row], candidates.for_row(row)) else {
                    return None;
                };
                let found = search(value, rows, right, strategy)?;
                let found_value = right[found]?;
                match tolerance {
                    Some(tol) if found_value.distance(value) > tol => None,
                    _ => Some(found),
                }
            })
            .collect::<Vec<_>>();
        Ok(matches)
    })?;
    Ok(chunks.into_iter().flatten().collect())
}

/// Binary search over right rows sorted by key. Every row in `rows` has a
/// non-null key.
fn search<K: AsofKey>(value: K, rows: &[usize], right: &[Option<K>], strategy: AsofStrategy) -> Option<usize> {
    let key = |pos: usize| right[rows[pos]];
    let backward = || {
        let n = rows.partition_point(|&r| right[r].is_some_and(|k| k <= value));
        n.checked_sub(1)
    };
    let forward = || {
        let n = rows.partition_point(|&r| right[r].is_some_and(|k| k < value));
        (n < rows.len()).then_some(n)
    };
    let pos = match strategy {
        AsofStrategy::Backward => backward(),
        AsofStrategy::Forward => forward(),
        AsofStrategy::Nearest => match (backward(), forward()) {
            (Some(b), Some(f)) => {
                let db = key(b)?.distance(value);
                let df = key(f)?.distance(value);
                if df < db { Some(f) } else { Some(b) }
            }
            (b, f) => b.or(f),
        },
    }?;
    Some(rows[pos])
}

fn int_keys(column: &Column) -> Vec<Option<i128>> {
    column.iter().map(|v| v.try_as_i128()).collect()
}

fn float_keys(column: &Column) -> Vec<Option<f64>> {
    column.iter().map(|v| v.try_as_f64()).collect()
}

/// Tolerance in the raw integer representation of the key type.
fn int_tolerance(tolerance: &ScalarValue, datatype: &DataType) -> Result<i128> {
    let nanos_in = |unit: TimeUnit| (1_000_000_000 / unit.per_second()) as i128;
    match (tolerance, datatype) {
        (ScalarValue::Duration(v, unit), DataType::Datetime(to) | DataType::Duration(to)) => {
            Ok(unit.convert(*v, *to) as i128)
        }
        (ScalarValue::Duration(v, unit), DataType::Date) => Ok(*v as i128 * nanos_in(*unit) / NANOS_PER_DAY),
        (ScalarValue::Duration(v, unit), DataType::Time) => Ok(*v as i128 * nanos_in(*unit)),
        (ScalarValue::Duration(..), _) => Err(tolerance_error(tolerance, datatype)),
        (other, _) => other
            .try_as_i128()
            .or_else(|| other.try_as_f64().map(|v| v.floor() as i128))
            .ok_or_else(|| tolerance_error(tolerance, datatype)),
    }
}

fn tolerance_error(tolerance: &ScalarValue, datatype: &DataType) -> DbError {
    DbError::schema("Asof tolerance does not apply to key type")
        .with_field("tolerance", tolerance)
        .with_field("datatype", datatype)
}

#[cfg(test)]
mod tests {
    use floe_error::ErrorKind;

    use super::*;

    fn quotes() -> Table {
        Table::try_new(vec![
            Column::from_slice("t", &[1i64, 5, 10]),
            Column::from_strs("q", &["a", "b", "c"]),
        ])
        .unwrap()
    }

    fn trades() -> Table {
        Table::try_new(vec![Column::from_slice("t", &[0i64, 4, 5, 7, 12])]).unwrap()
    }

    fn matched(out: &Table) -> Vec<ScalarValue> {
        out.column("q").unwrap().to_scalars()
    }

    #[test]
    fn backward_forward_nearest() {
        let s = |v: &str| ScalarValue::from(v);
        let out = trades().join_asof(&quotes(), "t", "t", AsofOptions::new(AsofStrategy::Backward)).unwrap();
        assert_eq!(vec!["t", "q"], out.column_names());
        assert_eq!(vec![ScalarValue::Null, s("a"), s("b"), s("b"), s("c")], matched(&out));

        let out = trades().join_asof(&quotes(), "t", "t", AsofOptions::new(AsofStrategy::Forward)).unwrap();
        assert_eq!(vec![s("a"), s("b"), s("b"), s("c"), ScalarValue::Null], matched(&out));

        let out = trades().join_asof(&quotes(), "t", "t", AsofOptions::new(AsofStrategy::Nearest)).unwrap();
        assert_eq!(vec![s("a"), s("b"), s("b"), s("b"), s("c")], matched(&out));
    }

    #[test]
    fn tolerance_limits_distance() {
        let opts = AsofOptions::new(AsofStrategy::Backward).with_tolerance(ScalarValue::Int64(1));
        let out = trades().join_asof(&quotes(), "t", "t", opts).unwrap();
        assert_eq!(
            vec![ScalarValue::Null, ScalarValue::Null, ScalarValue::from("b"), ScalarValue::Null, ScalarValue::Null],
            matched(&out)
        );
    }

    #[test]
    fn by_keys_match_exactly() {
        let left = Table::try_new(vec![
            Column::from_slice("t", &[1i64, 2, 3]),
            Column::from_strs("sym", &["x", "y", "x"]),
        ])
        .unwrap();
        let right = Table::try_new(vec![
            Column::from_slice("t", &[0i64, 1, 2]),
            Column::from_strs("sym", &["y", "x", "x"]),
            Column::from_slice("v", &[10i32, 20, 30]),
        ])
        .unwrap();
        let out = left
            .join_asof(&right, "t", "t", AsofOptions::new(AsofStrategy::Backward).by(&["sym"]))
            .unwrap();
        assert_eq!(vec!["t", "sym", "v"], out.column_names());
        assert_eq!(vec![Some(20), Some(10), Some(30)], out.column("v").unwrap().native_values::<i32>().unwrap());
    }

    #[test]
    fn null_right_keys_are_skipped_within_groups() {
        let left = Table::try_new(vec![
            Column::from_slice("t", &[2i64, 3, 4]),
            Column::from_strs("sym", &["x", "x", "y"]),
        ])
        .unwrap();
        let right = Table::try_new(vec![
            Column::from_opt("t", vec![Some(1i64), None, Some(3), Some(4)]),
            Column::from_strs("sym", &["x", "x", "x", "y"]),
            Column::from_slice("v", &[1i64, 2, 3, 4]),
        ])
        .unwrap();
        let out = left
            .join_asof(&right, "t", "t", AsofOptions::new(AsofStrategy::Backward).by(&["sym"]))
            .unwrap();
        assert_eq!(vec![Some(1), Some(3), Some(4)], out.column("v").unwrap().native_values::<i64>().unwrap());
    }

    #[test]
    fn large_inputs_share_candidates() {
        let n = 20_000i64;
        let keys: Vec<i64> = (0..n).collect();
        let syms: Vec<&str> = (0..n).map(|v| if v % 2 == 0 { "a" } else { "b" }).collect();
        let left = Table::try_new(vec![Column::from_slice("t", &keys), Column::from_strs("sym", &syms)]).unwrap();
        let right = Table::try_new(vec![
            Column::from_slice("t", &keys),
            Column::from_strs("sym", &syms),
            Column::from_slice("v", &keys),
        ])
        .unwrap();

        let out = left.join_asof(&right, "t", "t", AsofOptions::default()).unwrap();
        assert_eq!(0, out.column("v").unwrap().null_count());

        let out = left
            .join_asof(&right, "t", "t", AsofOptions::default().by(&["sym"]))
            .unwrap();
        let values = out.column("v").unwrap().native_values::<i64>().unwrap();
        assert_eq!(keys.into_iter().map(Some).collect::<Vec<_>>(), values);
    }

    #[test]
    fn unsorted_key_is_compute_error() {
        let unsorted = Table::try_new(vec![Column::from_slice("t", &[3i64, 1])]).unwrap();
        let err = unsorted
            .join_asof(&quotes(), "t", "t", AsofOptions::default())
            .unwrap_err();
        assert_eq!(ErrorKind::Compute, err.kind());
    }

    #[test]
    fn negative_tolerance_rejected() {
        let opts = AsofOptions::default().with_tolerance(ScalarValue::Int64(-1));
        let err = trades().join_asof(&quotes(), "t", "t", opts).unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, err.kind());
    }
}
