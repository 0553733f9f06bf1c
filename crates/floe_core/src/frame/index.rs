//! Row and column selection by loosely typed keys.

use floe_error::{DbError, Result, not_implemented};

use super::Table;
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::column::Column;

/// Positional slice with optional bounds. Negative bounds count from the
/// end and a negative step walks backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceKey {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceKey {
    pub fn new(start: Option<i64>, stop: Option<i64>) -> Self {
        SliceKey { start, stop, step: None }
    }

    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    /// Positions selected from a sequence of length `len`.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(DbError::invalid_argument("Slice step cannot be zero"));
        }
        let len = len as i64;
        let clamp = |v: i64, lower: i64, upper: i64| {
            let v = if v < 0 { v + len } else { v };
            v.clamp(lower, upper)
        };
        let mut out = Vec::new();
        if step > 0 {
            let start = self.start.map(|v| clamp(v, 0, len)).unwrap_or(0);
            let stop = self.stop.map(|v| clamp(v, 0, len)).unwrap_or(len);
            let mut idx = start;
            while idx < stop {
                out.push(idx as usize);
                idx += step;
            }
        } else {
            let start = self.start.map(|v| clamp(v, -1, len - 1)).unwrap_or(len - 1);
            let stop = self.stop.map(|v| clamp(v, -1, len - 1)).unwrap_or(-1);
            let mut idx = start;
            while idx > stop {
                out.push(idx as usize);
                idx += step;
            }
        }
        Ok(out)
    }
}

/// Key for [`Table::index`].
#[derive(Debug, Clone, PartialEq)]
pub enum IndexKey {
    Int(i64),
    Float(f64),
    Str(String),
    Slice(SliceKey),
    /// Inclusive range of column names.
    NameRange(String, String),
    /// Integers, strings or booleans. Mixing kinds is an error.
    Seq(Vec<ScalarValue>),
    DtypeList(Vec<DataType>),
    /// `(rows, columns)`.
    Tuple(Vec<IndexKey>),
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey::Str(value.to_string())
    }
}

impl From<i64> for IndexKey {
    fn from(value: i64) -> Self {
        IndexKey::Int(value)
    }
}

impl From<SliceKey> for IndexKey {
    fn from(value: SliceKey) -> Self {
        IndexKey::Slice(value)
    }
}

impl<R: Into<IndexKey>, C: Into<IndexKey>> From<(R, C)> for IndexKey {
    fn from((rows, cols): (R, C)) -> Self {
        IndexKey::Tuple(vec![rows.into(), cols.into()])
    }
}

/// Result of indexing a table.
#[derive(Debug, Clone)]
pub enum Selection {
    Table(Table),
    Column(Column),
    Scalar(ScalarValue),
}

impl Selection {
    pub fn into_table(self) -> Result<Table> {
        match self {
            Self::Table(t) => Ok(t),
            Self::Column(c) => Table::try_new(vec![c]),
            Self::Scalar(_) => Err(DbError::invalid_argument("Selection is a scalar, not a table")),
        }
    }

    pub fn into_column(self) -> Result<Column> {
        match self {
            Self::Column(c) => Ok(c),
            _ => Err(DbError::invalid_argument("Selection is not a single column")),
        }
    }

    pub fn into_scalar(self) -> Result<ScalarValue> {
        match self {
            Self::Scalar(v) => Ok(v),
            _ => Err(DbError::invalid_argument("Selection is not a scalar")),
        }
    }
}

enum SeqKind {
    Ints(Vec<i64>),
    Strs(Vec<String>),
    Bools(Vec<bool>),
}

fn classify(values: &[ScalarValue]) -> Result<SeqKind> {
    if values.iter().any(|v| v.is_float()) {
        not_implemented!("Indexing with floats");
    }
    if let Some(ints) = values.iter().map(|v| match v {
        ScalarValue::Boolean(_) => None,
        other => other.try_as_i64(),
    }).collect::<Option<Vec<_>>>() {
        return Ok(SeqKind::Ints(ints));
    }
    if let Some(strs) = values.iter().map(|v| v.try_as_str().map(str::to_string)).collect::<Option<Vec<_>>>() {
        return Ok(SeqKind::Strs(strs));
    }
    if let Some(bools) = values.iter().map(|v| v.try_as_bool()).collect::<Option<Vec<_>>>() {
        return Ok(SeqKind::Bools(bools));
    }
    Err(DbError::invalid_argument("Index sequence mixes value types"))
}

fn resolve_position(idx: i64, len: usize, axis: &str) -> Result<usize> {
    let resolved = if idx < 0 { idx + len as i64 } else { idx };
    if resolved < 0 || resolved >= len as i64 {
        return Err(DbError::shape("Index out of range")
            .with_field("axis", axis.to_string())
            .with_field("index", idx)
            .with_field("len", len));
    }
    Ok(resolved as usize)
}

fn mask_positions(mask: &[bool], len: usize, axis: &str) -> Result<Vec<usize>> {
    if mask.len() != len {
        return Err(DbError::shape("Boolean mask length doesn't match")
            .with_field("axis", axis.to_string())
            .with_field("mask", mask.len())
            .with_field("len", len));
    }
    Ok(mask.iter().enumerate().filter(|(_, m)| **m).map(|(i, _)| i).collect())
}

impl Table {
    pub fn index(&self, key: impl Into<IndexKey>) -> Result<Selection> {
        match key.into() {
            IndexKey::Tuple(mut keys) => {
                if keys.len() != 2 {
                    return Err(DbError::invalid_argument("Expected (rows, columns) index")
                        .with_field("len", keys.len()));
                }
                let cols = keys.pop().unwrap_or(IndexKey::Seq(Vec::new()));
                let rows = keys.pop().unwrap_or(IndexKey::Seq(Vec::new()));
                self.index_dual(rows, cols)
            }
            IndexKey::Str(name) => Ok(Selection::Column(self.column(&name)?.clone())),
            IndexKey::Int(idx) => {
                let row = resolve_position(idx, self.height(), "rows")?;
                Ok(Selection::Table(self.slice(row as i64, 1)))
            }
            IndexKey::Float(_) => not_implemented!("Indexing with floats"),
            IndexKey::Slice(slice) => Ok(Selection::Table(self.take_rows_by_slice(&slice)?)),
            key @ (IndexKey::NameRange(..) | IndexKey::DtypeList(_)) => {
                let positions = self.column_positions(key)?;
                Ok(Selection::Table(self.columns_at(&positions)))
            }
            IndexKey::Seq(values) => match classify(&values)? {
                SeqKind::Ints(ints) => Ok(Selection::Table(self.take(&self.row_positions(&ints)?)?)),
                SeqKind::Strs(names) => Ok(Selection::Table(self.select(&names)?)),
                SeqKind::Bools(mask) => {
                    let rows = mask_positions(&mask, self.height(), "rows")?;
                    Ok(Selection::Table(self.take(&rows)?))
                }
            },
        }
    }

    fn index_dual(&self, rows: IndexKey, cols: IndexKey) -> Result<Selection> {
        let single_col = matches!(cols, IndexKey::Str(_) | IndexKey::Int(_));
        let positions = self.column_positions(cols)?;
        let selected = self.columns_at(&positions);

        let (rows, single_row) = match rows {
            IndexKey::Int(idx) => (vec![resolve_position(idx, self.height(), "rows")?], true),
            IndexKey::Slice(slice) => (slice.indices(self.height())?, false),
            IndexKey::Seq(values) => match classify(&values)? {
                SeqKind::Ints(ints) => (self.row_positions(&ints)?, false),
                SeqKind::Bools(mask) => (mask_positions(&mask, self.height(), "rows")?, false),
                SeqKind::Strs(_) => not_implemented!("Selecting rows by string"),
            },
            IndexKey::Float(_) => not_implemented!("Indexing with floats"),
            IndexKey::Str(_) | IndexKey::NameRange(..) => not_implemented!("Selecting rows by string"),
            IndexKey::DtypeList(_) | IndexKey::Tuple(_) => {
                return Err(DbError::invalid_argument("Unsupported row selector"));
            }
        };

        let table = selected.take(&rows)?;
        match (single_row, single_col) {
            (true, true) => Ok(Selection::Scalar(table.columns()[0].get(0)?)),
            (false, true) => Ok(Selection::Column(table.into_columns().remove(0))),
            _ => Ok(Selection::Table(table)),
        }
    }

    fn take_rows_by_slice(&self, slice: &SliceKey) -> Result<Table> {
        match slice.step {
            None | Some(1) => {
                let rows = slice.indices(self.height())?;
                Ok(match rows.first() {
                    Some(&first) => self.slice(first as i64, rows.len()),
                    None => self.head(0),
                })
            }
            _ => self.take(&slice.indices(self.height())?),
        }
    }

    fn row_positions(&self, ints: &[i64]) -> Result<Vec<usize>> {
        ints.iter().map(|&i| resolve_position(i, self.height(), "rows")).collect()
    }

    fn columns_at(&self, positions: &[usize]) -> Table {
        Table::new_unchecked(positions.iter().map(|&p| self.columns[p].clone()).collect())
    }

    fn column_positions(&self, key: IndexKey) -> Result<Vec<usize>> {
        let width = self.width();
        match key {
            IndexKey::Str(name) => Ok(vec![self.try_index_of(&name)?]),
            IndexKey::Int(idx) => Ok(vec![resolve_position(idx, width, "columns")?]),
            IndexKey::Float(_) => not_implemented!("Indexing with floats"),
            IndexKey::Slice(slice) => slice.indices(width),
            IndexKey::NameRange(start, end) => {
                let (s, e) = (self.try_index_of(&start)?, self.try_index_of(&end)?);
                Ok(if s <= e { (s..=e).collect() } else { Vec::new() })
            }
            IndexKey::DtypeList(dtypes) => Ok(self
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| dtypes.contains(c.datatype()))
                .map(|(i, _)| i)
                .collect()),
            IndexKey::Seq(values) => match classify(&values)? {
                SeqKind::Ints(ints) => ints.iter().map(|&i| resolve_position(i, width, "columns")).collect(),
                SeqKind::Strs(names) => names.iter().map(|n| self.try_index_of(n)).collect(),
                SeqKind::Bools(mask) => mask_positions(&mask, width, "columns"),
            },
            IndexKey::Tuple(_) => Err(DbError::invalid_argument("Nested tuple index")),
        }
    }
}

#[cfg(test)]
mod tests {
    use floe_error::ErrorKind;

    use super::*;

    fn table() -> Table {
        Table::try_new(vec![
            Column::from_slice("a", &[1i64, 2, 3, 4]),
            Column::from_strs("b", &["w", "x", "y", "z"]),
            Column::from_slice("c", &[0.5f64, 1.5, 2.5, 3.5]),
        ])
        .unwrap()
    }

    fn strs(values: &[&str]) -> IndexKey {
        IndexKey::Seq(values.iter().map(|v| ScalarValue::from(*v)).collect())
    }

    #[test]
    fn single_axis() {
        let t = table();
        assert_eq!(4, t.index("a").unwrap().into_column().unwrap().len());

        let row = t.index(-1i64).unwrap().into_table().unwrap();
        assert_eq!(ScalarValue::Int64(4), row.column("a").unwrap().get(0).unwrap());

        let rows = t.index(SliceKey::new(None, None).with_step(-2)).unwrap().into_table().unwrap();
        assert_eq!(vec![Some(4), Some(2)], rows.column("a").unwrap().native_values::<i64>().unwrap());

        let sel = t.index(strs(&["c", "a"])).unwrap().into_table().unwrap();
        assert_eq!(vec!["c", "a"], sel.column_names());

        let mask = IndexKey::Seq([true, false, true, false].map(ScalarValue::Boolean).to_vec());
        assert_eq!(2, t.index(mask).unwrap().into_table().unwrap().height());
    }

    #[test]
    fn dual_axis() {
        let t = table();
        assert_eq!(ScalarValue::from("y"), t.index((2i64, "b")).unwrap().into_scalar().unwrap());

        let col = t.index((SliceKey::new(Some(1), Some(3)), "a")).unwrap().into_column().unwrap();
        assert_eq!(vec![Some(2), Some(3)], col.native_values::<i64>().unwrap());

        let range = t
            .index(IndexKey::Tuple(vec![IndexKey::Int(0), IndexKey::NameRange("a".into(), "b".into())]))
            .unwrap()
            .into_table()
            .unwrap();
        assert_eq!((1, 2), range.shape());

        let by_type = t
            .index(IndexKey::Tuple(vec![
                IndexKey::Slice(SliceKey::default()),
                IndexKey::DtypeList(vec![DataType::Float64, DataType::Utf8]),
            ]))
            .unwrap()
            .into_table()
            .unwrap();
        assert_eq!(vec!["b", "c"], by_type.column_names());
    }

    #[test]
    fn failures() {
        let t = table();
        let kind = |key: IndexKey| t.index(key).unwrap_err().kind();
        assert_eq!(
            ErrorKind::InvalidArgument,
            kind(IndexKey::Tuple(vec![IndexKey::Int(0), IndexKey::Int(0), IndexKey::Int(0)]))
        );
        assert_eq!(ErrorKind::NotImplemented, kind(IndexKey::Float(1.0)));
        assert_eq!(ErrorKind::NotImplemented, kind(("a", "b").into()));
        assert_eq!(
            ErrorKind::InvalidArgument,
            kind(IndexKey::Seq(vec![ScalarValue::Int64(0), ScalarValue::from("a")]))
        );
        assert_eq!(ErrorKind::Shape, kind(IndexKey::Int(10)));
        assert_eq!(ErrorKind::Shape, kind((0i64, 5i64).into()));
        assert_eq!(ErrorKind::NotFound, kind("nope".into()));
    }
}
