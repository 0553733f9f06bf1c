//! Building tables from loosely typed data.

use floe_error::{DbError, Result};
use indexmap::IndexMap;
use tracing::trace;

use super::Table;
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::column::Column;

/// Input accepted by [`Table::try_from_data`].
#[derive(Debug, Clone)]
pub enum TableData {
    Empty,
    /// Column name to values.
    Mapping(IndexMap<String, Vec<ScalarValue>>),
    /// One map per row. Keys missing from a row are null.
    Records(Vec<IndexMap<String, ScalarValue>>),
    /// A sequence of sequences, either rows or columns.
    Rows(Vec<Vec<ScalarValue>>),
    /// A single column.
    Values(Vec<ScalarValue>),
    Columns(Vec<Column>),
    Scalar(ScalarValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Row,
    Column,
}

/// Name and optional datatype for a constructed column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: Option<DataType>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>) -> Self {
        ColumnSpec {
            name: name.into(),
            dtype: None,
        }
    }

    pub fn typed(name: impl Into<String>, dtype: DataType) -> Self {
        ColumnSpec {
            name: name.into(),
            dtype: Some(dtype),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableOptions {
    pub columns: Option<Vec<ColumnSpec>>,
    pub orientation: Option<Orientation>,
}

impl TableOptions {
    pub fn with_columns(mut self, columns: Vec<ColumnSpec>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_names<S: AsRef<str>>(self, names: &[S]) -> Self {
        self.with_columns(names.iter().map(|n| ColumnSpec::new(n.as_ref())).collect())
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }
}

impl Table {
    pub fn try_from_data(data: TableData, options: TableOptions) -> Result<Table> {
        let specs = options.columns.as_deref();
        let columns = match data {
            TableData::Empty => {
                let columns = specs
                    .unwrap_or_default()
                    .iter()
                    .map(|s| Column::full_null(s.name.clone(), s.dtype.as_ref().unwrap_or(&DataType::Float32), 0))
                    .collect();
                return Table::try_new(columns);
            }
            TableData::Scalar(value) => {
                return Err(DbError::invalid_argument("Cannot build a table from a bare scalar")
                    .with_field("value", value));
            }
            TableData::Mapping(mapping) => mapping
                .into_iter()
                .map(|(name, values)| Column::from_values(name, values))
                .collect::<Result<Vec<_>>>()?,
            TableData::Records(records) => return from_records(records, specs),
            TableData::Rows(rows) => {
                let orientation = options.orientation.unwrap_or_else(|| infer_orientation(&rows, specs));
                trace!(?orientation, outer = rows.len(), "building table from nested sequences");
                let columns = match orientation {
                    Orientation::Column => rows,
                    Orientation::Row => transpose_rows(rows)?,
                };
                columns
                    .into_iter()
                    .enumerate()
                    .map(|(idx, values)| Column::from_values(default_name(idx), values))
                    .collect::<Result<Vec<_>>>()?
            }
            TableData::Values(values) => vec![Column::from_values(default_name(0), values)?],
            TableData::Columns(columns) => columns,
        };
        let columns = match specs {
            Some(specs) => apply_specs(columns, specs)?,
            None => columns,
        };
        Table::try_new(columns)
    }

    /// Build a table from named columns of values.
    pub fn from_mapping<S: Into<String>>(mapping: impl IntoIterator<Item = (S, Vec<ScalarValue>)>) -> Result<Table> {
        let mapping = mapping.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Table::try_from_data(TableData::Mapping(mapping), TableOptions::default())
    }
}

/// Name given to the column at `idx` when none is supplied.
pub fn default_name(idx: usize) -> String {
    format!("column_{idx}")
}

/// Row orientation only when the names fit the inner length but not the
/// outer length. Square input is column oriented.
fn infer_orientation(rows: &[Vec<ScalarValue>], specs: Option<&[ColumnSpec]>) -> Orientation {
    match (specs, rows.first()) {
        (Some(specs), Some(first)) if specs.len() == first.len() && specs.len() != rows.len() => Orientation::Row,
        _ => Orientation::Column,
    }
}

fn transpose_rows(rows: Vec<Vec<ScalarValue>>) -> Result<Vec<Vec<ScalarValue>>> {
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut columns: Vec<Vec<ScalarValue>> = (0..width).map(|_| Vec::with_capacity(rows.len())).collect();
    for (idx, row) in rows.into_iter().enumerate() {
        if row.len() != width {
            return Err(DbError::shape("Rows have different lengths")
                .with_field("row", idx)
                .with_field("expected", width)
                .with_field("len", row.len()));
        }
        for (col, value) in columns.iter_mut().zip(row) {
            col.push(value);
        }
    }
    Ok(columns)
}

/// Column names are the union of record keys in first seen order, unless
/// names are given, in which case they select keys.
fn from_records(records: Vec<IndexMap<String, ScalarValue>>, specs: Option<&[ColumnSpec]>) -> Result<Table> {
    let names: Vec<String> = match specs {
        Some(specs) => specs.iter().map(|s| s.name.clone()).collect(),
        None => {
            let mut names: IndexMap<&str, ()> = IndexMap::new();
            for record in &records {
                for key in record.keys() {
                    names.insert(key.as_str(), ());
                }
            }
            names.into_keys().map(str::to_string).collect()
        }
    };

    let mut columns = Vec::with_capacity(names.len());
    for (idx, name) in names.iter().enumerate() {
        let values: Vec<ScalarValue> = records
            .iter()
            .map(|r| r.get(name).cloned().unwrap_or(ScalarValue::Null))
            .collect();
        let column = Column::from_values(name.clone(), values)?;
        let column = match specs.and_then(|s| s[idx].dtype.as_ref()) {
            Some(dtype) => column.strict_cast(dtype)?,
            None => column,
        };
        columns.push(column);
    }
    Table::try_new(columns)
}

fn apply_specs(columns: Vec<Column>, specs: &[ColumnSpec]) -> Result<Vec<Column>> {
    if columns.len() != specs.len() {
        return Err(DbError::shape("Number of column names doesn't match the data")
            .with_field("names", specs.len())
            .with_field("columns", columns.len()));
    }
    columns
        .into_iter()
        .zip(specs)
        .map(|(column, spec)| {
            let column = column.with_name(spec.name.clone());
            match &spec.dtype {
                Some(dtype) => column.strict_cast(dtype),
                None => Ok(column),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use floe_error::ErrorKind;

    use super::*;

    fn ints(values: &[i64]) -> Vec<ScalarValue> {
        values.iter().map(|v| ScalarValue::Int64(*v)).collect()
    }

    #[test]
    fn empty_inputs() {
        let t = Table::try_from_data(TableData::Empty, TableOptions::default()).unwrap();
        assert_eq!((0, 0), t.shape());

        let t = Table::try_from_data(TableData::Rows(Vec::new()), TableOptions::default()).unwrap();
        assert_eq!((0, 0), t.shape());

        let opts = TableOptions::default().with_columns(vec![ColumnSpec::new("a"), ColumnSpec::typed("b", DataType::Utf8)]);
        let t = Table::try_from_data(TableData::Empty, opts).unwrap();
        assert_eq!(vec![DataType::Float32, DataType::Utf8], t.dtypes());
    }

    #[test]
    fn mapping_infers_types() {
        let t = Table::from_mapping([
            ("a", ints(&[1, 2])),
            ("b", vec![ScalarValue::Int64(1), ScalarValue::Float64(2.5)]),
            ("c", vec![ScalarValue::Null, ScalarValue::Null]),
        ])
        .unwrap();
        assert_eq!(vec![DataType::Int64, DataType::Float64, DataType::Float32], t.dtypes());
    }

    #[test]
    fn unequal_lengths() {
        let err = Table::from_mapping([("a", ints(&[1, 2])), ("b", ints(&[1]))]).unwrap_err();
        assert_eq!(ErrorKind::Shape, err.kind());
    }

    #[test]
    fn records_fill_missing_keys() {
        let mut first = IndexMap::new();
        first.insert("a".to_string(), ScalarValue::Int64(1));
        let mut second = IndexMap::new();
        second.insert("b".to_string(), ScalarValue::from("x"));
        second.insert("a".to_string(), ScalarValue::Int64(2));
        let t = Table::try_from_data(TableData::Records(vec![first, second]), TableOptions::default()).unwrap();
        assert_eq!(vec!["a", "b"], t.column_names());
        assert_eq!(ScalarValue::Null, t.column("b").unwrap().get(0).unwrap());
    }

    #[test]
    fn orientation() {
        let rows = vec![ints(&[1, 2, 3]), ints(&[4, 5, 6])];

        // Names match the inner length.
        let opts = TableOptions::default().with_names(&["a", "b", "c"]);
        let t = Table::try_from_data(TableData::Rows(rows.clone()), opts).unwrap();
        assert_eq!((2, 3), t.shape());

        let t = Table::try_from_data(TableData::Rows(rows.clone()), TableOptions::default()).unwrap();
        assert_eq!((3, 2), t.shape());
        assert_eq!(vec!["column_0", "column_1"], t.column_names());

        let square = vec![ints(&[1, 2]), ints(&[3, 4])];
        let opts = TableOptions::default().with_names(&["a", "b"]);
        let t = Table::try_from_data(TableData::Rows(square.clone()), opts).unwrap();
        assert_eq!(vec![Some(1), Some(2)], t.column("a").unwrap().native_values::<i64>().unwrap());

        let opts = TableOptions::default().with_orientation(Orientation::Row);
        let t = Table::try_from_data(TableData::Rows(square), opts).unwrap();
        assert_eq!(vec![Some(1), Some(3)], t.column("column_0").unwrap().native_values::<i64>().unwrap());
    }

    #[test]
    fn spec_overrides() {
        let opts = TableOptions::default().with_columns(vec![ColumnSpec::typed("x", DataType::Int32)]);
        let t = Table::try_from_data(TableData::Values(ints(&[1, 2])), opts).unwrap();
        assert_eq!(vec![DataType::Int32], t.dtypes());

        let opts = TableOptions::default().with_names(&["x", "y"]);
        let err = Table::try_from_data(TableData::Values(ints(&[1])), opts).unwrap_err();
        assert_eq!(ErrorKind::Shape, err.kind());

        let err = Table::try_from_data(TableData::Scalar(ScalarValue::Int64(1)), TableOptions::default()).unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, err.kind());
    }
}
