//! Tables of equal length, uniquely named columns.

pub mod combine;
pub mod construct;
pub mod index;
pub mod ops;
pub mod reshape;
pub mod rows;

use std::fmt;

use floe_error::{DbError, Result};

use crate::arrays::datatype::{DataType, Field};
use crate::arrays::schema::{Schema, column_not_found};
use crate::column::Column;
use crate::logical::lazy::LazyFrame;

/// An ordered collection of columns with the same length and distinct
/// names.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Create a table, checking that all columns have the same length and
    /// that names are unique.
    pub fn try_new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let height = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != height) {
                return Err(DbError::shape("Columns have different lengths")
                    .with_field("expected", height)
                    .with_field("column", bad.name())
                    .with_field("len", bad.len()));
            }
        }
        check_unique_names(columns.iter().map(|c| c.name()))?;
        Ok(Table { columns })
    }

    /// Create a table without checking invariants. Callers must guarantee
    /// equal lengths and unique names.
    pub(crate) fn new_unchecked(columns: Vec<Column>) -> Self {
        Table { columns }
    }

    pub fn empty() -> Self {
        Table {
            columns: Vec::new(),
        }
    }

    /// Zero row table with the given schema.
    pub fn empty_with_schema(schema: &Schema) -> Self {
        Table {
            columns: schema
                .iter()
                .map(|f| Column::full_null(f.name.clone(), &f.datatype, 0))
                .collect(),
        }
    }

    pub fn height(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// (height, width)
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    pub fn dtypes(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.datatype().clone()).collect()
    }

    pub fn schema(&self) -> Schema {
        self.columns
            .iter()
            .map(|c| Field::new(c.name(), c.datatype().clone()))
            .collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub(crate) fn try_index_of(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| column_not_found(name, self.columns.iter().map(|c| c.name())))
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        Ok(&self.columns[self.try_index_of(name)?])
    }

    pub fn column_at(&self, idx: usize) -> Result<&Column> {
        self.columns.get(idx).ok_or_else(|| {
            DbError::shape("Column index out of range")
                .with_field("index", idx)
                .with_field("width", self.width())
        })
    }

    pub fn columns_by_name<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&Column>> {
        names.iter().map(|n| self.column(n.as_ref())).collect()
    }

    pub(crate) fn columns_mut(&mut self) -> &mut Vec<Column> {
        &mut self.columns
    }

    pub fn lazy(&self) -> LazyFrame {
        LazyFrame::scan_table(self.clone())
    }
}

pub(crate) fn check_unique_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = hashbrown::HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(DbError::duplicate("Duplicate column name").with_field("name", name.to_string()));
        }
    }
    Ok(())
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "shape: ({}, {})", self.height(), self.width())?;
        let header: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.name(), c.datatype()))
            .collect();
        writeln!(f, "{}", header.join(" | "))?;
        for row in 0..self.height() {
            let values: Vec<String> = self
                .columns
                .iter()
                .map(|c| c.get(row).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            writeln!(f, "{}", values.join(" | "))?;
        }
        Ok(())
    }
}

/// Types that wrap a [`Table`] and can be rebuilt from one.
///
/// Every table producing operation in [`FrameOps`] and [`LazyFrame`]
/// returns the wrapper type so user defined wrappers survive chains of
/// operations.
pub trait FromTable: Sized {
    fn from_table(table: Table) -> Self;
    fn as_table(&self) -> &Table;
}

impl FromTable for Table {
    fn from_table(table: Table) -> Self {
        table
    }

    fn as_table(&self) -> &Table {
        self
    }
}

/// Table operations returning the implementing wrapper type.
pub trait FrameOps: FromTable {
    fn head(&self, n: usize) -> Self {
        Self::from_table(self.as_table().head(n))
    }

    fn tail(&self, n: usize) -> Self {
        Self::from_table(self.as_table().tail(n))
    }

    fn slice(&self, offset: i64, len: usize) -> Self {
        Self::from_table(self.as_table().slice(offset, len))
    }

    fn filter(&self, mask: &Column) -> Result<Self> {
        Ok(Self::from_table(self.as_table().filter(mask)?))
    }

    fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        Ok(Self::from_table(self.as_table().select(names)?))
    }

    fn with_column(&self, column: Column) -> Result<Self> {
        Ok(Self::from_table(self.as_table().with_column(column)?))
    }

    fn drop(&self, name: &str) -> Result<Self> {
        Ok(Self::from_table(self.as_table().drop(name)?))
    }

    fn sort<S: AsRef<str>>(&self, by: &[S], descending: &[bool], nulls_last: bool) -> Result<Self> {
        Ok(Self::from_table(self.as_table().sort(by, descending, nulls_last)?))
    }

    fn vstack(&self, other: &Self) -> Result<Self> {
        Ok(Self::from_table(self.as_table().vstack(other.as_table())?))
    }

    fn lazy(&self) -> LazyFrame<Self> {
        LazyFrame::scan_table(self.as_table().clone()).into_frame_type()
    }
}

impl<F: FromTable> FrameOps for F {}

#[cfg(test)]
mod tests {
    use floe_error::ErrorKind;

    use super::*;

    #[derive(Debug)]
    struct Wrapped(Table);

    impl FromTable for Wrapped {
        fn from_table(table: Table) -> Self {
            Wrapped(table)
        }

        fn as_table(&self) -> &Table {
            &self.0
        }
    }

    fn table() -> Table {
        Table::try_new(vec![
            Column::from_slice("a", &[1i64, 2, 3]),
            Column::from_strs("b", &["x", "y", "z"]),
        ])
        .unwrap()
    }

    #[test]
    fn construction_checks() {
        let err = Table::try_new(vec![
            Column::from_slice("a", &[1i64, 2]),
            Column::from_slice("b", &[1i64]),
        ])
        .unwrap_err();
        assert_eq!(ErrorKind::Shape, err.kind());

        let err = Table::try_new(vec![
            Column::from_slice("a", &[1i64]),
            Column::from_slice("a", &[1i64]),
        ])
        .unwrap_err();
        assert_eq!(ErrorKind::Duplicate, err.kind());
    }

    #[test]
    fn missing_column_suggests_name() {
        let err = table().column("bb").unwrap_err();
        assert_eq!(ErrorKind::NotFound, err.kind());
    }

    #[test]
    fn wrapper_type_survives_ops() {
        let wrapped = Wrapped(table());
        let out: Wrapped = wrapped.head(2).filter(&Column::from_bools("m", &[true, false])).unwrap();
        assert_eq!((1, 2), out.0.shape());
    }
}
