use std::fmt;
use std::str::FromStr;

use floe_error::{DbError, Result};
use indexmap::IndexMap;
use tracing::trace;

use super::{Table, check_unique_names};
use crate::arrays::array::Array;
use crate::arrays::datatype::{DataType, supertype};
use crate::column::Column;
use crate::column::cmp::categorical_dictionary;

/// How [`concat`] combines tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcatMethod {
    /// Stack rows. Schemas must match.
    #[default]
    Vertical,
    /// Place columns side by side. Heights must match.
    Horizontal,
    /// Stack rows over the union of all columns, filling absent columns
    /// with nulls.
    Diagonal,
}

impl fmt::Display for ConcatMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertical => write!(f, "vertical"),
            Self::Horizontal => write!(f, "horizontal"),
            Self::Diagonal => write!(f, "diagonal"),
        }
    }
}

impl FromStr for ConcatMethod {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "vertical" => Self::Vertical,
            "horizontal" => Self::Horizontal,
            "diagonal" => Self::Diagonal,
            other => {
                return Err(DbError::invalid_argument("Unknown concat method")
                    .with_field("method", other.to_string()))
            }
        })
    }
}

impl Table {
    /// New table with extra columns appended.
    pub fn hstack(&self, columns: &[Column]) -> Result<Table> {
        let mut out = self.clone();
        out.hstack_mut(columns)?;
        Ok(out)
    }

    pub fn hstack_mut(&mut self, columns: &[Column]) -> Result<()> {
        let height = match self.width() {
            0 => columns.first().map(|c| c.len()).unwrap_or(0),
            _ => self.height(),
        };
        if let Some(bad) = columns.iter().find(|c| c.len() != height) {
            return Err(DbError::shape("Cannot hstack column with a different height")
                .with_field("column", bad.name())
                .with_field("len", bad.len())
                .with_field("height", height));
        }
        check_unique_names(self.columns.iter().chain(columns).map(|c| c.name()))?;
        self.columns.extend(columns.iter().cloned());
        Ok(())
    }

    /// Stack the rows of `other` below this table. Chunks are appended, not
    /// copied.
    pub fn vstack(&self, other: &Table) -> Result<Table> {
        let mut out = self.clone();
        out.vstack_mut(other)?;
        Ok(out)
    }

    pub fn vstack_mut(&mut self, other: &Table) -> Result<()> {
        self.append_rows(other, false)
    }

    /// Append the rows of `other` into the last chunk of every column.
    pub fn extend(&mut self, other: &Table) -> Result<()> {
        self.append_rows(other, true)
    }

    fn append_rows(&mut self, other: &Table, into_last_chunk: bool) -> Result<()> {
        if self.width() == 0 {
            *self = other.clone();
            return Ok(());
        }
        check_same_schema(self, other)?;
        for (dst, src) in self.columns.iter_mut().zip(other.columns()) {
            append_column(dst, src, into_last_chunk)?;
        }
        Ok(())
    }
}

fn check_same_schema(left: &Table, right: &Table) -> Result<()> {
    if left.width() != right.width() {
        return Err(DbError::schema("Cannot stack tables with different widths")
            .with_field("left", left.width())
            .with_field("right", right.width()));
    }
    for (l, r) in left.columns().iter().zip(right.columns()) {
        if l.name() != r.name() || l.datatype() != r.datatype() {
            return Err(DbError::schema("Cannot stack tables with different schemas")
                .with_field("left", format!("{}: {}", l.name(), l.datatype()))
                .with_field("right", format!("{}: {}", r.name(), r.datatype())));
        }
    }
    Ok(())
}

/// Categoricals with different dictionaries are merged into a single
/// re-encoded chunk.
fn append_column(dst: &mut Column, src: &Column, into_last_chunk: bool) -> Result<()> {
    let shared = match (categorical_dictionary(dst), categorical_dictionary(src)) {
        (Some(l), Some(r)) => l.is_compatible(r),
        _ => true,
    };
    if !shared {
        let parts: Vec<&Array> = dst.chunks().iter().chain(src.chunks()).collect();
        let merged = Array::concat(&parts)?;
        *dst = Column::new(dst.name(), merged);
        return Ok(());
    }
    if into_last_chunk {
        dst.extend(src)
    } else {
        dst.append(src)
    }
}

/// Combine tables with the given method.
pub fn concat(tables: &[Table], method: ConcatMethod, rechunk: bool) -> Result<Table> {
    if tables.is_empty() {
        return Err(DbError::invalid_argument("Cannot concat an empty list of tables"));
    }
    trace!(%method, tables = tables.len(), "concat");
    let out = match method {
        ConcatMethod::Vertical => {
            let mut non_empty = tables.iter().filter(|t| t.width() > 0);
            let mut out = match non_empty.next() {
                Some(first) => first.clone(),
                None => return Ok(Table::empty()),
            };
            for table in non_empty {
                out.vstack_mut(table)?;
            }
            out
        }
        ConcatMethod::Horizontal => {
            let mut out = Table::empty();
            for table in tables {
                out.hstack_mut(table.columns())?;
            }
            out
        }
        ConcatMethod::Diagonal => concat_diagonal(tables)?,
    };
    if rechunk { out.rechunk() } else { Ok(out) }
}

fn concat_diagonal(tables: &[Table]) -> Result<Table> {
    let mut union: IndexMap<String, DataType> = IndexMap::new();
    for table in tables {
        for column in table.columns() {
            match union.get_mut(column.name()) {
                Some(existing) => {
                    let common = supertype(existing, column.datatype()).ok_or_else(|| {
                        DbError::schema("Cannot concat columns with incompatible datatypes")
                            .with_field("column", column.name())
                            .with_field("left", existing.to_string())
                            .with_field("right", column.datatype())
                    })?;
                    *existing = common;
                }
                None => {
                    union.insert(column.name().to_string(), column.datatype().clone());
                }
            }
        }
    }

    let mut out = Table::empty();
    for table in tables.iter().filter(|t| t.width() > 0) {
        let columns = union
            .iter()
            .map(|(name, datatype)| match table.index_of(name) {
                Some(idx) => table.columns()[idx].cast(datatype),
                None => Ok(Column::full_null(name.clone(), datatype, table.height())),
            })
            .collect::<Result<Vec<_>>>()?;
        out.vstack_mut(&Table::new_unchecked(columns))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use floe_error::ErrorKind;

    use super::*;
    use crate::arrays::categorical::StringCache;
    use crate::arrays::scalar::ScalarValue;

    fn table() -> Table {
        Table::try_new(vec![
            Column::from_slice("a", &[1i64, 2]),
            Column::from_strs("b", &["x", "y"]),
        ])
        .unwrap()
    }

    #[test]
    fn vstack_appends_chunks() {
        let out = table().vstack(&table()).unwrap();
        assert_eq!((4, 2), out.shape());
        assert_eq!(2, out.n_chunks());

        let mut extended = table();
        extended.extend(&table()).unwrap();
        assert_eq!(1, extended.n_chunks());
        assert!(out.frame_equal(&extended, true));
    }

    #[test]
    fn vstack_schema_mismatch() {
        let other = Table::try_new(vec![
            Column::from_slice("a", &[1i32, 2]),
            Column::from_strs("b", &["x", "y"]),
        ])
        .unwrap();
        assert_eq!(ErrorKind::Schema, table().vstack(&other).unwrap_err().kind());
    }

    #[test]
    fn hstack_errors() {
        let err = table().hstack(&[Column::from_slice("c", &[1i64])]).unwrap_err();
        assert_eq!(ErrorKind::Shape, err.kind());
        let err = table().hstack(&[Column::from_slice("a", &[1i64, 2])]).unwrap_err();
        assert_eq!(ErrorKind::Duplicate, err.kind());
    }

    #[test]
    fn concat_methods() {
        let err = concat(&[], ConcatMethod::Vertical, false).unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, err.kind());
        assert_eq!(ErrorKind::InvalidArgument, "sideways".parse::<ConcatMethod>().unwrap_err().kind());

        let out = concat(&[Table::empty(), table(), table()], ConcatMethod::Vertical, true).unwrap();
        assert_eq!((4, 2), out.shape());
        assert_eq!(1, out.n_chunks());

        let other = Table::try_new(vec![Column::from_slice("c", &[1.5f64, 2.5])]).unwrap();
        let out = concat(&[table(), other.clone()], ConcatMethod::Horizontal, false).unwrap();
        assert_eq!(vec!["a", "b", "c"], out.column_names());

        let out = concat(&[table(), other], ConcatMethod::Diagonal, false).unwrap();
        assert_eq!((4, 3), out.shape());
        assert_eq!(ScalarValue::Null, out.column("a").unwrap().get(2).unwrap());
        assert_eq!(ScalarValue::Null, out.column("c").unwrap().get(0).unwrap());
    }

    #[test]
    fn vstack_reencodes_categoricals() {
        let cat = |values: &[&str]| {
            Table::try_new(vec![Column::from_strs("c", values).cast(&DataType::Categorical).unwrap()]).unwrap()
        };
        let out = cat(&["a", "b"]).vstack(&cat(&["b", "c"])).unwrap();
        assert_eq!(
            vec![ScalarValue::from("a"), ScalarValue::from("b"), ScalarValue::from("b"), ScalarValue::from("c")],
            out.column("c").unwrap().cast(&DataType::Utf8).unwrap().to_scalars()
        );

        let _guard = StringCache::enter();
        let out = cat(&["a"]).vstack(&cat(&["b"])).unwrap();
        assert_eq!(2, out.n_chunks());
    }
}
