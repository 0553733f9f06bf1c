use floe_error::{DbError, Result};

use super::Column;
use crate::arrays::array::{Array, ArrayData};
use crate::arrays::bitmap::Bitmap;
use crate::arrays::buffer::SharedBuffer;
use crate::arrays::datatype::{DataType, supertype};

impl Column {
    /// Build a list column with one row per part. Parts are cast to a common
    /// inner type. `None` parts become null rows.
    pub fn from_list_parts(
        name: impl Into<String>,
        inner: Option<&DataType>,
        parts: Vec<Option<Column>>,
    ) -> Result<Column> {
        let mut inner = inner.cloned();
        if inner.is_none() {
            for part in parts.iter().flatten() {
                inner = Some(match inner {
                    None => part.datatype().clone(),
                    Some(current) => supertype(&current, part.datatype()).ok_or_else(|| {
                        DbError::schema("List elements have incompatible datatypes")
                            .with_field("left", &current)
                            .with_field("right", part.datatype())
                    })?,
                });
            }
        }
        let inner = inner.unwrap_or(DataType::Null);

        let validity: Bitmap = parts.iter().map(|p| p.is_some()).collect();
        let arrays = parts
            .into_iter()
            .map(|part| match part {
                Some(part) => part.cast(&inner)?.to_array(),
                None => Ok(Array::new_null(&inner, 0)),
            })
            .collect::<Result<Vec<_>>>()?;

        let array = Array::try_new(
            DataType::list(inner),
            ArrayData::List(SharedBuffer::from_vec(arrays)),
            Some(validity),
        )?;
        Ok(Column::new(name, array))
    }

    /// Collapse the whole column into a single list value.
    pub fn implode(&self) -> Result<Column> {
        Column::from_list_parts(self.name(), Some(self.datatype()), vec![Some(self.clone())])
    }

    /// List elements of every row. Null rows produce `None`.
    pub fn list_parts(&self) -> Result<Vec<Option<Array>>> {
        if !matches!(self.datatype(), DataType::List(_)) {
            return Err(DbError::schema("Expected a list column")
                .with_field("column", self.name())
                .with_field("datatype", self.datatype()));
        }
        let mut out = Vec::with_capacity(self.len());
        for chunk in self.chunks() {
            if let ArrayData::List(children) = chunk.data() {
                for (idx, child) in children.as_slice().iter().enumerate() {
                    out.push(chunk.is_valid(idx).then(|| child.clone()));
                }
            }
        }
        Ok(out)
    }

    /// Flatten a list column. Returns the flattened values and, for every
    /// output row, the row of the list it came from. Empty and null lists
    /// produce a single null row.
    pub fn explode(&self) -> Result<(Column, Vec<usize>)> {
        let inner = match self.datatype() {
            DataType::List(inner) => inner.as_ref().clone(),
            _ => {
                return Err(DbError::schema("Only list columns can be exploded")
                    .with_field("column", self.name())
                    .with_field("datatype", self.datatype()));
            }
        };

        let parts = self.list_parts()?;
        let mut arrays: Vec<Array> = Vec::with_capacity(parts.len());
        let mut rows = Vec::new();
        for (row, part) in parts.into_iter().enumerate() {
            match part {
                Some(arr) if !arr.is_empty() => {
                    rows.extend(std::iter::repeat_n(row, arr.len()));
                    arrays.push(arr);
                }
                _ => {
                    rows.push(row);
                    arrays.push(Array::new_null(&inner, 1));
                }
            }
        }

        let values = if arrays.is_empty() {
            Array::new_null(&inner, 0)
        } else {
            Array::concat(&arrays.iter().collect::<Vec<_>>())?
        };
        Ok((Column::new(self.name(), values), rows))
    }

    /// List of each value repeated the number of times given by the same
    /// row of `by`. A single `by` value applies to every row. Null values
    /// or counts produce null lists.
    pub fn repeat_by(&self, by: &Column) -> Result<Column> {
        let counts = by.broadcast(self.len())?.cast(&DataType::Int64)?.native_values::<i64>()?;
        let parts = counts
            .into_iter()
            .enumerate()
            .map(|(row, count)| {
                let Some(count) = count else {
                    return Ok(None);
                };
                if !self.is_valid(row) {
                    return Ok(None);
                }
                let count = usize::try_from(count).map_err(|_| {
                    DbError::invalid_argument("Repeat count must not be negative")
                        .with_field("row", row)
                        .with_field("count", count)
                })?;
                self.take(&vec![row; count]).map(Some)
            })
            .collect::<Result<Vec<_>>>()?;
        Column::from_list_parts(self.name(), Some(self.datatype()), parts)
    }

    /// Number of elements in each list.
    pub fn list_lengths(&self) -> Result<Column> {
        let lengths = self
            .list_parts()?
            .into_iter()
            .map(|p| p.map(|a| a.len() as u32))
            .collect();
        Ok(Column::new(self.name(), Array::from_native_opt::<u32>(lengths)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::scalar::ScalarValue;

    #[test]
    fn explode_empty_and_null_lists() {
        let col = Column::from_list_parts(
            "l",
            None,
            vec![
                Some(Column::from_slice("l", &[1i64, 2])),
                Some(Column::from_slice("l", &[] as &[i64])),
                None,
            ],
        )
        .unwrap();
        assert_eq!(&DataType::list(DataType::Int64), col.datatype());

        let (values, rows) = col.explode().unwrap();
        assert_eq!(vec![0, 0, 1, 2], rows);
        assert_eq!(
            vec![
                ScalarValue::Int64(1),
                ScalarValue::Int64(2),
                ScalarValue::Null,
                ScalarValue::Null
            ],
            values.to_scalars()
        );
    }

    #[test]
    fn parts_widen_to_common_type() {
        let col = Column::from_list_parts(
            "l",
            None,
            vec![
                Some(Column::from_slice("l", &[1i32])),
                Some(Column::from_slice("l", &[1.5f64])),
            ],
        )
        .unwrap();
        assert_eq!(&DataType::list(DataType::Float64), col.datatype());
        assert_eq!(
            vec![Some(1), Some(1)],
            col.list_lengths().unwrap().native_values::<u32>().unwrap()
        );
    }

    #[test]
    fn repeat_by_counts() {
        let n = Column::from_slice("n", &[2i64, 3]);
        let out = n.repeat_by(&n).unwrap();
        assert_eq!(&DataType::list(DataType::Int64), out.datatype());
        assert_eq!(
            vec![
                ScalarValue::List(vec![ScalarValue::Int64(2), ScalarValue::Int64(2)]),
                ScalarValue::List(vec![ScalarValue::Int64(3), ScalarValue::Int64(3), ScalarValue::Int64(3)]),
            ],
            out.to_scalars()
        );

        let names = Column::from_opt("s", vec![Some(1i32), None]);
        let out = names.repeat_by(&Column::from_slice("c", &[0u32])).unwrap();
        assert_eq!(vec![ScalarValue::List(Vec::new()), ScalarValue::Null], out.to_scalars());

        let err = n.repeat_by(&Column::from_slice("c", &[-1i64])).unwrap_err();
        assert_eq!(floe_error::ErrorKind::InvalidArgument, err.kind());
    }

    #[test]
    fn implode_whole_column() {
        let col = Column::from_strs("s", &["a", "b"]).implode().unwrap();
        assert_eq!(1, col.len());
        assert_eq!(
            ScalarValue::List(vec![ScalarValue::from("a"), ScalarValue::from("b")]),
            col.get(0).unwrap()
        );
    }
}
