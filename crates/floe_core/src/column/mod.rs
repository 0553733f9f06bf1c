//! Named, typed, chunked columns and the kernels operating on them.

pub mod aggregate;
pub mod arith;
pub mod cast;
pub mod cmp;
pub mod fill;
pub mod hash;
pub mod list;
pub mod sort;
pub mod strings;

use std::fmt;

use floe_error::{DbError, Result};

use crate::arrays::array::{Array, ArrayData};
use crate::arrays::bitmap::Bitmap;
use crate::arrays::datatype::{DataType, supertype};
use crate::arrays::native::NativeType;
use crate::arrays::scalar::ScalarValue;

/// Known ordering of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsSorted {
    Ascending,
    Descending,
    Not,
}

/// A named sequence of values backed by one or more arrays.
///
/// All chunks share the column's datatype. Row indexing is transparent to
/// chunk boundaries. There is always at least one chunk, possibly empty.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    datatype: DataType,
    chunks: Vec<Array>,
    sorted: IsSorted,
}

impl Column {
    pub fn new(name: impl Into<String>, array: Array) -> Self {
        Column {
            name: name.into(),
            datatype: array.datatype().clone(),
            chunks: vec![array],
            sorted: IsSorted::Not,
        }
    }

    pub fn try_from_chunks(
        name: impl Into<String>,
        datatype: DataType,
        chunks: Vec<Array>,
    ) -> Result<Self> {
        for chunk in &chunks {
            if chunk.datatype() != &datatype {
                return Err(DbError::schema("Chunk datatype doesn't match column datatype")
                    .with_field("column", &datatype)
                    .with_field("chunk", chunk.datatype()));
            }
        }
        let chunks = if chunks.is_empty() {
            vec![Array::new_null(&datatype, 0)]
        } else {
            chunks
        };
        Ok(Column {
            name: name.into(),
            datatype,
            chunks,
            sorted: IsSorted::Not,
        })
    }

    pub fn from_scalars(
        name: impl Into<String>,
        datatype: &DataType,
        values: &[ScalarValue],
    ) -> Result<Self> {
        Ok(Column::new(name, Array::from_scalars(datatype, values)?))
    }

    /// Create a column from values, inferring the datatype.
    pub fn from_values<T: Into<ScalarValue>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Result<Self> {
        let values: Vec<ScalarValue> = values.into_iter().map(Into::into).collect();
        let datatype = infer_datatype(&values);
        let values = coerce_for_inference(&datatype, values)?;
        Column::from_scalars(name, &datatype, &values)
    }

    pub fn from_slice<T: NativeType>(name: impl Into<String>, values: &[T]) -> Self {
        Column::new(name, Array::from_native(values.to_vec()))
    }

    pub fn from_opt<T: NativeType>(name: impl Into<String>, values: Vec<Option<T>>) -> Self {
        Column::new(name, Array::from_native_opt(values))
    }

    pub fn from_strs(name: impl Into<String>, values: &[&str]) -> Self {
        Column::new(
            name,
            Array::from_strings(values.iter().map(|s| s.to_string()).collect()),
        )
    }

    pub fn from_bools(name: impl Into<String>, values: &[bool]) -> Self {
        Column::new(name, Array::from_bools(values.to_vec()))
    }

    pub fn full_null(name: impl Into<String>, datatype: &DataType, len: usize) -> Self {
        Column::new(name, Array::new_null(datatype, len))
    }

    /// A column repeating `value` `len` times.
    pub fn full(
        name: impl Into<String>,
        value: &ScalarValue,
        datatype: &DataType,
        len: usize,
    ) -> Result<Self> {
        if value.is_null() {
            return Ok(Column::full_null(name, datatype, len));
        }
        let single = Array::from_scalars(datatype, std::slice::from_ref(value))?;
        let indices = vec![0; len];
        Ok(Column::new(name, single.take(&indices)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn datatype(&self) -> &DataType {
        &self.datatype
    }

    pub fn chunks(&self) -> &[Array] {
        &self.chunks
    }

    pub fn n_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        self.chunks.iter().map(|c| c.null_count()).sum()
    }

    pub fn sorted(&self) -> IsSorted {
        self.sorted
    }

    pub fn with_sorted(mut self, sorted: IsSorted) -> Self {
        self.sorted = sorted;
        self
    }

    /// Locate the chunk and offset within the chunk for a row.
    fn chunk_index(&self, mut idx: usize) -> Option<(usize, usize)> {
        for (chunk_idx, chunk) in self.chunks.iter().enumerate() {
            if idx < chunk.len() {
                return Some((chunk_idx, idx));
            }
            idx -= chunk.len();
        }
        None
    }

    fn out_of_bounds(&self, idx: usize) -> DbError {
        DbError::shape("Index out of bounds")
            .with_field("index", idx)
            .with_field("len", self.len())
    }

    /// Get the value at a row.
    pub fn get(&self, idx: usize) -> Result<ScalarValue> {
        let (chunk, offset) = self
            .chunk_index(idx)
            .ok_or_else(|| self.out_of_bounds(idx))?;
        Ok(self.chunks[chunk].value(offset))
    }

    pub fn is_valid(&self, idx: usize) -> bool {
        self.chunk_index(idx)
            .is_some_and(|(chunk, offset)| self.chunks[chunk].is_valid(offset))
    }

    /// Mark a row as null. Storage shared with other columns is left
    /// untouched.
    ///
    /// The sorted flag only survives when the new null is the sole null and
    /// sits at either end of the column.
    pub fn set_null(&mut self, idx: usize) -> Result<()> {
        let (chunk, offset) = self
            .chunk_index(idx)
            .ok_or_else(|| self.out_of_bounds(idx))?;
        if !self.chunks[chunk].is_valid(offset) {
            return Ok(());
        }
        let at_end = idx == 0 || idx + 1 == self.len();
        if !at_end || self.null_count() > 0 {
            self.sorted = IsSorted::Not;
        }
        self.chunks[chunk].set_null(offset)
    }

    pub fn iter(&self) -> impl Iterator<Item = ScalarValue> + '_ {
        self.chunks
            .iter()
            .flat_map(|c| (0..c.len()).map(move |idx| c.value(idx)))
    }

    pub fn validity_iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.chunks.iter().flat_map(|c| c.validity_iter())
    }

    pub fn to_scalars(&self) -> Vec<ScalarValue> {
        self.iter().collect()
    }

    /// Get all values as a single array.
    pub fn to_array(&self) -> Result<Array> {
        let chunks: Vec<&Array> = self.chunks.iter().collect();
        Array::concat(&chunks)
    }

    /// Merge all chunks into one.
    pub fn rechunk(&self) -> Result<Column> {
        if self.chunks.len() == 1 {
            return Ok(self.clone());
        }
        Ok(Column {
            name: self.name.clone(),
            datatype: self.datatype.clone(),
            chunks: vec![self.to_array()?],
            sorted: self.sorted,
        })
    }

    /// Rechunk and drop excess capacity.
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        if self.chunks.len() > 1 {
            self.chunks = vec![self.to_array()?];
        }
        for chunk in &mut self.chunks {
            chunk.shrink_to_fit();
        }
        Ok(())
    }

    /// Zero-copy slice.
    ///
    /// A negative offset counts from the end. The slice is clamped to the
    /// bounds of the column.
    pub fn slice(&self, offset: i64, len: usize) -> Column {
        let (start, len) = resolve_slice(offset, len, self.len());

        let mut chunks = Vec::new();
        let mut remaining = len;
        let mut skip = start;
        for chunk in &self.chunks {
            if remaining == 0 {
                break;
            }
            if skip >= chunk.len() {
                skip -= chunk.len();
                continue;
            }
            let take = (chunk.len() - skip).min(remaining);
            chunks.push(chunk.slice(skip, take));
            remaining -= take;
            skip = 0;
        }
        if chunks.is_empty() {
            chunks.push(Array::new_null(&self.datatype, 0));
        }

        Column {
            name: self.name.clone(),
            datatype: self.datatype.clone(),
            chunks,
            sorted: self.sorted,
        }
    }

    pub fn head(&self, n: usize) -> Column {
        self.slice(0, n)
    }

    pub fn tail(&self, n: usize) -> Column {
        let n = n.min(self.len());
        self.slice((self.len() - n) as i64, n)
    }

    fn with_array(&self, array: Array) -> Column {
        Column {
            name: self.name.clone(),
            datatype: array.datatype().clone(),
            chunks: vec![array],
            sorted: IsSorted::Not,
        }
    }

    /// Gather rows. Errors if any index is out of bounds.
    pub fn take(&self, indices: &[usize]) -> Result<Column> {
        let len = self.len();
        if let Some(bad) = indices.iter().find(|&&idx| idx >= len) {
            return Err(self.out_of_bounds(*bad));
        }
        if self.chunks.len() == 1 {
            return Ok(self.with_array(self.chunks[0].take(indices)));
        }
        Ok(self.with_array(self.to_array()?.take(indices)))
    }

    /// Gather rows where `None` produces null.
    pub fn take_opt(&self, indices: &[Option<usize>]) -> Result<Column> {
        let len = self.len();
        if let Some(bad) = indices.iter().flatten().find(|&&idx| idx >= len) {
            return Err(self.out_of_bounds(*bad));
        }
        Ok(self.with_array(self.to_array()?.take_opt(indices)))
    }

    /// Keep rows where `mask` is true. Null mask entries drop the row.
    pub fn filter(&self, mask: &Column) -> Result<Column> {
        let mask = mask.bool_mask()?;
        if mask.len() != self.len() {
            return Err(DbError::shape("Filter mask length doesn't match column length")
                .with_field("mask", mask.len())
                .with_field("column", self.len()));
        }
        let mut out = self.with_array(self.to_array()?.filter(&mask));
        out.sorted = self.sorted;
        Ok(out)
    }

    /// Boolean values with nulls treated as false.
    pub fn bool_mask(&self) -> Result<Vec<bool>> {
        Ok(self
            .bool_values()?
            .into_iter()
            .map(|v| v.unwrap_or(false))
            .collect())
    }

    pub fn bool_values(&self) -> Result<Vec<Option<bool>>> {
        let mut out = Vec::with_capacity(self.len());
        for chunk in &self.chunks {
            match chunk.data() {
                ArrayData::Boolean(values) => out.extend(
                    values
                        .as_slice()
                        .iter()
                        .enumerate()
                        .map(|(idx, v)| chunk.is_valid(idx).then_some(*v)),
                ),
                ArrayData::Null(len) => out.extend(std::iter::repeat_n(None, *len)),
                _ => {
                    return Err(DbError::schema("Expected a boolean column")
                        .with_field("column", &self.name)
                        .with_field("datatype", &self.datatype));
                }
            }
        }
        Ok(out)
    }

    /// Typed values with validity.
    pub fn native_values<T: NativeType>(&self) -> Result<Vec<Option<T>>> {
        let mut out = Vec::with_capacity(self.len());
        for chunk in &self.chunks {
            let values = T::unwrap(chunk.data()).ok_or_else(|| {
                DbError::schema("Unexpected physical type for column")
                    .with_field("column", &self.name)
                    .with_field("datatype", &self.datatype)
            })?;
            out.extend(
                values
                    .as_slice()
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| chunk.is_valid(idx).then_some(*v)),
            );
        }
        Ok(out)
    }

    fn check_same_type(&self, other: &Column) -> Result<()> {
        if self.datatype != other.datatype {
            return Err(DbError::schema("Cannot append column with a different datatype")
                .with_field("column", &self.name)
                .with_field("left", &self.datatype)
                .with_field("right", &other.datatype));
        }
        Ok(())
    }

    /// Append the chunks of another column.
    pub fn append(&mut self, other: &Column) -> Result<()> {
        self.check_same_type(other)?;
        self.chunks.retain(|c| !c.is_empty());
        self.chunks
            .extend(other.chunks.iter().filter(|c| !c.is_empty()).cloned());
        if self.chunks.is_empty() {
            self.chunks.push(Array::new_null(&self.datatype, 0));
        }
        self.sorted = IsSorted::Not;
        Ok(())
    }

    /// Append values of another column into the last chunk.
    pub fn extend(&mut self, other: &Column) -> Result<()> {
        self.check_same_type(other)?;
        let mut parts: Vec<&Array> = Vec::with_capacity(other.chunks.len() + 1);
        if let Some(last) = self.chunks.last() {
            parts.push(last);
        }
        parts.extend(other.chunks.iter());
        let merged = Array::concat(&parts)?;
        self.chunks.pop();
        self.chunks.push(merged);
        self.sorted = IsSorted::Not;
        Ok(())
    }

    pub fn is_null(&self) -> Column {
        let values: Vec<bool> = self.validity_iter().map(|v| !v).collect();
        Column::new(self.name.clone(), Array::from_bools(values))
    }

    pub fn is_not_null(&self) -> Column {
        let values: Vec<bool> = self.validity_iter().collect();
        Column::new(self.name.clone(), Array::from_bools(values))
    }

    /// Indices of the rows holding `true`.
    pub fn arg_true(&self) -> Result<Column> {
        let indices: Vec<u32> = self
            .bool_values()?
            .into_iter()
            .enumerate()
            .filter(|(_, v)| *v == Some(true))
            .map(|(idx, _)| idx as u32)
            .collect();
        Ok(Column::new(self.name.clone(), Array::from_native(indices)))
    }

    pub fn reverse(&self) -> Result<Column> {
        let indices: Vec<usize> = (0..self.len()).rev().collect();
        let mut out = self.take(&indices)?;
        out.sorted = match self.sorted {
            IsSorted::Ascending => IsSorted::Descending,
            IsSorted::Descending => IsSorted::Ascending,
            IsSorted::Not => IsSorted::Not,
        };
        Ok(out)
    }

    /// Check equality of values, optionally treating nulls as equal to each
    /// other. Names are not compared.
    pub fn series_equal(&self, other: &Column, null_equal: bool) -> bool {
        if self.len() != other.len() || self.datatype != other.datatype {
            return false;
        }
        self.iter().zip(other.iter()).all(|(a, b)| {
            if a.is_null() || b.is_null() {
                null_equal && a.is_null() && b.is_null()
            } else {
                a == b
            }
        })
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [", self.name, self.datatype)?;
        for (idx, v) in self.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

/// Resolve a possibly negative offset and length against a total length.
pub(crate) fn resolve_slice(offset: i64, len: usize, total: usize) -> (usize, usize) {
    let start = if offset < 0 {
        total.saturating_sub(offset.unsigned_abs() as usize)
    } else {
        (offset as usize).min(total)
    };
    let len = len.min(total - start);
    (start, len)
}

/// Infer a datatype for loosely typed values.
///
/// Numeric values widen to their supertype, nested lists widen their inner
/// types. Anything else that mixes types is treated as opaque objects.
/// Inputs with no non-null values default to Float32.
pub fn infer_datatype(values: &[ScalarValue]) -> DataType {
    let mut current: Option<DataType> = None;
    for value in values.iter().filter(|v| !v.is_null()) {
        let dt = value.datatype();
        current = Some(match current {
            None => dt,
            Some(existing) if existing == dt => existing,
            Some(existing) => {
                let compatible = (existing.is_numeric() && dt.is_numeric())
                    || (existing.is_temporal() && dt.is_temporal())
                    || (matches!(existing, DataType::List(_)) && matches!(dt, DataType::List(_)));
                match supertype(&existing, &dt) {
                    Some(sup) if compatible => sup,
                    _ => return DataType::Object,
                }
            }
        });
    }
    current.unwrap_or(DataType::Float32)
}

/// Make values built for `datatype` by inference acceptable to the array
/// builder (e.g. integers in a float column are converted).
fn coerce_for_inference(datatype: &DataType, values: Vec<ScalarValue>) -> Result<Vec<ScalarValue>> {
    match datatype {
        DataType::List(_) | DataType::Datetime(_) => values
            .iter()
            .map(|v| cast::cast_scalar(v, datatype, false))
            .collect(),
        _ => Ok(values),
    }
}

/// Builds a validity bitmap from optional values.
pub(crate) fn validity_from<T>(values: &[Option<T>]) -> Bitmap {
    values.iter().map(|v| v.is_some()).collect()
}
