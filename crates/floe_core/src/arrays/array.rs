use std::sync::Arc;

use floe_error::{DbError, Result};
use num_traits::NumCast;

use super::bitmap::Bitmap;
use super::buffer::SharedBuffer;
use super::categorical::{CategoricalDictionary, StringCache};
use super::datatype::DataType;
use super::native::NativeType;
use super::object::ObjectValue;
use super::scalar::ScalarValue;

/// Physical storage for an array.
#[derive(Debug, Clone)]
pub enum ArrayData {
    /// All values null, only the length is stored.
    Null(usize),
    Boolean(SharedBuffer<bool>),
    Int8(SharedBuffer<i8>),
    Int16(SharedBuffer<i16>),
    Int32(SharedBuffer<i32>),
    Int64(SharedBuffer<i64>),
    UInt8(SharedBuffer<u8>),
    UInt16(SharedBuffer<u16>),
    UInt32(SharedBuffer<u32>),
    UInt64(SharedBuffer<u64>),
    Float32(SharedBuffer<f32>),
    Float64(SharedBuffer<f64>),
    Utf8(SharedBuffer<String>),
    /// One child array per row.
    List(SharedBuffer<Array>),
    Struct(StructData),
    Categorical(CategoricalData),
    Object(SharedBuffer<ObjectValue>),
}

#[derive(Debug, Clone)]
pub struct StructData {
    pub children: Vec<Array>,
    pub len: usize,
}

#[derive(Debug, Clone)]
pub struct CategoricalData {
    pub codes: SharedBuffer<u32>,
    pub dictionary: Arc<CategoricalDictionary>,
}

/// Apply an operation to the value buffer of every buffer backed variant.
macro_rules! map_buffer {
    ($data:expr, |$buf:ident| $body:expr, null: |$len:ident| $null_body:expr, nested: |$st:ident| $st_body:expr) => {
        match $data {
            ArrayData::Null($len) => $null_body,
            ArrayData::Boolean($buf) => ArrayData::Boolean($body),
            ArrayData::Int8($buf) => ArrayData::Int8($body),
            ArrayData::Int16($buf) => ArrayData::Int16($body),
            ArrayData::Int32($buf) => ArrayData::Int32($body),
            ArrayData::Int64($buf) => ArrayData::Int64($body),
            ArrayData::UInt8($buf) => ArrayData::UInt8($body),
            ArrayData::UInt16($buf) => ArrayData::UInt16($body),
            ArrayData::UInt32($buf) => ArrayData::UInt32($body),
            ArrayData::UInt64($buf) => ArrayData::UInt64($body),
            ArrayData::Float32($buf) => ArrayData::Float32($body),
            ArrayData::Float64($buf) => ArrayData::Float64($body),
            ArrayData::Utf8($buf) => ArrayData::Utf8($body),
            ArrayData::List($buf) => ArrayData::List($body),
            ArrayData::Object($buf) => ArrayData::Object($body),
            ArrayData::Categorical(cat) => {
                let $buf = &cat.codes;
                ArrayData::Categorical(CategoricalData {
                    codes: $body,
                    dictionary: cat.dictionary.clone(),
                })
            }
            ArrayData::Struct($st) => $st_body,
        }
    };
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            Self::Null(len) => *len,
            Self::Boolean(b) => b.len(),
            Self::Int8(b) => b.len(),
            Self::Int16(b) => b.len(),
            Self::Int32(b) => b.len(),
            Self::Int64(b) => b.len(),
            Self::UInt8(b) => b.len(),
            Self::UInt16(b) => b.len(),
            Self::UInt32(b) => b.len(),
            Self::UInt64(b) => b.len(),
            Self::Float32(b) => b.len(),
            Self::Float64(b) => b.len(),
            Self::Utf8(b) => b.len(),
            Self::List(b) => b.len(),
            Self::Struct(s) => s.len,
            Self::Categorical(c) => c.codes.len(),
            Self::Object(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slice(&self, offset: usize, len: usize) -> ArrayData {
        map_buffer!(self,
            |buf| buf.slice(offset, len),
            null: |_l| ArrayData::Null(len),
            nested: |s| ArrayData::Struct(StructData {
                children: s.children.iter().map(|c| c.slice(offset, len)).collect(),
                len,
            })
        )
    }

    fn take(&self, indices: &[usize]) -> ArrayData {
        map_buffer!(self,
            |buf| {
                let values = buf.as_slice();
                indices.iter().map(|&idx| values[idx].clone()).collect()
            },
            null: |_l| ArrayData::Null(indices.len()),
            nested: |s| ArrayData::Struct(StructData {
                children: s.children.iter().map(|c| c.take(indices)).collect(),
                len: indices.len(),
            })
        )
    }

    fn shrink_to_fit(&mut self) {
        match self {
            Self::Null(_) => (),
            Self::Boolean(b) => b.shrink_to_fit(),
            Self::Int8(b) => b.shrink_to_fit(),
            Self::Int16(b) => b.shrink_to_fit(),
            Self::Int32(b) => b.shrink_to_fit(),
            Self::Int64(b) => b.shrink_to_fit(),
            Self::UInt8(b) => b.shrink_to_fit(),
            Self::UInt16(b) => b.shrink_to_fit(),
            Self::UInt32(b) => b.shrink_to_fit(),
            Self::UInt64(b) => b.shrink_to_fit(),
            Self::Float32(b) => b.shrink_to_fit(),
            Self::Float64(b) => b.shrink_to_fit(),
            Self::Utf8(b) => b.shrink_to_fit(),
            Self::List(b) => b.shrink_to_fit(),
            Self::Struct(s) => s.children.iter_mut().for_each(|c| c.shrink_to_fit()),
            Self::Categorical(c) => c.codes.shrink_to_fit(),
            Self::Object(b) => b.shrink_to_fit(),
        }
    }
}

/// A contiguous run of values of a single datatype with optional validity.
#[derive(Debug, Clone)]
pub struct Array {
    datatype: DataType,
    validity: Option<Bitmap>,
    data: ArrayData,
}

impl Array {
    /// Create an array from parts.
    ///
    /// Errors if the validity length doesn't match the data.
    pub fn try_new(datatype: DataType, data: ArrayData, validity: Option<Bitmap>) -> Result<Self> {
        if let Some(validity) = &validity {
            if validity.len() != data.len() {
                return Err(DbError::panic("Validity length doesn't match data length")
                    .with_field("validity", validity.len())
                    .with_field("data", data.len()));
            }
        }
        // Validity that is all valid is dropped.
        let validity = validity.filter(|v| !v.is_all_true());
        Ok(Array {
            datatype,
            validity,
            data,
        })
    }

    pub(crate) fn new_unchecked(datatype: DataType, data: ArrayData, validity: Option<Bitmap>) -> Self {
        let validity = validity.filter(|v| !v.is_all_true());
        Array {
            datatype,
            validity,
            data,
        }
    }

    /// Create an array from native values with no nulls.
    pub fn from_native<T: NativeType>(values: Vec<T>) -> Self {
        Array {
            datatype: T::DATATYPE,
            validity: None,
            data: T::wrap(SharedBuffer::from_vec(values)),
        }
    }

    /// Create an array from optional native values.
    pub fn from_native_opt<T: NativeType>(values: Vec<Option<T>>) -> Self {
        let validity: Bitmap = values.iter().map(|v| v.is_some()).collect();
        let values: Vec<T> = values.into_iter().map(|v| v.unwrap_or_default()).collect();
        Array::new_unchecked(
            T::DATATYPE,
            T::wrap(SharedBuffer::from_vec(values)),
            Some(validity),
        )
    }

    /// Reinterpret a native array as some other logical type sharing the same
    /// physical layout (e.g. Int32 as Date).
    pub fn with_logical_type(mut self, datatype: DataType) -> Self {
        self.datatype = datatype;
        self
    }

    pub fn from_bools(values: Vec<bool>) -> Self {
        Array {
            datatype: DataType::Boolean,
            validity: None,
            data: ArrayData::Boolean(SharedBuffer::from_vec(values)),
        }
    }

    pub fn from_bools_opt(values: Vec<Option<bool>>) -> Self {
        let validity: Bitmap = values.iter().map(|v| v.is_some()).collect();
        let values = values.into_iter().map(|v| v.unwrap_or(false)).collect();
        Array::new_unchecked(
            DataType::Boolean,
            ArrayData::Boolean(SharedBuffer::from_vec(values)),
            Some(validity),
        )
    }

    pub fn from_strings(values: Vec<String>) -> Self {
        Array {
            datatype: DataType::Utf8,
            validity: None,
            data: ArrayData::Utf8(SharedBuffer::from_vec(values)),
        }
    }

    pub fn from_strings_opt(values: Vec<Option<String>>) -> Self {
        let validity: Bitmap = values.iter().map(|v| v.is_some()).collect();
        let values = values.into_iter().map(|v| v.unwrap_or_default()).collect();
        Array::new_unchecked(
            DataType::Utf8,
            ArrayData::Utf8(SharedBuffer::from_vec(values)),
            Some(validity),
        )
    }

    /// Create an array where every value is null.
    pub fn new_null(datatype: &DataType, len: usize) -> Self {
        let data = match datatype {
            DataType::Null => {
                return Array {
                    datatype: DataType::Null,
                    validity: None,
                    data: ArrayData::Null(len),
                };
            }
            DataType::Boolean => ArrayData::Boolean(vec![false; len].into()),
            DataType::Int8 => ArrayData::Int8(vec![0; len].into()),
            DataType::Int16 => ArrayData::Int16(vec![0; len].into()),
            DataType::Int32 | DataType::Date => ArrayData::Int32(vec![0; len].into()),
            DataType::Int64 | DataType::Datetime(_) | DataType::Duration(_) | DataType::Time => {
                ArrayData::Int64(vec![0; len].into())
            }
            DataType::UInt8 => ArrayData::UInt8(vec![0; len].into()),
            DataType::UInt16 => ArrayData::UInt16(vec![0; len].into()),
            DataType::UInt32 => ArrayData::UInt32(vec![0; len].into()),
            DataType::UInt64 => ArrayData::UInt64(vec![0; len].into()),
            DataType::Float32 => ArrayData::Float32(vec![0.0; len].into()),
            DataType::Float64 => ArrayData::Float64(vec![0.0; len].into()),
            DataType::Utf8 => ArrayData::Utf8(vec![String::new(); len].into()),
            DataType::List(inner) => {
                let empty = Array::new_null(inner, 0);
                ArrayData::List(vec![empty; len].into())
            }
            DataType::Struct(fields) => ArrayData::Struct(StructData {
                children: fields
                    .iter()
                    .map(|f| Array::new_null(&f.datatype, len))
                    .collect(),
                len,
            }),
            DataType::Categorical => ArrayData::Categorical(CategoricalData {
                codes: vec![0; len].into(),
                dictionary: StringCache::dictionary_for_new_column(),
            }),
            DataType::Object => {
                ArrayData::Object(vec![ObjectValue::new(ScalarValue::Null); len].into())
            }
        };

        Array {
            datatype: datatype.clone(),
            validity: Some(Bitmap::new_with_all_false(len)),
            data,
        }
    }

    pub fn datatype(&self) -> &DataType {
        &self.datatype
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn validity(&self) -> Option<&Bitmap> {
        self.validity.as_ref()
    }

    pub fn into_parts(self) -> (DataType, ArrayData, Option<Bitmap>) {
        (self.datatype, self.data, self.validity)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        match (&self.data, &self.validity) {
            (ArrayData::Null(_), _) => false,
            (_, Some(validity)) => validity.value(idx),
            (_, None) => true,
        }
    }

    pub fn null_count(&self) -> usize {
        match (&self.data, &self.validity) {
            (ArrayData::Null(len), _) => *len,
            (_, Some(validity)) => validity.count_falses(),
            (_, None) => 0,
        }
    }

    /// Iterator over validity of each row.
    pub fn validity_iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len()).map(|idx| self.is_valid(idx))
    }

    /// Mark a row as null, copying the validity if shared.
    pub fn set_null(&mut self, idx: usize) -> Result<()> {
        if idx >= self.len() {
            return Err(DbError::shape("Index out of bounds")
                .with_field("index", idx)
                .with_field("len", self.len()));
        }
        if matches!(self.data, ArrayData::Null(_)) {
            return Ok(());
        }
        let len = self.len();
        let validity = self
            .validity
            .get_or_insert_with(|| Bitmap::new_with_all_true(len));
        validity.set_unchecked(idx, false);
        Ok(())
    }

    pub fn with_validity(mut self, validity: Option<Bitmap>) -> Result<Self> {
        if let Some(v) = &validity {
            if v.len() != self.len() {
                return Err(DbError::panic("Validity length mismatch"));
            }
        }
        self.validity = validity.filter(|v| !v.is_all_true());
        Ok(self)
    }

    /// Get a value at some index.
    ///
    /// Panics if out of bounds, callers are expected to check the length.
    pub fn value(&self, idx: usize) -> ScalarValue {
        if !self.is_valid(idx) {
            return ScalarValue::Null;
        }

        match &self.data {
            ArrayData::Null(_) => ScalarValue::Null,
            ArrayData::Boolean(b) => ScalarValue::Boolean(b.as_slice()[idx]),
            ArrayData::Int8(b) => ScalarValue::Int8(b.as_slice()[idx]),
            ArrayData::Int16(b) => ScalarValue::Int16(b.as_slice()[idx]),
            ArrayData::Int32(b) => {
                let v = b.as_slice()[idx];
                match self.datatype {
                    DataType::Date => ScalarValue::Date(v),
                    _ => ScalarValue::Int32(v),
                }
            }
            ArrayData::Int64(b) => {
                let v = b.as_slice()[idx];
                match self.datatype {
                    DataType::Datetime(unit) => ScalarValue::Datetime(v, unit),
                    DataType::Duration(unit) => ScalarValue::Duration(v, unit),
                    DataType::Time => ScalarValue::Time(v),
                    _ => ScalarValue::Int64(v),
                }
            }
            ArrayData::UInt8(b) => ScalarValue::UInt8(b.as_slice()[idx]),
            ArrayData::UInt16(b) => ScalarValue::UInt16(b.as_slice()[idx]),
            ArrayData::UInt32(b) => ScalarValue::UInt32(b.as_slice()[idx]),
            ArrayData::UInt64(b) => ScalarValue::UInt64(b.as_slice()[idx]),
            ArrayData::Float32(b) => ScalarValue::Float32(b.as_slice()[idx]),
            ArrayData::Float64(b) => ScalarValue::Float64(b.as_slice()[idx]),
            ArrayData::Utf8(b) => ScalarValue::Utf8(b.as_slice()[idx].clone()),
            ArrayData::List(b) => ScalarValue::List(b.as_slice()[idx].to_scalars()),
            ArrayData::Struct(s) => {
                let names: Vec<String> = match &self.datatype {
                    DataType::Struct(fields) => fields.iter().map(|f| f.name.clone()).collect(),
                    _ => (0..s.children.len()).map(|i| format!("field_{i}")).collect(),
                };
                ScalarValue::Struct(
                    names
                        .into_iter()
                        .zip(s.children.iter().map(|c| c.value(idx)))
                        .collect(),
                )
            }
            ArrayData::Categorical(c) => match c.dictionary.value(c.codes.as_slice()[idx]) {
                Some(s) => ScalarValue::Categorical(s),
                None => ScalarValue::Null,
            },
            ArrayData::Object(b) => ScalarValue::Object(b.as_slice()[idx].clone()),
        }
    }

    pub fn to_scalars(&self) -> Vec<ScalarValue> {
        (0..self.len()).map(|idx| self.value(idx)).collect()
    }

    /// Zero-copy slice of the values. Validity is copied.
    pub fn slice(&self, offset: usize, len: usize) -> Array {
        Array {
            datatype: self.datatype.clone(),
            validity: self.validity.as_ref().map(|v| v.slice(offset, len)),
            data: self.data.slice(offset, len),
        }
    }

    /// Gather values at the given row indices.
    ///
    /// Panics if an index is out of bounds.
    pub fn take(&self, indices: &[usize]) -> Array {
        let validity = self
            .validity
            .as_ref()
            .map(|v| indices.iter().map(|&idx| v.value(idx)).collect());
        Array::new_unchecked(self.datatype.clone(), self.data.take(indices), validity)
    }

    /// Gather values where `None` produces a null row.
    pub fn take_opt(&self, indices: &[Option<usize>]) -> Array {
        if self.is_empty() {
            // Nothing to point placeholder slots at.
            return Array::new_null(&self.datatype, indices.len());
        }
        let concrete: Vec<usize> = indices.iter().map(|idx| idx.unwrap_or(0)).collect();
        let validity: Bitmap = indices
            .iter()
            .map(|idx| idx.is_some_and(|idx| self.is_valid(idx)))
            .collect();
        Array::new_unchecked(
            self.datatype.clone(),
            self.data.take(&concrete),
            Some(validity),
        )
    }

    /// Keep rows where the mask is true.
    pub fn filter(&self, mask: &[bool]) -> Array {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, keep)| keep.then_some(idx))
            .collect();
        self.take(&indices)
    }

    pub fn shrink_to_fit(&mut self) {
        self.data.shrink_to_fit();
    }

    /// Build an array of `datatype` from scalar values.
    ///
    /// Values must already be of a compatible kind (e.g. any integer for an
    /// integer column). Numeric values outside the range of the target type
    /// error.
    pub fn from_scalars(datatype: &DataType, values: &[ScalarValue]) -> Result<Array> {
        let validity: Bitmap = values.iter().map(|v| !v.is_null()).collect();

        let mismatch = |v: &ScalarValue| {
            DbError::schema("Value not compatible with datatype")
                .with_field("value", v.to_string())
                .with_field("datatype", datatype.to_string())
        };

        fn natives<T: NativeType>(
            values: &[ScalarValue],
            mismatch: impl Fn(&ScalarValue) -> DbError,
        ) -> Result<SharedBuffer<T>> {
            values
                .iter()
                .map(|v| {
                    if v.is_null() {
                        return Ok(T::default());
                    }
                    let converted = if T::DATATYPE.is_float() {
                        v.try_as_f64().and_then(<T as NumCast>::from)
                    } else {
                        v.try_as_i128().and_then(<T as NumCast>::from)
                    };
                    converted.ok_or_else(|| mismatch(v))
                })
                .collect::<Result<Vec<_>>>()
                .map(SharedBuffer::from_vec)
        }

        let data = match datatype {
            DataType::Null => ArrayData::Null(values.len()),
            DataType::Boolean => ArrayData::Boolean(
                values
                    .iter()
                    .map(|v| match v {
                        ScalarValue::Null => Ok(false),
                        other => other.try_as_bool().ok_or_else(|| mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            ),
            DataType::Int8 => ArrayData::Int8(natives(values, mismatch)?),
            DataType::Int16 => ArrayData::Int16(natives(values, mismatch)?),
            DataType::Int32 | DataType::Date => ArrayData::Int32(natives(values, mismatch)?),
            DataType::Int64 | DataType::Duration(_) | DataType::Time => {
                ArrayData::Int64(natives(values, mismatch)?)
            }
            DataType::Datetime(unit) => ArrayData::Int64(
                values
                    .iter()
                    .map(|v| match v {
                        ScalarValue::Null => Ok(0),
                        ScalarValue::Datetime(raw, from) => Ok(from.convert(*raw, *unit)),
                        other => other.try_as_i64().ok_or_else(|| mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            ),
            DataType::UInt8 => ArrayData::UInt8(natives(values, mismatch)?),
            DataType::UInt16 => ArrayData::UInt16(natives(values, mismatch)?),
            DataType::UInt32 => ArrayData::UInt32(natives(values, mismatch)?),
            DataType::UInt64 => ArrayData::UInt64(natives(values, mismatch)?),
            DataType::Float32 => ArrayData::Float32(natives(values, mismatch)?),
            DataType::Float64 => ArrayData::Float64(natives(values, mismatch)?),
            DataType::Utf8 => ArrayData::Utf8(
                values
                    .iter()
                    .map(|v| match v {
                        ScalarValue::Null => Ok(String::new()),
                        other => other
                            .try_as_str()
                            .map(|s| s.to_string())
                            .ok_or_else(|| mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            ),
            DataType::List(inner) => ArrayData::List(
                values
                    .iter()
                    .map(|v| match v {
                        ScalarValue::Null => Ok(Array::new_null(inner, 0)),
                        ScalarValue::List(children) => Array::from_scalars(inner, children),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            ),
            DataType::Struct(fields) => {
                let mut children = Vec::with_capacity(fields.len());
                for field in fields {
                    let field_values = values
                        .iter()
                        .map(|v| match v {
                            ScalarValue::Null => Ok(ScalarValue::Null),
                            ScalarValue::Struct(entries) => Ok(entries
                                .iter()
                                .find(|(name, _)| name == &field.name)
                                .map(|(_, v)| v.clone())
                                .unwrap_or(ScalarValue::Null)),
                            other => Err(mismatch(other)),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    children.push(Array::from_scalars(&field.datatype, &field_values)?);
                }
                ArrayData::Struct(StructData {
                    children,
                    len: values.len(),
                })
            }
            DataType::Categorical => {
                let dictionary = StringCache::dictionary_for_new_column();
                let codes = values
                    .iter()
                    .map(|v| match v {
                        ScalarValue::Null => Ok(0),
                        other => other
                            .try_as_str()
                            .map(|s| dictionary.get_or_insert(s))
                            .ok_or_else(|| mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                ArrayData::Categorical(CategoricalData {
                    codes: codes.into(),
                    dictionary,
                })
            }
            DataType::Object => ArrayData::Object(
                values
                    .iter()
                    .map(|v| match v {
                        ScalarValue::Object(obj) => obj.clone(),
                        other => ObjectValue::new(other.clone()),
                    })
                    .collect::<Vec<_>>()
                    .into(),
            ),
        };

        Ok(Array::new_unchecked(datatype.clone(), data, Some(validity)))
    }

    /// Concatenate arrays of the same datatype into a single array.
    pub fn concat(arrays: &[&Array]) -> Result<Array> {
        let first = match arrays.first() {
            Some(first) => *first,
            None => return Err(DbError::panic("Cannot concat zero arrays")),
        };
        if arrays.len() == 1 {
            return Ok(first.clone());
        }

        let datatype = first.datatype.clone();
        for arr in arrays {
            if arr.datatype != datatype {
                return Err(DbError::schema("Cannot concat arrays with different datatypes")
                    .with_field("left", &datatype)
                    .with_field("right", &arr.datatype));
            }
        }

        let total: usize = arrays.iter().map(|a| a.len()).sum();
        let validity = if arrays.iter().any(|a| a.validity.is_some() || a.null_count() > 0) {
            Some(
                arrays
                    .iter()
                    .flat_map(|a| a.validity_iter())
                    .collect::<Bitmap>(),
            )
        } else {
            None
        };

        macro_rules! concat_buffers {
            ($variant:ident) => {{
                let mut values = Vec::with_capacity(total);
                for arr in arrays {
                    match &arr.data {
                        ArrayData::$variant(buf) => values.extend_from_slice(buf.as_slice()),
                        _ => return Err(DbError::panic("Physical type mismatch during concat")),
                    }
                }
                ArrayData::$variant(SharedBuffer::from_vec(values))
            }};
        }

        let data = match &first.data {
            ArrayData::Null(_) => ArrayData::Null(total),
            ArrayData::Boolean(_) => concat_buffers!(Boolean),
            ArrayData::Int8(_) => concat_buffers!(Int8),
            ArrayData::Int16(_) => concat_buffers!(Int16),
            ArrayData::Int32(_) => concat_buffers!(Int32),
            ArrayData::Int64(_) => concat_buffers!(Int64),
            ArrayData::UInt8(_) => concat_buffers!(UInt8),
            ArrayData::UInt16(_) => concat_buffers!(UInt16),
            ArrayData::UInt32(_) => concat_buffers!(UInt32),
            ArrayData::UInt64(_) => concat_buffers!(UInt64),
            ArrayData::Float32(_) => concat_buffers!(Float32),
            ArrayData::Float64(_) => concat_buffers!(Float64),
            ArrayData::Utf8(_) => concat_buffers!(Utf8),
            ArrayData::List(_) => concat_buffers!(List),
            ArrayData::Object(_) => concat_buffers!(Object),
            ArrayData::Struct(s) => {
                let mut children = Vec::with_capacity(s.children.len());
                for child_idx in 0..s.children.len() {
                    let mut parts = Vec::with_capacity(arrays.len());
                    for arr in arrays {
                        match &arr.data {
                            ArrayData::Struct(s) => parts.push(&s.children[child_idx]),
                            _ => return Err(DbError::panic("Physical type mismatch during concat")),
                        }
                    }
                    children.push(Array::concat(&parts)?);
                }
                ArrayData::Struct(StructData {
                    children,
                    len: total,
                })
            }
            ArrayData::Categorical(c) => concat_categorical(arrays, &c.dictionary, total)?,
        };

        Ok(Array::new_unchecked(datatype, data, validity))
    }
}

/// Concat categorical arrays, re-encoding into a new dictionary if the
/// inputs don't all share one.
fn concat_categorical(
    arrays: &[&Array],
    dictionary: &Arc<CategoricalDictionary>,
    total: usize,
) -> Result<ArrayData> {
    let mut all_same = true;
    for arr in arrays {
        match &arr.data {
            ArrayData::Categorical(c) => all_same &= c.dictionary.is_compatible(dictionary),
            _ => return Err(DbError::panic("Physical type mismatch during concat")),
        }
    }

    let mut codes = Vec::with_capacity(total);
    if all_same {
        for arr in arrays {
            if let ArrayData::Categorical(c) = &arr.data {
                codes.extend_from_slice(c.codes.as_slice());
            }
        }
        return Ok(ArrayData::Categorical(CategoricalData {
            codes: codes.into(),
            dictionary: dictionary.clone(),
        }));
    }

    tracing::debug!("re-encoding categorical arrays with different dictionaries");
    let merged = StringCache::dictionary_for_new_column();
    for arr in arrays {
        if let ArrayData::Categorical(c) = &arr.data {
            for value in c.dictionary.values_for(c.codes.as_slice().iter().copied()) {
                codes.push(value.map(|s| merged.get_or_insert(&s)).unwrap_or(0));
            }
        }
    }
    Ok(ArrayData::Categorical(CategoricalData {
        codes: codes.into(),
        dictionary: merged,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_respects_validity() {
        let arr = Array::from_native_opt(vec![Some(1i64), None, Some(3)]);
        assert_eq!(ScalarValue::Int64(1), arr.value(0));
        assert_eq!(ScalarValue::Null, arr.value(1));
        assert_eq!(1, arr.null_count());
    }

    #[test]
    fn slice_then_take() {
        let arr = Array::from_native(vec![1i32, 2, 3, 4, 5]);
        let sliced = arr.slice(1, 3);
        let taken = sliced.take(&[2, 0]);
        assert_eq!(
            vec![ScalarValue::Int32(4), ScalarValue::Int32(2)],
            taken.to_scalars()
        );
    }

    #[test]
    fn take_opt_fills_nulls() {
        let arr = Array::from_strings(vec!["a".to_string(), "b".to_string()]);
        let taken = arr.take_opt(&[Some(1), None, Some(0)]);
        assert_eq!(
            vec![ScalarValue::from("b"), ScalarValue::Null, ScalarValue::from("a")],
            taken.to_scalars()
        );

        let empty = Array::new_null(&DataType::Utf8, 0);
        assert_eq!(2, empty.take_opt(&[None, None]).null_count());
    }

    #[test]
    fn from_scalars_list() {
        let values = vec![
            ScalarValue::from(vec![1i64, 2]),
            ScalarValue::Null,
            ScalarValue::List(Vec::new()),
        ];
        let arr = Array::from_scalars(&DataType::list(DataType::Int64), &values).unwrap();
        assert_eq!(values, arr.to_scalars());
    }

    #[test]
    fn from_scalars_out_of_range() {
        let err = Array::from_scalars(&DataType::Int8, &[ScalarValue::Int64(300)]).unwrap_err();
        assert_eq!(floe_error::ErrorKind::Schema, err.kind());
    }

    #[test]
    fn concat_mixed_validity() {
        let a = Array::from_native(vec![1u8, 2]);
        let b = Array::from_native_opt(vec![None, Some(4u8)]);
        let out = Array::concat(&[&a, &b]).unwrap();
        assert_eq!(
            vec![
                ScalarValue::UInt8(1),
                ScalarValue::UInt8(2),
                ScalarValue::Null,
                ScalarValue::UInt8(4)
            ],
            out.to_scalars()
        );
    }

    #[test]
    fn concat_categoricals_with_different_dictionaries() {
        let a = Array::from_scalars(&DataType::Categorical, &["x".into(), "y".into()]).unwrap();
        let b = Array::from_scalars(&DataType::Categorical, &["y".into(), "z".into()]).unwrap();
        let out = Array::concat(&[&a, &b]).unwrap();
        let strings: Vec<_> = out
            .to_scalars()
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(vec!["x", "y", "y", "z"], strings);
    }
}
