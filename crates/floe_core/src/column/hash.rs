use std::hash::{BuildHasher, Hash};

use ahash::RandomState;
use floe_error::{DbError, Result};

use super::Column;
use crate::arrays::array::{Array, ArrayData};
use crate::arrays::native::NativeType;
use crate::arrays::scalar::ScalarValue;
use crate::dispatch_native;

/// State used for all hashing operations during execution.
pub const HASH_RANDOM_STATE: RandomState = RandomState::with_seeds(0, 0, 0, 0);

/// Hash used for null values.
const NULL_HASH: u64 = 0xA21258D088C87A13;

/// Combine two hashes into a single value.
///
/// Implementation taken from boost:
/// <https://github.com/boostorg/container_hash/blob/b8179488b20eb1373bdbf5c7fcca963f072512df/include/boost/container_hash/detail/hash_mix.hpp#L67>
pub const fn combine_hashes(v1: u64, v2: u64) -> u64 {
    const fn mix(mut x: u64) -> u64 {
        const M: u64 = 0xE9846AF9B1A615D;
        x ^= x.wrapping_shr(32);
        x = x.wrapping_mul(M);
        x ^= x.wrapping_shr(32);
        x = x.wrapping_mul(M);
        x ^= x.wrapping_shr(28);
        x
    }

    mix(v1.wrapping_add(0x9E3779B9).wrapping_add(v2))
}

/// Get the partition to use for a hash.
///
/// Used by partitioned group by and anything else that needs a consistent
/// hash to partition mapping.
pub const fn partition_for_hash(hash: u64, partitions: usize) -> usize {
    ((hash as u128 * partitions as u128) >> 64) as usize
}

fn hash_value<V: Hash + ?Sized>(v: &V) -> u64 {
    BuildHasher::hash_one(&HASH_RANDOM_STATE, v)
}

fn write_hash(hash: &mut u64, value: u64, combine: bool) {
    *hash = if combine {
        combine_hashes(value, *hash)
    } else {
        value
    };
}

/// Hash every row of an array, writing into `hashes`.
fn hash_array(array: &Array, hashes: &mut [u64], combine: bool) {
    debug_assert_eq!(array.len(), hashes.len());

    fn hash_natives<T: NativeType>(array: &Array, values: &[T], hashes: &mut [u64], combine: bool) {
        for (idx, (v, hash)) in values.iter().zip(hashes.iter_mut()).enumerate() {
            let h = if array.is_valid(idx) {
                hash_value(&v.key_bits())
            } else {
                NULL_HASH
            };
            write_hash(hash, h, combine);
        }
    }

    dispatch_native!(array.data(), values, T => {
        hash_natives::<T>(array, values.as_slice(), hashes, combine)
    }, _ => match array.data() {
        ArrayData::Utf8(values) => {
            for (idx, (v, hash)) in values.as_slice().iter().zip(hashes.iter_mut()).enumerate() {
                let h = if array.is_valid(idx) { hash_value(v.as_str()) } else { NULL_HASH };
                write_hash(hash, h, combine);
            }
        }
        ArrayData::Boolean(values) => {
            for (idx, (v, hash)) in values.as_slice().iter().zip(hashes.iter_mut()).enumerate() {
                let h = if array.is_valid(idx) { hash_value(v) } else { NULL_HASH };
                write_hash(hash, h, combine);
            }
        }
        ArrayData::Null(_) => hashes.iter_mut().for_each(|h| write_hash(h, NULL_HASH, combine)),
        // Categoricals hash their string so columns with different
        // dictionaries agree.
        _ => {
            for (idx, hash) in hashes.iter_mut().enumerate() {
                let h = match array.value(idx) {
                    ScalarValue::Null => NULL_HASH,
                    ScalarValue::Categorical(s) => hash_value(s.as_str()),
                    other => hash_value(&other),
                };
                write_hash(hash, h, combine);
            }
        }
    })
}

impl Column {
    /// Hash every row, optionally combining with hashes already in the
    /// buffer.
    pub fn hash_into(&self, hashes: &mut [u64], combine: bool) -> Result<()> {
        if hashes.len() != self.len() {
            return Err(DbError::panic("Hash buffer length doesn't match column")
                .with_field("buffer", hashes.len())
                .with_field("column", self.len()));
        }
        let mut offset = 0;
        for chunk in self.chunks() {
            hash_array(chunk, &mut hashes[offset..offset + chunk.len()], combine);
            offset += chunk.len();
        }
        Ok(())
    }

    /// Hash of each value as a UInt64 column.
    pub fn hash_values(&self) -> Result<Column> {
        let mut hashes = vec![0; self.len()];
        self.hash_into(&mut hashes, false)?;
        Ok(Column::from_slice(self.name(), &hashes))
    }
}

/// Hash rows across multiple equal length columns.
pub fn hash_columns(columns: &[&Column]) -> Result<Vec<u64>> {
    let len = columns.first().map(|c| c.len()).unwrap_or(0);
    let mut hashes = vec![0; len];
    for (idx, col) in columns.iter().enumerate() {
        if col.len() != len {
            return Err(DbError::shape("Columns being hashed have different lengths")
                .with_field("expected", len)
                .with_field("got", col.len()));
        }
        col.hash_into(&mut hashes, idx > 0)?;
    }
    Ok(hashes)
}

/// Flattened values of a single key column used for row equality checks.
#[derive(Debug)]
enum KeyColumn<'a> {
    /// Fixed width values compared by canonical bits.
    Bits(Vec<Option<u64>>),
    Str(Vec<Option<&'a str>>),
    /// Everything else compared as scalars.
    Values(Vec<ScalarValue>),
}

impl<'a> KeyColumn<'a> {
    fn new(col: &'a Column) -> Self {
        let mut bits: Vec<Option<u64>> = Vec::new();
        let mut strs: Vec<Option<&'a str>> = Vec::new();
        let mut all_bits = true;
        let mut all_strs = true;

        for chunk in col.chunks() {
            let chunk_bits = dispatch_native!(chunk.data(), values, T => {
                let values: &[T] = values.as_slice();
                Some(values
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| chunk.is_valid(idx).then(|| v.key_bits()))
                    .collect::<Vec<_>>())
            }, _ => match chunk.data() {
                ArrayData::Boolean(values) => Some(values
                    .as_slice()
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| chunk.is_valid(idx).then_some(*v as u64))
                    .collect()),
                _ => None,
            });
            match chunk_bits {
                Some(b) => bits.extend(b),
                None => all_bits = false,
            }

            match chunk.data() {
                ArrayData::Utf8(values) => strs.extend(
                    values
                        .as_slice()
                        .iter()
                        .enumerate()
                        .map(|(idx, v)| chunk.is_valid(idx).then_some(v.as_str())),
                ),
                _ => all_strs = false,
            }
        }

        if all_bits {
            KeyColumn::Bits(bits)
        } else if all_strs {
            KeyColumn::Str(strs)
        } else {
            KeyColumn::Values(
                col.iter()
                    .map(|v| match v {
                        ScalarValue::Categorical(s) => ScalarValue::Utf8(s),
                        other => other,
                    })
                    .collect(),
            )
        }
    }

    fn is_null(&self, idx: usize) -> bool {
        match self {
            Self::Bits(v) => v[idx].is_none(),
            Self::Str(v) => v[idx].is_none(),
            Self::Values(v) => v[idx].is_null(),
        }
    }

    /// Compare a row in this column with a row in another. Nulls are equal
    /// to each other.
    fn eq_rows(&self, a: usize, other: &KeyColumn, b: usize) -> bool {
        match (self, other) {
            (KeyColumn::Bits(l), KeyColumn::Bits(r)) => l[a] == r[b],
            (KeyColumn::Str(l), KeyColumn::Str(r)) => l[a] == r[b],
            (KeyColumn::Values(l), KeyColumn::Values(r)) => l[a] == r[b],
            (l, r) => l.value(a) == r.value(b),
        }
    }

    fn value(&self, idx: usize) -> ScalarValue {
        match self {
            Self::Bits(v) => v[idx].map(ScalarValue::UInt64).unwrap_or(ScalarValue::Null),
            Self::Str(v) => v[idx].map(ScalarValue::from).unwrap_or(ScalarValue::Null),
            Self::Values(v) => v[idx].clone(),
        }
    }
}

/// Hashes and equality for the rows of a set of key columns.
#[derive(Debug)]
pub struct RowKeys<'a> {
    columns: Vec<KeyColumn<'a>>,
    hashes: Vec<u64>,
}

impl<'a> RowKeys<'a> {
    pub fn try_new(columns: &[&'a Column]) -> Result<Self> {
        let hashes = hash_columns(columns)?;
        Ok(RowKeys {
            columns: columns.iter().map(|c| KeyColumn::new(c)).collect(),
            hashes,
        })
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn hashes(&self) -> &[u64] {
        &self.hashes
    }

    #[inline]
    pub fn hash(&self, row: usize) -> u64 {
        self.hashes[row]
    }

    /// If any key in the row is null.
    pub fn has_null(&self, row: usize) -> bool {
        self.columns.iter().any(|c| c.is_null(row))
    }

    pub fn rows_eq(&self, a: usize, b: usize) -> bool {
        self.columns.iter().all(|c| c.eq_rows(a, c, b))
    }

    /// Compare a row with a row from another set of keys with the same
    /// arity.
    pub fn rows_eq_other(&self, a: usize, other: &RowKeys, b: usize) -> bool {
        self.columns
            .iter()
            .zip(other.columns.iter())
            .all(|(l, r)| l.eq_rows(a, r, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::datatype::DataType;

    #[test]
    fn same_values_same_hash_across_chunks() {
        let mut chunked = Column::from_slice("a", &[1i64, 2]);
        chunked.append(&Column::from_slice("a", &[1i64])).unwrap();
        let hashes = hash_columns(&[&chunked]).unwrap();
        assert_eq!(hashes[0], hashes[2]);
        assert_ne!(hashes[0], hashes[1]);
    }

    #[test]
    fn nulls_hash_equal() {
        let col = Column::from_opt::<f64>("a", vec![None, Some(1.0), None]);
        let hashes = hash_columns(&[&col]).unwrap();
        assert_eq!(hashes[0], hashes[2]);
    }

    #[test]
    fn categorical_hash_matches_string() {
        let cat = Column::from_strs("a", &["x", "y"])
            .cast(&DataType::Categorical)
            .unwrap();
        let strs = Column::from_strs("a", &["x", "y"]);
        assert_eq!(
            hash_columns(&[&cat]).unwrap(),
            hash_columns(&[&strs]).unwrap()
        );
    }

    #[test]
    fn row_keys_equality() {
        let a = Column::from_slice("a", &[1i32, 1, 2]);
        let b = Column::from_strs("b", &["x", "x", "x"]);
        let keys = RowKeys::try_new(&[&a, &b]).unwrap();
        assert!(keys.rows_eq(0, 1));
        assert!(!keys.rows_eq(0, 2));
        assert!(!keys.has_null(0));
    }

    #[test]
    fn row_keys_equality_across_tables() {
        let left = Column::from_strs("k", &["x", "y"]);
        let right = Column::from_strs("k", &["y", "z", "x"]);
        let left_keys = RowKeys::try_new(&[&left]).unwrap();
        {
            let right_keys = RowKeys::try_new(&[&right]).unwrap();
            assert!(left_keys.rows_eq_other(0, &right_keys, 2));
            assert!(left_keys.rows_eq_other(1, &right_keys, 0));
            assert!(!left_keys.rows_eq_other(0, &right_keys, 1));
        }
    }

    #[test]
    fn partition_in_range() {
        for hash in [0, u64::MAX, 12345] {
            assert!(partition_for_hash(hash, 7) < 7);
        }
    }
}
