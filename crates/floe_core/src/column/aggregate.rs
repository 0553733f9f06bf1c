//! Reductions over columns and subsets of column rows.
//!
//! Integer inputs accumulate in i128 and float inputs in f64 so narrow
//! types never wrap during the reduction itself. The result is converted to
//! the output type at the end, erroring if it doesn't fit.

use std::fmt;

use floe_error::{DbError, Result};
use hashbrown::HashSet;
use num_traits::ToPrimitive;

use super::Column;
use super::cast::int_scalar;
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::dispatch_native_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Sum,
    Mean,
    Min,
    Max,
    First,
    Last,
    Median,
    /// Number of non-null values.
    Count,
    /// Number of distinct values, null counted as a value.
    NUnique,
    Std,
    Var,
    Product,
}

impl AggregateKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::First => "first",
            Self::Last => "last",
            Self::Median => "median",
            Self::Count => "count",
            Self::NUnique => "n_unique",
            Self::Std => "std",
            Self::Var => "var",
            Self::Product => "product",
        }
    }

    /// Datatype produced when aggregating values of `input`.
    pub fn output_type(&self, input: &DataType) -> Result<DataType> {
        let numeric_like = input.is_numeric() || matches!(input, DataType::Boolean | DataType::Null);
        let unsupported = || {
            DbError::new("Aggregate not supported for datatype")
                .with_field("aggregate", self.name())
                .with_field("datatype", input)
        };

        Ok(match self {
            Self::Count | Self::NUnique => DataType::UInt32,
            Self::First | Self::Last => input.clone(),
            Self::Min | Self::Max => {
                if !input.is_orderable() {
                    return Err(unsupported());
                }
                input.clone()
            }
            Self::Sum => input.sum_type().ok_or_else(unsupported)?,
            Self::Product => match input {
                DataType::Float32 | DataType::Float64 | DataType::UInt64 => input.clone(),
                _ if numeric_like => DataType::Int64,
                _ => return Err(unsupported()),
            },
            Self::Mean | Self::Median => match input {
                DataType::Float32 => DataType::Float32,
                _ if numeric_like => DataType::Float64,
                _ => return Err(unsupported()),
            },
            Self::Std | Self::Var => {
                if !numeric_like {
                    return Err(unsupported());
                }
                DataType::Float64
            }
        })
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug)]
enum ReduceValues {
    /// Integers, booleans and the raw values of temporal types.
    Ints(Vec<Option<i128>>),
    Floats(Vec<Option<f64>>),
    Scalars(Vec<ScalarValue>),
    /// Values not needed for the aggregate (first/last/count).
    Unused,
}

/// A column prepared for repeatedly running one aggregate over subsets of
/// its rows.
#[derive(Debug)]
pub struct Reducer {
    kind: AggregateKind,
    column: Column,
    output_type: DataType,
    values: ReduceValues,
}

impl Reducer {
    pub fn try_new(column: &Column, kind: AggregateKind) -> Result<Self> {
        let output_type = kind.output_type(column.datatype())?;
        let column = column.rechunk()?;
        let datatype = column.datatype().clone();

        let values = match kind {
            AggregateKind::First | AggregateKind::Last | AggregateKind::Count => {
                ReduceValues::Unused
            }
            _ if datatype == DataType::Null => ReduceValues::Floats(vec![None; column.len()]),
            _ if datatype == DataType::Boolean => ReduceValues::Ints(
                column
                    .bool_values()?
                    .into_iter()
                    .map(|v| v.map(|v| v as i128))
                    .collect(),
            ),
            _ if datatype.is_float() => dispatch_native_type!(&datatype, T => {
                ReduceValues::Floats(column
                    .native_values::<T>()?
                    .into_iter()
                    .map(|v| v.and_then(|v| v.to_f64()))
                    .collect())
            }, _ => ReduceValues::Scalars(column.to_scalars())),
            _ => dispatch_native_type!(&datatype, T => {
                ReduceValues::Ints(column
                    .native_values::<T>()?
                    .into_iter()
                    .map(|v| v.and_then(|v| v.to_i128()))
                    .collect())
            }, _ => ReduceValues::Scalars(column.to_scalars())),
        };

        Ok(Reducer {
            kind,
            column,
            output_type,
            values,
        })
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    pub fn output_type(&self) -> &DataType {
        &self.output_type
    }

    /// Aggregate every row.
    pub fn reduce_all(&self) -> Result<ScalarValue> {
        self.reduce(0..self.column.len())
    }

    /// Aggregate the given rows.
    pub fn reduce<I>(&self, rows: I) -> Result<ScalarValue>
    where
        I: Iterator<Item = usize> + Clone,
    {
        match self.kind {
            AggregateKind::First => {
                let mut rows = rows;
                return match rows.next() {
                    Some(row) => self.column.get(row),
                    None => Ok(ScalarValue::Null),
                };
            }
            AggregateKind::Last => {
                return match rows.last() {
                    Some(row) => self.column.get(row),
                    None => Ok(ScalarValue::Null),
                };
            }
            AggregateKind::Count => {
                let count = rows.filter(|&row| self.column.is_valid(row)).count();
                return Ok(ScalarValue::UInt32(count as u32));
            }
            _ => (),
        }
        if self.output_type == DataType::Null {
            return Ok(ScalarValue::Null);
        }

        match &self.values {
            ReduceValues::Ints(values) => {
                let all = rows.clone().map(|row| values[row]);
                self.reduce_ints(rows.filter_map(|row| values[row]), all)
            }
            ReduceValues::Floats(values) => {
                let all = rows.clone().map(|row| values[row].map(f64::to_bits));
                self.reduce_floats(rows.filter_map(|row| values[row]), all)
            }
            ReduceValues::Scalars(values) => self.reduce_scalars(rows.map(|row| &values[row])),
            ReduceValues::Unused => Err(DbError::panic("Aggregate values not prepared")),
        }
    }

    fn finish_int(&self, v: i128) -> Result<ScalarValue> {
        if self.output_type == DataType::Boolean {
            return Ok(ScalarValue::Boolean(v != 0));
        }
        int_scalar(&self.output_type, v).ok_or_else(|| {
            DbError::new("Aggregate result overflows output type")
                .with_field("aggregate", self.kind.name())
                .with_field("datatype", &self.output_type)
        })
    }

    fn finish_float(&self, v: f64) -> ScalarValue {
        match self.output_type {
            DataType::Float32 => ScalarValue::Float32(v as f32),
            _ => ScalarValue::Float64(v),
        }
    }

    fn reduce_ints(
        &self,
        mut valid: impl Iterator<Item = i128> + Clone,
        all: impl Iterator<Item = Option<i128>>,
    ) -> Result<ScalarValue> {
        match self.kind {
            AggregateKind::Sum => self.finish_int(valid.sum()),
            AggregateKind::Product => {
                let product = valid.try_fold(1i128, |acc, v| acc.checked_mul(v)).ok_or_else(|| {
                    DbError::new("Aggregate result overflows output type")
                        .with_field("aggregate", self.kind.name())
                        .with_field("datatype", &self.output_type)
                })?;
                self.finish_int(product)
            }
            AggregateKind::Min => valid.min().map_or(Ok(ScalarValue::Null), |v| self.finish_int(v)),
            AggregateKind::Max => valid.max().map_or(Ok(ScalarValue::Null), |v| self.finish_int(v)),
            AggregateKind::NUnique => {
                let distinct: HashSet<Option<i128>> = all.collect();
                Ok(ScalarValue::UInt32(distinct.len() as u32))
            }
            _ => Ok(self.reduce_f64(valid.map(|v| v as f64))),
        }
    }

    fn reduce_floats(
        &self,
        valid: impl Iterator<Item = f64> + Clone,
        all_bits: impl Iterator<Item = Option<u64>>,
    ) -> Result<ScalarValue> {
        match self.kind {
            AggregateKind::Sum => Ok(self.finish_float(valid.sum())),
            AggregateKind::Product => Ok(self.finish_float(valid.product())),
            AggregateKind::Min => Ok(valid
                .reduce(f64::min)
                .map_or(ScalarValue::Null, |v| self.finish_float(v))),
            AggregateKind::Max => Ok(valid
                .reduce(f64::max)
                .map_or(ScalarValue::Null, |v| self.finish_float(v))),
            AggregateKind::NUnique => {
                let distinct: HashSet<Option<u64>> = all_bits
                    .map(|bits| bits.map(|b| canonical_bits(f64::from_bits(b))))
                    .collect();
                Ok(ScalarValue::UInt32(distinct.len() as u32))
            }
            _ => Ok(self.reduce_f64(valid)),
        }
    }

    /// Mean, median, std and var.
    fn reduce_f64(&self, valid: impl Iterator<Item = f64> + Clone) -> ScalarValue {
        let (count, sum) = valid.clone().fold((0usize, 0.0), |(c, s), v| (c + 1, s + v));
        match self.kind {
            AggregateKind::Mean if count > 0 => self.finish_float(sum / count as f64),
            AggregateKind::Median if count > 0 => {
                let mut values: Vec<f64> = valid.collect();
                values.sort_by(f64::total_cmp);
                let mid = values.len() / 2;
                let median = if values.len() % 2 == 0 {
                    (values[mid - 1] + values[mid]) / 2.0
                } else {
                    values[mid]
                };
                self.finish_float(median)
            }
            AggregateKind::Std | AggregateKind::Var if count > 1 => {
                let mean = sum / count as f64;
                let sq: f64 = valid.map(|v| (v - mean) * (v - mean)).sum();
                let var = sq / (count - 1) as f64;
                if self.kind == AggregateKind::Std {
                    ScalarValue::Float64(var.sqrt())
                } else {
                    ScalarValue::Float64(var)
                }
            }
            _ => ScalarValue::Null,
        }
    }

    fn reduce_scalars<'a>(&self, values: impl Iterator<Item = &'a ScalarValue>) -> Result<ScalarValue> {
        match self.kind {
            AggregateKind::Min => Ok(values
                .filter(|v| !v.is_null())
                .min_by(|a, b| a.total_cmp(b))
                .cloned()
                .unwrap_or(ScalarValue::Null)),
            AggregateKind::Max => Ok(values
                .filter(|v| !v.is_null())
                .max_by(|a, b| a.total_cmp(b))
                .cloned()
                .unwrap_or(ScalarValue::Null)),
            AggregateKind::NUnique => {
                let distinct: HashSet<&ScalarValue> = values.collect();
                Ok(ScalarValue::UInt32(distinct.len() as u32))
            }
            kind => Err(DbError::new("Aggregate not supported for datatype")
                .with_field("aggregate", kind.name())
                .with_field("datatype", self.column.datatype())),
        }
    }
}

fn canonical_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

impl Column {
    /// Reduce the column to a single value.
    pub fn reduce(&self, kind: AggregateKind) -> Result<ScalarValue> {
        Reducer::try_new(self, kind)?.reduce_all()
    }

    /// Reduce the column to a single row column with the same name.
    pub fn aggregate(&self, kind: AggregateKind) -> Result<Column> {
        let reducer = Reducer::try_new(self, kind)?;
        let value = reducer.reduce_all()?;
        Column::from_scalars(self.name(), reducer.output_type(), &[value])
    }

    pub fn sum(&self) -> Result<ScalarValue> {
        self.reduce(AggregateKind::Sum)
    }

    pub fn mean(&self) -> Result<ScalarValue> {
        self.reduce(AggregateKind::Mean)
    }

    pub fn min(&self) -> Result<ScalarValue> {
        self.reduce(AggregateKind::Min)
    }

    pub fn max(&self) -> Result<ScalarValue> {
        self.reduce(AggregateKind::Max)
    }

    pub fn median(&self) -> Result<ScalarValue> {
        self.reduce(AggregateKind::Median)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_ints_do_not_wrap() {
        let col = Column::from_slice("a", &[u16::MAX, u16::MAX, u16::MAX]);
        assert_eq!(ScalarValue::Int64(3 * u16::MAX as i64), col.sum().unwrap());
        assert_eq!(ScalarValue::Float64(u16::MAX as f64), col.mean().unwrap());
    }

    #[test]
    fn nulls_skipped() {
        let col = Column::from_opt("a", vec![Some(1i32), None, Some(5)]);
        assert_eq!(ScalarValue::Int64(6), col.sum().unwrap());
        assert_eq!(ScalarValue::Int32(1), col.min().unwrap());
        assert_eq!(ScalarValue::Float64(3.0), col.median().unwrap());
        assert_eq!(
            ScalarValue::UInt32(2),
            col.reduce(AggregateKind::Count).unwrap()
        );
        assert_eq!(
            ScalarValue::UInt32(3),
            col.reduce(AggregateKind::NUnique).unwrap()
        );
    }

    #[test]
    fn reduce_subset() {
        let col = Column::from_slice("a", &[1.0f64, 2.0, 3.0, 4.0]);
        let reducer = Reducer::try_new(&col, AggregateKind::Sum).unwrap();
        assert_eq!(ScalarValue::Float64(7.0), reducer.reduce([2, 3].into_iter()).unwrap());
        let reducer = Reducer::try_new(&col, AggregateKind::Last).unwrap();
        assert_eq!(ScalarValue::Float64(2.0), reducer.reduce(0..2).unwrap());
    }

    #[test]
    fn std_and_var() {
        let col = Column::from_slice("a", &[2i64, 4, 4, 4, 5, 5, 7, 9]);
        let var = col.reduce(AggregateKind::Var).unwrap().try_as_f64().unwrap();
        assert!((var - 4.571428571428571).abs() < 1e-12);
        let single = Column::from_slice("a", &[1i64]);
        assert_eq!(ScalarValue::Null, single.reduce(AggregateKind::Std).unwrap());
    }

    #[test]
    fn strings_min_max_but_not_sum() {
        let col = Column::from_strs("a", &["b", "a", "c"]);
        assert_eq!(ScalarValue::from("a"), col.min().unwrap());
        assert_eq!(ScalarValue::from("c"), col.max().unwrap());
        assert_eq!(
            floe_error::ErrorKind::Compute,
            col.sum().unwrap_err().kind()
        );
    }

    #[test]
    fn int_product_overflow_is_error() {
        let col = Column::from_slice("a", &[3i64, 4]);
        assert_eq!(ScalarValue::Int64(12), col.reduce(AggregateKind::Product).unwrap());

        let col = Column::from_slice("a", &[i64::MAX, 2]);
        let err = col.reduce(AggregateKind::Product).unwrap_err();
        assert_eq!(floe_error::ErrorKind::Compute, err.kind());

        let col = Column::from_slice("a", &[i64::MAX, i64::MAX, i64::MAX]);
        let err = col.reduce(AggregateKind::Product).unwrap_err();
        assert_eq!(floe_error::ErrorKind::Compute, err.kind());
    }

    #[test]
    fn empty_sum_is_zero() {
        let col = Column::from_slice::<i64>("a", &[]);
        assert_eq!(ScalarValue::Int64(0), col.sum().unwrap());
        assert_eq!(ScalarValue::Null, col.mean().unwrap());
    }
}
