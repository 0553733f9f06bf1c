//! Casting between datatypes.
//!
//! Rules:
//! - Integer to integer and float to integer conversions produce null when
//!   the value doesn't fit the target (or errors in strict mode). Floats are
//!   truncated toward zero, NaN never fits.
//! - Float64 to Float32 rounds to the nearest representable value.
//! - Strings parse into numbers, booleans and temporal values. Unparsable
//!   strings become null unless strict.
//! - Any primitive can be rendered as a string.
//! - Struct and object columns only cast to themselves (structs field-wise).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use floe_error::{DbError, Result};
use num_traits::NumCast;

use super::Column;
use crate::arrays::array::Array;
use crate::arrays::bitmap::Bitmap;
use crate::arrays::buffer::SharedBuffer;
use crate::arrays::datatype::{DataType, TimeUnit};
use crate::arrays::native::NativeType;
use crate::arrays::scalar::ScalarValue;
use crate::{dispatch_native, dispatch_native_type};

const SECONDS_PER_DAY: i64 = 86_400;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Check if a cast between two types is defined.
pub fn can_cast(from: &DataType, to: &DataType) -> bool {
    use DataType::*;

    if from == to {
        return true;
    }

    match (from, to) {
        (Null, _) | (_, Null) => true,
        (Object, _) | (_, Object) => false,
        (List(a), List(b)) => can_cast(a, b),
        (Struct(a), Struct(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(a, b)| can_cast(&a.datatype, &b.datatype))
        }
        (List(_) | Struct(_), _) | (_, List(_) | Struct(_)) => false,
        (_, Utf8) => true,
        (Utf8, _) => true,
        (Categorical, _) | (_, Categorical) => false,
        (a, b) if (a.is_numeric() || *a == Boolean) && (b.is_numeric() || *b == Boolean) => true,
        (a, b) if a.is_integer() && b.is_temporal() => true,
        (a, b) if a.is_temporal() && b.is_numeric() => true,
        (Date, Datetime(_))
        | (Datetime(_), Date)
        | (Datetime(_), Datetime(_))
        | (Datetime(_), Time)
        | (Duration(_), Duration(_)) => true,
        _ => false,
    }
}

fn cast_failed(value: &ScalarValue, to: &DataType) -> DbError {
    DbError::new("Strict cast failed")
        .with_field("value", value.to_string())
        .with_field("to", to)
}

pub(crate) fn int_scalar(to: &DataType, v: i128) -> Option<ScalarValue> {
    Some(match to {
        DataType::Int8 => ScalarValue::Int8(i8::try_from(v).ok()?),
        DataType::Int16 => ScalarValue::Int16(i16::try_from(v).ok()?),
        DataType::Int32 => ScalarValue::Int32(i32::try_from(v).ok()?),
        DataType::Int64 => ScalarValue::Int64(i64::try_from(v).ok()?),
        DataType::UInt8 => ScalarValue::UInt8(u8::try_from(v).ok()?),
        DataType::UInt16 => ScalarValue::UInt16(u16::try_from(v).ok()?),
        DataType::UInt32 => ScalarValue::UInt32(u32::try_from(v).ok()?),
        DataType::UInt64 => ScalarValue::UInt64(u64::try_from(v).ok()?),
        DataType::Date => ScalarValue::Date(i32::try_from(v).ok()?),
        DataType::Datetime(unit) => ScalarValue::Datetime(i64::try_from(v).ok()?, *unit),
        DataType::Duration(unit) => ScalarValue::Duration(i64::try_from(v).ok()?, *unit),
        DataType::Time => ScalarValue::Time(i64::try_from(v).ok()?),
        _ => return None,
    })
}

/// Convert a numeric (or boolean or temporal) value to a numeric type.
fn numeric_scalar(value: &ScalarValue, to: &DataType) -> Option<ScalarValue> {
    match to {
        DataType::Boolean => value.try_as_f64().map(|v| ScalarValue::Boolean(v != 0.0)),
        DataType::Float32 => value.try_as_f64().map(|v| ScalarValue::Float32(v as f32)),
        DataType::Float64 => value.try_as_f64().map(ScalarValue::Float64),
        to if to.is_integer() || to.is_temporal() => {
            let v = if value.is_float() {
                let f = value.try_as_f64()?;
                if !f.is_finite() {
                    return None;
                }
                let t = f.trunc();
                if t < i128::MIN as f64 || t > i128::MAX as f64 {
                    return None;
                }
                t as i128
            } else {
                value.try_as_i128()?
            };
            int_scalar(to, v)
        }
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_str(s: &str, to: &DataType) -> Option<ScalarValue> {
    let s = s.trim();
    match to {
        DataType::Boolean => match s.to_ascii_lowercase().as_str() {
            "true" => Some(ScalarValue::Boolean(true)),
            "false" => Some(ScalarValue::Boolean(false)),
            _ => None,
        },
        DataType::Float32 => s.parse::<f32>().ok().map(ScalarValue::Float32),
        DataType::Float64 => s.parse::<f64>().ok().map(ScalarValue::Float64),
        to if to.is_integer() => int_scalar(to, s.parse::<i128>().ok()?),
        DataType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .map(ScalarValue::date_from_naive),
        DataType::Datetime(unit) => {
            parse_datetime(s).map(|dt| ScalarValue::datetime_from_naive(dt, *unit))
        }
        DataType::Time => ["%H:%M:%S%.f", "%H:%M"]
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
            .map(ScalarValue::time_from_naive),
        DataType::Duration(unit) => s
            .parse::<i64>()
            .ok()
            .map(|v| ScalarValue::Duration(v, *unit)),
        DataType::Categorical => Some(ScalarValue::Categorical(s.to_string())),
        _ => None,
    }
}

fn temporal_scalar(value: &ScalarValue, to: &DataType) -> Option<ScalarValue> {
    let day = |unit: TimeUnit| SECONDS_PER_DAY * unit.per_second();
    Some(match (value, to) {
        (ScalarValue::Date(d), DataType::Datetime(unit)) => {
            ScalarValue::Datetime((*d as i64).checked_mul(day(*unit))?, *unit)
        }
        (ScalarValue::Datetime(v, unit), DataType::Date) => {
            ScalarValue::Date(i32::try_from(v.div_euclid(day(*unit))).ok()?)
        }
        (ScalarValue::Datetime(v, from), DataType::Datetime(to)) => {
            ScalarValue::Datetime(from.convert(*v, *to), *to)
        }
        (ScalarValue::Datetime(v, unit), DataType::Time) => {
            let within_day = v.rem_euclid(day(*unit));
            ScalarValue::Time(within_day * (NANOS_PER_SECOND / unit.per_second()))
        }
        (ScalarValue::Duration(v, from), DataType::Duration(to)) => {
            ScalarValue::Duration(from.convert(*v, *to), *to)
        }
        _ => return None,
    })
}

/// Cast a single value.
///
/// Undefined casts error with a schema error. Values that can't be
/// represented in the target type become null, or error when `strict`.
pub fn cast_scalar(value: &ScalarValue, to: &DataType, strict: bool) -> Result<ScalarValue> {
    if value.is_null() {
        return Ok(ScalarValue::Null);
    }
    let from = value.datatype();
    if &from == to {
        return Ok(value.clone());
    }
    if !can_cast(&from, to) {
        return Err(DbError::schema("Cannot cast between datatypes")
            .with_field("from", &from)
            .with_field("to", to));
    }

    let converted = match (value, to) {
        (_, DataType::Null) => Some(ScalarValue::Null),
        (ScalarValue::List(values), DataType::List(inner)) => Some(ScalarValue::List(
            values
                .iter()
                .map(|v| cast_scalar(v, inner, strict))
                .collect::<Result<Vec<_>>>()?,
        )),
        (ScalarValue::Struct(values), DataType::Struct(fields)) => Some(ScalarValue::Struct(
            values
                .iter()
                .zip(fields.iter())
                .map(|((_, v), field)| {
                    Ok((field.name.clone(), cast_scalar(v, &field.datatype, strict)?))
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        (ScalarValue::Utf8(s) | ScalarValue::Categorical(s), to) if *to != DataType::Utf8 => {
            parse_str(s, to)
        }
        (v, DataType::Utf8) => Some(ScalarValue::Utf8(v.to_string())),
        (v, to) if from.is_temporal() && to.is_temporal() => temporal_scalar(v, to),
        (v, to) => numeric_scalar(v, to),
    };

    match converted {
        Some(v) => Ok(v),
        None if strict => Err(cast_failed(value, to)),
        None => Ok(ScalarValue::Null),
    }
}

/// Vectorized numeric to numeric cast for a single array.
fn cast_native<F: NativeType, T: NativeType>(
    array: &Array,
    values: &[F],
    strict: bool,
) -> Result<Array> {
    let mut out = Vec::with_capacity(values.len());
    let mut validity = Bitmap::with_capacity(values.len());
    for (idx, v) in values.iter().enumerate() {
        if !array.is_valid(idx) {
            out.push(T::default());
            validity.push(false);
            continue;
        }
        match <T as NumCast>::from(*v) {
            Some(v) => {
                out.push(v);
                validity.push(true);
            }
            None if strict => return Err(cast_failed(&v.to_scalar(), &T::DATATYPE)),
            None => {
                out.push(T::default());
                validity.push(false);
            }
        }
    }
    Ok(Array::new_unchecked(
        T::DATATYPE,
        T::wrap(SharedBuffer::from_vec(out)),
        Some(validity),
    ))
}

fn same_physical(from: &DataType, to: &DataType) -> bool {
    use DataType::*;
    matches!(
        (from, to),
        (Int32, Date)
            | (Date, Int32)
            | (Int64, Datetime(_) | Duration(_) | Time)
            | (Datetime(_) | Duration(_) | Time, Int64)
    )
}

fn cast_array(array: &Array, to: &DataType, strict: bool) -> Result<Array> {
    let from = array.datatype();

    if same_physical(from, to) {
        return Ok(array.clone().with_logical_type(to.clone()));
    }

    if from.is_numeric() && to.is_numeric() {
        return dispatch_native!(array.data(), values, F => {
            dispatch_native_type!(to, T => {
                cast_native::<F, T>(array, values.as_slice(), strict)
            }, _ => Err(DbError::panic("Expected numeric target type")))
        }, _ => Err(DbError::panic("Expected numeric array")));
    }

    let mut values = Vec::with_capacity(array.len());
    for idx in 0..array.len() {
        values.push(cast_scalar(&array.value(idx), to, strict)?);
    }
    Array::from_scalars(to, &values)
}

impl Column {
    /// Cast to another datatype. Values that don't fit become null.
    pub fn cast(&self, to: &DataType) -> Result<Column> {
        self.cast_with(to, false)
    }

    /// Cast to another datatype, erroring on values that don't fit.
    pub fn strict_cast(&self, to: &DataType) -> Result<Column> {
        self.cast_with(to, true)
    }

    fn cast_with(&self, to: &DataType, strict: bool) -> Result<Column> {
        if self.datatype() == to {
            return Ok(self.clone());
        }
        if !can_cast(self.datatype(), to) {
            return Err(DbError::schema("Cannot cast column")
                .with_field("column", self.name())
                .with_field("from", self.datatype())
                .with_field("to", to));
        }

        let chunks = self
            .chunks()
            .iter()
            .map(|chunk| cast_array(chunk, to, strict))
            .collect::<Result<Vec<_>>>()?;
        Column::try_from_chunks(self.name(), to.clone(), chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::datatype::Field;
    use floe_error::ErrorKind;

    #[test]
    fn narrowing_out_of_range_is_null() {
        let col = Column::from_slice("a", &[1i64, 300, -5]);
        let out = col.cast(&DataType::UInt8).unwrap();
        assert_eq!(
            vec![ScalarValue::UInt8(1), ScalarValue::Null, ScalarValue::Null],
            out.to_scalars()
        );
        assert!(col.strict_cast(&DataType::UInt8).is_err());
    }

    #[test]
    fn float_to_int_truncates() {
        let col = Column::from_slice("a", &[1.9f64, -1.9, f64::NAN]);
        let out = col.cast(&DataType::Int32).unwrap();
        assert_eq!(
            vec![ScalarValue::Int32(1), ScalarValue::Int32(-1), ScalarValue::Null],
            out.to_scalars()
        );
    }

    #[test]
    fn string_parse_failure() {
        let col = Column::from_strs("a", &["1", "x", " 3 "]);
        let out = col.cast(&DataType::Int64).unwrap();
        assert_eq!(
            vec![ScalarValue::Int64(1), ScalarValue::Null, ScalarValue::Int64(3)],
            out.to_scalars()
        );
        let err = col.strict_cast(&DataType::Int64).unwrap_err();
        assert_eq!(ErrorKind::Compute, err.kind());
    }

    #[test]
    fn struct_to_int_is_schema_error() {
        let dt = DataType::Struct(vec![Field::new("x", DataType::Int64)]);
        let col = Column::full_null("s", &dt, 2);
        let err = col.cast(&DataType::Int64).unwrap_err();
        assert_eq!(ErrorKind::Schema, err.kind());
    }

    #[test]
    fn date_to_datetime_and_back() {
        let col = Column::from_strs("d", &["2021-01-02", "1969-12-31"]);
        let dates = col.cast(&DataType::Date).unwrap();
        let dts = dates
            .cast(&DataType::Datetime(TimeUnit::Milliseconds))
            .unwrap();
        assert_eq!(
            ScalarValue::Datetime(-86_400_000, TimeUnit::Milliseconds),
            dts.get(1).unwrap()
        );
        let back = dts.cast(&DataType::Date).unwrap();
        assert!(back.series_equal(&dates, false));
    }

    #[test]
    fn numbers_to_strings() {
        let col = Column::from_opt("a", vec![Some(1.0f64), None, Some(2.5)]);
        let out = col.cast(&DataType::Utf8).unwrap();
        assert_eq!(
            vec![ScalarValue::from("1.0"), ScalarValue::Null, ScalarValue::from("2.5")],
            out.to_scalars()
        );
    }

    #[test]
    fn int_reinterpreted_as_date() {
        let col = Column::from_slice("a", &[0i32, 1]);
        let out = col.cast(&DataType::Date).unwrap();
        assert_eq!("1970-01-02", out.get(1).unwrap().to_string());
    }
}
