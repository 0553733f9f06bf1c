use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use super::datatype::{DataType, Field, TimeUnit};
use super::object::ObjectValue;

/// A single value of any supported type.
#[derive(Debug, Clone)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
    /// Days since epoch.
    Date(i32),
    Datetime(i64, TimeUnit),
    Duration(i64, TimeUnit),
    /// Nanoseconds since midnight.
    Time(i64),
    List(Vec<ScalarValue>),
    Struct(Vec<(String, ScalarValue)>),
    Categorical(String),
    Object(ObjectValue),
}

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

impl ScalarValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Datatype of this value.
    ///
    /// Lists infer their inner type from the first non-null element,
    /// defaulting to Float64 for empty lists.
    pub fn datatype(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean(_) => DataType::Boolean,
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt8(_) => DataType::UInt8,
            Self::UInt16(_) => DataType::UInt16,
            Self::UInt32(_) => DataType::UInt32,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
            Self::Date(_) => DataType::Date,
            Self::Datetime(_, unit) => DataType::Datetime(*unit),
            Self::Duration(_, unit) => DataType::Duration(*unit),
            Self::Time(_) => DataType::Time,
            Self::List(values) => {
                let inner = values
                    .iter()
                    .find(|v| !v.is_null())
                    .map(|v| v.datatype())
                    .unwrap_or(DataType::Float64);
                DataType::list(inner)
            }
            Self::Struct(fields) => DataType::Struct(
                fields
                    .iter()
                    .map(|(name, v)| Field::new(name.clone(), v.datatype()))
                    .collect(),
            ),
            Self::Categorical(_) => DataType::Categorical,
            Self::Object(_) => DataType::Object,
        }
    }

    pub fn try_as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of this value, including the raw value of temporal
    /// types.
    pub fn try_as_i128(&self) -> Option<i128> {
        Some(match self {
            Self::Boolean(v) => *v as i128,
            Self::Int8(v) => *v as i128,
            Self::Int16(v) => *v as i128,
            Self::Int32(v) => *v as i128,
            Self::Int64(v) => *v as i128,
            Self::UInt8(v) => *v as i128,
            Self::UInt16(v) => *v as i128,
            Self::UInt32(v) => *v as i128,
            Self::UInt64(v) => *v as i128,
            Self::Date(v) => *v as i128,
            Self::Datetime(v, _) | Self::Duration(v, _) | Self::Time(v) => *v as i128,
            _ => return None,
        })
    }

    pub fn try_as_i64(&self) -> Option<i64> {
        self.try_as_i128().and_then(|v| i64::try_from(v).ok())
    }

    pub fn try_as_usize(&self) -> Option<usize> {
        self.try_as_i128().and_then(|v| usize::try_from(v).ok())
    }

    pub fn try_as_f64(&self) -> Option<f64> {
        match self {
            Self::Float32(v) => Some(*v as f64),
            Self::Float64(v) => Some(*v),
            other => other.try_as_i128().map(|v| v as f64),
        }
    }

    pub fn try_as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) | Self::Categorical(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float32(_) | Self::Float64(_))
    }

    pub fn is_nan(&self) -> bool {
        match self {
            Self::Float32(v) => v.is_nan(),
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Total ordering used for sorting and min/max.
    ///
    /// Nulls sort before everything. Numbers compare by value across types,
    /// NaN sorts after every other number. Values of unrelated types compare
    /// by their type tag.
    pub fn total_cmp(&self, other: &ScalarValue) -> Ordering {
        use ScalarValue::*;

        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Utf8(a), Utf8(b)) | (Categorical(a), Categorical(b)) => a.cmp(b),
            (List(a), List(b)) => {
                for (a, b) in a.iter().zip(b.iter()) {
                    let ord = a.total_cmp(b);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Struct(a), Struct(b)) => {
                for ((_, a), (_, b)) in a.iter().zip(b.iter()) {
                    let ord = a.total_cmp(b);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) if a.is_float() || b.is_float() => match (a.try_as_f64(), b.try_as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.type_rank().cmp(&other.type_rank()),
            },
            (a, b) => match (a.try_as_i128(), b.try_as_i128()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => self.type_rank().cmp(&other.type_rank()),
            },
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Int8(_)
            | Self::Int16(_)
            | Self::Int32(_)
            | Self::Int64(_)
            | Self::UInt8(_)
            | Self::UInt16(_)
            | Self::UInt32(_)
            | Self::UInt64(_)
            | Self::Float32(_)
            | Self::Float64(_) => 2,
            Self::Date(_) | Self::Datetime(_, _) | Self::Duration(_, _) | Self::Time(_) => 3,
            Self::Utf8(_) | Self::Categorical(_) => 4,
            Self::List(_) => 5,
            Self::Struct(_) => 6,
            Self::Object(_) => 7,
        }
    }

    pub fn date_from_naive(date: NaiveDate) -> Self {
        Self::Date(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
    }

    pub fn datetime_from_naive(dt: NaiveDateTime, unit: TimeUnit) -> Self {
        let utc = dt.and_utc();
        let value = match unit {
            TimeUnit::Milliseconds => utc.timestamp_millis(),
            TimeUnit::Microseconds => utc.timestamp_micros(),
            TimeUnit::Nanoseconds => utc
                .timestamp_nanos_opt()
                .unwrap_or(utc.timestamp_micros().saturating_mul(1000)),
        };
        Self::Datetime(value, unit)
    }

    pub fn time_from_naive(time: NaiveTime) -> Self {
        Self::Time(time.num_seconds_from_midnight() as i64 * 1_000_000_000 + time.nanosecond() as i64)
    }
}

pub(crate) fn naive_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

pub(crate) fn naive_datetime(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let per = unit.per_second();
    let secs = value.div_euclid(per);
    let nanos = value.rem_euclid(per) * (1_000_000_000 / per);
    DateTime::from_timestamp(secs, nanos as u32).map(|dt| dt.naive_utc())
}

pub(crate) fn naive_time(nanos: i64) -> Option<NaiveTime> {
    let secs = nanos.div_euclid(1_000_000_000);
    let sub = nanos.rem_euclid(1_000_000_000);
    NaiveTime::from_num_seconds_from_midnight_opt(u32::try_from(secs).ok()?, sub as u32)
}

/// Format a float so integral values keep a trailing `.0`.
pub(crate) fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt8(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{}", format_float(*v as f64)),
            Self::Float64(v) => write!(f, "{}", format_float(*v)),
            Self::Utf8(v) | Self::Categorical(v) => write!(f, "{v}"),
            Self::Date(v) => match naive_date(*v) {
                Some(date) => write!(f, "{date}"),
                None => write!(f, "{v}d"),
            },
            Self::Datetime(v, unit) => match naive_datetime(*v, *unit) {
                Some(dt) => write!(f, "{dt}"),
                None => write!(f, "{v}{unit}"),
            },
            Self::Duration(v, unit) => write!(f, "{v}{unit}"),
            Self::Time(v) => match naive_time(*v) {
                Some(time) => write!(f, "{time}"),
                None => write!(f, "{v}ns"),
            },
            Self::List(values) => {
                write!(f, "[")?;
                for (idx, v) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Self::Struct(fields) => {
                write!(f, "{{")?;
                for (idx, (name, v)) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {v}")?;
                }
                write!(f, "}}")
            }
            Self::Object(v) => write!(f, "{v}"),
        }
    }
}

fn canonical_f64_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

/// Equality is structural. Floats are compared by canonical bit pattern so
/// that NaN equals NaN, matching the hash implementation.
impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        use ScalarValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Int8(a), Int8(b)) => a == b,
            (Int16(a), Int16(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (UInt8(a), UInt8(b)) => a == b,
            (UInt16(a), UInt16(b)) => a == b,
            (UInt32(a), UInt32(b)) => a == b,
            (UInt64(a), UInt64(b)) => a == b,
            (Float32(a), Float32(b)) => {
                canonical_f64_bits(*a as f64) == canonical_f64_bits(*b as f64)
            }
            (Float64(a), Float64(b)) => canonical_f64_bits(*a) == canonical_f64_bits(*b),
            (Utf8(a), Utf8(b)) => a == b,
            (Categorical(a), Categorical(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Datetime(a, ua), Datetime(b, ub)) => a == b && ua == ub,
            (Duration(a, ua), Duration(b, ub)) => a == b && ua == ub,
            (Time(a), Time(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Struct(a), Struct(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => (),
            Self::Boolean(v) => v.hash(state),
            Self::Int8(v) => v.hash(state),
            Self::Int16(v) => v.hash(state),
            Self::Int32(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::UInt8(v) => v.hash(state),
            Self::UInt16(v) => v.hash(state),
            Self::UInt32(v) => v.hash(state),
            Self::UInt64(v) => v.hash(state),
            Self::Float32(v) => canonical_f64_bits(*v as f64).hash(state),
            Self::Float64(v) => canonical_f64_bits(*v).hash(state),
            Self::Utf8(v) | Self::Categorical(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
            Self::Datetime(v, unit) | Self::Duration(v, unit) => {
                v.hash(state);
                unit.hash(state);
            }
            Self::Time(v) => v.hash(state),
            Self::List(values) => values.hash(state),
            Self::Struct(fields) => fields.hash(state),
            Self::Object(v) => v.hash(state),
        }
    }
}

macro_rules! impl_from_native {
    ($native:ty, $variant:ident) => {
        impl From<$native> for ScalarValue {
            fn from(value: $native) -> Self {
                ScalarValue::$variant(value)
            }
        }
    };
}

impl_from_native!(bool, Boolean);
impl_from_native!(i8, Int8);
impl_from_native!(i16, Int16);
impl_from_native!(i32, Int32);
impl_from_native!(i64, Int64);
impl_from_native!(u8, UInt8);
impl_from_native!(u16, UInt16);
impl_from_native!(u32, UInt32);
impl_from_native!(u64, UInt64);
impl_from_native!(f32, Float32);
impl_from_native!(f64, Float64);
impl_from_native!(String, Utf8);
impl_from_native!(ObjectValue, Object);

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<NaiveDate> for ScalarValue {
    fn from(value: NaiveDate) -> Self {
        ScalarValue::date_from_naive(value)
    }
}

impl From<NaiveDateTime> for ScalarValue {
    fn from(value: NaiveDateTime) -> Self {
        ScalarValue::datetime_from_naive(value, TimeUnit::Microseconds)
    }
}

impl From<NaiveTime> for ScalarValue {
    fn from(value: NaiveTime) -> Self {
        ScalarValue::time_from_naive(value)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => ScalarValue::Null,
        }
    }
}

impl<T: Into<ScalarValue>> From<Vec<T>> for ScalarValue {
    fn from(value: Vec<T>) -> Self {
        ScalarValue::List(value.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_equals_nan() {
        assert_eq!(ScalarValue::Float64(f64::NAN), ScalarValue::Float64(f64::NAN));
        assert_eq!(ScalarValue::Float64(-0.0), ScalarValue::Float64(0.0));
        assert_ne!(ScalarValue::Int64(1), ScalarValue::Int32(1));
    }

    #[test]
    fn ordering_across_numeric_types() {
        assert_eq!(
            Ordering::Less,
            ScalarValue::Int8(1).total_cmp(&ScalarValue::Float64(1.5))
        );
        assert_eq!(
            Ordering::Less,
            ScalarValue::Null.total_cmp(&ScalarValue::Int64(i64::MIN))
        );
        assert_eq!(
            Ordering::Greater,
            ScalarValue::from("b").total_cmp(&ScalarValue::from("a"))
        );
    }

    #[test]
    fn display_temporal() {
        let date = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        assert_eq!("2021-03-04", ScalarValue::from(date).to_string());
        let dt = date.and_hms_opt(10, 30, 0).unwrap();
        assert_eq!("2021-03-04 10:30:00", ScalarValue::from(dt).to_string());
        assert_eq!("1.0", ScalarValue::Float64(1.0).to_string());
        assert_eq!("2.5", ScalarValue::Float32(2.5).to_string());
    }

    #[test]
    fn empty_list_infers_float() {
        let v = ScalarValue::List(Vec::new());
        assert_eq!(DataType::list(DataType::Float64), v.datatype());
        let v = ScalarValue::from(vec![None, Some(3i64)]);
        assert_eq!(DataType::list(DataType::Int64), v.datatype());
    }
}
