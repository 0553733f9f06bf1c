use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeUnit {
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl TimeUnit {
    /// Number of units in one second.
    pub const fn per_second(&self) -> i64 {
        match self {
            Self::Milliseconds => 1_000,
            Self::Microseconds => 1_000_000,
            Self::Nanoseconds => 1_000_000_000,
        }
    }

    /// Convert a value in this unit to `to`. Coarsening truncates toward
    /// negative infinity.
    pub fn convert(&self, value: i64, to: TimeUnit) -> i64 {
        let from = self.per_second();
        let to_per = to.per_second();
        if from == to_per {
            value
        } else if to_per > from {
            value.saturating_mul(to_per / from)
        } else {
            value.div_euclid(from / to_per)
        }
    }

    /// The finer of two units.
    pub fn finer(self, other: TimeUnit) -> TimeUnit {
        std::cmp::max(self, other)
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Milliseconds => write!(f, "ms"),
            Self::Microseconds => write!(f, "μs"),
            Self::Nanoseconds => write!(f, "ns"),
        }
    }
}

/// A named, typed entry in a schema or struct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub datatype: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Field {
            name: name.into(),
            datatype,
        }
    }
}

/// Logical data types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Column containing only nulls.
    Null,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Utf8,
    /// Days since epoch.
    Date,
    /// Time since epoch in the given unit.
    Datetime(TimeUnit),
    Duration(TimeUnit),
    /// Nanoseconds since midnight.
    Time,
    List(Box<DataType>),
    Struct(Vec<Field>),
    /// Dictionary encoded strings.
    Categorical,
    /// Opaque values only supporting equality and hashing.
    Object,
}

impl DataType {
    pub fn list(inner: DataType) -> Self {
        DataType::List(Box::new(inner))
    }

    pub const fn is_signed_integer(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64
        )
    }

    pub const fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    pub const fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub const fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::Date | Self::Datetime(_) | Self::Duration(_) | Self::Time
        )
    }

    pub const fn is_nested(&self) -> bool {
        matches!(self, Self::List(_) | Self::Struct(_))
    }

    /// Whether values of this type can be ordered.
    pub const fn is_orderable(&self) -> bool {
        self.is_numeric()
            || self.is_temporal()
            || matches!(
                self,
                Self::Boolean | Self::Utf8 | Self::Categorical | Self::Null
            )
    }

    /// Size in bits for fixed width numeric types.
    pub const fn bit_width(&self) -> Option<usize> {
        Some(match self {
            Self::Boolean => 1,
            Self::Int8 | Self::UInt8 => 8,
            Self::Int16 | Self::UInt16 => 16,
            Self::Int32 | Self::UInt32 | Self::Float32 | Self::Date => 32,
            Self::Int64
            | Self::UInt64
            | Self::Float64
            | Self::Datetime(_)
            | Self::Duration(_)
            | Self::Time => 64,
            _ => return None,
        })
    }

    /// Inner type for lists.
    pub fn inner_list_type(&self) -> Option<&DataType> {
        match self {
            Self::List(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }

    fn integer_with(signed: bool, bits: usize) -> Option<DataType> {
        Some(match (signed, bits) {
            (true, 8) => Self::Int8,
            (true, 16) => Self::Int16,
            (true, 32) => Self::Int32,
            (true, 64) => Self::Int64,
            (false, 8) => Self::UInt8,
            (false, 16) => Self::UInt16,
            (false, 32) => Self::UInt32,
            (false, 64) => Self::UInt64,
            _ => return None,
        })
    }

    /// Type the sum of values of this type is accumulated and returned as.
    ///
    /// Narrow integers widen to 64 bits to avoid wraparound.
    pub fn sum_type(&self) -> Option<DataType> {
        Some(match self {
            Self::Boolean | Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 => Self::Int64,
            Self::UInt8 | Self::UInt16 | Self::UInt32 => Self::Int64,
            Self::UInt64 => Self::UInt64,
            Self::Float32 => Self::Float32,
            Self::Float64 => Self::Float64,
            Self::Duration(unit) => Self::Duration(*unit),
            Self::Null => Self::Null,
            _ => return None,
        })
    }
}

/// Get the common type two types can both be cast to without losing
/// meaning, if one exists.
pub fn supertype(left: &DataType, right: &DataType) -> Option<DataType> {
    use DataType::*;

    if left == right {
        return Some(left.clone());
    }

    Some(match (left, right) {
        (Null, other) | (other, Null) => other.clone(),

        (Boolean, other) | (other, Boolean) if other.is_numeric() => other.clone(),

        (l, r) if l.is_integer() && r.is_integer() => {
            let lw = l.bit_width()?;
            let rw = r.bit_width()?;
            match (l.is_signed_integer(), r.is_signed_integer()) {
                (true, true) | (false, false) => {
                    DataType::integer_with(l.is_signed_integer(), lw.max(rw))?
                }
                (signed_left, _) => {
                    let (sw, uw) = if signed_left { (lw, rw) } else { (rw, lw) };
                    if sw > uw {
                        DataType::integer_with(true, sw)?
                    } else if uw < 64 {
                        DataType::integer_with(true, uw * 2)?
                    } else {
                        Float64
                    }
                }
            }
        }

        (Float32, Float64) | (Float64, Float32) => Float64,
        (Float32, other) | (other, Float32) if other.is_integer() => {
            if other.bit_width()? <= 16 {
                Float32
            } else {
                Float64
            }
        }
        (Float64, other) | (other, Float64) if other.is_integer() => Float64,

        (Date, Datetime(unit)) | (Datetime(unit), Date) => Datetime(*unit),
        (Datetime(a), Datetime(b)) => Datetime(a.finer(*b)),
        (Duration(a), Duration(b)) => Duration(a.finer(*b)),

        (Categorical, Utf8) | (Utf8, Categorical) => Utf8,
        (Utf8, other) | (other, Utf8) if !other.is_nested() && *other != Object => Utf8,

        (List(a), List(b)) => List(Box::new(supertype(a, b)?)),

        _ => return None,
    })
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Boolean => write!(f, "Boolean"),
            Self::Int8 => write!(f, "Int8"),
            Self::Int16 => write!(f, "Int16"),
            Self::Int32 => write!(f, "Int32"),
            Self::Int64 => write!(f, "Int64"),
            Self::UInt8 => write!(f, "UInt8"),
            Self::UInt16 => write!(f, "UInt16"),
            Self::UInt32 => write!(f, "UInt32"),
            Self::UInt64 => write!(f, "UInt64"),
            Self::Float32 => write!(f, "Float32"),
            Self::Float64 => write!(f, "Float64"),
            Self::Utf8 => write!(f, "Utf8"),
            Self::Date => write!(f, "Date"),
            Self::Datetime(unit) => write!(f, "Datetime({unit})"),
            Self::Duration(unit) => write!(f, "Duration({unit})"),
            Self::Time => write!(f, "Time"),
            Self::List(inner) => write!(f, "List({inner})"),
            Self::Struct(fields) => {
                write!(f, "Struct(")?;
                for (idx, field) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.datatype)?;
                }
                write!(f, ")")
            }
            Self::Categorical => write!(f, "Categorical"),
            Self::Object => write!(f, "Object"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_supertypes() {
        assert_eq!(
            Some(DataType::Int64),
            supertype(&DataType::Int8, &DataType::Int64)
        );
        assert_eq!(
            Some(DataType::Int16),
            supertype(&DataType::UInt8, &DataType::Int8)
        );
        assert_eq!(
            Some(DataType::Int64),
            supertype(&DataType::Int32, &DataType::UInt32)
        );
        assert_eq!(
            Some(DataType::Float64),
            supertype(&DataType::UInt64, &DataType::Int64)
        );
    }

    #[test]
    fn float_supertypes() {
        assert_eq!(
            Some(DataType::Float32),
            supertype(&DataType::Float32, &DataType::Int16)
        );
        assert_eq!(
            Some(DataType::Float64),
            supertype(&DataType::Float32, &DataType::Int32)
        );
        assert_eq!(
            Some(DataType::Float64),
            supertype(&DataType::Float32, &DataType::Float64)
        );
    }

    #[test]
    fn string_wins_over_primitives() {
        assert_eq!(
            Some(DataType::Utf8),
            supertype(&DataType::Int64, &DataType::Utf8)
        );
        assert_eq!(None, supertype(&DataType::Object, &DataType::Utf8));
        assert_eq!(
            None,
            supertype(&DataType::Struct(Vec::new()), &DataType::Int64)
        );
    }

    #[test]
    fn time_unit_conversion() {
        assert_eq!(
            1_500_000,
            TimeUnit::Milliseconds.convert(1_500, TimeUnit::Microseconds)
        );
        assert_eq!(-2, TimeUnit::Microseconds.convert(-1_500, TimeUnit::Milliseconds));
    }
}
