use std::fmt;

use floe_error::{DbError, Result};

use super::Column;
use crate::arrays::array::Array;
use crate::arrays::datatype::{DataType, TimeUnit, supertype};
use crate::arrays::native::NativeType;
use crate::arrays::scalar::ScalarValue;
use crate::dispatch_native_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        };
        write!(f, "{s}")
    }
}

/// Native types supporting arithmetic. Operations returning `None` produce
/// a null (integer division by zero).
trait ArithNative: NativeType {
    fn apply(op: ArithOp, a: Self, b: Self) -> Option<Self>;
}

macro_rules! impl_arith_int {
    ($($t:ty),*) => {
        $(
            impl ArithNative for $t {
                fn apply(op: ArithOp, a: Self, b: Self) -> Option<Self> {
                    match op {
                        ArithOp::Add => Some(a.wrapping_add(b)),
                        ArithOp::Sub => Some(a.wrapping_sub(b)),
                        ArithOp::Mul => Some(a.wrapping_mul(b)),
                        ArithOp::Div => a.checked_div(b),
                        ArithOp::Rem => a.checked_rem(b),
                    }
                }
            }
        )*
    };
}

impl_arith_int!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! impl_arith_float {
    ($($t:ty),*) => {
        $(
            impl ArithNative for $t {
                fn apply(op: ArithOp, a: Self, b: Self) -> Option<Self> {
                    Some(match op {
                        ArithOp::Add => a + b,
                        ArithOp::Sub => a - b,
                        ArithOp::Mul => a * b,
                        ArithOp::Div => a / b,
                        ArithOp::Rem => a % b,
                    })
                }
            }
        )*
    };
}

impl_arith_float!(f32, f64);

/// Length of the output of a binary operation, broadcasting length one
/// inputs.
pub(crate) fn broadcast_len(left: &Column, right: &Column) -> Result<usize> {
    match (left.len(), right.len()) {
        (l, r) if l == r => Ok(l),
        (1, r) => Ok(r),
        (l, 1) => Ok(l),
        (l, r) => Err(DbError::shape("Cannot combine columns of different lengths")
            .with_field("left", l)
            .with_field("right", r)),
    }
}

#[inline]
fn bidx(values_len: usize, idx: usize) -> usize {
    if values_len == 1 { 0 } else { idx }
}

fn binary_native<T: ArithNative>(
    left: &Column,
    right: &Column,
    op: ArithOp,
    len: usize,
) -> Result<Array> {
    let l = left.native_values::<T>()?;
    let r = right.native_values::<T>()?;
    let values: Vec<Option<T>> = (0..len)
        .map(|idx| match (l[bidx(l.len(), idx)], r[bidx(r.len(), idx)]) {
            (Some(a), Some(b)) => T::apply(op, a, b),
            _ => None,
        })
        .collect();
    Ok(Array::from_native_opt(values))
}

/// Datatype of `left op right` for numeric and temporal inputs.
pub(crate) fn output_type(left: &DataType, right: &DataType, op: ArithOp) -> Option<DataType> {
    use DataType::*;

    let numeric = |dt: &DataType| dt.is_numeric() || *dt == Boolean;
    match (left, right) {
        (l, r) if numeric(l) && numeric(r) => {
            let sup = supertype(l, r)?;
            let sup = if sup == Boolean { Int64 } else { sup };
            if op == ArithOp::Div && sup.is_integer() {
                Some(Float64)
            } else {
                Some(sup)
            }
        }
        (Datetime(a), Datetime(b)) if op == ArithOp::Sub => Some(Duration(a.finer(*b))),
        (Datetime(a), Duration(b)) if matches!(op, ArithOp::Add | ArithOp::Sub) => {
            Some(Datetime(a.finer(*b)))
        }
        (Duration(a), Datetime(b)) if op == ArithOp::Add => Some(Datetime(a.finer(*b))),
        (Duration(a), Duration(b)) if matches!(op, ArithOp::Add | ArithOp::Sub) => {
            Some(Duration(a.finer(*b)))
        }
        (Date, Date) if op == ArithOp::Sub => Some(Duration(TimeUnit::Milliseconds)),
        (Duration(_), r) if r.is_integer() && matches!(op, ArithOp::Mul | ArithOp::Div) => {
            Some(left.clone())
        }
        _ => None,
    }
}

/// Bring a temporal column to a physical i64 representation in `unit`.
fn temporal_as_i64(col: &Column, unit: TimeUnit) -> Result<Column> {
    let target = match col.datatype() {
        DataType::Date | DataType::Datetime(_) => DataType::Datetime(unit),
        DataType::Duration(_) => DataType::Duration(unit),
        _ => DataType::Int64,
    };
    col.cast(&target)?.cast(&DataType::Int64)
}

fn concat_strings(left: &Column, right: &Column, len: usize) -> Result<Column> {
    let l = left.to_scalars();
    let r = right.to_scalars();
    let values: Vec<Option<String>> = (0..len)
        .map(|idx| {
            match (
                l[bidx(l.len(), idx)].try_as_str(),
                r[bidx(r.len(), idx)].try_as_str(),
            ) {
                (Some(a), Some(b)) => Some(format!("{a}{b}")),
                _ => None,
            }
        })
        .collect();
    Ok(Column::new(left.name(), Array::from_strings_opt(values)))
}

/// Evaluate `left op right` element-wise.
///
/// Length one inputs broadcast. Nulls propagate. Integer division produces
/// floats. Adding two string columns concatenates them.
pub fn arithmetic(left: &Column, right: &Column, op: ArithOp) -> Result<Column> {
    let len = broadcast_len(left, right)?;
    let (lt, rt) = (left.datatype(), right.datatype());

    if *lt == DataType::Null || *rt == DataType::Null {
        let other = if *lt == DataType::Null { rt } else { lt };
        let datatype = output_type(other, other, op).unwrap_or_else(|| other.clone());
        return Ok(Column::full_null(left.name(), &datatype, len));
    }

    let is_str = |dt: &DataType| matches!(dt, DataType::Utf8 | DataType::Categorical);
    if is_str(lt) && is_str(rt) && op == ArithOp::Add {
        return concat_strings(left, right, len);
    }

    let out = output_type(lt, rt, op).ok_or_else(|| {
        DbError::new("Arithmetic not supported between datatypes")
            .with_field("op", op)
            .with_field("left", lt)
            .with_field("right", rt)
    })?;

    if out.is_temporal() {
        // Operate on raw i64 values in the output unit.
        let unit = match &out {
            DataType::Datetime(u) | DataType::Duration(u) => *u,
            _ => TimeUnit::Milliseconds,
        };
        let l = temporal_as_i64(left, unit)?;
        let r = temporal_as_i64(right, unit)?;
        let array = binary_native::<i64>(&l, &r, op, len)?.with_logical_type(out);
        return Ok(Column::new(left.name(), array));
    }

    let l = left.cast(&out)?;
    let r = right.cast(&out)?;
    let array = dispatch_native_type!(&out, T => {
        binary_native::<T>(&l, &r, op, len)?
    }, _ => return Err(DbError::panic("Unexpected arithmetic output type").with_field("datatype", &out)));
    Ok(Column::new(left.name(), array))
}

impl Column {
    pub fn add(&self, other: &Column) -> Result<Column> {
        arithmetic(self, other, ArithOp::Add)
    }

    pub fn sub(&self, other: &Column) -> Result<Column> {
        arithmetic(self, other, ArithOp::Sub)
    }

    pub fn mul(&self, other: &Column) -> Result<Column> {
        arithmetic(self, other, ArithOp::Mul)
    }

    pub fn div(&self, other: &Column) -> Result<Column> {
        arithmetic(self, other, ArithOp::Div)
    }

    pub fn rem(&self, other: &Column) -> Result<Column> {
        arithmetic(self, other, ArithOp::Rem)
    }

    /// Negate numeric values. Unsigned columns are first widened to a
    /// signed type.
    pub fn neg(&self) -> Result<Column> {
        let datatype = match self.datatype() {
            DataType::UInt8 => DataType::Int16,
            DataType::UInt16 => DataType::Int32,
            DataType::UInt32 | DataType::UInt64 => DataType::Int64,
            dt if dt.is_numeric() || matches!(dt, DataType::Duration(_)) => dt.clone(),
            dt => {
                return Err(DbError::new("Cannot negate column")
                    .with_field("column", self.name())
                    .with_field("datatype", dt));
            }
        };
        let zero = Column::full(self.name(), &ScalarValue::Int8(0), &DataType::Int8, 1)?
            .cast(&datatype)?;
        let out = zero.sub(&self.cast(&datatype)?)?;
        Ok(out.with_name(self.name()))
    }

    pub fn abs(&self) -> Result<Column> {
        let datatype = self.datatype().clone();
        if datatype.is_unsigned_integer() {
            return Ok(self.clone());
        }
        let array = dispatch_native_type!(&datatype, T => {
            let values: Vec<Option<T>> = self
                .native_values::<T>()?
                .into_iter()
                .map(|v| v.map(|v| if v < T::default() { T::apply(ArithOp::Sub, T::default(), v).unwrap_or(v) } else { v }))
                .collect();
            Array::from_native_opt(values).with_logical_type(datatype.clone())
        }, _ => {
            return Err(DbError::new("Cannot take absolute value of column")
                .with_field("column", self.name())
                .with_field("datatype", &datatype));
        });
        Ok(Column::new(self.name(), array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_plus_float_is_float() {
        let a = Column::from_slice("a", &[1i64, 2]);
        let b = Column::from_slice("b", &[0.5f64, 0.25]);
        let out = a.add(&b).unwrap();
        assert_eq!(&DataType::Float64, out.datatype());
        assert_eq!("a", out.name());
        assert_eq!(
            vec![ScalarValue::Float64(1.5), ScalarValue::Float64(2.25)],
            out.to_scalars()
        );
    }

    #[test]
    fn int_division_is_float() {
        let a = Column::from_slice("a", &[1i32, 3]);
        let b = Column::from_slice("b", &[2i32, 2]);
        let out = a.div(&b).unwrap();
        assert_eq!(
            vec![ScalarValue::Float64(0.5), ScalarValue::Float64(1.5)],
            out.to_scalars()
        );
    }

    #[test]
    fn broadcast_and_nulls() {
        let a = Column::from_opt("a", vec![Some(1i64), None, Some(3)]);
        let b = Column::from_slice("b", &[10i64]);
        assert_eq!(
            vec![ScalarValue::Int64(10), ScalarValue::Null, ScalarValue::Int64(30)],
            a.mul(&b).unwrap().to_scalars()
        );
    }

    #[test]
    fn length_mismatch() {
        let a = Column::from_slice("a", &[1i64, 2]);
        let b = Column::from_slice("b", &[1i64, 2, 3]);
        assert_eq!(floe_error::ErrorKind::Shape, a.add(&b).unwrap_err().kind());
    }

    #[test]
    fn string_concat() {
        let a = Column::from_strs("a", &["x", "y"]);
        let b = Column::from_strs("b", &["1"]);
        assert_eq!(
            vec![ScalarValue::from("x1"), ScalarValue::from("y1")],
            a.add(&b).unwrap().to_scalars()
        );
        assert!(a.sub(&b).is_err());
    }

    #[test]
    fn rem_by_zero_is_null() {
        let a = Column::from_slice("a", &[5i64, 5]);
        let b = Column::from_slice("b", &[0i64, 3]);
        assert_eq!(
            vec![ScalarValue::Null, ScalarValue::Int64(2)],
            a.rem(&b).unwrap().to_scalars()
        );
    }

    #[test]
    fn datetime_minus_datetime() {
        let a = Column::from_scalars(
            "a",
            &DataType::Datetime(TimeUnit::Milliseconds),
            &[ScalarValue::Datetime(5_000, TimeUnit::Milliseconds)],
        )
        .unwrap();
        let b = Column::from_scalars(
            "b",
            &DataType::Datetime(TimeUnit::Milliseconds),
            &[ScalarValue::Datetime(1_000, TimeUnit::Milliseconds)],
        )
        .unwrap();
        assert_eq!(
            ScalarValue::Duration(4_000, TimeUnit::Milliseconds),
            a.sub(&b).unwrap().get(0).unwrap()
        );
    }

    #[test]
    fn neg_and_abs() {
        let a = Column::from_opt("a", vec![Some(-2i32), None, Some(3)]);
        assert_eq!(
            vec![ScalarValue::Int32(2), ScalarValue::Null, ScalarValue::Int32(-3)],
            a.neg().unwrap().to_scalars()
        );
        assert_eq!(
            vec![ScalarValue::Int32(2), ScalarValue::Null, ScalarValue::Int32(3)],
            a.abs().unwrap().to_scalars()
        );
    }
}
