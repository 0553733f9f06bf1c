use std::cmp::Ordering;
use std::fmt;

use num_traits::{NumCast, ToPrimitive};

use super::array::ArrayData;
use super::buffer::SharedBuffer;
use super::datatype::DataType;
use super::scalar::ScalarValue;

/// Fixed width values stored directly in a buffer.
pub trait NativeType:
    Copy + Default + PartialOrd + fmt::Debug + Send + Sync + NumCast + ToPrimitive + 'static
{
    /// Default logical type for this physical type.
    const DATATYPE: DataType;

    fn wrap(buffer: SharedBuffer<Self>) -> ArrayData;
    fn unwrap(data: &ArrayData) -> Option<&SharedBuffer<Self>>;
    fn to_scalar(self) -> ScalarValue;
    fn total_cmp(&self, other: &Self) -> Ordering;
    /// Bits used for hashing and equality. Floats are canonicalized so NaN
    /// and -0.0 group with their canonical forms.
    fn key_bits(&self) -> u64;

    fn is_nan(&self) -> bool {
        false
    }
}

macro_rules! impl_native_int {
    ($native:ty, $variant:ident) => {
        impl NativeType for $native {
            const DATATYPE: DataType = DataType::$variant;

            fn wrap(buffer: SharedBuffer<Self>) -> ArrayData {
                ArrayData::$variant(buffer)
            }

            fn unwrap(data: &ArrayData) -> Option<&SharedBuffer<Self>> {
                match data {
                    ArrayData::$variant(buf) => Some(buf),
                    _ => None,
                }
            }

            fn to_scalar(self) -> ScalarValue {
                ScalarValue::$variant(self)
            }

            fn total_cmp(&self, other: &Self) -> Ordering {
                self.cmp(other)
            }

            fn key_bits(&self) -> u64 {
                *self as u64
            }
        }
    };
}

impl_native_int!(i8, Int8);
impl_native_int!(i16, Int16);
impl_native_int!(i32, Int32);
impl_native_int!(i64, Int64);
impl_native_int!(u8, UInt8);
impl_native_int!(u16, UInt16);
impl_native_int!(u32, UInt32);
impl_native_int!(u64, UInt64);

macro_rules! impl_native_float {
    ($native:ty, $variant:ident) => {
        impl NativeType for $native {
            const DATATYPE: DataType = DataType::$variant;

            fn wrap(buffer: SharedBuffer<Self>) -> ArrayData {
                ArrayData::$variant(buffer)
            }

            fn unwrap(data: &ArrayData) -> Option<&SharedBuffer<Self>> {
                match data {
                    ArrayData::$variant(buf) => Some(buf),
                    _ => None,
                }
            }

            fn to_scalar(self) -> ScalarValue {
                ScalarValue::$variant(self)
            }

            fn total_cmp(&self, other: &Self) -> Ordering {
                <$native>::total_cmp(self, other)
            }

            fn key_bits(&self) -> u64 {
                if self.is_nan() {
                    <$native>::NAN.to_bits() as u64
                } else if *self == 0.0 {
                    0
                } else {
                    self.to_bits() as u64
                }
            }

            fn is_nan(&self) -> bool {
                <$native>::is_nan(*self)
            }
        }
    };
}

impl_native_float!(f32, Float32);
impl_native_float!(f64, Float64);

/// Run `$body` with `$buf` bound to the typed values buffer and `$T` aliased
/// to the native type, for every fixed width numeric variant. Other variants
/// evaluate `$other`.
#[macro_export]
macro_rules! dispatch_native {
    ($data:expr, $buf:ident, $T:ident => $body:expr, _ => $other:expr) => {
        match $data {
            $crate::arrays::array::ArrayData::Int8($buf) => {
                type $T = i8;
                $body
            }
            $crate::arrays::array::ArrayData::Int16($buf) => {
                type $T = i16;
                $body
            }
            $crate::arrays::array::ArrayData::Int32($buf) => {
                type $T = i32;
                $body
            }
            $crate::arrays::array::ArrayData::Int64($buf) => {
                type $T = i64;
                $body
            }
            $crate::arrays::array::ArrayData::UInt8($buf) => {
                type $T = u8;
                $body
            }
            $crate::arrays::array::ArrayData::UInt16($buf) => {
                type $T = u16;
                $body
            }
            $crate::arrays::array::ArrayData::UInt32($buf) => {
                type $T = u32;
                $body
            }
            $crate::arrays::array::ArrayData::UInt64($buf) => {
                type $T = u64;
                $body
            }
            $crate::arrays::array::ArrayData::Float32($buf) => {
                type $T = f32;
                $body
            }
            $crate::arrays::array::ArrayData::Float64($buf) => {
                type $T = f64;
                $body
            }
            _ => $other,
        }
    };
}

/// Same as [`dispatch_native`] but keyed on a datatype's physical layout
/// instead of an existing buffer.
#[macro_export]
macro_rules! dispatch_native_type {
    ($datatype:expr, $T:ident => $body:expr, _ => $other:expr) => {
        match $datatype {
            $crate::arrays::datatype::DataType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::arrays::datatype::DataType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::arrays::datatype::DataType::Int32 | $crate::arrays::datatype::DataType::Date => {
                type $T = i32;
                $body
            }
            $crate::arrays::datatype::DataType::Int64
            | $crate::arrays::datatype::DataType::Datetime(_)
            | $crate::arrays::datatype::DataType::Duration(_)
            | $crate::arrays::datatype::DataType::Time => {
                type $T = i64;
                $body
            }
            $crate::arrays::datatype::DataType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::arrays::datatype::DataType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::arrays::datatype::DataType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::arrays::datatype::DataType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::arrays::datatype::DataType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::arrays::datatype::DataType::Float64 => {
                type $T = f64;
                $body
            }
            _ => $other,
        }
    };
}
