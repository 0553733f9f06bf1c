//! Named column functions usable inside expressions.

use std::fmt;

use floe_error::{DbError, Result};

use crate::arrays::datatype::{DataType, supertype};
use crate::arrays::scalar::ScalarValue;
use crate::column::Column;
use crate::column::arith::{ArithOp, output_type};
use crate::column::fill::FillNullStrategy;
use crate::column::sort::SortOptions;

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionExpr {
    Head(usize),
    Tail(usize),
    Slice { offset: i64, len: usize },
    Sort(SortOptions),
    Reverse,
    /// Distinct values in order of first occurrence.
    Unique,
    Shift(i64),
    FillNull(FillNullStrategy),
    FillNan(ScalarValue),
    DropNulls,
    IsNull,
    IsNotNull,
    IsDuplicated,
    IsUnique,
    CumSum { reverse: bool },
    Diff(i64),
    Abs,
    Hash,
    /// Collect all values into a single list.
    List,
    Explode,
    /// Indices of the rows that are true.
    ArgWhere,
    Str(StringFunction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringFunction {
    Lengths,
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    ToUppercase,
    ToLowercase,
    Replace {
        pattern: String,
        value: String,
        all: bool,
    },
    Extract {
        pattern: String,
        group: usize,
    },
    ExtractAll(String),
    Zfill(usize),
    LJust {
        width: usize,
        fill: char,
    },
    RJust {
        width: usize,
        fill: char,
    },
    /// Join all values into one string.
    Concat(String),
}

impl FunctionExpr {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Head(_) => "head",
            Self::Tail(_) => "tail",
            Self::Slice { .. } => "slice",
            Self::Sort(_) => "sort",
            Self::Reverse => "reverse",
            Self::Unique => "unique",
            Self::Shift(_) => "shift",
            Self::FillNull(_) => "fill_null",
            Self::FillNan(_) => "fill_nan",
            Self::DropNulls => "drop_nulls",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
            Self::IsDuplicated => "is_duplicated",
            Self::IsUnique => "is_unique",
            Self::CumSum { .. } => "cum_sum",
            Self::Diff(_) => "diff",
            Self::Abs => "abs",
            Self::Hash => "hash",
            Self::List => "list",
            Self::Explode => "explode",
            Self::ArgWhere => "arg_where",
            Self::Str(f) => f.name(),
        }
    }

    /// Whether the function always produces a single value from its input.
    pub fn is_reduction(&self) -> bool {
        matches!(self, Self::List | Self::Str(StringFunction::Concat(_)))
    }

    /// Whether each output row depends only on the same input row.
    pub fn is_elementwise(&self) -> bool {
        match self {
            Self::FillNull(strategy) => matches!(
                strategy,
                FillNullStrategy::Value(_) | FillNullStrategy::Zero | FillNullStrategy::One
            ),
            Self::Str(StringFunction::Concat(_)) => false,
            Self::FillNan(_) | Self::IsNull | Self::IsNotNull | Self::Abs | Self::Hash | Self::Str(_) => true,
            _ => false,
        }
    }

    /// Datatype produced for an input of type `input`.
    pub fn output_type(&self, input: &DataType) -> Result<DataType> {
        Ok(match self {
            Self::Head(_)
            | Self::Tail(_)
            | Self::Slice { .. }
            | Self::Sort(_)
            | Self::Reverse
            | Self::Unique
            | Self::Shift(_)
            | Self::FillNan(_)
            | Self::DropNulls
            | Self::Abs => input.clone(),
            Self::FillNull(FillNullStrategy::Value(value)) => {
                supertype(input, &value.datatype()).ok_or_else(|| {
                    DbError::schema("Fill value not compatible with column")
                        .with_field("datatype", input)
                        .with_field("value", value)
                })?
            }
            Self::FillNull(_) => input.clone(),
            Self::IsNull | Self::IsNotNull | Self::IsDuplicated | Self::IsUnique => DataType::Boolean,
            Self::CumSum { .. } => input.sum_type().ok_or_else(|| {
                DbError::new("Cumulative sum not supported for datatype").with_field("datatype", input)
            })?,
            Self::Diff(_) => output_type(input, input, ArithOp::Sub).ok_or_else(|| {
                DbError::new("Diff not supported for datatype").with_field("datatype", input)
            })?,
            Self::Hash => DataType::UInt64,
            Self::List => DataType::list(input.clone()),
            Self::Explode => match input {
                DataType::List(inner) => inner.as_ref().clone(),
                other => {
                    return Err(DbError::schema("Only list columns can be exploded").with_field("datatype", other));
                }
            },
            Self::ArgWhere => match input {
                DataType::Boolean => DataType::UInt32,
                other => {
                    return Err(DbError::schema("Expected a boolean column").with_field("datatype", other));
                }
            },
            Self::Str(f) => f.output_type(),
        })
    }

    pub fn evaluate(&self, input: &Column) -> Result<Column> {
        match self {
            Self::Head(n) => Ok(input.head(*n)),
            Self::Tail(n) => Ok(input.tail(*n)),
            Self::Slice { offset, len } => Ok(input.slice(*offset, *len)),
            Self::Sort(options) => input.sort(*options),
            Self::Reverse => input.reverse(),
            Self::Unique => input.unique(),
            Self::Shift(periods) => input.shift(*periods),
            Self::FillNull(strategy) => input.fill_null(strategy),
            Self::FillNan(value) => input.fill_nan(value),
            Self::DropNulls => input.drop_nulls(),
            Self::IsNull => Ok(input.is_null()),
            Self::IsNotNull => Ok(input.is_not_null()),
            Self::IsDuplicated => input.is_duplicated(),
            Self::IsUnique => input.is_unique(),
            Self::CumSum { reverse } => input.cum_sum(*reverse),
            Self::Diff(n) => input.diff(*n),
            Self::Abs => input.abs(),
            Self::Hash => input.hash_values(),
            Self::List => input.implode(),
            Self::Explode => Ok(input.explode()?.0),
            Self::ArgWhere => input.arg_true(),
            Self::Str(f) => f.evaluate(input),
        }
    }
}

impl fmt::Display for FunctionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head(n) | Self::Tail(n) => write!(f, "{}({n})", self.name()),
            Self::Slice { offset, len } => write!(f, "slice({offset}, {len})"),
            Self::Sort(options) => write!(f, "sort(descending={})", options.descending),
            Self::Shift(n) | Self::Diff(n) => write!(f, "{}({n})", self.name()),
            Self::FillNan(value) => write!(f, "fill_nan({value})"),
            Self::Str(func) => write!(f, "str.{func}"),
            _ => write!(f, "{}()", self.name()),
        }
    }
}

impl StringFunction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lengths => "lengths",
            Self::Contains(_) => "contains",
            Self::StartsWith(_) => "starts_with",
            Self::EndsWith(_) => "ends_with",
            Self::ToUppercase => "to_uppercase",
            Self::ToLowercase => "to_lowercase",
            Self::Replace { .. } => "replace",
            Self::Extract { .. } => "extract",
            Self::ExtractAll(_) => "extract_all",
            Self::Zfill(_) => "zfill",
            Self::LJust { .. } => "ljust",
            Self::RJust { .. } => "rjust",
            Self::Concat(_) => "concat",
        }
    }

    fn output_type(&self) -> DataType {
        match self {
            Self::Lengths => DataType::UInt32,
            Self::Contains(_) | Self::StartsWith(_) | Self::EndsWith(_) => DataType::Boolean,
            Self::ExtractAll(_) => DataType::list(DataType::Utf8),
            _ => DataType::Utf8,
        }
    }

    fn evaluate(&self, input: &Column) -> Result<Column> {
        match self {
            Self::Lengths => input.str_lengths(),
            Self::Contains(pattern) => input.str_contains(pattern),
            Self::StartsWith(prefix) => input.str_starts_with(prefix),
            Self::EndsWith(suffix) => input.str_ends_with(suffix),
            Self::ToUppercase => input.str_to_uppercase(),
            Self::ToLowercase => input.str_to_lowercase(),
            Self::Replace {
                pattern,
                value,
                all,
            } => input.str_replace(pattern, value, *all),
            Self::Extract { pattern, group } => input.str_extract(pattern, *group),
            Self::ExtractAll(pattern) => input.str_extract_all(pattern),
            Self::Zfill(width) => input.str_zfill(*width),
            Self::LJust { width, fill } => input.str_ljust(*width, *fill),
            Self::RJust { width, fill } => input.str_rjust(*width, *fill),
            Self::Concat(delimiter) => input.str_concat(delimiter),
        }
    }
}

impl fmt::Display for StringFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(s) | Self::StartsWith(s) | Self::EndsWith(s) => {
                write!(f, "{}({s:?})", self.name())
            }
            Self::Replace { pattern, value, .. } => write!(f, "replace({pattern:?}, {value:?})"),
            Self::Extract { pattern, group } => write!(f, "extract({pattern:?}, {group})"),
            Self::ExtractAll(pattern) | Self::Concat(pattern) => write!(f, "{}({pattern:?})", self.name()),
            Self::Zfill(width) => write!(f, "zfill({width})"),
            Self::LJust { width, fill } | Self::RJust { width, fill } => {
                write!(f, "{}({width}, {fill:?})", self.name())
            }
            _ => write!(f, "{}()", self.name()),
        }
    }
}
