//! Type inference over sampled csv fields.
//!
//! Every column starts with the full candidate list. A non-empty field
//! removes each candidate it can't be parsed as, and the first candidate
//! still standing is the column's type. Integers parse as floats and dates
//! parse as datetimes, so mixed columns widen instead of falling to Utf8.

use floe_core::arrays::datatype::{DataType, TimeUnit};
use floe_core::arrays::scalar::ScalarValue;
use floe_core::column::cast::cast_scalar;

/// Unit used for inferred datetime columns.
pub const INFERRED_TIME_UNIT: TimeUnit = TimeUnit::Microseconds;

const CANDIDATES: [DataType; 5] = [
    DataType::Boolean,
    DataType::Int64,
    DataType::Float64,
    DataType::Date,
    DataType::Datetime(INFERRED_TIME_UNIT),
];

/// Candidate types for a single column.
#[derive(Debug, Clone)]
pub struct TypeCandidates {
    remaining: Vec<DataType>,
}

impl Default for TypeCandidates {
    fn default() -> Self {
        TypeCandidates {
            remaining: CANDIDATES.to_vec(),
        }
    }
}

impl TypeCandidates {
    /// Narrow the candidates by a raw field. Empty fields are nulls and
    /// don't narrow anything.
    pub fn observe(&mut self, field: &str) {
        if field.is_empty() || self.remaining.is_empty() {
            return;
        }
        self.remaining.retain(|datatype| parse_field(field, datatype).is_some());
    }

    /// Type for the column. Columns with nothing but nulls read as Utf8.
    pub fn finish(&self, saw_values: bool) -> DataType {
        if !saw_values {
            return DataType::Utf8;
        }
        self.remaining.first().cloned().unwrap_or(DataType::Utf8)
    }
}

/// Parse a raw field into a value of the given type, `None` if it doesn't
/// fit.
pub fn parse_field(field: &str, datatype: &DataType) -> Option<ScalarValue> {
    if *datatype == DataType::Utf8 {
        return Some(ScalarValue::Utf8(field.to_string()));
    }
    cast_scalar(&ScalarValue::Utf8(field.to_string()), datatype, true)
        .ok()
        .filter(|v| !v.is_null())
}

/// Infer the type of one column from its sampled fields.
pub fn infer_type<'a>(fields: impl IntoIterator<Item = &'a str>) -> DataType {
    let mut candidates = TypeCandidates::default();
    let mut saw_values = false;
    for field in fields {
        saw_values |= !field.is_empty();
        candidates.observe(field);
    }
    candidates.finish(saw_values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_simple() {
        assert_eq!(DataType::Boolean, infer_type(["true", "False", ""]));
        assert_eq!(DataType::Int64, infer_type(["1", "-2", "30"]));
        assert_eq!(DataType::Float64, infer_type(["1", "2.5"]));
        assert_eq!(DataType::Date, infer_type(["2021-01-01", "2021-12-31"]));
        assert_eq!(DataType::Utf8, infer_type(["a", "1"]));
    }

    #[test]
    fn dates_widen_to_datetime() {
        assert_eq!(
            DataType::Datetime(INFERRED_TIME_UNIT),
            infer_type(["2021-01-01", "2021-01-02 10:30:00"])
        );
    }

    #[test]
    fn all_empty_is_utf8() {
        assert_eq!(DataType::Utf8, infer_type(["", ""]));
        assert_eq!(DataType::Utf8, infer_type(std::iter::empty()));
    }

    #[test]
    fn parse_field_rejects_mismatch() {
        assert_eq!(Some(ScalarValue::Int64(4)), parse_field("4", &DataType::Int64));
        assert_eq!(None, parse_field("4.5", &DataType::Int64));
        assert_eq!(Some(ScalarValue::Utf8(" a ".to_string())), parse_field(" a ", &DataType::Utf8));
    }
}
