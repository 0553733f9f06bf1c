//! Assertions for comparing tables and columns in tests.

use crate::column::Column;
use crate::frame::Table;

/// Assert two columns hold the same name, datatype and values, treating
/// nulls as equal.
#[track_caller]
pub fn assert_columns_eq(expected: &Column, got: &Column) {
    assert_eq!(expected.name(), got.name(), "column names differ");
    assert_eq!(expected.datatype(), got.datatype(), "datatypes differ for column '{}'", expected.name());
    assert_eq!(expected.len(), got.len(), "lengths differ for column '{}'", expected.name());
    for (row, (a, b)) in expected.iter().zip(got.iter()).enumerate() {
        assert!(a == b, "column '{}' differs at row {row}: expected {a}, got {b}", expected.name());
    }
}

/// Assert two tables have the same schema and values, treating nulls as
/// equal. Chunking is ignored.
#[track_caller]
pub fn assert_tables_eq(expected: &Table, got: &Table) {
    assert_eq!(expected.schema(), got.schema(), "schemas differ");
    for (a, b) in expected.columns().iter().zip(got.columns()) {
        assert_columns_eq(a, b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_compare_equal() {
        let a = Column::from_opt("a", vec![Some(1i64), None]);
        let b = Column::from_opt("a", vec![Some(1i64), None]).slice(0, 2);
        assert_columns_eq(&a, &b);
        assert_tables_eq(&Table::try_new(vec![a]).unwrap(), &Table::try_new(vec![b]).unwrap());
    }

    #[test]
    #[should_panic]
    fn different_values_panic() {
        assert_columns_eq(&Column::from_slice("a", &[1i64]), &Column::from_slice("a", &[2i64]));
    }
}
