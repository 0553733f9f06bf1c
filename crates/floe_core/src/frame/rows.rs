use floe_error::{DbError, Result, catch_user_panic};
use indexmap::IndexMap;

use super::Table;
use super::construct::default_name;
use crate::arrays::datatype::{DataType, supertype};
use crate::arrays::scalar::ScalarValue;
use crate::column::Column;
use crate::column::arith::{ArithOp, arithmetic};
use crate::column::fill::{FillNullStrategy, null_where_false};

/// Null handling for reductions across columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullStrategy {
    /// Skip nulls. A row with only nulls is null.
    #[default]
    Ignore,
    /// Any null in a row makes the result null.
    Propagate,
}

impl Table {
    /// Values of one row. Negative indices count from the end.
    pub fn row(&self, idx: i64) -> Result<Vec<ScalarValue>> {
        let height = self.height() as i64;
        let resolved = if idx < 0 { idx + height } else { idx };
        if resolved < 0 || resolved >= height {
            return Err(DbError::shape("Row index out of range")
                .with_field("index", idx)
                .with_field("height", height));
        }
        self.columns.iter().map(|c| c.get(resolved as usize)).collect()
    }

    pub fn rows(&self) -> Vec<Vec<ScalarValue>> {
        let columns: Vec<Vec<ScalarValue>> = self.columns.iter().map(|c| c.to_scalars()).collect();
        (0..self.height())
            .map(|row| columns.iter().map(|c| c[row].clone()).collect())
            .collect()
    }

    pub fn to_records(&self) -> Vec<IndexMap<String, ScalarValue>> {
        let names = self.column_names();
        self.rows()
            .into_iter()
            .map(|row| names.iter().map(|n| n.to_string()).zip(row).collect())
            .collect()
    }

    /// Apply a function to every row. Output columns are named
    /// `column_0`, `column_1`, and so on.
    pub fn apply_rows(&self, f: impl Fn(&[ScalarValue]) -> Result<Vec<ScalarValue>>) -> Result<Table> {
        let outputs = catch_user_panic(|| self.rows().iter().map(|row| f(row)).collect::<Result<Vec<_>>>())
            .map_err(|e| DbError::with_source("Row function failed", Box::new(e)))?;

        let width = outputs.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = outputs.iter().position(|r| r.len() != width) {
            return Err(DbError::shape("Row function returned rows of different lengths")
                .with_field("row", bad)
                .with_field("expected", width));
        }
        let mut columns: Vec<Vec<ScalarValue>> = (0..width).map(|_| Vec::with_capacity(outputs.len())).collect();
        for row in outputs {
            for (col, value) in columns.iter_mut().zip(row) {
                col.push(value);
            }
        }
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(idx, values)| Column::from_values(default_name(idx), values))
            .collect::<Result<Vec<_>>>()?;
        Table::try_new(columns)
    }

    /// Fold the columns left to right, starting with the first.
    pub fn fold(&self, f: impl Fn(Column, &Column) -> Result<Column>) -> Result<Column> {
        let (first, rest) = self
            .columns
            .split_first()
            .ok_or_else(|| DbError::invalid_argument("Cannot fold a table without columns"))?;
        catch_user_panic(|| rest.iter().try_fold(first.clone(), |acc, col| f(acc, col)))
            .map_err(|e| DbError::with_source("Fold function failed", Box::new(e)))
    }

    pub fn sum_horizontal(&self, strategy: NullStrategy) -> Result<Column> {
        let first = self.first_column()?;
        let zero = FillNullStrategy::Zero;
        let prepare = |c: &Column| match strategy {
            NullStrategy::Ignore => c.fill_null(&zero),
            NullStrategy::Propagate => Ok(c.clone()),
        };
        let mut acc = prepare(first)?;
        for col in &self.columns[1..] {
            acc = arithmetic(&acc, &prepare(col)?, ArithOp::Add)?;
        }
        let acc = match strategy {
            NullStrategy::Ignore => null_where_false(&acc, &self.any_valid())?,
            NullStrategy::Propagate => acc,
        };
        Ok(acc.with_name(first.name()))
    }

    pub fn mean_horizontal(&self, strategy: NullStrategy) -> Result<Column> {
        let sum = self.sum_horizontal(strategy)?.cast(&DataType::Float64)?;
        let counts: Vec<f64> = match strategy {
            NullStrategy::Ignore => self.valid_counts().into_iter().map(|c| c as f64).collect(),
            NullStrategy::Propagate => vec![self.width() as f64; self.height()],
        };
        let name = sum.name().to_string();
        let out = arithmetic(&sum, &Column::from_slice(name.clone(), &counts), ArithOp::Div)?;
        Ok(out.with_name(name))
    }

    pub fn min_horizontal(&self, strategy: NullStrategy) -> Result<Column> {
        self.extreme_horizontal(strategy, false)
    }

    pub fn max_horizontal(&self, strategy: NullStrategy) -> Result<Column> {
        self.extreme_horizontal(strategy, true)
    }

    fn extreme_horizontal(&self, strategy: NullStrategy, max: bool) -> Result<Column> {
        let first = self.first_column()?;
        let mut datatype = first.datatype().clone();
        for col in &self.columns[1..] {
            datatype = supertype(&datatype, col.datatype()).ok_or_else(|| {
                DbError::schema("Columns have no common datatype")
                    .with_field("left", &datatype)
                    .with_field("right", col.datatype())
            })?;
        }
        let columns = self
            .columns
            .iter()
            .map(|c| Ok(c.cast(&datatype)?.to_scalars()))
            .collect::<Result<Vec<_>>>()?;

        let values: Vec<ScalarValue> = (0..self.height())
            .map(|row| {
                let mut best: Option<&ScalarValue> = None;
                for col in &columns {
                    let value = &col[row];
                    if value.is_null() {
                        if strategy == NullStrategy::Propagate {
                            return ScalarValue::Null;
                        }
                        continue;
                    }
                    best = match best {
                        Some(b) => {
                            let ord = value.total_cmp(b);
                            if (max && ord.is_gt()) || (!max && ord.is_lt()) { Some(value) } else { Some(b) }
                        }
                        None => Some(value),
                    };
                }
                best.cloned().unwrap_or(ScalarValue::Null)
            })
            .collect();
        Column::from_scalars(first.name(), &datatype, &values)
    }

    fn first_column(&self) -> Result<&Column> {
        self.columns
            .first()
            .ok_or_else(|| DbError::invalid_argument("Horizontal reduction needs at least one column"))
    }

    fn valid_counts(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.height()];
        for col in &self.columns {
            for (count, valid) in counts.iter_mut().zip(col.validity_iter()) {
                *count += valid as u32;
            }
        }
        counts
    }

    fn any_valid(&self) -> Vec<bool> {
        self.valid_counts().into_iter().map(|c| c > 0).collect()
    }
}

#[cfg(test)]
mod tests {
    use floe_error::ErrorKind;

    use super::*;

    fn table() -> Table {
        Table::try_new(vec![
            Column::from_opt("a", vec![Some(1i64), None, None]),
            Column::from_opt("b", vec![Some(4i64), Some(2), None]),
        ])
        .unwrap()
    }

    #[test]
    fn rows_and_records() {
        let t = table();
        assert_eq!(vec![ScalarValue::Null, ScalarValue::Null], t.row(-1).unwrap());
        assert_eq!(ErrorKind::Shape, t.row(3).unwrap_err().kind());
        assert_eq!(3, t.rows().len());
        let records = t.to_records();
        assert_eq!(Some(&ScalarValue::Int64(4)), records[0].get("b"));
    }

    #[test]
    fn horizontal_reductions() {
        let t = table();
        let sum = t.sum_horizontal(NullStrategy::Ignore).unwrap();
        assert_eq!(vec![Some(5), Some(2), None], sum.native_values::<i64>().unwrap());
        let sum = t.sum_horizontal(NullStrategy::Propagate).unwrap();
        assert_eq!(vec![Some(5), None, None], sum.native_values::<i64>().unwrap());

        let mean = t.mean_horizontal(NullStrategy::Ignore).unwrap();
        assert_eq!(vec![Some(2.5), Some(2.0), None], mean.native_values::<f64>().unwrap());

        let max = t.max_horizontal(NullStrategy::Ignore).unwrap();
        assert_eq!(vec![Some(4), Some(2), None], max.native_values::<i64>().unwrap());
        let min = t.min_horizontal(NullStrategy::Ignore).unwrap();
        assert_eq!(vec![Some(1), Some(2), None], min.native_values::<i64>().unwrap());
    }

    #[test]
    fn apply_rows_and_fold() {
        let t = Table::try_new(vec![
            Column::from_slice("a", &[1i64, 2]),
            Column::from_slice("b", &[10i64, 20]),
        ])
        .unwrap();
        let out = t
            .apply_rows(|row| {
                let sum = row.iter().filter_map(|v| v.try_as_i64()).sum::<i64>();
                Ok(vec![ScalarValue::Int64(sum), ScalarValue::from("x")])
            })
            .unwrap();
        assert_eq!(vec!["column_0", "column_1"], out.column_names());
        assert_eq!(vec![Some(11), Some(22)], out.column("column_0").unwrap().native_values::<i64>().unwrap());

        let folded = t.fold(|acc, c| arithmetic(&acc, c, ArithOp::Mul)).unwrap();
        assert_eq!(vec![Some(10), Some(40)], folded.native_values::<i64>().unwrap());

        let err = t.fold(|_, _| panic!("boom")).unwrap_err();
        assert_eq!(ErrorKind::Compute, err.kind());
    }
}
