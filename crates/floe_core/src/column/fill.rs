use floe_error::{DbError, Result};

use super::Column;
use super::aggregate::AggregateKind;
use super::cast::cast_scalar;
use crate::arrays::array::Array;
use crate::arrays::datatype::{DataType, supertype};
use crate::arrays::scalar::ScalarValue;

/// How nulls are replaced by `fill_null`.
#[derive(Debug, Clone, PartialEq)]
pub enum FillNullStrategy {
    /// Replace with a value. The column is widened if the value needs it.
    Value(ScalarValue),
    /// Carry the last valid value forward, optionally at most `n` times.
    Forward(Option<usize>),
    /// Carry the next valid value backward, optionally at most `n` times.
    Backward(Option<usize>),
    Min,
    Max,
    Mean,
    Zero,
    One,
}

impl Column {
    /// Shift values by `periods` rows. Positive periods shift down, vacated
    /// rows are null.
    pub fn shift(&self, periods: i64) -> Result<Column> {
        let len = self.len() as i64;
        let indices: Vec<Option<usize>> = (0..len)
            .map(|idx| {
                let src = idx - periods;
                (0..len).contains(&src).then_some(src as usize)
            })
            .collect();
        self.take_opt(&indices)
    }

    /// Shift values, filling vacated rows with `fill`.
    pub fn shift_and_fill(&self, periods: i64, fill: &ScalarValue) -> Result<Column> {
        let shifted = self.shift(periods)?;
        let len = self.len() as i64;
        let vacated: Vec<bool> = (0..len)
            .map(|idx| !(0..len).contains(&(idx - periods)))
            .collect();
        let fill = cast_scalar(fill, self.datatype(), true)?;
        let values: Vec<ScalarValue> = shifted
            .iter()
            .zip(vacated)
            .map(|(v, vacated)| if vacated { fill.clone() } else { v })
            .collect();
        Column::from_scalars(self.name(), self.datatype(), &values)
    }

    /// Replace nulls according to a strategy.
    pub fn fill_null(&self, strategy: &FillNullStrategy) -> Result<Column> {
        if self.null_count() == 0 {
            return Ok(self.clone());
        }

        let fill_value = |value: ScalarValue| -> Result<Column> {
            if value.is_null() {
                return Ok(self.clone());
            }
            let datatype = if self.datatype() == &DataType::Null {
                value.datatype()
            } else {
                supertype(self.datatype(), &value.datatype()).ok_or_else(|| {
                    DbError::schema("Fill value not compatible with column")
                        .with_field("column", self.name())
                        .with_field("datatype", self.datatype())
                        .with_field("value", value.to_string())
                })?
            };
            let col = self.cast(&datatype)?;
            let value = cast_scalar(&value, &datatype, true)?;
            let values: Vec<ScalarValue> = col
                .iter()
                .map(|v| if v.is_null() { value.clone() } else { v })
                .collect();
            Column::from_scalars(self.name(), &datatype, &values)
        };

        match strategy {
            FillNullStrategy::Value(v) => fill_value(v.clone()),
            FillNullStrategy::Zero => fill_value(cast_scalar(&ScalarValue::Int8(0), self.datatype(), false)?),
            FillNullStrategy::One => fill_value(cast_scalar(&ScalarValue::Int8(1), self.datatype(), false)?),
            FillNullStrategy::Min => fill_value(self.reduce(AggregateKind::Min)?),
            FillNullStrategy::Max => fill_value(self.reduce(AggregateKind::Max)?),
            FillNullStrategy::Mean => {
                let mean = self.reduce(AggregateKind::Mean)?;
                fill_value(cast_scalar(&mean, self.datatype(), false)?)
            }
            FillNullStrategy::Forward(limit) => self.fill_directional(*limit, false),
            FillNullStrategy::Backward(limit) => self.fill_directional(*limit, true),
        }
    }

    fn fill_directional(&self, limit: Option<usize>, backward: bool) -> Result<Column> {
        let len = self.len();
        let mut indices: Vec<Option<usize>> = vec![None; len];
        let mut last: Option<usize> = None;
        let mut run = 0;

        let order: Box<dyn Iterator<Item = usize>> = if backward {
            Box::new((0..len).rev())
        } else {
            Box::new(0..len)
        };
        for idx in order {
            if self.is_valid(idx) {
                last = Some(idx);
                run = 0;
                indices[idx] = Some(idx);
            } else {
                run += 1;
                if limit.is_none_or(|limit| run <= limit) {
                    indices[idx] = last;
                }
            }
        }
        self.take_opt(&indices)
    }

    /// Replace NaN values in float columns. Other columns are returned
    /// unchanged.
    pub fn fill_nan(&self, value: &ScalarValue) -> Result<Column> {
        if !self.datatype().is_float() {
            return Ok(self.clone());
        }
        let value = cast_scalar(value, self.datatype(), true)?;
        let values: Vec<ScalarValue> = self
            .iter()
            .map(|v| if v.is_nan() { value.clone() } else { v })
            .collect();
        Column::from_scalars(self.name(), self.datatype(), &values)
    }

    /// Remove null values.
    pub fn drop_nulls(&self) -> Result<Column> {
        if self.null_count() == 0 {
            return Ok(self.clone());
        }
        self.filter(&self.is_not_null())
    }

    /// Cumulative sum. Nulls stay null and don't reset the sum.
    pub fn cum_sum(&self, reverse: bool) -> Result<Column> {
        let datatype = AggregateKind::Sum.output_type(self.datatype())?;
        let col = self.cast(&datatype)?;
        let values = col.to_scalars();
        let mut out = vec![ScalarValue::Null; values.len()];

        let order: Box<dyn Iterator<Item = usize>> = if reverse {
            Box::new((0..values.len()).rev())
        } else {
            Box::new(0..values.len())
        };
        if datatype.is_float() {
            let mut acc = 0.0;
            for idx in order {
                if let Some(v) = values[idx].try_as_f64() {
                    acc += v;
                    out[idx] = cast_scalar(&ScalarValue::Float64(acc), &datatype, false)?;
                }
            }
        } else {
            let mut acc: i128 = 0;
            for idx in order {
                if let Some(v) = values[idx].try_as_i128() {
                    acc += v;
                    out[idx] = super::cast::int_scalar(&datatype, acc).unwrap_or(ScalarValue::Null);
                }
            }
        }
        Column::from_scalars(self.name(), &datatype, &out)
    }

    /// Difference with the value `n` rows earlier.
    pub fn diff(&self, n: i64) -> Result<Column> {
        let shifted = self.shift(n)?;
        Ok(self.sub(&shifted)?.with_name(self.name()))
    }

    /// Column of `len` copies of the first value. Used to broadcast length
    /// one results.
    pub fn broadcast(&self, len: usize) -> Result<Column> {
        if self.len() == len {
            return Ok(self.clone());
        }
        if self.len() != 1 {
            return Err(DbError::shape("Cannot broadcast column")
                .with_field("column", self.name())
                .with_field("len", self.len())
                .with_field("target", len));
        }
        let array = self.to_array()?.take(&vec![0; len]);
        Ok(Column::new(self.name(), array))
    }
}

/// Null a column where `mask` is false, keeping the column's type.
pub(crate) fn null_where_false(col: &Column, mask: &[bool]) -> Result<Column> {
    let array = col.to_array()?;
    let indices: Vec<Option<usize>> = mask
        .iter()
        .enumerate()
        .map(|(idx, keep)| keep.then_some(idx))
        .collect();
    let out: Array = array.take_opt(&indices);
    Ok(Column::new(col.name(), out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: Vec<Option<i64>>) -> Column {
        Column::from_opt("a", values)
    }

    #[test]
    fn shift_both_ways() {
        let col = Column::from_slice("a", &[1i64, 2, 3]);
        assert_eq!(
            vec![ScalarValue::Null, ScalarValue::Int64(1), ScalarValue::Int64(2)],
            col.shift(1).unwrap().to_scalars()
        );
        assert_eq!(
            vec![ScalarValue::Int64(3), ScalarValue::Int64(0), ScalarValue::Int64(0)],
            col.shift_and_fill(-2, &ScalarValue::Int64(0)).unwrap().to_scalars()
        );
    }

    #[test]
    fn forward_fill_with_limit() {
        let col = ints(vec![Some(1), None, None, Some(4), None]);
        let out = col.fill_null(&FillNullStrategy::Forward(Some(1))).unwrap();
        assert_eq!(
            vec![
                ScalarValue::Int64(1),
                ScalarValue::Int64(1),
                ScalarValue::Null,
                ScalarValue::Int64(4),
                ScalarValue::Int64(4)
            ],
            out.to_scalars()
        );
    }

    #[test]
    fn backward_fill() {
        let col = ints(vec![None, Some(2), None]);
        let out = col.fill_null(&FillNullStrategy::Backward(None)).unwrap();
        assert_eq!(
            vec![ScalarValue::Int64(2), ScalarValue::Int64(2), ScalarValue::Null],
            out.to_scalars()
        );
    }

    #[test]
    fn fill_with_float_widens() {
        let col = ints(vec![Some(1), None]);
        let out = col
            .fill_null(&FillNullStrategy::Value(ScalarValue::Float64(0.5)))
            .unwrap();
        assert_eq!(&DataType::Float64, out.datatype());
        assert_eq!(ScalarValue::Float64(0.5), out.get(1).unwrap());
    }

    #[test]
    fn fill_mean_keeps_type() {
        let col = ints(vec![Some(1), None, Some(4)]);
        let out = col.fill_null(&FillNullStrategy::Mean).unwrap();
        assert_eq!(ScalarValue::Int64(2), out.get(1).unwrap());
    }

    #[test]
    fn nan_fill() {
        let col = Column::from_slice("a", &[1.0f64, f64::NAN]);
        let out = col.fill_nan(&ScalarValue::Float64(0.0)).unwrap();
        assert_eq!(ScalarValue::Float64(0.0), out.get(1).unwrap());
    }

    #[test]
    fn cumulative_sum_and_diff() {
        let col = ints(vec![Some(1), None, Some(3)]);
        assert_eq!(
            vec![ScalarValue::Int64(1), ScalarValue::Null, ScalarValue::Int64(4)],
            col.cum_sum(false).unwrap().to_scalars()
        );
        let col = Column::from_slice("a", &[1i64, 4, 9]);
        assert_eq!(
            vec![ScalarValue::Null, ScalarValue::Int64(3), ScalarValue::Int64(5)],
            col.diff(1).unwrap().to_scalars()
        );
    }
}
