use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use floe_error::{DbError, Result};
use hashbrown::HashSet;

use super::Column;
use super::arith::broadcast_len;
use crate::arrays::array::{Array, ArrayData};
use crate::arrays::categorical::CategoricalDictionary;
use crate::arrays::datatype::{DataType, supertype};
use crate::arrays::native::NativeType;
use crate::arrays::scalar::ScalarValue;
use crate::dispatch_native_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CmpOp {
    fn matches(&self, ord: Option<Ordering>) -> bool {
        match (self, ord) {
            (Self::NotEq, None) => true,
            (_, None) => false,
            (Self::Eq, Some(o)) => o == Ordering::Equal,
            (Self::NotEq, Some(o)) => o != Ordering::Equal,
            (Self::Lt, Some(o)) => o == Ordering::Less,
            (Self::LtEq, Some(o)) => o != Ordering::Greater,
            (Self::Gt, Some(o)) => o == Ordering::Greater,
            (Self::GtEq, Some(o)) => o != Ordering::Less,
        }
    }

    /// The operator with operands swapped.
    pub fn flip(&self) -> CmpOp {
        match self {
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
            other => *other,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        };
        write!(f, "{s}")
    }
}

pub(crate) fn categorical_dictionary(col: &Column) -> Option<&Arc<CategoricalDictionary>> {
    col.chunks().iter().find_map(|c| match c.data() {
        ArrayData::Categorical(cat) => Some(&cat.dictionary),
        _ => None,
    })
}

/// Categoricals can only be compared if they share a dictionary.
pub(crate) fn check_categoricals(left: &Column, right: &Column) -> Result<()> {
    if let (Some(l), Some(r)) = (categorical_dictionary(left), categorical_dictionary(right)) {
        if !l.is_compatible(r) {
            return Err(DbError::new(
                "Cannot compare categoricals built from different dictionaries, enable the string cache",
            )
            .with_field("left", left.name())
            .with_field("right", right.name()));
        }
    }
    Ok(())
}

fn compare_native<T: NativeType>(left: &Column, right: &Column, op: CmpOp, len: usize) -> Result<Array> {
    let l = left.native_values::<T>()?;
    let r = right.native_values::<T>()?;
    let values = (0..len)
        .map(|idx| {
            let a = l[if l.len() == 1 { 0 } else { idx }];
            let b = r[if r.len() == 1 { 0 } else { idx }];
            match (a, b) {
                (Some(a), Some(b)) => Some(op.matches(a.partial_cmp(&b))),
                _ => None,
            }
        })
        .collect();
    Ok(Array::from_bools_opt(values))
}

fn compare_scalars(left: &Column, right: &Column, op: CmpOp, len: usize) -> Result<Array> {
    let orderable = left.datatype().is_orderable() && right.datatype().is_orderable();
    if !orderable && !matches!(op, CmpOp::Eq | CmpOp::NotEq) {
        return Err(DbError::new("Datatype doesn't support ordering comparisons")
            .with_field("op", op)
            .with_field("datatype", left.datatype()));
    }
    let l = left.to_scalars();
    let r = right.to_scalars();
    let values = (0..len)
        .map(|idx| {
            let a = &l[if l.len() == 1 { 0 } else { idx }];
            let b = &r[if r.len() == 1 { 0 } else { idx }];
            if a.is_null() || b.is_null() {
                return None;
            }
            let ord = if orderable {
                Some(a.total_cmp(b))
            } else if a == b {
                Some(Ordering::Equal)
            } else {
                Some(Ordering::Less)
            };
            Some(op.matches(ord))
        })
        .collect();
    Ok(Array::from_bools_opt(values))
}

/// Compare two columns element-wise producing a boolean column. Length one
/// inputs broadcast and nulls propagate.
pub fn compare(left: &Column, right: &Column, op: CmpOp) -> Result<Column> {
    let len = broadcast_len(left, right)?;
    let (lt, rt) = (left.datatype(), right.datatype());

    if *lt == DataType::Null || *rt == DataType::Null {
        return Ok(Column::full_null(left.name(), &DataType::Boolean, len));
    }
    check_categoricals(left, right)?;

    let common = match (lt, rt) {
        (DataType::Categorical, DataType::Categorical) => DataType::Categorical,
        (l, r) if l.is_numeric() != r.is_numeric() && (l.is_numeric() || r.is_numeric()) && *l != DataType::Boolean && *r != DataType::Boolean => {
            return Err(DbError::new("Cannot compare columns with incompatible datatypes")
                .with_field("left", lt)
                .with_field("right", rt));
        }
        (l, r) => supertype(l, r).ok_or_else(|| {
            DbError::new("Cannot compare columns with incompatible datatypes")
                .with_field("left", l)
                .with_field("right", r)
        })?,
    };

    let array = if common.is_numeric() || common.is_temporal() {
        let l = left.cast(&common)?;
        let r = right.cast(&common)?;
        dispatch_native_type!(&common, T => {
            compare_native::<T>(&l, &r, op, len)?
        }, _ => compare_scalars(&l, &r, op, len)?)
    } else if common == DataType::Categorical {
        compare_scalars(left, right, op, len)?
    } else {
        compare_scalars(&left.cast(&common)?, &right.cast(&common)?, op, len)?
    };
    Ok(Column::new(left.name(), array))
}

fn kleene(left: &Column, right: &Column, and: bool) -> Result<Column> {
    let len = broadcast_len(left, right)?;
    let l = left.bool_values()?;
    let r = right.bool_values()?;
    let values = (0..len)
        .map(|idx| {
            let a = l[if l.len() == 1 { 0 } else { idx }];
            let b = r[if r.len() == 1 { 0 } else { idx }];
            if and {
                match (a, b) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }
            } else {
                match (a, b) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }
            }
        })
        .collect();
    Ok(Column::new(left.name(), Array::from_bools_opt(values)))
}

impl Column {
    pub fn equal(&self, other: &Column) -> Result<Column> {
        compare(self, other, CmpOp::Eq)
    }

    pub fn not_equal(&self, other: &Column) -> Result<Column> {
        compare(self, other, CmpOp::NotEq)
    }

    pub fn lt(&self, other: &Column) -> Result<Column> {
        compare(self, other, CmpOp::Lt)
    }

    pub fn lt_eq(&self, other: &Column) -> Result<Column> {
        compare(self, other, CmpOp::LtEq)
    }

    pub fn gt(&self, other: &Column) -> Result<Column> {
        compare(self, other, CmpOp::Gt)
    }

    pub fn gt_eq(&self, other: &Column) -> Result<Column> {
        compare(self, other, CmpOp::GtEq)
    }

    /// Three-valued logical and.
    pub fn and(&self, other: &Column) -> Result<Column> {
        kleene(self, other, true)
    }

    /// Three-valued logical or.
    pub fn or(&self, other: &Column) -> Result<Column> {
        kleene(self, other, false)
    }

    pub fn not(&self) -> Result<Column> {
        let values = self.bool_values()?.into_iter().map(|v| v.map(|v| !v)).collect();
        Ok(Column::new(self.name(), Array::from_bools_opt(values)))
    }

    /// Check membership of each value in `other`. Null values produce null.
    pub fn is_in(&self, other: &Column) -> Result<Column> {
        let common = supertype(self.datatype(), other.datatype()).ok_or_else(|| {
            DbError::schema("Cannot check membership with incompatible datatypes")
                .with_field("left", self.datatype())
                .with_field("right", other.datatype())
        })?;
        let left = self.cast(&common)?;
        let other = other.cast(&common)?;
        let normalize = |v: ScalarValue| match v {
            ScalarValue::Categorical(s) => ScalarValue::Utf8(s),
            other => other,
        };
        let set: HashSet<ScalarValue> = other
            .iter()
            .filter(|v| !v.is_null())
            .map(normalize)
            .collect();
        let values = left
            .iter()
            .map(|v| (!v.is_null()).then(|| set.contains(&normalize(v))))
            .collect();
        Ok(Column::new(self.name(), Array::from_bools_opt(values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::categorical::StringCache;

    #[test]
    fn compare_mixed_numeric() {
        let a = Column::from_slice("a", &[1i32, 2, 3]);
        let b = Column::from_slice("b", &[2.0f64]);
        assert_eq!(
            vec![false, false, true],
            a.gt(&b).unwrap().bool_mask().unwrap()
        );
        assert_eq!(
            vec![true, true, false],
            a.lt_eq(&b).unwrap().bool_mask().unwrap()
        );
    }

    #[test]
    fn null_propagates() {
        let a = Column::from_opt("a", vec![Some(1i64), None]);
        let b = Column::from_slice("b", &[1i64, 1]);
        assert_eq!(
            vec![Some(true), None],
            a.equal(&b).unwrap().bool_values().unwrap()
        );
    }

    #[test]
    fn string_compare() {
        let a = Column::from_strs("a", &["a", "b"]);
        let b = Column::from_strs("b", &["b"]);
        assert_eq!(vec![true, false], a.lt(&b).unwrap().bool_mask().unwrap());
    }

    #[test]
    fn string_vs_int_errors() {
        let a = Column::from_strs("a", &["a"]);
        let b = Column::from_slice("b", &[1i64]);
        assert!(a.equal(&b).is_err());
    }

    #[test]
    fn categoricals_under_string_cache() {
        let _guard = StringCache::enter();
        let a = Column::from_strs("a", &["x", "y"]).cast(&DataType::Categorical).unwrap();
        let b = Column::from_strs("b", &["y", "y"]).cast(&DataType::Categorical).unwrap();
        assert_eq!(vec![false, true], a.equal(&b).unwrap().bool_mask().unwrap());
    }

    #[test]
    fn kleene_logic() {
        let a = Column::new("a", Array::from_bools_opt(vec![Some(false), None, Some(true)]));
        let b = Column::new("b", Array::from_bools_opt(vec![None, Some(true), None]));
        assert_eq!(
            vec![Some(false), None, None],
            a.and(&b).unwrap().bool_values().unwrap()
        );
        assert_eq!(
            vec![None, Some(true), Some(true)],
            a.or(&b).unwrap().bool_values().unwrap()
        );
    }

    #[test]
    fn membership() {
        let a = Column::from_opt("a", vec![Some(1i64), Some(5), None]);
        let set = Column::from_slice("s", &[1i32, 2]);
        assert_eq!(
            vec![Some(true), Some(false), None],
            a.is_in(&set).unwrap().bool_values().unwrap()
        );
    }
}
