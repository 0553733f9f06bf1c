use floe_error::{DbError, Result};
use tracing::trace;

use super::Table;
use super::construct::default_name;
use crate::arrays::array::Array;
use crate::arrays::datatype::{DataType, supertype};
use crate::column::Column;
use crate::groupby::PivotAgg;
use crate::groupby::compute_groups;
use crate::groupby::pivot::value_label;
use crate::runtime::ExecutionContext;

pub const DEFAULT_VARIABLE_NAME: &str = "variable";
pub const DEFAULT_VALUE_NAME: &str = "value";
pub const DEFAULT_HEADER_NAME: &str = "column";

/// Arguments for unpivoting a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeltArgs {
    pub id_vars: Vec<String>,
    /// Columns to unpivot. Empty means every column not in `id_vars`.
    pub value_vars: Vec<String>,
    pub variable_name: String,
    pub value_name: String,
}

impl MeltArgs {
    pub fn new<S: AsRef<str>>(id_vars: &[S], value_vars: &[S]) -> Self {
        MeltArgs {
            id_vars: id_vars.iter().map(|s| s.as_ref().to_string()).collect(),
            value_vars: value_vars.iter().map(|s| s.as_ref().to_string()).collect(),
            variable_name: DEFAULT_VARIABLE_NAME.to_string(),
            value_name: DEFAULT_VALUE_NAME.to_string(),
        }
    }

    pub fn with_names(mut self, variable_name: impl Into<String>, value_name: impl Into<String>) -> Self {
        self.variable_name = variable_name.into();
        self.value_name = value_name.into();
        self
    }
}

/// Common type of the melted values. Strings win over everything else.
pub(crate) fn melt_value_type<'a>(datatypes: impl IntoIterator<Item = &'a DataType>) -> Result<DataType> {
    let mut current: Option<DataType> = None;
    for datatype in datatypes {
        current = Some(match current {
            None => datatype.clone(),
            Some(existing) => match supertype(&existing, datatype) {
                Some(sup) => sup,
                None if existing == DataType::Utf8 || *datatype == DataType::Utf8 => DataType::Utf8,
                None => {
                    return Err(DbError::schema("Melted columns have incompatible datatypes")
                        .with_field("left", existing)
                        .with_field("right", datatype));
                }
            },
        });
    }
    Ok(current.unwrap_or(DataType::Null))
}

impl Table {
    pub fn melt<S: AsRef<str>>(&self, id_vars: &[S], value_vars: &[S]) -> Result<Table> {
        self.melt_with(&MeltArgs::new(id_vars, value_vars))
    }

    /// Unpivot `value_vars` into a variable column and a value column,
    /// repeating the id columns for every unpivoted column.
    pub fn melt_with(&self, args: &MeltArgs) -> Result<Table> {
        let ids = self.columns_by_name(&args.id_vars)?;
        let value_vars: Vec<String> = if args.value_vars.is_empty() {
            self.column_names()
                .into_iter()
                .filter(|n| !args.id_vars.iter().any(|id| id == n))
                .map(str::to_string)
                .collect()
        } else {
            args.value_vars.clone()
        };
        let values = self.columns_by_name(&value_vars)?;
        let datatype = melt_value_type(values.iter().map(|c| c.datatype()))?;
        trace!(ids = ids.len(), values = values.len(), %datatype, "melt");

        let height = self.height();
        let repeated: Vec<usize> = (0..values.len()).flat_map(|_| 0..height).collect();
        let mut columns = ids
            .iter()
            .map(|c| c.take(&repeated))
            .collect::<Result<Vec<_>>>()?;

        let names: Vec<String> = value_vars
            .iter()
            .flat_map(|n| std::iter::repeat_n(n.clone(), height))
            .collect();
        columns.push(Column::new(args.variable_name.clone(), Array::from_strings(names)));

        let mut value_col = Column::full_null(args.value_name.clone(), &datatype, 0);
        for col in &values {
            value_col.append(&col.cast(&datatype)?)?;
        }
        columns.push(value_col.rechunk()?.with_name(args.value_name.clone()));
        Table::try_new(columns)
    }

    /// Explode list columns together. Rows whose lists have different
    /// lengths are a shape error. Empty and null lists produce one null row.
    pub fn explode<S: AsRef<str>>(&self, columns: &[S]) -> Result<Table> {
        if columns.is_empty() {
            return Err(DbError::invalid_argument("Explode requires at least one column"));
        }
        let mut exploded: Vec<(usize, Column)> = Vec::with_capacity(columns.len());
        let mut rows: Option<Vec<usize>> = None;
        for name in columns {
            let idx = self.try_index_of(name.as_ref())?;
            let (col, col_rows) = self.columns[idx].explode()?;
            match &rows {
                Some(existing) if *existing != col_rows => {
                    return Err(DbError::shape("Exploded columns have different list lengths")
                        .with_field("column", name.as_ref().to_string()));
                }
                Some(_) => {}
                None => rows = Some(col_rows),
            }
            exploded.push((idx, col));
        }
        let rows = rows.unwrap_or_default();

        let mut out = self
            .columns
            .iter()
            .map(|c| c.take(&rows))
            .collect::<Result<Vec<_>>>()?;
        for (idx, col) in exploded {
            out[idx] = col;
        }
        Table::try_new(out)
    }

    /// Spread `columns` values into new columns, one row per distinct
    /// `index` value.
    pub fn pivot<S: AsRef<str>>(
        &self,
        values: &[S],
        index: &[S],
        columns: &str,
        agg: PivotAgg,
        sort_columns: bool,
    ) -> Result<Table> {
        let first = values
            .first()
            .ok_or_else(|| DbError::invalid_argument("Pivot requires at least one values column"))?;
        let groupby = self.groupby(index)?;
        groupby
            .pivot(columns, first.as_ref())
            .with_values_columns(values.iter().map(|s| s.as_ref().to_string()).collect())
            .sort_columns(sort_columns)
            .aggregate(agg)
    }

    /// Swap rows and columns. Values are cast to a common type.
    pub fn transpose(&self, include_header: Option<&str>, column_names: Option<&[String]>) -> Result<Table> {
        let height = self.height();
        if let Some(names) = column_names {
            if names.len() != height {
                return Err(DbError::shape("Number of column names doesn't match table height")
                    .with_field("names", names.len())
                    .with_field("height", height));
            }
        }

        let mut datatype = DataType::Null;
        for col in &self.columns {
            datatype = supertype(&datatype, col.datatype()).unwrap_or(DataType::Utf8);
        }
        let cast = self
            .columns
            .iter()
            .map(|c| c.cast(&datatype))
            .collect::<Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(height + 1);
        if let Some(header) = include_header {
            let names = self.columns.iter().map(|c| c.name().to_string()).collect();
            out.push(Column::new(header, Array::from_strings(names)));
        }
        for row in 0..height {
            let values = cast.iter().map(|c| c.get(row)).collect::<Result<Vec<_>>>()?;
            let name = match column_names {
                Some(names) => names[row].clone(),
                None => default_name(row),
            };
            out.push(Column::from_scalars(name, &datatype, &values)?);
        }
        Table::try_new(out)
    }

    /// UInt8 indicator columns named `{column}_{value}` for every distinct
    /// value, in order of first occurrence.
    pub fn to_dummies(&self) -> Result<Table> {
        let mut out = Vec::new();
        for col in &self.columns {
            let values = col.to_scalars();
            for unique in col.unique()?.iter() {
                let indicator: Vec<u8> = values.iter().map(|v| (*v == unique) as u8).collect();
                out.push(Column::from_slice(format!("{}_{}", col.name(), value_label(&unique)), &indicator));
            }
        }
        Table::try_new(out)
    }

    /// Split into one table per distinct key.
    pub fn partition_by<S: AsRef<str>>(&self, keys: &[S], maintain_order: bool) -> Result<Vec<Table>> {
        let key_columns = self.columns_by_name(keys)?;
        let groups = compute_groups(&key_columns, maintain_order, ExecutionContext::global()?)?;
        groups
            .iter()
            .map(|rows| self.take(&rows.collect::<Vec<_>>()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use floe_error::ErrorKind;

    use super::*;
    use crate::arrays::scalar::ScalarValue;

    fn table() -> Table {
        Table::try_new(vec![
            Column::from_strs("id", &["a", "b"]),
            Column::from_slice("x", &[1i64, 2]),
            Column::from_slice("y", &[1.5f64, 2.5]),
        ])
        .unwrap()
    }

    #[test]
    fn melt_stacks_values() {
        let out = table().melt(&["id"], &[]).unwrap();
        assert_eq!(vec!["id", "variable", "value"], out.column_names());
        assert_eq!(DataType::Float64, *out.column("value").unwrap().datatype());
        assert_eq!(
            vec![ScalarValue::from("x"), ScalarValue::from("x"), ScalarValue::from("y"), ScalarValue::from("y")],
            out.column("variable").unwrap().to_scalars()
        );
        assert_eq!(
            vec![ScalarValue::from("a"), ScalarValue::from("b"), ScalarValue::from("a"), ScalarValue::from("b")],
            out.column("id").unwrap().to_scalars()
        );
    }

    #[test]
    fn melt_with_strings_is_utf8() {
        let out = table().melt_with(&MeltArgs::new(&[] as &[&str], &["id", "x"]).with_names("k", "v")).unwrap();
        assert_eq!(vec!["k", "v"], out.column_names());
        assert_eq!(DataType::Utf8, *out.column("v").unwrap().datatype());
    }

    #[test]
    fn explode_together() {
        let lists = |name: &str, parts: Vec<Option<Vec<i64>>>| {
            Column::from_list_parts(
                name,
                Some(&DataType::Int64),
                parts.into_iter().map(|p| p.map(|v| Column::from_slice("", &v))).collect(),
            )
            .unwrap()
        };
        let t = Table::try_new(vec![
            Column::from_strs("k", &["a", "b", "c"]),
            lists("l", vec![Some(vec![1, 2]), Some(vec![]), None]),
            lists("m", vec![Some(vec![3, 4]), Some(vec![]), None]),
        ])
        .unwrap();
        let out = t.explode(&["l", "m"]).unwrap();
        assert_eq!((4, 3), out.shape());
        assert_eq!(vec![Some(1), Some(2), None, None], out.column("l").unwrap().native_values::<i64>().unwrap());

        let bad = Table::try_new(vec![
            lists("l", vec![Some(vec![1, 2])]),
            lists("m", vec![Some(vec![1])]),
        ])
        .unwrap();
        assert_eq!(ErrorKind::Shape, bad.explode(&["l", "m"]).unwrap_err().kind());
    }

    #[test]
    fn pivot_from_table() {
        let t = Table::try_new(vec![
            Column::from_strs("k", &["x", "x", "y"]),
            Column::from_strs("p", &["a", "b", "a"]),
            Column::from_slice("v", &[1i64, 2, 3]),
        ])
        .unwrap();
        let out = t.pivot(&["v"], &["k"], "p", PivotAgg::Sum, false).unwrap();
        assert_eq!(vec!["k", "a", "b"], out.column_names());
    }

    #[test]
    fn transpose_with_header() {
        let t = Table::try_new(vec![
            Column::from_slice("a", &[1i64, 2]),
            Column::from_slice("b", &[3i32, 4]),
        ])
        .unwrap();
        let out = t.transpose(Some(DEFAULT_HEADER_NAME), None).unwrap();
        assert_eq!(vec!["column", "column_0", "column_1"], out.column_names());
        assert_eq!(vec![Some(1), Some(3)], out.column("column_0").unwrap().native_values::<i64>().unwrap());

        let names = vec!["r".to_string()];
        assert_eq!(ErrorKind::Shape, t.transpose(None, Some(&names)).unwrap_err().kind());
    }

    #[test]
    fn dummies_and_partitions() {
        let t = Table::try_new(vec![Column::from_strs("c", &["u", "v", "u"])]).unwrap();
        let out = t.to_dummies().unwrap();
        assert_eq!(vec!["c_u", "c_v"], out.column_names());
        assert_eq!(vec![Some(1), Some(0), Some(1)], out.column("c_u").unwrap().native_values::<u8>().unwrap());

        let parts = t.partition_by(&["c"], true).unwrap();
        assert_eq!(vec![2, 1], parts.iter().map(|p| p.height()).collect::<Vec<_>>());
    }
}
