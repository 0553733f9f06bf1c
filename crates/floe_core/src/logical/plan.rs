use std::fmt;
use std::sync::Arc;

use floe_error::{DbError, Result};

use crate::arrays::datatype::{DataType, Field, supertype};
use crate::arrays::schema::{Schema, column_not_found};
use crate::expr::{Expr, expand_exprs};
use crate::frame::Table;
use crate::frame::ops::UniqueKeep;
use crate::frame::reshape::{MeltArgs, melt_value_type};
use crate::join::{JoinArgs, JoinType};
use crate::source::TableSource;

/// Where a scan gets its rows from.
#[derive(Debug, Clone)]
pub enum ScanSource {
    Table(Table),
    Source(Arc<dyn TableSource>),
}

impl ScanSource {
    pub fn name(&self) -> &str {
        match self {
            Self::Table(_) => "table",
            Self::Source(source) => source.name(),
        }
    }

    pub fn schema(&self) -> Result<Schema> {
        match self {
            Self::Table(table) => Ok(table.schema()),
            Self::Source(source) => source.schema(),
        }
    }

    pub fn read(&self, projection: Option<&[String]>) -> Result<Table> {
        match self {
            Self::Table(table) => match projection {
                Some(columns) => table.select(columns),
                None => Ok(table.clone()),
            },
            Self::Source(source) => source.read(projection),
        }
    }
}

/// A node in a lazy query.
#[derive(Debug, Clone)]
pub enum LogicalPlan {
    Scan {
        source: ScanSource,
        projection: Option<Vec<String>>,
        predicate: Option<Expr>,
    },
    Select {
        input: Box<LogicalPlan>,
        exprs: Vec<Expr>,
    },
    WithColumns {
        input: Box<LogicalPlan>,
        exprs: Vec<Expr>,
    },
    Filter {
        input: Box<LogicalPlan>,
        predicate: Expr,
    },
    GroupByAgg {
        input: Box<LogicalPlan>,
        keys: Vec<Expr>,
        aggs: Vec<Expr>,
        maintain_order: bool,
    },
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        args: JoinArgs,
    },
    Sort {
        input: Box<LogicalPlan>,
        by: Vec<String>,
        descending: Vec<bool>,
        nulls_last: bool,
    },
    Distinct {
        input: Box<LogicalPlan>,
        subset: Option<Vec<String>>,
        keep: UniqueKeep,
        maintain_order: bool,
    },
    Melt {
        input: Box<LogicalPlan>,
        args: MeltArgs,
    },
    Explode {
        input: Box<LogicalPlan>,
        columns: Vec<String>,
    },
    Slice {
        input: Box<LogicalPlan>,
        offset: i64,
        len: usize,
    },
    Rename {
        input: Box<LogicalPlan>,
        mapping: Vec<(String, String)>,
    },
    Drop {
        input: Box<LogicalPlan>,
        columns: Vec<String>,
    },
    WithRowCount {
        input: Box<LogicalPlan>,
        name: String,
    },
}

impl LogicalPlan {
    pub fn scan_table(table: Table) -> Self {
        LogicalPlan::Scan {
            source: ScanSource::Table(table),
            projection: None,
            predicate: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Scan { .. } => "Scan",
            Self::Select { .. } => "Select",
            Self::WithColumns { .. } => "WithColumns",
            Self::Filter { .. } => "Filter",
            Self::GroupByAgg { .. } => "GroupByAgg",
            Self::Join { .. } => "Join",
            Self::Sort { .. } => "Sort",
            Self::Distinct { .. } => "Distinct",
            Self::Melt { .. } => "Melt",
            Self::Explode { .. } => "Explode",
            Self::Slice { .. } => "Slice",
            Self::Rename { .. } => "Rename",
            Self::Drop { .. } => "Drop",
            Self::WithRowCount { .. } => "WithRowCount",
        }
    }

    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            Self::Scan { .. } => Vec::new(),
            Self::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Self::Select { input, .. }
            | Self::WithColumns { input, .. }
            | Self::Filter { input, .. }
            | Self::GroupByAgg { input, .. }
            | Self::Sort { input, .. }
            | Self::Distinct { input, .. }
            | Self::Melt { input, .. }
            | Self::Explode { input, .. }
            | Self::Slice { input, .. }
            | Self::Rename { input, .. }
            | Self::Drop { input, .. }
            | Self::WithRowCount { input, .. } => vec![input.as_ref()],
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut LogicalPlan> {
        match self {
            Self::Scan { .. } => Vec::new(),
            Self::Join { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Self::Select { input, .. }
            | Self::WithColumns { input, .. }
            | Self::Filter { input, .. }
            | Self::GroupByAgg { input, .. }
            | Self::Sort { input, .. }
            | Self::Distinct { input, .. }
            | Self::Melt { input, .. }
            | Self::Explode { input, .. }
            | Self::Slice { input, .. }
            | Self::Rename { input, .. }
            | Self::Drop { input, .. }
            | Self::WithRowCount { input, .. } => vec![input.as_mut()],
        }
    }

    /// Output schema of this node, computed without reading any rows.
    pub fn schema(&self) -> Result<Schema> {
        match self {
            Self::Scan {
                source, projection, ..
            } => {
                let schema = source.schema()?;
                match projection {
                    Some(columns) => columns
                        .iter()
                        .map(|name| schema.try_get(name).cloned())
                        .collect::<Result<Schema>>(),
                    None => Ok(schema),
                }
            }
            Self::Select { input, exprs } => {
                let schema = input.schema()?;
                expand_exprs(exprs, &schema, &[])?
                    .iter()
                    .map(|e| e.to_field(&schema))
                    .collect()
            }
            Self::WithColumns { input, exprs } => {
                let mut schema = input.schema()?;
                let input_schema = schema.clone();
                for expr in expand_exprs(exprs, &input_schema, &[])? {
                    schema.upsert(expr.to_field(&input_schema)?);
                }
                Ok(schema)
            }
            Self::Filter { input, .. }
            | Self::Sort { input, .. }
            | Self::Distinct { input, .. }
            | Self::Slice { input, .. } => input.schema(),
            Self::GroupByAgg { input, keys, aggs, .. } => groupby_schema(&input.schema()?, keys, aggs),
            Self::Join { left, right, args } => join_schema(&left.schema()?, &right.schema()?, args),
            Self::Melt { input, args } => melt_schema(&input.schema()?, args),
            Self::Explode { input, columns } => {
                let mut schema = input.schema()?;
                for name in columns {
                    let idx = schema
                        .index_of(name)
                        .ok_or_else(|| column_not_found(name, schema.names()))?;
                    if let DataType::List(inner) = &schema.fields[idx].datatype {
                        let inner = inner.as_ref().clone();
                        schema.fields[idx].datatype = inner;
                    }
                }
                Ok(schema)
            }
            Self::Rename { input, mapping } => {
                let mut schema = input.schema()?;
                let mut renamed = schema.fields.clone();
                for (old, new) in mapping {
                    let idx = schema
                        .index_of(old)
                        .ok_or_else(|| column_not_found(old, schema.names()))?;
                    renamed[idx].name = new.clone();
                }
                for (idx, field) in renamed.iter().enumerate() {
                    if renamed[..idx].iter().any(|f| f.name == field.name) {
                        return Err(DbError::duplicate("Duplicate column name").with_field("name", field.name.clone()));
                    }
                }
                schema.fields = renamed;
                Ok(schema)
            }
            Self::Drop { input, columns } => {
                let schema = input.schema()?;
                for name in columns {
                    schema.try_get(name)?;
                }
                Ok(schema
                    .fields
                    .into_iter()
                    .filter(|f| !columns.contains(&f.name))
                    .collect())
            }
            Self::WithRowCount { input, name } => {
                let schema = input.schema()?;
                if schema.contains(name) {
                    return Err(DbError::duplicate("Duplicate column name").with_field("name", name.clone()));
                }
                let mut fields = vec![Field::new(name.clone(), DataType::UInt32)];
                fields.extend(schema.fields);
                Ok(Schema::new(fields))
            }
        }
    }
}

fn groupby_schema(input: &Schema, keys: &[Expr], aggs: &[Expr]) -> Result<Schema> {
    let mut fields = Vec::with_capacity(keys.len() + aggs.len());
    let mut key_names = Vec::with_capacity(keys.len());
    for key in keys {
        let field = key.to_field(input)?;
        key_names.push(field.name.clone());
        fields.push(field);
    }
    let mut with_keys = input.clone();
    for field in &fields {
        with_keys.upsert(field.clone());
    }
    for agg in expand_exprs(aggs, &with_keys, &key_names)? {
        let mut field = agg.to_field(&with_keys)?;
        if agg.reduces_groups() == Some(false) {
            field.datatype = DataType::list(field.datatype);
        }
        fields.push(field);
    }
    Ok(Schema::new(fields))
}

fn join_schema(left: &Schema, right: &Schema, args: &JoinArgs) -> Result<Schema> {
    args.validate()?;
    let mut fields = left.fields.clone();
    if args.how == JoinType::Outer {
        for (l, r) in args.left_on.iter().zip(&args.right_on) {
            let left_type = &left.try_get(l)?.datatype;
            let right_type = &right.try_get(r)?.datatype;
            let common = supertype(left_type, right_type).ok_or_else(|| {
                DbError::schema("Join keys have incompatible datatypes")
                    .with_field("left", left_type)
                    .with_field("right", right_type)
            })?;
            if let Some(idx) = left.index_of(l) {
                fields[idx].datatype = common;
            }
        }
    }

    let mut skip: Vec<&String> = match args.how {
        JoinType::Cross => Vec::new(),
        _ => args.right_on.iter().collect(),
    };
    if args.how == JoinType::Asof {
        skip.extend(args.asof.by_right.iter());
    }
    for field in &right.fields {
        if skip.contains(&&field.name) {
            continue;
        }
        let name = if left.contains(&field.name) {
            format!("{}{}", field.name, args.suffix)
        } else {
            field.name.clone()
        };
        fields.push(Field::new(name, field.datatype.clone()));
    }
    Ok(Schema::new(fields))
}

fn melt_schema(input: &Schema, args: &MeltArgs) -> Result<Schema> {
    let mut fields = args
        .id_vars
        .iter()
        .map(|name| input.try_get(name).cloned())
        .collect::<Result<Vec<_>>>()?;
    let value_fields = if args.value_vars.is_empty() {
        input
            .iter()
            .filter(|f| !args.id_vars.contains(&f.name))
            .collect::<Vec<_>>()
    } else {
        args.value_vars
            .iter()
            .map(|name| input.try_get(name))
            .collect::<Result<Vec<_>>>()?
    };
    let datatype = melt_value_type(value_fields.iter().map(|f| &f.datatype))?;
    fields.push(Field::new(args.variable_name.clone(), DataType::Utf8));
    fields.push(Field::new(args.value_name.clone(), datatype));
    Ok(Schema::new(fields))
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", super::explain::ExplainNode::walk(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::expr::{col, lit};
    use crate::join::DEFAULT_SUFFIX;

    fn scan() -> LogicalPlan {
        LogicalPlan::scan_table(
            Table::try_new(vec![
                Column::from_slice("a", &[1i64, 2]),
                Column::from_slice("b", &[1.5f64, 2.5]),
                Column::from_strs("c", &["x", "y"]),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn select_and_with_columns_schema() {
        let plan = LogicalPlan::Select {
            input: Box::new(scan()),
            exprs: vec![col("a") + lit(1i64), col("c").alias("d")],
        };
        let schema = plan.schema().unwrap();
        assert_eq!(vec!["a", "d"], schema.names().collect::<Vec<_>>());

        let plan = LogicalPlan::WithColumns {
            input: Box::new(scan()),
            exprs: vec![col("a").cast(DataType::Float64), lit(true).alias("e")],
        };
        let schema = plan.schema().unwrap();
        assert_eq!(DataType::Float64, schema.try_get("a").unwrap().datatype);
        assert_eq!(4, schema.len());
    }

    #[test]
    fn groupby_schema_wraps_non_reducing() {
        let plan = LogicalPlan::GroupByAgg {
            input: Box::new(scan()),
            keys: vec![col("c")],
            aggs: vec![col("a").sum(), col("b")],
            maintain_order: true,
        };
        let schema = plan.schema().unwrap();
        assert_eq!(vec!["c", "a", "b"], schema.names().collect::<Vec<_>>());
        assert_eq!(DataType::list(DataType::Float64), schema.try_get("b").unwrap().datatype);
    }

    #[test]
    fn join_schema_suffixes() {
        let plan = LogicalPlan::Join {
            left: Box::new(scan()),
            right: Box::new(scan()),
            args: JoinArgs::new(JoinType::Inner).on(&["a"]),
        };
        let schema = plan.schema().unwrap();
        let expected = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            format!("b{DEFAULT_SUFFIX}"),
            format!("c{DEFAULT_SUFFIX}"),
        ];
        assert_eq!(expected, schema.names().map(str::to_string).collect::<Vec<_>>());
    }

    #[test]
    fn melt_and_row_count_schema() {
        let plan = LogicalPlan::Melt {
            input: Box::new(scan()),
            args: MeltArgs::new(&["c"], &["a", "b"]),
        };
        let schema = plan.schema().unwrap();
        assert_eq!(DataType::Float64, schema.try_get("value").unwrap().datatype);

        let plan = LogicalPlan::WithRowCount {
            input: Box::new(scan()),
            name: "a".to_string(),
        };
        assert!(plan.schema().is_err());
    }
}
