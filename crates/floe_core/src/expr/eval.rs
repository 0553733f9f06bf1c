//! Evaluating expressions against tables, whole or per group.

use floe_error::{DbError, Result, catch_user_panic};
use tracing::trace;

use super::{ApplyFunction, BinaryOp, Expr, LITERAL_NAME, UnaryOp, adapt_literal, expand_exprs};
use crate::arrays::datatype::{DataType, supertype};
use crate::arrays::scalar::ScalarValue;
use crate::column::Column;
use crate::column::aggregate::Reducer;
use crate::column::arith::arithmetic;
use crate::column::cmp::compare;
use crate::frame::Table;
use crate::groupby::{GroupsProxy, compute_groups};
use crate::runtime::ExecutionContext;

/// Evaluate an expression over a whole table using the global context.
pub fn evaluate(expr: &Expr, table: &Table) -> Result<Column> {
    evaluate_with(expr, table, ExecutionContext::global()?)
}

pub fn evaluate_with(expr: &Expr, table: &Table, ctx: &ExecutionContext) -> Result<Column> {
    match expr {
        Expr::Column(name) => Ok(table.column(name)?.clone()),
        Expr::Literal(value) => literal_column(value),
        Expr::Count => Ok(Column::from_slice("count", &[table.height() as u32])),
        Expr::Wildcard | Expr::DtypeColumns(_) => Err(DbError::invalid_argument(
            "Multi-column selectors must be expanded before evaluation",
        )
        .with_field("expr", expr)),
        Expr::Unary { op, expr } => {
            let input = evaluate_with(expr, table, ctx)?;
            match op {
                UnaryOp::Not => input.not(),
                UnaryOp::Neg => input.neg(),
            }
        }
        Expr::Binary { op, left, right } => evaluate_binary(*op, left, right, table, ctx),
        Expr::Aggregate { kind, expr } => evaluate_with(expr, table, ctx)?.aggregate(*kind),
        Expr::Window { expr, partition_by } => evaluate_window(expr, partition_by, table, ctx),
        Expr::Conditional {
            when,
            then,
            otherwise,
        } => evaluate_conditional(when, then, otherwise, table, ctx),
        Expr::Apply {
            expr,
            function,
            return_type,
        } => run_apply(function, evaluate_with(expr, table, ctx)?, return_type.as_ref()),
        Expr::Alias { expr, name } => Ok(evaluate_with(expr, table, ctx)?.with_name(name.clone())),
        Expr::Cast {
            expr,
            datatype,
            strict,
        } => {
            let input = evaluate_with(expr, table, ctx)?;
            if *strict {
                input.strict_cast(datatype)
            } else {
                input.cast(datatype)
            }
        }
        Expr::Function { expr, function } => function.evaluate(&evaluate_with(expr, table, ctx)?),
    }
}

/// Single row column holding a literal.
pub(crate) fn literal_column(value: &ScalarValue) -> Result<Column> {
    if value.is_null() {
        return Ok(Column::full_null(LITERAL_NAME, &DataType::Null, 1));
    }
    Column::from_scalars(LITERAL_NAME, &value.datatype(), std::slice::from_ref(value))
}

fn evaluate_binary(op: BinaryOp, left: &Expr, right: &Expr, table: &Table, ctx: &ExecutionContext) -> Result<Column> {
    let (l, r) = match (left, right) {
        (Expr::Literal(_), Expr::Literal(_)) => (evaluate_with(left, table, ctx)?, evaluate_with(right, table, ctx)?),
        (_, _) if op == BinaryOp::RepeatBy => (evaluate_with(left, table, ctx)?, evaluate_with(right, table, ctx)?),
        (Expr::Literal(value), _) => {
            let r = evaluate_with(right, table, ctx)?;
            let value = adapt_literal(value, r.datatype()).unwrap_or_else(|| value.clone());
            (literal_column(&value)?, r)
        }
        (_, Expr::Literal(value)) if op != BinaryOp::IsIn => {
            let l = evaluate_with(left, table, ctx)?;
            let value = adapt_literal(value, l.datatype()).unwrap_or_else(|| value.clone());
            (l, literal_column(&value)?)
        }
        _ => (evaluate_with(left, table, ctx)?, evaluate_with(right, table, ctx)?),
    };

    if let Some(arith) = op.arith_op() {
        return arithmetic(&l, &r, arith);
    }
    if let Some(cmp) = op.cmp_op() {
        return compare(&l, &r, cmp);
    }
    match op {
        BinaryOp::And => l.and(&r),
        BinaryOp::Or => l.or(&r),
        BinaryOp::IsIn => {
            // A list on the right is checked element-wise against its values.
            let r = match r.datatype() {
                DataType::List(_) if !matches!(l.datatype(), DataType::List(_)) => r.explode()?.0,
                _ => r,
            };
            l.is_in(&r)
        }
        BinaryOp::RepeatBy => l.repeat_by(&r),
        other => Err(DbError::panic("Unhandled binary operator").with_field("op", other.symbol())),
    }
}

fn evaluate_conditional(
    when: &Expr,
    then: &Expr,
    otherwise: &Expr,
    table: &Table,
    ctx: &ExecutionContext,
) -> Result<Column> {
    let mask = evaluate_with(when, table, ctx)?;
    let mut then_col = evaluate_with(then, table, ctx)?;
    let mut otherwise_col = evaluate_with(otherwise, table, ctx)?;

    // Literal branches take the type of the other branch when lossless.
    if let Expr::Literal(value) = then {
        if let Some(value) = adapt_literal(value, otherwise_col.datatype()) {
            then_col = literal_column(&value)?;
        }
    } else if let Expr::Literal(value) = otherwise {
        if let Some(value) = adapt_literal(value, then_col.datatype()) {
            otherwise_col = literal_column(&value)?;
        }
    }

    let len = mask.len().max(then_col.len()).max(otherwise_col.len());
    let datatype = supertype(then_col.datatype(), otherwise_col.datatype()).ok_or_else(|| {
        DbError::schema("Conditional branches have incompatible datatypes")
            .with_field("then", then_col.datatype())
            .with_field("otherwise", otherwise_col.datatype())
    })?;

    let mask = mask.broadcast(len)?.bool_values()?;
    let then_col = then_col.cast(&datatype)?.broadcast(len)?;
    let otherwise_col = otherwise_col.cast(&datatype)?.broadcast(len)?;

    let values: Vec<ScalarValue> = mask
        .iter()
        .zip(then_col.iter().zip(otherwise_col.iter()))
        .map(|(pick, (a, b))| if *pick == Some(true) { a } else { b })
        .collect();
    Column::from_scalars(then_col.name(), &datatype, &values)
}

fn run_apply(function: &ApplyFunction, input: Column, return_type: Option<&DataType>) -> Result<Column> {
    let name = input.name().to_string();
    let out = catch_user_panic(|| function.call(input))
        .map_err(|e| DbError::with_source("Apply function failed", Box::new(e)).with_field("column", &name))?;
    let out = match return_type {
        Some(datatype) if datatype != out.datatype() => out.cast(datatype)?,
        _ => out,
    };
    Ok(out.with_name(name))
}

/// Evaluate `expr` per partition and map the results back to the rows of
/// each partition.
fn evaluate_window(expr: &Expr, partition_by: &[Expr], table: &Table, ctx: &ExecutionContext) -> Result<Column> {
    let height = table.height();
    if height == 0 || partition_by.is_empty() {
        let out = evaluate_with(expr, table, ctx)?;
        return out.broadcast(height);
    }

    let keys = partition_by
        .iter()
        .map(|e| evaluate_with(e, table, ctx)?.broadcast(height))
        .collect::<Result<Vec<_>>>()?;
    let key_refs: Vec<&Column> = keys.iter().collect();
    let groups = compute_groups(&key_refs, true, ctx)?;
    trace!(groups = groups.len(), "evaluating window");

    let input = project_for(expr, table)?;
    let parts = ctx.pool.try_map(groups.to_vecs(), |rows| {
        let sub = input.take(&rows)?;
        let out = evaluate_with(expr, &sub, ctx)?;
        let out = if out.len() == rows.len() {
            out
        } else if out.len() == 1 {
            out.broadcast(rows.len())?
        } else {
            return Err(DbError::shape("Window expression result doesn't match partition size")
                .with_field("partition", rows.len())
                .with_field("result", out.len()));
        };
        Ok((rows, out))
    })?;

    let datatype = common_datatype(parts.iter().map(|(_, c)| c))?;
    let mut order = Vec::with_capacity(height);
    let mut combined: Option<Column> = None;
    for (rows, part) in parts {
        order.extend(rows);
        let part = part.cast(&datatype)?;
        match combined.as_mut() {
            Some(combined) => combined.append(&part)?,
            None => combined = Some(part),
        }
    }
    let combined = combined.ok_or_else(|| DbError::panic("Window produced no partitions"))?;

    let mut positions = vec![0; height];
    for (pos, row) in order.into_iter().enumerate() {
        positions[row] = pos;
    }
    combined.take(&positions)
}

/// Table holding only the columns an expression reads. At least one column
/// is kept so the height survives.
fn project_for(expr: &Expr, table: &Table) -> Result<Table> {
    let mut names = expr.referenced_columns();
    if names.is_empty() {
        if let Some(first) = table.columns().first() {
            names.push(first.name().to_string());
        }
    }
    table.select(&names)
}

fn common_datatype<'a>(columns: impl Iterator<Item = &'a Column>) -> Result<DataType> {
    let mut datatype = DataType::Null;
    for column in columns {
        datatype = supertype(&datatype, column.datatype()).ok_or_else(|| {
            DbError::schema("Results have incompatible datatypes")
                .with_field("left", &datatype)
                .with_field("right", column.datatype())
        })?;
    }
    Ok(datatype)
}

/// Evaluate an expression once per group.
///
/// Expressions reducing each group produce one row per group. All others
/// produce one list per group.
pub(crate) fn evaluate_groups(
    expr: &Expr,
    table: &Table,
    groups: &GroupsProxy,
    ctx: &ExecutionContext,
) -> Result<Column> {
    match expr {
        Expr::Alias { expr, name } => {
            return Ok(evaluate_groups(expr, table, groups, ctx)?.with_name(name.clone()));
        }
        Expr::Aggregate { kind, expr: inner } => {
            if let Expr::Column(name) = inner.as_ref() {
                let reducer = Reducer::try_new(table.column(name)?, *kind)?;
                let values = groups.iter().map(|g| reducer.reduce(g)).collect::<Result<Vec<_>>>()?;
                return Column::from_scalars(name.clone(), reducer.output_type(), &values);
            }
        }
        Expr::Count => {
            let lengths: Vec<u32> = groups.group_lengths().into_iter().map(|l| l as u32).collect();
            return Ok(Column::from_slice("count", &lengths));
        }
        Expr::Column(name) => {
            let column = table.column(name)?;
            let parts = groups
                .iter()
                .map(|g| column.take(&g.collect::<Vec<_>>()).map(Some))
                .collect::<Result<Vec<_>>>()?;
            return Column::from_list_parts(name.clone(), Some(column.datatype()), parts);
        }
        _ => {}
    }

    let name = expr.output_name()?;
    let input = project_for(expr, table)?;
    let parts = ctx.pool.try_map(groups.to_vecs(), |rows| {
        let sub = input.take(&rows)?;
        evaluate_with(expr, &sub, ctx)
    })?;

    let reduces = match expr.reduces_groups() {
        Some(reduces) => reduces,
        None => !parts.is_empty() && parts.iter().all(|p| p.len() == 1),
    };

    if parts.is_empty() {
        let datatype = expr.datatype(&table.schema())?;
        let datatype = if reduces { datatype } else { DataType::list(datatype) };
        return Ok(Column::full_null(name, &datatype, 0));
    }

    if reduces {
        let datatype = common_datatype(parts.iter())?;
        let values = parts
            .iter()
            .map(|part| {
                if part.len() != 1 {
                    return Err(DbError::shape("Expected a single value per group")
                        .with_field("expr", expr)
                        .with_field("len", part.len()));
                }
                part.get(0)
            })
            .collect::<Result<Vec<_>>>()?;
        Column::from_scalars(name, &datatype, &values)
    } else {
        Column::from_list_parts(name, None, parts.into_iter().map(Some).collect())
    }
}

fn evaluate_many(exprs: &[Expr], table: &Table, ctx: &ExecutionContext) -> Result<Vec<Column>> {
    ctx.pool
        .try_map(exprs.iter().collect(), |expr| evaluate_with(expr, table, ctx))
}

impl Table {
    /// Evaluate expressions into a new table. Single row results broadcast
    /// to the length of the longest result.
    pub fn select_exprs(&self, exprs: &[Expr]) -> Result<Table> {
        self.select_exprs_with(exprs, ExecutionContext::global()?)
    }

    pub fn select_exprs_with(&self, exprs: &[Expr], ctx: &ExecutionContext) -> Result<Table> {
        let exprs = expand_exprs(exprs, &self.schema(), &[])?;
        let columns = evaluate_many(&exprs, self, ctx)?;
        let len = columns.iter().map(|c| c.len()).max().unwrap_or(0);
        let columns = columns
            .into_iter()
            .map(|c| c.broadcast(len))
            .collect::<Result<Vec<_>>>()?;
        Table::try_new(columns)
    }

    /// Add or replace columns computed from expressions.
    pub fn with_exprs(&self, exprs: &[Expr]) -> Result<Table> {
        self.with_exprs_with(exprs, ExecutionContext::global()?)
    }

    pub fn with_exprs_with(&self, exprs: &[Expr], ctx: &ExecutionContext) -> Result<Table> {
        let exprs = expand_exprs(exprs, &self.schema(), &[])?;
        let columns = evaluate_many(&exprs, self, ctx)?;
        self.with_columns(columns)
    }

    /// Keep rows where the predicate is true.
    pub fn filter_expr(&self, predicate: &Expr) -> Result<Table> {
        self.filter_expr_with(predicate, ExecutionContext::global()?)
    }

    pub fn filter_expr_with(&self, predicate: &Expr, ctx: &ExecutionContext) -> Result<Table> {
        let mask = evaluate_with(predicate, self, ctx)?;
        if mask.datatype() != &DataType::Boolean {
            return Err(DbError::schema("Filter predicate must be boolean")
                .with_field("predicate", predicate)
                .with_field("datatype", mask.datatype()));
        }
        self.filter(&mask.broadcast(self.height())?)
    }
}
