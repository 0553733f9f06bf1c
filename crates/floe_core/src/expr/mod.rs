//! Lazily evaluated column expressions.
//!
//! Expressions are immutable trees built with [`col`], [`lit`], [`when`] and
//! the builder methods on [`Expr`]. They are evaluated against a [`Table`]
//! either over the whole table or per group.
//!
//! [`Table`]: crate::frame::Table

pub mod eval;
pub mod function;

use std::fmt;
use std::sync::Arc;

use floe_error::{DbError, Result};

pub use self::function::{FunctionExpr, StringFunction};
use crate::arrays::datatype::{DataType, Field, supertype};
use crate::arrays::scalar::ScalarValue;
use crate::arrays::schema::Schema;
use crate::column::Column;
use crate::column::aggregate::AggregateKind;
use crate::column::arith::{ArithOp, output_type};
use crate::column::cast::cast_scalar;
use crate::column::cmp::CmpOp;
use crate::column::fill::FillNullStrategy;
use crate::column::sort::SortOptions;

/// Name given to columns produced by a bare literal.
pub const LITERAL_NAME: &str = "literal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    IsIn,
    /// List of the left value repeated by the right count.
    RepeatBy,
}

impl BinaryOp {
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "&",
            Self::Or => "|",
            Self::IsIn => "is_in",
            Self::RepeatBy => "repeat_by",
        }
    }

    pub(crate) const fn arith_op(&self) -> Option<ArithOp> {
        Some(match self {
            Self::Add => ArithOp::Add,
            Self::Sub => ArithOp::Sub,
            Self::Mul => ArithOp::Mul,
            Self::Div => ArithOp::Div,
            Self::Rem => ArithOp::Rem,
            _ => return None,
        })
    }

    pub(crate) const fn cmp_op(&self) -> Option<CmpOp> {
        Some(match self {
            Self::Eq => CmpOp::Eq,
            Self::NotEq => CmpOp::NotEq,
            Self::Lt => CmpOp::Lt,
            Self::LtEq => CmpOp::LtEq,
            Self::Gt => CmpOp::Gt,
            Self::GtEq => CmpOp::GtEq,
            _ => return None,
        })
    }
}

type ApplyFn = dyn Fn(Column) -> Result<Column> + Send + Sync;

/// A caller supplied function over whole columns.
#[derive(Clone)]
pub struct ApplyFunction {
    func: Arc<ApplyFn>,
}

impl ApplyFunction {
    pub fn new(func: impl Fn(Column) -> Result<Column> + Send + Sync + 'static) -> Self {
        ApplyFunction {
            func: Arc::new(func),
        }
    }

    pub fn call(&self, column: Column) -> Result<Column> {
        (self.func)(column)
    }
}

impl fmt::Debug for ApplyFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApplyFunction")
    }
}

impl PartialEq for ApplyFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(ScalarValue),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Aggregate {
        kind: AggregateKind,
        expr: Box<Expr>,
    },
    /// Evaluate `expr` separately for each group of `partition_by` and map
    /// the results back onto the rows.
    Window {
        expr: Box<Expr>,
        partition_by: Vec<Expr>,
    },
    Conditional {
        when: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Apply {
        expr: Box<Expr>,
        function: ApplyFunction,
        /// Output type if known up front. Otherwise the type of whatever
        /// the function returns.
        return_type: Option<DataType>,
    },
    Alias {
        expr: Box<Expr>,
        name: String,
    },
    Cast {
        expr: Box<Expr>,
        datatype: DataType,
        strict: bool,
    },
    Function {
        expr: Box<Expr>,
        function: FunctionExpr,
    },
    /// Every column of the input.
    Wildcard,
    /// Every column with one of the datatypes.
    DtypeColumns(Vec<DataType>),
    /// Number of rows (per group when grouped).
    Count,
}

/// Reference a column by name. `"*"` selects all columns.
pub fn col(name: impl Into<String>) -> Expr {
    let name = name.into();
    if name == "*" {
        Expr::Wildcard
    } else {
        Expr::Column(name)
    }
}

pub fn lit(value: impl Into<ScalarValue>) -> Expr {
    Expr::Literal(value.into())
}

pub fn all() -> Expr {
    Expr::Wildcard
}

pub fn dtype_cols(datatypes: impl IntoIterator<Item = DataType>) -> Expr {
    Expr::DtypeColumns(datatypes.into_iter().collect())
}

pub fn count() -> Expr {
    Expr::Count
}

/// Indices of the rows where `condition` is true.
pub fn arg_where(condition: Expr) -> Expr {
    condition.function(FunctionExpr::ArgWhere)
}

pub fn when(condition: Expr) -> When {
    When { condition }
}

#[derive(Debug, Clone)]
pub struct When {
    condition: Expr,
}

impl When {
    pub fn then(self, value: Expr) -> Then {
        Then {
            condition: self.condition,
            value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Then {
    condition: Expr,
    value: Expr,
}

impl Then {
    pub fn otherwise(self, value: Expr) -> Expr {
        Expr::Conditional {
            when: Box::new(self.condition),
            then: Box::new(self.value),
            otherwise: Box::new(value),
        }
    }
}

macro_rules! agg_builder {
    ($($name:ident => $kind:ident),* $(,)?) => {
        $(
            pub fn $name(self) -> Expr {
                self.aggregate(AggregateKind::$kind)
            }
        )*
    };
}

impl Expr {
    fn binary(self, op: BinaryOp, other: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    fn function(self, function: FunctionExpr) -> Expr {
        Expr::Function {
            expr: Box::new(self),
            function,
        }
    }

    pub fn aggregate(self, kind: AggregateKind) -> Expr {
        Expr::Aggregate {
            kind,
            expr: Box::new(self),
        }
    }

    agg_builder!(
        sum => Sum,
        mean => Mean,
        min => Min,
        max => Max,
        first => First,
        last => Last,
        median => Median,
        n_unique => NUnique,
        std => Std,
        var => Var,
        product => Product,
    );

    /// Number of non-null values.
    pub fn count(self) -> Expr {
        self.aggregate(AggregateKind::Count)
    }

    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    pub fn cast(self, datatype: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            datatype,
            strict: false,
        }
    }

    pub fn strict_cast(self, datatype: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            datatype,
            strict: true,
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn neq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::NotEq, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::LtEq, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::GtEq, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn is_in(self, other: Expr) -> Expr {
        self.binary(BinaryOp::IsIn, other)
    }

    pub fn repeat_by(self, by: Expr) -> Expr {
        self.binary(BinaryOp::RepeatBy, by)
    }

    pub fn over(self, partition_by: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Window {
            expr: Box::new(self),
            partition_by: partition_by.into_iter().collect(),
        }
    }

    /// Run `func` over the evaluated column (each group's values when
    /// grouped).
    pub fn apply(
        self,
        func: impl Fn(Column) -> Result<Column> + Send + Sync + 'static,
        return_type: Option<DataType>,
    ) -> Expr {
        Expr::Apply {
            expr: Box::new(self),
            function: ApplyFunction::new(func),
            return_type,
        }
    }

    pub fn head(self, n: usize) -> Expr {
        self.function(FunctionExpr::Head(n))
    }

    pub fn tail(self, n: usize) -> Expr {
        self.function(FunctionExpr::Tail(n))
    }

    pub fn slice(self, offset: i64, len: usize) -> Expr {
        self.function(FunctionExpr::Slice { offset, len })
    }

    pub fn sort(self, descending: bool) -> Expr {
        self.function(FunctionExpr::Sort(SortOptions {
            descending,
            nulls_last: false,
        }))
    }

    pub fn reverse(self) -> Expr {
        self.function(FunctionExpr::Reverse)
    }

    pub fn unique(self) -> Expr {
        self.function(FunctionExpr::Unique)
    }

    pub fn shift(self, periods: i64) -> Expr {
        self.function(FunctionExpr::Shift(periods))
    }

    pub fn fill_null(self, strategy: FillNullStrategy) -> Expr {
        self.function(FunctionExpr::FillNull(strategy))
    }

    pub fn fill_nan(self, value: impl Into<ScalarValue>) -> Expr {
        self.function(FunctionExpr::FillNan(value.into()))
    }

    pub fn drop_nulls(self) -> Expr {
        self.function(FunctionExpr::DropNulls)
    }

    pub fn is_null(self) -> Expr {
        self.function(FunctionExpr::IsNull)
    }

    pub fn is_not_null(self) -> Expr {
        self.function(FunctionExpr::IsNotNull)
    }

    pub fn is_duplicated(self) -> Expr {
        self.function(FunctionExpr::IsDuplicated)
    }

    pub fn is_unique(self) -> Expr {
        self.function(FunctionExpr::IsUnique)
    }

    pub fn cum_sum(self, reverse: bool) -> Expr {
        self.function(FunctionExpr::CumSum { reverse })
    }

    pub fn diff(self, n: i64) -> Expr {
        self.function(FunctionExpr::Diff(n))
    }

    pub fn abs(self) -> Expr {
        self.function(FunctionExpr::Abs)
    }

    pub fn hash(self) -> Expr {
        self.function(FunctionExpr::Hash)
    }

    pub fn list(self) -> Expr {
        self.function(FunctionExpr::List)
    }

    pub fn explode(self) -> Expr {
        self.function(FunctionExpr::Explode)
    }

    pub fn str(self) -> StringNamespace {
        StringNamespace(self)
    }

    /// Direct children of this expression.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Column(_) | Self::Literal(_) | Self::Wildcard | Self::DtypeColumns(_) | Self::Count => {
                Vec::new()
            }
            Self::Unary { expr, .. }
            | Self::Aggregate { expr, .. }
            | Self::Apply { expr, .. }
            | Self::Alias { expr, .. }
            | Self::Cast { expr, .. }
            | Self::Function { expr, .. } => vec![expr],
            Self::Binary { left, right, .. } => vec![left, right],
            Self::Window { expr, partition_by } => {
                let mut children = vec![expr.as_ref()];
                children.extend(partition_by.iter());
                children
            }
            Self::Conditional {
                when,
                then,
                otherwise,
            } => vec![when, then, otherwise],
        }
    }

    pub fn for_each_child_mut<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Expr) -> Result<()>,
    {
        match self {
            Self::Column(_) | Self::Literal(_) | Self::Wildcard | Self::DtypeColumns(_) | Self::Count => {}
            Self::Unary { expr, .. }
            | Self::Aggregate { expr, .. }
            | Self::Apply { expr, .. }
            | Self::Alias { expr, .. }
            | Self::Cast { expr, .. }
            | Self::Function { expr, .. } => f(expr)?,
            Self::Binary { left, right, .. } => {
                f(left)?;
                f(right)?;
            }
            Self::Window { expr, partition_by } => {
                f(expr)?;
                for part in partition_by {
                    f(part)?;
                }
            }
            Self::Conditional {
                when,
                then,
                otherwise,
            } => {
                f(when)?;
                f(then)?;
                f(otherwise)?;
            }
        }
        Ok(())
    }

    /// Rewrite the expression bottom up.
    pub fn transform_up<F>(mut self, f: &mut F) -> Result<Expr>
    where
        F: FnMut(Expr) -> Result<Expr>,
    {
        self.for_each_child_mut(&mut |child| {
            let orig = std::mem::replace(child, Expr::Wildcard);
            *child = orig.transform_up(f)?;
            Ok(())
        })?;
        f(self)
    }

    /// Whether any node in the tree matches the predicate.
    pub fn any(&self, pred: &impl Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.any(pred))
    }

    /// Names of all columns read by this expression, in first reference
    /// order.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_columns(&mut names);
        names
    }

    fn collect_columns(&self, names: &mut Vec<String>) {
        if let Self::Column(name) = self {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        for child in self.children() {
            child.collect_columns(names);
        }
    }

    /// Name of the column this expression produces.
    pub fn output_name(&self) -> Result<String> {
        match self {
            Self::Column(name) | Self::Alias { name, .. } => Ok(name.clone()),
            Self::Literal(_) => Ok(LITERAL_NAME.to_string()),
            Self::Count => Ok("count".to_string()),
            Self::Wildcard | Self::DtypeColumns(_) => {
                Err(DbError::invalid_argument("Multi-column selectors must be expanded before evaluation")
                    .with_field("expr", self))
            }
            Self::Binary { left, .. } => left.output_name(),
            Self::Conditional { then, .. } => then.output_name(),
            Self::Unary { expr, .. }
            | Self::Aggregate { expr, .. }
            | Self::Window { expr, .. }
            | Self::Apply { expr, .. }
            | Self::Cast { expr, .. }
            | Self::Function { expr, .. } => expr.output_name(),
        }
    }

    /// Whether the expression can be evaluated without any input.
    pub fn is_const_foldable(&self) -> bool {
        match self {
            Self::Literal(_) => true,
            Self::Unary { .. } | Self::Binary { .. } | Self::Cast { .. } => {
                self.children().iter().all(|c| c.is_const_foldable())
            }
            _ => false,
        }
    }

    /// Whether every row of the output depends only on the same row of the
    /// input. Filters on such expressions commute with row filtering.
    pub fn is_elementwise(&self) -> bool {
        !self.any(&|e| match e {
            Self::Column(_) | Self::Literal(_) | Self::Unary { .. } | Self::Alias { .. } | Self::Cast { .. } => false,
            Self::Conditional { .. } => false,
            Self::Binary { op, right, .. } => *op == BinaryOp::IsIn && !matches!(right.as_ref(), Self::Literal(_)),
            Self::Function { function, .. } => !function.is_elementwise(),
            _ => true,
        })
    }

    /// Whether the expression produces one value per group when evaluated
    /// in a group context. `None` when only known after evaluation.
    pub fn reduces_groups(&self) -> Option<bool> {
        match self {
            Self::Aggregate { .. } | Self::Count | Self::Literal(_) => Some(true),
            Self::Function { function, expr } => {
                if function.is_reduction() {
                    Some(true)
                } else {
                    expr.reduces_groups().map(|r| r && !matches!(function, FunctionExpr::Explode))
                }
            }
            Self::Column(_) | Self::Window { .. } | Self::Wildcard | Self::DtypeColumns(_) => Some(false),
            Self::Apply { .. } => None,
            Self::Unary { expr, .. } | Self::Alias { expr, .. } | Self::Cast { expr, .. } => expr.reduces_groups(),
            _ => {
                let mut all = true;
                for child in self.children() {
                    match child.reduces_groups() {
                        Some(true) => {}
                        Some(false) => return Some(false),
                        None => all = false,
                    }
                }
                if all { Some(true) } else { None }
            }
        }
    }

    /// Output datatype when evaluated against `schema`.
    pub fn datatype(&self, schema: &Schema) -> Result<DataType> {
        Ok(match self {
            Self::Column(name) => schema.try_get(name)?.datatype.clone(),
            Self::Literal(value) => value.datatype(),
            Self::Count => DataType::UInt32,
            Self::Wildcard | Self::DtypeColumns(_) => {
                return Err(DbError::invalid_argument("Multi-column selectors must be expanded before evaluation")
                    .with_field("expr", self));
            }
            Self::Unary { op: UnaryOp::Not, .. } => DataType::Boolean,
            Self::Unary { op: UnaryOp::Neg, expr } => expr.datatype(schema)?,
            Self::Binary { op, left, right } => match op.arith_op() {
                Some(arith) => {
                    let (left, right) = binary_input_types(left, right, schema)?;
                    arith_output_type(&left, &right, arith).ok_or_else(|| {
                        DbError::schema("Arithmetic not supported for datatypes")
                            .with_field("op", op.symbol())
                            .with_field("left", &left)
                            .with_field("right", &right)
                    })?
                }
                None if *op == BinaryOp::RepeatBy => DataType::list(left.datatype(schema)?),
                None => DataType::Boolean,
            },
            Self::Aggregate { kind, expr } => kind.output_type(&expr.datatype(schema)?)?,
            Self::Window { expr, .. } | Self::Alias { expr, .. } => expr.datatype(schema)?,
            Self::Conditional { then, otherwise, .. } => {
                let (then, otherwise) = binary_input_types(then, otherwise, schema)?;
                supertype(&then, &otherwise).ok_or_else(|| {
                    DbError::schema("Conditional branches have incompatible datatypes")
                        .with_field("then", &then)
                        .with_field("otherwise", &otherwise)
                })?
            }
            Self::Apply {
                expr, return_type, ..
            } => match return_type {
                Some(datatype) => datatype.clone(),
                None => expr.datatype(schema)?,
            },
            Self::Cast { datatype, .. } => datatype.clone(),
            Self::Function { expr, function } => function.output_type(&expr.datatype(schema)?)?,
        })
    }

    pub fn to_field(&self, schema: &Schema) -> Result<Field> {
        Ok(Field::new(self.output_name()?, self.datatype(schema)?))
    }
}

/// Types the two sides of a binary expression are evaluated as, taking
/// literal adaptation into account.
fn binary_input_types(left: &Expr, right: &Expr, schema: &Schema) -> Result<(DataType, DataType)> {
    let left_type = left.datatype(schema)?;
    let right_type = right.datatype(schema)?;
    Ok(match (left, right) {
        (Expr::Literal(_), Expr::Literal(_)) => (left_type, right_type),
        (Expr::Literal(value), _) => match adapt_literal(value, &right_type) {
            Some(adapted) => (adapted.datatype(), right_type),
            None => (left_type, right_type),
        },
        (_, Expr::Literal(value)) => match adapt_literal(value, &left_type) {
            Some(adapted) => (left_type, adapted.datatype()),
            None => (left_type, right_type),
        },
        _ => (left_type, right_type),
    })
}

fn arith_output_type(left: &DataType, right: &DataType, op: ArithOp) -> Option<DataType> {
    let is_str = |dt: &DataType| matches!(dt, DataType::Utf8 | DataType::Categorical);
    match (left, right) {
        (DataType::Null, other) | (other, DataType::Null) => {
            Some(output_type(other, other, op).unwrap_or_else(|| other.clone()))
        }
        (l, r) if is_str(l) && is_str(r) && op == ArithOp::Add => Some(DataType::Utf8),
        (l, r) => output_type(l, r, op),
    }
}

/// Cast a literal to the type of the column it's combined with when doing
/// so loses nothing.
///
/// Integer literals take the type of integer and float columns, float
/// literals take the type of float columns. A Float32 column compared with
/// `0.5` therefore stays Float32, and an Int8 column plus `1` stays Int8.
pub(crate) fn adapt_literal(value: &ScalarValue, other: &DataType) -> Option<ScalarValue> {
    let literal_type = value.datatype();
    let adapt = (literal_type.is_integer() && other.is_numeric())
        || (literal_type.is_float() && other.is_float());
    if !adapt || &literal_type == other {
        return None;
    }
    cast_scalar(value, other, true).ok()
}

/// Expand wildcards and datatype selectors against a schema.
///
/// An expression containing a selector is duplicated once per matching
/// column, in schema order. Columns named in `exclude` are never matched.
pub fn expand_exprs(exprs: &[Expr], schema: &Schema, exclude: &[String]) -> Result<Vec<Expr>> {
    let mut out = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let selector = |e: &Expr| matches!(e, Expr::Wildcard | Expr::DtypeColumns(_));
        if !expr.any(&selector) {
            out.push(expr.clone());
            continue;
        }

        for field in schema.iter() {
            if exclude.contains(&field.name) {
                continue;
            }
            let mut matched = true;
            let expanded = expr.clone().transform_up(&mut |e| {
                Ok(match e {
                    Expr::Wildcard => Expr::Column(field.name.clone()),
                    Expr::DtypeColumns(datatypes) => {
                        if !datatypes.contains(&field.datatype) {
                            matched = false;
                        }
                        Expr::Column(field.name.clone())
                    }
                    other => other,
                })
            })?;
            if matched {
                out.push(expanded);
            }
        }
    }
    Ok(out)
}

/// String functions, reached through [`Expr::str`].
#[derive(Debug, Clone)]
pub struct StringNamespace(Expr);

impl StringNamespace {
    fn function(self, function: StringFunction) -> Expr {
        self.0.function(FunctionExpr::Str(function))
    }

    pub fn lengths(self) -> Expr {
        self.function(StringFunction::Lengths)
    }

    /// Regex match anywhere in the value.
    pub fn contains(self, pattern: impl Into<String>) -> Expr {
        self.function(StringFunction::Contains(pattern.into()))
    }

    pub fn starts_with(self, prefix: impl Into<String>) -> Expr {
        self.function(StringFunction::StartsWith(prefix.into()))
    }

    pub fn ends_with(self, suffix: impl Into<String>) -> Expr {
        self.function(StringFunction::EndsWith(suffix.into()))
    }

    pub fn to_uppercase(self) -> Expr {
        self.function(StringFunction::ToUppercase)
    }

    pub fn to_lowercase(self) -> Expr {
        self.function(StringFunction::ToLowercase)
    }

    pub fn replace(self, pattern: impl Into<String>, value: impl Into<String>) -> Expr {
        self.function(StringFunction::Replace {
            pattern: pattern.into(),
            value: value.into(),
            all: false,
        })
    }

    pub fn replace_all(self, pattern: impl Into<String>, value: impl Into<String>) -> Expr {
        self.function(StringFunction::Replace {
            pattern: pattern.into(),
            value: value.into(),
            all: true,
        })
    }

    pub fn extract(self, pattern: impl Into<String>, group: usize) -> Expr {
        self.function(StringFunction::Extract {
            pattern: pattern.into(),
            group,
        })
    }

    pub fn extract_all(self, pattern: impl Into<String>) -> Expr {
        self.function(StringFunction::ExtractAll(pattern.into()))
    }

    /// Pad numeric strings with leading zeros.
    pub fn zfill(self, width: usize) -> Expr {
        self.function(StringFunction::Zfill(width))
    }

    pub fn ljust(self, width: usize, fill: char) -> Expr {
        self.function(StringFunction::LJust { width, fill })
    }

    pub fn rjust(self, width: usize, fill: char) -> Expr {
        self.function(StringFunction::RJust { width, fill })
    }

    /// Join the values into a single string, one per group when grouped.
    pub fn concat(self, delimiter: impl Into<String>) -> Expr {
        self.function(StringFunction::Concat(delimiter.into()))
    }
}

macro_rules! impl_binary_op {
    ($($trait:ident, $method:ident => $op:ident);* $(;)?) => {
        $(
            impl std::ops::$trait for Expr {
                type Output = Expr;

                fn $method(self, rhs: Expr) -> Expr {
                    self.binary(BinaryOp::$op, rhs)
                }
            }
        )*
    };
}

impl_binary_op!(
    Add, add => Add;
    Sub, sub => Sub;
    Mul, mul => Mul;
    Div, div => Div;
    Rem, rem => Rem;
);

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(self),
        }
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(name) => write!(f, "col({name:?})"),
            Self::Literal(value) => write!(f, "lit({value})"),
            Self::Unary { op: UnaryOp::Not, expr } => write!(f, "!({expr})"),
            Self::Unary { op: UnaryOp::Neg, expr } => write!(f, "-({expr})"),
            Self::Binary {
                op: BinaryOp::IsIn,
                left,
                right,
            } => write!(f, "{left}.is_in({right})"),
            Self::Binary { op, left, right } => write!(f, "[({left}) {} ({right})]", op.symbol()),
            Self::Aggregate { kind, expr } => write!(f, "{expr}.{kind}()"),
            Self::Window { expr, partition_by } => {
                let parts: Vec<String> = partition_by.iter().map(|p| p.to_string()).collect();
                write!(f, "{expr}.over([{}])", parts.join(", "))
            }
            Self::Conditional {
                when,
                then,
                otherwise,
            } => write!(f, "when({when}).then({then}).otherwise({otherwise})"),
            Self::Apply { expr, .. } => write!(f, "{expr}.apply()"),
            Self::Alias { expr, name } => write!(f, "{expr}.alias({name:?})"),
            Self::Cast {
                expr,
                datatype,
                strict,
            } => {
                if *strict {
                    write!(f, "{expr}.strict_cast({datatype})")
                } else {
                    write!(f, "{expr}.cast({datatype})")
                }
            }
            Self::Function { expr, function } => write!(f, "{expr}.{function}"),
            Self::Wildcard => write!(f, "*"),
            Self::DtypeColumns(datatypes) => {
                let names: Vec<String> = datatypes.iter().map(|d| d.to_string()).collect();
                write!(f, "dtype_cols([{}])", names.join(", "))
            }
            Self::Count => write!(f, "count()"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new([
            Field::new("a", DataType::Int8),
            Field::new("b", DataType::Float32),
            Field::new("c", DataType::Utf8),
        ])
    }

    #[test]
    fn literal_adaptation_types() {
        let schema = schema();
        assert_eq!(DataType::Int8, (col("a") + lit(1i64)).datatype(&schema).unwrap());
        assert_eq!(DataType::Float32, (col("b") * lit(0.5f64)).datatype(&schema).unwrap());
        assert_eq!(DataType::Float64, (col("a") + lit(0.5f64)).datatype(&schema).unwrap());
        assert_eq!(DataType::Float64, (col("a") / lit(2i64)).datatype(&schema).unwrap());
    }

    #[test]
    fn output_names() {
        assert_eq!("a", (col("a") + lit(1)).output_name().unwrap());
        assert_eq!("literal", lit(1).output_name().unwrap());
        assert_eq!("x", col("a").sum().alias("x").output_name().unwrap());
        assert!(all().output_name().is_err());
    }

    #[test]
    fn expand_selectors() {
        let schema = schema();
        let exprs = expand_exprs(&[all().sum()], &schema, &["c".to_string()]).unwrap();
        assert_eq!(vec![col("a").sum(), col("b").sum()], exprs);

        let exprs = expand_exprs(&[dtype_cols([DataType::Utf8])], &schema, &[]).unwrap();
        assert_eq!(vec![col("c")], exprs);
    }

    #[test]
    fn reduces_groups() {
        assert_eq!(Some(true), col("a").sum().reduces_groups());
        assert_eq!(Some(true), (col("a").sum() + col("b").max()).reduces_groups());
        assert_eq!(Some(false), (col("a") + col("b").max()).reduces_groups());
        assert_eq!(Some(true), col("a").head(2).list().reduces_groups());
        assert_eq!(None, col("a").apply(Ok, None).reduces_groups());
    }

    #[test]
    fn display() {
        let expr = when(col("a").gt(lit(1))).then(col("b")).otherwise(lit(0));
        assert_eq!(
            "when([(col(\"a\")) > (lit(1))]).then(col(\"b\")).otherwise(lit(0))",
            expr.to_string()
        );
    }
}
