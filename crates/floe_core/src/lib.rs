//! In-memory columnar tables with eager and lazy query APIs.
//!
//! [`frame::Table`] is the eager entry point. Calling `lazy()` on a table
//! (through [`frame::FrameOps`]) builds a [`logical::LazyFrame`] that is
//! optimized and executed on [`LazyFrame::collect`](logical::LazyFrame::collect).

pub mod arrays;
pub mod column;
pub mod config;
pub mod expr;
pub mod frame;
pub mod groupby;
pub mod join;
pub mod logical;
pub mod optimizer;
pub mod runtime;
pub mod source;
pub mod testutil;

pub mod prelude {
    pub use crate::arrays::datatype::{DataType, Field, TimeUnit};
    pub use crate::arrays::scalar::ScalarValue;
    pub use crate::arrays::schema::Schema;
    pub use crate::column::Column;
    pub use crate::column::aggregate::AggregateKind;
    pub use crate::column::fill::FillNullStrategy;
    pub use crate::config::ExecutionConfig;
    pub use crate::expr::{Expr, all, arg_where, col, count, dtype_cols, lit, when};
    pub use crate::frame::combine::{ConcatMethod, concat};
    pub use crate::frame::construct::{ColumnSpec, Orientation, TableData, TableOptions};
    pub use crate::frame::ops::UniqueKeep;
    pub use crate::frame::reshape::MeltArgs;
    pub use crate::frame::rows::NullStrategy;
    pub use crate::frame::{FrameOps, FromTable, Table};
    pub use crate::groupby::PivotAgg;
    pub use crate::join::{AsofOptions, AsofStrategy, JoinArgs, JoinType};
    pub use crate::logical::LazyFrame;
    pub use crate::runtime::ExecutionContext;
    pub use crate::source::TableSource;
}
