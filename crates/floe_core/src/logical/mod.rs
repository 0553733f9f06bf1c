//! Lazy query plans.
//!
//! A [`LazyFrame`] builds a [`LogicalPlan`] tree. Collecting runs the
//! [`Optimizer`](crate::optimizer::Optimizer) over the tree when enabled,
//! then executes it node by node with the [`executor`].

pub mod executor;
pub mod explain;
pub mod lazy;
pub mod plan;

pub use self::lazy::{LazyFrame, LazyGroupBy};
pub use self::plan::{LogicalPlan, ScanSource};
