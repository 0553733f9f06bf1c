//! Text descriptions of logical plans.

use std::collections::BTreeMap;
use std::fmt;

use super::plan::LogicalPlan;

/// A single line in a plan description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainEntry {
    pub name: String,
    /// Sorted for stable output.
    pub items: BTreeMap<String, String>,
}

impl ExplainEntry {
    pub fn new(name: impl Into<String>) -> Self {
        ExplainEntry {
            name: name.into(),
            items: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.items.insert(key.into(), value.to_string());
        self
    }

    pub fn with_values<S: fmt::Display>(mut self, key: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        let values: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        self.items.insert(key.into(), format!("[{}]", values.join(", ")));
        self
    }
}

impl fmt::Display for ExplainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.items.is_empty() {
            write!(f, " (")?;
            for (idx, (k, v)) in self.items.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k} = {v}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainNode {
    pub entry: ExplainEntry,
    pub children: Vec<ExplainNode>,
}

impl ExplainNode {
    pub fn walk(plan: &LogicalPlan) -> Self {
        let entry = explain_entry(plan);
        let children = plan.children().into_iter().map(Self::walk).collect();
        ExplainNode { entry, children }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.entry, indent = depth * 2)?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ExplainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

fn explain_entry(plan: &LogicalPlan) -> ExplainEntry {
    let entry = ExplainEntry::new(plan.name());
    match plan {
        LogicalPlan::Scan {
            source,
            projection,
            predicate,
        } => {
            let mut entry = entry.with_value("source", source.name());
            if let Some(projection) = projection {
                entry = entry.with_values("projection", projection);
            }
            if let Some(predicate) = predicate {
                entry = entry.with_value("predicate", predicate);
            }
            entry
        }
        LogicalPlan::Select { exprs, .. } | LogicalPlan::WithColumns { exprs, .. } => {
            entry.with_values("exprs", exprs)
        }
        LogicalPlan::Filter { predicate, .. } => entry.with_value("predicate", predicate),
        LogicalPlan::GroupByAgg {
            keys,
            aggs,
            maintain_order,
            ..
        } => entry
            .with_values("keys", keys)
            .with_values("aggs", aggs)
            .with_value("maintain_order", maintain_order),
        LogicalPlan::Join { args, .. } => {
            let entry = entry.with_value("how", args.how);
            if args.left_on.is_empty() {
                entry
            } else {
                entry
                    .with_values("left_on", &args.left_on)
                    .with_values("right_on", &args.right_on)
            }
        }
        LogicalPlan::Sort {
            by,
            descending,
            nulls_last,
            ..
        } => entry
            .with_values("by", by)
            .with_values("descending", descending)
            .with_value("nulls_last", nulls_last),
        LogicalPlan::Distinct { subset, keep, .. } => {
            let entry = entry.with_value("keep", format!("{keep:?}"));
            match subset {
                Some(subset) => entry.with_values("subset", subset),
                None => entry,
            }
        }
        LogicalPlan::Melt { args, .. } => entry
            .with_values("id_vars", &args.id_vars)
            .with_values("value_vars", &args.value_vars),
        LogicalPlan::Explode { columns, .. } | LogicalPlan::Drop { columns, .. } => {
            entry.with_values("columns", columns)
        }
        LogicalPlan::Slice { offset, len, .. } => entry.with_value("offset", offset).with_value("len", len),
        LogicalPlan::Rename { mapping, .. } => {
            entry.with_values("mapping", mapping.iter().map(|(old, new)| format!("{old} -> {new}")))
        }
        LogicalPlan::WithRowCount { name, .. } => entry.with_value("name", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::expr::{col, lit};
    use crate::frame::Table;

    #[test]
    fn indented_description() {
        let table = Table::try_new(vec![Column::from_slice("a", &[1i64])]).unwrap();
        let plan = LogicalPlan::Slice {
            input: Box::new(LogicalPlan::Filter {
                input: Box::new(LogicalPlan::scan_table(table)),
                predicate: col("a").gt(lit(0i64)),
            }),
            offset: 0,
            len: 5,
        };
        let text = ExplainNode::walk(&plan).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(3, lines.len());
        assert_eq!("Slice (len = 5, offset = 0)", lines[0]);
        assert!(lines[1].starts_with("  Filter (predicate = "));
        assert_eq!("    Scan (source = table)", lines[2]);
    }
}
