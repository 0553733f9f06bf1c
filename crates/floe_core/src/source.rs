//! Sources of tables for lazy scans.

use std::fmt::Debug;

use floe_error::Result;

use crate::arrays::schema::Schema;
use crate::frame::Table;

/// Something that can produce a table on demand.
pub trait TableSource: Debug + Send + Sync {
    /// Name shown in plan descriptions.
    fn name(&self) -> &str;

    /// Schema of the table `read` produces. Implementations should not
    /// read more than a sample of the data.
    fn schema(&self) -> Result<Schema>;

    /// Read the table, keeping only the projected columns if given.
    fn read(&self, projection: Option<&[String]>) -> Result<Table>;
}

/// Source over an in-memory table.
#[derive(Debug, Clone)]
pub struct MemorySource {
    table: Table,
}

impl MemorySource {
    pub fn new(table: Table) -> Self {
        MemorySource { table }
    }
}

impl TableSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn schema(&self) -> Result<Schema> {
        Ok(self.table.schema())
    }

    fn read(&self, projection: Option<&[String]>) -> Result<Table> {
        match projection {
            Some(columns) => self.table.select(columns),
            None => Ok(self.table.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;

    #[test]
    fn memory_projection() {
        let source = MemorySource::new(
            Table::try_new(vec![
                Column::from_slice("a", &[1i64]),
                Column::from_slice("b", &[2i64]),
            ])
            .unwrap(),
        );
        let out = source.read(Some(&["b".to_string()])).unwrap();
        assert_eq!(vec!["b"], out.column_names());
        assert_eq!(2, source.schema().unwrap().len());
    }
}
