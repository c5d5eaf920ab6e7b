use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Value;

/// A single row from a query result.
///
/// Column names and the name-to-index map are shared across all rows of a
/// result set, so cloning a row is cheap.
#[derive(Debug, Clone)]
pub struct Row {
    pub(crate) column_names: Arc<Vec<String>>,
    pub(crate) column_index: Arc<HashMap<String, usize>>,
    pub(crate) values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(
        column_names: Arc<Vec<String>>,
        column_index: Arc<HashMap<String, usize>>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            column_names,
            column_index,
            values,
        }
    }

    /// The column names for this row.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Get a value by column name, or `None` if the column does not exist.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&Value> {
        self.column_index
            .get(column_name)
            .and_then(|&idx| self.values.get(idx))
    }

    /// Get a value by column index, or `None` past the last column.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// All values in column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}
