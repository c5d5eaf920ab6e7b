use std::collections::HashMap;
use std::sync::Arc;

use super::row::Row;
use crate::types::Value;

/// Rows returned by a query, plus the shared column metadata.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query.
    pub rows: Vec<Row>,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    /// Create an empty result set for the given columns; the name-to-index
    /// map is built once and shared by every row.
    #[must_use]
    pub fn new(column_names: Vec<String>) -> Self {
        let column_index = Arc::new(
            column_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect::<HashMap<_, _>>(),
        );
        Self {
            rows: Vec::new(),
            column_names: Arc::new(column_names),
            column_index,
        }
    }

    pub(crate) fn push_row(&mut self, values: Vec<Value>) {
        self.rows.push(Row::new(
            Arc::clone(&self.column_names),
            Arc::clone(&self.column_index),
            values,
        ));
    }

    /// Column names, in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.column_names
    }

    /// Number of rows in the result.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
