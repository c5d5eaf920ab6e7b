//! Prepared statements: eager compilation, metadata introspection, reuse.
//!
//! A prepared handle owns the validated SQL text and the metadata captured at
//! prepare time. Execution goes through the connection's statement cache, so
//! repeated runs of the same handle reuse one compiled native statement.

use std::sync::Arc;

use uuid::Uuid;

use crate::binder;
use crate::bridge::{SqlBridge, build_result_set};
use crate::error::{SqlBridgeError, translate_prepare};
use crate::results::ResultSet;
use crate::types::{ExecOutcome, Params};

/// Name and declared type of one result column, captured at prepare time.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type from the schema, when the column maps to a table column.
    /// Expressions and computed columns have none.
    pub decl_type: Option<String>,
}

pub(crate) struct StatementEntry {
    pub(crate) conn_id: Uuid,
    pub(crate) sql: Arc<String>,
    columns: Vec<ColumnInfo>,
    parameter_count: usize,
    /// Placeholder names by 1-based index; anonymous placeholders have none.
    parameter_names: Vec<Option<String>>,
}

impl SqlBridge {
    /// Compile `sql` eagerly and register a reusable statement handle.
    ///
    /// Syntax errors and references to missing tables or columns surface
    /// here, not at first execution.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::PrepareError`] for SQL the engine rejects
    /// and [`SqlBridgeError::InvalidHandle`] for an unknown connection.
    pub fn prepare(&self, conn_handle: &str, sql: &str) -> Result<String, SqlBridgeError> {
        let conn_id = self.connections.parse(conn_handle)?;
        let entry = self.connections.resolve_id(conn_id, conn_handle)?;

        let (columns, parameter_count, parameter_names) = {
            let conn = entry.lock();
            let stmt = conn.prepare(sql).map_err(translate_prepare)?;
            let columns = stmt
                .columns()
                .iter()
                .map(|col| ColumnInfo {
                    name: col.name().to_owned(),
                    decl_type: col.decl_type().map(str::to_owned),
                })
                .collect();
            let parameter_count = stmt.parameter_count();
            let parameter_names = (1..=parameter_count)
                .map(|i| stmt.parameter_name(i).map(str::to_owned))
                .collect();
            (columns, parameter_count, parameter_names)
        };

        let (_, handle) = self.statements.register(StatementEntry {
            conn_id,
            sql: Arc::new(sql.to_owned()),
            columns,
            parameter_count,
            parameter_names,
        });
        tracing::debug!(conn = %conn_handle, %handle, "statement prepared");
        Ok(handle)
    }

    /// Number of result columns the statement produces. Zero for DML.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown or closed
    /// statement handle.
    pub fn column_count(&self, stmt_handle: &str) -> Result<usize, SqlBridgeError> {
        Ok(self.statements.resolve(stmt_handle)?.columns.len())
    }

    /// Name and declared type of the result column at `index` (0-based).
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::IndexOutOfBounds`] past the last column.
    pub fn column_info(&self, stmt_handle: &str, index: usize) -> Result<ColumnInfo, SqlBridgeError> {
        let stmt = self.statements.resolve(stmt_handle)?;
        stmt.columns
            .get(index)
            .cloned()
            .ok_or(SqlBridgeError::IndexOutOfBounds {
                index,
                len: stmt.columns.len(),
            })
    }

    /// Number of placeholders in the statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown or closed
    /// statement handle.
    pub fn parameter_count(&self, stmt_handle: &str) -> Result<usize, SqlBridgeError> {
        Ok(self.statements.resolve(stmt_handle)?.parameter_count)
    }

    /// Name of the placeholder at `index` (1-based, matching the engine's
    /// parameter numbering). `None` for an anonymous `?`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::IndexOutOfBounds`] for index zero or past
    /// the last placeholder.
    pub fn parameter_name(
        &self,
        stmt_handle: &str,
        index: usize,
    ) -> Result<Option<String>, SqlBridgeError> {
        let stmt = self.statements.resolve(stmt_handle)?;
        if index == 0 || index > stmt.parameter_count {
            return Err(SqlBridgeError::IndexOutOfBounds {
                index,
                len: stmt.parameter_count,
            });
        }
        Ok(stmt.parameter_names[index - 1].clone())
    }

    /// Execute a prepared DML statement with fresh parameters.
    ///
    /// # Errors
    ///
    /// Same classification as [`SqlBridge::execute`].
    pub fn execute_stmt(
        &self,
        stmt_handle: &str,
        params: &Params,
    ) -> Result<ExecOutcome, SqlBridgeError> {
        let stmt = self.statements.resolve(stmt_handle)?;
        let entry = self.connection_by_id(stmt.conn_id)?;
        let (outcome, autocommit) = {
            let conn = entry.lock();
            let outcome = crate::bridge::execute_on(&conn, &stmt.sql, params);
            (outcome, conn.is_autocommit())
        };
        entry.set_autocommit(autocommit);
        outcome
    }

    /// Run a prepared query with fresh parameters and materialize the rows.
    ///
    /// # Errors
    ///
    /// Same classification as [`SqlBridge::execute`].
    pub fn query_stmt(
        &self,
        stmt_handle: &str,
        params: &Params,
    ) -> Result<ResultSet, SqlBridgeError> {
        let stmt = self.statements.resolve(stmt_handle)?;
        let entry = self.connection_by_id(stmt.conn_id)?;
        let conn = entry.lock();
        let bound = binder::bind(&stmt.sql, params)?;
        let mut native = conn.prepare_cached(&bound.sql).map_err(translate_prepare)?;
        build_result_set(&mut native, bound.values)
    }

    /// Clear the statement's bindings so it can be re-executed from scratch.
    /// The compiled form and the handle stay valid.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown or closed
    /// statement handle.
    pub fn reset_stmt(&self, stmt_handle: &str) -> Result<(), SqlBridgeError> {
        let stmt = self.statements.resolve(stmt_handle)?;
        let entry = self.connection_by_id(stmt.conn_id)?;
        let conn = entry.lock();
        let mut native = conn.prepare_cached(&stmt.sql).map_err(translate_prepare)?;
        native.clear_bindings();
        Ok(())
    }

    /// Release the statement handle. Idempotence is not offered: a second
    /// close of the same handle is an `InvalidHandle` error.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown or already
    /// closed statement handle.
    pub fn close_stmt(&self, stmt_handle: &str) -> Result<(), SqlBridgeError> {
        self.statements.remove(stmt_handle)?;
        Ok(())
    }
}
