//! The service object owning every registry.

use std::sync::Arc;

use uuid::Uuid;

use crate::binder;
use crate::connection::ConnectionEntry;
use crate::cursor::CursorEntry;
use crate::error::{HandleKind, SqlBridgeError, translate_native, translate_prepare};
use crate::registry::Registry;
use crate::results::{ResultSet, Row};
use crate::statement::StatementEntry;
use crate::transaction::TransactionEntry;
use crate::types::{ExecOutcome, Params};

/// Who may operate on a transaction handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxOwnership {
    /// Any caller holding the handle may operate on the transaction;
    /// ownership discipline is left to the caller.
    #[default]
    Shared,
    /// Transaction operations must come from the thread that called `begin`;
    /// anything else is treated as a foreign handle.
    ThreadBound,
}

/// Policy knobs for a [`SqlBridge`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeConfig {
    pub tx_ownership: TxOwnership,
}

/// The resource-management core: owns every live connection, transaction,
/// prepared statement, and result cursor, and is the single boundary between
/// callers and the native engine.
///
/// All registries are explicitly owned by this object — there is no ambient
/// global state — and every operation is safe under concurrent invocation
/// from independent threads.
///
/// ```rust
/// use sql_bridge::prelude::*;
///
/// # fn demo() -> Result<(), SqlBridgeError> {
/// let bridge = SqlBridge::new();
/// let conn = bridge.connect(ConnectOptions::memory())?;
/// bridge.execute(&conn, "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &Params::None)?;
/// let rs = bridge.query(&conn, "SELECT * FROM t", &Params::None)?;
/// assert_eq!(rs.row_count(), 0);
/// # Ok(())
/// # }
/// ```
pub struct SqlBridge {
    pub(crate) connections: Registry<ConnectionEntry>,
    pub(crate) transactions: Registry<TransactionEntry>,
    pub(crate) statements: Registry<StatementEntry>,
    pub(crate) cursors: Registry<CursorEntry>,
    pub(crate) config: BridgeConfig,
}

impl Default for SqlBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    #[must_use]
    pub fn with_config(config: BridgeConfig) -> Self {
        Self {
            connections: Registry::new(HandleKind::Connection),
            transactions: Registry::new(HandleKind::Transaction),
            statements: Registry::new(HandleKind::Statement),
            cursors: Registry::new(HandleKind::Cursor),
            config,
        }
    }

    pub(crate) fn connection_by_id(
        &self,
        id: Uuid,
    ) -> Result<Arc<ConnectionEntry>, SqlBridgeError> {
        self.connections
            .get(id)
            .ok_or_else(|| SqlBridgeError::invalid_handle(HandleKind::Connection, "closed"))
    }

    /// Execute a DML statement.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SqlBridgeError`]: `InvalidHandle`,
    /// `BindingError`, `PrepareError`, `ConstraintViolation`, `BusyOrLocked`,
    /// or `ExecutionError`.
    pub fn execute(
        &self,
        conn_handle: &str,
        sql: &str,
        params: &Params,
    ) -> Result<ExecOutcome, SqlBridgeError> {
        let entry = self.connections.resolve(conn_handle)?;
        let (outcome, autocommit) = {
            let conn = entry.lock();
            let outcome = execute_on(&conn, sql, params);
            (outcome, conn.is_autocommit())
        };
        entry.set_autocommit(autocommit);
        outcome
    }

    /// Run a query and materialize the rows.
    ///
    /// # Errors
    ///
    /// Same classification as [`SqlBridge::execute`].
    pub fn query(
        &self,
        conn_handle: &str,
        sql: &str,
        params: &Params,
    ) -> Result<ResultSet, SqlBridgeError> {
        let entry = self.connections.resolve(conn_handle)?;
        let conn = entry.lock();
        query_on(&conn, sql, params)
    }

    /// Run a query expected to match exactly one row.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::NotFound`] for zero rows and
    /// [`SqlBridgeError::MultipleRows`] for more than one.
    pub fn query_one(
        &self,
        conn_handle: &str,
        sql: &str,
        params: &Params,
    ) -> Result<Row, SqlBridgeError> {
        let mut result = self.query(conn_handle, sql, params)?;
        match result.row_count() {
            0 => Err(SqlBridgeError::NotFound),
            1 => Ok(result.rows.remove(0)),
            n => Err(SqlBridgeError::MultipleRows(n)),
        }
    }
}

/// Materialize a result set from a prepared native statement.
pub(crate) fn build_result_set(
    stmt: &mut rusqlite::Statement<'_>,
    values: Vec<rusqlite::types::Value>,
) -> Result<ResultSet, SqlBridgeError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let column_count = column_names.len();
    let mut result = ResultSet::new(column_names);

    let mut rows = stmt
        .query(rusqlite::params_from_iter(values))
        .map_err(translate_native)?;
    while let Some(row) = rows.next().map_err(translate_native)? {
        let mut row_values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let native: rusqlite::types::Value = row.get(i).map_err(translate_native)?;
            row_values.push(binder::native_to_value(native));
        }
        result.push_row(row_values);
    }
    Ok(result)
}

/// Execute one DML statement on an already-locked connection.
pub(crate) fn execute_on(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &Params,
) -> Result<ExecOutcome, SqlBridgeError> {
    let bound = binder::bind(sql, params)?;
    let mut stmt = conn.prepare_cached(&bound.sql).map_err(translate_prepare)?;
    let rows_affected = stmt
        .execute(rusqlite::params_from_iter(bound.values))
        .map_err(translate_native)?;
    Ok(ExecOutcome {
        rows_affected,
        last_insert_id: conn.last_insert_rowid(),
    })
}

/// Run one query on an already-locked connection.
pub(crate) fn query_on(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &Params,
) -> Result<ResultSet, SqlBridgeError> {
    let bound = binder::bind(sql, params)?;
    let mut stmt = conn.prepare_cached(&bound.sql).map_err(translate_prepare)?;
    build_result_set(&mut stmt, bound.values)
}
