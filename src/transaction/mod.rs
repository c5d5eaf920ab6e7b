//! Explicit transactions and nested savepoints.
//!
//! State machine per connection: `Autocommit -> begin -> InTransaction ->
//! commit|rollback -> Autocommit`. Savepoints form a stack inside the open
//! transaction; a statement failure mid-transaction leaves the transaction
//! open so the caller can roll back to an earlier savepoint and continue.

mod savepoint;

use std::sync::Mutex;

use uuid::Uuid;

use crate::bridge::{SqlBridge, TxOwnership};
use crate::error::{HandleKind, SqlBridgeError, translate_native};
use crate::types::TxBehavior;

/// One open explicit transaction.
pub(crate) struct TransactionEntry {
    pub(crate) conn_id: Uuid,
    pub(crate) behavior: TxBehavior,
    /// Active savepoint names, innermost last. Duplicates are allowed; the
    /// engine resolves a name to its most recent savepoint.
    savepoints: Mutex<Vec<String>>,
    owner: Option<std::thread::ThreadId>,
}

impl TransactionEntry {
    fn savepoints(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.savepoints
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_owner(&self) -> Result<(), SqlBridgeError> {
        match self.owner {
            Some(owner) if owner != std::thread::current().id() => Err(
                SqlBridgeError::invalid_handle(HandleKind::Transaction, "foreign thread"),
            ),
            _ => Ok(()),
        }
    }
}

impl SqlBridge {
    /// Begin an explicit transaction on the connection.
    ///
    /// Returns the transaction's own handle; the transaction is also
    /// addressable through the connection for `commit`, `rollback`, and the
    /// savepoint operations.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::ExecutionError`] if a transaction is
    /// already open on this connection, and [`SqlBridgeError::BusyOrLocked`]
    /// if `immediate` cannot take the write lock within the busy timeout.
    pub fn begin(
        &self,
        conn_handle: &str,
        behavior: TxBehavior,
    ) -> Result<String, SqlBridgeError> {
        let conn_id = self.connections.parse(conn_handle)?;
        let entry = self.connections.resolve_id(conn_id, conn_handle)?;
        let mut tx_guard = entry.tx_lock();
        if tx_guard.is_some() {
            return Err(SqlBridgeError::ExecutionError(
                "a transaction is already open on this connection".into(),
            ));
        }

        {
            let conn = entry.lock();
            if behavior == TxBehavior::ReadOnly {
                conn.pragma_update(None, "query_only", true)
                    .map_err(translate_native)?;
            }
            if let Err(err) = conn.execute_batch(behavior.begin_sql()) {
                if behavior == TxBehavior::ReadOnly {
                    let _ = conn.pragma_update(None, "query_only", false);
                }
                return Err(translate_native(err));
            }
        }

        let owner = match self.config.tx_ownership {
            TxOwnership::Shared => None,
            TxOwnership::ThreadBound => Some(std::thread::current().id()),
        };
        let (tx_id, handle) = self.transactions.register(TransactionEntry {
            conn_id,
            behavior,
            savepoints: Mutex::new(Vec::new()),
            owner,
        });
        *tx_guard = Some(tx_id);
        entry.set_autocommit(false);
        tracing::debug!(conn = %conn_handle, ?behavior, "transaction begun");
        Ok(handle)
    }

    /// Commit the connection's open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::NoActiveTransaction`] in autocommit state.
    /// If the native commit fails the transaction stays open.
    pub fn commit(&self, conn_handle: &str) -> Result<(), SqlBridgeError> {
        self.finish_tx(conn_handle, "COMMIT")
    }

    /// Roll back the connection's open transaction, discarding its effects
    /// and every savepoint.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::NoActiveTransaction`] in autocommit state.
    pub fn rollback(&self, conn_handle: &str) -> Result<(), SqlBridgeError> {
        self.finish_tx(conn_handle, "ROLLBACK")
    }

    fn finish_tx(&self, conn_handle: &str, sql: &str) -> Result<(), SqlBridgeError> {
        let entry = self.connections.resolve(conn_handle)?;
        let mut tx_guard = entry.tx_lock();
        let tx_id = tx_guard.ok_or(SqlBridgeError::NoActiveTransaction)?;
        let tx = self
            .transactions
            .get(tx_id)
            .ok_or(SqlBridgeError::NoActiveTransaction)?;
        tx.check_owner()?;

        {
            let conn = entry.lock();
            conn.execute_batch(sql).map_err(translate_native)?;
            if tx.behavior == TxBehavior::ReadOnly {
                let _ = conn.pragma_update(None, "query_only", false);
            }
            entry.set_autocommit(conn.is_autocommit());
        }

        *tx_guard = None;
        self.transactions.remove_id(tx_id);
        // Cursors opened inside the transaction end with it.
        self.cursors.retain(|cursor| cursor.tx_id != Some(tx_id));
        tracing::debug!(conn = %conn_handle, sql, "transaction finished");
        Ok(())
    }

    /// Create a named savepoint inside the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidIdentifier`] — before any SQL is
    /// built — for a name outside the allow-list grammar, and
    /// [`SqlBridgeError::NoActiveTransaction`] in autocommit state.
    pub fn create_savepoint(&self, conn_handle: &str, name: &str) -> Result<(), SqlBridgeError> {
        savepoint::validate_name(name)?;
        self.with_active_tx(conn_handle, |conn, tx| {
            conn.execute_batch(&format!("SAVEPOINT \"{name}\""))
                .map_err(translate_native)?;
            tx.savepoints().push(name.to_owned());
            Ok(())
        })
    }

    /// Release a savepoint: removes it and every savepoint created after it
    /// without undoing their effects.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidIdentifier`] for a malformed name or
    /// a name not on the stack.
    pub fn release_savepoint(&self, conn_handle: &str, name: &str) -> Result<(), SqlBridgeError> {
        savepoint::validate_name(name)?;
        self.with_active_tx(conn_handle, |conn, tx| {
            let mut stack = tx.savepoints();
            let position = rfind_savepoint(&stack, name)?;
            conn.execute_batch(&format!("RELEASE SAVEPOINT \"{name}\""))
                .map_err(translate_native)?;
            stack.truncate(position);
            Ok(())
        })
    }

    /// Undo every effect performed since the savepoint was created, pop it
    /// and everything above it, and leave the transaction open. Effects from
    /// before the savepoint are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidIdentifier`] for a malformed name or
    /// a name not on the stack.
    pub fn rollback_to_savepoint(
        &self,
        conn_handle: &str,
        name: &str,
    ) -> Result<(), SqlBridgeError> {
        savepoint::validate_name(name)?;
        self.with_active_tx(conn_handle, |conn, tx| {
            let mut stack = tx.savepoints();
            let position = rfind_savepoint(&stack, name)?;
            // ROLLBACK TO leaves the savepoint on the engine's stack; the
            // RELEASE pops it without undoing anything further.
            conn.execute_batch(&format!(
                "ROLLBACK TO SAVEPOINT \"{name}\"; RELEASE SAVEPOINT \"{name}\""
            ))
            .map_err(translate_native)?;
            stack.truncate(position);
            Ok(())
        })
    }

    /// The open transaction's savepoint names, innermost last.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::NoActiveTransaction`] in autocommit state.
    pub fn savepoints(&self, conn_handle: &str) -> Result<Vec<String>, SqlBridgeError> {
        self.with_active_tx(conn_handle, |_, tx| Ok(tx.savepoints().clone()))
    }

    /// Handle of the connection's open transaction, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown connection.
    pub fn current_transaction(
        &self,
        conn_handle: &str,
    ) -> Result<Option<String>, SqlBridgeError> {
        let entry = self.connections.resolve(conn_handle)?;
        let tx_guard = entry.tx_lock();
        Ok(tx_guard.map(|id| id.to_string()))
    }

    /// Behavior a transaction was begun with, by transaction handle.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] once the transaction has
    /// ended.
    pub fn transaction_behavior(&self, tx_handle: &str) -> Result<TxBehavior, SqlBridgeError> {
        Ok(self.transactions.resolve(tx_handle)?.behavior)
    }

    fn with_active_tx<R>(
        &self,
        conn_handle: &str,
        op: impl FnOnce(&rusqlite::Connection, &TransactionEntry) -> Result<R, SqlBridgeError>,
    ) -> Result<R, SqlBridgeError> {
        let entry = self.connections.resolve(conn_handle)?;
        let tx_guard = entry.tx_lock();
        let tx_id = tx_guard.ok_or(SqlBridgeError::NoActiveTransaction)?;
        let tx = self
            .transactions
            .get(tx_id)
            .ok_or(SqlBridgeError::NoActiveTransaction)?;
        tx.check_owner()?;
        let conn = entry.lock();
        op(&conn, &tx)
    }
}

fn rfind_savepoint(stack: &[String], name: &str) -> Result<usize, SqlBridgeError> {
    stack
        .iter()
        .rposition(|existing| existing == name)
        .ok_or_else(|| {
            SqlBridgeError::InvalidIdentifier(format!("no savepoint named {name} is active"))
        })
}
