//! Incremental result consumption.
//!
//! A cursor runs its query once, at open, and hands the materialized rows
//! out in caller-sized chunks. Fetch position is tracked inside the entry so
//! independent cursors never interfere, and a cursor opened inside an
//! explicit transaction is dropped when that transaction ends.

use std::collections::VecDeque;
use std::sync::Mutex;

use uuid::Uuid;

use crate::bridge::{SqlBridge, query_on};
use crate::error::SqlBridgeError;
use crate::results::Row;
use crate::types::Params;

pub(crate) struct CursorEntry {
    pub(crate) conn_id: Uuid,
    /// Set when the cursor was opened inside an explicit transaction.
    pub(crate) tx_id: Option<Uuid>,
    columns: Vec<String>,
    /// Batch size per fetch; zero means no limit.
    max_rows: usize,
    remaining: Mutex<VecDeque<Row>>,
}

impl CursorEntry {
    fn remaining(&self) -> std::sync::MutexGuard<'_, VecDeque<Row>> {
        self.remaining
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SqlBridge {
    /// Run a query and register a cursor over its rows. `max_rows` is the
    /// batch size each fetch returns at most; zero means unlimited.
    ///
    /// # Errors
    ///
    /// Same classification as [`SqlBridge::query`].
    pub fn open_cursor(
        &self,
        conn_handle: &str,
        sql: &str,
        params: &Params,
        max_rows: usize,
    ) -> Result<String, SqlBridgeError> {
        let conn_id = self.connections.parse(conn_handle)?;
        let entry = self.connections.resolve_id(conn_id, conn_handle)?;
        let tx_id = *entry.tx_lock();

        let result = {
            let conn = entry.lock();
            query_on(&conn, sql, params)?
        };
        let columns = result.columns().to_vec();
        let (_, handle) = self.cursors.register(CursorEntry {
            conn_id,
            tx_id,
            columns,
            max_rows,
            remaining: Mutex::new(result.rows.into()),
        });
        tracing::debug!(conn = %conn_handle, %handle, "cursor opened");
        Ok(handle)
    }

    /// Take the next batch from the cursor.
    ///
    /// An exhausted cursor returns an empty batch and stays valid until
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown or closed
    /// cursor handle.
    pub fn fetch_cursor(&self, cursor_handle: &str) -> Result<Vec<Row>, SqlBridgeError> {
        let cursor = self.cursors.resolve(cursor_handle)?;
        let mut remaining = cursor.remaining();
        let take = if cursor.max_rows == 0 {
            remaining.len()
        } else {
            cursor.max_rows.min(remaining.len())
        };
        Ok(remaining.drain(..take).collect())
    }

    /// Column names of the cursor's result, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown or closed
    /// cursor handle.
    pub fn cursor_columns(&self, cursor_handle: &str) -> Result<Vec<String>, SqlBridgeError> {
        Ok(self.cursors.resolve(cursor_handle)?.columns.clone())
    }

    /// Release the cursor and any rows it still holds.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown or already
    /// closed cursor handle.
    pub fn close_cursor(&self, cursor_handle: &str) -> Result<(), SqlBridgeError> {
        self.cursors.remove(cursor_handle)?;
        Ok(())
    }
}
