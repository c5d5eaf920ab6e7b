//! Connection lifecycle: open, ping, reset, interrupt, disconnect.

mod options;
mod replica;

pub use options::{ConnectOptions, RemoteReplica, Secret, StoreLocation};

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::bridge::SqlBridge;
use crate::error::{SqlBridgeError, translate_native};
use replica::ReplicaState;

/// How a connection is backed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Private in-memory store.
    Memory,
    /// Local file-backed store.
    Local(PathBuf),
    /// Local copy of an authoritative remote store.
    RemoteReplica { path: PathBuf, uri: String },
}

pub(crate) struct ReplicaHandle {
    state: Mutex<ReplicaState>,
    auth_token: Secret,
}

/// One live native connection plus the state tracked alongside it.
pub(crate) struct ConnectionEntry {
    conn: Mutex<rusqlite::Connection>,
    interrupt: rusqlite::InterruptHandle,
    pub(crate) mode: ConnectionMode,
    autocommit: AtomicBool,
    encrypted: bool,
    /// Id of the open explicit transaction, if any.
    pub(crate) current_tx: Mutex<Option<Uuid>>,
    pub(crate) replica: Option<ReplicaHandle>,
}

impl ConnectionEntry {
    /// Lock the native connection. A poisoned lock is recovered rather than
    /// propagated: the native handle stays usable after a caller panic.
    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn autocommit(&self) -> bool {
        self.autocommit.load(Ordering::Acquire)
    }

    pub(crate) fn set_autocommit(&self, value: bool) {
        self.autocommit.store(value, Ordering::Release);
    }

    pub(crate) fn tx_lock(&self) -> std::sync::MutexGuard<'_, Option<Uuid>> {
        self.current_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn connect_error(err: impl std::fmt::Display) -> SqlBridgeError {
    SqlBridgeError::ConnectionError(err.to_string())
}

fn open_native(
    options: &ConnectOptions,
) -> Result<(rusqlite::Connection, ConnectionMode), SqlBridgeError> {
    let (conn, mode) = match (&options.location, &options.remote) {
        (StoreLocation::Memory, Some(_)) => {
            return Err(SqlBridgeError::ConnectionError(
                "replica mode requires a file-backed store".into(),
            ));
        }
        (StoreLocation::Memory, None) => (
            rusqlite::Connection::open_in_memory().map_err(connect_error)?,
            ConnectionMode::Memory,
        ),
        (StoreLocation::Path(path), remote) => {
            let conn = rusqlite::Connection::open(path).map_err(connect_error)?;
            let mode = match remote {
                Some(r) => ConnectionMode::RemoteReplica {
                    path: path.clone(),
                    uri: r.uri.clone(),
                },
                None => ConnectionMode::Local(path.clone()),
            };
            (conn, mode)
        }
    };

    if let Some(key) = &options.encryption_key {
        if key.len() < 32 {
            tracing::warn!("encryption key is shorter than the recommended 32 characters");
        }
        conn.pragma_update(None, "key", key.expose())
            .map_err(|e| SqlBridgeError::EncryptionError(e.to_string()))?;
    }

    // Touch the schema now so a wrong key or corrupt store surfaces at
    // connect time instead of at first use.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(()))
        .map_err(translate_native)?;

    if let Some(timeout) = options.busy_timeout {
        conn.busy_timeout(timeout).map_err(translate_native)?;
    }

    if matches!(mode, ConnectionMode::Local(_) | ConnectionMode::RemoteReplica { .. }) {
        // Concurrent readers should not block on an in-progress write.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
    }

    if options.mvcc {
        tracing::debug!("mvcc hint accepted; no-op on this engine");
    }

    Ok((conn, mode))
}

impl SqlBridge {
    /// Open a connection and register it.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::ConnectionError`] if the store cannot be
    /// opened (or replica mode is requested without a file path) and
    /// [`SqlBridgeError::EncryptionError`] if the key does not decrypt a
    /// previously encrypted store.
    pub fn connect(&self, options: ConnectOptions) -> Result<String, SqlBridgeError> {
        let (conn, mode) = open_native(&options)?;

        let replica = match (&options.remote, &mode) {
            (Some(remote), ConnectionMode::RemoteReplica { path, .. }) => {
                let state = ReplicaState::open(path, &remote.uri)?;
                if remote.sync_on_connect {
                    tracing::debug!(uri = %remote.uri, "eager sync requested; awaiting external transport");
                }
                Some(ReplicaHandle {
                    state: Mutex::new(state),
                    auth_token: remote.auth_token.clone(),
                })
            }
            _ => None,
        };

        let autocommit = conn.is_autocommit();
        let entry = ConnectionEntry {
            interrupt: conn.get_interrupt_handle(),
            conn: Mutex::new(conn),
            mode: mode.clone(),
            autocommit: AtomicBool::new(autocommit),
            encrypted: options.encryption_key.is_some(),
            current_tx: Mutex::new(None),
            replica,
        };
        let (_, handle) = self.connections.register(entry);
        tracing::debug!(?mode, %handle, "opened connection");
        Ok(handle)
    }

    /// Verify the connection is alive by running a trivial query.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown handle.
    pub fn ping(&self, handle: &str) -> Result<(), SqlBridgeError> {
        let entry = self.connections.resolve(handle)?;
        let conn = entry.lock();
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(translate_native)
    }

    /// Clear connection-level prepared-statement state. Persisted data and
    /// the connection itself are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown handle.
    pub fn reset(&self, handle: &str) -> Result<(), SqlBridgeError> {
        let entry = self.connections.resolve(handle)?;
        let conn = entry.lock();
        conn.flush_prepared_statement_cache();
        Ok(())
    }

    /// Interrupt the connection's in-flight native call, if any.
    ///
    /// Safe on an idle connection, safe to call repeatedly, and never affects
    /// other connections to the same store. Does not wait for the lock held
    /// by the running call.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown handle.
    pub fn interrupt(&self, handle: &str) -> Result<(), SqlBridgeError> {
        let entry = self.connections.resolve(handle)?;
        entry.interrupt.interrupt();
        tracing::debug!(%handle, "interrupt requested");
        Ok(())
    }

    /// Close the connection and drop every transaction, statement, and
    /// cursor that referenced it. An open transaction is rolled back by the
    /// engine when the native handle closes.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown handle; a
    /// second disconnect with the same handle fails the same way.
    pub fn disconnect(&self, handle: &str) -> Result<(), SqlBridgeError> {
        let entry = self.connections.remove(handle)?;
        let id = self.connections.parse(handle)?;
        self.transactions.retain(|tx| tx.conn_id != id);
        self.statements.retain(|stmt| stmt.conn_id != id);
        self.cursors.retain(|cursor| cursor.conn_id != id);
        drop(entry);
        tracing::debug!(%handle, "closed connection");
        Ok(())
    }

    /// Whether the connection is currently in autocommit mode (no open
    /// explicit transaction).
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown handle.
    pub fn autocommit(&self, handle: &str) -> Result<bool, SqlBridgeError> {
        Ok(self.connections.resolve(handle)?.autocommit())
    }

    /// Whether the connection was opened with an encryption key.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown handle.
    pub fn is_encrypted(&self, handle: &str) -> Result<bool, SqlBridgeError> {
        Ok(self.connections.resolve(handle)?.encrypted)
    }

    /// The connection's backing mode.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::InvalidHandle`] for an unknown handle.
    pub fn connection_mode(&self, handle: &str) -> Result<ConnectionMode, SqlBridgeError> {
        Ok(self.connections.resolve(handle)?.mode.clone())
    }

    /// Record a sync-completion signal from the external replication
    /// transport, persisting the new frame watermark to the sidecar.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::ConnectionError`] if the connection is not
    /// in replica mode.
    pub fn note_sync_completion(
        &self,
        handle: &str,
        frame_index: u64,
    ) -> Result<(), SqlBridgeError> {
        let entry = self.connections.resolve(handle)?;
        let replica = entry.replica.as_ref().ok_or_else(|| {
            SqlBridgeError::ConnectionError("connection is not in replica mode".into())
        })?;
        let mut state = replica
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.record_sync(frame_index)?;
        tracing::debug!(%handle, frame_index, "sync completion recorded");
        Ok(())
    }

    /// The last sync watermark recorded for a replica connection.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::ConnectionError`] if the connection is not
    /// in replica mode.
    pub fn replica_frame_index(&self, handle: &str) -> Result<u64, SqlBridgeError> {
        let entry = self.connections.resolve(handle)?;
        let replica = entry.replica.as_ref().ok_or_else(|| {
            SqlBridgeError::ConnectionError("connection is not in replica mode".into())
        })?;
        let state = replica
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(state.frame_index())
    }

    /// Remote descriptor for the external sync transport: the authoritative
    /// URI and the auth token supplied at connect.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::ConnectionError`] if the connection is not
    /// in replica mode.
    pub fn replica_remote(&self, handle: &str) -> Result<(String, Secret), SqlBridgeError> {
        let entry = self.connections.resolve(handle)?;
        let replica = entry.replica.as_ref().ok_or_else(|| {
            SqlBridgeError::ConnectionError("connection is not in replica mode".into())
        })?;
        let state = replica
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok((state.uri().to_owned(), replica.auth_token.clone()))
    }
}
