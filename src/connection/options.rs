use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A sensitive string (encryption key, auth token) that is held for the
/// lifetime of a connection but never printed or logged.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// Read the wrapped value, e.g. to hand an auth token to the external
    /// sync transport. Deliberately not implemented via `Display`/`Debug`.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret(value.to_owned())
    }
}

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Private in-memory store.
    Memory,
    /// File-backed store.
    Path(PathBuf),
}

/// Remote-replica settings: the authoritative remote store this local copy
/// replicates. The sync transport itself is external; only its completion
/// signal and frame watermark are consumed by this crate.
#[derive(Debug, Clone)]
pub struct RemoteReplica {
    pub(crate) uri: String,
    pub(crate) auth_token: Secret,
    pub(crate) sync_on_connect: bool,
}

/// Options accepted by [`crate::SqlBridge::connect`].
///
/// ```rust
/// use std::time::Duration;
/// use sql_bridge::prelude::*;
///
/// let options = ConnectOptions::at("app.db")
///     .busy_timeout(Duration::from_millis(250))
///     .encryption_key("0123456789abcdef0123456789abcdef");
/// # let _ = options;
/// ```
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub(crate) location: StoreLocation,
    pub(crate) remote: Option<RemoteReplica>,
    pub(crate) busy_timeout: Option<Duration>,
    pub(crate) encryption_key: Option<Secret>,
    pub(crate) mvcc: bool,
}

impl ConnectOptions {
    /// Open a private in-memory store.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            remote: None,
            busy_timeout: None,
            encryption_key: None,
            mvcc: false,
        }
    }

    /// Open a file-backed store at `path`; the literal `:memory:` is accepted
    /// and maps to an in-memory store.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.as_os_str() == ":memory:" {
            return Self::memory();
        }
        Self {
            location: StoreLocation::Path(path),
            ..Self::memory()
        }
    }

    /// Enable remote-replica mode against an authoritative remote store.
    #[must_use]
    pub fn remote_replica(mut self, uri: impl Into<String>, auth_token: impl Into<Secret>) -> Self {
        self.remote = Some(RemoteReplica {
            uri: uri.into(),
            auth_token: auth_token.into(),
            sync_on_connect: false,
        });
        self
    }

    /// Request an eager sync when the connection opens (replica mode only).
    #[must_use]
    pub fn sync_on_connect(mut self, sync: bool) -> Self {
        if let Some(remote) = &mut self.remote {
            remote.sync_on_connect = sync;
        }
        self
    }

    /// Maximum time a write waits for a conflicting lock before failing with
    /// `BusyOrLocked`.
    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Open or derive an encrypted store with this key (32+ characters
    /// recommended). A wrong key on an encrypted store fails with
    /// `EncryptionError`.
    #[must_use]
    pub fn encryption_key(mut self, key: impl Into<Secret>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Best-effort MVCC hint; accepted and ignored by this engine.
    #[must_use]
    pub fn mvcc(mut self, mvcc: bool) -> Self {
        self.mvcc = mvcc;
        self
    }
}
