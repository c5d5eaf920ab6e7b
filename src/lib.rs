//! Resource-management core for a SQLite-family client library.
//!
//! Every native resource (connection, transaction, prepared statement,
//! result cursor) lives behind an opaque string handle issued by a
//! [`SqlBridge`]. Handles cross any boundary as plain strings; the bridge
//! resolves them defensively, classifies every native failure into a closed
//! error taxonomy, and keeps all engine-specific types out of the public
//! surface.

mod batch;
mod binder;
mod bridge;
mod connection;
mod cursor;
mod error;
mod registry;
mod results;
mod statement;
mod transaction;
mod types;

pub mod prelude;

pub use batch::StatementOutcome;
pub use bridge::{BridgeConfig, SqlBridge, TxOwnership};
pub use connection::{ConnectOptions, ConnectionMode, RemoteReplica, Secret, StoreLocation};
pub use error::{ConstraintKind, HandleKind, SqlBridgeError};
pub use results::{ResultSet, Row};
pub use statement::ColumnInfo;
pub use types::{ExecOutcome, Params, TxBehavior, Value};
