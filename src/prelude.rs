//! Everything a typical caller needs, in one import.
//!
//! ```rust
//! use sql_bridge::prelude::*;
//! ```

pub use crate::batch::StatementOutcome;
pub use crate::bridge::{BridgeConfig, SqlBridge, TxOwnership};
pub use crate::connection::{ConnectOptions, ConnectionMode, Secret, StoreLocation};
pub use crate::error::{ConstraintKind, HandleKind, SqlBridgeError};
pub use crate::results::{ResultSet, Row};
pub use crate::statement::ColumnInfo;
pub use crate::types::{ExecOutcome, Params, TxBehavior, Value};
