use std::fmt;

use thiserror::Error;

/// Which registry a handle was expected to reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Connection,
    Transaction,
    Statement,
    Cursor,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HandleKind::Connection => "connection",
            HandleKind::Transaction => "transaction",
            HandleKind::Statement => "statement",
            HandleKind::Cursor => "cursor",
        };
        f.write_str(label)
    }
}

/// Which kind of constraint a [`SqlBridgeError::ConstraintViolation`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    PrimaryKey,
    ForeignKey,
    Check,
    NotNull,
    Other,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::PrimaryKey => "primary key",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::Check => "check",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// Closed error taxonomy for every public operation.
///
/// All native-engine failures pass through [`translate_native`] (or the
/// prepare-time variant) before reaching a caller; nothing in this crate
/// panics on a failed lookup or a failed native call.
#[derive(Debug, Error)]
pub enum SqlBridgeError {
    #[error("unknown or invalid {kind} handle: {handle}")]
    InvalidHandle { kind: HandleKind, handle: String },

    #[error("SQL failed to compile: {0}")]
    PrepareError(String),

    #[error("{kind} constraint violation: {message}")]
    ConstraintViolation {
        kind: ConstraintKind,
        message: String,
    },

    #[error("database busy or locked: {0}")]
    BusyOrLocked(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("parameter binding error: {0}")]
    BindingError(String),

    #[error("no active transaction on this connection")]
    NoActiveTransaction,

    #[error("cannot open or decrypt store: {0}")]
    EncryptionError(String),

    #[error("query matched no rows")]
    NotFound,

    #[error("query expected one row but matched {0}")]
    MultipleRows(usize),

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("operation interrupted")]
    Interrupted,

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl SqlBridgeError {
    /// Build an `InvalidHandle`, truncating adversarial handle strings so an
    /// oversized or binary-laden input cannot balloon the error message.
    pub(crate) fn invalid_handle(kind: HandleKind, handle: &str) -> Self {
        let mut shown: String = handle.chars().take(48).filter(|c| !c.is_control()).collect();
        if handle.chars().count() > 48 {
            shown.push('…');
        }
        SqlBridgeError::InvalidHandle { kind, handle: shown }
    }
}

fn failure_message(err: &rusqlite::ffi::Error, message: Option<String>) -> String {
    message.unwrap_or_else(|| err.to_string())
}

fn constraint_kind(extended_code: i32) -> ConstraintKind {
    use rusqlite::ffi;
    match extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE => ConstraintKind::Unique,
        ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::PrimaryKey,
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
        ffi::SQLITE_CONSTRAINT_CHECK => ConstraintKind::Check,
        ffi::SQLITE_CONSTRAINT_NOTNULL => ConstraintKind::NotNull,
        _ => ConstraintKind::Other,
    }
}

/// Classify a native failure from an execute/query/commit path.
pub(crate) fn translate_native(err: rusqlite::Error) -> SqlBridgeError {
    use rusqlite::ErrorCode;
    match err {
        rusqlite::Error::SqliteFailure(e, message) => match e.code {
            ErrorCode::ConstraintViolation => SqlBridgeError::ConstraintViolation {
                kind: constraint_kind(e.extended_code),
                message: failure_message(&e, message),
            },
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                SqlBridgeError::BusyOrLocked(failure_message(&e, message))
            }
            ErrorCode::NotADatabase => {
                SqlBridgeError::EncryptionError(failure_message(&e, message))
            }
            ErrorCode::OperationInterrupted => SqlBridgeError::Interrupted,
            ErrorCode::CannotOpen => SqlBridgeError::ConnectionError(failure_message(&e, message)),
            _ => SqlBridgeError::ExecutionError(failure_message(&e, message)),
        },
        rusqlite::Error::QueryReturnedNoRows => SqlBridgeError::NotFound,
        rusqlite::Error::InvalidColumnIndex(index) => {
            SqlBridgeError::IndexOutOfBounds { index, len: 0 }
        }
        other => SqlBridgeError::ExecutionError(other.to_string()),
    }
}

/// Classify a native failure from a prepare path, where a generic engine
/// error means the SQL did not compile.
pub(crate) fn translate_prepare(err: rusqlite::Error) -> SqlBridgeError {
    use rusqlite::ErrorCode;
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::NotADatabase
            ) =>
        {
            translate_native(err)
        }
        _ => SqlBridgeError::PrepareError(err.to_string()),
    }
}

impl From<rusqlite::Error> for SqlBridgeError {
    fn from(err: rusqlite::Error) -> Self {
        translate_native(err)
    }
}
