//! Multi-statement execution, scripted and transactional.

use crate::binder;
use crate::binder::scanner;
use crate::bridge::{SqlBridge, build_result_set};
use crate::connection::ConnectionEntry;
use crate::error::{SqlBridgeError, translate_native, translate_prepare};
use crate::results::ResultSet;
use crate::types::Params;

/// What one statement of a batch produced.
#[derive(Debug, Clone)]
pub enum StatementOutcome {
    /// The statement returned rows.
    Rows(ResultSet),
    /// The statement changed rows; the count of rows affected.
    Affected(usize),
}

fn run_one(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &Params,
) -> Result<StatementOutcome, SqlBridgeError> {
    let bound = binder::bind(sql, params)?;
    let mut stmt = conn.prepare_cached(&bound.sql).map_err(translate_prepare)?;
    if stmt.column_count() > 0 {
        Ok(StatementOutcome::Rows(build_result_set(
            &mut stmt,
            bound.values,
        )?))
    } else {
        let affected = stmt
            .execute(rusqlite::params_from_iter(bound.values))
            .map_err(translate_native)?;
        Ok(StatementOutcome::Affected(affected))
    }
}

/// Unwind a failed batch: roll it back and resync the autocommit flag so
/// the connection never reports a state it is not in.
fn abort_batch(
    entry: &ConnectionEntry,
    conn: &rusqlite::Connection,
    err: SqlBridgeError,
) -> SqlBridgeError {
    // Best effort; the connection drops the transaction on close even if
    // this fails.
    if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
        tracing::warn!(%rollback_err, "batch rollback failed");
    }
    entry.set_autocommit(conn.is_autocommit());
    err
}

impl SqlBridge {
    /// Split a multi-statement script on top-level semicolons and run the
    /// statements in order, each in its own implicit transaction.
    ///
    /// Execution stops at the first failing statement; earlier statements
    /// keep their effects. Outcomes of the completed statements are returned
    /// in order on success; on failure only the error is returned, and the
    /// completed statements' outcomes are discarded. Callers that need to
    /// know how far a fallible script got should run its statements
    /// individually through [`SqlBridge::execute`] or [`SqlBridge::query`].
    ///
    /// # Errors
    ///
    /// Same classification as [`SqlBridge::execute`], from the first failing
    /// statement.
    pub fn execute_script(
        &self,
        conn_handle: &str,
        script: &str,
    ) -> Result<Vec<StatementOutcome>, SqlBridgeError> {
        let entry = self.connections.resolve(conn_handle)?;
        let statements = scanner::split_statements(script);
        let mut outcomes = Vec::with_capacity(statements.len());

        let autocommit = {
            let conn = entry.lock();
            for statement in &statements {
                outcomes.push(run_one(&conn, statement, &Params::None)?);
            }
            conn.is_autocommit()
        };
        entry.set_autocommit(autocommit);
        Ok(outcomes)
    }

    /// Run every statement of the batch inside a single transaction: all of
    /// them take effect, or none do.
    ///
    /// The whole batch runs under one connection lock, so no statement from
    /// another thread can interleave with it. Refused while an explicit
    /// transaction is open on the connection; the caller's transaction is
    /// never silently committed or extended.
    ///
    /// # Errors
    ///
    /// Returns [`SqlBridgeError::ExecutionError`] if an explicit transaction
    /// is open. Any statement failure rolls the batch back and surfaces the
    /// failing statement's classified error.
    pub fn execute_transactional_batch(
        &self,
        conn_handle: &str,
        statements: &[(String, Params)],
    ) -> Result<Vec<StatementOutcome>, SqlBridgeError> {
        let entry = self.connections.resolve(conn_handle)?;
        let tx_guard = entry.tx_lock();
        if tx_guard.is_some() {
            return Err(SqlBridgeError::ExecutionError(
                "transactional batch refused while an explicit transaction is open".into(),
            ));
        }

        let conn = entry.lock();
        conn.execute_batch("BEGIN IMMEDIATE").map_err(translate_native)?;

        let mut outcomes = Vec::with_capacity(statements.len());
        for (sql, params) in statements {
            match run_one(&conn, sql, params) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => return Err(abort_batch(&entry, &conn, err)),
            }
        }

        // A failed commit (e.g. a reader holding the lock past the busy
        // timeout) also unwinds; the connection must not be left stranded
        // inside the batch's transaction.
        if let Err(err) = conn.execute_batch("COMMIT") {
            return Err(abort_batch(&entry, &conn, translate_native(err)));
        }
        Ok(outcomes)
    }

    /// Split a script and run all of its statements inside a single
    /// transaction.
    ///
    /// # Errors
    ///
    /// Same as [`SqlBridge::execute_transactional_batch`].
    pub fn execute_transactional_script(
        &self,
        conn_handle: &str,
        script: &str,
    ) -> Result<Vec<StatementOutcome>, SqlBridgeError> {
        let statements: Vec<(String, Params)> = scanner::split_statements(script)
            .into_iter()
            .map(|sql| (sql.to_owned(), Params::None))
            .collect();
        self.execute_transactional_batch(conn_handle, &statements)
    }
}
