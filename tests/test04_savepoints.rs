use sql_bridge::prelude::*;

fn setup() -> Result<(SqlBridge, String), SqlBridgeError> {
    let bridge = SqlBridge::new();
    let conn = bridge.connect(ConnectOptions::memory())?;
    bridge.execute(
        &conn,
        "CREATE TABLE ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL)",
        &Params::None,
    )?;
    Ok((bridge, conn))
}

fn ids(bridge: &SqlBridge, conn: &str) -> Result<Vec<i64>, SqlBridgeError> {
    let rs = bridge.query(conn, "SELECT id FROM ledger ORDER BY id", &Params::None)?;
    Ok(rs
        .rows
        .iter()
        .filter_map(|row| row.get("id").and_then(Value::as_int))
        .collect())
}

/// The recovery scenario: a failing statement mid-transaction does not kill
/// the transaction; rolling back to a savepoint discards only the work after
/// it, and the commit keeps everything before it.
#[test]
fn savepoint_recovery_after_constraint_failure() -> Result<(), SqlBridgeError> {
    let (bridge, conn) = setup()?;

    bridge.begin(&conn, TxBehavior::Immediate)?;
    bridge.execute(&conn, "INSERT INTO ledger VALUES (1, 100)", &Params::None)?;
    bridge.create_savepoint(&conn, "before_risky")?;
    bridge.execute(&conn, "INSERT INTO ledger VALUES (2, 200)", &Params::None)?;

    // Duplicate primary key fails but leaves the transaction open.
    let err = bridge
        .execute(&conn, "INSERT INTO ledger VALUES (1, 999)", &Params::None)
        .unwrap_err();
    assert!(matches!(
        err,
        SqlBridgeError::ConstraintViolation {
            kind: ConstraintKind::PrimaryKey,
            ..
        }
    ));

    bridge.rollback_to_savepoint(&conn, "before_risky")?;
    assert!(bridge.savepoints(&conn)?.is_empty());
    bridge.execute(&conn, "INSERT INTO ledger VALUES (3, 300)", &Params::None)?;
    bridge.commit(&conn)?;

    assert_eq!(ids(&bridge, &conn)?, vec![1, 3]);
    Ok(())
}

/// A savepoint created before any work: rolling back to it discards the
/// whole transaction's work so far but keeps the transaction open.
#[test]
fn rollback_to_initial_savepoint_discards_everything_since() -> Result<(), SqlBridgeError> {
    let bridge = SqlBridge::new();
    let conn = bridge.connect(ConnectOptions::memory())?;
    bridge.execute(
        &conn,
        "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)",
        &Params::None,
    )?;

    bridge.begin(&conn, TxBehavior::Deferred)?;
    bridge.create_savepoint(&conn, "sp1")?;
    bridge.execute(
        &conn,
        "INSERT INTO t VALUES (1, 'a')",
        &Params::None,
    )?;
    assert!(matches!(
        bridge.execute(&conn, "INSERT INTO t VALUES (1, 'b')", &Params::None),
        Err(SqlBridgeError::ConstraintViolation { .. })
    ));
    bridge.rollback_to_savepoint(&conn, "sp1")?;
    bridge.execute(
        &conn,
        "INSERT INTO t VALUES (2, 'b')",
        &Params::None,
    )?;
    bridge.commit(&conn)?;

    let row = bridge.query_one(&conn, "SELECT count(*) AS n FROM t", &Params::None)?;
    assert_eq!(row.get("n"), Some(&Value::Int(1)));
    Ok(())
}

#[test]
fn release_keeps_effects_rollback_to_discards_them() -> Result<(), SqlBridgeError> {
    let (bridge, conn) = setup()?;

    bridge.begin(&conn, TxBehavior::Deferred)?;
    bridge.execute(&conn, "INSERT INTO ledger VALUES (1, 1)", &Params::None)?;
    bridge.create_savepoint(&conn, "a")?;
    bridge.execute(&conn, "INSERT INTO ledger VALUES (2, 2)", &Params::None)?;
    bridge.create_savepoint(&conn, "b")?;
    bridge.execute(&conn, "INSERT INTO ledger VALUES (3, 3)", &Params::None)?;
    assert_eq!(bridge.savepoints(&conn)?, vec!["a", "b"]);

    // Releasing `a` removes `b` too but keeps both inserts.
    bridge.release_savepoint(&conn, "a")?;
    assert!(bridge.savepoints(&conn)?.is_empty());
    assert!(matches!(
        bridge.rollback_to_savepoint(&conn, "b"),
        Err(SqlBridgeError::InvalidIdentifier(_))
    ));
    bridge.commit(&conn)?;
    assert_eq!(ids(&bridge, &conn)?, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn fifty_deep_nesting_unwinds_correctly() -> Result<(), SqlBridgeError> {
    let (bridge, conn) = setup()?;
    bridge.begin(&conn, TxBehavior::Deferred)?;

    for depth in 0..50 {
        bridge.create_savepoint(&conn, &format!("sp{depth}"))?;
        bridge.execute(
            &conn,
            "INSERT INTO ledger VALUES (?, 0)",
            &Params::positional(vec![Value::Int(depth + 1)]),
        )?;
    }
    assert_eq!(bridge.savepoints(&conn)?.len(), 50);

    // Unwind to the 10th savepoint: rows 11..=50 disappear.
    bridge.rollback_to_savepoint(&conn, "sp10")?;
    assert_eq!(bridge.savepoints(&conn)?.len(), 10);
    bridge.commit(&conn)?;
    assert_eq!(ids(&bridge, &conn)?, (1..=10).collect::<Vec<i64>>());
    Ok(())
}

/// Duplicate savepoint names resolve to the most recent one.
#[test]
fn duplicate_names_resolve_innermost() -> Result<(), SqlBridgeError> {
    let (bridge, conn) = setup()?;
    bridge.begin(&conn, TxBehavior::Deferred)?;
    bridge.execute(&conn, "INSERT INTO ledger VALUES (1, 1)", &Params::None)?;
    bridge.create_savepoint(&conn, "sp")?;
    bridge.execute(&conn, "INSERT INTO ledger VALUES (2, 2)", &Params::None)?;
    bridge.create_savepoint(&conn, "sp")?;
    bridge.execute(&conn, "INSERT INTO ledger VALUES (3, 3)", &Params::None)?;

    bridge.rollback_to_savepoint(&conn, "sp")?;
    assert_eq!(bridge.savepoints(&conn)?, vec!["sp"]);
    bridge.commit(&conn)?;
    assert_eq!(ids(&bridge, &conn)?, vec![1, 2]);
    Ok(())
}

/// Names outside the allow-list grammar are rejected before any SQL is
/// built, and savepoint operations outside a transaction are refused.
#[test]
fn name_validation_and_state_checks() -> Result<(), SqlBridgeError> {
    let (bridge, conn) = setup()?;

    assert!(matches!(
        bridge.create_savepoint(&conn, "x; DROP TABLE ledger"),
        Err(SqlBridgeError::NoActiveTransaction) | Err(SqlBridgeError::InvalidIdentifier(_))
    ));

    bridge.begin(&conn, TxBehavior::Deferred)?;
    for bad in ["", "1st", "sp 1", "sp\"x", "sp'--", "срt"] {
        assert!(matches!(
            bridge.create_savepoint(&conn, bad),
            Err(SqlBridgeError::InvalidIdentifier(_))
        ));
    }
    assert!(matches!(
        bridge.rollback_to_savepoint(&conn, "never_created"),
        Err(SqlBridgeError::InvalidIdentifier(_))
    ));
    bridge.rollback(&conn)?;

    assert!(matches!(
        bridge.create_savepoint(&conn, "fine_name"),
        Err(SqlBridgeError::NoActiveTransaction)
    ));
    assert!(matches!(
        bridge.savepoints(&conn),
        Err(SqlBridgeError::NoActiveTransaction)
    ));

    // The table survived the injection attempt.
    bridge.query(&conn, "SELECT * FROM ledger", &Params::None)?;
    Ok(())
}
