use sql_bridge::prelude::*;

fn seeded(bridge: &SqlBridge) -> Result<String, SqlBridgeError> {
    let conn = bridge.connect(ConnectOptions::memory())?;
    bridge.execute(&conn, "CREATE TABLE t (id INTEGER PRIMARY KEY)", &Params::None)?;
    for chunk in 0..10 {
        bridge.execute(
            &conn,
            "INSERT INTO t VALUES (?)",
            &Params::positional(vec![Value::Int(chunk + 1)]),
        )?;
    }
    Ok(conn)
}

#[test]
fn cursor_fetches_in_batches() -> Result<(), SqlBridgeError> {
    let bridge = SqlBridge::new();
    let conn = seeded(&bridge)?;

    let cursor = bridge.open_cursor(&conn, "SELECT id FROM t ORDER BY id", &Params::None, 3)?;
    assert_eq!(bridge.cursor_columns(&cursor)?, ["id"]);

    let first = bridge.fetch_cursor(&cursor)?;
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].get("id"), Some(&Value::Int(1)));

    let second = bridge.fetch_cursor(&cursor)?;
    assert_eq!(second[0].get("id"), Some(&Value::Int(4)));

    let third = bridge.fetch_cursor(&cursor)?;
    assert_eq!(third.len(), 3);
    let last = bridge.fetch_cursor(&cursor)?;
    assert_eq!(last.len(), 1);

    // Exhausted but still valid until closed.
    assert!(bridge.fetch_cursor(&cursor)?.is_empty());
    bridge.close_cursor(&cursor)?;
    assert!(matches!(
        bridge.fetch_cursor(&cursor),
        Err(SqlBridgeError::InvalidHandle { .. })
    ));

    // Batch size zero drains everything in one fetch.
    let all = bridge.open_cursor(&conn, "SELECT id FROM t", &Params::None, 0)?;
    assert_eq!(bridge.fetch_cursor(&all)?.len(), 10);
    Ok(())
}

/// Independent cursors over the same connection do not disturb each other's
/// position.
#[test]
fn cursors_are_independent() -> Result<(), SqlBridgeError> {
    let bridge = SqlBridge::new();
    let conn = seeded(&bridge)?;

    let a = bridge.open_cursor(&conn, "SELECT id FROM t ORDER BY id", &Params::None, 1)?;
    let b = bridge.open_cursor(&conn, "SELECT id FROM t ORDER BY id DESC", &Params::None, 1)?;

    assert_eq!(bridge.fetch_cursor(&a)?[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(bridge.fetch_cursor(&b)?[0].get("id"), Some(&Value::Int(10)));
    assert_eq!(bridge.fetch_cursor(&a)?[0].get("id"), Some(&Value::Int(2)));
    Ok(())
}

/// A cursor opened inside an explicit transaction dies with it; one opened
/// outside survives.
#[test]
fn transaction_scoped_cursors_end_with_the_transaction() -> Result<(), SqlBridgeError> {
    let bridge = SqlBridge::new();
    let conn = seeded(&bridge)?;

    let outside = bridge.open_cursor(&conn, "SELECT id FROM t", &Params::None, 0)?;
    bridge.begin(&conn, TxBehavior::Deferred)?;
    let inside = bridge.open_cursor(&conn, "SELECT id FROM t", &Params::None, 0)?;
    bridge.commit(&conn)?;

    assert!(matches!(
        bridge.fetch_cursor(&inside),
        Err(SqlBridgeError::InvalidHandle { .. })
    ));
    assert_eq!(bridge.fetch_cursor(&outside)?.len(), 10);
    Ok(())
}

#[test]
fn replica_sidecar_tracks_sync_watermark() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("replica.db");
    let sidecar = dir.path().join("replica.db-replica.json");
    let bridge = SqlBridge::new();

    let conn = bridge.connect(
        ConnectOptions::at(&path).remote_replica("libsql://primary.example", "token-abc"),
    )?;
    assert!(sidecar.exists());
    assert_eq!(bridge.replica_frame_index(&conn)?, 0);
    assert_eq!(
        bridge.connection_mode(&conn)?,
        ConnectionMode::RemoteReplica {
            path: path.clone(),
            uri: "libsql://primary.example".into()
        }
    );

    let (uri, token) = bridge.replica_remote(&conn)?;
    assert_eq!(uri, "libsql://primary.example");
    assert_eq!(token.expose(), "token-abc");

    bridge.note_sync_completion(&conn, 17)?;
    assert_eq!(bridge.replica_frame_index(&conn)?, 17);
    bridge.disconnect(&conn)?;

    // The watermark survives a reconnect to the same remote.
    let conn = bridge.connect(
        ConnectOptions::at(&path).remote_replica("libsql://primary.example", "token-abc"),
    )?;
    assert_eq!(bridge.replica_frame_index(&conn)?, 17);
    bridge.disconnect(&conn)?;

    // Pointing the local copy at a different remote resets it.
    let conn = bridge.connect(
        ConnectOptions::at(&path).remote_replica("libsql://other.example", "token-abc"),
    )?;
    assert_eq!(bridge.replica_frame_index(&conn)?, 0);
    Ok(())
}

/// Replica mode needs a local file; sync operations need replica mode.
#[test]
fn replica_mode_preconditions() -> Result<(), SqlBridgeError> {
    let bridge = SqlBridge::new();
    assert!(matches!(
        bridge.connect(
            ConnectOptions::memory().remote_replica("libsql://primary.example", "t"),
        ),
        Err(SqlBridgeError::ConnectionError(_))
    ));

    let conn = bridge.connect(ConnectOptions::memory())?;
    assert!(matches!(
        bridge.note_sync_completion(&conn, 1),
        Err(SqlBridgeError::ConnectionError(_))
    ));
    assert!(matches!(
        bridge.replica_frame_index(&conn),
        Err(SqlBridgeError::ConnectionError(_))
    ));
    Ok(())
}
