use chrono::NaiveDate;
use serde_json::json;
use sql_bridge::prelude::*;

fn setup() -> Result<(SqlBridge, String), SqlBridgeError> {
    let bridge = SqlBridge::new();
    let conn = bridge.connect(ConnectOptions::memory())?;
    Ok((bridge, conn))
}

/// All placeholder styles resolve; a question mark inside a string literal
/// is data, not a placeholder.
#[test]
fn placeholder_styles_and_literals() -> Result<(), SqlBridgeError> {
    let (bridge, conn) = setup()?;
    bridge.execute(&conn, "CREATE TABLE t (a INTEGER, b TEXT)", &Params::None)?;
    bridge.execute(
        &conn,
        "INSERT INTO t VALUES (?1, ?2)",
        &Params::positional(vec![Value::Int(1), Value::from("what?")]),
    )?;
    bridge.execute(
        &conn,
        "INSERT INTO t VALUES (:a, @b)",
        &Params::named([("a", Value::Int(2)), ("@b", Value::from("two"))]),
    )?;

    let row = bridge.query_one(
        &conn,
        "SELECT b FROM t WHERE b = 'what?'",
        &Params::None,
    )?;
    assert_eq!(row.get("b"), Some(&Value::Text("what?".into())));

    let row = bridge.query_one(
        &conn,
        "SELECT a FROM t WHERE b = $want",
        &Params::named([("want", Value::from("two"))]),
    )?;
    assert_eq!(row.get("a"), Some(&Value::Int(2)));
    Ok(())
}

#[test]
fn binding_mismatches_are_classified() -> Result<(), SqlBridgeError> {
    let (bridge, conn) = setup()?;
    bridge.execute(&conn, "CREATE TABLE t (a INTEGER)", &Params::None)?;

    // Too few, too many, missing named key, wrong shape.
    for (sql, params) in [
        ("INSERT INTO t VALUES (?)", Params::None),
        (
            "SELECT * FROM t WHERE a = ?",
            Params::positional(vec![Value::Int(1), Value::Int(2)]),
        ),
        (
            "SELECT * FROM t WHERE a = :a",
            Params::named([("other", Value::Int(1))]),
        ),
        (
            "SELECT * FROM t WHERE a = :a",
            Params::positional(vec![Value::Int(1)]),
        ),
        ("SELECT 1", Params::positional(vec![Value::Int(1)])),
    ] {
        assert!(
            matches!(
                bridge.query(&conn, sql, &params),
                Err(SqlBridgeError::BindingError(_))
            ),
            "{sql} should fail to bind"
        );
    }
    Ok(())
}

/// An IN-list bound as a single logical parameter expands to one placeholder
/// per element; the empty list matches nothing instead of failing.
#[test]
fn in_list_expansion() -> Result<(), SqlBridgeError> {
    let (bridge, conn) = setup()?;
    bridge.execute(&conn, "CREATE TABLE t (id INTEGER)", &Params::None)?;
    bridge.execute(
        &conn,
        "INSERT INTO t VALUES (1), (2), (3), (4)",
        &Params::None,
    )?;

    let rs = bridge.query(
        &conn,
        "SELECT id FROM t WHERE id IN (?) ORDER BY id",
        &Params::positional(vec![Value::list([2_i64, 4])]),
    )?;
    let ids: Vec<_> = rs.rows.iter().filter_map(|r| r.get("id")?.as_int()).collect();
    assert_eq!(ids, vec![2, 4]);

    let rs = bridge.query(
        &conn,
        "SELECT id FROM t WHERE id IN (?)",
        &Params::positional(vec![Value::List(Vec::new())]),
    )?;
    assert!(rs.is_empty());

    // A 1-element list behaves like plain equality.
    let rs = bridge.query(
        &conn,
        "SELECT id FROM t WHERE id IN (?)",
        &Params::positional(vec![Value::list([3_i64])]),
    )?;
    assert_eq!(rs.row_count(), 1);
    assert_eq!(rs.rows[0].get("id"), Some(&Value::Int(3)));

    // A list plus a scalar in the same statement.
    let rs = bridge.query(
        &conn,
        "SELECT id FROM t WHERE id IN (:ids) AND id > :floor ORDER BY id",
        &Params::named([
            (":ids", Value::list([1_i64, 2, 3])),
            (":floor", Value::Int(1)),
        ]),
    )?;
    let ids: Vec<_> = rs.rows.iter().filter_map(|r| r.get("id")?.as_int()).collect();
    assert_eq!(ids, vec![2, 3]);
    Ok(())
}

/// Coercions hold round-trip: booleans as 0/1 integers, temporal values and
/// decimals as lossless text, blobs as binary.
#[test]
fn value_round_trips() -> Result<(), SqlBridgeError> {
    let (bridge, conn) = setup()?;
    bridge.execute(
        &conn,
        "CREATE TABLE v (flag INTEGER, day TEXT, ts TEXT, amount TEXT, data BLOB, doc TEXT, gone TEXT)",
        &Params::None,
    )?;

    let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default();
    let ts = day.and_hms_micro_opt(12, 34, 56, 789_012).unwrap_or_default();
    let amount: rust_decimal::Decimal = "12.3400".parse().unwrap_or_default();
    bridge.execute(
        &conn,
        "INSERT INTO v VALUES (?, ?, ?, ?, ?, ?, ?)",
        &Params::positional(vec![
            Value::Bool(true),
            Value::Date(day),
            Value::Timestamp(ts),
            Value::Decimal(amount),
            Value::Blob(vec![0, 159, 146, 150]),
            Value::Json(json!({"k": [1, 2]})),
            Value::Null,
        ]),
    )?;

    let row = bridge.query_one(&conn, "SELECT * FROM v", &Params::None)?;
    assert_eq!(row.get("flag").and_then(Value::as_bool), Some(true));
    assert_eq!(row.get("day").and_then(Value::as_date), Some(day));
    assert_eq!(row.get("ts").and_then(Value::as_timestamp), Some(ts));
    assert_eq!(row.get("amount").and_then(Value::as_decimal), Some(amount));
    assert_eq!(
        row.get("data").and_then(Value::as_blob),
        Some(&[0_u8, 159, 146, 150][..])
    );
    assert_eq!(
        row.get("doc").and_then(Value::as_text),
        Some(r#"{"k":[1,2]}"#)
    );
    assert_eq!(row.get("gone"), Some(&Value::Null));
    assert!(row.get("no_such_column").is_none());
    Ok(())
}
