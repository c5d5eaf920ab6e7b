//! Normalizes caller-supplied parameter shapes into engine bind calls.
//!
//! Positional, numbered, and named placeholders are resolved once here, and
//! every scalar coercion (bool to 0/1, temporal values to ISO-8601 text,
//! decimals to exact text, blobs passed through as binary) happens before the
//! native engine sees a value. A [`Value::List`] bound at a single
//! placeholder is expanded into one engine placeholder per element; it is
//! never serialized into a single text blob.

pub(crate) mod scanner;

use std::borrow::Cow;

use crate::error::SqlBridgeError;
use crate::types::{Params, Value};
use scanner::{Placeholder, PlaceholderKind};

/// SQL ready for the engine: possibly rewritten text plus flat bind values.
#[derive(Debug)]
pub(crate) struct BoundSql<'a> {
    pub sql: Cow<'a, str>,
    pub values: Vec<rusqlite::types::Value>,
}

/// Coerce one scalar into the engine's value type.
pub(crate) fn scalar_to_native(
    value: &Value,
) -> Result<rusqlite::types::Value, SqlBridgeError> {
    use rusqlite::types::Value as Native;
    match value {
        Value::Null => Ok(Native::Null),
        Value::Int(i) => Ok(Native::Integer(*i)),
        Value::Float(f) => Ok(Native::Real(*f)),
        Value::Text(s) => Ok(Native::Text(s.clone())),
        Value::Bool(b) => Ok(Native::Integer(i64::from(*b))),
        Value::Date(d) => Ok(Native::Text(d.format("%Y-%m-%d").to_string())),
        Value::Time(t) => Ok(Native::Text(t.format("%H:%M:%S%.f").to_string())),
        Value::Timestamp(ts) => Ok(Native::Text(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Value::Decimal(d) => Ok(Native::Text(d.to_string())),
        Value::Blob(bytes) => Ok(Native::Blob(bytes.clone())),
        Value::Json(j) => Ok(Native::Text(j.to_string())),
        Value::List(_) => Err(SqlBridgeError::BindingError(
            "nested list values cannot be bound".into(),
        )),
    }
}

/// Read one engine value back into a [`Value`].
pub(crate) fn native_to_value(native: rusqlite::types::Value) -> Value {
    use rusqlite::types::Value as Native;
    match native {
        Native::Null => Value::Null,
        Native::Integer(i) => Value::Int(i),
        Native::Real(f) => Value::Float(f),
        Native::Text(s) => Value::Text(s),
        Native::Blob(b) => Value::Blob(b),
    }
}

/// Resolve `params` against the placeholders in `sql`.
///
/// Returns the SQL unchanged (borrowed) when no rewriting is needed; rewrites
/// to flat anonymous `?` placeholders when named or numbered placeholders or
/// list expansion are involved.
///
/// # Errors
///
/// Returns [`SqlBridgeError::BindingError`] on positional arity mismatch, a
/// named placeholder absent from the mapping, positional values supplied for
/// named placeholders (or vice versa), or a nested list. Extra mapping keys
/// with no matching placeholder are silently ignored.
pub(crate) fn bind<'a>(sql: &'a str, params: &Params) -> Result<BoundSql<'a>, SqlBridgeError> {
    let placeholders = scanner::scan_placeholders(sql);

    if placeholders.is_empty() {
        if let Params::Positional(values) = params
            && !values.is_empty()
        {
            return Err(SqlBridgeError::BindingError(format!(
                "SQL has no placeholders but {} positional parameters were supplied",
                values.len()
            )));
        }
        return Ok(BoundSql {
            sql: Cow::Borrowed(sql),
            values: Vec::new(),
        });
    }

    let resolved = resolve_placeholders(&placeholders, params)?;

    let needs_rewrite = resolved
        .iter()
        .zip(&placeholders)
        .any(|(value, placeholder)| {
            matches!(value, Value::List(_)) || placeholder.kind != PlaceholderKind::Anonymous
        });

    if !needs_rewrite {
        let values = resolved
            .iter()
            .map(scalar_to_native)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(BoundSql {
            sql: Cow::Borrowed(sql),
            values,
        });
    }

    rewrite(sql, &placeholders, &resolved)
}

/// Pick the value for each placeholder, in source order.
fn resolve_placeholders(
    placeholders: &[Placeholder],
    params: &Params,
) -> Result<Vec<Value>, SqlBridgeError> {
    match params {
        Params::None => {
            if placeholders.is_empty() {
                Ok(Vec::new())
            } else {
                Err(SqlBridgeError::BindingError(format!(
                    "SQL has {} placeholders but no parameters were supplied",
                    placeholders.len()
                )))
            }
        }
        Params::Positional(values) => resolve_positional(placeholders, values),
        Params::Named(map) => placeholders
            .iter()
            .map(|placeholder| match &placeholder.kind {
                PlaceholderKind::Named(text) => lookup_named(map, text),
                PlaceholderKind::Anonymous | PlaceholderKind::Numbered(_) => {
                    Err(SqlBridgeError::BindingError(
                        "positional placeholder cannot be bound from a named mapping".into(),
                    ))
                }
            })
            .collect(),
    }
}

fn resolve_positional(
    placeholders: &[Placeholder],
    values: &[Value],
) -> Result<Vec<Value>, SqlBridgeError> {
    let mut highest = 0usize;
    let mut resolved = Vec::with_capacity(placeholders.len());
    for placeholder in placeholders {
        let index = match &placeholder.kind {
            // A bare `?` takes the next index after the highest seen so far,
            // matching the engine's numbering rule.
            PlaceholderKind::Anonymous => highest + 1,
            PlaceholderKind::Numbered(n) => *n,
            PlaceholderKind::Named(text) => {
                return Err(SqlBridgeError::BindingError(format!(
                    "named placeholder {text} cannot be bound from a positional sequence"
                )));
            }
        };
        if index == 0 || index > values.len() {
            return Err(SqlBridgeError::BindingError(format!(
                "placeholder {index} has no matching parameter ({} supplied)",
                values.len()
            )));
        }
        highest = highest.max(index);
        resolved.push(values[index - 1].clone());
    }
    if highest < values.len() {
        return Err(SqlBridgeError::BindingError(format!(
            "{} parameters supplied but only {highest} referenced",
            values.len()
        )));
    }
    Ok(resolved)
}

/// Exact, case-sensitive match on the prefixed placeholder text; a bare key
/// (without the prefix character) also matches.
fn lookup_named(
    map: &std::collections::HashMap<String, Value>,
    placeholder: &str,
) -> Result<Value, SqlBridgeError> {
    if let Some(value) = map.get(placeholder) {
        return Ok(value.clone());
    }
    if let Some(value) = map.get(&placeholder[1..]) {
        return Ok(value.clone());
    }
    Err(SqlBridgeError::BindingError(format!(
        "no value supplied for placeholder {placeholder}"
    )))
}

/// Rebuild the SQL with anonymous `?` placeholders, expanding lists.
fn rewrite<'a>(
    sql: &str,
    placeholders: &[Placeholder],
    resolved: &[Value],
) -> Result<BoundSql<'a>, SqlBridgeError> {
    let mut out = String::with_capacity(sql.len() + 16);
    let mut values = Vec::with_capacity(resolved.len());
    let mut cursor = 0;

    for (placeholder, value) in placeholders.iter().zip(resolved) {
        out.push_str(&sql[cursor..placeholder.start]);
        match value {
            Value::List(items) => {
                if items.is_empty() {
                    // `IN ()` is a syntax error; `IN (NULL)` matches nothing.
                    out.push_str("NULL");
                } else {
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        out.push('?');
                        values.push(scalar_to_native(item)?);
                    }
                }
            }
            scalar => {
                out.push('?');
                values.push(scalar_to_native(scalar)?);
            }
        }
        cursor = placeholder.end;
    }
    out.push_str(&sql[cursor..]);

    Ok(BoundSql {
        sql: Cow::Owned(out),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn positional(values: Vec<Value>) -> Params {
        Params::Positional(values)
    }

    #[test]
    fn anonymous_placeholders_pass_through_borrowed() {
        let bound = bind(
            "insert into t values (?, ?)",
            &positional(vec![Value::Int(1), Value::Text("a".into())]),
        )
        .unwrap();
        assert!(matches!(bound.sql, Cow::Borrowed(_)));
        assert_eq!(bound.values.len(), 2);
    }

    #[test]
    fn numbered_placeholders_reorder() {
        let bound = bind(
            "select ?2, ?1",
            &positional(vec![Value::Int(10), Value::Int(20)]),
        )
        .unwrap();
        assert_eq!(bound.sql, "select ?, ?");
        assert_eq!(
            bound.values,
            vec![
                rusqlite::types::Value::Integer(20),
                rusqlite::types::Value::Integer(10)
            ]
        );
    }

    #[test]
    fn named_placeholders_match_with_and_without_prefix() {
        let params = Params::named([(":id", Value::Int(5)), ("who", Value::Text("x".into()))]);
        let bound = bind("select :id, @who", &params).unwrap();
        assert_eq!(bound.sql, "select ?, ?");
        assert_eq!(bound.values.len(), 2);
    }

    #[test]
    fn prefixed_key_wins_over_bare() {
        let params = Params::named([("id", Value::Int(1)), (":id", Value::Int(2))]);
        let bound = bind("select :id", &params).unwrap();
        assert_eq!(bound.values, vec![rusqlite::types::Value::Integer(2)]);
    }

    #[test]
    fn extra_named_keys_are_ignored_missing_is_an_error() {
        let params = Params::named([(":id", Value::Int(5)), (":unused", Value::Int(9))]);
        assert!(bind("select :id", &params).is_ok());

        let err = bind("select :id, :missing", &params).unwrap_err();
        assert!(matches!(err, SqlBridgeError::BindingError(_)));
        assert!(err.to_string().contains(":missing"));
    }

    #[test]
    fn arity_mismatch_is_a_binding_error() {
        assert!(matches!(
            bind("select ?, ?", &positional(vec![Value::Int(1)])),
            Err(SqlBridgeError::BindingError(_))
        ));
        assert!(matches!(
            bind("select ?", &positional(vec![Value::Int(1), Value::Int(2)])),
            Err(SqlBridgeError::BindingError(_))
        ));
        assert!(matches!(
            bind("select 1", &positional(vec![Value::Int(1)])),
            Err(SqlBridgeError::BindingError(_))
        ));
    }

    #[test]
    fn list_expansion_produces_one_placeholder_per_element() {
        let bound = bind(
            "select * from t where x in (?)",
            &positional(vec![Value::list([1_i64, 2, 3])]),
        )
        .unwrap();
        assert_eq!(bound.sql, "select * from t where x in (?,?,?)");
        assert_eq!(bound.values.len(), 3);
    }

    #[test]
    fn empty_list_matches_nothing() {
        let bound = bind(
            "select * from t where x in (?)",
            &positional(vec![Value::List(Vec::new())]),
        )
        .unwrap();
        assert_eq!(bound.sql, "select * from t where x in (NULL)");
        assert!(bound.values.is_empty());
    }

    #[test]
    fn nested_list_is_rejected() {
        let err = bind(
            "select * from t where x in (?)",
            &positional(vec![Value::List(vec![Value::list([1_i64])])]),
        )
        .unwrap_err();
        assert!(matches!(err, SqlBridgeError::BindingError(_)));
    }

    #[test]
    fn scalar_coercions() {
        use rusqlite::types::Value as Native;
        assert_eq!(
            scalar_to_native(&Value::Bool(true)).unwrap(),
            Native::Integer(1)
        );
        assert_eq!(
            scalar_to_native(&Value::Date(
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
            ))
            .unwrap(),
            Native::Text("2024-01-15".into())
        );
        let dec: rust_decimal::Decimal = "12.3400".parse().unwrap();
        assert_eq!(
            scalar_to_native(&Value::Decimal(dec)).unwrap(),
            Native::Text("12.3400".into())
        );
        let ts = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_micro_opt(10, 30, 0, 123_456)
            .unwrap();
        assert_eq!(
            scalar_to_native(&Value::Timestamp(ts)).unwrap(),
            Native::Text("2024-01-15T10:30:00.123456".into())
        );
    }
}
