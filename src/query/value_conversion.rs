//! Value conversion between SeaQuery, may_postgres and flat JSON rows.
//!
//! Bound values go out through [`with_converted_params`]: each SeaQuery value is
//! boxed as a typed `ToSql` parameter, NULLs included, so PostgreSQL sees the
//! same parameter type whether or not a value is present.
//!
//! Rows come back through [`row_to_flat`], which turns a `may_postgres::Row` into a
//! [`FlatRow`] keyed by the column aliases of the SELECT list.

use crate::executor::{FlatRow, LifeError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use may_postgres::types::{ToSql, Type};
use may_postgres::Row;
use sea_query::{Value, Values};
use serde_json::Value as JsonValue;

type Param = Box<dyn ToSql>;

/// Convert SeaQuery values to may_postgres parameters and run `f` with them.
///
/// # Errors
///
/// Returns `LifeError::Other` for value types with no PostgreSQL binding and for
/// unsigned values that do not fit a signed column.
pub fn with_converted_params<F, R>(values: &Values, f: F) -> Result<R, LifeError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, LifeError>,
{
    let owned = values.iter().map(to_param).collect::<Result<Vec<_>, _>>()?;
    let params: Vec<&dyn ToSql> = owned.iter().map(|p| &**p).collect();
    f(&params)
}

fn to_param(value: &Value) -> Result<Param, LifeError> {
    let param: Param = match value {
        Value::Bool(v) => Box::new(*v),
        Value::TinyInt(v) => Box::new(v.map(i16::from)),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::TinyUnsigned(v) => Box::new(v.map(i16::from)),
        Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
        Value::Unsigned(v) => Box::new(v.map(i64::from)),
        Value::BigUnsigned(v) => {
            let signed = match *v {
                Some(u) => Some(i64::try_from(u).map_err(|_| {
                    LifeError::Other(format!(
                        "BigUnsigned value {} exceeds i64::MAX ({}), cannot be safely cast to i64",
                        u,
                        i64::MAX
                    ))
                })?),
                None => None,
            };
            Box::new(signed)
        }
        Value::Float(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.as_ref().map(|s| s.to_string())),
        Value::Char(v) => Box::new(v.map(|c| c.to_string())),
        Value::Bytes(v) => Box::new(v.as_ref().map(|b| b.to_vec())),
        Value::Json(v) => Box::new(v.as_ref().map(|j| JsonValue::clone(j))),
        Value::Uuid(v) => Box::new(v.as_ref().map(|u| uuid::Uuid::clone(u))),
        Value::ChronoDate(v) => Box::new(v.as_ref().map(|d| NaiveDate::clone(d))),
        Value::ChronoTime(v) => Box::new(v.as_ref().map(|t| NaiveTime::clone(t))),
        Value::ChronoDateTime(v) => Box::new(v.as_ref().map(|t| NaiveDateTime::clone(t))),
        Value::ChronoDateTimeUtc(v) => Box::new(v.as_ref().map(|t| DateTime::<Utc>::clone(t))),
        other => {
            return Err(LifeError::Other(format!(
                "Unsupported value type in query: {:?}",
                other
            )))
        }
    };
    Ok(param)
}

/// Convert one `may_postgres::Row` into a [`FlatRow`].
///
/// # Errors
///
/// Returns `LifeError::ParseError` for column types with no JSON mapping.
pub fn row_to_flat(row: &Row) -> Result<FlatRow, LifeError> {
    let mut flat = FlatRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_value(row, idx, column.type_()).map_err(|e| {
            LifeError::ParseError(format!("column \"{}\": {}", column.name(), e))
        })?;
        flat.insert(column.name().to_string(), value);
    }
    Ok(flat)
}

fn column_value(row: &Row, idx: usize, ty: &Type) -> Result<JsonValue, String> {
    fn get<'a, T>(row: &'a Row, idx: usize) -> Result<Option<T>, String>
    where
        T: may_postgres::types::FromSql<'a>,
    {
        row.try_get::<_, Option<T>>(idx).map_err(|e| e.to_string())
    }

    let value = if *ty == Type::BOOL {
        get::<bool>(row, idx)?.map(JsonValue::from)
    } else if *ty == Type::INT2 {
        get::<i16>(row, idx)?.map(JsonValue::from)
    } else if *ty == Type::INT4 {
        get::<i32>(row, idx)?.map(JsonValue::from)
    } else if *ty == Type::INT8 {
        get::<i64>(row, idx)?.map(JsonValue::from)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row, idx)?.map(JsonValue::from)
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row, idx)?.map(JsonValue::from)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME {
        get::<String>(row, idx)?.map(JsonValue::from)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        get::<JsonValue>(row, idx)?
    } else if *ty == Type::UUID {
        get::<uuid::Uuid>(row, idx)?.map(|u| JsonValue::from(u.to_string()))
    } else if *ty == Type::TIMESTAMP {
        get::<chrono::NaiveDateTime>(row, idx)?.map(|t| JsonValue::from(t.to_string()))
    } else if *ty == Type::TIMESTAMPTZ {
        get::<chrono::DateTime<chrono::Utc>>(row, idx)?.map(|t| JsonValue::from(t.to_rfc3339()))
    } else if *ty == Type::DATE {
        get::<chrono::NaiveDate>(row, idx)?.map(|d| JsonValue::from(d.to_string()))
    } else {
        return Err(format!("unsupported column type {}", ty));
    };
    Ok(value.unwrap_or(JsonValue::Null))
}
