//! Positional query parameters and their per-driver binding

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySql, MySqlArguments};
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// Scalar parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl QueryParam {
    /// Best-effort typing of a command-line value
    pub fn infer(raw: &str) -> QueryParam {
        if raw.eq_ignore_ascii_case("null") {
            return QueryParam::Null;
        }
        if let Ok(b) = raw.to_lowercase().parse::<bool>() {
            return QueryParam::Bool(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return QueryParam::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return QueryParam::Float(f);
            }
        }
        QueryParam::Text(raw.to_string())
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        QueryParam::Int(value)
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        QueryParam::Float(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        QueryParam::Bool(value)
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        QueryParam::Text(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        QueryParam::Text(value)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(QueryParam::Null)
    }
}

impl ToSql for QueryParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            QueryParam::Null => ToSqlOutput::Owned(SqliteValue::Null),
            QueryParam::Bool(b) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*b))),
            QueryParam::Int(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            QueryParam::Float(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            QueryParam::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

pub(crate) fn bind_postgres<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [QueryParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(b) => query.bind(*b),
            QueryParam::Int(i) => query.bind(*i),
            QueryParam::Float(f) => query.bind(*f),
            QueryParam::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

pub(crate) fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [QueryParam],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(b) => query.bind(*b),
            QueryParam::Int(i) => query.bind(*i),
            QueryParam::Float(f) => query.bind(*f),
            QueryParam::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer() {
        assert_eq!(QueryParam::infer("42"), QueryParam::Int(42));
        assert_eq!(QueryParam::infer("-1.5"), QueryParam::Float(-1.5));
        assert_eq!(QueryParam::infer("TRUE"), QueryParam::Bool(true));
        assert_eq!(QueryParam::infer("null"), QueryParam::Null);
        assert_eq!(QueryParam::infer("inf"), QueryParam::Text("inf".to_string()));
        assert_eq!(QueryParam::infer("alice"), QueryParam::Text("alice".to_string()));
    }

    #[test]
    fn test_untagged_json() {
        let params: Vec<QueryParam> = serde_json::from_str(r#"[1, 2.5, "x", true, null]"#).unwrap();
        assert_eq!(
            params,
            vec![
                QueryParam::Int(1),
                QueryParam::Float(2.5),
                QueryParam::Text("x".to_string()),
                QueryParam::Bool(true),
                QueryParam::Null,
            ]
        );
    }

    #[test]
    fn test_option_into_null() {
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some("a")), QueryParam::Text("a".to_string()));
    }
}
