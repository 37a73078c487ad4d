use querygate::execution::SqliteEngine;
use querygate::{
    NlQueryRequest, OperationKind, QueryError, QueryExecutor, QueryParam, QueryPipeline, RawQueryRequest, SchemaCache,
    SchemaRequest, SqlDialect, SqlValidator, Translator, ValidateRequest,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const SETUP: &[&str] = &[
    "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT, age INTEGER, created_at TEXT)",
    "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, status TEXT, total REAL, created_at TEXT)",
    "INSERT INTO users (name, email, age, created_at) VALUES ('ada', 'ada@example.com', 36, datetime('now', '-2 days'))",
    "INSERT INTO users (name, email, age, created_at) VALUES ('brian', 'brian@example.com', 17, datetime('now', '-30 days'))",
    "INSERT INTO users (name, email, age, created_at) VALUES ('chen', NULL, 52, datetime('now', '-1 days'))",
    "INSERT INTO orders (user_id, status, total, created_at) VALUES (1, 'new', 10.5, datetime('now'))",
    "INSERT INTO orders (user_id, status, total, created_at) VALUES (1, 'shipped', 99.0, datetime('now'))",
    "INSERT INTO orders (user_id, status, total, created_at) VALUES (3, 'new', 5.0, datetime('now'))",
];

async fn pipeline() -> QueryPipeline {
    let engine = SqliteEngine::open(":memory:", Duration::from_secs(5)).unwrap();
    let executor = Arc::new(QueryExecutor::from_engine(Arc::new(engine), SchemaCache::new(true, None)));
    for statement in SETUP {
        executor.execute(statement, &[]).await.unwrap();
    }
    executor.refresh_schema(None);

    QueryPipeline::from_parts(
        Translator::new(SqlDialect::Sqlite),
        SqlValidator::new(false, 100),
        executor,
    )
}

fn ask(query: &str) -> NlQueryRequest {
    NlQueryRequest {
        query: query.to_string(),
        confirm_destructive: false,
    }
}

fn raw(sql: &str, params: Vec<QueryParam>) -> RawQueryRequest {
    RawQueryRequest {
        sql: sql.to_string(),
        params,
        confirm_destructive: false,
    }
}

async fn user_count(pipeline: &QueryPipeline) -> i64 {
    let response = pipeline.raw_sql(raw("SELECT COUNT(*) AS n FROM users", vec![])).await.unwrap();
    response.rows[0]["n"].as_i64().unwrap()
}

#[tokio::test]
async fn test_show_all_users() {
    let pipeline = pipeline().await;
    let response = pipeline.natural_language(ask("show all users")).await.unwrap();

    assert_eq!(response.sql, "SELECT * FROM users");
    assert_eq!(response.operation_kind, Some(OperationKind::Select));
    assert_eq!(response.row_count, 3);
    let names: Vec<&str> = response.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "email", "age", "created_at"]);
    assert_eq!(response.rows[2]["email"], Value::Null);
    assert!(response.warnings.is_empty());
}

#[tokio::test]
async fn test_count_grouped_by_status() {
    let pipeline = pipeline().await;
    let response = pipeline
        .natural_language(ask("count orders grouped by status"))
        .await
        .unwrap();

    assert_eq!(response.sql, "SELECT status, COUNT(*) as count FROM orders GROUP BY status");
    assert_eq!(response.operation_kind, Some(OperationKind::Count));

    let counts: HashMap<String, i64> = response
        .rows
        .iter()
        .map(|row| (row["status"].as_str().unwrap().to_string(), row["count"].as_i64().unwrap()))
        .collect();
    assert_eq!(counts.get("new"), Some(&2));
    assert_eq!(counts.get("shipped"), Some(&1));
}

#[tokio::test]
async fn test_recent_users_use_sqlite_date_arithmetic() {
    let pipeline = pipeline().await;
    let response = pipeline
        .natural_language(ask("find users created in the last 7 days"))
        .await
        .unwrap();

    assert_eq!(
        response.sql,
        "SELECT * FROM users WHERE created_at >= datetime('now', '-7 days')"
    );
    let mut names: Vec<&str> = response.rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
    names.sort();
    assert_eq!(names, vec!["ada", "chen"]);
}

#[tokio::test]
async fn test_destructive_request_needs_confirmation() {
    let pipeline = pipeline().await;

    let err = pipeline.natural_language(ask("delete user 2")).await.unwrap_err();
    assert_eq!(err.stage(), "validation");
    match &err {
        QueryError::ValidationRejected { sql, errors } => {
            assert_eq!(sql, "DELETE FROM users WHERE id = 2");
            assert!(errors.iter().any(|e| e.contains("requires confirmation")));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(user_count(&pipeline).await, 3);

    let response = pipeline
        .natural_language(NlQueryRequest {
            query: "delete user 2".to_string(),
            confirm_destructive: true,
        })
        .await
        .unwrap();
    assert_eq!(response.operation_kind, Some(OperationKind::Delete));
    assert_eq!(response.row_count, 1);
    assert!(response.warnings.contains(&"Destructive operation: DELETE".to_string()));
    assert_eq!(user_count(&pipeline).await, 2);
}

#[tokio::test]
async fn test_raw_sql_with_parameters() {
    let pipeline = pipeline().await;

    let inserted = pipeline
        .raw_sql(raw(
            "INSERT INTO users (name, email, age) VALUES (?, ?, ?)",
            vec!["dana".into(), QueryParam::Null, QueryParam::Int(41)],
        ))
        .await
        .unwrap();
    assert_eq!(inserted.row_count, 1);
    assert_eq!(inserted.last_insert_id, Some(4));
    assert_eq!(inserted.operation_kind, Some(OperationKind::Insert));

    let selected = pipeline
        .raw_sql(raw("SELECT name FROM users WHERE age > ? ORDER BY age", vec![QueryParam::Int(40)]))
        .await
        .unwrap();
    let names: Vec<&str> = selected.rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["dana", "chen"]);
}

#[tokio::test]
async fn test_multiple_statements_never_execute() {
    let pipeline = pipeline().await;

    let err = pipeline
        .raw_sql(RawQueryRequest {
            sql: "SELECT 1; DROP TABLE users".to_string(),
            params: vec![],
            confirm_destructive: true,
        })
        .await
        .unwrap_err();
    assert_eq!(err.stage(), "validation");
    assert_eq!(user_count(&pipeline).await, 3);
}

#[tokio::test]
async fn test_failures_report_their_stage() {
    let pipeline = pipeline().await;

    let untranslatable = pipeline.natural_language(ask("   ")).await.unwrap_err();
    assert_eq!(untranslatable.stage(), "translation");

    let bad_column = pipeline
        .natural_language(ask("show users where shoe_size > 9"))
        .await
        .unwrap_err();
    assert_eq!(bad_column.stage(), "translation");

    let failed = pipeline.raw_sql(raw("SELECT * FROM missing_table", vec![])).await.unwrap_err();
    assert_eq!(failed.stage(), "execution");
    assert_eq!(failed.sql(), Some("SELECT * FROM missing_table"));
}

#[tokio::test]
async fn test_schema_request() {
    let pipeline = pipeline().await;

    let all = pipeline.schema(SchemaRequest::default()).await.unwrap();
    assert_eq!(all.schema.table_names().collect::<Vec<_>>(), vec!["orders", "users"]);

    let users = pipeline
        .schema(SchemaRequest {
            table_name: Some("users".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(users.schema.len(), 1);
    let columns = users.schema.columns("users").unwrap();
    assert!(columns[0].is_primary_key);
    assert!(!columns[1].nullable);
    assert_eq!(columns[4].name, "created_at");
}

#[tokio::test]
async fn test_validate_does_not_execute() {
    let pipeline = pipeline().await;

    let verdict = pipeline.validate(ValidateRequest {
        sql: "DELETE FROM users".to_string(),
    });
    assert!(!verdict.accepted);
    assert!(verdict.is_destructive);
    assert_eq!(verdict.operation, "DELETE without WHERE clause");
    assert_eq!(user_count(&pipeline).await, 3);

    let clean = pipeline.validate(ValidateRequest {
        sql: "SELECT COUNT(*) FROM orders GROUP BY status".to_string(),
    });
    assert!(clean.accepted);
    assert_eq!(clean.complexity_score, 20);
}
