//! Compile-time rejections and backend failures

use kbatch_core::{
    BatchConfig, BatchQuery, ColumnType, CompiledStatement, DialectKind, Error, Filter, Projection,
    TableMapping, Template, Value, ValueExpr,
};
use kbatch_api::{BatchSession, Connection, SqliteConnection};
use kbatch_test_utils::{item_mapping, TestDatabase};
use std::time::{Duration, Instant};

/// Test error codes are correct and stable
#[test]
fn test_error_codes() {
    assert_eq!(Error::UnsupportedExpression("x".into()).code(), "UNSUPPORTED_EXPRESSION");
    assert_eq!(Error::NoAssignments("Item".into()).code(), "NO_ASSIGNMENTS");
    assert_eq!(
        Error::DialectLimitUnsupported {
            dialect: "sqlite".into(),
            statement: "DELETE".into(),
            reason: "no key".into(),
        }
        .code(),
        "DIALECT_LIMIT_UNSUPPORTED"
    );
    assert_eq!(Error::execution(None, "boom").code(), "EXECUTION_ERROR");
}

#[test]
fn test_local_predicate_never_reaches_backend() {
    let mut db = TestDatabase::new();
    let mapping = item_mapping();
    db.seed_items(10).unwrap();

    let filter = Filter::field("item_id")
        .le(5)
        .and(Filter::field("name").matches("ends_with_digit", |v| {
            v.as_text().map_or(false, |s| s.ends_with('3'))
        }));
    let err = db
        .session
        .batch_delete(&BatchQuery::new(&mapping).filter(filter))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedExpression(_)));
    assert!(err.is_compile_time());
    assert_eq!(db.count_items().unwrap(), 10);
}

#[test]
fn test_unknown_field_rejected() {
    let mut db = TestDatabase::new();
    let mapping = item_mapping();

    let err = db
        .session
        .batch_delete(&BatchQuery::new(&mapping).filter(Filter::field("colour").eq("red")))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedExpression(_)));

    let err = db
        .session
        .batch_update(&BatchQuery::new(&mapping), &Template::new().set("colour", "red").into())
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedExpression(_)));
}

#[test]
fn test_no_assignments() {
    let mut db = TestDatabase::new();
    let mapping = item_mapping();
    db.seed_items(3).unwrap();

    let err = db
        .session
        .batch_update(&BatchQuery::new(&mapping), &Projection::new().into())
        .unwrap_err();
    assert_eq!(err, Error::NoAssignments("Item".to_string()));
}

#[test]
fn test_text_arithmetic_rejected() {
    let mut db = TestDatabase::new();
    let mapping = item_mapping();

    let projection = Projection::new().set("name", ValueExpr::field("name") * ValueExpr::param(2));
    let err = db
        .session
        .batch_update(&BatchQuery::new(&mapping), &projection.into())
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedExpression(_)));
}

#[test]
fn test_limit_without_key() {
    let mut db = TestDatabase::new();
    db.execute_sql("CREATE TABLE Log (Message TEXT); INSERT INTO Log VALUES ('a'), ('b');")
        .unwrap();
    let mapping = TableMapping::builder("Log")
        .column_named("message", "Message", ColumnType::Text)
        .build()
        .unwrap();

    let err = db
        .session
        .batch_delete(&BatchQuery::new(&mapping).take(1))
        .unwrap_err();
    assert!(matches!(err, Error::DialectLimitUnsupported { .. }));

    // Unlimited deletes do not need a key
    assert_eq!(db.session.batch_delete(&BatchQuery::new(&mapping)).unwrap(), 2);
}

#[test]
fn test_constraint_violation_surfaces_backend_code() {
    let mut db = TestDatabase::new();
    let mapping = item_mapping();
    db.seed_items(3).unwrap();

    let err = db
        .session
        .batch_update(
            &BatchQuery::new(&mapping),
            &Template::new().set("quantity", Value::Null).into(),
        )
        .unwrap_err();
    match err {
        Error::Execution { backend_code, message } => {
            // SQLITE_CONSTRAINT_NOTNULL
            assert_eq!(backend_code.as_deref(), Some("1299"));
            assert!(message.contains("NOT NULL"), "{}", message);
        }
        other => panic!("Expected execution error, got {:?}", other),
    }
}

#[test]
fn test_missing_table_is_execution_error() {
    let mut db = TestDatabase::new();
    let mapping = TableMapping::builder("Missing")
        .key("id", ColumnType::Integer)
        .build()
        .unwrap();

    let err = db.session.batch_delete(&BatchQuery::new(&mapping)).unwrap_err();
    assert!(matches!(err, Error::Execution { .. }));
    assert!(!err.is_compile_time());
}

#[test]
fn test_keyed_failure_rolls_back() {
    let mut db = TestDatabase::with_config(BatchConfig::new().with_max_keys_per_statement(1));
    let mapping = item_mapping();
    db.seed_items(5).unwrap();
    db.execute_sql("CREATE UNIQUE INDEX ix_item_name ON Item (Name)").unwrap();

    // First chunk succeeds, second collides on the unique name
    let query = BatchQuery::new(&mapping).take(3);
    let err = db
        .session
        .batch_update(&query, &Template::new().set("name", "same").into())
        .unwrap_err();
    assert!(matches!(err, Error::Execution { .. }));

    let names: Vec<String> = db
        .items()
        .unwrap()
        .into_iter()
        .filter_map(|i| i.name)
        .collect();
    assert!(names.iter().all(|n| n != "same"), "{:?}", names);
}

/// Open a second handle on the same file holding a read transaction
fn open_reader(db: &TestDatabase) -> SqliteConnection {
    let mut reader = SqliteConnection::open(db.path()).unwrap();
    reader.begin().unwrap();
    reader
        .query_scalar(&CompiledStatement::new("SELECT COUNT(*) FROM Item", vec![]))
        .unwrap();
    reader
}

#[test]
fn test_failed_commit_rolls_back() {
    let timeout = Duration::from_millis(200);
    let mut db = TestDatabase::with_config(BatchConfig::new().with_statement_timeout(timeout));
    let mapping = item_mapping();
    db.seed_items(10).unwrap();

    // The reader's shared lock blocks the commit of the keyed delete
    let reader = open_reader(&db);
    let started = Instant::now();
    let err = db
        .session
        .batch_delete(&BatchQuery::new(&mapping).take(1))
        .unwrap_err();
    let elapsed = started.elapsed();

    match &err {
        Error::Execution { backend_code, .. } => {
            // SQLITE_BUSY
            assert_eq!(backend_code.as_deref(), Some("5"));
        }
        other => panic!("Expected execution error, got {:?}", other),
    }
    assert!(elapsed >= timeout / 2, "gave up after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(4), "waited {:?}", elapsed);

    assert!(db.session.connection().inner().is_autocommit());
    assert_eq!(db.count_items().unwrap(), 10);

    drop(reader);
    assert_eq!(db.session.batch_delete(&BatchQuery::new(&mapping).take(1)).unwrap(), 1);
    assert_eq!(db.count_items().unwrap(), 9);
}

#[test]
fn test_session_dialect_must_match_connection() {
    let config = BatchConfig::new().with_dialect(DialectKind::SqlServer);
    let result = BatchSession::sqlite_in_memory(config);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
