//! Row limits on SQLite, which go through the keyed rewrite

use kbatch_core::{
    BatchConfig, BatchQuery, ColumnType, Filter, Projection, TableMapping, Template, ValueExpr,
};
use kbatch_test_utils::{item_mapping, TestDatabase};

#[test]
fn test_take_one_deletes_exactly_one() {
    let mut db = TestDatabase::new();
    let mapping = item_mapping();
    db.seed_items(100).unwrap();

    let query = BatchQuery::new(&mapping).filter(Filter::field("item_id").gt(50)).take(1);
    assert!(db.session.compile_delete(&query).unwrap().is_keyed());

    assert_eq!(db.session.batch_delete(&query).unwrap(), 1);
    assert_eq!(db.count_items().unwrap(), 99);
}

#[test]
fn test_take_larger_than_match() {
    let mut db = TestDatabase::new();
    let mapping = item_mapping();
    db.seed_items(10).unwrap();

    let query = BatchQuery::new(&mapping).filter(Filter::field("item_id").gt(8)).take(5);
    assert_eq!(db.session.batch_delete(&query).unwrap(), 2);
    assert_eq!(db.count_items().unwrap(), 8);
}

#[test]
fn test_take_with_no_match_reports_zero() {
    let mut db = TestDatabase::new();
    let mapping = item_mapping();
    db.seed_items(10).unwrap();

    let query = BatchQuery::new(&mapping).filter(Filter::field("item_id").gt(1000)).take(3);
    let updated = db
        .session
        .batch_update(&query, &Template::new().set("description", "x").into())
        .unwrap();
    assert_eq!(updated, 0);
}

#[test]
fn test_keys_are_chunked() {
    let mut db = TestDatabase::with_config(BatchConfig::new().with_max_keys_per_statement(7));
    let mapping = item_mapping();
    db.seed_items(50).unwrap();

    let query = BatchQuery::new(&mapping).filter(Filter::field("item_id").le(40)).take(20);
    let projection = Projection::new().set("quantity", ValueExpr::field("quantity") + ValueExpr::param(1000));
    let updated = db.session.batch_update(&query, &projection.into()).unwrap();
    assert_eq!(updated, 20);

    let bumped = db.items().unwrap().iter().filter(|i| i.quantity >= 1000).count();
    assert_eq!(bumped, 20);
}

#[test]
fn test_composite_key_rewrite() {
    let mut db = TestDatabase::new();
    db.execute_sql(
        "CREATE TABLE OrderLine (OrderId INTEGER NOT NULL, Line INTEGER NOT NULL, Sku TEXT, PRIMARY KEY (OrderId, Line));
         INSERT INTO OrderLine VALUES (1, 1, 'a'), (1, 2, 'b'), (2, 1, 'c'), (2, 2, 'd'), (3, 1, 'e');",
    )
    .unwrap();

    let mapping = TableMapping::builder("OrderLine")
        .key_named("order_id", "OrderId", ColumnType::Integer)
        .key_named("line", "Line", ColumnType::Integer)
        .column_named("sku", "Sku", ColumnType::Text)
        .build()
        .unwrap();

    let query = BatchQuery::new(&mapping).filter(Filter::field("order_id").le(2)).take(3);
    assert_eq!(db.session.batch_delete(&query).unwrap(), 3);

    let remaining = db
        .session
        .execute_scalar(&kbatch_core::CompiledStatement::new("SELECT COUNT(*) FROM OrderLine", vec![]))
        .unwrap();
    assert_eq!(remaining, Some(kbatch_core::Value::Integer(2)));
}
