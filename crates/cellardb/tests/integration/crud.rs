//! CRUD integration tests.

use cellardb::{
    Condition, CoreError, Database, Error, FieldType, IndexKind, PrimaryKey, Record, Schema,
    Select, TableOptions, Value,
};

fn typed_db() -> Database {
    let db = Database::new();
    let schema = Schema::new()
        .with_field("name", FieldType::String)
        .with_field("age", FieldType::Int)
        .with_field("email", FieldType::String);
    db.create_table("users", TableOptions::new().schema(schema).index("age", IndexKind::Sorted))
        .expect("create table");
    db
}

#[test]
fn test_insert_and_get() {
    let db = typed_db();
    let users = db.table("users").expect("table");

    let key = users
        .insert(Record::new().with("name", "Alice").with("age", 30i64).with("email", "a@x.io"))
        .expect("insert");
    assert_eq!(key, PrimaryKey::int(1));

    let record = users.get(&key).expect("record");
    assert_eq!(record.get("id"), Some(&Value::Int(1)));
    assert_eq!(record.get("name").and_then(Value::as_str), Some("Alice"));
    assert!(users.get(&PrimaryKey::int(99)).is_none());
}

#[test]
fn test_schema_rejects_wrong_type() {
    let db = typed_db();
    let users = db.table("users").expect("table");
    let err = users
        .insert(Record::new().with("name", "Bob").with("age", "old").with("email", "b@x.io"))
        .expect_err("type mismatch");
    assert!(err.is_validation_error());
    assert_eq!(users.count(), 0);
}

#[test]
fn test_schema_update_failure_leaves_table_untouched() {
    let db = typed_db();
    let users = db.table("users").expect("table");
    for (name, age) in [("Ann", 20i64), ("Ben", 30), ("Cat", 40)] {
        users
            .insert(Record::new().with("name", name).with("age", age).with("email", "e@x.io"))
            .expect("insert");
    }

    let err = users
        .update(&Record::new().with("age", "thirty"), &Condition::ge("age", 30i64))
        .expect_err("invalid update");
    assert!(matches!(err, Error::SchemaValidation(CoreError::TypeMismatch { .. })));

    let ages: Vec<i64> = users
        .select(&Select::new().order_by(["age"]))
        .iter()
        .filter_map(|r| r.get("age").and_then(Value::as_int))
        .collect();
    assert_eq!(ages, vec![20, 30, 40]);
    assert_eq!(users.select(&Select::new().filter(Condition::eq("age", 30i64))).len(), 1);
}

#[test]
fn test_update_and_delete_counts() {
    let db = typed_db();
    let users = db.table("users").expect("table");
    for age in [15i64, 25, 35, 45] {
        users
            .insert(Record::new().with("name", "x").with("age", age).with("email", "e@x.io"))
            .expect("insert");
    }

    let updated = users
        .update(&Record::new().with("name", "adult"), &Condition::ge("age", 18i64))
        .expect("update");
    assert_eq!(updated, 3);
    assert_eq!(users.select(&Select::new().filter(Condition::eq("name", "adult"))).len(), 3);

    let deleted = users.delete(&Condition::lt("age", 30i64)).expect("delete");
    assert_eq!(deleted, 2);
    assert_eq!(users.count(), 2);

    let err = users.delete(&Condition::lt("age", 0i64)).expect_err("nothing matches");
    assert!(matches!(err, Error::RecordNotFound { .. }));
}

#[test]
fn test_primary_key_cannot_be_updated() {
    let db = typed_db();
    let users = db.table("users").expect("table");
    users
        .insert(Record::new().with("name", "x").with("age", 1i64).with("email", "e"))
        .expect("insert");
    let err = users.update(&Record::new().with("id", 5i64), &Condition::all()).expect_err("pk");
    assert!(err.is_validation_error());
}

#[test]
fn test_batch_insert_is_atomic() {
    let db = Database::new();
    let items = db.create_table("items", TableOptions::new()).expect("create");
    items.insert(Record::new().with("id", 3i64)).expect("insert");

    let batch = vec![
        Record::new().with("id", 1i64),
        Record::new().with("id", 2i64),
        Record::new().with("id", 3i64),
    ];
    let err = items.insert_many(batch).expect_err("collision");
    assert!(matches!(err, Error::DuplicateKey { .. }));
    assert_eq!(items.count(), 1);

    let keys = items
        .insert_many(vec![Record::new(), Record::new().with("id", "sku-1"), Record::new()])
        .expect("batch");
    assert_eq!(keys, vec![PrimaryKey::int(4), PrimaryKey::string("sku-1"), PrimaryKey::int(5)]);
}

#[test]
fn test_table_registry() {
    let db = Database::new();
    db.create_table("a", TableOptions::new()).expect("create");
    db.create_table("b", TableOptions::new().primary_key("code")).expect("create");

    assert!(matches!(
        db.create_table("a", TableOptions::new()),
        Err(Error::DuplicateTable(name)) if name == "a"
    ));
    assert_eq!(db.list_tables(), vec!["a".to_owned(), "b".to_owned()]);
    assert_eq!(db.table("b").expect("table").primary_key_field(), "code");

    db.drop_table("a").expect("drop");
    assert!(!db.contains_table("a"));
    assert!(matches!(db.table("a"), Err(Error::TableNotFound(_))));
    assert!(matches!(db.drop_table("a"), Err(Error::TableNotFound(_))));
}

#[test]
fn test_index_lifecycle() {
    let db = Database::new();
    let t = db.create_table("t", TableOptions::new()).expect("create");
    for i in 0..20i64 {
        t.insert(Record::new().with("group", i % 4)).expect("insert");
    }

    t.create_index("group", IndexKind::Hash).expect("index");
    let stats = t.index_stats("group").expect("stats");
    assert_eq!(stats.entries, 20);
    assert_eq!(stats.distinct_values, 4);

    t.create_index("group", IndexKind::Sorted).expect("rebuild as sorted");
    assert_eq!(t.index_stats("group").expect("stats").kind, IndexKind::Sorted);
    assert_eq!(t.select(&Select::new().filter(Condition::ge("group", 2i64))).len(), 10);

    assert!(t.drop_index("group"));
    assert!(!t.drop_index("group"));
    assert!(matches!(t.create_index("", IndexKind::Hash), Err(Error::InvalidInput(_))));
}
