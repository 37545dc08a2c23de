//! Query integration tests: filters, planner paths, ordering and paging.
//!
//! Every indexed query is checked against the same query on an identical
//! table without indexes.

use cellardb::{Condition, Database, IndexKind, Record, Select, SortKey, Table, TableOptions, Value};

fn products(indexed: bool) -> std::sync::Arc<Table> {
    let db = Database::new();
    let mut options = TableOptions::new();
    if indexed {
        options = options.index("price", IndexKind::Sorted).index("category", IndexKind::Hash);
    }
    let table = db.create_table("products", options).expect("create");
    let categories = ["books", "games", "tools", "music"];
    for i in 0..200i64 {
        let mut record = Record::new()
            .with("name", format!("item-{i:03}"))
            .with("price", (i * 37) % 101)
            .with("category", categories[(i % 4) as usize]);
        if i % 10 == 0 {
            record.set("discount", Value::Null);
        } else if i % 3 == 0 {
            record.set("discount", i % 7);
        }
        table.insert(record).expect("insert");
    }
    table
}

fn ids(records: &[Record]) -> Vec<i64> {
    records.iter().filter_map(|r| r.get("id").and_then(Value::as_int)).collect()
}

fn assert_same(query: &Select) {
    let indexed = products(true).select(query);
    let scanned = products(false).select(query);
    assert_eq!(ids(&indexed), ids(&scanned), "query {query:?}");
}

#[test]
fn test_between_inclusive() {
    let db = Database::new();
    let t = db.create_table("t", TableOptions::new().index("age", IndexKind::Sorted)).expect("t");
    for age in [10i64, 20, 30, 40, 50] {
        t.insert(Record::new().with("age", age)).expect("insert");
    }
    let hits = t.select(
        &Select::new().filter(Condition::between("age", 20i64, 40i64)).order_by(["age"]),
    );
    let ages: Vec<i64> = hits.iter().filter_map(|r| r.get("age").and_then(Value::as_int)).collect();
    assert_eq!(ages, vec![20, 30, 40]);
}

#[test]
fn test_indexed_matches_scan() {
    let queries = [
        Condition::eq("category", "games"),
        Condition::is_in("category", ["books", "music"]),
        Condition::gt("price", 50i64),
        Condition::le("price", 10i64),
        Condition::between("price", 25i64, 75i64),
        Condition::and([Condition::eq("category", "tools"), Condition::lt("price", 30i64)]),
        Condition::or([Condition::eq("category", "books"), Condition::ge("price", 95i64)]),
        Condition::ne("category", "games"),
        Condition::not(Condition::between("price", 10i64, 90i64)),
        Condition::starts_with("name", "item-01"),
        Condition::is_null("discount"),
        Condition::is_not_null("discount"),
        Condition::eq("price", 1.0f64),
    ];
    for condition in queries {
        assert_same(&Select::new().filter(condition));
    }
}

#[test]
fn test_ordering_and_top_k() {
    assert_same(&Select::new().order_by([SortKey::desc("price"), SortKey::asc("name")]).limit(7));
    assert_same(
        &Select::new()
            .filter(Condition::eq("category", "books"))
            .order_by(["-price", "id"])
            .offset(3)
            .limit(5),
    );
    assert_same(&Select::new().order_by(["discount", "id"]).limit(12));
}

#[test]
fn test_limit_without_order_is_key_order() {
    let t = products(true);
    let rows = t.select(&Select::new().filter(Condition::eq("category", "tools")).limit(3));
    assert_eq!(ids(&rows), vec![3, 7, 11]);
}

#[test]
fn test_top_k_matches_full_sort() {
    let t = products(true);
    let full = t.select(&Select::new().order_by(["-price", "id"]));
    let top = t.select(&Select::new().order_by(["-price", "id"]).limit(10));
    assert_eq!(ids(&top), ids(&full[..10]));
}

#[test]
fn test_distinct_projection() {
    let t = products(true);
    let rows = t.select(&Select::new().columns(["category"]).distinct().order_by(["category"]));
    let categories: Vec<&str> =
        rows.iter().filter_map(|r| r.get("category").and_then(Value::as_str)).collect();
    assert_eq!(categories, vec!["books", "games", "music", "tools"]);

    let renamed = t.select(
        &Select::new()
            .filter(Condition::eq("id", 1i64))
            .columns_as([("label", "name"), ("x", "nope")]),
    );
    assert_eq!(renamed.len(), 1);
    assert_eq!(renamed[0].get("label").and_then(Value::as_str), Some("item-000"));
    assert_eq!(renamed[0].get("x"), Some(&Value::Null));
}

#[test]
fn test_null_equality_never_uses_index() {
    let t = products(true);
    let rows = t.select(&Select::new().filter(Condition::eq("price", Value::Null)));
    assert!(rows.is_empty());
}

#[test]
fn test_index_follows_updates_and_deletes() {
    let t = products(true);
    t.update(&Record::new().with("category", "sold"), &Condition::lt("price", 20i64))
        .expect("update");
    t.delete(&Condition::eq("category", "music")).expect("delete");

    let sold = t.select(&Select::new().filter(Condition::eq("category", "sold")));
    assert!(sold.iter().all(|r| r.get("price").and_then(Value::as_int) < Some(20)));
    assert!(t.select(&Select::new().filter(Condition::eq("category", "music"))).is_empty());

    let stats = t.index_stats("category").expect("stats");
    assert_eq!(stats.entries, t.count());
}

#[test]
fn test_columns_without_schema() {
    let t = products(false);
    assert_eq!(t.columns(), vec!["category", "discount", "id", "name", "price"]);
}
