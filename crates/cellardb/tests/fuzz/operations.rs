//! Random operation generation for fuzz testing.
//!
//! Generates random sequences of table mutations, applies them both to an
//! indexed table and to a `BTreeMap` model, and checks the two agree.

use std::collections::BTreeMap;

use proptest::prelude::*;

use cellardb::{CompareOp, Condition, IndexKind, PrimaryKey, Record, Select, SortKey, Table, Value};

// ============================================================================
// Value and Condition Generation
// ============================================================================

pub const TAGS: [&str; 4] = ["red", "green", "blue", "amber"];

const OPS: [CompareOp; 6] =
    [CompareOp::Eq, CompareOp::Ne, CompareOp::Lt, CompareOp::Le, CompareOp::Gt, CompareOp::Ge];

/// A score field value: mostly small integers, sometimes a float or null.
pub fn score_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        6 => (-20i64..20).prop_map(Value::Int),
        2 => (-20i64..20).prop_map(|n| Value::Float(n as f64 / 2.0)),
        1 => Just(Value::Null),
    ]
}

pub fn tag_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        8 => prop::sample::select(TAGS.to_vec()).prop_map(Value::from),
        1 => Just(Value::Null),
    ]
}

/// A leaf condition over the `score` and `tag` fields.
pub fn leaf_condition() -> impl Strategy<Value = Condition> {
    prop_oneof![
        (prop::sample::select(OPS.to_vec()), score_value())
            .prop_map(|(op, v)| Condition::compare("score", op, v)),
        (score_value(), score_value()).prop_map(|(lo, hi)| Condition::between("score", lo, hi)),
        prop::collection::vec(score_value(), 0..4).prop_map(|vs| Condition::is_in("score", vs)),
        tag_value().prop_map(|v| Condition::eq("tag", v)),
        prop::collection::vec(tag_value(), 1..3).prop_map(|vs| Condition::is_in("tag", vs)),
        Just(Condition::is_null("score")),
        Just(Condition::is_not_null("tag")),
        prop::sample::select(TAGS.to_vec()).prop_map(|t| Condition::starts_with("tag", &t[..1])),
    ]
}

/// Arbitrary condition trees up to a few levels deep.
pub fn condition() -> impl Strategy<Value = Condition> {
    leaf_condition().prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(|cs| Condition::and(cs)),
            prop::collection::vec(inner.clone(), 0..3).prop_map(|cs| Condition::or(cs)),
            inner.prop_map(|c| Condition::not(c)),
        ]
    })
}

// ============================================================================
// Operations
// ============================================================================

/// A table mutation.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Insert a record with an auto-assigned key
    Insert { score: Option<Value>, tag: Option<Value> },
    /// Set `score` on every record matching the condition
    Update { condition: Condition, score: Value },
    /// Delete every record matching the condition
    Delete { condition: Condition },
}

pub fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        5 => (prop::option::of(score_value()), prop::option::of(tag_value()))
            .prop_map(|(score, tag)| Operation::Insert { score, tag }),
        2 => (leaf_condition(), score_value())
            .prop_map(|(condition, score)| Operation::Update { condition, score }),
        1 => leaf_condition().prop_map(|condition| Operation::Delete { condition }),
    ]
}

// ============================================================================
// Model
// ============================================================================

/// The reference: records in key order, filtered and sorted the slow way.
#[derive(Debug, Default)]
pub struct Model {
    pub records: BTreeMap<PrimaryKey, Record>,
}

impl Model {
    pub fn select(&self, query: &ModelQuery) -> Vec<Record> {
        let mut rows: Vec<&Record> =
            self.records.values().filter(|r| query.condition.matches(r)).collect();
        if !query.order.is_empty() {
            rows.sort_by(|a, b| {
                for key in &query.order {
                    let left = a.get(&key.field).unwrap_or(&Value::Null);
                    let right = b.get(&key.field).unwrap_or(&Value::Null);
                    let ord = if key.descending { right.cmp(left) } else { left.cmp(right) };
                    if ord.is_ne() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }
        rows.into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// A query in a form both the table and the model can run.
#[derive(Debug, Clone)]
pub struct ModelQuery {
    pub condition: Condition,
    pub order: Vec<SortKey>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ModelQuery {
    pub fn to_select(&self) -> Select {
        let mut select = Select::new()
            .filter(self.condition.clone())
            .order_by(self.order.clone())
            .offset(self.offset);
        if let Some(limit) = self.limit {
            select = select.limit(limit);
        }
        select
    }
}

pub fn query() -> impl Strategy<Value = ModelQuery> {
    let key = (prop::sample::select(vec!["score", "tag", "id"]), any::<bool>())
        .prop_map(|(field, desc)| if desc { SortKey::desc(field) } else { SortKey::asc(field) });
    (condition(), prop::collection::vec(key, 0..3), prop::option::of(0usize..15), 0usize..5)
        .prop_map(|(condition, order, limit, offset)| ModelQuery { condition, order, limit, offset })
}

pub fn indexed_table() -> Table {
    let table = Table::new("fuzz", "id", None);
    table.create_index("score", IndexKind::Sorted).expect("index");
    table.create_index("tag", IndexKind::Hash).expect("index");
    table
}

/// Applies `op` to both sides and checks they report the same outcome.
pub fn apply(table: &Table, model: &mut Model, op: &Operation) -> Result<(), TestCaseError> {
    match op {
        Operation::Insert { score, tag } => {
            let mut record = Record::new();
            if let Some(score) = score {
                record.set("score", score.clone());
            }
            if let Some(tag) = tag {
                record.set("tag", tag.clone());
            }
            let key = table.insert(record.clone()).expect("insert");
            record.set("id", key.as_value().clone());
            prop_assert!(model.records.insert(key, record).is_none());
        }
        Operation::Update { condition, score } => {
            let changes = Record::new().with("score", score.clone());
            let mut expected = 0;
            for record in model.records.values_mut().filter(|r| condition.matches(r)) {
                record.apply(&changes);
                expected += 1;
            }
            match table.update(&changes, condition) {
                Ok(n) => prop_assert_eq!(n, expected),
                Err(_) => prop_assert_eq!(expected, 0),
            }
        }
        Operation::Delete { condition } => {
            let before = model.records.len();
            model.records.retain(|_, r| !condition.matches(r));
            let expected = before - model.records.len();
            match table.delete(condition) {
                Ok(n) => prop_assert_eq!(n, expected),
                Err(_) => prop_assert_eq!(expected, 0),
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Random mutations keep the table, its indexes and the model in step.
    #[test]
    fn prop_operations_match_model(
        ops in prop::collection::vec(operation(), 1..60),
        probes in prop::collection::vec(leaf_condition(), 1..8),
    ) {
        let table = indexed_table();
        let mut model = Model::default();
        for op in &ops {
            apply(&table, &mut model, op)?;
        }

        prop_assert_eq!(table.count(), model.records.len());
        prop_assert_eq!(table.all(), model.records.values().cloned().collect::<Vec<_>>());

        let indexed_scores = table.index_stats("score").expect("stats").entries;
        let live_scores = model
            .records
            .values()
            .filter(|r| r.get("score").is_some_and(|v| !v.is_null()))
            .count();
        prop_assert_eq!(indexed_scores, live_scores);

        for condition in probes {
            let query = ModelQuery { condition, order: Vec::new(), limit: None, offset: 0 };
            prop_assert_eq!(table.select(&query.to_select()), model.select(&query));
        }
    }
}
