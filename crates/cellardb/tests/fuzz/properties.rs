//! Property-based tests for `CellarDB` invariants.
//!
//! These tests verify that certain properties always hold regardless
//! of the input data or query shape.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use cellardb::{
    backup, BackupConfig, BackupManager, Condition, Database, PrimaryKey, Record, Select,
    SnapshotFormat, TableOptions, Value,
};

use super::operations::{apply, indexed_table, operation, query, score_value, Model};

// ============================================================================
// Query Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Indexed queries with ordering and paging equal filter-then-sort.
    #[test]
    fn prop_select_matches_model(
        ops in prop::collection::vec(operation(), 1..40),
        queries in prop::collection::vec(query(), 1..6),
    ) {
        let table = indexed_table();
        let mut model = Model::default();
        for op in &ops {
            apply(&table, &mut model, op)?;
        }
        for query in &queries {
            prop_assert_eq!(table.select(&query.to_select()), model.select(query), "{:?}", query);
        }
    }

    /// `not(c)` and `c` partition the table.
    #[test]
    fn prop_negation_partitions(
        scores in prop::collection::vec(score_value(), 0..40),
        condition in super::operations::condition(),
    ) {
        let table = indexed_table();
        for score in scores {
            table.insert(Record::new().with("score", score)).expect("insert");
        }
        let keys = |c: Condition| -> BTreeSet<Value> {
            table
                .select(&Select::new().filter(c))
                .iter()
                .filter_map(|r| r.get("id").cloned())
                .collect()
        };
        let yes = keys(condition.clone());
        let no = keys(Condition::not(condition));
        prop_assert!(yes.is_disjoint(&no));
        prop_assert_eq!(yes.len() + no.len(), table.count());
    }

    /// Top-k is always a prefix of the full ordering.
    #[test]
    fn prop_limit_is_prefix(
        scores in prop::collection::vec(score_value(), 0..60),
        limit in 0usize..20,
        desc in any::<bool>(),
    ) {
        let table = indexed_table();
        for score in scores {
            table.insert(Record::new().with("score", score)).expect("insert");
        }
        let key = if desc { "-score" } else { "score" };
        let full = table.select(&Select::new().order_by([key]));
        let top = table.select(&Select::new().order_by([key]).limit(limit));
        prop_assert_eq!(&top[..], &full[..limit.min(full.len())]);
    }
}

// ============================================================================
// Key Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Auto keys never collide with supplied integer keys.
    #[test]
    fn prop_auto_keys_skip_supplied(
        supplied in prop::collection::btree_set(1i64..200, 0..20),
        autos in 1usize..20,
    ) {
        let table = indexed_table();
        for &key in &supplied {
            table.insert(Record::new().with("id", key)).expect("supplied");
        }
        let floor = supplied.iter().next_back().copied().unwrap_or(0);
        let mut seen = BTreeSet::new();
        for _ in 0..autos {
            let key = table.insert(Record::new()).expect("auto").as_int().expect("int key");
            prop_assert!(key > floor, "auto key {} not above supplied keys", key);
            prop_assert!(seen.insert(key));
        }
        prop_assert!(table.get(&PrimaryKey::int(0)).is_none());
    }
}

// ============================================================================
// Backup Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Restoring the full backup and every delta reproduces the table.
    #[test]
    fn prop_backup_chain_restores(
        batches in prop::collection::vec(prop::collection::vec(operation(), 0..15), 1..5),
        binary in any::<bool>(),
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::new());
        let table = db.create_table("fuzz", TableOptions::new()).expect("create");
        table.create_index("score", cellardb::IndexKind::Sorted).expect("index");
        let format = if binary { SnapshotFormat::Binary } else { SnapshotFormat::JsonLines };
        let config = BackupConfig::new(dir.path()).format(format);
        let manager = BackupManager::new(Arc::clone(&db), config);

        let mut model = Model::default();
        for batch in &batches {
            for op in batch {
                apply(&table, &mut model, op)?;
            }
            manager.backup_now().expect("backup");
        }

        let restored = backup::restore_latest(dir.path()).expect("restore");
        let restored = restored.table("fuzz").expect("table");
        prop_assert_eq!(restored.all(), table.all());
        prop_assert_eq!(restored.indexed_fields(), vec!["score".to_owned()]);
        prop_assert_eq!(restored.next_auto_pk(), table.next_auto_pk());
    }
}
