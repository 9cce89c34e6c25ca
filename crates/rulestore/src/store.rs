//! In-memory store for each schema's active rule set.
//!
//! Readers get an `Arc` to an immutable snapshot and never wait on a
//! mutation in progress. Writers for a single schema are serialized, build a
//! complete new snapshot off to the side, then swap it in.
use std::collections::btree_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::errors::{invalid_rule, Result, RuleStoreError};
use crate::types::{RuleConfigurationSet, ShardingRuleConfiguration};
use crate::validation::validate_create;

/// Lookup for the logical tables a schema's catalog already contains.
pub trait LogicalTableCatalog: Send + Sync {
    /// Get the names of every logical table in the schema. Unknown schemas
    /// have no tables.
    fn logical_tables(&self, schema: &str) -> Vec<String>;
}

/// A catalog with no tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyTableCatalog;

impl LogicalTableCatalog for EmptyTableCatalog {
    fn logical_tables(&self, _schema: &str) -> Vec<String> {
        Vec::new()
    }
}

impl LogicalTableCatalog for HashMap<String, Vec<String>> {
    fn logical_tables(&self, schema: &str) -> Vec<String> {
        self.get(schema).cloned().unwrap_or_default()
    }
}

struct SchemaSlot {
    /// Held for the duration of a mutation on this schema.
    write_lock: Mutex<()>,
    /// Only held long enough to clone or replace the `Arc`.
    current: RwLock<Arc<RuleConfigurationSet>>,
}

impl SchemaSlot {
    fn new(rules: RuleConfigurationSet) -> Self {
        SchemaSlot {
            write_lock: Mutex::new(()),
            current: RwLock::new(Arc::new(rules)),
        }
    }

    fn snapshot(&self) -> Arc<RuleConfigurationSet> {
        self.current.read().clone()
    }

    fn swap(&self, rules: Arc<RuleConfigurationSet>) {
        *self.current.write() = rules;
    }
}

/// Authoritative rule configuration for every schema.
pub struct RuleStore {
    schemas: RwLock<HashMap<String, Arc<SchemaSlot>>>,
    catalog: Arc<dyn LogicalTableCatalog>,
}

impl RuleStore {
    pub fn new(catalog: Arc<dyn LogicalTableCatalog>) -> Self {
        RuleStore {
            schemas: RwLock::new(HashMap::new()),
            catalog,
        }
    }

    /// Register a schema with an empty rule set.
    ///
    /// Does nothing if the schema is already registered.
    pub fn register_schema(&self, schema: &str) -> Arc<RuleConfigurationSet> {
        let mut schemas = self.schemas.write();
        schemas
            .entry(schema.to_string())
            .or_insert_with(|| Arc::new(SchemaSlot::new(RuleConfigurationSet::empty(schema))))
            .snapshot()
    }

    /// Names of every registered schema, sorted.
    pub fn schema_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.schemas.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the current rules for a schema.
    pub fn get_rules(&self, schema: &str) -> Result<Arc<RuleConfigurationSet>> {
        Ok(self.slot(schema)?.snapshot())
    }

    /// Create new sharding rules for a schema.
    ///
    /// If the schema already has sharding rules, the new tables and
    /// algorithms are merged into them. Otherwise the new rules become the
    /// schema's sharding configuration.
    ///
    /// Either every rule in the request is applied or none are. The returned
    /// snapshot should be published by the caller.
    pub fn apply_create(
        &self,
        schema: &str,
        new_rules: ShardingRuleConfiguration,
    ) -> Result<Arc<RuleConfigurationSet>> {
        let slot = self.slot(schema)?;
        let _guard = slot.write_lock.lock();

        let current = slot.snapshot();

        let catalog_tables = self.catalog.logical_tables(schema);
        let existing = catalog_tables
            .iter()
            .map(|s| s.as_str())
            .chain(current.sharded_tables());
        if let Err(e) = validate_create(existing, &new_rules.tables) {
            info!(%schema, %e, "rejected sharding rule creation");
            return Err(e);
        }

        let merged = match &current.sharding {
            Some(existing) => merge(existing, new_rules)?,
            None => new_rules,
        };
        check_references(&merged)?;

        let updated = Arc::new(RuleConfigurationSet {
            schema: schema.to_string(),
            version: current.version.wrapping_add(1),
            sharding: Some(merged),
        });
        slot.swap(updated.clone());

        info!(%schema, version = updated.version, tables = updated.table_rule_count(), "created sharding rules");

        Ok(updated)
    }

    /// Install a snapshot received from elsewhere (e.g. a peer) if it's newer
    /// than the current one.
    ///
    /// Returns `true` if the snapshot was installed.
    pub fn install_snapshot(&self, rules: Arc<RuleConfigurationSet>) -> bool {
        let slot = {
            let mut schemas = self.schemas.write();
            schemas
                .entry(rules.schema.clone())
                .or_insert_with(|| {
                    Arc::new(SchemaSlot::new(RuleConfigurationSet::empty(&rules.schema)))
                })
                .clone()
        };
        let _guard = slot.write_lock.lock();

        let current = slot.snapshot();
        if rules.version <= current.version {
            debug!(schema = %rules.schema, version = rules.version, current = current.version, "skipping snapshot");
            return false;
        }

        debug!(schema = %rules.schema, version = rules.version, "installing snapshot");
        slot.swap(rules);
        true
    }

    fn slot(&self, schema: &str) -> Result<Arc<SchemaSlot>> {
        self.schemas
            .read()
            .get(schema)
            .cloned()
            .ok_or_else(|| RuleStoreError::MissingSchema(schema.to_string()))
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore")
            .field("schemas", &self.schema_names())
            .finish_non_exhaustive()
    }
}

/// Merge new rules into a copy of the existing configuration.
///
/// Table names are assumed to be validated already. A new algorithm with the
/// same name as an existing one must have the same definition.
fn merge(
    existing: &ShardingRuleConfiguration,
    new_rules: ShardingRuleConfiguration,
) -> Result<ShardingRuleConfiguration> {
    let mut merged = existing.clone();

    for (name, algorithm) in new_rules.algorithms {
        match merged.algorithms.entry(name) {
            Entry::Occupied(ent) => {
                if ent.get() != &algorithm {
                    return Err(RuleStoreError::AlgorithmConflict {
                        name: ent.key().clone(),
                    });
                }
            }
            Entry::Vacant(ent) => {
                ent.insert(algorithm);
            }
        }
    }
    merged.tables.extend(new_rules.tables);

    Ok(merged)
}

/// Ensure every table rule has data nodes and references a defined
/// algorithm.
fn check_references(config: &ShardingRuleConfiguration) -> Result<()> {
    for table in &config.tables {
        if table.data_nodes.is_empty() {
            return Err(invalid_rule!("no data nodes for '{}'", table.logic_table));
        }
        if table.strategy.sharding_columns().is_empty() {
            return Err(invalid_rule!(
                "no sharding columns for '{}'",
                table.logic_table
            ));
        }
        let algorithm = table.strategy.algorithm();
        if config.algorithm(algorithm).is_none() {
            return Err(invalid_rule!(
                "unknown sharding algorithm '{algorithm}' for '{}'",
                table.logic_table
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use common::config::RulesConfig;

    use super::*;
    use crate::segment::{convert_segments, TableRuleSegment, SHARDING_COUNT_PROP};
    use crate::types::{AlgorithmConfig, DataNode, ShardStrategy, ShardingTableRule};

    fn store_with_tables(tables: &[&str]) -> RuleStore {
        logutil::init_test();
        let mut catalog = HashMap::new();
        catalog.insert(
            "test".to_string(),
            tables.iter().map(|s| s.to_string()).collect(),
        );
        let store = RuleStore::new(Arc::new(catalog));
        store.register_schema("test");
        store
    }

    fn request(tables: &[&str]) -> ShardingRuleConfiguration {
        let segments: Vec<_> = tables
            .iter()
            .map(|name| TableRuleSegment {
                logic_table: name.to_string(),
                resources: vec!["ds_0".to_string(), "ds_1".to_string()],
                sharding_column: "order_id".to_string(),
                algorithm_type: Some("MOD".to_string()),
                properties: [(SHARDING_COUNT_PROP.to_string(), "2".to_string())]
                    .into_iter()
                    .collect(),
            })
            .collect();
        convert_segments(&segments, &RulesConfig::default()).unwrap()
    }

    #[test]
    fn first_create_installs_rules() {
        let store = store_with_tables(&["t_user"]);

        let rules = store.apply_create("test", request(&["t_order"])).unwrap();
        assert_eq!(1, rules.version);
        assert!(rules.is_sharded("t_order"));
        assert!(!rules.is_sharded("t_user"));
        assert_eq!(rules, store.get_rules("test").unwrap());
    }

    #[test]
    fn merge_disjoint_tables() {
        let store = store_with_tables(&[]);

        store.apply_create("test", request(&["t_order", "t_item"])).unwrap();
        let rules = store.apply_create("test", request(&["t_user"])).unwrap();

        assert_eq!(2, rules.version);
        assert_eq!(3, rules.table_rule_count());
        let names: Vec<_> = rules.sharded_tables().collect();
        assert_eq!(vec!["t_order", "t_item", "t_user"], names);
        assert_eq!(3, rules.sharding.as_ref().unwrap().algorithms.len());
    }

    #[test]
    fn repeated_request_rejected() {
        let store = store_with_tables(&[]);

        store.apply_create("test", request(&["t_order"])).unwrap();
        let before = store.get_rules("test").unwrap();

        let err = store.apply_create("test", request(&["t_order"])).unwrap_err();
        assert!(matches!(err, RuleStoreError::DuplicateTables(_)), "{err}");
        assert!(Arc::ptr_eq(&before, &store.get_rules("test").unwrap()));
    }

    #[test]
    fn duplicates_leave_store_unchanged() {
        let store = store_with_tables(&["t_user"]);
        let before = store.get_rules("test").unwrap();

        let err = store
            .apply_create("test", request(&["t_order", "t_user", "t_order", "t_ok"]))
            .unwrap_err();
        match err {
            RuleStoreError::DuplicateTables(names) => {
                let expected: BTreeSet<_> =
                    ["t_order", "t_user"].iter().map(|s| s.to_string()).collect();
                assert_eq!(expected, names);
            }
            other => panic!("unexpected error: {other}"),
        }

        let after = store.get_rules("test").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(!after.is_sharded("t_ok"));
    }

    #[test]
    fn algorithm_conflict_rejected() {
        let store = store_with_tables(&[]);
        store.apply_create("test", request(&["t_order"])).unwrap();
        let before = store.get_rules("test").unwrap();

        let mut conflicting = request(&["t_item"]);
        conflicting.algorithms.insert(
            "t_order_mod".to_string(),
            AlgorithmConfig::new("HASH_MOD").with_prop(SHARDING_COUNT_PROP, "8"),
        );

        let err = store.apply_create("test", conflicting).unwrap_err();
        assert!(
            matches!(&err, RuleStoreError::AlgorithmConflict { name } if name == "t_order_mod"),
            "{err}"
        );
        assert!(Arc::ptr_eq(&before, &store.get_rules("test").unwrap()));
    }

    #[test]
    fn unknown_algorithm_rejected() {
        let store = store_with_tables(&[]);
        let config = ShardingRuleConfiguration {
            tables: vec![ShardingTableRule {
                logic_table: "t_order".to_string(),
                strategy: ShardStrategy::Standard {
                    sharding_columns: vec!["order_id".to_string()],
                    algorithm: "missing".to_string(),
                },
                data_nodes: vec![DataNode::new("ds_0", "t_order_0")],
            }],
            algorithms: Default::default(),
        };

        let err = store.apply_create("test", config).unwrap_err();
        assert!(matches!(err, RuleStoreError::InvalidRule(_)), "{err}");
        assert_eq!(0, store.get_rules("test").unwrap().version);
    }

    #[test]
    fn missing_schema() {
        let store = RuleStore::new(Arc::new(EmptyTableCatalog));
        assert!(matches!(
            store.get_rules("nope"),
            Err(RuleStoreError::MissingSchema(_))
        ));
        assert!(matches!(
            store.apply_create("nope", request(&["t_order"])),
            Err(RuleStoreError::MissingSchema(_))
        ));
    }

    #[test]
    fn install_snapshot_only_if_newer() {
        let store = store_with_tables(&[]);
        let v1 = store.apply_create("test", request(&["t_order"])).unwrap();

        assert!(!store.install_snapshot(v1.clone()));

        let mut v5 = (*v1).clone();
        v5.version = 5;
        assert!(store.install_snapshot(Arc::new(v5)));
        assert_eq!(5, store.get_rules("test").unwrap().version);

        // Unknown schemas get registered.
        let mut other = RuleConfigurationSet::empty("other");
        other.version = 1;
        assert!(store.install_snapshot(Arc::new(other)));
        assert_eq!(vec!["other", "test"], store.schema_names());
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let store = store_with_tables(&[]);
        let before = store.get_rules("test").unwrap();

        store.apply_create("test", request(&["t_order"])).unwrap();

        assert_eq!(0, before.version);
        assert!(!before.is_sharded("t_order"));
        assert!(store.get_rules("test").unwrap().is_sharded("t_order"));
    }

    #[test]
    fn concurrent_creates_on_one_schema() {
        let store = Arc::new(store_with_tables(&[]));

        let handles: Vec<_> = (0..8)
            .map(|idx| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .apply_create("test", request(&[format!("t_{idx}").as_str()]))
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let rules = store.get_rules("test").unwrap();
        assert_eq!(8, rules.version);
        assert_eq!(8, rules.table_rule_count());
    }
}
