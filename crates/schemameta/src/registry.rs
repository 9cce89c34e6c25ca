//! Registry of every loaded logical schema.
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rulestore::bus::{ChangeEvent, Subscription};
use rulestore::store::LogicalTableCatalog;
use rulestore::types::RuleConfigurationSet;
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, error, info, Instrument};

use crate::builder::{build, LogicalSchema};
use crate::catalog::CatalogSource;
use crate::errors::{MetadataBuildError, Result};

/// What happened when a change event was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The schema was rebuilt from the event's rules.
    Rebuilt,
    /// The event was already applied, or is older than what's loaded.
    Skipped,
}

/// Logical schemas by name, in load order.
///
/// Each schema is replaced wholesale on rebuild. A failed rebuild leaves the
/// previous schema in place.
pub struct LogicSchemaRegistry {
    schemas: RwLock<IndexMap<String, Arc<LogicalSchema>>>,
    source: Arc<dyn CatalogSource>,
    /// Serializes rebuilds. Held across catalog fetches.
    rebuild: tokio::sync::Mutex<()>,
}

impl LogicSchemaRegistry {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        LogicSchemaRegistry {
            schemas: RwLock::new(IndexMap::new()),
            source,
            rebuild: tokio::sync::Mutex::new(()),
        }
    }

    /// Load (or reload) a schema with the given rules.
    ///
    /// If the schema is already loaded with newer rules, the loaded schema is
    /// returned as is. Reloading with the same version rebuilds from a fresh
    /// catalog.
    pub async fn load_schema(&self, rules: Arc<RuleConfigurationSet>) -> Result<Arc<LogicalSchema>> {
        let _guard = self.rebuild.lock().await;

        if let Some(current) = self.get(&rules.schema) {
            if rules.version < current.rules_version() {
                debug!(schema = %rules.schema, version = rules.version, loaded = current.rules_version(), "keeping newer schema metadata");
                return Ok(current);
            }
        }

        self.rebuild_schema(rules).await
    }

    /// Load every schema. Stops at the first schema that fails to build.
    pub async fn load_all(
        &self,
        rules: impl IntoIterator<Item = Arc<RuleConfigurationSet>>,
    ) -> Result<()> {
        for rules in rules {
            self.load_schema(rules).await?;
        }
        Ok(())
    }

    /// Apply a change event, rebuilding the affected schema.
    ///
    /// Applying the same event more than once has the same effect as applying
    /// it once.
    pub async fn apply_event(&self, event: &ChangeEvent) -> Result<ApplyOutcome> {
        let _guard = self.rebuild.lock().await;

        if let Some(current) = self.get(event.schema()) {
            let loaded = &current.rules;
            let stale = event.version() < loaded.version;
            let duplicate = event.version() == loaded.version && event.rules.same_rules(loaded);
            if stale || duplicate {
                debug!(schema = %event.schema(), version = event.version(), loaded = loaded.version, "skipping change event");
                return Ok(ApplyOutcome::Skipped);
            }
        }

        self.rebuild_schema(event.rules.clone()).await?;
        Ok(ApplyOutcome::Rebuilt)
    }

    /// Spawn a task applying every event received on the subscription.
    ///
    /// Failed rebuilds are logged and the task keeps going. The task exits
    /// once the bus is closed.
    pub fn spawn_subscriber(self: &Arc<Self>, mut subscription: Subscription) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(
            async move {
                while let Some(event) = subscription.recv().await {
                    if let Err(e) = registry.apply_event(&event).await {
                        error!(%e, schema = %event.schema(), version = event.version(), "failed to apply change event");
                    }
                }
                debug!("change subscription closed");
            }
            .instrument(debug_span!("schema_metadata_subscriber")),
        )
    }

    pub fn get(&self, schema: &str) -> Option<Arc<LogicalSchema>> {
        self.schemas.read().get(schema).cloned()
    }

    pub fn get_required(&self, schema: &str) -> Result<Arc<LogicalSchema>> {
        self.get(schema)
            .ok_or_else(|| MetadataBuildError::MissingSchema(schema.to_string()))
    }

    /// Names of loaded schemas in load order.
    pub fn schema_names(&self) -> Vec<String> {
        self.schemas.read().keys().cloned().collect()
    }

    async fn rebuild_schema(&self, rules: Arc<RuleConfigurationSet>) -> Result<Arc<LogicalSchema>> {
        let schema = rules.schema.clone();
        let catalog = match self.source.fetch_catalog(&schema).await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!(%e, %schema, "failed to fetch catalog, keeping previous metadata");
                return Err(MetadataBuildError::CatalogFetch { schema, source: e });
            }
        };

        let built = Arc::new(build(&schema, &catalog, rules)?);
        info!(%schema, version = built.rules_version(), tables = built.tables.len(), "built schema metadata");

        self.schemas.write().insert(schema, built.clone());
        Ok(built)
    }
}

impl LogicalTableCatalog for LogicSchemaRegistry {
    fn logical_tables(&self, schema: &str) -> Vec<String> {
        match self.get(schema) {
            Some(schema) => schema.table_names().map(|s| s.to_string()).collect(),
            None => Vec::new(),
        }
    }
}

impl std::fmt::Debug for LogicSchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicSchemaRegistry")
            .field("schemas", &self.schema_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use coretypes::datatype::DataType;
    use coretypes::BoxError;
    use rulestore::bus::ChangeBus;
    use rulestore::types::{
        AlgorithmConfig,
        DataNode,
        ShardStrategy,
        ShardingRuleConfiguration,
        ShardingTableRule,
    };

    use super::*;
    use crate::catalog::{ColumnMetadata, PhysicalTable, RawCatalog, StaticCatalogSource};

    /// Catalog source that can be switched to fail.
    #[derive(Debug, Default)]
    struct FlakySource {
        inner: StaticCatalogSource,
        fail: AtomicBool,
    }

    #[async_trait]
    impl CatalogSource for FlakySource {
        async fn fetch_catalog(&self, schema: &str) -> Result<RawCatalog, BoxError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("backend unavailable".into());
            }
            self.inner.fetch_catalog(schema).await
        }
    }

    fn source() -> Arc<FlakySource> {
        logutil::init_test();
        let source = FlakySource::default();
        let columns = vec![ColumnMetadata::new("item_id", DataType::Int32)];
        source.inner.insert(
            "test",
            RawCatalog::default()
                .with_table(PhysicalTable::new("ds_0", "t_order", Vec::new()))
                .with_table(PhysicalTable::new("ds_0", "t_item_0", columns.clone()))
                .with_table(PhysicalTable::new("ds_1", "t_item_1", columns)),
        );
        Arc::new(source)
    }

    fn sharded(version: u64) -> Arc<RuleConfigurationSet> {
        let mut algorithms = BTreeMap::new();
        algorithms.insert("t_item_mod".to_string(), AlgorithmConfig::new("MOD"));
        Arc::new(RuleConfigurationSet {
            schema: "test".to_string(),
            version,
            sharding: Some(ShardingRuleConfiguration {
                tables: vec![ShardingTableRule {
                    logic_table: "t_item".to_string(),
                    strategy: ShardStrategy::Standard {
                        sharding_columns: vec!["item_id".to_string()],
                        algorithm: "t_item_mod".to_string(),
                    },
                    data_nodes: vec![
                        DataNode::new("ds_0", "t_item_0"),
                        DataNode::new("ds_1", "t_item_1"),
                    ],
                }],
                algorithms,
            }),
        })
    }

    #[tokio::test]
    async fn load_and_lookup() {
        let registry = LogicSchemaRegistry::new(source());
        registry
            .load_all([Arc::new(RuleConfigurationSet::empty("test"))])
            .await
            .unwrap();

        assert_eq!(vec!["test"], registry.schema_names());
        assert_eq!(
            vec!["t_order", "t_item_0", "t_item_1"],
            registry.logical_tables("test")
        );
        assert!(registry.logical_tables("missing").is_empty());
        assert!(matches!(
            registry.get_required("missing"),
            Err(MetadataBuildError::MissingSchema(_))
        ));
    }

    #[tokio::test]
    async fn load_unknown_schema_fails() {
        let registry = LogicSchemaRegistry::new(source());
        let err = registry
            .load_schema(Arc::new(RuleConfigurationSet::empty("missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataBuildError::CatalogFetch { .. }), "{err}");
        assert!(registry.schema_names().is_empty());
    }

    #[tokio::test]
    async fn duplicate_delivery_is_noop() {
        let registry = LogicSchemaRegistry::new(source());
        registry
            .load_schema(Arc::new(RuleConfigurationSet::empty("test")))
            .await
            .unwrap();

        let event = ChangeEvent::new(sharded(1));
        assert_eq!(ApplyOutcome::Rebuilt, registry.apply_event(&event).await.unwrap());
        let once = registry.get("test").unwrap();

        assert_eq!(ApplyOutcome::Skipped, registry.apply_event(&event).await.unwrap());
        let twice = registry.get("test").unwrap();

        assert_eq!(once, twice);
        assert!(twice.table("t_item").unwrap().is_sharded());
    }

    #[tokio::test]
    async fn stale_event_skipped() {
        let registry = LogicSchemaRegistry::new(source());
        registry.load_schema(sharded(3)).await.unwrap();

        let outcome = registry
            .apply_event(&ChangeEvent::new(Arc::new(RuleConfigurationSet::empty("test"))))
            .await
            .unwrap();
        assert_eq!(ApplyOutcome::Skipped, outcome);
        assert_eq!(3, registry.get("test").unwrap().rules_version());
    }

    #[tokio::test]
    async fn reload_with_older_rules_keeps_newer() {
        let registry = LogicSchemaRegistry::new(source());
        registry.load_schema(sharded(2)).await.unwrap();
        let before = registry.get("test").unwrap();

        let loaded = registry
            .load_schema(Arc::new(RuleConfigurationSet::empty("test")))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&before, &loaded));
        assert_eq!(2, registry.get("test").unwrap().rules_version());
        assert!(registry.get("test").unwrap().table("t_item").unwrap().is_sharded());

        // Same version rebuilds.
        let reloaded = registry.load_schema(sharded(2)).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &reloaded));
        assert_eq!(2, reloaded.rules_version());
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous() {
        let source = source();
        let registry = LogicSchemaRegistry::new(source.clone());
        registry
            .load_schema(Arc::new(RuleConfigurationSet::empty("test")))
            .await
            .unwrap();
        let before = registry.get("test").unwrap();

        source.fail.store(true, Ordering::SeqCst);
        let err = registry
            .apply_event(&ChangeEvent::new(sharded(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataBuildError::CatalogFetch { .. }), "{err}");
        assert!(Arc::ptr_eq(&before, &registry.get("test").unwrap()));

        // Retrying once the backend is back succeeds.
        source.fail.store(false, Ordering::SeqCst);
        let outcome = registry
            .apply_event(&ChangeEvent::new(sharded(1)))
            .await
            .unwrap();
        assert_eq!(ApplyOutcome::Rebuilt, outcome);
    }

    #[tokio::test]
    async fn subscriber_task_rebuilds() {
        let registry = Arc::new(LogicSchemaRegistry::new(source()));
        registry
            .load_schema(Arc::new(RuleConfigurationSet::empty("test")))
            .await
            .unwrap();

        let bus = ChangeBus::new(4);
        let handle = registry.spawn_subscriber(bus.subscribe());

        bus.publish(ChangeEvent::new(sharded(1))).unwrap();
        bus.publish(ChangeEvent::new(sharded(1))).unwrap();
        bus.close();
        handle.await.unwrap();

        let schema = registry.get("test").unwrap();
        assert_eq!(1, schema.rules_version());
        assert!(schema.table("t_item").is_some());
    }
}
