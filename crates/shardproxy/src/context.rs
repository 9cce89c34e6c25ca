use std::sync::Arc;

use common::config::ShardConfig;
use federation::executor::FederationExecutor;
use federation::merge::MergedRows;
use federation::physical::PhysicalExecutor;
use federation::plan::FederationPlan;
use federation::statement::SelectStatement;
use router::route::Router;
use router::strategy::BuiltinEvaluator;
use router::target::RouteTarget;
use rulestore::bus::{ChangeBus, ChangeEvent, Subscription};
use rulestore::segment::{convert_segments, TableRuleSegment};
use rulestore::store::{LogicalTableCatalog, RuleStore};
use rulestore::types::{RuleConfigurationSet, ShardingRuleConfiguration};
use rulestore::validation::validate_create;
use schemameta::builder::LogicalSchema;
use schemameta::catalog::CatalogSource;
use schemameta::registry::{ApplyOutcome, LogicSchemaRegistry};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::Result;

/// Result of a successful rule update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResponse {
    /// Number of table rules created by the request.
    pub rules_created: usize,
    /// Rule version after the update.
    pub version: u64,
    /// Whether this node's schema metadata was rebuilt with the new rules.
    /// If not, the failure was logged and the metadata stays at the previous
    /// version until the next change event.
    pub metadata_refreshed: bool,
}

/// Every sharding component for a single proxy node.
pub struct ShardingContext {
    config: ShardConfig,
    bus: ChangeBus,
    store: Arc<RuleStore>,
    registry: Arc<LogicSchemaRegistry>,
    router: Arc<Router>,
    executor: FederationExecutor,
    subscriber: JoinHandle<()>,
}

impl ShardingContext {
    /// Create a new context.
    ///
    /// Must be called from within a tokio runtime, the metadata subscriber is
    /// spawned immediately.
    pub fn new(
        config: ShardConfig,
        catalog: Arc<dyn CatalogSource>,
        physical: Arc<dyn PhysicalExecutor>,
    ) -> Self {
        let bus = ChangeBus::new(config.bus.subscriber_buffer);
        let registry = Arc::new(LogicSchemaRegistry::new(catalog));
        let store = Arc::new(RuleStore::new(registry.clone()));
        let router = Arc::new(Router::new(
            store.clone(),
            registry.clone(),
            Arc::new(BuiltinEvaluator),
        ));
        let executor = FederationExecutor::new(
            router.clone(),
            registry.clone(),
            physical,
            config.federation.max_concurrency,
        );
        let subscriber = registry.spawn_subscriber(bus.subscribe());

        ShardingContext {
            config,
            bus,
            store,
            registry,
            router,
            executor,
            subscriber,
        }
    }

    /// Load every schema from the configuration, creating any configured
    /// rules.
    pub async fn bootstrap(&self) -> Result<()> {
        for schema in &self.config.schemas {
            self.load_schema(&schema.name).await?;
            if schema.rules.is_empty() {
                continue;
            }
            let segments: Vec<TableRuleSegment> =
                schema.rules.iter().cloned().map(Into::into).collect();
            self.create_sharding_table_rule(&schema.name, &segments)
                .await?;
        }
        Ok(())
    }

    /// Register a schema and build its metadata from the backend catalog.
    ///
    /// Reloading an already loaded schema rebuilds its metadata with the
    /// current rules.
    pub async fn load_schema(&self, schema: &str) -> Result<Arc<LogicalSchema>> {
        let rules = self.store.register_schema(schema);
        let metadata = self.registry.load_schema(rules).await?;
        Ok(metadata)
    }

    /// Check that segments could be created for a schema without creating
    /// them.
    pub fn check_sharding_table_rule(
        &self,
        schema: &str,
        segments: &[TableRuleSegment],
    ) -> Result<ShardingRuleConfiguration> {
        let rules = convert_segments(segments, &self.config.rules)?;
        let current = self.store.get_rules(schema)?;
        let catalog_tables = self.registry.logical_tables(schema);
        let existing = catalog_tables
            .iter()
            .map(|s| s.as_str())
            .chain(current.sharded_tables());
        validate_create(existing, &rules.tables)?;
        Ok(rules)
    }

    /// Create auto table rules for a schema.
    ///
    /// The whole request is rejected if any logical table is already known,
    /// or if a change subscriber has no room for the resulting event.
    /// On success the new rule set is applied to this node's metadata and
    /// published on the change bus.
    pub async fn create_sharding_table_rule(
        &self,
        schema: &str,
        segments: &[TableRuleSegment],
    ) -> Result<UpdateResponse> {
        let rules = self.check_sharding_table_rule(schema, segments)?;
        let rules_created = rules.tables.len();

        // A committed change must always be published, so take the queue slots
        // before committing. An overloaded subscriber rejects the request with
        // nothing applied.
        let permit = self.bus.reserve(schema)?;
        let updated = self.store.apply_create(schema, rules)?;
        let event = ChangeEvent::new(updated.clone());

        // Make the rules visible to statements on this node before returning.
        // The subscriber will see the same event and skip it.
        let metadata_refreshed = match self.registry.apply_event(&event).await {
            Ok(_) => true,
            Err(e) => {
                error!(%e, %schema, version = updated.version, "failed to refresh schema metadata");
                false
            }
        };

        permit.send(event);
        info!(%schema, version = updated.version, rules_created, "created sharding table rules");

        Ok(UpdateResponse {
            rules_created,
            version: updated.version,
            metadata_refreshed,
        })
    }

    /// Publish the schema's current rules again, e.g. for a peer that
    /// reconnected.
    pub fn republish(&self, schema: &str) -> Result<()> {
        let rules = self.store.get_rules(schema)?;
        self.bus.publish(ChangeEvent::new(rules))?;
        Ok(())
    }

    /// Apply a change event published by another node.
    pub async fn apply_peer_event(&self, event: &ChangeEvent) -> Result<ApplyOutcome> {
        let installed = self.store.install_snapshot(event.rules.clone());
        debug!(schema = %event.schema(), version = event.version(), installed, "received peer change event");
        Ok(self.registry.apply_event(event).await?)
    }

    /// Subscribe to change events for forwarding to other nodes.
    pub fn peer_events(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn rules(&self, schema: &str) -> Result<Arc<RuleConfigurationSet>> {
        Ok(self.store.get_rules(schema)?)
    }

    pub fn metadata(&self, schema: &str) -> Option<Arc<LogicalSchema>> {
        self.registry.get(schema)
    }

    /// Route each table to its physical targets.
    pub fn route(&self, schema: &str, tables: &[&str]) -> Result<Vec<RouteTarget>> {
        Ok(self.router.route(schema, tables)?)
    }

    pub fn plan_query(&self, schema: &str, stmt: &SelectStatement) -> Result<FederationPlan> {
        Ok(self.executor.plan(schema, stmt)?)
    }

    /// Execute a statement, federating it if needed.
    pub async fn execute_query(
        &self,
        schema: &str,
        stmt: &SelectStatement,
        cancel: &CancellationToken,
    ) -> Result<MergedRows> {
        Ok(self.executor.federate_execute(schema, stmt, cancel).await?)
    }

    /// Close the change bus and wait for the metadata subscriber to drain.
    pub async fn shutdown(self) {
        self.bus.close();
        if let Err(e) = self.subscriber.await {
            error!(%e, "metadata subscriber failed");
        }
    }
}

impl std::fmt::Debug for ShardingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardingContext")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
