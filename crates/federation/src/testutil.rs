//! Shared fixtures for federation tests.
use std::collections::BTreeMap;
use std::sync::Arc;

use coretypes::datatype::DataType;
use coretypes::row;
use coretypes::row::Row;
use router::route::Router;
use router::strategy::BuiltinEvaluator;
use rulestore::store::RuleStore;
use rulestore::types::{
    AlgorithmConfig,
    DataNode,
    ShardStrategy,
    ShardingRuleConfiguration,
    ShardingTableRule,
};
use schemameta::catalog::{ColumnMetadata, PhysicalTable, RawCatalog, StaticCatalogSource};
use schemameta::registry::LogicSchemaRegistry;

use crate::executor::FederationExecutor;
use crate::memory::MemoryExecutor;

pub const ITEM_REMARKS: &str = "t_order_item_federate_sharding";

pub struct Fixture {
    pub store: Arc<RuleStore>,
    pub registry: Arc<LogicSchemaRegistry>,
    pub router: Arc<Router>,
    pub physical: Arc<MemoryExecutor>,
}

impl Fixture {
    pub fn executor(&self, max_concurrency: usize) -> FederationExecutor {
        FederationExecutor::new(
            self.router.clone(),
            self.registry.clone(),
            self.physical.clone(),
            max_concurrency,
        )
    }
}

fn int(name: &str) -> ColumnMetadata {
    ColumnMetadata::new(name, DataType::Int32)
}

fn text(name: &str) -> ColumnMetadata {
    ColumnMetadata::new(name, DataType::Utf8)
}

fn mod_rule(table: &str, column: &str) -> ShardingTableRule {
    ShardingTableRule {
        logic_table: table.to_string(),
        strategy: ShardStrategy::Standard {
            sharding_columns: vec![column.to_string()],
            algorithm: "mod_2".to_string(),
        },
        data_nodes: vec![
            DataNode::new("ds_0", format!("{table}_0")),
            DataNode::new("ds_1", format!("{table}_1")),
        ],
    }
}

/// Schema `test` with:
///
/// - plain `t_order_federate` and `t_user`
/// - `t_order_item_federate_sharding` sharded on `item_id`, 2 shards
/// - `t_order_federate_sharding` sharded on `order_id_sharding`, 2 shards
pub async fn fixture() -> Fixture {
    logutil::init_test();

    let order_cols = vec![int("order_id"), int("status"), text("remarks")];
    let item_cols = vec![int("item_id"), int("order_id"), int("user_id"), text("remarks")];
    let order_sharding_cols = vec![int("order_id_sharding"), int("user_id"), text("remarks")];
    let user_cols = vec![int("user_id"), text("user_name")];

    let mut catalog = RawCatalog::default()
        .with_table(PhysicalTable::new("ds_0", "t_order_federate", order_cols))
        .with_table(PhysicalTable::new("ds_1", "t_user", user_cols));
    for shard in 0..2 {
        let ds = format!("ds_{shard}");
        catalog = catalog
            .with_table(PhysicalTable::new(
                ds.clone(),
                format!("t_order_item_federate_sharding_{shard}"),
                item_cols.clone(),
            ))
            .with_table(PhysicalTable::new(
                ds,
                format!("t_order_federate_sharding_{shard}"),
                order_sharding_cols.clone(),
            ));
    }
    let source = StaticCatalogSource::new();
    source.insert("test", catalog);

    let registry = Arc::new(LogicSchemaRegistry::new(Arc::new(source)));
    let store = Arc::new(RuleStore::new(registry.clone()));
    registry
        .load_schema(store.register_schema("test"))
        .await
        .unwrap();

    let mut algorithms = BTreeMap::new();
    algorithms.insert("mod_2".to_string(), AlgorithmConfig::new("MOD"));
    let rules = store
        .apply_create(
            "test",
            ShardingRuleConfiguration {
                tables: vec![
                    mod_rule("t_order_item_federate_sharding", "item_id"),
                    mod_rule("t_order_federate_sharding", "order_id_sharding"),
                ],
                algorithms,
            },
        )
        .unwrap();
    registry.load_schema(rules).await.unwrap();

    let physical = Arc::new(MemoryExecutor::new());
    insert(
        &physical,
        "ds_0",
        "t_order_federate",
        &["order_id", "status", "remarks"],
        vec![row![1000, 10, "init"], row![1001, 11, "init"]],
    );
    insert(
        &physical,
        "ds_1",
        "t_user",
        &["user_id", "user_name"],
        vec![row![10, "alice"], row![11, "bob"], row![12, "carol"]],
    );
    let item_names = ["item_id", "order_id", "user_id", "remarks"];
    insert(
        &physical,
        "ds_0",
        "t_order_item_federate_sharding_0",
        &item_names,
        vec![
            row![1000, 10000, 11, ITEM_REMARKS],
            row![1010, 10001, 12, ITEM_REMARKS],
        ],
    );
    insert(
        &physical,
        "ds_1",
        "t_order_item_federate_sharding_1",
        &item_names,
        vec![
            row![1001, 10001, 10, ITEM_REMARKS],
            row![1011, 10001, 13, "other"],
        ],
    );
    let order_sharding_names = ["order_id_sharding", "user_id", "remarks"];
    insert(
        &physical,
        "ds_0",
        "t_order_federate_sharding_0",
        &order_sharding_names,
        vec![row![1010, 11, "t_order_federate_sharding"]],
    );
    insert(
        &physical,
        "ds_1",
        "t_order_federate_sharding_1",
        &order_sharding_names,
        vec![row![1011, 11, "t_order_federate_sharding"]],
    );

    let router = Arc::new(Router::new(
        store.clone(),
        registry.clone(),
        Arc::new(BuiltinEvaluator),
    ));

    Fixture {
        store,
        registry,
        router,
        physical,
    }
}

fn insert(exec: &MemoryExecutor, ds: &str, table: &str, columns: &[&str], rows: Vec<Row>) {
    exec.insert_table(DataNode::new(ds, table), columns, rows);
}
