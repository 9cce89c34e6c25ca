use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use common::config::ShardConfig;
use federation::memory::MemoryExecutor;
use rulestore::segment::TableRuleSegment;
use schemameta::catalog::StaticCatalogSource;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

use crate::context::ShardingContext;

#[derive(Subcommand)]
pub enum Commands {
    /// Print the physical targets for one or more logical tables.
    Route(RouteArgs),
    /// Validate the configured sharding rules against the catalog.
    Check,
}

#[derive(Debug, Args)]
pub struct RouteArgs {
    /// Schema containing the tables.
    pub schema: String,
    /// Logical tables to route.
    #[clap(required = true)]
    pub tables: Vec<String>,
}

impl Commands {
    pub fn run(self, config: ShardConfig) -> Result<()> {
        let runtime = build_runtime("shardproxy")?;
        runtime.block_on(async move {
            match self {
                Commands::Route(args) => route(config, args).await,
                Commands::Check => check(config).await,
            }
        })
    }
}

/// Context over the statically configured catalog. There are no live
/// backends, so physical queries run against empty in-memory tables.
fn static_context(config: ShardConfig) -> Result<ShardingContext> {
    let catalog = StaticCatalogSource::from_bootstrap(&config.schemas)?;
    Ok(ShardingContext::new(
        config,
        Arc::new(catalog),
        Arc::new(MemoryExecutor::new()),
    ))
}

async fn route(config: ShardConfig, args: RouteArgs) -> Result<()> {
    let ctx = static_context(config)?;
    ctx.bootstrap().await?;

    let tables: Vec<_> = args.tables.iter().map(|s| s.as_str()).collect();
    for target in ctx.route(&args.schema, &tables)? {
        println!("{target}");
    }

    ctx.shutdown().await;
    Ok(())
}

async fn check(config: ShardConfig) -> Result<()> {
    if config.schemas.is_empty() {
        return Err(anyhow!("no schemas configured"));
    }

    let schemas = config.schemas.clone();
    let ctx = static_context(config)?;
    for schema in &schemas {
        ctx.load_schema(&schema.name).await?;
        let segments: Vec<TableRuleSegment> =
            schema.rules.iter().cloned().map(Into::into).collect();
        let rules = ctx.check_sharding_table_rule(&schema.name, &segments)?;
        info!(schema = %schema.name, tables = rules.tables.len(), "rules valid");
        println!("{}", serde_json::to_string_pretty(&rules)?);
    }

    ctx.shutdown().await;
    Ok(())
}

fn build_runtime(thread_label: &'static str) -> Result<Runtime> {
    let runtime = Builder::new_multi_thread()
        .thread_name_fn(move || {
            static THREAD_ID: AtomicU64 = AtomicU64::new(0);
            let id = THREAD_ID.fetch_add(1, Ordering::Relaxed);
            format!("{}-thread-{}", thread_label, id)
        })
        .enable_all()
        .build()?;

    Ok(runtime)
}
