//! Sharding proxy.
//!
//! Wires the rule store, change bus, schema metadata, router and federation
//! executor together behind a single [`context::ShardingContext`].
pub mod commands;
pub mod context;
pub mod errors;
