//! Sharding rule configuration.
//!
//! Holds the authoritative mapping from logical tables to sharding strategies
//! for every logical schema, validates mutations to that mapping, and
//! publishes full rule snapshots to every interested party on change.
pub mod bus;
pub mod errors;
pub mod segment;
pub mod store;
pub mod types;
pub mod validation;
