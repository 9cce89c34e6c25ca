//! Logical schema metadata.
//!
//! Combines the table catalog fetched from physical backends with a schema's
//! sharding rules to produce the logical view of the schema used for routing
//! and federated execution.
pub mod builder;
pub mod catalog;
pub mod errors;
pub mod registry;
