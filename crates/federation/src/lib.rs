//! Federated execution of statements spanning multiple physical targets.
//!
//! A statement is bound against the schema's logical metadata, routed, and
//! planned into a [`plan::FederationPlan`]. The plan's sub-queries are fanned
//! out to the physical executor concurrently. Once every sub-query has
//! completed, rows are joined and merged in process.
pub mod aggregate;
pub mod errors;
pub mod executor;
pub mod join;
pub mod memory;
pub mod merge;
pub mod physical;
pub mod plan;
pub mod statement;

#[cfg(test)]
mod testutil;
