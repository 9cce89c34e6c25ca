//! Shared configuration for the sharding proxy crates.
pub mod config;
pub mod errors;
