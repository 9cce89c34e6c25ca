//! Routing of logical table references to physical targets.
pub mod classify;
pub mod errors;
pub mod route;
pub mod strategy;
pub mod target;
