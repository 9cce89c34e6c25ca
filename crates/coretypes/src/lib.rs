//! Core value types shared between routing and federated execution.
pub mod datatype;
pub mod row;
pub mod scalar;
pub mod stream;
pub mod totalfloat;

/// Error type used at boundaries with external collaborators (physical
/// backends, catalog sources).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
