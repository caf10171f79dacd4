//! Common types for routecheck: errors, configuration, retry and logging

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod retry;
pub mod telemetry;
pub mod yaml;

pub use config::EngineConfig;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on patches submitted by the engine
pub const FIELD_MANAGER: &str = "routecheck";

/// Label applied to every resource created from a descriptor
pub const LABEL_CREATED_BY: &str = "routecheck.io/created-by";

/// Label carrying the run ID of the test process that created a resource
pub const LABEL_RUN_ID: &str = "routecheck.io/run-id";
