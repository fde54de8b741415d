//! broker-catalog
//!
//! Pure domain types for the service broker's catalog: Services, Plans,
//! RDSProperties, and catalog-wide validation. No AWS SDK or SQL dependency —
//! this is the shared vocabulary the other broker crates build on.

pub mod catalog;
pub mod error;
pub mod identity;
pub mod plan;
pub mod rds_properties;
pub mod service;

pub use catalog::Catalog;
pub use error::CatalogError;
pub use plan::Plan;
pub use rds_properties::RdsProperties;
pub use service::Service;
