//! broker-rds
//!
//! RDS Facade over the AWS RDS API, the Tag Model that carries the broker's
//! only durable state, and the Parameter Group Selector.

pub mod aws_facade;
pub mod error;
pub mod facade;
pub mod parameter_group;
pub mod tags;

pub use aws_facade::AwsRdsFacade;
pub use error::RdsError;
pub use facade::{
    ApplyMethod, CreateInstanceSpec, GetTagsOptions, InstanceDescription, ModifyInstanceSpec,
    ParameterSetting, RdsFacade, RestoreInstanceSpec, SnapshotDescription,
};
pub use tags::Tag;
