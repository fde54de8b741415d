//! RDS Facade: a thin, uniform interface over the cloud provider. All
//! mutating calls are non-blocking on the broker side — they return as soon
//! as the provider has queued the change; the instance transitions
//! asynchronously and is observed via `describe`/`LastOperation`.

use async_trait::async_trait;

use crate::error::RdsError;
use crate::tags::Tag;

#[derive(Debug, Clone, Default)]
pub struct CreateInstanceSpec {
    pub db_instance_identifier: String,
    pub engine: String,
    pub engine_version: String,
    pub db_instance_class: String,
    pub allocated_storage: i32,
    pub db_name: Option<String>,
    pub master_username: String,
    pub master_password: String,
    pub port: Option<i32>,
    pub publicly_accessible: Option<bool>,
    pub vpc_security_group_ids: Option<Vec<String>>,
    pub db_subnet_group_name: Option<String>,
    pub db_parameter_group_name: Option<String>,
    pub storage_encrypted: Option<bool>,
    pub kms_key_id: Option<String>,
    pub multi_az: Option<bool>,
    pub backup_retention_period: Option<i32>,
    pub storage_type: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreInstanceSpec {
    pub source_snapshot_identifier: String,
    pub target_db_instance_identifier: String,
    pub db_instance_class: Option<String>,
    pub publicly_accessible: Option<bool>,
    pub tags: Vec<Tag>,
}

/// Every field is an optional override: only fields present here are sent to
/// `ModifyDBInstance`.
#[derive(Debug, Clone, Default)]
pub struct ModifyInstanceSpec {
    pub db_instance_identifier: String,
    pub db_instance_class: Option<String>,
    pub allocated_storage: Option<i32>,
    pub master_user_password: Option<String>,
    pub vpc_security_group_ids: Option<Vec<String>>,
    pub db_subnet_group_name: Option<String>,
    pub db_parameter_group_name: Option<String>,
    pub storage_encrypted: Option<bool>,
    pub kms_key_id: Option<String>,
    pub multi_az: Option<bool>,
    pub backup_retention_period: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct InstanceDescription {
    pub db_instance_identifier: String,
    pub arn: String,
    pub status: String,
    pub engine: String,
    pub endpoint_address: Option<String>,
    pub endpoint_port: Option<i32>,
    pub db_parameter_groups: Vec<String>,
    /// `true` when RDS reports a pending-modified-values block that hasn't
    /// applied yet.
    pub has_pending_modified_values: bool,
}

#[derive(Debug, Clone)]
pub struct SnapshotDescription {
    pub snapshot_identifier: String,
    pub arn: String,
    /// RFC3339 timestamp. Compared lexicographically, which is
    /// time-ordering-correct for RFC3339.
    pub create_time: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetTagsOptions {
    /// Bypass any provider-side tag cache. MUST be set while a LastOperation
    /// poll is in-progress so pending-flag tags set moments ago are seen.
    pub refresh_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMethod {
    Immediate,
    PendingReboot,
}

#[derive(Debug, Clone)]
pub struct ParameterSetting {
    pub name: String,
    pub value: String,
    pub apply_method: ApplyMethod,
}

#[async_trait]
pub trait RdsFacade: Send + Sync {
    async fn create(&self, spec: CreateInstanceSpec) -> Result<(), RdsError>;

    async fn restore(&self, spec: RestoreInstanceSpec) -> Result<(), RdsError>;

    async fn modify(
        &self,
        spec: ModifyInstanceSpec,
        apply_immediately: bool,
    ) -> Result<InstanceDescription, RdsError>;

    async fn reboot(&self, id: &str, force_failover: Option<bool>) -> Result<(), RdsError>;

    async fn delete(&self, id: &str, skip_final_snapshot: bool) -> Result<(), RdsError>;

    async fn describe(&self, id: &str) -> Result<InstanceDescription, RdsError>;

    async fn describe_by_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<InstanceDescription>, RdsError>;

    async fn describe_snapshots(
        &self,
        source_db_instance_identifier: &str,
    ) -> Result<Vec<SnapshotDescription>, RdsError>;

    async fn get_resource_tags(
        &self,
        arn: &str,
        options: GetTagsOptions,
    ) -> Result<Vec<Tag>, RdsError>;

    async fn add_tags_to_resource(&self, arn: &str, tags: Vec<Tag>) -> Result<(), RdsError>;

    async fn remove_tag(&self, id: &str, key: &str) -> Result<(), RdsError>;

    /// `Ok(())` if the parameter group exists, `Err(ParameterGroupNotFound)`
    /// otherwise.
    async fn get_parameter_group(&self, name: &str) -> Result<(), RdsError>;

    async fn create_parameter_group(&self, name: &str, family: &str) -> Result<(), RdsError>;

    async fn modify_parameter_group(
        &self,
        name: &str,
        parameters: Vec<ParameterSetting>,
    ) -> Result<(), RdsError>;
}
