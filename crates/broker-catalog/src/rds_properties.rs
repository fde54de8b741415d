use serde::{Deserialize, Serialize};

/// A plan's baseline provider configuration.
///
/// Only `db_instance_class`, `engine`, `engine_version` and
/// `allocated_storage` are required; everything else is an optional override
/// forwarded to the RDS facade verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RdsProperties {
    pub db_instance_class: String,
    pub engine: String,
    pub engine_version: String,
    pub allocated_storage: i32,

    pub skip_final_snapshot: Option<bool>,
    pub auto_minor_version_upgrade: Option<bool>,
    pub availability_zone: Option<String>,
    pub backup_retention_period: Option<i32>,
    pub character_set_name: Option<String>,
    pub copy_tags_to_snapshot: Option<bool>,
    pub db_parameter_group_name: Option<String>,
    pub security_groups: Option<Vec<String>>,
    pub vpc_security_group_ids: Option<Vec<String>>,
    pub db_subnet_group_name: Option<String>,
    pub iops: Option<i32>,
    pub kms_key_id: Option<String>,
    pub license_model: Option<String>,
    pub multi_az: Option<bool>,
    pub option_group_name: Option<String>,
    pub port: Option<i32>,
    pub preferred_backup_window: Option<String>,
    pub preferred_maintenance_window: Option<String>,
    pub publicly_accessible: Option<bool>,
    pub storage_encrypted: Option<bool>,
    pub storage_type: Option<String>,

    #[serde(default)]
    pub default_extensions: Vec<String>,
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

impl RdsProperties {
    /// `true` when `name` is present in the plan's `AllowedExtensions`.
    pub fn allows_extension(&self, name: &str) -> bool {
        self.allowed_extensions.iter().any(|e| e == name)
    }
}
