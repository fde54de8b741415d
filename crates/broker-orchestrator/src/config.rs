use broker_catalog::Catalog;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error(transparent)]
    Catalog(#[from] broker_catalog::CatalogError),
}

/// Process-wide broker configuration, per spec §6. Loading this from a file
/// or environment is an external collaborator's concern; this struct is
/// constructed in-process and validated, never parsed from disk here.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub region: String,
    pub db_prefix: String,
    pub broker_name: String,
    pub master_password_seed: String,
    pub aws_partition: String,
    pub aws_tag_cache_seconds: u64,
    pub allow_user_provision_parameters: bool,
    pub allow_user_update_parameters: bool,
    pub allow_user_bind_parameters: bool,
    pub catalog: Catalog,
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.is_empty() {
            return Err(ConfigError::EmptyField("region"));
        }
        if self.db_prefix.is_empty() {
            return Err(ConfigError::EmptyField("db_prefix"));
        }
        if self.broker_name.is_empty() {
            return Err(ConfigError::EmptyField("broker_name"));
        }
        if self.master_password_seed.is_empty() {
            return Err(ConfigError::EmptyField("master_password_seed"));
        }
        self.catalog.validate()?;
        Ok(())
    }
}
