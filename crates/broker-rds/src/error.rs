use thiserror::Error;

/// Errors surfaced by the RDS facade. The three sentinel variants are the
/// ones the orchestrator matches on directly; everything else is an opaque
/// passthrough of the underlying provider error.
#[derive(Debug, Error)]
pub enum RdsError {
    #[error("DB instance not found: {0}")]
    InstanceNotFound(String),

    #[error("DB instance already exists: {0}")]
    InstanceAlreadyExists(String),

    #[error("parameter group not found: {0}")]
    ParameterGroupNotFound(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RdsError {
    pub fn is_instance_not_found(&self) -> bool {
        matches!(self, RdsError::InstanceNotFound(_))
    }
}
