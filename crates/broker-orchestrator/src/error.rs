use thiserror::Error;

use broker_catalog::CatalogError;
use broker_rds::RdsError;
use broker_sql::SqlError;

/// Top-level error the platform API layer matches on. Wraps every
/// lower-layer error plus the broker-specific variants from spec §7.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("instance does not exist: {0}")]
    InstanceDoesNotExist(String),

    #[error("asynchronous operation support is required")]
    AsyncRequired,

    #[error("plan change not supported")]
    PlanChangeNotSupported,

    #[error("encryption setting cannot be updated across plans")]
    EncryptionNotUpdateable,

    #[error("operation failed: {0}")]
    Operational(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Rds(#[from] RdsError),

    #[error(transparent)]
    Sql(#[from] SqlError),
}

impl BrokerError {
    /// The HTTP status an (out-of-scope) transport layer would map this to,
    /// per spec §6.
    pub fn status_hint(&self) -> u16 {
        match self {
            BrokerError::InstanceDoesNotExist(_) => 410,
            BrokerError::AsyncRequired => 422,
            BrokerError::PlanChangeNotSupported => 422,
            BrokerError::Validation(_) => 400,
            BrokerError::PlanNotFound(_) | BrokerError::ServiceNotFound(_) => 404,
            BrokerError::EncryptionNotUpdateable => 422,
            BrokerError::Operational(_) | BrokerError::Catalog(_) | BrokerError::Rds(_) | BrokerError::Sql(_) => 502,
        }
    }

    /// The platform's machine-readable error code, where one is defined.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            BrokerError::AsyncRequired => Some("AsyncRequired"),
            BrokerError::PlanChangeNotSupported => Some("PlanChangeNotSupported"),
            _ => None,
        }
    }
}
