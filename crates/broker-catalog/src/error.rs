use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("empty {0} in catalog")]
    EmptyField(&'static str),

    #[error("plan {plan} excluded by engine filter {engine:?}")]
    ExcludedEngine { plan: String, engine: String },

    #[error("invalid exclude-engines pattern: {0}")]
    InvalidExcludePattern(#[from] regex::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
