use serde::{Deserialize, Serialize};

use crate::rds_properties::RdsProperties;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rds_properties: RdsProperties,
    #[serde(default)]
    pub free: Option<bool>,
}
