use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::service::Service;

/// Engine families the RDS facade and parameter-group selector know how to
/// manage. Anything else fails catalog validation.
pub const SUPPORTED_ENGINE_FAMILIES: &[&str] = &["postgres", "mysql"];

/// Ordered, uniquely-keyed sequence of Services, immutable after startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Catalog {
    pub services: Vec<Service>,
    /// Regex patterns; a plan whose engine matches any of these is rejected
    /// by `validate()` even if the engine is otherwise supported.
    #[serde(default)]
    pub exclude_engines: Vec<String>,
}

impl Catalog {
    pub fn find_service(&self, service_id: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.id == service_id)
    }

    pub fn find_plan(&self, plan_id: &str) -> Option<(&Service, &crate::plan::Plan)> {
        self.services
            .iter()
            .find_map(|s| s.find_plan(plan_id).map(|p| (s, p)))
    }

    /// Recursively validate every service/plan/RDSProperties and cross-check
    /// the catalog-level `exclude_engines` regex list.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.services.is_empty() {
            return Err(CatalogError::EmptyField("services"));
        }

        let exclude_patterns: Vec<Regex> = self
            .exclude_engines
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<_, _>>()?;

        let mut seen_service_ids = std::collections::HashSet::new();
        for service in &self.services {
            if service.id.is_empty() {
                return Err(CatalogError::EmptyField("service.id"));
            }
            if !seen_service_ids.insert(service.id.as_str()) {
                return Err(CatalogError::EmptyField("service.id (duplicate)"));
            }
            if service.name.is_empty() {
                return Err(CatalogError::EmptyField("service.name"));
            }
            if service.plans.is_empty() {
                return Err(CatalogError::EmptyField("service.plans"));
            }

            let mut seen_plan_ids = std::collections::HashSet::new();
            for plan in &service.plans {
                if plan.id.is_empty() {
                    return Err(CatalogError::EmptyField("plan.id"));
                }
                if !seen_plan_ids.insert(plan.id.as_str()) {
                    return Err(CatalogError::EmptyField("plan.id (duplicate)"));
                }
                self.validate_rds_properties(&plan.id, &plan.rds_properties, &exclude_patterns)?;
            }
        }

        Ok(())
    }

    fn validate_rds_properties(
        &self,
        plan_id: &str,
        props: &crate::rds_properties::RdsProperties,
        exclude_patterns: &[Regex],
    ) -> Result<(), CatalogError> {
        if props.db_instance_class.is_empty() {
            return Err(CatalogError::EmptyField("rds_properties.db_instance_class"));
        }
        if props.engine.is_empty() {
            return Err(CatalogError::EmptyField("rds_properties.engine"));
        }
        if props.engine_version.is_empty() {
            return Err(CatalogError::EmptyField("rds_properties.engine_version"));
        }
        if props.allocated_storage <= 0 {
            return Err(CatalogError::EmptyField("rds_properties.allocated_storage"));
        }

        if !SUPPORTED_ENGINE_FAMILIES.contains(&props.engine.as_str()) {
            return Err(CatalogError::ExcludedEngine {
                plan: plan_id.to_string(),
                engine: props.engine.clone(),
            });
        }

        for pattern in exclude_patterns {
            if pattern.is_match(&props.engine) {
                return Err(CatalogError::ExcludedEngine {
                    plan: plan_id.to_string(),
                    engine: props.engine.clone(),
                });
            }
        }

        Ok(())
    }
}
