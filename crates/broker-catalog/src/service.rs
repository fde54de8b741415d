use serde::{Deserialize, Serialize};

use crate::plan::Plan;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub plan_updatable: bool,
    pub plans: Vec<Plan>,
}

impl Service {
    /// Services are always bindable — derived, never stored.
    pub fn bindable(&self) -> bool {
        true
    }

    pub fn find_plan(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }
}
