//! Exercise plan produced by the planning stage

use serde::{Deserialize, Serialize};

/// One planned exercise, later consumed by the generation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    /// Identifier unique within the plan (e.g. "item-1")
    pub id: String,

    /// Exercise type (e.g. "cloze", "multiple_choice", "dialogue")
    pub exercise_type: String,

    /// Short human-readable title
    pub title: String,

    /// What this exercise should cover
    pub description: String,

    /// Estimated duration in minutes
    #[serde(default)]
    pub estimated_minutes: u32,

    /// Free-form generation parameters for this item
    #[serde(default)]
    pub parameters: serde_json::Value,

    /// Ids of earlier plan items this one builds on (soft dependencies;
    /// the sequential generation loop satisfies them by ordering)
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Ordered exercise plan plus plan-level metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Planned exercises in generation order
    pub items: Vec<PlanItem>,

    /// Why the plan is shaped this way
    #[serde(default)]
    pub rationale: String,

    /// Learning objectives the plan addresses
    #[serde(default)]
    pub objectives: Vec<String>,

    /// Total estimated duration in minutes
    #[serde(default)]
    pub total_minutes: u32,
}

impl Plan {
    /// Check whether a plan item id exists in this plan
    pub fn contains_item(&self, item_id: &str) -> bool {
        self.items.iter().any(|i| i.id == item_id)
    }

    /// Validate structural invariants: at least one item, unique item
    /// ids, and dependencies referencing strictly earlier items.
    pub fn validate(&self) -> Result<(), String> {
        if self.items.is_empty() {
            return Err("plan has no items".to_string());
        }

        let mut seen: Vec<&str> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if seen.contains(&item.id.as_str()) {
                return Err(format!("duplicate plan item id: {}", item.id));
            }
            for dep in &item.dependencies {
                if !seen.contains(&dep.as_str()) {
                    return Err(format!(
                        "item {} depends on {}, which is not an earlier item",
                        item.id, dep
                    ));
                }
            }
            seen.push(&item.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, deps: &[&str]) -> PlanItem {
        PlanItem {
            id: id.to_string(),
            exercise_type: "cloze".to_string(),
            title: format!("Exercise {id}"),
            description: "desc".to_string(),
            estimated_minutes: 5,
            parameters: serde_json::Value::Null,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_validate_ok() {
        let plan = Plan {
            items: vec![item("item-1", &[]), item("item-2", &["item-1"])],
            ..Default::default()
        };
        assert!(plan.validate().is_ok());
        assert!(plan.contains_item("item-2"));
        assert!(!plan.contains_item("item-3"));
    }

    #[test]
    fn test_validate_empty_plan() {
        assert!(Plan::default().validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let plan = Plan {
            items: vec![item("item-1", &[]), item("item-1", &[])],
            ..Default::default()
        };
        assert!(plan.validate().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn test_validate_forward_dependency() {
        let plan = Plan {
            items: vec![item("item-1", &["item-2"]), item("item-2", &[])],
            ..Default::default()
        };
        assert!(plan.validate().is_err());
    }
}
