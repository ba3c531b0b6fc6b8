use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Role key used when a member has no role or the role has no weight.
pub const DEFAULT_ROLE_KEY: &str = "default";

pub const DEFAULT_ROLE_WEIGHTS: &[(&str, f64)] = &[
    ("project_manager", 3.5),
    ("tech_lead", 3.0),
    ("architect", 3.0),
    ("senior_developer", 2.5),
    ("product_manager", 2.5),
    ("developer", 2.0),
    ("designer", 1.8),
    ("tester", 1.8),
    ("operations", 1.6),
    (DEFAULT_ROLE_KEY, 1.5),
];

/// Resolved role → weight table. Always carries a `default` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleWeights {
    weights: BTreeMap<String, f64>,
    overridden: bool,
}

impl RoleWeights {
    pub fn defaults() -> Self {
        let weights = DEFAULT_ROLE_WEIGHTS
            .iter()
            .map(|(role, weight)| (role.to_string(), *weight))
            .collect();
        Self {
            weights,
            overridden: false,
        }
    }

    /// Merges `overrides` over the defaults; project entries win per key.
    pub fn with_overrides(overrides: BTreeMap<String, f64>) -> Self {
        let mut resolved = Self::defaults();
        if overrides.is_empty() {
            return resolved;
        }
        resolved.weights.extend(overrides);
        resolved.overridden = true;
        resolved
    }

    pub fn get(&self, role_id: &str) -> Option<f64> {
        self.weights.get(role_id).copied()
    }

    pub fn default_weight(&self) -> f64 {
        self.weights
            .get(DEFAULT_ROLE_KEY)
            .copied()
            .unwrap_or(DEFAULT_FALLBACK_WEIGHT)
    }

    /// Weight for `role_id`, or the `default` weight for unknown roles.
    pub fn weight_for(&self, role_id: &str) -> f64 {
        self.get(role_id).unwrap_or_else(|| self.default_weight())
    }

    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

const DEFAULT_FALLBACK_WEIGHT: f64 = 1.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleWeightConfigRecord {
    pub project_id: String,
    pub weights: BTreeMap<String, f64>,
    pub updated_at: String,
}
