use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::db::repositories::project_repository::ProjectRepository;
use crate::db::repositories::role_weight_repository::{RoleWeightConfigRow, RoleWeightRepository};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::role_weight::{RoleWeightConfigRecord, RoleWeights};

#[derive(Clone)]
pub struct RoleWeightService {
    db: DbPool,
}

impl RoleWeightService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Effective role weights for a project. Never fails: a missing, unreadable or
    /// malformed override leaves the default table in place.
    pub fn resolve_role_weights(&self, project_id: &str) -> RoleWeights {
        let stored = match self
            .db
            .with_connection(|conn| RoleWeightRepository::find(conn, project_id))
        {
            Ok(stored) => stored,
            Err(err) => {
                warn!(
                    target: "app::bonus",
                    project_id,
                    error = %err,
                    "failed to load role weight override, using defaults"
                );
                return RoleWeights::defaults();
            }
        };

        let Some(row) = stored else {
            debug!(target: "app::bonus", project_id, "no role weight override, using defaults");
            return RoleWeights::defaults();
        };

        let overrides = parse_lenient(project_id, &row.weights);
        if overrides.is_empty() {
            warn!(
                target: "app::bonus",
                project_id,
                "role weight override has no usable entries, using defaults"
            );
            return RoleWeights::defaults();
        }

        debug!(
            target: "app::bonus",
            project_id,
            overrides = overrides.len(),
            "role weight override applied"
        );
        RoleWeights::with_overrides(overrides)
    }

    pub fn get_config(&self, project_id: &str) -> AppResult<Option<RoleWeightConfigRecord>> {
        let row = self
            .db
            .with_connection(|conn| RoleWeightRepository::find(conn, project_id))?;
        Ok(row.map(|row| RoleWeightConfigRecord {
            weights: parse_lenient(&row.project_id, &row.weights),
            project_id: row.project_id,
            updated_at: row.updated_at,
        }))
    }

    pub fn upsert_config(
        &self,
        project_id: &str,
        weights: BTreeMap<String, f64>,
    ) -> AppResult<RoleWeightConfigRecord> {
        let weights = normalize_weights(weights)?;
        let payload = serde_json::to_string(&weights)?;
        let now = Utc::now().to_rfc3339();

        self.db.with_transaction(|conn| {
            if !ProjectRepository::exists(conn, project_id)? {
                return Err(AppError::not_found("项目", project_id));
            }
            RoleWeightRepository::upsert(
                conn,
                &RoleWeightConfigRow {
                    project_id: project_id.to_string(),
                    weights: payload.clone(),
                    updated_at: now.clone(),
                },
            )
        })?;

        info!(
            target: "app::bonus",
            project_id,
            roles = weights.len(),
            "role weight override saved"
        );

        Ok(RoleWeightConfigRecord {
            project_id: project_id.to_string(),
            weights,
            updated_at: now,
        })
    }

    /// Removes the override; returns whether one existed.
    pub fn clear_config(&self, project_id: &str) -> AppResult<bool> {
        let removed = self
            .db
            .with_connection(|conn| RoleWeightRepository::delete(conn, project_id))?;
        if removed > 0 {
            info!(target: "app::bonus", project_id, "role weight override cleared");
        }
        Ok(removed > 0)
    }
}

fn normalize_weights(weights: BTreeMap<String, f64>) -> AppResult<BTreeMap<String, f64>> {
    if weights.is_empty() {
        return Err(AppError::validation("角色权重配置不能为空"));
    }

    let mut normalized = BTreeMap::new();
    for (role, weight) in weights {
        let role = role.trim().to_string();
        if role.is_empty() {
            return Err(AppError::validation("角色标识不能为空"));
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(AppError::validation_with_details(
                format!("角色 {role} 的权重需为大于 0 的数值"),
                serde_json::json!({ "roleId": role, "weight": weight.to_string() }),
            ));
        }
        normalized.insert(role, weight);
    }
    Ok(normalized)
}

/// Accepts JSON numbers and numeric strings; anything else is dropped with a warning.
fn parse_lenient(project_id: &str, raw: &str) -> BTreeMap<String, f64> {
    let value: JsonValue = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                target: "app::bonus",
                project_id,
                error = %err,
                "role weight override is not valid JSON"
            );
            return BTreeMap::new();
        }
    };

    let JsonValue::Object(entries) = value else {
        warn!(target: "app::bonus", project_id, "role weight override is not a JSON object");
        return BTreeMap::new();
    };

    let mut weights = BTreeMap::new();
    for (role, value) in entries {
        let parsed = match &value {
            JsonValue::Number(number) => number.as_f64(),
            JsonValue::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(weight) if weight.is_finite() && weight > 0.0 && !role.trim().is_empty() => {
                weights.insert(role.trim().to_string(), weight);
            }
            _ => {
                warn!(
                    target: "app::bonus",
                    project_id,
                    role = %role,
                    value = %value,
                    "ignoring invalid role weight entry"
                );
            }
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::project::ProjectCreateInput;
    use crate::services::project_service::ProjectService;
    use tempfile::tempdir;

    fn setup() -> (RoleWeightService, String, tempfile::TempDir) {
        let dir = tempdir().expect("temp dir");
        let pool = DbPool::new(dir.path().join("weights.sqlite")).expect("db pool");
        let project = ProjectService::new(pool.clone())
            .create_project(ProjectCreateInput {
                code: "PRJ-1".into(),
                name: "奖金测试项目".into(),
                ..Default::default()
            })
            .expect("create project");
        (RoleWeightService::new(pool), project.id, dir)
    }

    fn store_raw(service: &RoleWeightService, project_id: &str, raw: &str) {
        service
            .db
            .with_connection(|conn| {
                RoleWeightRepository::upsert(
                    conn,
                    &RoleWeightConfigRow {
                        project_id: project_id.to_string(),
                        weights: raw.to_string(),
                        updated_at: Utc::now().to_rfc3339(),
                    },
                )
            })
            .expect("store raw override");
    }

    #[test]
    fn missing_override_returns_defaults() {
        let (service, project_id, _dir) = setup();
        let weights = service.resolve_role_weights(&project_id);
        assert_eq!(weights, RoleWeights::defaults());
    }

    #[test]
    fn numeric_strings_are_accepted_and_invalid_entries_dropped() {
        let (service, project_id, _dir) = setup();
        store_raw(
            &service,
            &project_id,
            r#"{"developer": "2.7", "tester": -1, "designer": "abc", "architect": 3.3}"#,
        );

        let weights = service.resolve_role_weights(&project_id);
        assert_eq!(weights.get("developer"), Some(2.7));
        assert_eq!(weights.get("architect"), Some(3.3));
        assert_eq!(weights.get("tester"), Some(1.8));
        assert_eq!(weights.get("designer"), Some(1.8));
        assert!(weights.is_overridden());
    }

    #[test]
    fn malformed_json_falls_back_to_defaults() {
        let (service, project_id, _dir) = setup();
        store_raw(&service, &project_id, "{not json");
        let weights = service.resolve_role_weights(&project_id);
        assert!(!weights.is_overridden());
        assert_eq!(weights.default_weight(), 1.5);
    }

    #[test]
    fn upsert_rejects_non_positive_weight() {
        let (service, project_id, _dir) = setup();
        let mut weights = BTreeMap::new();
        weights.insert("developer".to_string(), 0.0);
        let result = service.upsert_config(&project_id, weights);
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[test]
    fn upsert_requires_existing_project() {
        let (service, _project_id, _dir) = setup();
        let mut weights = BTreeMap::new();
        weights.insert("developer".to_string(), 2.2);
        let result = service.upsert_config("missing-project", weights);
        assert!(matches!(result, Err(AppError::NotFound { .. })));
    }

    #[test]
    fn upsert_then_clear_round_trip() {
        let (service, project_id, _dir) = setup();
        let mut weights = BTreeMap::new();
        weights.insert("developer".to_string(), 2.2);
        service
            .upsert_config(&project_id, weights)
            .expect("save override");

        let config = service
            .get_config(&project_id)
            .expect("load config")
            .expect("config present");
        assert_eq!(config.weights.get("developer"), Some(&2.2));
        assert_eq!(service.resolve_role_weights(&project_id).get("developer"), Some(2.2));

        assert!(service.clear_config(&project_id).expect("clear"));
        assert!(service.get_config(&project_id).expect("load").is_none());
    }
}
