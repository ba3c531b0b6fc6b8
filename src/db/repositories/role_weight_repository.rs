use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;

/// Stored override; `weights` is the raw JSON object as written by the caller.
#[derive(Debug, Clone)]
pub struct RoleWeightConfigRow {
    pub project_id: String,
    pub weights: String,
    pub updated_at: String,
}

impl TryFrom<&Row<'_>> for RoleWeightConfigRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            project_id: row.get("project_id")?,
            weights: row.get("weights")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct RoleWeightRepository;

impl RoleWeightRepository {
    pub fn find(conn: &Connection, project_id: &str) -> AppResult<Option<RoleWeightConfigRow>> {
        let row = conn
            .query_row(
                "SELECT project_id, weights, updated_at FROM role_weight_configs WHERE project_id = ?1",
                [project_id],
                |row| RoleWeightConfigRow::try_from(row),
            )
            .optional()?;
        Ok(row)
    }

    pub fn upsert(conn: &Connection, row: &RoleWeightConfigRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO role_weight_configs (project_id, weights, updated_at)
                VALUES (:project_id, :weights, :updated_at)
                ON CONFLICT(project_id) DO UPDATE SET
                    weights = excluded.weights,
                    updated_at = excluded.updated_at
            "#,
            named_params! {
                ":project_id": &row.project_id,
                ":weights": &row.weights,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn delete(conn: &Connection, project_id: &str) -> AppResult<usize> {
        let deleted = conn.execute(
            "DELETE FROM role_weight_configs WHERE project_id = ?1",
            [project_id],
        )?;
        Ok(deleted)
    }
}
