use std::convert::TryFrom;

use rusqlite::{named_params, Connection, Row};
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};
use crate::models::audit::AuditEntryRecord;

#[derive(Debug, Clone)]
pub struct AuditRow {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}

impl AuditRow {
    pub fn into_record(self) -> AppResult<AuditEntryRecord> {
        let details = self
            .details
            .as_deref()
            .map(serde_json::from_str::<JsonValue>)
            .transpose()
            .map_err(AppError::from)?;

        Ok(AuditEntryRecord {
            id: self.id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            action: self.action,
            actor: self.actor,
            details,
            created_at: self.created_at,
        })
    }
}

impl TryFrom<&Row<'_>> for AuditRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            entity_type: row.get("entity_type")?,
            entity_id: row.get("entity_id")?,
            action: row.get("action")?,
            actor: row.get("actor")?,
            details: row.get("details")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub struct AuditRepository;

impl AuditRepository {
    pub fn append(
        conn: &Connection,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        actor: Option<&str>,
        details: Option<&JsonValue>,
    ) -> AppResult<()> {
        let details = details.map(serde_json::to_string).transpose()?;
        conn.execute(
            r#"
                INSERT INTO audit_log (id, entity_type, entity_id, action, actor, details, created_at)
                VALUES (:id, :entity_type, :entity_id, :action, :actor, :details, :created_at)
            "#,
            named_params! {
                ":id": uuid::Uuid::new_v4().to_string(),
                ":entity_type": entity_type,
                ":entity_id": entity_id,
                ":action": action,
                ":actor": actor,
                ":details": details,
                ":created_at": chrono::Utc::now().to_rfc3339(),
            },
        )?;
        Ok(())
    }

    pub fn list_for_entity(
        conn: &Connection,
        entity_type: &str,
        entity_id: &str,
    ) -> AppResult<Vec<AuditRow>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT id, entity_type, entity_id, action, actor, details, created_at
                FROM audit_log
                WHERE entity_type = :entity_type AND entity_id = :entity_id
                ORDER BY rowid ASC
            "#,
        )?;
        let rows = stmt
            .query_map(
                named_params! {":entity_type": entity_type, ":entity_id": entity_id},
                |row| AuditRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
