use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const ENTITY_BONUS_POOL: &str = "bonus_pool";
pub const ENTITY_BONUS_ALLOCATION: &str = "bonus_allocation";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryRecord {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
    pub created_at: String,
}
