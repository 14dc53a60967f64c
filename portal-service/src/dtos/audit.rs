use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{summary_for, UserLookup, UserSummary};
use crate::models::{AuditAction, AuditLog, EntityType, Role};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    pub action: Option<AuditAction>,
    pub entity_type: Option<EntityType>,
    pub performed_by: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditStatsQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogResponse {
    #[serde(rename = "_id")]
    pub record_id: String,
    pub id: String,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Option<String>,
    pub description: String,
    pub performed_by: Option<UserSummary>,
    pub performed_by_name: String,
    pub performed_by_role: Role,
    pub previous_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogResponse {
    pub fn new(log: AuditLog, users: &UserLookup) -> Self {
        Self {
            record_id: log.id.to_hex(),
            id: log.id.to_hex(),
            action: log.action,
            entity_type: log.entity_type,
            entity_id: log.entity_id.map(|id| id.to_hex()),
            description: log.description,
            performed_by: summary_for(users, Some(&log.performed_by)),
            performed_by_name: log.performed_by_name,
            performed_by_role: log.performed_by_role,
            previous_values: log.previous_values.map(|v| v.into_relaxed_extjson()),
            new_values: log.new_values.map(|v| v.into_relaxed_extjson()),
            ip_address: log.ip_address,
            user_agent: log.user_agent,
            request_id: log.request_id,
            created_at: log.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuditDailyCount {
    pub action: String,
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub daily: Vec<AuditDailyCount>,
    pub by_action: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId, Bson};
    use std::collections::HashMap;

    #[test]
    fn snapshots_render_as_plain_json() {
        let log = AuditLog {
            id: ObjectId::new(),
            action: AuditAction::StatusChange,
            entity_type: EntityType::Driver,
            entity_id: Some(ObjectId::new()),
            description: "Changed driver status".to_string(),
            performed_by: ObjectId::new(),
            performed_by_name: "Ops".to_string(),
            performed_by_role: Role::Operations,
            previous_values: Some(Bson::Document(doc! { "status": "pending" })),
            new_values: Some(Bson::Document(doc! { "status": "under_review" })),
            ip_address: None,
            user_agent: None,
            request_id: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(AuditLogResponse::new(log, &HashMap::new())).unwrap();
        assert_eq!(json["_id"], json["id"]);
        assert_eq!(json["action"], "status_change");
        assert_eq!(json["entityType"], "driver");
        assert_eq!(json["previousValues"]["status"], "pending");
        assert_eq!(json["newValues"]["status"], "under_review");
        assert_eq!(json["performedByRole"], "operations");
    }
}
