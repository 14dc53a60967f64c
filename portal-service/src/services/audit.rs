use chrono::Utc;
use metrics::counter;
use mongodb::{
    bson::{oid::ObjectId, Bson},
    Collection,
};
use serde::Serialize;

use crate::models::audit_log::truncate_description;
use crate::models::{AuditAction, AuditLog, EntityType, User};
use crate::utils::RequestMeta;

/// One action to record. Built by handlers, turned into an [`AuditLog`]
/// together with the acting user and request metadata.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Option<ObjectId>,
    pub description: String,
    pub previous_values: Option<Bson>,
    pub new_values: Option<Bson>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        entity_type: EntityType,
        entity_id: Option<ObjectId>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action,
            entity_type,
            entity_id,
            description: description.into(),
            previous_values: None,
            new_values: None,
        }
    }

    pub fn previous_values<T: Serialize>(mut self, values: &T) -> Self {
        self.previous_values = snapshot(values);
        self
    }

    pub fn new_values<T: Serialize>(mut self, values: &T) -> Self {
        self.new_values = snapshot(values);
        self
    }

    pub fn into_log(self, actor: &User, meta: &RequestMeta) -> AuditLog {
        AuditLog {
            id: ObjectId::new(),
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            description: truncate_description(&self.description),
            performed_by: actor.id,
            performed_by_name: actor.name.clone(),
            performed_by_role: actor.role,
            previous_values: self.previous_values,
            new_values: self.new_values,
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            request_id: meta.request_id.clone(),
            created_at: Utc::now(),
        }
    }
}

fn snapshot<T: Serialize>(values: &T) -> Option<Bson> {
    match mongodb::bson::to_bson(values) {
        Ok(Bson::Null) => None,
        Ok(bson) => Some(bson),
        Err(e) => {
            tracing::warn!(error = %e, "Could not snapshot audit values");
            None
        }
    }
}

/// Best-effort audit trail writer.
#[derive(Clone)]
pub struct AuditLogger {
    collection: Collection<AuditLog>,
}

impl AuditLogger {
    pub fn new(collection: Collection<AuditLog>) -> Self {
        Self { collection }
    }

    /// Detach the insert onto the runtime and return immediately. Failures
    /// are logged and never reach the caller.
    pub fn record(&self, entry: AuditEntry, actor: &User, meta: &RequestMeta) {
        if entry.entity_id.is_none() && entry.entity_type != EntityType::System {
            tracing::warn!(
                action = entry.action.as_str(),
                entity_type = entry.entity_type.as_str(),
                "Audit entry without entity id"
            );
        }

        let log = entry.into_log(actor, meta);
        let collection = self.collection.clone();

        tokio::spawn(async move {
            let action = log.action.as_str();
            match collection.insert_one(&log, None).await {
                Ok(_) => {
                    counter!("audit_events_total", "action" => action).increment(1);
                }
                Err(e) => {
                    counter!("audit_write_failures_total").increment(1);
                    tracing::error!(
                        error = %e,
                        action = action,
                        entity_type = log.entity_type.as_str(),
                        "Failed to write audit log"
                    );
                }
            }
        });
    }
}
