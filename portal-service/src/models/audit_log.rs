use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, Bson};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::Role;

pub const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    Login,
    Logout,
    PasswordChange,
    RoleChange,
    StatusChange,
}

impl AuditAction {
    pub const ALL: [AuditAction; 10] = [
        AuditAction::Create,
        AuditAction::Update,
        AuditAction::Delete,
        AuditAction::Approve,
        AuditAction::Reject,
        AuditAction::Login,
        AuditAction::Logout,
        AuditAction::PasswordChange,
        AuditAction::RoleChange,
        AuditAction::StatusChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Approve => "approve",
            AuditAction::Reject => "reject",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::PasswordChange => "password_change",
            AuditAction::RoleChange => "role_change",
            AuditAction::StatusChange => "status_change",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("Invalid audit action: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    User,
    Driver,
    Document,
    System,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Driver => "driver",
            EntityType::Document => "document",
            EntityType::System => "system",
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityType::User),
            "driver" => Ok(EntityType::Driver),
            "document" => Ok(EntityType::Document),
            "system" => Ok(EntityType::System),
            other => Err(format!("Invalid entity type: {}", other)),
        }
    }
}

/// Append-only record of a portal action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub action: AuditAction,
    pub entity_type: EntityType,
    #[serde(default)]
    pub entity_id: Option<ObjectId>,
    pub description: String,
    pub performed_by: ObjectId,
    pub performed_by_name: String,
    pub performed_by_role: Role,
    #[serde(default)]
    pub previous_values: Option<Bson>,
    #[serde(default)]
    pub new_values: Option<Bson>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// Cut a description down to the stored maximum on a char boundary.
pub fn truncate_description(description: &str) -> String {
    match description.char_indices().nth(MAX_DESCRIPTION_LEN) {
        Some((idx, _)) => description[..idx].to_string(),
        None => description.to_string(),
    }
}
