use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Portal roles, ordered from broadest to narrowest read access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Operations,
    SalesAgent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Operations => "operations",
            Role::SalesAgent => "sales_agent",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Role::Admin => 3,
            Role::Operations => 2,
            Role::SalesAgent => 1,
        }
    }

    /// `true` when this role can read everything `other` can.
    pub fn includes(&self, other: Role) -> bool {
        self.rank() >= other.rank()
    }

    /// Sales agents only ever see records they registered.
    pub fn is_scoped_to_own_records(&self) -> bool {
        *self == Role::SalesAgent
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "operations" => Ok(Role::Operations),
            "sales_agent" => Ok(Role::SalesAgent),
            other => Err(format!("Invalid role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub phone: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub refresh_token_hash: Option<String>,
    #[serde(default)]
    pub last_login: Option<BsonDateTime>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: &str,
        password_hash: String,
        name: String,
        role: Role,
        phone: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            email: normalize_email(email),
            password_hash,
            name: name.trim().to_string(),
            role,
            phone: phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            is_active: true,
            refresh_token_hash: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy() {
        assert!(Role::Admin.includes(Role::Operations));
        assert!(Role::Admin.includes(Role::SalesAgent));
        assert!(Role::Operations.includes(Role::SalesAgent));
        assert!(!Role::Operations.includes(Role::Admin));
        assert!(!Role::SalesAgent.includes(Role::Operations));
        assert!(Role::SalesAgent.includes(Role::SalesAgent));
    }

    #[test]
    fn role_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(Role::SalesAgent).unwrap(),
            serde_json::json!("sales_agent")
        );
        assert_eq!("operations".parse::<Role>().unwrap(), Role::Operations);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn new_user_normalizes_fields() {
        let user = User::new(
            "  Agent@LittleRide.ET ",
            "hash".to_string(),
            " Abebe ".to_string(),
            Role::SalesAgent,
            Some("   ".to_string()),
        );
        assert_eq!(user.email, "agent@littleride.et");
        assert_eq!(user.name, "Abebe");
        assert!(user.phone.is_none());
        assert!(user.is_active);
        assert!(user.refresh_token_hash.is_none());
    }
}
