use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::DocumentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl DriverStatus {
    pub const ALL: [DriverStatus; 4] = [
        DriverStatus::Pending,
        DriverStatus::UnderReview,
        DriverStatus::Approved,
        DriverStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Pending => "pending",
            DriverStatus::UnderReview => "under_review",
            DriverStatus::Approved => "approved",
            DriverStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for DriverStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DriverStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| "Invalid status".to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    #[default]
    Registration,
    Reactivation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverInfo {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    pub plate_number: String,
    #[serde(default)]
    pub registration_status: RegistrationStatus,
    #[serde(default)]
    pub tin_no: Option<String>,
}

impl DriverInfo {
    /// Trim free text, lower-case the email and upper-case the plate.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: non_empty(self.email).map(|e| e.to_lowercase()),
            code: non_empty(self.code),
            plate_number: self.plate_number.trim().to_uppercase(),
            registration_status: self.registration_status,
            tin_no: non_empty(self.tin_no),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Document types that must all be uploaded before a driver counts as complete.
pub const REQUIRED_DOCUMENT_TYPES: [DocumentType; 4] = [
    DocumentType::License,
    DocumentType::Insurance,
    DocumentType::VehicleRegistration,
    DocumentType::Photo,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub driver_info: DriverInfo,
    pub status: DriverStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub documents_complete: bool,
    pub registered_by: ObjectId,
    #[serde(default)]
    pub reviewed_by: Option<ObjectId>,
    #[serde(default)]
    pub submitted_at: Option<BsonDateTime>,
    #[serde(default)]
    pub reviewed_at: Option<BsonDateTime>,
    #[serde(default)]
    pub approved_at: Option<BsonDateTime>,
    #[serde(default)]
    pub internal_notes: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    /// New registrations always start out pending.
    pub fn new(info: DriverInfo, internal_notes: Option<String>, registered_by: ObjectId) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            driver_info: info.normalized(),
            status: DriverStatus::Pending,
            rejection_reason: None,
            documents_complete: false,
            registered_by,
            reviewed_by: None,
            submitted_at: Some(BsonDateTime::from_chrono(now)),
            reviewed_at: None,
            approved_at: None,
            internal_notes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> &str {
        &self.driver_info.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DriverInfo {
        DriverInfo {
            name: "  Tigist Alemu ".to_string(),
            phone: "251912345678".to_string(),
            email: Some(" Tigist@Mail.COM ".to_string()),
            code: Some("   ".to_string()),
            plate_number: " aa-3-12345 ".to_string(),
            registration_status: RegistrationStatus::Registration,
            tin_no: None,
        }
    }

    #[test]
    fn new_driver_is_pending_and_normalized() {
        let agent = ObjectId::new();
        let driver = Driver::new(info(), None, agent);

        assert_eq!(driver.status, DriverStatus::Pending);
        assert_eq!(driver.registered_by, agent);
        assert_eq!(driver.full_name(), "Tigist Alemu");
        assert_eq!(driver.driver_info.plate_number, "AA-3-12345");
        assert_eq!(driver.driver_info.email.as_deref(), Some("tigist@mail.com"));
        assert!(driver.driver_info.code.is_none());
        assert!(driver.submitted_at.is_some());
        assert!(!driver.documents_complete);
    }

    #[test]
    fn status_parsing() {
        assert_eq!(
            "under_review".parse::<DriverStatus>().unwrap(),
            DriverStatus::UnderReview
        );
        assert_eq!("archived".parse::<DriverStatus>().unwrap_err(), "Invalid status");
    }
}
