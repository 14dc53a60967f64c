use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    License,
    Insurance,
    VehicleRegistration,
    Photo,
    NationalId,
    BusinessLicense,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        DocumentType::License,
        DocumentType::Insurance,
        DocumentType::VehicleRegistration,
        DocumentType::Photo,
        DocumentType::NationalId,
        DocumentType::BusinessLicense,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::License => "license",
            DocumentType::Insurance => "insurance",
            DocumentType::VehicleRegistration => "vehicle_registration",
            DocumentType::Photo => "photo",
            DocumentType::NationalId => "national_id",
            DocumentType::BusinessLicense => "business_license",
        }
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| "Invalid document type".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "approved" => Ok(DocumentStatus::Approved),
            "rejected" => Ok(DocumentStatus::Rejected),
            _ => Err("Invalid document status".to_string()),
        }
    }
}

/// Accepted upload MIME types and the extension each is stored under.
pub const ALLOWED_MIME_TYPES: [(&str, &str); 4] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("application/pdf", "pdf"),
];

pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    ALLOWED_MIME_TYPES
        .iter()
        .find(|(mime, _)| *mime == mime_type)
        .map(|(_, ext)| *ext)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub driver: ObjectId,
    pub doc_type: DocumentType,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub storage_key: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<BsonDateTime>,
    #[serde(default)]
    pub document_number: Option<String>,
    pub uploaded_by: ObjectId,
    #[serde(default)]
    pub reviewed_by: Option<ObjectId>,
    #[serde(default)]
    pub reviewed_at: Option<BsonDateTime>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Upload metadata gathered from the multipart form.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub driver: ObjectId,
    pub doc_type: DocumentType,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub storage_key: String,
    pub expiry_date: Option<DateTime<Utc>>,
    pub document_number: Option<String>,
    pub uploaded_by: ObjectId,
}

impl Document {
    pub fn new(upload: NewDocument) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            driver: upload.driver,
            doc_type: upload.doc_type,
            filename: upload.filename,
            original_name: upload.original_name,
            mime_type: upload.mime_type,
            size: upload.size,
            storage_key: upload.storage_key,
            status: DocumentStatus::Pending,
            rejection_reason: None,
            expiry_date: upload.expiry_date.map(BsonDateTime::from_chrono),
            document_number: upload
                .document_number
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            uploaded_by: upload.uploaded_by,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date
            .map(|expiry| expiry.to_chrono() < now)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn upload(expiry_date: Option<DateTime<Utc>>) -> NewDocument {
        NewDocument {
            driver: ObjectId::new(),
            doc_type: DocumentType::License,
            filename: "license-1-abc.pdf".to_string(),
            original_name: "license.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size: 1024,
            storage_key: "driver/license-1-abc.pdf".to_string(),
            expiry_date,
            document_number: Some("  ".to_string()),
            uploaded_by: ObjectId::new(),
        }
    }

    #[test]
    fn new_document_is_pending() {
        let doc = Document::new(upload(None));
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert!(doc.document_number.is_none());
        assert!(!doc.is_expired_at(Utc::now()));
    }

    #[test]
    fn expiry_in_the_past_is_expired() {
        let now = Utc::now();
        let expired = Document::new(upload(Some(now - Duration::days(1))));
        let valid = Document::new(upload(Some(now + Duration::days(30))));
        assert!(expired.is_expired_at(now));
        assert!(!valid.is_expired_at(now));
    }

    #[test]
    fn mime_whitelist() {
        assert_eq!(extension_for_mime("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for_mime("application/pdf"), Some("pdf"));
        assert_eq!(extension_for_mime("image/gif"), None);
    }

    #[test]
    fn document_type_round_trips_through_str() {
        for t in DocumentType::ALL {
            assert_eq!(t.as_str().parse::<DocumentType>().unwrap(), t);
        }
        assert!("passport".parse::<DocumentType>().is_err());
    }
}
