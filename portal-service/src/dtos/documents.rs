use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::drivers::DriverInfoView;
use super::{summary_for, to_chrono, UserLookup, UserSummary};
use crate::models::{Document, DocumentStatus, DocumentType, Driver, DriverStatus};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocumentStatusRequest {
    #[serde(default)]
    pub status: String,
    #[validate(length(max = 500, message = "Rejection reason cannot exceed 500 characters"))]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentQueueQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DocumentCounts {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

impl DocumentCounts {
    pub fn record(&mut self, status: &str, count: u64) {
        match status {
            "pending" => self.pending = count,
            "approved" => self.approved = count,
            "rejected" => self.rejected = count,
            other => tracing::warn!(status = %other, "Unknown document status in counts"),
        }
    }
}

/// Driver populated into a queued document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSummary {
    #[serde(rename = "_id")]
    pub record_id: String,
    pub id: String,
    pub driver_info: DriverInfoView,
    pub full_name: String,
    pub status: DriverStatus,
}

impl From<&Driver> for DriverSummary {
    fn from(driver: &Driver) -> Self {
        Self {
            record_id: driver.id.to_hex(),
            id: driver.id.to_hex(),
            driver_info: DriverInfoView::from(&driver.driver_info),
            full_name: driver.full_name().to_string(),
            status: driver.status,
        }
    }
}

/// A document's driver: the bare id, or the driver itself once populated.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DriverRef {
    Id(String),
    Populated(DriverSummary),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    #[serde(rename = "_id")]
    pub record_id: String,
    pub id: String,
    pub driver: DriverRef,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub status: DocumentStatus,
    pub rejection_reason: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub document_number: Option<String>,
    pub is_expired: bool,
    pub uploaded_by: Option<UserSummary>,
    pub reviewed_by: Option<UserSummary>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentResponse {
    pub fn new(document: &Document, users: &UserLookup) -> Self {
        Self {
            record_id: document.id.to_hex(),
            id: document.id.to_hex(),
            driver: DriverRef::Id(document.driver.to_hex()),
            doc_type: document.doc_type,
            filename: document.filename.clone(),
            original_name: document.original_name.clone(),
            mime_type: document.mime_type.clone(),
            size: document.size,
            status: document.status,
            rejection_reason: document.rejection_reason.clone(),
            expiry_date: to_chrono(document.expiry_date),
            document_number: document.document_number.clone(),
            is_expired: document.is_expired_at(Utc::now()),
            uploaded_by: summary_for(users, Some(&document.uploaded_by)),
            reviewed_by: summary_for(users, document.reviewed_by.as_ref()),
            reviewed_at: to_chrono(document.reviewed_at),
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }

    pub fn with_driver(mut self, driver: Option<&Driver>) -> Self {
        if let Some(driver) = driver {
            self.driver = DriverRef::Populated(DriverSummary::from(driver));
        }
        self
    }
}
