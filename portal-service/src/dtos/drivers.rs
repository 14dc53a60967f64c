use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::documents::DocumentResponse;
use super::{summary_for, to_chrono, UserLookup, UserSummary};
use crate::models::{Driver, DriverInfo, DriverStatus, RegistrationStatus};
use crate::utils::validation::{validate_driver_name, validate_phone, validate_plate_number};

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfoInput {
    #[serde(default)]
    #[validate(custom(function = "validate_driver_name"))]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    pub email: Option<String>,
    #[validate(length(max = 10, message = "Code cannot exceed 10 characters"))]
    pub code: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_plate_number"))]
    pub plate_number: String,
    pub registration_status: Option<RegistrationStatus>,
    #[validate(length(max = 20, message = "TIN number cannot exceed 20 characters"))]
    pub tin_no: Option<String>,
}

impl From<DriverInfoInput> for DriverInfo {
    fn from(input: DriverInfoInput) -> Self {
        DriverInfo {
            name: input.name,
            phone: input.phone,
            email: input.email,
            code: input.code,
            plate_number: input.plate_number,
            registration_status: input.registration_status.unwrap_or_default(),
            tin_no: input.tin_no,
        }
    }
}

/// Body of `POST /api/drivers`. `driver_info` is validated separately by the
/// handler since its rules live on [`DriverInfoInput`].
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDriverRequest {
    #[serde(default)]
    pub driver_info: DriverInfoInput,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub internal_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfoPatch {
    #[validate(custom(function = "validate_driver_name"))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    pub email: Option<String>,
    #[validate(length(max = 10, message = "Code cannot exceed 10 characters"))]
    pub code: Option<String>,
    #[validate(custom(function = "validate_plate_number"))]
    pub plate_number: Option<String>,
    pub registration_status: Option<RegistrationStatus>,
    #[validate(length(max = 20, message = "TIN number cannot exceed 20 characters"))]
    pub tin_no: Option<String>,
}

impl DriverInfoPatch {
    /// Overlay the supplied fields onto `current`.
    pub fn apply(self, current: &DriverInfo) -> DriverInfo {
        DriverInfo {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            phone: self.phone.unwrap_or_else(|| current.phone.clone()),
            email: self.email.or_else(|| current.email.clone()),
            code: self.code.or_else(|| current.code.clone()),
            plate_number: self
                .plate_number
                .unwrap_or_else(|| current.plate_number.clone()),
            registration_status: self
                .registration_status
                .unwrap_or(current.registration_status),
            tin_no: self.tin_no.or_else(|| current.tin_no.clone()),
        }
        .normalized()
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDriverRequest {
    pub driver_info: Option<DriverInfoPatch>,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub internal_notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDriverStatusRequest {
    #[serde(default)]
    pub status: String,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DriverStatsQuery {
    pub period: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfoView {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub code: Option<String>,
    pub plate_number: String,
    pub registration_status: RegistrationStatus,
    pub tin_no: Option<String>,
}

impl From<&DriverInfo> for DriverInfoView {
    fn from(info: &DriverInfo) -> Self {
        Self {
            name: info.name.clone(),
            phone: info.phone.clone(),
            email: info.email.clone(),
            code: info.code.clone(),
            plate_number: info.plate_number.clone(),
            registration_status: info.registration_status,
            tin_no: info.tin_no.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverResponse {
    #[serde(rename = "_id")]
    pub record_id: String,
    pub id: String,
    pub driver_info: DriverInfoView,
    pub full_name: String,
    pub status: DriverStatus,
    pub rejection_reason: Option<String>,
    pub documents_complete: bool,
    pub registered_by: Option<UserSummary>,
    pub reviewed_by: Option<UserSummary>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub internal_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DriverResponse {
    pub fn new(driver: &Driver, users: &UserLookup) -> Self {
        Self {
            record_id: driver.id.to_hex(),
            id: driver.id.to_hex(),
            driver_info: DriverInfoView::from(&driver.driver_info),
            full_name: driver.full_name().to_string(),
            status: driver.status,
            rejection_reason: driver.rejection_reason.clone(),
            documents_complete: driver.documents_complete,
            registered_by: summary_for(users, Some(&driver.registered_by)),
            reviewed_by: summary_for(users, driver.reviewed_by.as_ref()),
            submitted_at: to_chrono(driver.submitted_at),
            reviewed_at: to_chrono(driver.reviewed_at),
            approved_at: to_chrono(driver.approved_at),
            internal_notes: driver.internal_notes.clone(),
            created_at: driver.created_at,
            updated_at: driver.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DriverDetail {
    pub driver: DriverResponse,
    pub documents: Vec<DocumentResponse>,
}

/// Per-status counts. Keys match the stored status names.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct StatusSummary {
    pub total: u64,
    pub pending: u64,
    pub under_review: u64,
    pub approved: u64,
    pub rejected: u64,
}

impl StatusSummary {
    pub fn record(&mut self, status: &str, count: u64) {
        match status {
            "pending" => self.pending = count,
            "under_review" => self.under_review = count,
            "approved" => self.approved = count,
            "rejected" => self.rejected = count,
            other => tracing::warn!(status = %other, "Unknown driver status in stats"),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DailyCount {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct DriverStats {
    pub summary: StatusSummary,
    pub daily: Vec<DailyCount>,
}
