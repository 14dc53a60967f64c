use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document as BsonDocument},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
};
use rand::Rng;
use service_core::error::AppError;
use std::collections::HashMap;

use super::{count_field, ensure_driver_access, non_blank, parse_date};
use crate::dtos::documents::{
    DocumentCounts, DocumentQueueQuery, DocumentResponse, UpdateDocumentStatusRequest,
};
use crate::dtos::{ApiResponse, PageRequest, DEFAULT_PAGE_LIMIT};
use crate::middleware::{AdminOnly, AgentOrAdmin, Authorized, CurrentUser, OpsOrAdmin};
use crate::models::document::extension_for_mime;
use crate::models::{
    AuditAction, Document, DocumentStatus, DocumentType, Driver, EntityType, NewDocument, User,
    REQUIRED_DOCUMENT_TYPES,
};
use crate::services::{AuditEntry, MongoDb};
use crate::utils::{parse_object_id, QueryParams, RequestMeta, ValidatedJson};
use crate::AppState;

const INVALID_FILE_TYPE: &str = "Invalid file type. Only JPEG, PNG, WebP, and PDF are allowed.";

pub(crate) fn file_too_large(max_file_size: usize) -> AppError {
    AppError::bad_request(format!(
        "File size too large. Maximum size is {}MB.",
        max_file_size / (1024 * 1024)
    ))
}

/// `<type>-<unixMillis>-<random>.<ext>`
pub(crate) fn stored_filename(
    doc_type: DocumentType,
    extension: &str,
    now: DateTime<Utc>,
) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!(
        "{}-{}-{}.{}",
        doc_type.as_str(),
        now.timestamp_millis(),
        suffix,
        extension
    )
}

/// True when every required document type is among `uploaded`.
pub(crate) fn has_required_documents(uploaded: &[DocumentType]) -> bool {
    REQUIRED_DOCUMENT_TYPES
        .iter()
        .all(|required| uploaded.contains(required))
}

/// Quote-safe, header-safe `Content-Disposition` value. Non-ASCII
/// characters are dropped since header values must be visible ASCII.
pub(crate) fn content_disposition(original_name: &str) -> String {
    let safe: String = original_name
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && *c != '"' && *c != '\\')
        .collect();
    format!("inline; filename=\"{}\"", safe)
}

/// Recompute `documents_complete` for a driver from its stored documents.
async fn refresh_documents_complete(db: &MongoDb, driver: ObjectId) -> Result<bool, AppError> {
    let types: Vec<DocumentType> = db
        .documents()
        .distinct("doc_type", doc! { "driver": driver }, None)
        .await?
        .iter()
        .filter_map(Bson::as_str)
        .filter_map(|t| t.parse().ok())
        .collect();
    let complete = has_required_documents(&types);

    db.drivers()
        .update_one(
            doc! { "_id": driver },
            doc! { "$set": { "documents_complete": complete } },
            None,
        )
        .await?;
    Ok(complete)
}

fn multipart_error(err: MultipartError, max_file_size: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return file_too_large(max_file_size);
    }
    tracing::debug!(error = %err, "Rejected multipart body");
    AppError::bad_request(err.body_text())
}

struct UploadForm {
    file: Option<UploadedFile>,
    doc_type: Option<String>,
    document_number: Option<String>,
    expiry_date: Option<String>,
}

struct UploadedFile {
    original_name: String,
    mime_type: String,
    data: Vec<u8>,
}

async fn read_upload_form(
    multipart: &mut Multipart,
    max_file_size: usize,
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm {
        file: None,
        doc_type: None,
        document_number: None,
        expiry_date: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_file_size))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let original_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                if extension_for_mime(&mime_type).is_none() {
                    return Err(AppError::bad_request(INVALID_FILE_TYPE));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, max_file_size))?;
                if data.len() > max_file_size {
                    return Err(file_too_large(max_file_size));
                }
                form.file = Some(UploadedFile {
                    original_name,
                    mime_type,
                    data: data.to_vec(),
                });
            }
            "type" | "documentNumber" | "expiryDate" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, max_file_size))?;
                let value = non_blank(Some(value.as_str()));
                match name.as_str() {
                    "type" => form.doc_type = value,
                    "documentNumber" => form.document_number = value,
                    _ => form.expiry_date = value,
                }
            }
            other => tracing::debug!(field = %other, "Ignoring unknown upload field"),
        }
    }

    Ok(form)
}

async fn load_document(db: &MongoDb, id: &str) -> Result<Document, AppError> {
    let id = parse_object_id(id)?;
    db.documents()
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| AppError::not_found("Document not found"))
}

/// Upload one document for a driver.
///
/// POST /api/documents/:driverId
pub async fn upload_document(
    State(state): State<AppState>,
    user: Authorized<AgentOrAdmin>,
    meta: RequestMeta,
    Path(driver_id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<DocumentResponse>>), AppError> {
    let driver_id = parse_object_id(&driver_id)?;
    let driver = state
        .db
        .find_driver(&driver_id)
        .await?
        .ok_or_else(|| AppError::not_found("Driver not found"))?;
    ensure_driver_access(&user, &driver)?;

    let max_file_size = state.config.storage.max_file_size;
    let form = read_upload_form(&mut multipart, max_file_size).await?;

    let file = form
        .file
        .ok_or_else(|| AppError::bad_request("Please upload a file"))?;
    let doc_type: DocumentType = form
        .doc_type
        .ok_or_else(|| AppError::bad_request("Document type is required"))?
        .parse()
        .map_err(AppError::bad_request)?;
    let expiry_date = form
        .expiry_date
        .as_deref()
        .map(|value| parse_date(value, false))
        .transpose()?;
    let extension = extension_for_mime(&file.mime_type)
        .ok_or_else(|| AppError::bad_request(INVALID_FILE_TYPE))?;

    let filename = stored_filename(doc_type, extension, Utc::now());
    let storage_key = format!("{}/{}", driver.id.to_hex(), filename);

    state
        .storage
        .upload(&storage_key, &file.data)
        .await
        .map_err(|e| {
            tracing::error!(storage_key = %storage_key, "Failed to store upload: {}", e);
            e
        })?;

    let document = Document::new(NewDocument {
        driver: driver.id,
        doc_type,
        filename,
        original_name: file.original_name,
        mime_type: file.mime_type,
        size: file.data.len() as i64,
        storage_key: storage_key.clone(),
        expiry_date,
        document_number: form.document_number,
        uploaded_by: user.id,
    });

    if let Err(e) = state.db.documents().insert_one(&document, None).await {
        tracing::error!(document_id = %document.id, "Failed to insert document: {}", e);
        if let Err(cleanup) = state.storage.delete(&storage_key).await {
            tracing::warn!(storage_key = %storage_key, "Orphaned upload left on disk: {}", cleanup);
        }
        return Err(e.into());
    }

    let complete = refresh_documents_complete(&state.db, driver.id).await?;

    tracing::info!(
        document_id = %document.id,
        driver_id = %driver.id,
        doc_type = doc_type.as_str(),
        size = document.size,
        documents_complete = complete,
        "Document uploaded"
    );

    state.audit.record(
        AuditEntry::new(
            AuditAction::Create,
            EntityType::Document,
            Some(document.id),
            format!(
                "Uploaded {} for driver {}",
                doc_type.as_str(),
                driver.full_name()
            ),
        )
        .new_values(&doc! {
            "driver": driver.id,
            "type": doc_type.as_str(),
            "filename": document.filename.as_str(),
        }),
        &user,
        &meta,
    );

    let users = state.db.user_summaries([document.uploaded_by]).await?;
    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::ok(DocumentResponse::new(&document, &users))
                .with_message("Document uploaded successfully"),
        ),
    ))
}

/// Documents awaiting (or past) review, with per-status counts.
///
/// GET /api/documents/queue
pub async fn document_queue(
    State(state): State<AppState>,
    _user: Authorized<OpsOrAdmin>,
    QueryParams(query): QueryParams<DocumentQueueQuery>,
) -> Result<Json<ApiResponse<Vec<DocumentResponse>>>, AppError> {
    let page = PageRequest::resolve(query.page, query.limit, DEFAULT_PAGE_LIMIT);

    let mut type_filter = BsonDocument::new();
    if let Some(doc_type) = non_blank(query.doc_type.as_deref()) {
        let doc_type: DocumentType = doc_type.parse().map_err(AppError::bad_request)?;
        type_filter.insert("doc_type", doc_type.as_str());
    }

    let mut filter = type_filter.clone();
    let status = non_blank(query.status.as_deref()).unwrap_or_else(|| "pending".to_string());
    if status != "all" {
        let status: DocumentStatus = status.parse().map_err(AppError::bad_request)?;
        filter.insert("status", status.as_str());
    }

    let documents_collection = state.db.documents();
    let total = documents_collection
        .count_documents(filter.clone(), None)
        .await?;

    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit as i64)
        .build();
    let documents: Vec<Document> = documents_collection
        .find(filter, options)
        .await?
        .try_collect()
        .await?;

    let mut driver_ids: Vec<ObjectId> = documents.iter().map(|d| d.driver).collect();
    driver_ids.sort();
    driver_ids.dedup();
    let drivers: HashMap<ObjectId, Driver> = state
        .db
        .drivers()
        .find(doc! { "_id": { "$in": driver_ids } }, None)
        .await?
        .try_collect::<Vec<Driver>>()
        .await?
        .into_iter()
        .map(|driver| (driver.id, driver))
        .collect();

    let users = state
        .db
        .user_summaries(
            documents
                .iter()
                .flat_map(|d| std::iter::once(d.uploaded_by).chain(d.reviewed_by)),
        )
        .await?;

    let rows = state
        .db
        .aggregate(
            &documents_collection,
            vec![
                doc! { "$match": type_filter },
                doc! { "$group": { "_id": "$status", "count": { "$sum": 1 } } },
            ],
        )
        .await?;
    let mut counts = DocumentCounts::default();
    for row in &rows {
        if let Ok(status) = row.get_str("_id") {
            counts.record(status, count_field(row, "count"));
        }
    }

    let data = documents
        .iter()
        .map(|document| {
            DocumentResponse::new(document, &users).with_driver(drivers.get(&document.driver))
        })
        .collect();

    Ok(Json(
        ApiResponse::ok(data)
            .with_counts(counts)
            .with_pagination(page.pagination(total)),
    ))
}

/// Stream the stored file with its original MIME type.
///
/// GET /api/documents/:id/file
pub async fn document_file(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let document = load_document(&state.db, &id).await?;

    if user.role.is_scoped_to_own_records() {
        let driver = state
            .db
            .find_driver(&document.driver)
            .await?
            .ok_or_else(|| AppError::not_found("Driver not found"))?;
        ensure_driver_access(&user, &driver)?;
    }

    let data = state.storage.download(&document.storage_key).await?;

    Ok((
        [
            (header::CONTENT_TYPE, document.mime_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&document.original_name),
            ),
        ],
        data,
    ))
}

/// Move a driver from `pending` to `under_review` once every one of its
/// documents is approved. The status guard in the filter keeps a concurrent
/// manual transition intact.
async fn advance_driver_if_ready(
    state: &AppState,
    driver: ObjectId,
    reviewer: &User,
    meta: &RequestMeta,
) -> Result<bool, AppError> {
    let outstanding = state
        .db
        .documents()
        .count_documents(
            doc! { "driver": driver, "status": { "$ne": DocumentStatus::Approved.as_str() } },
            None,
        )
        .await?;
    if outstanding > 0 {
        return Ok(false);
    }

    let now = BsonDateTime::from_chrono(Utc::now());
    let result = state
        .db
        .drivers()
        .update_one(
            doc! { "_id": driver, "status": "pending" },
            doc! { "$set": {
                "status": "under_review",
                "reviewed_by": reviewer.id,
                "reviewed_at": now,
                "updated_at": now,
            } },
            None,
        )
        .await?;

    if result.modified_count == 0 {
        return Ok(false);
    }

    tracing::info!(driver_id = %driver, "All documents approved; driver moved to under_review");
    state.audit.record(
        AuditEntry::new(
            AuditAction::StatusChange,
            EntityType::Driver,
            Some(driver),
            "Changed driver status from pending to under_review after all documents were approved",
        )
        .previous_values(&doc! { "status": "pending" })
        .new_values(&doc! { "status": "under_review" }),
        reviewer,
        meta,
    );
    Ok(true)
}

/// PUT /api/documents/:id/status
pub async fn update_document_status(
    State(state): State<AppState>,
    user: Authorized<OpsOrAdmin>,
    meta: RequestMeta,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateDocumentStatusRequest>,
) -> Result<Json<ApiResponse<DocumentResponse>>, AppError> {
    let status = match req.status.trim() {
        "approved" => DocumentStatus::Approved,
        "rejected" => DocumentStatus::Rejected,
        _ => return Err(AppError::bad_request("Status must be approved or rejected")),
    };
    let reason = non_blank(req.rejection_reason.as_deref());
    if status == DocumentStatus::Rejected && reason.is_none() {
        return Err(AppError::bad_request("Rejection reason is required"));
    }

    let document = load_document(&state.db, &id).await?;
    let previous = document.status;

    let now = BsonDateTime::from_chrono(Utc::now());
    let rejection_reason = match status {
        DocumentStatus::Rejected => Bson::from(reason.clone()),
        _ => Bson::Null,
    };
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let updated = state
        .db
        .documents()
        .find_one_and_update(
            doc! { "_id": document.id },
            doc! { "$set": {
                "status": status.as_str(),
                "rejection_reason": rejection_reason,
                "reviewed_by": user.id,
                "reviewed_at": now,
                "updated_at": now,
            } },
            options,
        )
        .await?
        .ok_or_else(|| AppError::not_found("Document not found"))?;

    tracing::info!(
        document_id = %updated.id,
        driver_id = %updated.driver,
        from = previous.as_str(),
        to = status.as_str(),
        reviewed_by = %user.id,
        "Document reviewed"
    );

    let action = match status {
        DocumentStatus::Approved => AuditAction::Approve,
        _ => AuditAction::Reject,
    };
    state.audit.record(
        AuditEntry::new(
            action,
            EntityType::Document,
            Some(updated.id),
            format!(
                "{} {} document",
                if status == DocumentStatus::Approved {
                    "Approved"
                } else {
                    "Rejected"
                },
                updated.doc_type.as_str()
            ),
        )
        .previous_values(&doc! { "status": previous.as_str() })
        .new_values(&doc! { "status": status.as_str(), "rejection_reason": reason }),
        &user,
        &meta,
    );

    if status == DocumentStatus::Approved {
        advance_driver_if_ready(&state, updated.driver, &user, &meta).await?;
    }

    let users = state
        .db
        .user_summaries(std::iter::once(updated.uploaded_by).chain(updated.reviewed_by))
        .await?;
    Ok(Json(
        ApiResponse::ok(DocumentResponse::new(&updated, &users))
            .with_message(format!("Document {}", status.as_str())),
    ))
}

/// DELETE /api/documents/:id
pub async fn delete_document(
    State(state): State<AppState>,
    user: Authorized<AdminOnly>,
    meta: RequestMeta,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let document = load_document(&state.db, &id).await?;

    if let Err(e) = state.storage.delete(&document.storage_key).await {
        tracing::warn!(
            document_id = %document.id,
            storage_key = %document.storage_key,
            "Could not remove stored file: {}",
            e
        );
    }

    state
        .db
        .documents()
        .delete_one(doc! { "_id": document.id }, None)
        .await?;
    refresh_documents_complete(&state.db, document.driver).await?;

    tracing::info!(document_id = %document.id, driver_id = %document.driver, "Document deleted");

    state.audit.record(
        AuditEntry::new(
            AuditAction::Delete,
            EntityType::Document,
            Some(document.id),
            format!("Deleted {} document", document.doc_type.as_str()),
        )
        .previous_values(&doc! {
            "driver": document.driver,
            "type": document.doc_type.as_str(),
            "filename": document.filename.as_str(),
            "status": document.status.as_str(),
        }),
        &user,
        &meta,
    );

    Ok(Json(ApiResponse::message("Document deleted successfully")))
}
