use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{Duration, Utc};
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document as BsonDocument},
    options::FindOptions,
};
use service_core::error::AppError;
use std::collections::BTreeMap;

use super::{count_field, parse_date};
use crate::dtos::audit::{
    AuditDailyCount, AuditLogQuery, AuditLogResponse, AuditStats, AuditStatsQuery,
};
use crate::dtos::{ApiResponse, PageRequest};
use crate::middleware::{AdminOnly, Authorized};
use crate::models::{AuditLog, EntityType};
use crate::services::MongoDb;
use crate::utils::{parse_object_id, QueryParams};
use crate::AppState;

const AUDIT_PAGE_LIMIT: u64 = 50;
const ENTITY_HISTORY_LIMIT: i64 = 100;
const DEFAULT_STATS_DAYS: i64 = 7;
const MAX_STATS_DAYS: i64 = 365;

pub(crate) fn stats_days(days: Option<i64>) -> i64 {
    days.unwrap_or(DEFAULT_STATS_DAYS).clamp(1, MAX_STATS_DAYS)
}

pub(crate) fn audit_filter(query: &AuditLogQuery) -> Result<BsonDocument, AppError> {
    let mut filter = BsonDocument::new();
    if let Some(action) = query.action {
        filter.insert("action", action.as_str());
    }
    if let Some(entity_type) = query.entity_type {
        filter.insert("entity_type", entity_type.as_str());
    }
    if let Some(performed_by) = query.performed_by.as_deref().filter(|v| !v.trim().is_empty()) {
        filter.insert("performed_by", parse_object_id(performed_by.trim())?);
    }

    let mut range = BsonDocument::new();
    if let Some(start) = query.start_date.as_deref().filter(|v| !v.trim().is_empty()) {
        range.insert("$gte", BsonDateTime::from_chrono(parse_date(start, false)?));
    }
    if let Some(end) = query.end_date.as_deref().filter(|v| !v.trim().is_empty()) {
        range.insert("$lte", BsonDateTime::from_chrono(parse_date(end, true)?));
    }
    if !range.is_empty() {
        filter.insert("created_at", range);
    }

    Ok(filter)
}

async fn render(db: &MongoDb, logs: Vec<AuditLog>) -> Result<Vec<AuditLogResponse>, AppError> {
    let users = db.user_summaries(logs.iter().map(|log| log.performed_by)).await?;
    Ok(logs
        .into_iter()
        .map(|log| AuditLogResponse::new(log, &users))
        .collect())
}

/// Newest entries first.
///
/// GET /api/audit
pub async fn list_audit_logs(
    State(state): State<AppState>,
    _admin: Authorized<AdminOnly>,
    QueryParams(query): QueryParams<AuditLogQuery>,
) -> Result<Json<ApiResponse<Vec<AuditLogResponse>>>, AppError> {
    let page = PageRequest::resolve(query.page, query.limit, AUDIT_PAGE_LIMIT);
    let filter = audit_filter(&query)?;

    let logs_collection = state.db.audit_logs();
    let total = logs_collection.count_documents(filter.clone(), None).await?;
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit as i64)
        .build();
    let logs: Vec<AuditLog> = logs_collection
        .find(filter, options)
        .await?
        .try_collect()
        .await?;

    let data = render(&state.db, logs).await?;
    Ok(Json(ApiResponse::ok(data).with_pagination(page.pagination(total))))
}

/// Per-day, per-action counts over the last `days` days.
///
/// GET /api/audit/stats
pub async fn audit_stats(
    State(state): State<AppState>,
    _admin: Authorized<AdminOnly>,
    QueryParams(query): QueryParams<AuditStatsQuery>,
) -> Result<Json<ApiResponse<AuditStats>>, AppError> {
    let since = Utc::now() - Duration::days(stats_days(query.days));

    let rows = state
        .db
        .aggregate(
            &state.db.audit_logs(),
            vec![
                doc! { "$match": { "created_at": { "$gte": BsonDateTime::from_chrono(since) } } },
                doc! { "$group": {
                    "_id": {
                        "action": "$action",
                        "date": { "$dateToString": { "format": "%Y-%m-%d", "date": "$created_at" } },
                    },
                    "count": { "$sum": 1 },
                } },
                doc! { "$sort": { "_id.date": 1, "_id.action": 1 } },
            ],
        )
        .await?;

    let mut daily = Vec::with_capacity(rows.len());
    let mut by_action: BTreeMap<String, u64> = BTreeMap::new();
    for row in &rows {
        let Ok(key) = row.get_document("_id") else {
            continue;
        };
        let (Ok(action), Ok(date)) = (key.get_str("action"), key.get_str("date")) else {
            continue;
        };
        let count = count_field(row, "count");
        *by_action.entry(action.to_string()).or_default() += count;
        daily.push(AuditDailyCount {
            action: action.to_string(),
            date: date.to_string(),
            count,
        });
    }

    Ok(Json(ApiResponse::ok(AuditStats { daily, by_action })))
}

/// GET /api/audit/entity/:type/:id
pub async fn entity_history(
    State(state): State<AppState>,
    _admin: Authorized<AdminOnly>,
    Path((entity_type, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Vec<AuditLogResponse>>>, AppError> {
    let entity_type: EntityType = entity_type.parse().map_err(AppError::bad_request)?;
    let entity_id = parse_object_id(&id)?;

    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .limit(ENTITY_HISTORY_LIMIT)
        .build();
    let logs: Vec<AuditLog> = state
        .db
        .audit_logs()
        .find(
            doc! { "entity_type": entity_type.as_str(), "entity_id": entity_id },
            options,
        )
        .await?
        .try_collect()
        .await?;

    let data = render(&state.db, logs).await?;
    Ok(Json(ApiResponse::ok(data)))
}
