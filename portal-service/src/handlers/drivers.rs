use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime, Document as BsonDocument},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
};
use service_core::error::AppError;
use validator::Validate;

use super::{count_field, ensure_driver_access, non_blank, search_filter, to_bson};
use crate::dtos::documents::DocumentResponse;
use crate::dtos::drivers::{
    CreateDriverRequest, DailyCount, DriverDetail, DriverListQuery, DriverResponse, DriverStats,
    DriverStatsQuery, StatusSummary, UpdateDriverRequest, UpdateDriverStatusRequest,
};
use crate::dtos::{ApiResponse, PageRequest, UserLookup, DEFAULT_PAGE_LIMIT};
use crate::middleware::{AgentOrAdmin, Authorized, CurrentUser, OpsOrAdmin};
use crate::models::{AuditAction, Driver, DriverInfo, DriverStatus, EntityType, User};
use crate::services::{AuditEntry, MongoDb};
use crate::utils::{parse_object_id, QueryParams, RequestMeta, ValidatedJson};
use crate::AppState;

const SEARCH_FIELDS: [&str; 4] = [
    "driver_info.name",
    "driver_info.phone",
    "driver_info.plate_number",
    "driver_info.code",
];

/// Map a public `sortBy` value onto its stored field. Unknown keys sort by
/// creation time.
pub(crate) fn sort_field(sort_by: Option<&str>) -> &'static str {
    match sort_by {
        Some("updatedAt") => "updated_at",
        Some("status") => "status",
        Some("submittedAt") => "submitted_at",
        Some("name") => "driver_info.name",
        _ => "created_at",
    }
}

pub(crate) fn sort_direction(sort_order: Option<&str>) -> i32 {
    match sort_order {
        Some(order) if order.eq_ignore_ascii_case("asc") => 1,
        _ => -1,
    }
}

/// Window start for `GET /drivers/stats`. `None` means all time; `day` is
/// today since midnight UTC.
pub(crate) fn period_start(
    period: Option<&str>,
    now: chrono::DateTime<Utc>,
) -> Result<Option<chrono::DateTime<Utc>>, AppError> {
    let days = match period.unwrap_or("month") {
        "day" => {
            let midnight = now.date_naive().and_hms_opt(0, 0, 0).ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!("No midnight for {}", now))
            })?;
            return Ok(Some(midnight.and_utc()));
        }
        "week" => 7,
        "month" => 30,
        "all" => return Ok(None),
        other => return Err(AppError::bad_request(format!("Invalid period: {}", other))),
    };
    Ok(Some(now - Duration::days(days)))
}

fn scope_to_agent(filter: &mut BsonDocument, user: &User) {
    if user.role.is_scoped_to_own_records() {
        filter.insert("registered_by", user.id);
    }
}

pub(crate) async fn lookup_for_drivers<'a, I>(
    db: &MongoDb,
    drivers: I,
) -> Result<UserLookup, AppError>
where
    I: IntoIterator<Item = &'a Driver>,
{
    let ids = drivers
        .into_iter()
        .flat_map(|d| std::iter::once(d.registered_by).chain(d.reviewed_by));
    db.user_summaries(ids).await
}

async fn load_driver(db: &MongoDb, id: &str) -> Result<Driver, AppError> {
    let id = parse_object_id(id)?;
    db.find_driver(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Driver not found"))
}

/// Register a new driver in `pending`.
///
/// POST /api/drivers
pub async fn create_driver(
    State(state): State<AppState>,
    user: Authorized<AgentOrAdmin>,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<CreateDriverRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DriverResponse>>), AppError> {
    req.driver_info.validate()?;

    let info = DriverInfo::from(req.driver_info);
    let driver = Driver::new(info, non_blank(req.internal_notes.as_deref()), user.id);

    state.db.drivers().insert_one(&driver, None).await.map_err(|e| {
        tracing::error!(driver_id = %driver.id, "Failed to insert driver: {}", e);
        AppError::from(e)
    })?;

    tracing::info!(
        driver_id = %driver.id,
        registered_by = %user.id,
        "Driver registered"
    );

    state.audit.record(
        AuditEntry::new(
            AuditAction::Create,
            EntityType::Driver,
            Some(driver.id),
            format!("Registered driver {}", driver.full_name()),
        )
        .new_values(&driver.driver_info),
        &user,
        &meta,
    );

    let users = lookup_for_drivers(&state.db, [&driver]).await?;
    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::ok(DriverResponse::new(&driver, &users))
                .with_message("Driver registered successfully"),
        ),
    ))
}

/// GET /api/drivers
pub async fn list_drivers(
    State(state): State<AppState>,
    user: CurrentUser,
    QueryParams(query): QueryParams<DriverListQuery>,
) -> Result<Json<ApiResponse<Vec<DriverResponse>>>, AppError> {
    let page = PageRequest::resolve(query.page, query.limit, DEFAULT_PAGE_LIMIT);

    let mut filter = BsonDocument::new();
    if let Some(status) = non_blank(query.status.as_deref()).filter(|s| s != "all") {
        let status: DriverStatus = status.parse().map_err(AppError::bad_request)?;
        filter.insert("status", status.as_str());
    }
    scope_to_agent(&mut filter, &user);
    if let Some(clauses) = query
        .search
        .as_deref()
        .and_then(|term| search_filter(&SEARCH_FIELDS, term))
    {
        filter.insert("$or", clauses);
    }

    let total = state.db.drivers().count_documents(filter.clone(), None).await?;

    let mut sort = BsonDocument::new();
    sort.insert(
        sort_field(query.sort_by.as_deref()),
        sort_direction(query.sort_order.as_deref()),
    );
    let options = FindOptions::builder()
        .sort(sort)
        .skip(page.skip())
        .limit(page.limit as i64)
        .build();

    let drivers: Vec<Driver> = state
        .db
        .drivers()
        .find(filter, options)
        .await?
        .try_collect()
        .await?;

    let users = lookup_for_drivers(&state.db, &drivers).await?;
    let data = drivers
        .iter()
        .map(|driver| DriverResponse::new(driver, &users))
        .collect();

    Ok(Json(ApiResponse::ok(data).with_pagination(page.pagination(total))))
}

/// Status breakdown and daily registrations over a period.
///
/// GET /api/drivers/stats
pub async fn driver_stats(
    State(state): State<AppState>,
    user: CurrentUser,
    QueryParams(query): QueryParams<DriverStatsQuery>,
) -> Result<Json<ApiResponse<DriverStats>>, AppError> {
    let mut matcher = BsonDocument::new();
    if let Some(since) = period_start(query.period.as_deref(), Utc::now())? {
        matcher.insert("created_at", doc! { "$gte": BsonDateTime::from_chrono(since) });
    }
    scope_to_agent(&mut matcher, &user);

    let drivers = state.db.drivers();

    let by_status = state
        .db
        .aggregate(
            &drivers,
            vec![
                doc! { "$match": matcher.clone() },
                doc! { "$group": { "_id": "$status", "count": { "$sum": 1 } } },
            ],
        )
        .await?;

    let mut summary = StatusSummary::default();
    for row in &by_status {
        let count = count_field(row, "count");
        summary.total += count;
        if let Ok(status) = row.get_str("_id") {
            summary.record(status, count);
        }
    }

    let daily_rows = state
        .db
        .aggregate(
            &drivers,
            vec![
                doc! { "$match": matcher },
                doc! { "$group": {
                    "_id": { "$dateToString": { "format": "%Y-%m-%d", "date": "$created_at" } },
                    "count": { "$sum": 1 },
                } },
                doc! { "$sort": { "_id": 1 } },
            ],
        )
        .await?;

    let daily = daily_rows
        .iter()
        .filter_map(|row| {
            row.get_str("_id").ok().map(|date| DailyCount {
                date: date.to_string(),
                count: count_field(row, "count"),
            })
        })
        .collect();

    Ok(Json(ApiResponse::ok(DriverStats { summary, daily })))
}

/// GET /api/drivers/:id
pub async fn get_driver(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DriverDetail>>, AppError> {
    let driver = load_driver(&state.db, &id).await?;
    ensure_driver_access(&user, &driver)?;

    let documents = state.db.driver_documents(&driver.id).await?;

    let user_ids = std::iter::once(driver.registered_by)
        .chain(driver.reviewed_by)
        .chain(
            documents
                .iter()
                .flat_map(|d| std::iter::once(d.uploaded_by).chain(d.reviewed_by)),
        );
    let users = state.db.user_summaries(user_ids).await?;

    Ok(Json(ApiResponse::ok(DriverDetail {
        driver: DriverResponse::new(&driver, &users),
        documents: documents
            .iter()
            .map(|document| DocumentResponse::new(document, &users))
            .collect(),
    })))
}

/// Merge driver info fields and replace internal notes.
///
/// PUT /api/drivers/:id
pub async fn update_driver(
    State(state): State<AppState>,
    user: Authorized<OpsOrAdmin>,
    meta: RequestMeta,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateDriverRequest>,
) -> Result<Json<ApiResponse<DriverResponse>>, AppError> {
    if let Some(patch) = &req.driver_info {
        patch.validate()?;
    }

    let driver = load_driver(&state.db, &id).await?;

    let info = match req.driver_info {
        Some(patch) => patch.apply(&driver.driver_info),
        None => driver.driver_info.clone(),
    };
    let notes = match req.internal_notes {
        Some(notes) => non_blank(Some(notes.as_str())),
        None => driver.internal_notes.clone(),
    };

    let update = doc! { "$set": {
        "driver_info": to_bson(&info)?,
        "internal_notes": notes.clone(),
        "updated_at": BsonDateTime::from_chrono(Utc::now()),
    } };
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let updated = state
        .db
        .drivers()
        .find_one_and_update(doc! { "_id": driver.id }, update, options)
        .await?
        .ok_or_else(|| AppError::not_found("Driver not found"))?;

    tracing::info!(driver_id = %updated.id, updated_by = %user.id, "Driver updated");

    state.audit.record(
        AuditEntry::new(
            AuditAction::Update,
            EntityType::Driver,
            Some(updated.id),
            format!("Updated driver {}", updated.full_name()),
        )
        .previous_values(&doc! {
            "driver_info": to_bson(&driver.driver_info)?,
            "internal_notes": driver.internal_notes.clone(),
        })
        .new_values(&doc! {
            "driver_info": to_bson(&updated.driver_info)?,
            "internal_notes": notes,
        }),
        &user,
        &meta,
    );

    let users = lookup_for_drivers(&state.db, [&updated]).await?;
    Ok(Json(
        ApiResponse::ok(DriverResponse::new(&updated, &users))
            .with_message("Driver updated successfully"),
    ))
}

/// Fields written by a manual status change.
pub(crate) fn status_update(
    status: DriverStatus,
    reason: Option<String>,
    reviewer: &User,
    now: chrono::DateTime<Utc>,
) -> BsonDocument {
    let now = BsonDateTime::from_chrono(now);
    let mut set = doc! {
        "status": status.as_str(),
        "reviewed_by": reviewer.id,
        "reviewed_at": now,
        "updated_at": now,
    };
    match status {
        DriverStatus::Rejected => {
            set.insert("rejection_reason", reason);
        }
        _ => {
            set.insert("rejection_reason", Bson::Null);
        }
    }
    if status == DriverStatus::Approved {
        set.insert("approved_at", now);
    }
    doc! { "$set": set }
}

/// PUT /api/drivers/:id/status
pub async fn update_driver_status(
    State(state): State<AppState>,
    user: Authorized<OpsOrAdmin>,
    meta: RequestMeta,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateDriverStatusRequest>,
) -> Result<Json<ApiResponse<DriverResponse>>, AppError> {
    let status: DriverStatus = req.status.trim().parse().map_err(AppError::bad_request)?;
    let reason = non_blank(req.rejection_reason.as_deref());
    if status == DriverStatus::Rejected && reason.is_none() {
        return Err(AppError::bad_request("Rejection reason is required"));
    }

    let driver = load_driver(&state.db, &id).await?;
    let previous = driver.status;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let updated = state
        .db
        .drivers()
        .find_one_and_update(
            doc! { "_id": driver.id },
            status_update(status, reason.clone(), &user, Utc::now()),
            options,
        )
        .await?
        .ok_or_else(|| AppError::not_found("Driver not found"))?;

    tracing::info!(
        driver_id = %updated.id,
        from = previous.as_str(),
        to = status.as_str(),
        reviewed_by = %user.id,
        "Driver status changed"
    );

    let action = match status {
        DriverStatus::Approved => AuditAction::Approve,
        DriverStatus::Rejected => AuditAction::Reject,
        _ => AuditAction::StatusChange,
    };
    state.audit.record(
        AuditEntry::new(
            action,
            EntityType::Driver,
            Some(updated.id),
            format!(
                "Changed driver status from {} to {}",
                previous.as_str(),
                status.as_str()
            ),
        )
        .previous_values(&doc! { "status": previous.as_str() })
        .new_values(&doc! { "status": status.as_str(), "rejection_reason": reason }),
        &user,
        &meta,
    );

    let users = lookup_for_drivers(&state.db, [&updated]).await?;
    Ok(Json(
        ApiResponse::ok(DriverResponse::new(&updated, &users))
            .with_message(format!("Driver status updated to {}", status.as_str())),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::TimeZone;

    fn reviewer() -> User {
        User::new(
            "ops@littleride.et",
            "h".to_string(),
            "Ops".to_string(),
            Role::Operations,
            None,
        )
    }

    #[test]
    fn sort_keys_map_to_stored_fields() {
        assert_eq!(sort_field(Some("name")), "driver_info.name");
        assert_eq!(sort_field(Some("submittedAt")), "submitted_at");
        assert_eq!(sort_field(Some("bogus")), "created_at");
        assert_eq!(sort_field(None), "created_at");
        assert_eq!(sort_direction(Some("ASC")), 1);
        assert_eq!(sort_direction(Some("desc")), -1);
        assert_eq!(sort_direction(None), -1);
    }

    #[test]
    fn stats_periods() {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
        assert_eq!(
            period_start(Some("day"), now).unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap())
        );
        let just_after_midnight = Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 5).unwrap();
        assert_eq!(
            period_start(Some("day"), just_after_midnight).unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap())
        );
        assert_eq!(
            period_start(Some("week"), now).unwrap(),
            Some(now - Duration::days(7))
        );
        assert_eq!(
            period_start(None, now).unwrap(),
            Some(now - Duration::days(30))
        );
        assert_eq!(period_start(Some("all"), now).unwrap(), None);
        assert!(period_start(Some("year"), now).is_err());
    }

    #[test]
    fn approval_stamps_reviewer_and_clears_reason() {
        let reviewer = reviewer();
        let update = status_update(DriverStatus::Approved, None, &reviewer, Utc::now());
        let set = update.get_document("$set").unwrap();

        assert_eq!(set.get_str("status").unwrap(), "approved");
        assert_eq!(set.get_object_id("reviewed_by").unwrap(), reviewer.id);
        assert!(set.contains_key("approved_at"));
        assert_eq!(set.get("rejection_reason"), Some(&Bson::Null));
    }

    #[test]
    fn rejection_keeps_reason() {
        let update = status_update(
            DriverStatus::Rejected,
            Some("Blurry license".to_string()),
            &reviewer(),
            Utc::now(),
        );
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("rejection_reason").unwrap(), "Blurry license");
        assert!(!set.contains_key("approved_at"));

        let update = status_update(DriverStatus::UnderReview, None, &reviewer(), Utc::now());
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("status").unwrap(), "under_review");
        assert!(!set.contains_key("submitted_at"));
    }
}
