use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document as BsonDocument},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
};
use service_core::error::AppError;

use super::{non_blank, search_filter};
use crate::dtos::auth::UserResponse;
use crate::dtos::users::{
    CreateUserRequest, ResetPasswordRequest, UpdateUserRequest, UserListQuery,
};
use crate::dtos::{ApiResponse, PageRequest, DEFAULT_PAGE_LIMIT};
use crate::middleware::{AdminOnly, Authorized};
use crate::models::user::normalize_email;
use crate::models::{AuditAction, EntityType, Role, User};
use crate::services::{AuditEntry, MongoDb};
use crate::utils::{
    hash_password, parse_object_id, Password, QueryParams, RequestMeta, ValidatedJson,
};
use crate::AppState;

const DUPLICATE_EMAIL: &str = "User with this email already exists";

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == 11000
    )
}

async fn load_user(db: &MongoDb, id: &str) -> Result<User, AppError> {
    let id = parse_object_id(id)?;
    db.find_user(&id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

fn after_update() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

/// Field changes requested by `PUT /users/:id`, resolved against the stored user.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct UserChanges {
    pub set: BsonDocument,
    pub previous: BsonDocument,
    pub role_changed: bool,
    pub deactivated: bool,
}

pub(crate) fn user_changes(user: &User, req: UpdateUserRequest) -> UserChanges {
    let mut changes = UserChanges::default();

    if let Some(name) = non_blank(req.name.as_deref()) {
        if name != user.name {
            changes.previous.insert("name", user.name.as_str());
            changes.set.insert("name", name);
        }
    }
    if let Some(role) = req.role {
        if role != user.role {
            changes.previous.insert("role", user.role.as_str());
            changes.set.insert("role", role.as_str());
            changes.role_changed = true;
        }
    }
    if let Some(phone) = req.phone {
        let phone = non_blank(Some(phone.as_str()));
        if phone != user.phone {
            changes.previous.insert("phone", user.phone.clone());
            changes.set.insert("phone", phone);
        }
    }
    if let Some(is_active) = req.is_active {
        if is_active != user.is_active {
            changes.previous.insert("is_active", user.is_active);
            changes.set.insert("is_active", is_active);
            changes.deactivated = !is_active;
        }
    }

    changes
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    _admin: Authorized<AdminOnly>,
    QueryParams(query): QueryParams<UserListQuery>,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, AppError> {
    let page = PageRequest::resolve(query.page, query.limit, DEFAULT_PAGE_LIMIT);

    let mut filter = BsonDocument::new();
    if let Some(role) = query.role {
        filter.insert("role", role.as_str());
    }
    if let Some(is_active) = query.is_active {
        filter.insert("is_active", is_active);
    }
    if let Some(clauses) = query
        .search
        .as_deref()
        .and_then(|term| search_filter(&["name", "email"], term))
    {
        filter.insert("$or", clauses);
    }

    let users = state.db.users();
    let total = users.count_documents(filter.clone(), None).await?;
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit as i64)
        .build();
    let found: Vec<User> = users.find(filter, options).await?.try_collect().await?;

    Ok(Json(
        ApiResponse::ok(found.iter().map(UserResponse::from).collect())
            .with_pagination(page.pagination(total)),
    ))
}

/// Create a portal account. Role defaults to `sales_agent`.
///
/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    admin: Authorized<AdminOnly>,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), AppError> {
    let email = normalize_email(&req.email);
    let users = state.db.users();

    if users
        .find_one(doc! { "email": email.as_str() }, None)
        .await?
        .is_some()
    {
        return Err(AppError::bad_request(DUPLICATE_EMAIL));
    }

    let hash = hash_password(&Password::new(req.password))?;
    let user = User::new(
        &email,
        hash.into_string(),
        req.name,
        req.role.unwrap_or(Role::SalesAgent),
        req.phone,
    );

    // The unique index still catches a concurrent create of the same email.
    if let Err(e) = users.insert_one(&user, None).await {
        if is_duplicate_key(&e) {
            return Err(AppError::bad_request(DUPLICATE_EMAIL));
        }
        return Err(e.into());
    }

    tracing::info!(
        user_id = %user.id,
        role = user.role.as_str(),
        created_by = %admin.id,
        "User created"
    );

    state.audit.record(
        AuditEntry::new(
            AuditAction::Create,
            EntityType::User,
            Some(user.id),
            format!("Created {} account for {}", user.role.as_str(), user.email),
        )
        .new_values(&doc! {
            "email": user.email.as_str(),
            "name": user.name.as_str(),
            "role": user.role.as_str(),
        }),
        &admin,
        &meta,
    );

    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::ok(UserResponse::from(&user)).with_message("User created successfully"),
        ),
    ))
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    _admin: Authorized<AdminOnly>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserResponse>>, AppError> {
    let user = load_user(&state.db, &id).await?;
    Ok(Json(ApiResponse::ok(UserResponse::from(&user))))
}

/// PUT /api/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    admin: Authorized<AdminOnly>,
    meta: RequestMeta,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, AppError> {
    let user = load_user(&state.db, &id).await?;
    let changes = user_changes(&user, req);

    if changes.set.is_empty() {
        return Ok(Json(
            ApiResponse::ok(UserResponse::from(&user)).with_message("User updated successfully"),
        ));
    }

    let mut set = changes.set.clone();
    set.insert("updated_at", BsonDateTime::from_chrono(Utc::now()));
    let mut update = doc! { "$set": set };
    if changes.deactivated {
        update.insert("$unset", doc! { "refresh_token_hash": "" });
    }

    let updated = state
        .db
        .users()
        .find_one_and_update(doc! { "_id": user.id }, update, after_update())
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    tracing::info!(
        user_id = %updated.id,
        updated_by = %admin.id,
        role_changed = changes.role_changed,
        "User updated"
    );

    let (action, description) = if changes.role_changed {
        (
            AuditAction::RoleChange,
            format!(
                "Changed role of {} from {} to {}",
                updated.email,
                user.role.as_str(),
                updated.role.as_str()
            ),
        )
    } else {
        (AuditAction::Update, format!("Updated user {}", updated.email))
    };
    state.audit.record(
        AuditEntry::new(action, EntityType::User, Some(updated.id), description)
            .previous_values(&changes.previous)
            .new_values(&changes.set),
        &admin,
        &meta,
    );

    Ok(Json(
        ApiResponse::ok(UserResponse::from(&updated)).with_message("User updated successfully"),
    ))
}

/// PUT /api/users/:id/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    admin: Authorized<AdminOnly>,
    meta: RequestMeta,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let user = load_user(&state.db, &id).await?;
    let hash = hash_password(&Password::new(req.password))?;

    // Existing sessions must log in again with the new password.
    state
        .db
        .users()
        .update_one(
            doc! { "_id": user.id },
            doc! {
                "$set": {
                    "password_hash": hash.into_string(),
                    "updated_at": BsonDateTime::from_chrono(Utc::now()),
                },
                "$unset": { "refresh_token_hash": "" },
            },
            None,
        )
        .await?;

    tracing::info!(user_id = %user.id, reset_by = %admin.id, "Password reset by admin");

    state.audit.record(
        AuditEntry::new(
            AuditAction::PasswordChange,
            EntityType::User,
            Some(user.id),
            format!("Reset password for {}", user.email),
        ),
        &admin,
        &meta,
    );

    Ok(Json(ApiResponse::message("Password reset successfully")))
}

/// Soft delete: the account is deactivated, never removed.
///
/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    admin: Authorized<AdminOnly>,
    meta: RequestMeta,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let id = parse_object_id(&id)?;
    if id == admin.id {
        return Err(AppError::bad_request("Cannot delete your own account"));
    }

    let user = state
        .db
        .find_user(&id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    state
        .db
        .users()
        .update_one(
            doc! { "_id": user.id },
            doc! {
                "$set": {
                    "is_active": false,
                    "updated_at": BsonDateTime::from_chrono(Utc::now()),
                },
                "$unset": { "refresh_token_hash": "" },
            },
            None,
        )
        .await?;

    tracing::info!(user_id = %user.id, deactivated_by = %admin.id, "User deactivated");

    state.audit.record(
        AuditEntry::new(
            AuditAction::Delete,
            EntityType::User,
            Some(user.id),
            format!("Deactivated user {}", user.email),
        )
        .previous_values(&doc! { "is_active": user.is_active })
        .new_values(&doc! { "is_active": false }),
        &admin,
        &meta,
    );

    Ok(Json(ApiResponse::message("User deactivated successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> User {
        User::new(
            "hana@littleride.et",
            "hash".to_string(),
            "Hana".to_string(),
            Role::SalesAgent,
            Some("251911223344".to_string()),
        )
    }

    fn request(json: &str) -> UpdateUserRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn unchanged_fields_produce_no_update() {
        let changes = user_changes(
            &stored(),
            request(r#"{"name":"Hana","role":"sales_agent"}"#),
        );
        assert!(changes.set.is_empty());
        assert!(!changes.role_changed);
    }

    #[test]
    fn role_change_is_flagged_with_previous_value() {
        let changes = user_changes(&stored(), request(r#"{"role":"operations"}"#));
        assert!(changes.role_changed);
        assert_eq!(changes.set.get_str("role").unwrap(), "operations");
        assert_eq!(changes.previous.get_str("role").unwrap(), "sales_agent");
    }

    #[test]
    fn deactivation_and_phone_clearing() {
        let changes = user_changes(&stored(), request(r#"{"isActive":false,"phone":"  "}"#));
        assert!(changes.deactivated);
        assert!(!changes.role_changed);
        assert!(!changes.set.get_bool("is_active").unwrap());
        assert_eq!(changes.set.get("phone"), Some(&mongodb::bson::Bson::Null));
    }
}
