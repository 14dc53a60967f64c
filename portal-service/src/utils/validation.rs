use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use validator::{Validate, ValidationError};

/// JSON body that has passed its `validator` rules. Both malformed JSON and
/// rule violations surface as 400.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| {
                tracing::debug!(error = %e, "Rejected request body");
                AppError::bad_request(e.body_text())
            })?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

/// Query string extractor whose rejections use the JSON error envelope.
pub struct QueryParams<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned + Send + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e: QueryRejection| AppError::bad_request(e.body_text()))?;
        Ok(QueryParams(value))
    }
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Ethiopian mobile numbers: optional `251` prefix, then 9 digits starting with 7 or 9.
pub fn is_valid_phone(phone: &str) -> bool {
    let local = phone.strip_prefix("251").unwrap_or(phone);
    local.len() == 9
        && local.starts_with(['7', '9'])
        && local.chars().all(|c| c.is_ascii_digit())
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(validation_error("required", "Phone number is required"));
    }
    if !is_valid_phone(phone) {
        return Err(validation_error(
            "phone",
            "Please enter a valid phone number (e.g., 251912345678)",
        ));
    }
    Ok(())
}

pub fn validate_driver_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(validation_error("required", "Driver name is required"));
    }
    if name.chars().count() > 100 {
        return Err(validation_error(
            "length",
            "Name cannot exceed 100 characters",
        ));
    }
    Ok(())
}

pub fn validate_plate_number(plate: &str) -> Result<(), ValidationError> {
    if plate.trim().is_empty() {
        return Err(validation_error("required", "Plate number is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, response::IntoResponse, routing::post, Router};
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Deserialize, Validate)]
    struct NamedBody {
        #[validate(length(min = 1, message = "Name is required"))]
        name: String,
    }

    async fn echo_name(ValidatedJson(body): ValidatedJson<NamedBody>) -> impl IntoResponse {
        body.name
    }

    fn post_json(body: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn phone_rules() {
        assert!(is_valid_phone("251912345678"));
        assert!(is_valid_phone("912345678"));
        assert!(is_valid_phone("711223344"));
        assert!(!is_valid_phone("0912345678"));
        assert!(!is_valid_phone("251812345678"));
        assert!(!is_valid_phone("25191234567"));
        assert!(!is_valid_phone("91234567a"));
    }

    #[test]
    fn driver_field_messages() {
        let err = validate_phone("  ").unwrap_err();
        assert_eq!(err.message.unwrap(), "Phone number is required");
        assert!(validate_phone(" 251912345678 ").is_ok());

        let err = validate_driver_name(&"x".repeat(101)).unwrap_err();
        assert_eq!(err.message.unwrap(), "Name cannot exceed 100 characters");
        assert!(validate_plate_number(" ").is_err());
    }

    #[tokio::test]
    async fn invalid_and_malformed_bodies_are_bad_requests() {
        let app = Router::new().route("/", post(echo_name));

        let res = app.clone().oneshot(post_json(r#"{"name":""}"#)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Name is required");
        assert_eq!(body["success"], false);

        let res = app.clone().oneshot(post_json("{not json")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app.oneshot(post_json(r#"{"name":"Abebe"}"#)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
