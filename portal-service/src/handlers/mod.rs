pub mod audit;
pub mod auth;
pub mod documents;
pub mod drivers;
pub mod health;
pub mod users;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mongodb::bson::{self, Bson, Document as BsonDocument};
use serde::Serialize;
use service_core::error::AppError;

use crate::models::{Driver, User};

/// Sales agents may only touch drivers they registered.
pub(crate) fn ensure_driver_access(user: &User, driver: &Driver) -> Result<(), AppError> {
    if user.role.is_scoped_to_own_records() && driver.registered_by != user.id {
        tracing::warn!(
            user_id = %user.id,
            driver_id = %driver.id,
            "Sales agent attempted to access a foreign driver"
        );
        return Err(AppError::forbidden("Access denied"));
    }
    Ok(())
}

/// Escape user input for use inside a `$regex` so it matches literally.
pub(crate) fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\^$.|?*+()[]{}/-".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Case-insensitive "contains" across several fields.
pub(crate) fn search_filter(fields: &[&str], term: &str) -> Option<Bson> {
    let term = term.trim();
    if term.is_empty() {
        return None;
    }
    let pattern = escape_regex(term);
    let clauses: Vec<Bson> = fields
        .iter()
        .map(|field| {
            let mut clause = BsonDocument::new();
            clause.insert(
                *field,
                bson::doc! { "$regex": pattern.as_str(), "$options": "i" },
            );
            Bson::Document(clause)
        })
        .collect();
    Some(Bson::Array(clauses))
}

/// `$sum` results come back as Int32 or Int64 depending on magnitude.
pub(crate) fn count_field(doc: &BsonDocument, key: &str) -> u64 {
    match doc.get(key) {
        Some(Bson::Int32(n)) => (*n).max(0) as u64,
        Some(Bson::Int64(n)) => (*n).max(0) as u64,
        Some(Bson::Double(n)) => n.max(0.0) as u64,
        _ => 0,
    }
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain date
/// resolves to the start of the day, or its last instant when `end_of_day`.
pub(crate) fn parse_date(value: &str, end_of_day: bool) -> Result<DateTime<Utc>, AppError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::bad_request(format!("Invalid date: {}", value)))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| AppError::bad_request(format!("Invalid date: {}", value)))?;
    Ok(date.and_time(time).and_utc())
}

pub(crate) fn to_bson<T: Serialize>(value: &T) -> Result<Bson, AppError> {
    bson::to_bson(value)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("BSON serialization failed: {}", e)))
}

/// `Some(trimmed)` for non-blank input.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DriverInfo, RegistrationStatus, Role};
    use chrono::{Datelike, Timelike};
    use mongodb::bson::{doc, oid::ObjectId};

    fn user(role: Role) -> User {
        User::new("u@littleride.et", "h".to_string(), "U".to_string(), role, None)
    }

    fn driver_for(owner: ObjectId) -> Driver {
        Driver::new(
            DriverInfo {
                name: "D".to_string(),
                phone: "251911111111".to_string(),
                email: None,
                code: None,
                plate_number: "AA1".to_string(),
                registration_status: RegistrationStatus::Registration,
                tin_no: None,
            },
            None,
            owner,
        )
    }

    #[test]
    fn agents_are_scoped_to_their_own_drivers() {
        let agent = user(Role::SalesAgent);
        let other_agent = user(Role::SalesAgent);
        let ops = user(Role::Operations);
        let driver = driver_for(agent.id);

        assert!(ensure_driver_access(&agent, &driver).is_ok());
        assert!(ensure_driver_access(&ops, &driver).is_ok());
        let err = ensure_driver_access(&other_agent, &driver).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn regex_input_is_escaped() {
        assert_eq!(escape_regex("AA-3.1"), "AA\\-3\\.1");
        assert_eq!(escape_regex("(x)*"), "\\(x\\)\\*");
        assert!(search_filter(&["name"], "   ").is_none());

        let Some(Bson::Array(clauses)) = search_filter(&["a", "b"], "abe") else {
            panic!("expected clauses");
        };
        assert_eq!(clauses.len(), 2);
    }

    #[test]
    fn counts_accept_any_numeric_width() {
        let d = doc! { "a": 3_i32, "b": 5_i64, "c": "x" };
        assert_eq!(count_field(&d, "a"), 3);
        assert_eq!(count_field(&d, "b"), 5);
        assert_eq!(count_field(&d, "c"), 0);
        assert_eq!(count_field(&d, "missing"), 0);
    }

    #[test]
    fn dates_parse_in_both_formats() {
        let start = parse_date("2024-03-05", false).unwrap();
        assert_eq!((start.day(), start.hour()), (5, 0));

        let end = parse_date("2024-03-05", true).unwrap();
        assert_eq!((end.hour(), end.minute()), (23, 59));

        let exact = parse_date("2024-03-05T10:30:00+03:00", false).unwrap();
        assert_eq!(exact.hour(), 7);

        assert!(parse_date("05/03/2024", false).is_err());
    }
}
