//! JSON bodies exchanged with the recognition service.
//!
//! The service reports subjects as `user_id`; both spellings are accepted.
//! Ids may arrive as strings or numbers.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// `POST /recognize` body.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizeRequest {
    pub image_base64: String,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_image: Option<String>,
}

/// `POST /recognize` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct RecognizeResponse {
    pub matched: bool,
    #[serde(default, alias = "user_id", deserialize_with = "opt_string_or_number")]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// `POST /register` body.
///
/// `position` repeats `role` for services that still use the older name.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub image_base64: String,
    pub name: String,
    pub role: String,
    pub position: String,
}

/// `POST /register` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    #[serde(alias = "user_id", deserialize_with = "string_or_number")]
    pub subject_id: String,
}

/// `GET /users` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct UsersResponse {
    #[serde(default)]
    pub users: Vec<RemoteUser>,
}

/// A registered user as the service reports it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteUser {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "position")]
    pub role: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// `GET /users/{id}/image` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct UserImageResponse {
    pub image_base64: String,
}

/// `GET /attendance` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceLogResponse {
    #[serde(default)]
    pub items: Vec<AttendanceRecord>,
}

/// One server-side attendance record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttendanceRecord {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    /// Unix seconds.
    pub ts: f64,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub matched: bool,
    #[serde(default, alias = "user_id", deserialize_with = "opt_string_or_number")]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub distance: Option<f64>,
}

/// `GET /attendance/work-hours` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkHoursResponse {
    #[serde(default)]
    pub users: Vec<WorkHours>,
}

/// Worked time for one subject on one day, first to last successful scan.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkHours {
    #[serde(alias = "user_id", deserialize_with = "string_or_number")]
    pub subject_id: String,
    pub name: String,
    /// Unix seconds of the first scan.
    pub first_check_in: f64,
    /// Unix seconds of the last scan.
    pub last_check_out: f64,
    pub work_hours: f64,
    pub check_ins: u32,
    #[serde(default)]
    pub cross_day: bool,
}

/// `GET /attendance/work-hours/summary` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkHoursSummaryResponse {
    #[serde(default)]
    pub summary: Vec<WorkHoursDay>,
}

/// A [`WorkHours`] row tagged with its day.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkHoursDay {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub hours: WorkHours,
}

/// `POST /attendance` body.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceSubmission {
    pub id: String,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub name: String,
    pub event_type: String,
    pub status: String,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Unix seconds of `created_at`.
    pub ts: i64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_image: Option<String>,
}

/// `POST /attendance` reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttendanceAck {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Set when the service had already recorded this id.
    #[serde(default)]
    pub duplicate: bool,
}

/// `GET /health` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Int(i64),
    Float(f64),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(n) => n.to_string(),
            StringOrNumber::Float(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(String::from)
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
}
