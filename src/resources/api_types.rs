//! Serde types matching the backend's payloads.
//!
//! The backend speaks snake_case but a few endpoints answer in camelCase, so
//! incoming fields accept both spellings. These stay separate from the domain
//! types so the façades can adapt shapes in one place.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};

use crate::error::ApiError;

use super::types::{
  AcademicSession, Payment, ResultSheet, ResultStatus, SchoolClass, Score, Student, Subject, Term,
  User,
};

// ============================================================================
// List shapes
// ============================================================================

/// Lists come back bare or wrapped with pagination metadata, which is ignored.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiList<T> {
  Bare(Vec<T>),
  Paged {
    #[serde(alias = "data", alias = "rows", alias = "results")]
    items: Vec<T>,
  },
}

impl<T> ApiList<T> {
  pub fn into_vec(self) -> Vec<T> {
    match self {
      ApiList::Bare(items) => items,
      ApiList::Paged { items, .. } => items,
    }
  }
}

/// Dates arrive as `2024-09-01` or as a full timestamp.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Option<String> = Option::deserialize(deserializer)?;
  Ok(raw.and_then(|s| s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())))
}

/// Numbers sometimes arrive as strings ("12.50"). A string that is not a
/// number is an error, never a silent zero.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Num {
    F(f64),
    S(String),
  }
  Ok(match Option::<Num>::deserialize(deserializer)? {
    Some(Num::F(f)) => f,
    Some(Num::S(s)) => s
      .trim()
      .parse()
      .map_err(|_| D::Error::custom(format!("invalid number {:?}", s)))?,
    None => 0.0,
  })
}

// ============================================================================
// Users and auth
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  pub id: u64,
  #[serde(default, alias = "firstName")]
  pub first_name: String,
  #[serde(default, alias = "lastName")]
  pub last_name: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub role: Option<String>,
  #[serde(default, alias = "isActive")]
  pub is_active: Option<bool>,
}

impl From<ApiUser> for User {
  fn from(api: ApiUser) -> Self {
    User {
      id: api.id,
      first_name: api.first_name,
      last_name: api.last_name,
      email: api.email,
      role: api.role.unwrap_or_else(|| "user".to_string()),
      active: api.is_active.unwrap_or(true),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
  pub first_name: String,
  pub last_name: String,
  pub email: String,
  pub role: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
}

// ============================================================================
// Students
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiStudent {
  pub id: u64,
  #[serde(default, alias = "admissionNumber", alias = "admission_no")]
  pub admission_number: Option<String>,
  #[serde(default, alias = "firstName")]
  pub first_name: String,
  #[serde(default, alias = "lastName")]
  pub last_name: String,
  #[serde(default, alias = "classId")]
  pub class_id: Option<u64>,
  #[serde(default)]
  pub gender: Option<String>,
  #[serde(default, alias = "dateOfBirth", deserialize_with = "lenient_date")]
  pub date_of_birth: Option<NaiveDate>,
}

impl From<ApiStudent> for Student {
  fn from(api: ApiStudent) -> Self {
    Student {
      id: api.id,
      admission_number: api.admission_number,
      first_name: api.first_name,
      last_name: api.last_name,
      class_id: api.class_id,
      gender: api.gender,
      date_of_birth: api.date_of_birth,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewStudent {
  pub first_name: String,
  pub last_name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub class_id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub gender: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date_of_birth: Option<NaiveDate>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub guardian_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub guardian_phone: Option<String>,
}

// ============================================================================
// Classes and subjects
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiClass {
  pub id: u64,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub level: Option<String>,
  #[serde(default, alias = "teacherId", alias = "class_teacher_id")]
  pub teacher_id: Option<u64>,
  #[serde(default, alias = "studentCount", alias = "students_count")]
  pub student_count: Option<u64>,
}

impl From<ApiClass> for SchoolClass {
  fn from(api: ApiClass) -> Self {
    SchoolClass {
      id: api.id,
      name: api.name,
      level: api.level,
      teacher_id: api.teacher_id,
      student_count: api.student_count.unwrap_or(0),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewClass {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub level: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub teacher_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSubject {
  pub id: u64,
  #[serde(default)]
  pub name: String,
  #[serde(default, alias = "subjectCode")]
  pub code: Option<String>,
}

impl From<ApiSubject> for Subject {
  fn from(api: ApiSubject) -> Self {
    Subject {
      id: api.id,
      name: api.name,
      code: api.code,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewSubject {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,
}

// ============================================================================
// Sessions and terms
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSession {
  pub id: u64,
  #[serde(default)]
  pub name: String,
  #[serde(default, alias = "startDate", deserialize_with = "lenient_date")]
  pub start_date: Option<NaiveDate>,
  #[serde(default, alias = "endDate", deserialize_with = "lenient_date")]
  pub end_date: Option<NaiveDate>,
  #[serde(default, alias = "isCurrent", alias = "is_active")]
  pub is_current: Option<bool>,
}

impl From<ApiSession> for AcademicSession {
  fn from(api: ApiSession) -> Self {
    AcademicSession {
      id: api.id,
      name: api.name,
      start_date: api.start_date,
      end_date: api.end_date,
      is_current: api.is_current.unwrap_or(false),
    }
  }
}

/// A new academic session. The backend does no date checks of its own, so
/// callers run [`NewSession::validate`] before submitting.
#[derive(Debug, Clone, Serialize)]
pub struct NewSession {
  pub name: String,
  pub start_date: NaiveDate,
  pub end_date: NaiveDate,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub is_current: bool,
}

impl NewSession {
  pub fn validate(&self) -> Result<(), ApiError> {
    let mut fields = BTreeMap::new();
    if self.name.trim().is_empty() {
      fields.insert("name".to_string(), vec!["Session name is required".to_string()]);
    }
    if self.end_date < self.start_date {
      fields.insert(
        "end_date".to_string(),
        vec!["End date cannot be before start date".to_string()],
      );
    }
    if fields.is_empty() {
      Ok(())
    } else {
      Err(ApiError::validation(fields))
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiTerm {
  pub id: u64,
  #[serde(default)]
  pub name: String,
  #[serde(default, alias = "sessionId")]
  pub session_id: Option<u64>,
  #[serde(default, alias = "startDate", deserialize_with = "lenient_date")]
  pub start_date: Option<NaiveDate>,
  #[serde(default, alias = "endDate", deserialize_with = "lenient_date")]
  pub end_date: Option<NaiveDate>,
  #[serde(default, alias = "isCurrent", alias = "is_active")]
  pub is_current: Option<bool>,
}

impl From<ApiTerm> for Term {
  fn from(api: ApiTerm) -> Self {
    Term {
      id: api.id,
      name: api.name,
      session_id: api.session_id,
      start_date: api.start_date,
      end_date: api.end_date,
      is_current: api.is_current.unwrap_or(false),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTerm {
  pub name: String,
  pub session_id: u64,
  pub start_date: NaiveDate,
  pub end_date: NaiveDate,
}

// ============================================================================
// Payments
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPayment {
  pub id: u64,
  #[serde(alias = "studentId")]
  pub student_id: u64,
  #[serde(default, deserialize_with = "lenient_f64")]
  pub amount: f64,
  #[serde(default, alias = "paymentType", alias = "payment_type")]
  pub purpose: String,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default, alias = "referenceNumber", alias = "reference_number")]
  pub reference: Option<String>,
  #[serde(default, alias = "paidAt", alias = "payment_date")]
  pub paid_at: Option<String>,
}

impl From<ApiPayment> for Payment {
  fn from(api: ApiPayment) -> Self {
    Payment {
      id: api.id,
      student_id: api.student_id,
      amount: api.amount,
      purpose: api.purpose,
      status: api.status.unwrap_or_else(|| "pending".to_string()),
      reference: api.reference,
      paid_at: api.paid_at,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPayment {
  pub student_id: u64,
  pub amount: f64,
  pub purpose: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub method: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reference: Option<String>,
}

// ============================================================================
// Scores and results
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiScore {
  #[serde(alias = "studentId")]
  pub student_id: u64,
  #[serde(default, alias = "studentName")]
  pub student_name: Option<String>,
  #[serde(default, alias = "caScore", alias = "ca", deserialize_with = "lenient_f64")]
  pub ca_score: f64,
  #[serde(default, alias = "examScore", alias = "exam", deserialize_with = "lenient_f64")]
  pub exam_score: f64,
  #[serde(default, deserialize_with = "lenient_f64")]
  pub total: f64,
}

impl From<ApiScore> for Score {
  fn from(api: ApiScore) -> Self {
    let total = if api.total > 0.0 {
      api.total
    } else {
      api.ca_score + api.exam_score
    };
    Score {
      student_id: api.student_id,
      student_name: api.student_name,
      ca_score: api.ca_score,
      exam_score: api.exam_score,
      total,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreInput {
  pub student_id: u64,
  pub ca_score: f64,
  pub exam_score: f64,
}

#[derive(Debug, Serialize)]
pub struct ScoreBatch<'a> {
  pub class_id: u64,
  pub subject_id: u64,
  pub term_id: u64,
  pub scores: &'a [ScoreInput],
}

#[derive(Debug, Deserialize)]
pub struct ApiResult {
  pub id: u64,
  #[serde(alias = "studentId")]
  pub student_id: u64,
  #[serde(default, alias = "studentName")]
  pub student_name: Option<String>,
  #[serde(default, alias = "classId")]
  pub class_id: Option<u64>,
  #[serde(default, alias = "termId")]
  pub term_id: Option<u64>,
  #[serde(default)]
  pub average: Option<f64>,
  #[serde(default)]
  pub status: Option<String>,
}

impl From<ApiResult> for ResultSheet {
  fn from(api: ApiResult) -> Self {
    let status = match api.status.as_deref().map(str::to_lowercase).as_deref() {
      Some("approved") => ResultStatus::Approved,
      Some("rejected") => ResultStatus::Rejected,
      _ => ResultStatus::Pending,
    };
    ResultSheet {
      id: api.id,
      student_id: api.student_id,
      student_name: api.student_name,
      class_id: api.class_id,
      term_id: api.term_id,
      average: api.average,
      status,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_user_accepts_both_spellings() {
    let snake: ApiUser =
      serde_json::from_value(json!({ "id": 1, "first_name": "Ada", "last_name": "L", "email": "a@x" }))
        .unwrap();
    let camel: ApiUser = serde_json::from_value(
      json!({ "id": 1, "firstName": "Ada", "lastName": "L", "email": "a@x", "isActive": false }),
    )
    .unwrap();

    let snake = User::from(snake);
    let camel = User::from(camel);
    assert_eq!(snake.first_name, camel.first_name);
    assert!(snake.active);
    assert!(!camel.active);
    assert_eq!(snake.role, "user");
  }

  #[test]
  fn test_list_shapes() {
    let bare: ApiList<ApiSubject> =
      serde_json::from_value(json!([{ "id": 1, "name": "Maths" }])).unwrap();
    let paged: ApiList<ApiSubject> = serde_json::from_value(
      json!({ "rows": [{ "id": 2, "name": "Biology" }], "total": 1 }),
    )
    .unwrap();
    assert_eq!(bare.into_vec()[0].name, "Maths");
    assert_eq!(paged.into_vec()[0].name, "Biology");
  }

  #[test]
  fn test_lenient_dates_and_amounts() {
    let session: ApiSession = serde_json::from_value(json!({
      "id": 3,
      "name": "2024/2025",
      "startDate": "2024-09-09T00:00:00.000Z",
      "end_date": "2025-07-18",
      "is_current": true
    }))
    .unwrap();
    let session = AcademicSession::from(session);
    assert_eq!(session.start_date, NaiveDate::from_ymd_opt(2024, 9, 9));
    assert_eq!(session.end_date, NaiveDate::from_ymd_opt(2025, 7, 18));

    let payment: ApiPayment = serde_json::from_value(
      json!({ "id": 1, "studentId": 4, "amount": "1500.50", "payment_type": "tuition" }),
    )
    .unwrap();
    let payment = Payment::from(payment);
    assert_eq!(payment.amount, 1500.5);
    assert_eq!(payment.purpose, "tuition");
    assert_eq!(payment.status, "pending");
  }

  #[test]
  fn test_unparseable_amount_is_rejected() {
    let result = serde_json::from_value::<ApiPayment>(
      json!({ "id": 1, "student_id": 4, "amount": "twelve", "purpose": "tuition" }),
    );
    assert!(result.is_err());

    let blank = serde_json::from_value::<ApiPayment>(
      json!({ "id": 1, "student_id": 4, "amount": "", "purpose": "tuition" }),
    );
    assert!(blank.is_err());
  }

  #[test]
  fn test_score_total_falls_back_to_sum() {
    let score: ApiScore =
      serde_json::from_value(json!({ "student_id": 1, "ca": 28, "exam": "55" })).unwrap();
    assert_eq!(Score::from(score).total, 83.0);
  }

  #[test]
  fn test_session_dates_are_checked() {
    let mut session = NewSession {
      name: "2024/2025".to_string(),
      start_date: NaiveDate::from_ymd_opt(2024, 9, 9).unwrap(),
      end_date: NaiveDate::from_ymd_opt(2025, 7, 18).unwrap(),
      is_current: false,
    };
    assert!(session.validate().is_ok());

    // same-day sessions are allowed
    session.end_date = session.start_date;
    assert!(session.validate().is_ok());

    session.end_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let err = session.validate().unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    assert!(err.field_errors().contains_key("end_date"));
  }

  #[test]
  fn test_result_status() {
    let result: ApiResult =
      serde_json::from_value(json!({ "id": 1, "student_id": 2, "status": "APPROVED" })).unwrap();
    assert_eq!(ResultSheet::from(result).status, ResultStatus::Approved);
  }
}
