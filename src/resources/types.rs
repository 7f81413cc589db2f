//! Domain types handed to callers of the resource façades.

use chrono::NaiveDate;
use serde::Serialize;

/// A staff or student account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
  pub id: u64,
  pub first_name: String,
  pub last_name: String,
  pub email: String,
  pub role: String,
  pub active: bool,
}

impl User {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name).trim().to_string()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
  pub id: u64,
  pub admission_number: Option<String>,
  pub first_name: String,
  pub last_name: String,
  pub class_id: Option<u64>,
  pub gender: Option<String>,
  pub date_of_birth: Option<NaiveDate>,
}

/// A class (form/grade group); `Class` is avoided as a type name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchoolClass {
  pub id: u64,
  pub name: String,
  pub level: Option<String>,
  pub teacher_id: Option<u64>,
  pub student_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
  pub id: u64,
  pub name: String,
  pub code: Option<String>,
}

/// Academic year, e.g. "2024/2025"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcademicSession {
  pub id: u64,
  pub name: String,
  pub start_date: Option<NaiveDate>,
  pub end_date: Option<NaiveDate>,
  pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Term {
  pub id: u64,
  pub name: String,
  pub session_id: Option<u64>,
  pub start_date: Option<NaiveDate>,
  pub end_date: Option<NaiveDate>,
  pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
  pub id: u64,
  pub student_id: u64,
  pub amount: f64,
  pub purpose: String,
  pub status: String,
  pub reference: Option<String>,
  pub paid_at: Option<String>,
}

/// One student's marks in one subject for a term
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
  pub student_id: u64,
  pub student_name: Option<String>,
  pub ca_score: f64,
  pub exam_score: f64,
  pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
  Pending,
  Approved,
  Rejected,
}

/// A compiled term result waiting for (or past) approval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSheet {
  pub id: u64,
  pub student_id: u64,
  pub student_name: Option<String>,
  pub class_id: Option<u64>,
  pub term_id: Option<u64>,
  pub average: Option<f64>,
  pub status: ResultStatus,
}
