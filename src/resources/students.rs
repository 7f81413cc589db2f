use reqwest::Method;
use serde_json::Value;

use crate::client::{to_json, HttpClient, RequestOptions};
use crate::error::Result;
use crate::request::{Params, UploadPart};

use super::api_types::{ApiStudent, NewStudent};
use super::types::Student;
use super::{fetch_list, fetch_one};

const ENDPOINT: &str = "/students";

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
  pub class_id: Option<u64>,
  pub search: Option<String>,
  pub page: Option<u32>,
}

pub struct Students<'a> {
  client: &'a HttpClient,
}

impl<'a> Students<'a> {
  pub(super) fn new(client: &'a HttpClient) -> Self {
    Self { client }
  }

  pub async fn list(&self, filter: &StudentFilter) -> Result<Vec<Student>> {
    let params = Params::new()
      .with_opt("class_id", filter.class_id)
      .with_opt("search", filter.search.as_deref())
      .with_opt("page", filter.page);
    fetch_list::<ApiStudent, Student>(self.client, ENDPOINT, params).await
  }

  pub async fn get(&self, id: u64) -> Result<Student> {
    fetch_one::<ApiStudent, Student>(self.client, &format!("{}/{}", ENDPOINT, id)).await
  }

  pub async fn register(&self, student: &NewStudent) -> Result<Student> {
    let opts = RequestOptions::new()
      .body(to_json(student)?)
      .success_message("Student registered");
    let created: ApiStudent = self.client.send(Method::POST, ENDPOINT, opts).await?;
    self.invalidate();
    Ok(Student::from(created))
  }

  pub async fn update(&self, id: u64, student: &NewStudent) -> Result<Student> {
    let opts = RequestOptions::new()
      .body(to_json(student)?)
      .success_message("Student updated");
    let updated: ApiStudent = self
      .client
      .send(Method::PUT, &format!("{}/{}", ENDPOINT, id), opts)
      .await?;
    self.invalidate();
    Ok(Student::from(updated))
  }

  pub async fn delete(&self, id: u64) -> Result<()> {
    let opts = RequestOptions::new().success_message("Student removed");
    let _: Value = self
      .client
      .send(Method::DELETE, &format!("{}/{}", ENDPOINT, id), opts)
      .await?;
    self.invalidate();
    Ok(())
  }

  /// Upload a passport photo. Returns whatever the backend reports about the
  /// stored file (usually its URL).
  pub async fn upload_photo(
    &self,
    id: u64,
    file_name: &str,
    mime: Option<&str>,
    bytes: Vec<u8>,
  ) -> Result<Value> {
    let parts = vec![
      UploadPart::text("student_id", id.to_string()),
      UploadPart::file("photo", file_name, mime, bytes),
    ];
    let stored: Value = self
      .client
      .upload(&format!("{}/{}/photo", ENDPOINT, id), parts)
      .await?;
    self.client.invalidate(&format!("{}/{}", ENDPOINT, id), &Params::new());
    Ok(stored)
  }

  // class rosters embed students too
  fn invalidate(&self) {
    self.client.invalidate_prefix(ENDPOINT);
    self.client.invalidate_prefix("/classes");
  }
}
