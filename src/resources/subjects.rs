use reqwest::Method;
use serde_json::{json, Value};

use crate::client::{to_json, HttpClient, RequestOptions};
use crate::error::Result;
use crate::request::Params;

use super::api_types::{ApiSubject, NewSubject};
use super::fetch_list;
use super::types::Subject;

const ENDPOINT: &str = "/subjects";

pub struct Subjects<'a> {
  client: &'a HttpClient,
}

impl<'a> Subjects<'a> {
  pub(super) fn new(client: &'a HttpClient) -> Self {
    Self { client }
  }

  /// All subjects, or only those taught in `class_id`.
  pub async fn list(&self, class_id: Option<u64>) -> Result<Vec<Subject>> {
    match class_id {
      Some(id) => {
        fetch_list::<ApiSubject, Subject>(
          self.client,
          &format!("/classes/{}/subjects", id),
          Params::new(),
        )
        .await
      }
      None => fetch_list::<ApiSubject, Subject>(self.client, ENDPOINT, Params::new()).await,
    }
  }

  pub async fn create(&self, subject: &NewSubject) -> Result<Subject> {
    let opts = RequestOptions::new()
      .body(to_json(subject)?)
      .success_message("Subject created");
    let created: ApiSubject = self.client.send(Method::POST, ENDPOINT, opts).await?;
    self.client.invalidate_prefix(ENDPOINT);
    Ok(Subject::from(created))
  }

  pub async fn update(&self, id: u64, subject: &NewSubject) -> Result<Subject> {
    let opts = RequestOptions::new()
      .body(to_json(subject)?)
      .success_message("Subject updated");
    let updated: ApiSubject = self
      .client
      .send(Method::PUT, &format!("{}/{}", ENDPOINT, id), opts)
      .await?;
    self.client.invalidate_prefix(ENDPOINT);
    Ok(Subject::from(updated))
  }

  pub async fn delete(&self, id: u64) -> Result<()> {
    let opts = RequestOptions::new().success_message("Subject deleted");
    let _: Value = self
      .client
      .send(Method::DELETE, &format!("{}/{}", ENDPOINT, id), opts)
      .await?;
    self.client.invalidate_prefix(ENDPOINT);
    Ok(())
  }

  pub async fn assign_to_class(
    &self,
    subject_id: u64,
    class_id: u64,
    teacher_id: Option<u64>,
  ) -> Result<()> {
    let mut body = json!({ "subject_id": subject_id });
    if let Some(teacher_id) = teacher_id {
      body["teacher_id"] = json!(teacher_id);
    }
    let opts = RequestOptions::new()
      .body(body)
      .success_message("Subject assigned");
    let endpoint = format!("/classes/{}/subjects", class_id);
    let _: Value = self.client.send(Method::POST, &endpoint, opts).await?;
    self.client.invalidate(&endpoint, &Params::new());
    Ok(())
  }
}
