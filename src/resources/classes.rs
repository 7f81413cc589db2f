use reqwest::Method;
use serde_json::Value;

use crate::client::{to_json, HttpClient, RequestOptions};
use crate::error::Result;
use crate::request::Params;

use super::api_types::{ApiClass, ApiStudent, NewClass};
use super::types::{SchoolClass, Student};
use super::{fetch_list, fetch_one};

const ENDPOINT: &str = "/classes";

pub struct Classes<'a> {
  client: &'a HttpClient,
}

impl<'a> Classes<'a> {
  pub(super) fn new(client: &'a HttpClient) -> Self {
    Self { client }
  }

  pub async fn list(&self) -> Result<Vec<SchoolClass>> {
    fetch_list::<ApiClass, SchoolClass>(self.client, ENDPOINT, Params::new()).await
  }

  pub async fn get(&self, id: u64) -> Result<SchoolClass> {
    fetch_one::<ApiClass, SchoolClass>(self.client, &format!("{}/{}", ENDPOINT, id)).await
  }

  /// The class roster.
  pub async fn students(&self, id: u64) -> Result<Vec<Student>> {
    fetch_list::<ApiStudent, Student>(
      self.client,
      &format!("{}/{}/students", ENDPOINT, id),
      Params::new(),
    )
    .await
  }

  pub async fn create(&self, class: &NewClass) -> Result<SchoolClass> {
    let opts = RequestOptions::new()
      .body(to_json(class)?)
      .success_message("Class created");
    let created: ApiClass = self.client.send(Method::POST, ENDPOINT, opts).await?;
    self.client.invalidate_prefix(ENDPOINT);
    Ok(SchoolClass::from(created))
  }

  pub async fn update(&self, id: u64, class: &NewClass) -> Result<SchoolClass> {
    let opts = RequestOptions::new()
      .body(to_json(class)?)
      .success_message("Class updated");
    let updated: ApiClass = self
      .client
      .send(Method::PUT, &format!("{}/{}", ENDPOINT, id), opts)
      .await?;
    self.client.invalidate_prefix(ENDPOINT);
    Ok(SchoolClass::from(updated))
  }

  pub async fn delete(&self, id: u64) -> Result<()> {
    let opts = RequestOptions::new().success_message("Class deleted");
    let _: Value = self
      .client
      .send(Method::DELETE, &format!("{}/{}", ENDPOINT, id), opts)
      .await?;
    self.client.invalidate_prefix(ENDPOINT);
    Ok(())
  }
}
