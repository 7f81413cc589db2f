use reqwest::Method;
use serde_json::{json, Value};

use crate::client::{to_json, HttpClient, RequestOptions};
use crate::error::Result;
use crate::request::Params;

use super::api_types::{ApiUser, NewUser, UserUpdate};
use super::types::User;
use super::{fetch_list, fetch_one};

const ENDPOINT: &str = "/users";

/// Filters for the user list. Unset fields are left off the query.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
  pub role: Option<String>,
  pub search: Option<String>,
  pub page: Option<u32>,
}

pub struct Users<'a> {
  client: &'a HttpClient,
}

impl<'a> Users<'a> {
  pub(super) fn new(client: &'a HttpClient) -> Self {
    Self { client }
  }

  pub async fn list(&self, filter: &UserFilter) -> Result<Vec<User>> {
    let params = Params::new()
      .with_opt("role", filter.role.as_deref())
      .with_opt("search", filter.search.as_deref())
      .with_opt("page", filter.page);
    fetch_list::<ApiUser, User>(self.client, ENDPOINT, params).await
  }

  pub async fn get(&self, id: u64) -> Result<User> {
    fetch_one::<ApiUser, User>(self.client, &format!("{}/{}", ENDPOINT, id)).await
  }

  pub async fn create(&self, user: &NewUser) -> Result<User> {
    let opts = RequestOptions::new()
      .body(to_json(user)?)
      .success_message("User created");
    let created: ApiUser = self.client.send(Method::POST, ENDPOINT, opts).await?;
    self.client.invalidate_prefix(ENDPOINT);
    Ok(User::from(created))
  }

  pub async fn update(&self, id: u64, changes: &UserUpdate) -> Result<User> {
    let opts = RequestOptions::new()
      .body(to_json(changes)?)
      .success_message("User updated");
    let updated: ApiUser = self
      .client
      .send(Method::PUT, &format!("{}/{}", ENDPOINT, id), opts)
      .await?;
    self.client.invalidate_prefix(ENDPOINT);
    Ok(User::from(updated))
  }

  pub async fn delete(&self, id: u64) -> Result<()> {
    let opts = RequestOptions::new().success_message("User deleted");
    let _: Value = self
      .client
      .send(Method::DELETE, &format!("{}/{}", ENDPOINT, id), opts)
      .await?;
    self.client.invalidate_prefix(ENDPOINT);
    Ok(())
  }

  pub async fn assign_role(&self, id: u64, role: &str) -> Result<()> {
    let opts = RequestOptions::new()
      .body(json!({ "role": role }))
      .success_message("Role updated");
    let _: Value = self
      .client
      .send(Method::PATCH, &format!("{}/{}/role", ENDPOINT, id), opts)
      .await?;
    self.client.invalidate_prefix(ENDPOINT);
    Ok(())
  }
}
