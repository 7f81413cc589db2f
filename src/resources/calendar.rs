//! Academic sessions and the terms inside them.

use reqwest::Method;
use serde_json::Value;

use crate::client::{to_json, HttpClient, RequestOptions};
use crate::error::Result;
use crate::request::Params;

use super::api_types::{ApiSession, ApiTerm, NewSession, NewTerm};
use super::fetch_list;
use super::types::{AcademicSession, Term};

const SESSIONS: &str = "/sessions";
const TERMS: &str = "/terms";

pub struct Sessions<'a> {
  client: &'a HttpClient,
}

impl<'a> Sessions<'a> {
  pub(super) fn new(client: &'a HttpClient) -> Self {
    Self { client }
  }

  pub async fn list(&self) -> Result<Vec<AcademicSession>> {
    fetch_list::<ApiSession, AcademicSession>(self.client, SESSIONS, Params::new()).await
  }

  /// The session flagged current, if any.
  pub async fn current(&self) -> Result<Option<AcademicSession>> {
    Ok(self.list().await?.into_iter().find(|s| s.is_current))
  }

  /// Submit a new session. Dates are not checked here; run
  /// [`NewSession::validate`] first.
  pub async fn create(&self, session: &NewSession) -> Result<AcademicSession> {
    let opts = RequestOptions::new()
      .body(to_json(session)?)
      .success_message("Session created");
    let created: ApiSession = self.client.send(Method::POST, SESSIONS, opts).await?;
    self.client.invalidate_prefix(SESSIONS);
    Ok(AcademicSession::from(created))
  }

  pub async fn update(&self, id: u64, session: &NewSession) -> Result<AcademicSession> {
    let opts = RequestOptions::new()
      .body(to_json(session)?)
      .success_message("Session updated");
    let updated: ApiSession = self
      .client
      .send(Method::PUT, &format!("{}/{}", SESSIONS, id), opts)
      .await?;
    self.client.invalidate_prefix(SESSIONS);
    Ok(AcademicSession::from(updated))
  }

  /// Make `id` the current session. Terms change with it.
  pub async fn activate(&self, id: u64) -> Result<()> {
    let opts = RequestOptions::new().success_message("Session activated");
    let _: Value = self
      .client
      .send(Method::PATCH, &format!("{}/{}/activate", SESSIONS, id), opts)
      .await?;
    self.client.invalidate_prefix(SESSIONS);
    self.client.invalidate_prefix(TERMS);
    Ok(())
  }
}

pub struct Terms<'a> {
  client: &'a HttpClient,
}

impl<'a> Terms<'a> {
  pub(super) fn new(client: &'a HttpClient) -> Self {
    Self { client }
  }

  pub async fn list(&self, session_id: Option<u64>) -> Result<Vec<Term>> {
    let params = Params::new().with_opt("session_id", session_id);
    fetch_list::<ApiTerm, Term>(self.client, TERMS, params).await
  }

  pub async fn create(&self, term: &NewTerm) -> Result<Term> {
    let opts = RequestOptions::new()
      .body(to_json(term)?)
      .success_message("Term created");
    let created: ApiTerm = self.client.send(Method::POST, TERMS, opts).await?;
    self.client.invalidate_prefix(TERMS);
    Ok(Term::from(created))
  }

  pub async fn activate(&self, id: u64) -> Result<()> {
    let opts = RequestOptions::new().success_message("Term activated");
    let _: Value = self
      .client
      .send(Method::PATCH, &format!("{}/{}/activate", TERMS, id), opts)
      .await?;
    self.client.invalidate_prefix(TERMS);
    Ok(())
  }
}
