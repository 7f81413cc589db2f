//! Score entry and result approval.

use reqwest::Method;
use serde_json::{json, Value};

use crate::client::{to_json, HttpClient, RequestOptions};
use crate::error::Result;
use crate::request::Params;

use super::api_types::{ApiResult, ApiScore, ScoreBatch, ScoreInput};
use super::fetch_list;
use super::types::{ResultSheet, Score};

const SCORES: &str = "/scores";
const RESULTS: &str = "/results";

/// Identifies one score sheet: a subject taught in a class during a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreSheetQuery {
  pub class_id: u64,
  pub subject_id: u64,
  pub term_id: u64,
}

impl ScoreSheetQuery {
  fn params(&self) -> Params {
    Params::new()
      .with("class_id", self.class_id)
      .with("subject_id", self.subject_id)
      .with("term_id", self.term_id)
  }
}

pub struct Scores<'a> {
  client: &'a HttpClient,
}

impl<'a> Scores<'a> {
  pub(super) fn new(client: &'a HttpClient) -> Self {
    Self { client }
  }

  pub async fn list(&self, sheet: ScoreSheetQuery) -> Result<Vec<Score>> {
    fetch_list::<ApiScore, Score>(self.client, SCORES, sheet.params()).await
  }

  /// Submit a whole sheet in one call.
  pub async fn submit(&self, sheet: ScoreSheetQuery, scores: &[ScoreInput]) -> Result<()> {
    let batch = ScoreBatch {
      class_id: sheet.class_id,
      subject_id: sheet.subject_id,
      term_id: sheet.term_id,
      scores,
    };
    let opts = RequestOptions::new()
      .body(to_json(&batch)?)
      .success_message(format!("Saved {} scores", scores.len()));
    let _: Value = self
      .client
      .send(Method::POST, &format!("{}/batch", SCORES), opts)
      .await?;
    self.client.invalidate(SCORES, &sheet.params());
    self.client.invalidate_prefix(RESULTS);
    Ok(())
  }
}

pub struct Results<'a> {
  client: &'a HttpClient,
}

impl<'a> Results<'a> {
  pub(super) fn new(client: &'a HttpClient) -> Self {
    Self { client }
  }

  /// Results waiting for approval, optionally for one class.
  pub async fn pending(&self, class_id: Option<u64>) -> Result<Vec<ResultSheet>> {
    let params = Params::new().with_opt("class_id", class_id);
    fetch_list::<ApiResult, ResultSheet>(self.client, &format!("{}/pending", RESULTS), params).await
  }

  pub async fn approve(&self, id: u64) -> Result<()> {
    let opts = RequestOptions::new().success_message("Result approved");
    let _: Value = self
      .client
      .send(Method::PATCH, &format!("{}/{}/approve", RESULTS, id), opts)
      .await?;
    self.client.invalidate_prefix(RESULTS);
    Ok(())
  }

  pub async fn reject(&self, id: u64, reason: &str) -> Result<()> {
    let opts = RequestOptions::new()
      .body(json!({ "reason": reason }))
      .success_message("Result rejected");
    let _: Value = self
      .client
      .send(Method::PATCH, &format!("{}/{}/reject", RESULTS, id), opts)
      .await?;
    self.client.invalidate_prefix(RESULTS);
    Ok(())
  }
}
