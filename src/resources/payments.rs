use reqwest::Method;

use crate::client::{to_json, HttpClient, RequestOptions};
use crate::error::Result;
use crate::request::Params;

use super::api_types::{ApiPayment, NewPayment};
use super::types::Payment;
use super::{fetch_list, fetch_one};

const ENDPOINT: &str = "/payments";

pub struct Payments<'a> {
  client: &'a HttpClient,
}

impl<'a> Payments<'a> {
  pub(super) fn new(client: &'a HttpClient) -> Self {
    Self { client }
  }

  pub async fn list(&self, student_id: Option<u64>) -> Result<Vec<Payment>> {
    let params = Params::new().with_opt("student_id", student_id);
    fetch_list::<ApiPayment, Payment>(self.client, ENDPOINT, params).await
  }

  pub async fn get(&self, id: u64) -> Result<Payment> {
    fetch_one::<ApiPayment, Payment>(self.client, &format!("{}/{}", ENDPOINT, id)).await
  }

  /// Record a payment. Never retried, a second call is a second payment.
  pub async fn record(&self, payment: &NewPayment) -> Result<Payment> {
    let opts = RequestOptions::new()
      .body(to_json(payment)?)
      .success_message("Payment recorded");
    let created: ApiPayment = self.client.send(Method::POST, ENDPOINT, opts).await?;
    self.client.invalidate_prefix(ENDPOINT);
    Ok(Payment::from(created))
  }
}
