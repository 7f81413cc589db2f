//! Typed per-entity wrappers over [`HttpClient`].
//!
//! Each façade borrows the client, speaks the backend's wire shapes from
//! [`api_types`] and hands back domain types from [`types`]. Successful
//! mutations drop the cached reads for the entity they touched.

pub mod api_types;
mod assessment;
mod auth;
mod calendar;
mod classes;
mod payments;
mod students;
mod subjects;
pub mod types;
mod users;


use serde::de::DeserializeOwned;

use crate::client::HttpClient;
use crate::error::Result;
use crate::request::Params;

pub use api_types::{
  NewClass, NewPayment, NewSession, NewStudent, NewSubject, NewTerm, NewUser, ScoreInput,
  UserUpdate,
};
pub use assessment::{Results, Scores, ScoreSheetQuery};
pub use auth::Auth;
pub use calendar::{Sessions, Terms};
pub use classes::Classes;
pub use payments::Payments;
pub use students::{StudentFilter, Students};
pub use subjects::Subjects;
pub use types::*;
pub use users::{UserFilter, Users};

impl HttpClient {
  pub fn auth(&self) -> Auth<'_> {
    Auth::new(self)
  }

  pub fn users(&self) -> Users<'_> {
    Users::new(self)
  }

  pub fn students(&self) -> Students<'_> {
    Students::new(self)
  }

  pub fn classes(&self) -> Classes<'_> {
    Classes::new(self)
  }

  pub fn subjects(&self) -> Subjects<'_> {
    Subjects::new(self)
  }

  pub fn sessions(&self) -> Sessions<'_> {
    Sessions::new(self)
  }

  pub fn terms(&self) -> Terms<'_> {
    Terms::new(self)
  }

  pub fn payments(&self) -> Payments<'_> {
    Payments::new(self)
  }

  pub fn scores(&self) -> Scores<'_> {
    Scores::new(self)
  }

  pub fn results(&self) -> Results<'_> {
    Results::new(self)
  }
}

/// GET a list endpoint and convert each wire item into its domain type.
async fn fetch_list<W, D>(client: &HttpClient, endpoint: &str, params: Params) -> Result<Vec<D>>
where
  W: DeserializeOwned,
  D: From<W>,
{
  let list: api_types::ApiList<W> = client.get(endpoint, params).await?;
  Ok(list.into_vec().into_iter().map(D::from).collect())
}

/// GET a single item and convert it.
async fn fetch_one<W, D>(client: &HttpClient, endpoint: &str) -> Result<D>
where
  W: DeserializeOwned,
  D: From<W>,
{
  let item: W = client.get(endpoint, Params::new()).await?;
  Ok(D::from(item))
}
