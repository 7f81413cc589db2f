use reqwest::Method;
use serde_json::{json, Value};

use crate::client::{to_json, HttpClient, RequestOptions};
use crate::error::{ApiError, Result};
use crate::session::SessionKey;

use super::api_types::{ApiUser, LoginRequest};
use super::types::User;

pub struct Auth<'a> {
  client: &'a HttpClient,
}

impl<'a> Auth<'a> {
  pub(super) fn new(client: &'a HttpClient) -> Self {
    Self { client }
  }

  /// Sign in and persist the tokens and user.
  ///
  /// The session is written only once the reply has been fully read; a reply
  /// that cannot be used leaves nothing behind. Anything cached under a
  /// previous identity is dropped.
  pub async fn login(&self, email: &str, password: &str) -> Result<User> {
    let body = to_json(&LoginRequest { email, password })?;
    let opts = RequestOptions::new().body(body).anonymous().no_cache();
    let data = self.client.request(Method::POST, "/auth/login", opts).await?;

    match self.establish_session(&data) {
      Ok(user) => {
        self.client.clear_cache();
        tracing::info!(user_id = user.id, "signed in");
        Ok(user)
      }
      Err(e) => {
        tracing::warn!(error = %e, "unusable login response, discarding session");
        if let Err(clear_err) = self.client.session().clear() {
          tracing::warn!(error = %clear_err, "failed to clear session");
        }
        self.client.report(&e);
        Err(e)
      }
    }
  }

  fn establish_session(&self, data: &Value) -> Result<User> {
    let raw_user = data.get("user").cloned().unwrap_or(Value::Null);
    let user: ApiUser = serde_json::from_value(raw_user.clone())
      .map_err(|e| ApiError::decode(format!("/auth/login: {}", e)))?;

    self.client.store_tokens(data)?;
    let session = self.client.session();
    session.set(SessionKey::CurrentUser, &raw_user.to_string())?;
    session.set(SessionKey::UserId, &user.id.to_string())?;
    Ok(User::from(user))
  }

  /// Tell the backend, then drop local state whatever it answered.
  pub async fn logout(&self) -> Result<()> {
    if self.client.is_authenticated() {
      let opts = RequestOptions::new().quiet();
      if let Err(e) = self.client.request(Method::POST, "/auth/logout", opts).await {
        tracing::debug!(error = %e, "logout call failed, clearing local session anyway");
      }
    }
    self.client.clear_session()?;
    tracing::info!("signed out");
    Ok(())
  }

  /// Fetch the signed-in user from the backend and refresh the stored copy.
  pub async fn me(&self) -> Result<User> {
    let data: Value = self
      .client
      .get_with("/auth/me", RequestOptions::new().no_cache())
      .await?;
    // some deployments nest the user
    let raw_user = match data.get("user") {
      Some(user) => user.clone(),
      None => data,
    };
    let user: ApiUser = serde_json::from_value(raw_user.clone())
      .map_err(|e| ApiError::decode(format!("/auth/me: {}", e)))?;
    self
      .client
      .session()
      .set(SessionKey::CurrentUser, &raw_user.to_string())?;
    Ok(User::from(user))
  }

  /// The user stored at login, without a network call.
  pub fn current_user(&self) -> Result<Option<User>> {
    let Some(raw) = self.client.session().get(SessionKey::CurrentUser)? else {
      return Ok(None);
    };
    match serde_json::from_str::<ApiUser>(&raw) {
      Ok(user) => Ok(Some(User::from(user))),
      Err(e) => {
        tracing::warn!(error = %e, "stored user is unreadable, ignoring");
        Ok(None)
      }
    }
  }

  pub async fn forgot_password(&self, email: &str) -> Result<()> {
    let opts = RequestOptions::new()
      .body(json!({ "email": email }))
      .anonymous()
      .success_message("If that address is registered, a reset link is on its way.");
    self
      .client
      .request(Method::POST, "/auth/forgot-password", opts)
      .await?;
    Ok(())
  }
}
