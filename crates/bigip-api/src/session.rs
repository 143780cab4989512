// Session manager
//
// Owns the single auth token for one device connection. The token slot
// sits behind an async mutex that is held across the login call, so
// concurrent callers that find no valid token wait for one shared login
// instead of each issuing their own.

use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::auth::{Credentials, LOGIN_PATH, LoginResponse, Token};
use crate::error::Error;

/// Token lifecycle for one [`Credentials`] set against one device.
pub struct SessionManager {
    http: reqwest::Client,
    login_url: Url,
    credentials: Credentials,
    token: Mutex<Option<Token>>,
}

impl SessionManager {
    pub fn new(http: reqwest::Client, base_url: &Url, credentials: Credentials) -> Result<Self, Error> {
        let login_url = base_url.join(LOGIN_PATH)?;
        Ok(Self {
            http,
            login_url,
            credentials,
            token: Mutex::new(None),
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Return a valid token, logging in first if none is held or the
    /// held one has lapsed.
    pub async fn ensure_token(&self) -> Result<SecretString, Error> {
        let mut slot = self.token.lock().await;

        if let Some(token) = slot.as_ref() {
            if !token.is_expired() {
                return Ok(token.value().clone());
            }
            info!("auth token expired, re-authenticating");
        }

        let token = self.login().await?;
        let value = token.value().clone();
        *slot = Some(token);
        Ok(value)
    }

    /// Discard the current token (if any) and log in again.
    pub async fn refresh(&self) -> Result<(), Error> {
        let mut slot = self.token.lock().await;
        *slot = None;
        *slot = Some(self.login().await?);
        Ok(())
    }

    /// Discard the current token. The next request re-authenticates.
    pub async fn clear_token(&self) {
        if self.token.lock().await.take().is_some() {
            debug!("auth token cleared");
        }
    }

    /// Whether a non-expired token is currently held.
    pub async fn has_token(&self) -> bool {
        self.token
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_expired())
    }

    /// Snapshot of the held token, expired or not.
    pub async fn current_token(&self) -> Option<Token> {
        self.token.lock().await.clone()
    }

    async fn login(&self) -> Result<Token, Error> {
        debug!(
            url = %self.login_url,
            user = %self.credentials.username,
            provider = %self.credentials.provider,
            "requesting auth token"
        );

        let resp = self
            .http
            .post(self.login_url.clone())
            .json(&self.credentials.login_body())
            .send()
            .await
            .map_err(|e| Error::Authentication {
                message: format!("login request failed: {e}"),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {body}"),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        let parsed: LoginResponse =
            serde_json::from_str(&body).map_err(|e| Error::Authentication {
                message: format!("unreadable login response: {e}"),
            })?;

        let payload = parsed.token.ok_or_else(|| Error::Authentication {
            message: "login response did not contain a token".into(),
        })?;
        let value = payload
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Authentication {
                message: "login response did not contain a token".into(),
            })?;

        let token = Token::new(SecretString::from(value), payload.timeout);
        debug!(timeout_secs = payload.timeout, "auth token acquired");
        Ok(token)
    }
}
