// Device credentials and auth tokens
//
// BIG-IP token auth: POST the credentials to `/mgmt/shared/authn/login`,
// receive `{ token: { token, timeout } }`, then send the value in the
// `X-F5-Auth-Token` header on every subsequent request.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Login endpoint path.
pub const LOGIN_PATH: &str = "/mgmt/shared/authn/login";

/// Header carrying the session token.
pub const AUTH_TOKEN_HEADER: &str = "X-F5-Auth-Token";

/// Login provider used when none is configured.
pub const DEFAULT_LOGIN_PROVIDER: &str = "local";

/// Token lifetime assumed when the device omits `timeout` (BIG-IP default).
const DEFAULT_TOKEN_TIMEOUT_SECS: u64 = 1200;

/// Credentials for a single device connection.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
    /// Auth provider name sent as `loginProviderName` (e.g. `local`, `tmos`).
    pub provider: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            provider: DEFAULT_LOGIN_PROVIDER.into(),
        }
    }

    /// Override the login provider.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub(crate) fn login_body(&self) -> LoginRequest<'_> {
        LoginRequest {
            username: &self.username,
            password: self.password.expose_secret(),
            login_provider_name: &self.provider,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    login_provider_name: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub token: Option<TokenPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenPayload {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_token_timeout")]
    pub timeout: u64,
}

fn default_token_timeout() -> u64 {
    DEFAULT_TOKEN_TIMEOUT_SECS
}

/// A live auth token and its local expiry deadline.
///
/// Expiry is checked lazily on every request. The deadline counts
/// 999 ms per reported second so the token lapses locally slightly
/// before the device drops it.
#[derive(Clone)]
pub struct Token {
    value: SecretString,
    timeout: Duration,
    expires_at: Instant,
}

impl Token {
    pub fn new(value: SecretString, timeout_secs: u64) -> Self {
        let lifetime = Duration::from_millis(timeout_secs.saturating_mul(999));
        Self {
            value,
            timeout: Duration::from_secs(timeout_secs),
            expires_at: Instant::now() + lifetime,
        }
    }

    pub fn value(&self) -> &SecretString {
        &self.value
    }

    /// Lifetime reported by the device at login.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left before the token lapses locally.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("remaining", &self.remaining())
            .finish()
    }
}
