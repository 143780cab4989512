// Management API request dispatcher
//
// Wraps `reqwest::Client` with token injection and the two response
// modes used across the SDK: *raw* hands back status + body for callers
// that branch on the status code, *simple* hands back the body and turns
// any status above 300 into `Error::HttpStatus`. Endpoint groups
// (package tasks, uploads) are inherent methods in sibling modules.

use std::net::Ipv6Addr;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{Instrument, Span, debug, trace};
use url::Url;

use crate::auth::{AUTH_TOKEN_HEADER, Credentials, Token};
use crate::error::Error;
use crate::session::SessionManager;
use crate::transport::TransportConfig;

/// Default management port.
pub const DEFAULT_PORT: u16 = 443;

/// Body of an outbound request.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Bytes(Bytes),
}

/// Method, extra headers, and body for one management call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    headers: HeaderMap,
    body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Attach a JSON body. `None` leaves the body empty.
    pub fn json(mut self, body: impl Into<Option<Value>>) -> Self {
        self.body = body.into().map_or(RequestBody::Empty, RequestBody::Json);
        self
    }

    /// Attach a raw byte body.
    pub fn bytes(mut self, body: Bytes) -> Self {
        self.body = RequestBody::Bytes(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

/// Status code and parsed body of a raw-mode response.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Authenticated client for one BIG-IP management endpoint.
///
/// Every call goes through [`SessionManager::ensure_token`] first, so the
/// caller never handles tokens directly. The client carries a tracing span
/// tagged with the device address; all request logging happens inside it.
pub struct ManagementClient {
    http: reqwest::Client,
    base_url: Url,
    session: SessionManager,
    span: Span,
}

impl ManagementClient {
    /// Connect to `https://{host}:{port}` using the given transport settings.
    pub fn new(
        host: &str,
        port: u16,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Self::with_base_url(device_base_url(host, port)?, credentials, transport)
    }

    /// Connect to an explicit base URL (any scheme).
    pub fn with_base_url(
        base_url: Url,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(http, base_url, credentials)
    }

    /// Create a management client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        credentials: Credentials,
    ) -> Result<Self, Error> {
        let session = SessionManager::new(http.clone(), &base_url, credentials)?;
        let span = tracing::info_span!(
            "bigip",
            host = base_url.host_str().unwrap_or_default(),
            port = base_url.port_or_known_default(),
        );
        Ok(Self {
            http,
            base_url,
            session,
            span,
        })
    }

    /// The underlying HTTP client (also used for artifact downloads).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The device base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Span that scopes this client's logging.
    pub fn span(&self) -> &Span {
        &self.span
    }

    // ── Session passthroughs ─────────────────────────────────────────

    /// Force a fresh login, replacing any held token.
    pub async fn login(&self) -> Result<(), Error> {
        self.session.refresh().instrument(self.span.clone()).await
    }

    /// Clear the auth token; used for logout and to force re-authentication.
    pub async fn clear_token(&self) {
        self.session.clear_token().await;
    }

    /// The currently held token, if any.
    pub async fn token(&self) -> Option<Token> {
        self.session.current_token().await
    }

    /// Remaining lifetime of the held token; `None` when no valid token is held.
    pub async fn token_remaining(&self) -> Option<std::time::Duration> {
        self.token()
            .await
            .filter(|t| !t.is_expired())
            .map(|t| t.remaining())
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Simple mode: return the body, failing with `HttpStatus` when the
    /// status is above 300.
    pub async fn request(&self, path: &str, req: ApiRequest) -> Result<Value, Error> {
        let raw = self.request_raw(path, req).await?;
        if raw.status > 300 {
            return Err(Error::HttpStatus {
                status: raw.status,
                body: stringify(&raw.body),
            });
        }
        Ok(raw.body)
    }

    /// Raw mode: return status and body regardless of the status code.
    pub async fn request_raw(&self, path: &str, req: ApiRequest) -> Result<RawResponse, Error> {
        self.dispatch(path, req).instrument(self.span.clone()).await
    }

    pub async fn get(&self, path: &str) -> Result<Value, Error> {
        self.request(path, ApiRequest::get()).await
    }

    pub async fn post(&self, path: &str, body: impl Into<Option<Value>>) -> Result<Value, Error> {
        self.request(path, ApiRequest::post().json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, Error> {
        self.request(path, ApiRequest::delete()).await
    }

    async fn dispatch(&self, path: &str, req: ApiRequest) -> Result<RawResponse, Error> {
        let token = self.session.ensure_token().await?;
        let url = self.base_url.join(path)?;

        debug!(method = %req.method, %url, "dispatching request");

        let mut token_value =
            HeaderValue::from_str(token.expose_secret()).map_err(|e| Error::Authentication {
                message: format!("token is not a valid header value: {e}"),
            })?;
        token_value.set_sensitive(true);

        let mut builder = self
            .http
            .request(req.method, url)
            .headers(req.headers)
            .header(AUTH_TOKEN_HEADER, token_value);
        builder = match req.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Bytes(bytes) => builder.body(bytes),
        };

        let resp = builder.send().await?;
        let status = resp.status();

        // The device revoked the token early; make the next call log in again.
        if status == StatusCode::UNAUTHORIZED {
            self.session.clear_token().await;
        }

        let text = resp.text().await?;
        trace!(status = status.as_u16(), len = text.len(), "response received");

        Ok(RawResponse {
            status: status.as_u16(),
            body: parse_body(text),
        })
    }
}

/// Build `https://{host}:{port}`, bracketing IPv6 literals.
pub fn device_base_url(host: &str, port: u16) -> Result<Url, Error> {
    let host = host.trim();
    let raw = if host.parse::<Ipv6Addr>().is_ok() {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    };
    Ok(Url::parse(&raw)?)
}

/// JSON if the body parses, a JSON string otherwise, `null` when empty.
pub(crate) fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(_) => Value::String(text),
    }
}

pub(crate) fn stringify(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_url_for_hostname() {
        let url = device_base_url("192.0.2.1", 443).unwrap();
        assert_eq!(url.as_str(), "https://192.0.2.1/");
        let url = device_base_url("bigip.example.com", 8443).unwrap();
        assert_eq!(url.as_str(), "https://bigip.example.com:8443/");
    }

    #[test]
    fn base_url_brackets_ipv6() {
        let url = device_base_url("2001:db8::1", 8443).unwrap();
        assert_eq!(url.as_str(), "https://[2001:db8::1]:8443/");
        assert_eq!(url.port(), Some(8443));
    }

    #[test]
    fn body_parsing_modes() {
        assert_eq!(parse_body(String::new()), Value::Null);
        assert_eq!(parse_body(r#"{"a":1}"#.into()), json!({ "a": 1 }));
        assert_eq!(parse_body("raw".into()), json!("raw"));
    }

    #[test]
    fn stringify_keeps_plain_text_unquoted() {
        assert_eq!(stringify(&json!("not found")), "not found");
        assert_eq!(stringify(&json!({ "code": 404 })), r#"{"code":404}"#);
    }

    #[test]
    fn empty_json_body_is_dropped() {
        let req = ApiRequest::post().json(Option::<Value>::None);
        assert!(matches!(req.body, RequestBody::Empty));
        assert_eq!(req.method(), &Method::POST);
    }
}
