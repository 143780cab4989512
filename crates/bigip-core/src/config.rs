// ── Runtime connection configuration ──
//
// These types describe *how* to reach one BIG-IP. They carry credential
// data and connection tuning, but never touch disk. Callers (or
// `bigip-config`) construct a `DeviceConfig` and hand it in.

use std::time::Duration;

use secrecy::SecretString;

use bigip_api::RetryPolicy;
use bigip_api::auth::DEFAULT_LOGIN_PROVIDER;
use bigip_api::transport::{TlsMode, TransportConfig};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification. Default: devices ship with self-signed certs.
    #[default]
    DangerAcceptInvalid,
}

/// Configuration for connecting to a single device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Management address: hostname, IPv4, or bare IPv6 literal.
    pub host: String,
    /// Management port (443 on most platforms, 8443 on single-NIC VEs).
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Login provider name sent with the credentials.
    pub provider: String,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Budget for task polling.
    pub retry: RetryPolicy,
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            host: host.into(),
            port: bigip_api::DEFAULT_PORT,
            username: username.into(),
            password,
            provider: DEFAULT_LOGIN_PROVIDER.into(),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }

    pub(crate) fn credentials(&self) -> bigip_api::Credentials {
        bigip_api::Credentials::new(self.username.clone(), self.password.clone())
            .with_provider(self.provider.clone())
    }
}
