//! Shared configuration for BIG-IP tooling.
//!
//! TOML device profiles, credential resolution (env + keyring + plaintext),
//! translation to `bigip_core::DeviceConfig`, and the tracing subscriber
//! bootstrap honoring `F5_SDK_LOG_LEVEL`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use bigip_core::{DeviceConfig, RetryPolicy, TlsVerification};

/// Environment variable selecting the SDK log filter.
pub const LOG_LEVEL_ENV: &str = "F5_SDK_LOG_LEVEL";

const KEYRING_SERVICE: &str = "bigip";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// Values applied when a profile leaves a field unset.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_provider")]
    pub provider: String,

    /// Accept self-signed device certificates.
    #[serde(default = "default_insecure")]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            port: default_port(),
            provider: default_provider(),
            insecure: default_insecure(),
            timeout: default_timeout(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_port() -> u16 {
    bigip_core::DEFAULT_PORT
}
fn default_provider() -> String {
    "local".into()
}
fn default_insecure() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}
fn default_retry_count() -> u32 {
    bigip_core::DEFAULT_RETRY_COUNT
}
fn default_retry_delay_ms() -> u64 {
    u64::try_from(bigip_core::DEFAULT_RETRY_DELAY.as_millis()).unwrap_or(1000)
}

/// A named device profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Management address (hostname, IPv4, or IPv6 literal).
    pub host: String,

    pub port: Option<u16>,

    /// Username; falls back to `BIGIP_USERNAME`.
    pub username: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Login provider, e.g. "local" or "tmos".
    pub provider: Option<String>,

    /// Override the insecure TLS default.
    pub insecure: Option<bool>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    pub timeout: Option<u64>,

    pub retry_count: Option<u32>,

    pub retry_delay_ms: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "bigip-rs", "bigip").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("bigip");
    p
}

// ── Config loading / saving ─────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` (missing file is fine) merged with `BIGIP_*` env vars.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("BIGIP_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve username and password for a profile.
///
/// Password order: `password_env` → `BIGIP_PASSWORD` → keyring entry
/// `bigip/<profile>/password` → plaintext in config.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<(String, SecretString), ConfigError> {
    resolve_credentials_with(profile, profile_name, &|name| std::env::var(name).ok())
}

fn resolve_credentials_with(
    profile: &Profile,
    profile_name: &str,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<(String, SecretString), ConfigError> {
    let no_credentials = || ConfigError::NoCredentials {
        profile: profile_name.into(),
    };

    let username = profile
        .username
        .clone()
        .or_else(|| env("BIGIP_USERNAME"))
        .ok_or_else(no_credentials)?;

    // 1. Profile's password_env
    if let Some(ref env_name) = profile.password_env {
        if let Some(pw) = env(env_name) {
            debug!(profile = profile_name, source = %env_name, "password read from environment");
            return Ok((username, SecretString::from(pw)));
        }
    }

    // 2. Global env var
    if let Some(pw) = env("BIGIP_PASSWORD") {
        debug!(profile = profile_name, source = "BIGIP_PASSWORD", "password read from environment");
        return Ok((username, SecretString::from(pw)));
    }

    // 3. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            debug!(profile = profile_name, source = "keyring", "password read from keyring");
            return Ok((username, SecretString::from(pw)));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        debug!(profile = profile_name, source = "config", "password read from config file");
        return Ok((username, SecretString::from(pw.clone())));
    }

    Err(no_credentials())
}

/// Build a `DeviceConfig` from a profile, filling gaps from `defaults`.
pub fn profile_to_device_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<DeviceConfig, ConfigError> {
    let (username, password) = resolve_credentials(profile, profile_name)?;
    build_device_config(profile, defaults, username, password)
}

fn build_device_config(
    profile: &Profile,
    defaults: &Defaults,
    username: String,
    password: SecretString,
) -> Result<DeviceConfig, ConfigError> {
    let host = profile.host.trim();
    if host.is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: "must not be empty".into(),
        });
    }

    let tls = if profile.insecure == Some(true) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else {
        TlsVerification::SystemDefaults
    };

    let retry = RetryPolicy::new(
        profile.retry_count.unwrap_or(defaults.retry_count),
        Duration::from_millis(profile.retry_delay_ms.unwrap_or(defaults.retry_delay_ms)),
    );

    let mut config = DeviceConfig::new(host, username, password)
        .with_port(profile.port.unwrap_or(defaults.port))
        .with_provider(
            profile
                .provider
                .clone()
                .unwrap_or_else(|| defaults.provider.clone()),
        )
        .with_retry(retry);
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    Ok(config)
}

// ── Logging ─────────────────────────────────────────────────────────

/// Install a fmt subscriber. Filter source: `F5_SDK_LOG_LEVEL`, then
/// `RUST_LOG`, then `default_level`.
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing(default_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(
            std::env::var(LOG_LEVEL_ENV).ok().as_deref(),
            default_level,
        ))
        .with_target(false)
        .try_init()
        .is_ok()
}

fn log_filter(sdk_level: Option<&str>, default_level: &str) -> EnvFilter {
    sdk_level
        .and_then(|level| EnvFilter::try_new(level.to_ascii_lowercase()).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}
