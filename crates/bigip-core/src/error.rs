// ── Core error types ──
//
// User-facing errors from bigip-core. The `From<bigip_api::Error>` impl
// folds transport-layer failures into the SDK taxonomy: authentication,
// HTTP status, task failure, exhausted polling, plus the domain errors
// raised by the package installer and service client.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to device at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Request errors ───────────────────────────────────────────────
    #[error("HTTP request failed: {status} {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Task {task_id} failed: {message}")]
    TaskFailed { task_id: String, message: String },

    #[error("Gave up waiting for task after {attempts} attempts")]
    TimeoutExhausted { attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    // ── Package errors ───────────────────────────────────────────────
    #[error("Downloaded file does not match the provided hash (expected {expected}, got {actual})")]
    HashMismatch { expected: String, actual: String },

    #[error("Package name '{name}' matched {matches} installed packages")]
    AmbiguousPackage { name: String, matches: usize },

    // ── Capability / metadata errors ─────────────────────────────────
    #[error("Component '{component}' does not support {operation}")]
    UnsupportedOperation { component: String, operation: String },

    #[error("Unknown component: {component}")]
    UnknownComponent { component: String },

    #[error("Unknown version {version} for component {component}")]
    UnknownVersion { component: String, version: String },

    #[error("Metadata error: {message}")]
    Metadata { message: String },

    // ── Local errors ─────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<bigip_api::Error> for CoreError {
    fn from(err: bigip_api::Error) -> Self {
        match err {
            bigip_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            bigip_api::Error::HttpStatus { status, body } => CoreError::HttpStatus { status, body },
            bigip_api::Error::TaskFailed { task_id, message } => {
                CoreError::TaskFailed { task_id, message }
            }
            bigip_api::Error::PollExhausted { attempts } => CoreError::TimeoutExhausted { attempts },
            bigip_api::Error::Cancelled => CoreError::Cancelled,
            bigip_api::Error::Transport(ref e) => {
                if let Some(status) = e.status() {
                    CoreError::HttpStatus {
                        status: status.as_u16(),
                        body: e.to_string(),
                    }
                } else {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                }
            }
            bigip_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            bigip_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            bigip_api::Error::Io(e) => CoreError::Io(e),
            bigip_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_map_onto_sdk_taxonomy() {
        let err: CoreError = bigip_api::Error::PollExhausted { attempts: 60 }.into();
        assert!(matches!(err, CoreError::TimeoutExhausted { attempts: 60 }));

        let err: CoreError = bigip_api::Error::HttpStatus {
            status: 422,
            body: "invalid declaration".into(),
        }
        .into();
        assert!(matches!(err, CoreError::HttpStatus { status: 422, .. }));

        let err: CoreError = bigip_api::Error::Authentication {
            message: "bad password".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Authentication failed: bad password");
    }
}
