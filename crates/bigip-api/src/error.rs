use thiserror::Error;

/// Top-level error type for the `bigip-api` crate.
///
/// Covers every failure mode of the management API surface:
/// authentication, transport, HTTP status, and remote task state.
/// `bigip-core` maps these into the SDK's user-facing taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed or the login response carried no token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── HTTP ────────────────────────────────────────────────────────
    /// The device answered with a status above 300 on a simple-mode request.
    #[error("HTTP request failed: {status} {body}")]
    HttpStatus { status: u16, body: String },

    // ── Remote tasks ────────────────────────────────────────────────
    /// A server-side task reached a failed terminal state.
    #[error("Task {task_id} failed: {message}")]
    TaskFailed { task_id: String, message: String },

    /// Polling used its whole attempt budget without a terminal state.
    #[error("Task did not complete after {attempts} attempts")]
    PollExhausted { attempts: u32 },

    /// Polling was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Local file error while staging an upload or download.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}
