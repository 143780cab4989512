// bigip-api: Async Rust client for the F5 BIG-IP iControl REST management API

pub mod auth;
pub mod client;
pub mod download;
pub mod error;
pub mod package;
pub mod poll;
pub mod session;
pub mod transport;
pub mod upload;

pub use auth::{Credentials, Token};
pub use client::{ApiRequest, DEFAULT_PORT, ManagementClient, RawResponse, RequestBody};
pub use download::download_to_file;
pub use error::Error;
pub use package::{
    InstalledPackage, PackageOperation, PackageTask, REMOTE_DOWNLOAD_DIR, TaskKind, TaskStatus,
};
pub use poll::{DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY, PollStatus, RetryPolicy, poll};
pub use session::SessionManager;
pub use transport::{TlsMode, TransportConfig};
pub use upload::{ChunkRange, UPLOAD_CHUNK_SIZE, chunk_ranges};
