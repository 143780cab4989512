//! Extension lifecycle management for F5 BIG-IP devices.
//!
//! Sits on top of `bigip-api` and adds the domain layer:
//!
//! - **[`Device`]** — Entry point for one BIG-IP. Owns the authenticated
//!   [`ManagementClient`](bigip_api::ManagementClient), the shared
//!   [`MetadataCatalog`], and a root cancellation token. Hands out an
//!   [`ExtensionClient`] per component.
//!
//! - **[`MetadataCatalog`]** — Known versions, package names, download URLs,
//!   and service endpoints for each component (`as3`, `do`, `ts`, `cf`).
//!   Bundled with the crate, refreshable from the published feed.
//!
//! - **[`PackageClient`]** — Query, install (download, verify, chunked
//!   upload, install task), and uninstall the extension package.
//!
//! - **[`ServiceClient`]** — Declaration operations. Availability of
//!   `delete`/`reset`/`trigger`/`show_inspect`/`show_trigger` is read from
//!   the component's metadata endpoints.

pub mod config;
pub mod device;
pub mod error;
pub mod extension;
pub mod metadata;
pub mod package;
pub mod service;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DeviceConfig, TlsVerification};
pub use device::Device;
pub use error::CoreError;
pub use extension::ExtensionClient;
pub use metadata::{
    CatalogDocument, Component, ComponentMetadata, Endpoint, EndpointKind, METADATA_FEED_URL,
    MetadataCatalog,
};
pub use package::{InstallOptions, InstallStatus, PackageClient, PackageOutcome, parse_version};
pub use service::{ServiceClient, ServiceOperation};

pub use bigip_api::{DEFAULT_PORT, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY, RetryPolicy};
