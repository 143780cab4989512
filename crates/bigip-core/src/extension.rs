// Per-component facade pairing a package client and a service client that
// share one resolved metadata snapshot.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use bigip_api::{ManagementClient, RetryPolicy};

use crate::error::CoreError;
use crate::metadata::{ComponentMetadata, MetadataCatalog};
use crate::package::PackageClient;
use crate::service::ServiceClient;

/// Package and service access for one extension component.
#[derive(Clone)]
pub struct ExtensionClient {
    metadata: ComponentMetadata,
    package: PackageClient,
    service: ServiceClient,
}

impl ExtensionClient {
    /// Resolve `component` (at `version`, or the latest) and build both clients.
    pub fn new(
        mgmt: Arc<ManagementClient>,
        downloads: reqwest::Client,
        catalog: &MetadataCatalog,
        component: &str,
        version: Option<&str>,
        retry: RetryPolicy,
        cancel: Option<CancellationToken>,
    ) -> Result<Self, CoreError> {
        let metadata = catalog.component(component, version)?;
        Ok(Self {
            package: PackageClient::new(
                Arc::clone(&mgmt),
                downloads,
                metadata.clone(),
                retry,
                cancel.clone(),
            ),
            service: ServiceClient::new(mgmt, metadata.clone(), retry, cancel),
            metadata,
        })
    }

    pub fn component(&self) -> &str {
        self.metadata.component()
    }

    pub fn version(&self) -> &str {
        self.metadata.version()
    }

    pub fn metadata(&self) -> &ComponentMetadata {
        &self.metadata
    }

    pub fn package(&self) -> &PackageClient {
        &self.package
    }

    pub fn service(&self) -> &ServiceClient {
        &self.service
    }
}
