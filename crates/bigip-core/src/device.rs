// ── Device handle ──
//
// Entry point for consumers. Owns the authenticated management client, a
// download client for release hosts, the shared metadata catalog, and a
// root cancellation token; hands out
// `ExtensionClient`s per component. Cheaply cloneable via `Arc<DeviceInner>`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug};
use url::Url;

use bigip_api::{ManagementClient, RetryPolicy, TransportConfig};

use crate::config::DeviceConfig;
use crate::error::CoreError;
use crate::extension::ExtensionClient;
use crate::metadata::{METADATA_FEED_URL, MetadataCatalog};

/// One managed BIG-IP.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    mgmt: Arc<ManagementClient>,
    /// Feed and artifact fetches. Verifies TLS, no total timeout.
    downloads: reqwest::Client,
    catalog: MetadataCatalog,
    retry: RetryPolicy,
    /// Parent of every poll's cancellation token.
    cancel: CancellationToken,
}

impl Device {
    /// Build a device handle from runtime config, using the bundled catalog.
    ///
    /// No network traffic happens here; the first request logs in.
    pub fn new(config: &DeviceConfig) -> Result<Self, CoreError> {
        let transport = config.transport();
        let mgmt = ManagementClient::new(
            &config.host,
            config.port,
            config.credentials(),
            &transport,
        )?;
        let downloads = transport.build_download_client()?;
        debug!(host = %config.host, port = config.port, "device handle created");
        Ok(Self::from_parts(
            Arc::new(mgmt),
            downloads,
            MetadataCatalog::bundled()?,
            config.retry,
        ))
    }

    /// Assemble a handle from pre-built parts.
    ///
    /// `downloads` fetches the metadata feed and package artifacts; build it
    /// with [`TransportConfig::build_download_client`].
    pub fn from_parts(
        mgmt: Arc<ManagementClient>,
        downloads: reqwest::Client,
        catalog: MetadataCatalog,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                mgmt,
                downloads,
                catalog,
                retry,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn management(&self) -> &Arc<ManagementClient> {
        &self.inner.mgmt
    }

    pub fn catalog(&self) -> &MetadataCatalog {
        &self.inner.catalog
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    /// Client for `component` at `version` (latest when `None`).
    pub fn extension(
        &self,
        component: &str,
        version: Option<&str>,
    ) -> Result<ExtensionClient, CoreError> {
        ExtensionClient::new(
            Arc::clone(&self.inner.mgmt),
            self.inner.downloads.clone(),
            &self.inner.catalog,
            component,
            version,
            self.inner.retry,
            Some(self.inner.cancel.child_token()),
        )
    }

    /// Log in now rather than on the first request.
    pub async fn login(&self) -> Result<(), CoreError> {
        Ok(self.inner.mgmt.login().await?)
    }

    pub async fn clear_token(&self) {
        self.inner.mgmt.clear_token().await;
    }

    /// Refresh the catalog from the published feed. See
    /// [`MetadataCatalog::refresh_latest`].
    pub async fn refresh_metadata(&self) -> Result<bool, CoreError> {
        let url = Url::parse(METADATA_FEED_URL).map_err(|e| CoreError::Config {
            message: format!("invalid metadata feed URL: {e}"),
        })?;
        Ok(self.refresh_metadata_from(&url).await)
    }

    /// Refresh the catalog from an explicit feed URL.
    pub async fn refresh_metadata_from(&self, feed_url: &Url) -> bool {
        let span = self.inner.mgmt.span().clone();
        self.inner
            .catalog
            .refresh_latest(&self.inner.downloads, feed_url)
            .instrument(span)
            .await
    }

    /// Abort every in-flight task poll started from this handle.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }
}
