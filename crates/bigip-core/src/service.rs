// ── Service operation client ──
//
// Declaration-level operations against an installed extension. Which
// operations a component offers is read from its metadata endpoints at
// call time; there is no per-component client type.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use strum::{Display, EnumIter, IntoEnumIterator};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, warn};
use url::Url;

use bigip_api::{ApiRequest, ManagementClient, PollStatus, RetryPolicy, poll};

use crate::error::CoreError;
use crate::metadata::{ComponentMetadata, EndpointKind};

/// Every operation a service client can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ServiceOperation {
    IsAvailable,
    Show,
    ShowInfo,
    Create,
    Delete,
    Reset,
    Trigger,
    ShowInspect,
    ShowTrigger,
}

impl ServiceOperation {
    /// Endpoint and HTTP method the operation needs.
    pub fn requirement(self) -> (EndpointKind, Method) {
        match self {
            Self::IsAvailable | Self::Show => (EndpointKind::Configure, Method::GET),
            Self::ShowInfo => (EndpointKind::Info, Method::GET),
            Self::Create => (EndpointKind::Configure, Method::POST),
            Self::Delete => (EndpointKind::Configure, Method::DELETE),
            Self::Reset => (EndpointKind::Reset, Method::POST),
            Self::Trigger => (EndpointKind::Trigger, Method::POST),
            Self::ShowInspect => (EndpointKind::Inspect, Method::GET),
            Self::ShowTrigger => (EndpointKind::Trigger, Method::GET),
        }
    }
}

/// Service operations for one component.
#[derive(Clone)]
pub struct ServiceClient {
    mgmt: Arc<ManagementClient>,
    metadata: ComponentMetadata,
    retry: RetryPolicy,
    cancel: Option<CancellationToken>,
}

impl ServiceClient {
    pub(crate) fn new(
        mgmt: Arc<ManagementClient>,
        metadata: ComponentMetadata,
        retry: RetryPolicy,
        cancel: Option<CancellationToken>,
    ) -> Self {
        Self {
            mgmt,
            metadata,
            retry,
            cancel,
        }
    }

    pub fn metadata(&self) -> &ComponentMetadata {
        &self.metadata
    }

    pub fn supports(&self, operation: ServiceOperation) -> bool {
        let (kind, method) = operation.requirement();
        self.metadata.supports(kind, method.as_str())
    }

    /// Operations this component's metadata allows.
    pub fn capabilities(&self) -> Vec<ServiceOperation> {
        ServiceOperation::iter().filter(|op| self.supports(*op)).collect()
    }

    /// Available iff the configure endpoint answers with a 2xx status.
    pub async fn is_available(&self) -> Result<bool, CoreError> {
        let uri = self.endpoint_for(ServiceOperation::IsAvailable)?;
        let resp = self.mgmt.request_raw(uri, ApiRequest::get()).await?;
        Ok(resp.status / 100 == 2)
    }

    pub async fn show(&self) -> Result<Value, CoreError> {
        let uri = self.endpoint_for(ServiceOperation::Show)?;
        Ok(self.mgmt.get(uri).await?)
    }

    pub async fn show_info(&self) -> Result<Value, CoreError> {
        let uri = self.endpoint_for(ServiceOperation::ShowInfo)?;
        Ok(self.mgmt.get(uri).await?)
    }

    /// POST a declaration.
    ///
    /// A 202 response carries a `selfLink` to an async task; the task URI
    /// is polled until it answers 200 and that final body is returned.
    /// Any other status returns the POST body as-is.
    pub async fn create(&self, config: Option<Value>) -> Result<Value, CoreError> {
        let span = self.mgmt.span().clone();
        self.create_inner(config).instrument(span).await
    }

    async fn create_inner(&self, config: Option<Value>) -> Result<Value, CoreError> {
        let uri = self.endpoint_for(ServiceOperation::Create)?;
        let resp = self
            .mgmt
            .request_raw(uri, ApiRequest::post().json(config))
            .await?;

        if resp.status != 202 {
            if !resp.is_success() {
                warn!(status = resp.status, uri, "declaration was not accepted");
            }
            return Ok(resp.body);
        }

        let self_link = resp
            .body
            .get("selfLink")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Internal("202 response did not carry a selfLink".into()))?;
        let task_uri = task_path(self_link);
        debug!(%task_uri, "declaration accepted, waiting for task");
        self.wait_for_task(&task_uri).await
    }

    pub async fn delete(&self) -> Result<Value, CoreError> {
        let uri = self.endpoint_for(ServiceOperation::Delete)?;
        Ok(self.mgmt.delete(uri).await?)
    }

    pub async fn reset(&self, config: Option<Value>) -> Result<Value, CoreError> {
        let uri = self.endpoint_for(ServiceOperation::Reset)?;
        Ok(self.mgmt.post(uri, config).await?)
    }

    pub async fn trigger(&self, config: Option<Value>) -> Result<Value, CoreError> {
        let uri = self.endpoint_for(ServiceOperation::Trigger)?;
        Ok(self.mgmt.post(uri, config).await?)
    }

    pub async fn show_inspect(&self) -> Result<Value, CoreError> {
        let uri = self.endpoint_for(ServiceOperation::ShowInspect)?;
        Ok(self.mgmt.get(uri).await?)
    }

    pub async fn show_trigger(&self) -> Result<Value, CoreError> {
        let uri = self.endpoint_for(ServiceOperation::ShowTrigger)?;
        Ok(self.mgmt.get(uri).await?)
    }

    fn endpoint_for(&self, operation: ServiceOperation) -> Result<&str, CoreError> {
        let (kind, method) = operation.requirement();
        self.metadata
            .endpoint(kind)
            .filter(|e| e.allows(method.as_str()))
            .map(|e| e.uri.as_str())
            .ok_or_else(|| CoreError::UnsupportedOperation {
                component: self.metadata.component().to_owned(),
                operation: operation.to_string(),
            })
    }

    // 200 is done, 202 is still running, anything else aborts.
    async fn wait_for_task(&self, task_uri: &str) -> Result<Value, CoreError> {
        let result = poll(self.retry, self.cancel.as_ref(), |_| async move {
            let resp = self.mgmt.request_raw(task_uri, ApiRequest::get()).await?;
            match resp.status {
                200 => Ok(PollStatus::Done(resp.body)),
                202 => Ok(PollStatus::Pending),
                status => Err(bigip_api::Error::TaskFailed {
                    task_id: task_uri.to_owned(),
                    message: format!("task state has not passed: {status}"),
                }),
            }
        })
        .await?;
        Ok(result)
    }
}

/// Reduce a task `selfLink` to a path relative to the device.
///
/// The device reports links against `https://localhost`; only the path and
/// query are kept. Values that are not absolute URLs pass through.
fn task_path(self_link: &str) -> String {
    match Url::parse(self_link) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_owned(),
        },
        Err(_) => self_link.to_owned(),
    }
}
