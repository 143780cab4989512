// Package-management task endpoints
//
// `POST /mgmt/shared/iapp/package-management-tasks` starts a QUERY, INSTALL
// or UNINSTALL task and answers with its id; `GET .../{id}` reports status.
// Only FINISHED and FAILED are terminal -- every other status is polled
// again.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::ManagementClient;
use crate::error::Error;
use crate::poll::{PollStatus, RetryPolicy, poll};

/// Package-management task collection.
pub const PACKAGE_TASKS_PATH: &str = "/mgmt/shared/iapp/package-management-tasks";

/// Directory the upload endpoint writes into on the device.
pub const REMOTE_DOWNLOAD_DIR: &str = "/var/config/rest/downloads";

/// Which package-management operation a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum TaskKind {
    PackageQuery,
    PackageInstall,
    PackageUninstall,
}

/// Body of a package-management task request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageOperation {
    Query,
    Install {
        #[serde(rename = "packageFilePath")]
        package_file_path: String,
    },
    Uninstall {
        #[serde(rename = "packageName")]
        package_name: String,
    },
}

impl PackageOperation {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Query => TaskKind::PackageQuery,
            Self::Install { .. } => TaskKind::PackageInstall,
            Self::Uninstall { .. } => TaskKind::PackageUninstall,
        }
    }
}

/// Status reported by a package-management task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Created,
    Started,
    Pending,
    Running,
    Finished,
    Failed,
    /// Any status this client does not know; treated as still running.
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// One entry of a QUERY task's `queryResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPackage {
    /// Declared package name, e.g. `f5-appsvcs`.
    #[serde(default)]
    pub name: String,
    /// Full package name including version, e.g. `f5-appsvcs-3.20.0-3.noarch`.
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
}

/// A package-management task as reported by the device.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageTask {
    #[serde(default)]
    pub id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub query_response: Option<Vec<InstalledPackage>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Deserialize)]
struct TaskHandle {
    id: String,
}

impl ManagementClient {
    /// Start a package-management task and return its id.
    pub async fn start_package_task(&self, operation: &PackageOperation) -> Result<String, Error> {
        debug!(kind = %operation.kind(), "starting package task");
        let body = serde_json::to_value(operation).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        let resp = self.post(PACKAGE_TASKS_PATH, body).await?;
        let handle: TaskHandle = from_value(resp)?;
        Ok(handle.id)
    }

    /// Fetch the current state of a package-management task.
    pub async fn package_task(&self, task_id: &str) -> Result<PackageTask, Error> {
        let resp = self.get(&format!("{PACKAGE_TASKS_PATH}/{task_id}")).await?;
        from_value(resp)
    }

    /// Poll a package-management task until FINISHED (returned) or FAILED
    /// (`Error::TaskFailed`).
    pub async fn wait_for_package_task(
        &self,
        task_id: &str,
        policy: RetryPolicy,
        cancel: Option<&CancellationToken>,
    ) -> Result<PackageTask, Error> {
        poll(policy, cancel, |_| async move {
            let task = self.package_task(task_id).await?;
            match task.status {
                TaskStatus::Finished => Ok(PollStatus::Done(task)),
                TaskStatus::Failed => Err(Error::TaskFailed {
                    task_id: task_id.to_owned(),
                    message: task
                        .error_message
                        .unwrap_or_else(|| "no error message reported".into()),
                }),
                _ => Ok(PollStatus::Pending),
            }
        })
        .await
    }

    /// Start a package-management task and wait for it to finish.
    pub async fn run_package_task(
        &self,
        operation: &PackageOperation,
        policy: RetryPolicy,
        cancel: Option<&CancellationToken>,
    ) -> Result<PackageTask, Error> {
        let task_id = self.start_package_task(operation).await?;
        let task = self.wait_for_package_task(&task_id, policy, cancel).await?;
        info!(kind = %operation.kind(), %task_id, "package task finished");
        Ok(task)
    }
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}
