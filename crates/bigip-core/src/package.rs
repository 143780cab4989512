// ── Package installer ──
//
// Install, uninstall, and query one extension package on the device.
// Installed state is derived fresh from a package-management QUERY task
// on every call; nothing is cached between calls.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use bigip_api::{
    InstalledPackage, ManagementClient, PackageOperation, REMOTE_DOWNLOAD_DIR, RetryPolicy,
    download_to_file,
};

use crate::error::CoreError;
use crate::metadata::ComponentMetadata;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+\.[0-9]+\.[0-9]+").expect("version pattern is valid"));

/// Extract the `major.minor.patch` version from a remote package name.
pub fn parse_version(package_name: &str) -> Option<&str> {
    VERSION_PATTERN.find(package_name).map(|m| m.as_str())
}

/// Result of [`PackageClient::is_installed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStatus {
    pub installed: bool,
    /// Version parsed from the installed package; empty when not installed.
    pub installed_version: String,
    /// Latest version known to the metadata catalog.
    pub latest_version: String,
}

/// Component and version reported by install and uninstall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutcome {
    pub component: String,
    pub version: String,
}

/// Options for [`PackageClient::install`].
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Expected hex SHA-256 of the downloaded package.
    pub hash: Option<String>,
    /// Remove the local download once it has been uploaded.
    pub delete_file: bool,
    /// Where the package is downloaded; the OS temp dir when `None`.
    pub download_dir: Option<PathBuf>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            hash: None,
            delete_file: true,
            download_dir: None,
        }
    }
}

impl InstallOptions {
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn keep_file(mut self) -> Self {
        self.delete_file = false;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }
}

struct RemotePackage {
    version: String,
    package_name: String,
}

/// Package lifecycle for one component at one version.
#[derive(Clone)]
pub struct PackageClient {
    mgmt: Arc<ManagementClient>,
    downloads: reqwest::Client,
    metadata: ComponentMetadata,
    retry: RetryPolicy,
    cancel: Option<CancellationToken>,
}

impl PackageClient {
    pub(crate) fn new(
        mgmt: Arc<ManagementClient>,
        downloads: reqwest::Client,
        metadata: ComponentMetadata,
        retry: RetryPolicy,
        cancel: Option<CancellationToken>,
    ) -> Self {
        Self {
            mgmt,
            downloads,
            metadata,
            retry,
            cancel,
        }
    }

    pub fn metadata(&self) -> &ComponentMetadata {
        &self.metadata
    }

    /// Versions known to the metadata catalog. No network call.
    pub fn versions_list(&self) -> Vec<String> {
        self.metadata.versions_list().to_vec()
    }

    pub async fn is_installed(&self) -> Result<InstallStatus, CoreError> {
        let remote = self.installed_package().await?;
        Ok(InstallStatus {
            installed: remote.is_some(),
            installed_version: remote.map(|p| p.version).unwrap_or_default(),
            latest_version: self.metadata.latest_version().to_owned(),
        })
    }

    /// Download, optionally verify, upload, and install the package.
    ///
    /// Returns the requested component and version from metadata, not a
    /// post-install readback.
    pub async fn install(&self, options: InstallOptions) -> Result<PackageOutcome, CoreError> {
        let span = self.mgmt.span().clone();
        self.install_inner(options).instrument(span).await
    }

    async fn install_inner(&self, options: InstallOptions) -> Result<PackageOutcome, CoreError> {
        let file_name = self.metadata.download_package_name()?;
        let dir = options.download_dir.unwrap_or_else(std::env::temp_dir);
        let local = dir.join(&file_name);

        let bytes =
            match download_to_file(&self.downloads, self.metadata.download_url(), &local).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    remove_local(&local).await;
                    return Err(e.into());
                }
            };
        debug!(path = %local.display(), bytes, "package downloaded");

        if let Some(expected) = options.hash.as_deref() {
            let actual = sha256_file(&local).await?;
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                remove_local(&local).await;
                return Err(CoreError::HashMismatch {
                    expected: expected.to_owned(),
                    actual,
                });
            }
        }

        let uploaded = self.mgmt.upload_file(&local).await;
        if options.delete_file {
            remove_local(&local).await;
        }
        let uploaded = uploaded?;

        let operation = PackageOperation::Install {
            package_file_path: format!("{REMOTE_DOWNLOAD_DIR}/{uploaded}"),
        };
        self.mgmt
            .run_package_task(&operation, self.retry, self.cancel.as_ref())
            .await?;

        info!(
            component = self.metadata.component(),
            version = self.metadata.version(),
            "package installed"
        );
        Ok(PackageOutcome {
            component: self.metadata.component().to_owned(),
            version: self.metadata.version().to_owned(),
        })
    }

    /// Uninstall the installed package, if any. Uninstalling an absent
    /// package succeeds with an empty version.
    pub async fn uninstall(&self) -> Result<PackageOutcome, CoreError> {
        let Some(remote) = self.installed_package().await? else {
            debug!(
                component = self.metadata.component(),
                "package not installed, nothing to uninstall"
            );
            return Ok(PackageOutcome {
                component: self.metadata.component().to_owned(),
                version: String::new(),
            });
        };

        let operation = PackageOperation::Uninstall {
            package_name: remote.package_name,
        };
        self.mgmt
            .run_package_task(&operation, self.retry, self.cancel.as_ref())
            .await?;

        info!(
            component = self.metadata.component(),
            version = %remote.version,
            "package uninstalled"
        );
        Ok(PackageOutcome {
            component: self.metadata.component().to_owned(),
            version: remote.version,
        })
    }

    async fn installed_package(&self) -> Result<Option<RemotePackage>, CoreError> {
        let task = self
            .mgmt
            .run_package_task(&PackageOperation::Query, self.retry, self.cancel.as_ref())
            .await?;
        let packages = task.query_response.unwrap_or_default();
        Ok(select_package(self.metadata.package_name(), &packages))
    }
}

fn select_package(expected: &str, packages: &[InstalledPackage]) -> Option<RemotePackage> {
    let matches: Vec<&InstalledPackage> = packages.iter().filter(|p| p.name == expected).collect();
    match matches.as_slice() {
        [] => None,
        [found] => Some(RemotePackage {
            version: parse_version(&found.package_name)
                .unwrap_or_default()
                .to_owned(),
            package_name: found.package_name.clone(),
        }),
        _ => {
            let err = CoreError::AmbiguousPackage {
                name: expected.to_owned(),
                matches: matches.len(),
            };
            warn!(%err, "treating package as not installed");
            None
        }
    }
}

/// Hex SHA-256 of a file, lowercase.
async fn sha256_file(path: &Path) -> Result<String, CoreError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

async fn remove_local(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove downloaded package");
        }
    }
}
