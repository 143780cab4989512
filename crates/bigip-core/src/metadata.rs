// ── Extension metadata catalog ──
//
// Per-component catalog of known versions (package name, download URL,
// latest flag) and service endpoints (URI, allowed methods). A copy is
// bundled with the crate; `refresh_latest` swaps in the published feed
// when it is reachable. Lookups hand out owned `ComponentMetadata`
// snapshots so a concurrent refresh never tears a read.

use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::CoreError;

/// Published metadata feed.
pub const METADATA_FEED_URL: &str =
    "https://cdn.f5.com/product/cloudsolutions/f5-extension-metadata/latest/metadata.json";

const BUNDLED_METADATA: &str = include_str!("extension_metadata.json");

static PACKAGE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)-[0-9]").expect("package prefix pattern is valid"));

/// Extension components known to the bundled catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Component {
    /// Application Services 3.
    As3,
    /// Declarative Onboarding.
    Do,
    /// Telemetry Streaming.
    Ts,
    /// Cloud Failover.
    Cf,
}

/// Named service endpoints a component may expose.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum EndpointKind {
    Configure,
    Info,
    Inspect,
    Trigger,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub uri: String,
    #[serde(default)]
    pub methods: Vec<String>,
}

impl Endpoint {
    /// An empty method list means the catalog places no restriction.
    pub fn allows(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub package_name: String,
    pub download_url: String,
    #[serde(default)]
    pub latest: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEntry {
    #[serde(default)]
    pub endpoints: IndexMap<String, Endpoint>,
    #[serde(default)]
    pub versions: IndexMap<String, VersionEntry>,
}

impl ComponentEntry {
    fn latest_version(&self) -> Option<&str> {
        self.versions
            .iter()
            .find(|(_, entry)| entry.latest)
            .or_else(|| self.versions.first())
            .map(|(version, _)| version.as_str())
    }
}

/// Whole catalog document, keyed by component id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub components: IndexMap<String, ComponentEntry>,
}

/// Shared, atomically refreshable metadata catalog.
#[derive(Debug, Clone)]
pub struct MetadataCatalog {
    document: Arc<ArcSwap<CatalogDocument>>,
}

impl MetadataCatalog {
    /// Catalog built from the copy shipped with the crate.
    pub fn bundled() -> Result<Self, CoreError> {
        Self::from_json(BUNDLED_METADATA)
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let document: CatalogDocument =
            serde_json::from_str(json).map_err(|e| CoreError::Metadata {
                message: format!("invalid catalog document: {e}"),
            })?;
        Ok(Self::from_document(document))
    }

    pub fn from_document(document: CatalogDocument) -> Self {
        Self {
            document: Arc::new(ArcSwap::from_pointee(document)),
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogDocument> {
        self.document.load_full()
    }

    pub fn replace(&self, document: CatalogDocument) {
        self.document.store(Arc::new(document));
    }

    /// Component ids in catalog order.
    pub fn component_ids(&self) -> Vec<String> {
        self.document.load().components.keys().cloned().collect()
    }

    /// Fetch the published feed and swap it in.
    ///
    /// Best effort: any failure (network, status, parse, empty document)
    /// is logged and the current catalog stays in place. Returns whether
    /// the catalog was replaced.
    pub async fn refresh_latest(&self, http: &reqwest::Client, feed_url: &Url) -> bool {
        match fetch_document(http, feed_url).await {
            Ok(document) => {
                info!(
                    url = %feed_url,
                    components = document.components.len(),
                    "metadata catalog refreshed"
                );
                self.replace(document);
                true
            }
            Err(reason) => {
                warn!(url = %feed_url, %reason, "metadata refresh failed, keeping current catalog");
                false
            }
        }
    }

    /// Resolve metadata for `component` at `version` (latest when `None`).
    pub fn component(
        &self,
        component: &str,
        version: Option<&str>,
    ) -> Result<ComponentMetadata, CoreError> {
        let document = self.document.load();
        let entry = document
            .components
            .get(component)
            .ok_or_else(|| CoreError::UnknownComponent {
                component: component.to_owned(),
            })?;

        let latest = entry.latest_version().map(str::to_owned);
        let version = match version {
            Some(v) => v.to_owned(),
            None => latest.clone().ok_or_else(|| CoreError::Metadata {
                message: format!("component {component} lists no versions"),
            })?,
        };
        let version_entry =
            entry
                .versions
                .get(&version)
                .cloned()
                .ok_or_else(|| CoreError::UnknownVersion {
                    component: component.to_owned(),
                    version: version.clone(),
                })?;
        let download_url =
            Url::parse(&version_entry.download_url).map_err(|e| CoreError::Metadata {
                message: format!(
                    "invalid download URL for {component} {version}: {e}"
                ),
            })?;

        debug!(component, %version, "resolved component metadata");
        Ok(ComponentMetadata {
            component: component.to_owned(),
            version,
            latest_version: latest.unwrap_or_default(),
            versions: entry.versions.keys().cloned().collect(),
            full_package_name: version_entry.package_name,
            download_url,
            endpoints: entry.endpoints.clone(),
        })
    }
}

async fn fetch_document(http: &reqwest::Client, url: &Url) -> Result<CatalogDocument, String> {
    let resp = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let status = resp.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status.as_u16()));
    }
    let document: CatalogDocument = resp.json().await.map_err(|e| e.to_string())?;
    if document.components.is_empty() {
        return Err("feed contained no components".into());
    }
    Ok(document)
}

/// Resolved metadata for one component at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentMetadata {
    component: String,
    version: String,
    latest_version: String,
    versions: Vec<String>,
    full_package_name: String,
    download_url: Url,
    endpoints: IndexMap<String, Endpoint>,
}

impl ComponentMetadata {
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn latest_version(&self) -> &str {
        &self.latest_version
    }

    /// Known versions in catalog order.
    pub fn versions_list(&self) -> &[String] {
        &self.versions
    }

    /// Package name with the version suffix stripped, e.g.
    /// `f5-appsvcs-3.20.0-3.noarch` becomes `f5-appsvcs`.
    pub fn package_name(&self) -> &str {
        PACKAGE_PREFIX
            .captures(&self.full_package_name)
            .and_then(|c| c.get(1))
            .map_or(self.full_package_name.as_str(), |m| m.as_str())
    }

    pub fn full_package_name(&self) -> &str {
        &self.full_package_name
    }

    pub fn download_url(&self) -> &Url {
        &self.download_url
    }

    /// Last path segment of the download URL.
    pub fn download_package_name(&self) -> Result<String, CoreError> {
        self.download_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| CoreError::Metadata {
                message: format!("download URL has no file name: {}", self.download_url),
            })
    }

    pub fn endpoint(&self, kind: EndpointKind) -> Option<&Endpoint> {
        self.endpoints.get(kind.as_ref())
    }

    /// Endpoint of `kind` if it exists and allows `method`.
    pub fn supports(&self, kind: EndpointKind, method: &str) -> bool {
        self.endpoint(kind).is_some_and(|e| e.allows(method))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn bundled_catalog_covers_every_component() {
        let catalog = MetadataCatalog::bundled().unwrap();
        for component in Component::iter() {
            let meta = catalog.component(component.as_ref(), None).unwrap();
            assert!(!meta.latest_version().is_empty());
            assert_eq!(meta.version(), meta.latest_version());
            assert!(meta.endpoint(EndpointKind::Configure).is_some());
            assert!(meta.endpoint(EndpointKind::Info).is_some());
        }
    }

    #[test]
    fn as3_resolves_names_and_urls() {
        let catalog = MetadataCatalog::bundled().unwrap();
        let meta = catalog.component("as3", None).unwrap();

        assert_eq!(meta.version(), "3.20.0");
        assert_eq!(meta.package_name(), "f5-appsvcs");
        assert_eq!(meta.full_package_name(), "f5-appsvcs-3.20.0-3.noarch");
        assert_eq!(
            meta.download_package_name().unwrap(),
            "f5-appsvcs-3.20.0-3.noarch.rpm"
        );
        assert_eq!(
            meta.endpoint(EndpointKind::Configure).unwrap().uri,
            "/mgmt/shared/appsvcs/declare"
        );
        assert_eq!(meta.versions_list(), ["3.20.0", "3.19.1", "3.10.0"]);
    }

    #[test]
    fn explicit_version_must_exist() {
        let catalog = MetadataCatalog::bundled().unwrap();

        let meta = catalog.component("do", Some("1.12.0")).unwrap();
        assert_eq!(meta.version(), "1.12.0");
        assert_eq!(meta.latest_version(), "1.13.0");

        let err = catalog.component("do", Some("9.9.9")).unwrap_err();
        assert!(matches!(err, CoreError::UnknownVersion { .. }));

        let err = catalog.component("waf", None).unwrap_err();
        assert!(matches!(err, CoreError::UnknownComponent { .. }));
    }

    #[test]
    fn capability_lookup_respects_method_lists() {
        let catalog = MetadataCatalog::bundled().unwrap();
        let as3 = catalog.component("as3", None).unwrap();
        let cf = catalog.component("cf", None).unwrap();

        assert!(as3.supports(EndpointKind::Configure, "DELETE"));
        assert!(!as3.supports(EndpointKind::Reset, "POST"));
        assert!(cf.supports(EndpointKind::Reset, "POST"));
        assert!(cf.supports(EndpointKind::Trigger, "get"));
        assert!(!cf.supports(EndpointKind::Configure, "DELETE"));
    }

    #[test]
    fn package_name_without_version_is_kept_whole() {
        let catalog = MetadataCatalog::from_json(
            r#"{"components":{"x":{"versions":{"1.0.0":{
                "packageName":"custom-noarch",
                "downloadUrl":"https://example.com/dist/custom.rpm"
            }}}}}"#,
        )
        .unwrap();
        let meta = catalog.component("x", None).unwrap();
        assert_eq!(meta.package_name(), "custom-noarch");
        // no entry flagged latest: first listed wins
        assert_eq!(meta.latest_version(), "1.0.0");
    }

    #[test]
    fn replace_is_visible_to_clones() {
        let catalog = MetadataCatalog::bundled().unwrap();
        let shared = catalog.clone();
        catalog.replace(CatalogDocument::default());
        assert!(shared.component_ids().is_empty());
    }
}
