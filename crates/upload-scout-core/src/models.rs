//! Core data models shared by the scan pipeline and the match ranker.

use serde::Serialize;
use std::collections::BTreeSet;

/// A `location` block that forwards to an in-cluster service.
///
/// Produced by [`parse_proxy_config`](crate::proxy::parse_proxy_config) and
/// only lives for the duration of one parse batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyRouteEntry {
    pub base_url: String,
    pub location_path: String,
    pub target_service: String,
    pub target_namespace: String,
    pub target_port: u16,
}

impl ProxyRouteEntry {
    /// Externally reachable URL for this route (`base_url` + `location_path`).
    pub fn access_path(&self) -> String {
        format!("{}{}", self.base_url, self.location_path)
    }
}

/// Aggregation key for the service lookup index. Not unique across entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub service: String,
    pub namespace: String,
}

impl ServiceKey {
    pub fn new(service: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            namespace: namespace.into(),
        }
    }
}

/// Files found in one remote directory during a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFileGroup {
    /// Directory as listed remotely, relative to the scan root (e.g. `./a/b`).
    pub directory: String,
    pub files: BTreeSet<String>,
}

/// A discovered association between a build directory, the script that
/// publishes an image, the package copied into that image, and the image.
///
/// Only ever constructed with both `package_name` and `image` present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadArtifact {
    pub directory: String,
    pub script: String,
    pub package_name: String,
    pub image: String,
}

/// Ephemeral progress notification for one visited directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub current_directory: String,
    pub processed: usize,
    pub total: usize,
}

/// A deployable unit tracked by name, namespace and image reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    pub image: String,
    /// Comma-joined externally reachable paths, empty when none are known.
    pub access_path: String,
}
