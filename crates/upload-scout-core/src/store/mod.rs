//! Storage abstraction for discovered upload artifacts.
//!
//! The [`ArtifactStore`] trait is everything the scan pipeline and the
//! match ranker need from persistence, so backends can be swapped (SQLite
//! in the CLI, in-memory in tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes and
//! must return query results in insertion order.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::UploadArtifact;

/// Marker separating an image from a templated tag (`repo/app:$1`).
pub const TAG_PLACEHOLDER: &str = ":$";

/// Abstract storage backend for upload artifacts.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`delete_all_artifacts`](ArtifactStore::delete_all_artifacts) | Clear results of the previous scan |
/// | [`insert_artifacts`](ArtifactStore::insert_artifacts) | Persist one delivered batch |
/// | [`find_by_exact_image`](ArtifactStore::find_by_exact_image) | `image = <image>` |
/// | [`find_by_image_template1`](ArtifactStore::find_by_image_template1) | `image` starts with `<image>:$` |
/// | [`find_by_image_template2`](ArtifactStore::find_by_image_template2) | `image` matches `*/$*/<base>:$*` |
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Remove every stored artifact, returning how many were removed.
    async fn delete_all_artifacts(&self) -> Result<u64>;

    /// Append a batch of artifacts.
    async fn insert_artifacts(&self, batch: &[UploadArtifact]) -> Result<()>;

    async fn find_by_exact_image(&self, image: &str) -> Result<Vec<UploadArtifact>>;

    async fn find_by_image_template1(&self, image: &str) -> Result<Vec<UploadArtifact>>;

    async fn find_by_image_template2(&self, base_name: &str) -> Result<Vec<UploadArtifact>>;

    /// Every stored artifact in insertion order.
    async fn list_artifacts(&self) -> Result<Vec<UploadArtifact>>;
}

/// Whether `stored` is `image` followed by a templated tag.
pub fn matches_template1(stored: &str, image: &str) -> bool {
    stored
        .strip_prefix(image)
        .is_some_and(|rest| rest.starts_with(TAG_PLACEHOLDER))
}

/// Whether `stored` has the shape `*/$*/<base_name>:$*`: some prefix, a
/// templated directory segment, the base name, and a templated tag.
pub fn matches_template2(stored: &str, base_name: &str) -> bool {
    let needle = format!("/{}{}", base_name, TAG_PLACEHOLDER);
    stored
        .match_indices(&needle)
        .any(|(at, _)| stored[..at].contains("/$"))
}
