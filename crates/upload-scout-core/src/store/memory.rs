//! In-memory [`ArtifactStore`] implementation for tests and dry runs.
//!
//! Uses a `Vec` behind `std::sync::RwLock`; queries are linear scans that
//! return matches in insertion order, matching the SQLite backend.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::UploadArtifact;

use super::{matches_template1, matches_template2, ArtifactStore};

/// In-memory artifact store.
pub struct InMemoryArtifactStore {
    artifacts: RwLock<Vec<UploadArtifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            artifacts: RwLock::new(Vec::new()),
        }
    }

    /// Seed a store with existing artifacts.
    pub fn with_artifacts(artifacts: Vec<UploadArtifact>) -> Self {
        Self {
            artifacts: RwLock::new(artifacts),
        }
    }

    fn filter(&self, pred: impl Fn(&UploadArtifact) -> bool) -> Result<Vec<UploadArtifact>> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|_| anyhow!("artifact store lock poisoned"))?;
        Ok(artifacts.iter().filter(|a| pred(a)).cloned().collect())
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn delete_all_artifacts(&self) -> Result<u64> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|_| anyhow!("artifact store lock poisoned"))?;
        let removed = artifacts.len() as u64;
        artifacts.clear();
        Ok(removed)
    }

    async fn insert_artifacts(&self, batch: &[UploadArtifact]) -> Result<()> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|_| anyhow!("artifact store lock poisoned"))?;
        artifacts.extend_from_slice(batch);
        Ok(())
    }

    async fn find_by_exact_image(&self, image: &str) -> Result<Vec<UploadArtifact>> {
        self.filter(|a| a.image == image)
    }

    async fn find_by_image_template1(&self, image: &str) -> Result<Vec<UploadArtifact>> {
        self.filter(|a| matches_template1(&a.image, image))
    }

    async fn find_by_image_template2(&self, base_name: &str) -> Result<Vec<UploadArtifact>> {
        self.filter(|a| matches_template2(&a.image, base_name))
    }

    async fn list_artifacts(&self) -> Result<Vec<UploadArtifact>> {
        self.filter(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(dir: &str, image: &str) -> UploadArtifact {
        UploadArtifact {
            directory: dir.to_string(),
            script: "deploy.sh".to_string(),
            package_name: "app.jar".to_string(),
            image: image.to_string(),
        }
    }

    #[tokio::test]
    async fn delete_then_insert_replaces_contents() {
        let store = InMemoryArtifactStore::with_artifacts(vec![artifact("/old", "repo/old")]);
        assert_eq!(store.delete_all_artifacts().await.unwrap(), 1);
        store
            .insert_artifacts(&[artifact("/a", "repo/a"), artifact("/b", "repo/b")])
            .await
            .unwrap();
        let all = store.list_artifacts().await.unwrap();
        let dirs: Vec<_> = all.iter().map(|a| a.directory.as_str()).collect();
        assert_eq!(dirs, vec!["/a", "/b"]);
    }

    #[tokio::test]
    async fn queries_return_insertion_order() {
        let store = InMemoryArtifactStore::with_artifacts(vec![
            artifact("/1", "h/shop/orders:$1"),
            artifact("/2", "h/shop/orders"),
            artifact("/3", "h/$2/orders:$1"),
            artifact("/4", "h/shop/orders:$1"),
        ]);

        let exact = store.find_by_exact_image("h/shop/orders").await.unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].directory, "/2");

        let t1 = store.find_by_image_template1("h/shop/orders").await.unwrap();
        let dirs: Vec<_> = t1.iter().map(|a| a.directory.as_str()).collect();
        assert_eq!(dirs, vec!["/1", "/4"]);

        let t2 = store.find_by_image_template2("orders").await.unwrap();
        assert_eq!(t2.len(), 1);
        assert_eq!(t2[0].directory, "/3");
    }
}
