//! Per-directory artifact extraction over the remote executor.
//!
//! For a qualifying directory the descriptor is read once, then every
//! script is read in turn. Each read is its own remote command. A failed
//! read is logged and skipped; it never ends the scan.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use upload_scout_core::extract::{assemble_artifact, CandidateDirectory, ExtractionRules};
use upload_scout_core::models::UploadArtifact;

use crate::remote::{join_remote, read_command, RemoteExecutor};

/// Reads build files remotely and turns them into [`UploadArtifact`]s.
pub struct ArtifactExtractor {
    root: String,
    rules: ExtractionRules,
}

impl ArtifactExtractor {
    pub fn new(root: impl Into<String>, rules: ExtractionRules) -> Self {
        Self {
            root: root.into(),
            rules,
        }
    }

    pub fn rules(&self) -> &ExtractionRules {
        &self.rules
    }

    /// Extract artifacts for one candidate directory, in script order.
    ///
    /// Stops early, returning what it has, once `cancel` fires.
    pub async fn extract(
        &self,
        executor: &dyn RemoteExecutor,
        candidate: &CandidateDirectory,
        cancel: &CancellationToken,
    ) -> Vec<UploadArtifact> {
        let mut artifacts = Vec::new();
        if cancel.is_cancelled() {
            return artifacts;
        }

        let stored_directory = join_remote(&self.root, &candidate.directory);

        let descriptor = match self
            .read(executor, &candidate.directory, &self.rules.descriptor_name)
            .await
        {
            Some(text) => text,
            None => return artifacts,
        };
        let package_name = self.rules.package_name(&descriptor);
        if package_name.is_none() {
            debug!(directory = %stored_directory, "No package name in descriptor");
            return artifacts;
        }

        for script in &candidate.scripts {
            if cancel.is_cancelled() {
                debug!(directory = %stored_directory, "Extraction cancelled");
                break;
            }
            let Some(text) = self.read(executor, &candidate.directory, script).await else {
                continue;
            };
            let image = self.rules.image_name(&text);
            match assemble_artifact(
                &stored_directory,
                script,
                package_name.as_deref(),
                image.as_deref(),
            ) {
                Some(artifact) => artifacts.push(artifact),
                None => debug!(
                    directory = %stored_directory,
                    script = %script,
                    "No image name in script"
                ),
            }
        }

        artifacts
    }

    async fn read(
        &self,
        executor: &dyn RemoteExecutor,
        directory: &str,
        file: &str,
    ) -> Option<String> {
        let command = read_command(&self.root, directory, file);
        match executor.execute(&command).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(directory = %directory, file = %file, error = %e, "Failed to read remote file");
                None
            }
        }
    }
}
