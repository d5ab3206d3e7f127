//! Line-level heuristics that turn build descriptor and script text into
//! upload artifacts.
//!
//! A build directory qualifies when it holds the build descriptor (a
//! `Dockerfile` by default) and at least one publish script (`*.sh`).
//! From the descriptor we take the package copied into the image; from each
//! script we take the image it pushes. Both must be found for a script to
//! produce an [`UploadArtifact`].

use serde::{Deserialize, Serialize};

use crate::models::{RemoteFileGroup, UploadArtifact};

/// Zero-based token index of the image name on a publish line
/// (`docker push <image>`).
pub const IMAGE_TOKEN_INDEX: usize = 2;

/// File names and keywords the extractor looks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRules {
    /// Exact file name of the build descriptor.
    pub descriptor_name: String,
    /// Suffix identifying publish scripts.
    pub script_suffix: String,
    /// Suffix identifying the packaged build output inside the descriptor.
    pub package_suffix: String,
    /// Descriptor keyword marking a line that copies files into the image.
    pub copy_keyword: String,
    /// Script phrase marking the line that publishes the image.
    pub publish_keyword: String,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            descriptor_name: "Dockerfile".to_string(),
            script_suffix: ".sh".to_string(),
            package_suffix: ".jar".to_string(),
            copy_keyword: "COPY".to_string(),
            publish_keyword: "docker push".to_string(),
        }
    }
}

/// A directory worth reading: it has the descriptor and these scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDirectory {
    pub directory: String,
    pub scripts: Vec<String>,
}

impl ExtractionRules {
    pub fn is_script(&self, file_name: &str) -> bool {
        file_name.ends_with(&self.script_suffix)
    }

    /// Select the directory for extraction, or `None` when it lacks either
    /// the descriptor or a script.
    pub fn candidate(&self, group: &RemoteFileGroup) -> Option<CandidateDirectory> {
        if !group.files.contains(&self.descriptor_name) {
            return None;
        }
        let scripts: Vec<String> = group
            .files
            .iter()
            .filter(|f| f.as_str() != self.descriptor_name && self.is_script(f))
            .cloned()
            .collect();
        if scripts.is_empty() {
            return None;
        }
        Some(CandidateDirectory {
            directory: group.directory.clone(),
            scripts,
        })
    }

    /// First token ending in the package suffix on the first line that also
    /// contains the copy keyword.
    pub fn package_name(&self, descriptor: &str) -> Option<String> {
        descriptor
            .lines()
            .filter(|line| line.contains(&self.copy_keyword))
            .find_map(|line| {
                line.split_whitespace()
                    .find(|token| token.ends_with(&self.package_suffix))
            })
            .map(str::to_string)
    }

    /// Third whitespace token of the first publish line that has one.
    pub fn image_name(&self, script: &str) -> Option<String> {
        script
            .lines()
            .filter(|line| line.contains(&self.publish_keyword))
            .find_map(|line| line.split_whitespace().nth(IMAGE_TOKEN_INDEX))
            .map(str::to_string)
    }
}

/// Build an artifact only when both halves were extracted.
pub fn assemble_artifact(
    directory: &str,
    script: &str,
    package_name: Option<&str>,
    image: Option<&str>,
) -> Option<UploadArtifact> {
    match (package_name, image) {
        (Some(package), Some(image)) if !package.is_empty() && !image.is_empty() => {
            Some(UploadArtifact {
                directory: directory.to_string(),
                script: script.to_string(),
                package_name: package.to_string(),
                image: image.to_string(),
            })
        }
        _ => None,
    }
}
