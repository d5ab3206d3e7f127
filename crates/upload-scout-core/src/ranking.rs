//! Match ranking: which discovered build script produces a workload's image.
//!
//! # Algorithm
//!
//! 1. Split the workload image at the last `:` into image and tag, and take
//!    the base name (after the last `/`) and directory segment (the one
//!    before it). A colon with a `/` after it is a registry port, not a
//!    tag separator.
//! 2. Collect candidates from three store queries, concatenated in order
//!    without deduplication:
//!    - exact image match,
//!    - `<image>:$…` (templated tag),
//!    - `*/$*/<base>:$*` (templated directory and tag).
//! 3. Stable sort by placeholder count (`$` occurrences, ascending), then
//!    prefer directories containing the namespace's second `-` segment when
//!    the namespace has at least three segments.
//! 4. Each placeholder in the stored image is filled positionally: first the
//!    tag, then the directory segment.

use anyhow::Result;
use serde::Serialize;
use std::fmt;

use crate::models::UploadArtifact;
use crate::store::ArtifactStore;

/// A workload image reference broken into the parts used for matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub image_without_tag: String,
    pub tag: String,
    /// Path segment just before the base name, empty if there is none.
    pub dir_segment: String,
    pub base_name: String,
}

impl ImageRef {
    /// Split `image` at its last colon into name and tag.
    ///
    /// Unlike a plain last-colon split, a colon with a `/` after it is read
    /// as a registry port: `registry:5000/app` has no tag and keeps its full
    /// text as `image_without_tag`.
    pub fn parse(image: &str) -> Self {
        let (image_without_tag, tag) = match image.rfind(':') {
            Some(at) if !image[at + 1..].contains('/') => (&image[..at], &image[at + 1..]),
            _ => (image, ""),
        };

        let segments: Vec<&str> = image_without_tag.split('/').collect();
        let base_name = segments.last().copied().unwrap_or_default();
        let dir_segment = if segments.len() >= 2 {
            segments[segments.len() - 2]
        } else {
            ""
        };

        Self {
            image_without_tag: image_without_tag.to_string(),
            tag: tag.to_string(),
            dir_segment: dir_segment.to_string(),
            base_name: base_name.to_string(),
        }
    }
}

/// The second `-`-separated segment of a namespace with at least three
/// segments (`team-orders-prod` → `orders`).
pub fn namespace_segment(namespace: &str) -> Option<&str> {
    let parts: Vec<&str> = namespace.split('-').collect();
    if parts.len() >= 3 {
        Some(parts[1])
    } else {
        None
    }
}

pub fn placeholder_count(image: &str) -> usize {
    image.matches('$').count()
}

/// A stored artifact annotated with its ranking signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchCandidate {
    pub artifact: UploadArtifact,
    pub placeholder_count: usize,
    pub directory_contains_namespace_segment: bool,
}

/// Rank candidates most-specific first. Ties keep their input order.
pub fn rank_candidates(artifacts: Vec<UploadArtifact>, namespace: &str) -> Vec<MatchCandidate> {
    let segment = namespace_segment(namespace);
    let mut candidates: Vec<MatchCandidate> = artifacts
        .into_iter()
        .map(|artifact| MatchCandidate {
            placeholder_count: placeholder_count(&artifact.image),
            directory_contains_namespace_segment: segment
                .is_some_and(|s| artifact.directory.contains(s)),
            artifact,
        })
        .collect();

    candidates.sort_by_key(|c| (c.placeholder_count, !c.directory_contains_namespace_segment));
    candidates
}

/// A build script to run, with the arguments its image template needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptInvocation {
    pub directory: String,
    pub script: String,
    pub args: Vec<String>,
}

impl ScriptInvocation {
    pub fn for_candidate(candidate: &MatchCandidate, image: &ImageRef) -> Self {
        let args = match candidate.placeholder_count {
            0 => Vec::new(),
            1 => vec![image.tag.clone()],
            _ => vec![image.tag.clone(), image.dir_segment.clone()],
        };
        Self {
            directory: candidate.artifact.directory.clone(),
            script: candidate.artifact.script.clone(),
            args,
        }
    }

    /// Shell command line: `cd <directory> && sh <script> [args...]`.
    pub fn command(&self) -> String {
        let mut command = format!("cd {} && sh {}", self.directory, self.script);
        for arg in &self.args {
            command.push(' ');
            if arg.is_empty() {
                command.push_str("''");
            } else {
                command.push_str(arg);
            }
        }
        command
    }
}

impl fmt::Display for ScriptInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command())
    }
}

/// A ranked candidate together with its rendered invocation.
#[derive(Debug, Clone, Serialize)]
pub struct UploadMatch {
    pub candidate: MatchCandidate,
    pub invocation: ScriptInvocation,
}

/// Find and rank the build scripts that could produce `image` for a
/// workload in `namespace`.
pub async fn find_upload_matches(
    store: &dyn ArtifactStore,
    image: &str,
    namespace: &str,
) -> Result<Vec<UploadMatch>> {
    let image_ref = ImageRef::parse(image);

    let mut artifacts = store
        .find_by_exact_image(&image_ref.image_without_tag)
        .await?;
    artifacts.extend(
        store
            .find_by_image_template1(&image_ref.image_without_tag)
            .await?,
    );
    artifacts.extend(store.find_by_image_template2(&image_ref.base_name).await?);

    Ok(rank_candidates(artifacts, namespace)
        .into_iter()
        .map(|candidate| UploadMatch {
            invocation: ScriptInvocation::for_candidate(&candidate, &image_ref),
            candidate,
        })
        .collect())
}
