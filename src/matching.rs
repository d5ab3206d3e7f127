//! `uscout match`: find the build scripts that publish a workload's image.

use anyhow::Result;
use std::fmt::Write;

use upload_scout_core::ranking::{find_upload_matches, UploadMatch};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteArtifactStore;

pub async fn run_match(config: &Config, image: &str, namespace: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteArtifactStore::new(pool.clone());

    let matches = find_upload_matches(&store, image, namespace).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
    } else if matches.is_empty() {
        println!("No matching build scripts.");
    } else {
        print!("{}", render_matches(&matches));
    }

    pool.close().await;
    Ok(())
}

/// Human-readable listing, most specific match first.
pub fn render_matches(matches: &[UploadMatch]) -> String {
    let mut out = String::new();
    for (i, m) in matches.iter().enumerate() {
        let artifact = &m.candidate.artifact;
        let _ = writeln!(out, "{}. {}", i + 1, m.invocation);
        let _ = writeln!(out, "    image: {}", artifact.image);
        let _ = writeln!(out, "    package: {}", artifact.package_name);
        let _ = writeln!(out, "    placeholders: {}", m.candidate.placeholder_count);
        if m.candidate.directory_contains_namespace_segment {
            let _ = writeln!(out, "    namespace match: yes");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use upload_scout_core::models::UploadArtifact;
    use upload_scout_core::ranking::{rank_candidates, ImageRef, ScriptInvocation};

    #[test]
    fn renders_numbered_invocations() {
        let image = ImageRef::parse("h/teamA/orders:v2");
        let ranked = rank_candidates(
            vec![UploadArtifact {
                directory: "/build/shop/orders".to_string(),
                script: "deploy.sh".to_string(),
                package_name: "orders.jar".to_string(),
                image: "h/teamA/orders:$1".to_string(),
            }],
            "corp-shop-prod",
        );
        let matches: Vec<UploadMatch> = ranked
            .into_iter()
            .map(|candidate| UploadMatch {
                invocation: ScriptInvocation::for_candidate(&candidate, &image),
                candidate,
            })
            .collect();

        let text = render_matches(&matches);
        assert!(text.starts_with("1. cd /build/shop/orders && sh deploy.sh v2\n"));
        assert!(text.contains("    package: orders.jar\n"));
        assert!(text.contains("namespace match: yes"));
    }
}
