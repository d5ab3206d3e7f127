//! Remote file listing and grouping.
//!
//! One composed `find` runs under the scan root per scan. Its output is
//! normalized line by line and bucketed by containing directory.

use std::collections::BTreeMap;

use tracing::{debug, info};

use upload_scout_core::extract::ExtractionRules;
use upload_scout_core::models::RemoteFileGroup;

use crate::error::RemoteError;
use crate::remote::{shell_quote, RemoteExecutor};

/// The single listing command issued per scan.
pub fn listing_command(root: &str, rules: &ExtractionRules) -> String {
    format!(
        "cd {} && find . -type f \\( -name {} -o -name {} \\) 2>/dev/null",
        shell_quote(root),
        shell_quote(&rules.descriptor_name),
        shell_quote(&format!("*{}", rules.script_suffix)),
    )
}

/// List candidate files under `root`.
///
/// Empty output is a valid, empty result. A failed command is only fatal
/// when it produced no output; partial output from a command that exits
/// non-zero (unreadable subdirectories, say) is still used.
pub async fn list_remote_files(
    executor: &dyn RemoteExecutor,
    root: &str,
    rules: &ExtractionRules,
) -> Result<Vec<RemoteFileGroup>, RemoteError> {
    let command = listing_command(root, rules);
    let output = match executor.execute(&command).await {
        Ok(output) => output,
        Err(RemoteError::CommandFailed { status, output }) if !output.is_empty() => {
            info!(status, "Listing command failed but produced output; using it");
            output
        }
        Err(RemoteError::Killed { signal, output }) if !output.is_empty() => {
            info!(signal = %signal, "Listing command was killed but produced output; using it");
            output
        }
        Err(e) => return Err(e),
    };

    let groups = group_listing(&output);
    debug!(
        root = %root,
        directories = groups.len(),
        "Grouped remote listing"
    );
    Ok(groups)
}

/// Bucket `find` output lines into per-directory groups, sorted by
/// directory.
///
/// Trailing carriage returns are stripped and `\` separators become `/`.
/// Files directly under the root land in directory `.`.
pub fn group_listing(output: &str) -> Vec<RemoteFileGroup> {
    let mut groups: BTreeMap<String, RemoteFileGroup> = BTreeMap::new();

    for line in output.lines() {
        let line = line.trim_end_matches('\r').trim();
        if line.is_empty() {
            continue;
        }
        let path = line.replace('\\', "/");
        let (directory, file) = match path.rfind('/') {
            Some(at) => (&path[..at], &path[at + 1..]),
            None => (".", path.as_str()),
        };
        if file.is_empty() {
            continue;
        }
        let directory = if directory.is_empty() { "/" } else { directory };

        groups
            .entry(directory.to_string())
            .or_insert_with(|| RemoteFileGroup {
                directory: directory.to_string(),
                ..Default::default()
            })
            .files
            .insert(file.to_string());
    }

    groups.into_values().collect()
}
