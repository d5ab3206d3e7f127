//! Reverse-proxy configuration parsing.
//!
//! Extracts `location <path> { ... proxy_pass http://<service>.<namespace>:<port> ... }`
//! routes from raw nginx-style configuration text.
//!
//! # Parsing model
//!
//! 1. Trim every line; drop blank lines and lines starting with `#`.
//! 2. Join the remaining lines with single spaces. Directive boundaries are
//!    whitespace, so the parser does not care how the text was wrapped.
//! 3. Match `location <path> { <block> }` where `<block>` runs up to the
//!    first `}`. A nested block therefore ends the match early:
//!
//!    ```text
//!    location /api { if ($x) { return 403; } proxy_pass http://a.b:80; }
//!                                          ^ block ends here, proxy_pass is lost
//!    ```
//!
//!    Existing proxy configurations only use single-level location blocks,
//!    and this truncation is kept as-is.
//! 4. Inside each block, the first `proxy_pass http://<service>.<namespace>:<port>`
//!    wins. Blocks without one, or with a port that does not fit in a `u16`,
//!    are dropped.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::models::ProxyRouteEntry;

fn location_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"location\s+([^{]+?)\s*\{([^}]+)\}").expect("valid regex"))
}

fn proxy_pass_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"proxy_pass\s+http://([^:/]+)[.]([^:/]+):(\d+)").expect("valid regex")
    })
}

/// Strip comments and blank lines, then collapse the rest onto one line.
fn collapse_config(config_text: &str) -> String {
    config_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse proxy configuration text into route entries, preserving the order
/// in which `location` blocks appear.
pub fn parse_proxy_config(base_url: &str, config_text: &str) -> Vec<ProxyRouteEntry> {
    let collapsed = collapse_config(config_text);

    let mut entries = Vec::new();
    for location in location_regex().captures_iter(&collapsed) {
        let location_path = location[1].trim();
        let block = &location[2];

        let Some(target) = proxy_pass_regex().captures(block) else {
            debug!(location = %location_path, "location has no in-cluster proxy_pass, skipping");
            continue;
        };

        let port = match target[3].parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                debug!(location = %location_path, port = &target[3], "invalid proxy_pass port, skipping");
                continue;
            }
        };

        entries.push(ProxyRouteEntry {
            base_url: base_url.to_string(),
            location_path: location_path.to_string(),
            target_service: target[1].to_string(),
            target_namespace: target[2].to_string(),
            target_port: port,
        });
    }

    entries
}
