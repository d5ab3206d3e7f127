//! Reverse-proxy route collection.
//!
//! Fetches each configured proxy's configuration text, parses it into
//! [`ProxyRouteEntry`]s, and folds everything into a [`ServiceLookupIndex`]
//! used to annotate workloads with externally reachable paths.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use upload_scout_core::lookup::{annotate_workloads, ServiceLookupIndex};
use upload_scout_core::models::{ProxyRouteEntry, Workload};
use upload_scout_core::proxy::parse_proxy_config;

use crate::config::{ClusterConfig, Config, ProxySourceConfig};

/// Key inside the config map's `data` holding the proxy configuration.
pub const CONFIG_MAP_KEY: &str = "default.conf";

/// Where raw proxy configuration text comes from.
#[async_trait]
pub trait ProxyConfigSource: Send + Sync {
    async fn fetch(&self, config_path: &str) -> Result<String>;
}

/// Reads proxy configuration from config maps via the cluster-management API.
pub struct ClusterConfigMapSource {
    client: reqwest::Client,
    base_url: String,
    project: String,
    username: String,
    token: String,
}

#[derive(Deserialize)]
struct ConfigMapResponse {
    #[serde(default)]
    data: std::collections::HashMap<String, String>,
}

impl ClusterConfigMapSource {
    pub fn new(cluster: &ClusterConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: cluster.base_url.trim_end_matches('/').to_string(),
            project: cluster.project.clone(),
            username: cluster.username.clone(),
            token: cluster.token.clone(),
        })
    }

    fn config_map_url(&self, config_path: &str) -> String {
        format!(
            "{}/project/{}/configMaps/{}",
            self.base_url, self.project, config_path
        )
    }
}

#[async_trait]
impl ProxyConfigSource for ClusterConfigMapSource {
    async fn fetch(&self, config_path: &str) -> Result<String> {
        let url = self.config_map_url(config_path);
        debug!(url = %url, "Fetching proxy config map");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.token))
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Config map request failed {}: {}", status, body_text);
        }

        let mut config_map: ConfigMapResponse = response.json().await?;
        config_map
            .data
            .remove(CONFIG_MAP_KEY)
            .ok_or_else(|| anyhow!("Config map {} has no '{}' entry", config_path, CONFIG_MAP_KEY))
    }
}

/// Fetch and parse every proxy source in configuration order.
///
/// A source that cannot be fetched is logged and skipped.
pub async fn collect_routes(
    source: &dyn ProxyConfigSource,
    proxies: &[ProxySourceConfig],
) -> Vec<ProxyRouteEntry> {
    let mut routes = Vec::new();
    for proxy in proxies {
        match source.fetch(&proxy.config_path).await {
            Ok(text) => {
                let parsed = parse_proxy_config(&proxy.base_url, &text);
                debug!(
                    config_path = %proxy.config_path,
                    routes = parsed.len(),
                    "Parsed proxy config"
                );
                routes.extend(parsed);
            }
            Err(e) => {
                warn!(config_path = %proxy.config_path, error = %e, "Failed to fetch proxy config");
            }
        }
    }
    routes
}

/// Collect routes from every source and build the lookup index.
pub async fn build_lookup_index(
    source: &dyn ProxyConfigSource,
    proxies: &[ProxySourceConfig],
) -> ServiceLookupIndex {
    let routes = collect_routes(source, proxies).await;
    ServiceLookupIndex::build(&routes)
}

/// `uscout routes`: print the lookup index, or one service's paths.
pub async fn run_routes(
    config: &Config,
    service: Option<&str>,
    namespace: Option<&str>,
) -> Result<()> {
    let Some(cluster) = &config.cluster else {
        bail!("No [cluster] configured; nothing to fetch proxy configs from");
    };
    let source = ClusterConfigMapSource::new(cluster, config.scan.command_timeout())?;
    let index = build_lookup_index(&source, &config.proxy).await;

    match (service, namespace) {
        (Some(service), Some(namespace)) => {
            let mut workloads = [Workload {
                name: service.to_string(),
                namespace: namespace.to_string(),
                ..Default::default()
            }];
            annotate_workloads(&index, &mut workloads);
            if workloads[0].access_path.is_empty() {
                println!("No routes for {}/{}.", namespace, service);
            } else {
                for path in workloads[0].access_path.split(',') {
                    println!("{}", path);
                }
            }
        }
        (None, None) => {
            if index.is_empty() {
                println!("No routes.");
            }
            for (key, paths) in index.sorted_entries() {
                println!("{}/{}  {}", key.namespace, key.service, paths);
            }
        }
        _ => bail!("--service and --namespace must be given together"),
    }
    Ok(())
}
