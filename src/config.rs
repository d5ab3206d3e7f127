//! Configuration parsing and validation.
//!
//! Upload Scout is configured via a TOML file (default `./config/scout.toml`).
//! The file is parsed once at startup into [`Config`] and validated by
//! [`load_config`]; components receive the pieces they need by reference.
//!
//! ```toml
//! [db]
//! path = "./data/scout.sqlite"
//!
//! [jump_host]
//! host = "10.0.0.5"
//! username = "builder"
//! password = "secret"
//! root_path = "/data/build"
//!
//! [scan]
//! batch_size = 20
//!
//! [cluster]
//! base_url = "https://rancher.example/v3"
//! project = "c-xxxx:p-yyyy"
//! username = "token-abc"
//! token = "secret"
//!
//! [[proxy]]
//! base_url = "https://gw.example"
//! config_path = "ingress:nginx-conf"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use upload_scout_core::extract::ExtractionRules;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub jump_host: JumpHostConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub cluster: Option<ClusterConfig>,
    #[serde(default)]
    pub proxy: Vec<ProxySourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a connection waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl DbConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout_secs() -> u64 {
    5
}

/// Connection parameters for the jump host that can see the build servers.
#[derive(Deserialize, Clone)]
pub struct JumpHostConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Directory under which build directories are searched.
    pub root_path: String,
}

impl std::fmt::Debug for JumpHostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JumpHostConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("root_path", &self.root_path)
            .finish()
    }
}

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_descriptor_name")]
    pub descriptor_name: String,
    #[serde(default = "default_script_suffix")]
    pub script_suffix: String,
    #[serde(default = "default_package_suffix")]
    pub package_suffix: String,
    #[serde(default = "default_copy_keyword")]
    pub copy_keyword: String,
    #[serde(default = "default_publish_keyword")]
    pub publish_keyword: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            descriptor_name: default_descriptor_name(),
            script_suffix: default_script_suffix(),
            package_suffix: default_package_suffix(),
            copy_keyword: default_copy_keyword(),
            publish_keyword: default_publish_keyword(),
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    20
}
fn default_descriptor_name() -> String {
    "Dockerfile".to_string()
}
fn default_script_suffix() -> String {
    ".sh".to_string()
}
fn default_package_suffix() -> String {
    ".jar".to_string()
}
fn default_copy_keyword() -> String {
    "COPY".to_string()
}
fn default_publish_keyword() -> String {
    "docker push".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    15
}
fn default_command_timeout_secs() -> u64 {
    60
}

impl ScanConfig {
    pub fn rules(&self) -> ExtractionRules {
        ExtractionRules {
            descriptor_name: self.descriptor_name.clone(),
            script_suffix: self.script_suffix.clone(),
            package_suffix: self.package_suffix.clone(),
            copy_keyword: self.copy_keyword.clone(),
            publish_keyword: self.publish_keyword.clone(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Cluster-management API used to fetch reverse-proxy config maps.
#[derive(Deserialize, Clone)]
pub struct ClusterConfig {
    pub base_url: String,
    pub project: String,
    pub username: String,
    pub token: String,
}

impl std::fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("base_url", &self.base_url)
            .field("project", &self.project)
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// One reverse-proxy whose configuration is parsed for routes.
#[derive(Debug, Deserialize, Clone)]
pub struct ProxySourceConfig {
    /// External URL prefix the proxy serves under.
    pub base_url: String,
    /// Config map identifier holding the proxy configuration.
    pub config_path: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        bail!("db.max_connections must be >= 1");
    }

    // Validate jump host
    let jump = &config.jump_host;
    if jump.host.trim().is_empty() {
        bail!("jump_host.host must not be empty");
    }
    if jump.port == 0 {
        bail!("jump_host.port must be > 0");
    }
    if jump.username.trim().is_empty() {
        bail!("jump_host.username must not be empty");
    }
    if jump.root_path.trim().is_empty() {
        bail!("jump_host.root_path must not be empty");
    }

    // Validate scan
    let scan = &config.scan;
    if scan.batch_size == 0 {
        bail!("scan.batch_size must be >= 1");
    }
    for (key, value) in [
        ("scan.descriptor_name", &scan.descriptor_name),
        ("scan.script_suffix", &scan.script_suffix),
        ("scan.package_suffix", &scan.package_suffix),
        ("scan.copy_keyword", &scan.copy_keyword),
        ("scan.publish_keyword", &scan.publish_keyword),
    ] {
        if value.is_empty() {
            bail!("{} must not be empty", key);
        }
    }
    if scan.connect_timeout_secs == 0 || scan.command_timeout_secs == 0 {
        bail!("scan timeouts must be > 0");
    }

    // Validate proxy sources
    for (i, proxy) in config.proxy.iter().enumerate() {
        if proxy.base_url.trim().is_empty() {
            bail!("proxy[{}].base_url must not be empty", i);
        }
        if proxy.config_path.trim().is_empty() {
            bail!("proxy[{}].config_path must not be empty", i);
        }
    }
    if !config.proxy.is_empty() && config.cluster.is_none() {
        bail!("[cluster] must be configured when [[proxy]] sources are listed");
    }

    Ok(config)
}
