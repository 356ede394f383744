//! An optional TOML config file holding defaults for a check.
//!
//! Every key is optional; values given on the command line take precedence.
//!
//! Format of config file:
//! ```rust
//! let cfg = "
//! url = \"https://node-1:9100/metrics\"
//! metric = \"node_filesystem_avail_bytes\"
//! min = 1073741824
//! timeout = \"5s\"
//!
//! cert = \"/etc/check/client.pem\"
//! key = \"/etc/check/client.key\"
//! cacert = \"/etc/check/ca.pem\"
//!
//! [labels]
//! mountpoint = \"/\"
//! ";
//! check_prometheus_metric::parse_config_str(cfg).unwrap();
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Duration;
use color_eyre::{eyre::Context, Report};
use serde::Deserialize;

pub fn parse_config(config_file: impl AsRef<Path>) -> Result<FileConfig, Report> {
    let path = config_file.as_ref();
    let cfg = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config file {}", path.display()))?;
    parse_config_str(&cfg)
}

pub fn parse_config_str(cfg: &str) -> Result<FileConfig, Report> {
    toml::from_str::<FileConfig>(cfg)
        .wrap_err("TOML file did not match deserialization struct, or was malformed")
}

// rust toml uses serde, so we define structs to deserialize into.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub url: Option<String>,
    pub metric: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub value: Option<f64>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub cacert: Option<PathBuf>,
    pub insecure_skip_verify: Option<bool>,
    #[serde(
        default,
        deserialize_with = "duration_str::deserialize_option_duration_chrono"
    )]
    pub timeout: Option<Duration>,
}
