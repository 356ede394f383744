//! The resolved configuration of one check invocation.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use color_eyre::{
    eyre::{bail, eyre, WrapErr},
    Report,
};

use crate::check::{Criteria, LabelFilter};
use crate::cli::Cli;
use crate::config_file::{parse_config, FileConfig};
use crate::Thresholds;

pub const DEFAULT_URL: &str = "http://localhost:9182/metrics";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub endpoint: Endpoint,
    pub criteria: Criteria,
}

/// Where and how to scrape.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub basic_auth: Option<BasicAuth>,
    pub client_tls: Option<ClientTls>,
    pub insecure_skip_verify: bool,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            basic_auth: None,
            client_tls: None,
            insecure_skip_verify: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Client certificate, key and CA bundle for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTls {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub cacert: PathBuf,
}

impl CheckConfig {
    /// Load the config file named on the command line, if any, and resolve against it.
    pub fn from_cli(cli: Cli) -> Result<Self, Report> {
        let file = match &cli.config {
            Some(path) => parse_config(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Merge command line and file values, command line first, and validate the result.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self, Report> {
        let url = cli
            .url
            .or(file.url)
            .unwrap_or_else(|| DEFAULT_URL.to_owned());
        if url.trim().is_empty() {
            bail!("--url must not be empty");
        }

        let metric = cli
            .metric
            .or(file.metric)
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| eyre!("--metric is required"))?;

        let thresholds = Thresholds {
            value: cli.value.or(file.value),
            min: cli.min.or(file.min),
            max: cli.max.or(file.max),
        };
        if thresholds.is_empty() {
            bail!("at least one of --min, --max or --value is required");
        }

        let mut labels: Vec<LabelFilter> = file
            .labels
            .iter()
            .map(|(name, value)| LabelFilter::new(name, value))
            .collect();
        for label in &cli.labels {
            labels.push(label.parse::<LabelFilter>().wrap_err("invalid --label")?);
        }

        let user = cli.user.or(file.user).unwrap_or_default();
        let password = cli.password.or(file.password).unwrap_or_default();
        let basic_auth = (!user.is_empty() && !password.is_empty())
            .then_some(BasicAuth { user, password });

        let non_empty = |p: Option<PathBuf>| p.filter(|p| !p.as_os_str().is_empty());
        let client_tls = match (
            non_empty(cli.cert.or(file.cert)),
            non_empty(cli.key.or(file.key)),
            non_empty(cli.cacert.or(file.cacert)),
        ) {
            (None, None, None) => None,
            (Some(cert), Some(key), Some(cacert)) => Some(ClientTls { cert, key, cacert }),
            _ => bail!("--cert, --key and --cacert must be used together"),
        };

        let timeout = match (cli.timeout, file.timeout) {
            (Some(timeout), _) => timeout,
            (None, Some(timeout)) => timeout
                .to_std()
                .wrap_err("timeout in config file must not be negative")?,
            (None, None) => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            endpoint: Endpoint {
                url,
                basic_auth,
                client_tls,
                insecure_skip_verify: cli.insecure_skip_verify
                    || file.insecure_skip_verify.unwrap_or(false),
                timeout,
            },
            criteria: Criteria {
                metric,
                labels,
                thresholds,
            },
        })
    }
}
