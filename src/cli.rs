use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Check a metric from a Prometheus exporter against thresholds
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "check_prometheus_metric", version)]
pub struct Cli {
    /// URL to the Prometheus metrics [default: http://localhost:9182/metrics]
    #[arg(long)]
    pub url: Option<String>,

    /// Metric to check
    #[arg(long)]
    pub metric: Option<String>,

    /// Minimum value of metric
    #[arg(long, allow_negative_numbers = true)]
    pub min: Option<f64>,

    /// Maximum value of metric
    #[arg(long, allow_negative_numbers = true)]
    pub max: Option<f64>,

    /// Specific numeric value of metric
    #[arg(long, allow_negative_numbers = true)]
    pub value: Option<f64>,

    /// Limit check to metrics with a specific label, can be used multiple times
    #[arg(long = "label", value_name = "NAME:VALUE")]
    pub labels: Vec<String>,

    /// User for basic auth
    #[arg(long)]
    pub user: Option<String>,

    /// Password for basic auth
    #[arg(long)]
    pub password: Option<String>,

    /// Cert to use for mTLS
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// Key to use for mTLS
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// CA cert to use for mTLS
    #[arg(long)]
    pub cacert: Option<PathBuf>,

    /// Skip server certificate verification, e.g. for self signed certs
    #[arg(long = "insecureskipverify")]
    pub insecure_skip_verify: bool,

    /// Request timeout, e.g. "5s" or "1m" [default: 10s]
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// TOML file with defaults for any of the options above
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    duration_str::parse(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flags() {
        let cli = Cli::try_parse_from([
            "check_prometheus_metric",
            "--url",
            "https://exporter:9100/metrics",
            "--metric",
            "up",
            "--min",
            "-1.5",
            "--label",
            "job:node",
            "--label=instance: a ",
            "--insecureskipverify",
            "--timeout",
            "2s",
        ])
        .unwrap();

        assert_eq!(cli.url.as_deref(), Some("https://exporter:9100/metrics"));
        assert_eq!(cli.metric.as_deref(), Some("up"));
        assert_eq!(cli.min, Some(-1.5));
        assert_eq!(cli.max, None);
        assert_eq!(cli.labels, ["job:node", "instance: a "]);
        assert!(cli.insecure_skip_verify);
        assert_eq!(cli.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn reject_bad_values() {
        assert!(Cli::try_parse_from(["check", "--min", "low"]).is_err());
        assert!(Cli::try_parse_from(["check", "--timeout", "soon"]).is_err());
    }

    #[test]
    fn verify_command() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
