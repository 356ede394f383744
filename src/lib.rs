//! Check one metric of a Prometheus exporter against thresholds.
//!
//! A check scrapes the exporter once, selects the samples named after the configured metric
//! and compares each against the label filters and the exact, minimum and maximum bounds. The
//! result is an [`Outcome`] whose [`Verdict`] maps to the usual monitoring plugin exit codes.
//!
//! If the metric is not present in the scrape at all, the check is OK.

pub mod bound;
pub mod check;
pub mod cli;
pub mod config;
pub mod config_file;
pub mod element;
pub mod exposition;
pub mod sample;
mod tls;
pub mod verdict;

pub use bound::{Bound, Thresholds};
pub use check::{Criteria, Evaluation, LabelFilter};
pub use cli::Cli;
pub use config::{CheckConfig, Endpoint};
pub use config_file::{parse_config, parse_config_str};
pub use element::Element;
pub use sample::Sample;
pub use verdict::{Outcome, Verdict};

use tracing_subscriber::EnvFilter;

/// Scrape the configured endpoint and evaluate the scrape. Errors before evaluation become an
/// UNKNOWN outcome.
pub async fn run(config: &CheckConfig) -> Outcome {
    let element = match Element::try_from(&config.endpoint) {
        Ok(element) => element,
        Err(err) => return Outcome::unknown(&err),
    };

    match element.scrape().await {
        Ok(samples) => config.criteria.evaluate(&samples).into(),
        Err(err) => Outcome::unknown(&err),
    }
}

/// Log to stderr, since stdout carries the check output. Filtered by `RUST_LOG`, `warn` by
/// default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
