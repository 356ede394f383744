//! Evaluate scraped samples against the configured metric, label filters and thresholds.
//!
//! Every sample named after the checked metric is tested against each label filter and each
//! configured bound independently; every violation is one failure and one message. A metric
//! that is absent from the scrape is *not* a failure: with no matching samples the check is OK.

use std::str::FromStr;

use color_eyre::{eyre::eyre, Report};
use tracing::debug;

use crate::sample::{LabelSet, Sample};
use crate::verdict::{Outcome, Verdict};
use crate::Thresholds;

/// A `name:value` label restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    pub name: String,
    pub value: String,
}

impl LabelFilter {
    pub fn new(name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_owned(),
            value: value.as_ref().trim().to_owned(),
        }
    }

    /// A label absent from the sample compares as the empty string.
    pub fn matches(&self, labels: &LabelSet) -> bool {
        labels.get(&self.name).unwrap_or_default() == self.value
    }
}

impl FromStr for LabelFilter {
    type Err = Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once(':')
            .ok_or_else(|| eyre!("label filter {:?} is not of the form name:value", s))?;
        let filter = Self::new(name, value);
        if filter.name.is_empty() {
            return Err(eyre!("label filter {:?} has an empty label name", s));
        }
        Ok(filter)
    }
}

/// What to look for in a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    pub metric: String,
    pub labels: Vec<LabelFilter>,
    pub thresholds: Thresholds,
}

/// Failures counted over all matching samples, with one message per failure (or a single
/// confirmation message when there were none).
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub failures: usize,
    pub messages: Vec<String>,
}

impl Evaluation {
    pub fn verdict(&self) -> Verdict {
        if self.failures > 0 {
            Verdict::Critical
        } else {
            Verdict::Ok
        }
    }
}

impl From<Evaluation> for Outcome {
    fn from(value: Evaluation) -> Self {
        Outcome::new(value.verdict(), value.messages)
    }
}

impl Criteria {
    /// Number of label filters matching the sample's labels.
    pub fn matched_labels(&self, labels: &LabelSet) -> usize {
        self.labels.iter().filter(|f| f.matches(labels)).count()
    }

    pub fn evaluate(&self, samples: &[Sample]) -> Evaluation {
        let mut failures = 0;
        let mut messages = Vec::new();

        for sample in samples.iter().filter(|s| s.metric_name() == self.metric) {
            let Sample { labels, value, .. } = sample;
            debug!(sample = %labels, value, "evaluating sample");

            // label mismatch does not skip the bounds below
            if self.matched_labels(labels) < self.labels.len() {
                messages.push(format!(
                    "Metric {} does not match all specified labels",
                    labels
                ));
                failures += 1;
            }

            for bound in self.thresholds.bounds() {
                if bound.check(*value) {
                    debug!(sample = %labels, value, limit = bound.limit(), "bound violated");
                    messages.push(format!(
                        "Metric {} is at {}. Check requires {}",
                        labels, value, bound
                    ));
                    failures += 1;
                }
            }
        }

        if failures == 0 {
            messages.push(format!("Metric {} is within required value", self.metric));
        }
        Evaluation { failures, messages }
    }
}
