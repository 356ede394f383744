//! Express bounds on a metric's value.

use std::fmt;

/// A single threshold condition on a sample value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Exact(f64),
    AbsLower(f64),
    AbsUpper(f64),
}

impl Bound {
    /// Returns `true` if `value` violates the bound.
    pub fn check(&self, value: f64) -> bool {
        match self {
            Self::Exact(expected) => value != *expected,
            Self::AbsLower(lower_bound) => value < *lower_bound,
            Self::AbsUpper(upper_bound) => value > *upper_bound,
        }
    }

    pub fn limit(&self) -> f64 {
        match self {
            Self::Exact(v) | Self::AbsLower(v) | Self::AbsUpper(v) => *v,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "value {}", v),
            Self::AbsLower(v) => write!(f, "minimum {}", v),
            Self::AbsUpper(v) => write!(f, "maximum {}", v),
        }
    }
}

/// The exact-value, minimum and maximum conditions of a check. `None` means the condition was
/// not configured and is never evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Thresholds {
    pub value: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Thresholds {
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.min.is_none() && self.max.is_none()
    }

    /// The configured bounds, in exact, minimum, maximum order.
    pub fn bounds(&self) -> impl Iterator<Item = Bound> {
        [
            self.value.map(Bound::Exact),
            self.min.map(Bound::AbsLower),
            self.max.map(Bound::AbsUpper),
        ]
        .into_iter()
        .flatten()
    }
}
