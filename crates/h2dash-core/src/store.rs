//! Metric store
//!
//! Latest known value per metric, shared between the poll task (single
//! writer) and any number of render readers.

use std::sync::{PoisonError, RwLock};
use thiserror::Error;

use crate::metric::Metric;

/// A wire literal that matched a pattern but is not a usable number
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    /// The literal does not parse to a finite number
    #[error("Malformed {metric} value: {raw:?}")]
    Malformed {
        /// Metric the literal was meant for
        metric: Metric,
        /// Literal as received
        raw: String,
    },
}

/// Point-in-time copy of every metric's current value
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricValues {
    values: [Option<f64>; Metric::COUNT],
}

impl MetricValues {
    /// Current value of `metric`, `None` until the first reading
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values[metric.index()]
    }

    /// Iterate all metrics in display order
    pub fn iter(&self) -> impl Iterator<Item = (Metric, Option<f64>)> + '_ {
        Metric::ALL.iter().map(move |&m| (m, self.get(m)))
    }

    /// True if no metric has been observed yet
    pub fn is_unset(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

/// Thread-safe holder of the latest value per metric
#[derive(Debug, Default)]
pub struct MetricStore {
    values: RwLock<MetricValues>,
}

impl MetricStore {
    /// Store with every metric unset
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw wire literal and store it.
    ///
    /// On error the previous value is left untouched.
    pub fn update(&self, metric: Metric, raw: &str) -> Result<f64, ValueError> {
        let value = raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ValueError::Malformed {
                metric,
                raw: raw.to_string(),
            })?;
        self.set(metric, value);
        Ok(value)
    }

    /// Store an already-parsed value. Out-of-range values are kept as is;
    /// only the gauge fraction is clamped.
    pub fn set(&self, metric: Metric, value: f64) {
        // A poisoned lock still holds whole f64s, so keep serving it
        let mut guard = self.values.write().unwrap_or_else(PoisonError::into_inner);
        guard.values[metric.index()] = Some(value);
    }

    /// Current value of one metric
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.snapshot().get(metric)
    }

    /// Consistent copy of all metrics
    pub fn snapshot(&self) -> MetricValues {
        *self.values.read().unwrap_or_else(PoisonError::into_inner)
    }
}
