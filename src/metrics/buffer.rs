//! Ring buffer: fixed-capacity typed history of one metric.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::value::{MetricValue, ValueType};
use crate::error::AgentError;
use crate::severity::Severity;

/// Optional warn/crit thresholds assigning a severity to the most recent sample.
/// A metric with no thresholds configured is always green.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub warn: f64,
    pub crit: f64,
}

#[derive(Debug, Clone)]
struct Sample {
    value: MetricValue,
    severity: Severity,
}

#[derive(Debug, Clone)]
pub struct RingBuffer {
    capacity: usize,
    value_type: ValueType,
    unit: Option<String>,
    is_counter: bool,
    thresholds: Option<Thresholds>,
    samples: VecDeque<Sample>,
    last_type_error_logged: Option<Instant>,
}

/// A type coercion failure is reported at most once per metric per minute.
const TYPE_ERROR_LOG_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// `C = 60s / sample_period`, so a one-minute window at the configured input period.
pub fn capacity_for_period(sample_period_secs: u64) -> usize {
    if sample_period_secs == 0 {
        return 60;
    }
    (60 / sample_period_secs).max(1) as usize
}

impl RingBuffer {
    pub fn new(
        capacity: usize,
        value_type: ValueType,
        unit: Option<String>,
        is_counter: bool,
        thresholds: Option<Thresholds>,
    ) -> Self {
        Self {
            capacity: capacity.max(1),
            value_type,
            unit,
            is_counter,
            thresholds,
            samples: VecDeque::with_capacity(capacity.max(1)),
            last_type_error_logged: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn is_counter(&self) -> bool {
        self.is_counter
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Coerces `raw` to the declared type, assigns a severity from configured
    /// thresholds, and pushes it, evicting the oldest sample on overflow.
    /// Never panics: a coercion failure is reported as `AgentError::TypeError`
    /// and the sample is dropped.
    pub fn append(&mut self, metric: &str, raw: MetricValue) -> Result<(), AgentError> {
        let value = match raw.coerce(self.value_type) {
            Ok(v) => v,
            Err(reason) => {
                let should_log = match self.last_type_error_logged {
                    Some(last) => last.elapsed() >= TYPE_ERROR_LOG_INTERVAL,
                    None => true,
                };
                if should_log {
                    log::warn!("type error on metric {metric:?}: {reason}");
                    self.last_type_error_logged = Some(Instant::now());
                }
                return Err(AgentError::TypeError { metric: metric.to_string(), reason });
            }
        };
        let severity = self.severity_for(&value);
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { value, severity });
        Ok(())
    }

    fn severity_for(&self, value: &MetricValue) -> Severity {
        let Some(thresholds) = self.thresholds else {
            return Severity::Green;
        };
        let Some(x) = value.as_f64() else {
            return Severity::Green;
        };
        if x >= thresholds.crit {
            Severity::Red
        } else if x >= thresholds.warn {
            Severity::Orange
        } else {
            Severity::Green
        }
    }

    pub fn top(&self) -> Option<&MetricValue> {
        self.samples.back().map(|s| &s.value)
    }

    pub fn top_severity(&self) -> Severity {
        self.samples.back().map(|s| s.severity).unwrap_or_default()
    }

    /// For counter buffers: the delta between the two most recent raw
    /// samples, with a decrease (wrap/reset) treated as 0.
    pub fn top_delta(&self) -> Option<f64> {
        if !self.is_counter {
            return self.top().and_then(MetricValue::as_f64);
        }
        let mut it = self.samples.iter().rev();
        let top = it.next()?.value.as_f64()?;
        let prev = match it.next() {
            Some(s) => s.value.as_f64()?,
            None => return None,
        };
        Some((top - prev).max(0.0))
    }

    /// Per-interval deltas for a counter buffer, one per retained sample
    /// (the oldest sample has no predecessor in the window, so it
    /// contributes a leading zero delta), negative deltas clamped to 0.
    /// For non-counter buffers this is simply the raw numeric series.
    fn series(&self) -> Vec<f64> {
        if !self.is_counter {
            return self.samples.iter().filter_map(|s| s.value.as_f64()).collect();
        }
        let raw: Vec<f64> = self.samples.iter().filter_map(|s| s.value.as_f64()).collect();
        if raw.is_empty() {
            return Vec::new();
        }
        let mut deltas = Vec::with_capacity(raw.len());
        deltas.push(0.0);
        deltas.extend(raw.windows(2).map(|w| (w[1] - w[0]).max(0.0)));
        deltas
    }

    pub fn min(&self) -> Option<f64> {
        self.series().into_iter().fold(None, |acc, x| match acc {
            None => Some(x),
            Some(m) => Some(m.min(x)),
        })
    }

    pub fn max(&self) -> Option<f64> {
        self.series().into_iter().fold(None, |acc, x| match acc {
            None => Some(x),
            Some(m) => Some(m.max(x)),
        })
    }

    pub fn sum(&self) -> Option<f64> {
        let series = self.series();
        if series.is_empty() {
            None
        } else {
            Some(series.iter().sum())
        }
    }

    pub fn mean(&self) -> Option<f64> {
        let series = self.series();
        if series.is_empty() {
            None
        } else {
            Some(series.iter().sum::<f64>() / series.len() as f64)
        }
    }

    /// Unitless volatility: `stddev / max(|mean|, eps)` for numeric buffers;
    /// for string/bool buffers, distinct-value count over window length.
    pub fn dynamicity(&self) -> Option<f64> {
        if matches!(self.value_type, ValueType::Str | ValueType::Bool) && !self.is_counter {
            if self.samples.is_empty() {
                return None;
            }
            let distinct: HashSet<String> = self
                .samples
                .iter()
                .map(|s| s.value.to_string())
                .collect();
            return Some(distinct.len() as f64 / self.samples.len() as f64);
        }
        let series = self.series();
        if series.is_empty() {
            return None;
        }
        const EPS: f64 = 1e-9;
        let mean = series.iter().sum::<f64>() / series.len() as f64;
        let variance = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / series.len() as f64;
        Some(variance.sqrt() / mean.abs().max(EPS))
    }
}
