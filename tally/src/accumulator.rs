//! Running totals per metric key
//!
//! An [`Accumulator`] maps encoded keys to the sum of every value added since
//! the key was last drained. Draining hands back the non-zero totals and
//! resets them to zero in place. Entries are never removed, a zero total
//! marks an idle key.

use std::fmt;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::key::MetricKey;

/// Which downstream call a total is flushed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Flushed through `Transport::increment_by`
    Increment,
    /// Flushed through `Transport::decrement_by`
    Decrement,
}

impl Direction {
    /// Label used in logs and telemetry.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Increment => "increment",
            Direction::Decrement => "decrement",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A total taken out of an [`Accumulator`] by [`Accumulator::drain`].
#[derive(Debug, Clone, PartialEq)]
pub struct Flushed {
    /// The metric name
    pub metric: String,
    /// Sum of every value added since the previous drain
    pub value: f64,
    /// The tag list, `None` when there are no tags
    pub tags: Option<Vec<String>>,
}

impl Flushed {
    /// The tags as borrowed strings, the shape transports receive.
    #[must_use]
    pub fn tag_refs(&self) -> Option<Vec<&str>> {
        self.tags
            .as_ref()
            .map(|tags| tags.iter().map(String::as_str).collect())
    }
}

/// Totals for one direction, keyed by encoded metric key.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    totals: FxHashMap<String, f64>,
}

impl Accumulator {
    /// Create an empty `Accumulator`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` to the total for `key`. A missing key starts from zero.
    pub fn add(&mut self, key: &str, value: f64) {
        if let Some(total) = self.totals.get_mut(key) {
            *total += value;
        } else {
            self.totals.insert(key.to_string(), value);
        }
    }

    /// The current total for `key`, if the key has ever been added to.
    #[must_use]
    pub fn total(&self, key: &str) -> Option<f64> {
        self.totals.get(key).copied()
    }

    /// Number of distinct keys ever added, idle ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    /// Whether no key has ever been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Take every non-zero total, resetting each to zero.
    ///
    /// Zero totals are left alone. A key that does not decode is left alone
    /// too; it cannot be reported without a metric name.
    pub fn drain(&mut self) -> Vec<Flushed> {
        let mut flushed = Vec::new();
        for (key, total) in &mut self.totals {
            if *total == 0.0 {
                continue;
            }
            let Some(MetricKey { name, tags }) = MetricKey::decode(key) else {
                warn!(key = %key, total = *total, "skipping undecodable metric key");
                continue;
            };
            flushed.push(Flushed {
                metric: name,
                value: *total,
                tags,
            });
            *total = 0.0;
        }
        flushed
    }
}
