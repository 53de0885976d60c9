//! The downstream metrics client.
//!
//! [`Transport`] is whatever actually ships metrics onward, typically a
//! statsd or dogstatsd client. The collector calls `increment_by` and
//! `decrement_by` with aggregated totals and forwards everything else
//! unchanged. A failing call is not retried; the collector logs it, counts it
//! in `tally_transport_errors` and carries on with the next metric.

use std::fmt;

/// Error returned by a [`Transport`] call.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A downstream metrics client
pub trait Transport: fmt::Debug + Send + Sync {
    /// Report an increase of `value` to `metric`.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn increment_by(&self, metric: &str, value: f64, tags: Option<&[&str]>) -> Result<(), Error>;

    /// Report a decrease of `value` to `metric`.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn decrement_by(&self, metric: &str, value: f64, tags: Option<&[&str]>) -> Result<(), Error>;

    /// Report a timing, in milliseconds. Ignored unless overridden.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn timing(
        &self,
        _metric: &str,
        _millis: f64,
        _sample: Option<f64>,
        _tags: Option<&[&str]>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Report a gauge value. Ignored unless overridden.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn gauge(
        &self,
        _metric: &str,
        _value: f64,
        _sample: Option<f64>,
        _tags: Option<&[&str]>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Report a histogram sample. Ignored unless overridden.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn histogram(
        &self,
        _metric: &str,
        _value: f64,
        _sample: Option<f64>,
        _tags: Option<&[&str]>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Report a member of a set. Ignored unless overridden.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn set(
        &self,
        _metric: &str,
        _value: &str,
        _sample: Option<f64>,
        _tags: Option<&[&str]>,
    ) -> Result<(), Error> {
        Ok(())
    }
}
