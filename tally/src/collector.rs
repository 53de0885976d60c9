//! The aggregating front for a [`Transport`].
//!
//! A [`Collector`] sums `increment` and `decrement` calls per metric key and
//! reports each non-zero total once per flush window. The window opens on the
//! first call of a quiet period and closes `flush_delay_millis` later; calls
//! made while it is open join the pending flush without moving it. Each
//! direction has its own window.
//!
//! Without a transport every operation is a no-op, which is how metrics are
//! turned off.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use metrics::{counter, gauge};
use tally_throttle::{Arm, Clock, Gate, RealClock, trailing};
use tokio::{runtime::Handle, task::AbortHandle};
use tracing::{debug, warn};

use crate::{
    accumulator::{Accumulator, Direction, Flushed},
    config::Config,
    key::MetricKey,
    transport::{self, Transport},
};

/// Errors produced by [`Collector`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Flush timers run on tokio, a collector with a transport must be built
    /// inside a runtime.
    #[error("collector with a transport must be created within a tokio runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}

/// Everything one direction's flushes need, guarded by a single lock so that
/// accumulation and draining never interleave.
#[derive(Debug)]
struct Ledger {
    accumulator: Accumulator,
    gate: Gate,
    /// The task waiting on `gate`'s deadline, if any.
    timer: Option<AbortHandle>,
}

impl Ledger {
    fn new(config: &Config) -> Self {
        Self {
            accumulator: Accumulator::new(),
            gate: Gate::new(config.flush_delay_millis),
            timer: None,
        }
    }
}

struct Inner<C> {
    transport: Arc<dyn Transport>,
    clock: C,
    runtime: Handle,
    increment: Mutex<Ledger>,
    decrement: Mutex<Ledger>,
}

/// Aggregates counter calls and flushes them to a [`Transport`]
///
/// Cloning is cheap; clones share totals and flush windows.
pub struct Collector<C = RealClock> {
    inner: Option<Arc<Inner<C>>>,
}

impl<C> Clone for Collector<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C> fmt::Debug for Collector<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Collector");
        if let Some(inner) = &self.inner {
            s.field("transport", &inner.transport);
        }
        s.finish_non_exhaustive()
    }
}

impl Collector<RealClock> {
    /// Create a new [`Collector`] flushing to `transport` on tokio time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if `transport` is given and this is called
    /// outside of a tokio runtime.
    pub fn new(config: &Config, transport: Option<Arc<dyn Transport>>) -> Result<Self, Error> {
        Self::with_clock(config, transport, RealClock::default())
    }

    /// A collector with no transport. Every operation is a no-op.
    #[must_use]
    pub fn disabled() -> Self {
        Self { inner: None }
    }
}

impl<C> Collector<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Create a new [`Collector`] whose flush timers wait on `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if `transport` is given and this is called
    /// outside of a tokio runtime.
    pub fn with_clock(
        config: &Config,
        transport: Option<Arc<dyn Transport>>,
        clock: C,
    ) -> Result<Self, Error> {
        let Some(transport) = transport else {
            debug!("no transport configured, metrics are disabled");
            return Ok(Self { inner: None });
        };
        let runtime = Handle::try_current()?;

        Ok(Self {
            inner: Some(Arc::new(Inner {
                transport,
                clock,
                runtime,
                increment: Mutex::new(Ledger::new(config)),
                decrement: Mutex::new(Ledger::new(config)),
            })),
        })
    }

    /// Whether a transport is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Count one occurrence of `metric`, scaled up by `sample`.
    ///
    /// A `sample` in (0, 1] contributes `1 / sample`. Absent, zero or out of
    /// range sample rates contribute 1.
    pub fn increment(&self, metric: &str, sample: Option<f64>, tags: Option<&[&str]>) {
        self.add(Direction::Increment, metric, compensate(sample), tags);
    }

    /// Add `value` to `metric`, 1 when absent.
    pub fn increment_by(&self, metric: &str, value: Option<f64>, tags: Option<&[&str]>) {
        self.add(Direction::Increment, metric, value.unwrap_or(1.0), tags);
    }

    /// Count one removal from `metric`, scaled up by `sample`. See
    /// [`Collector::increment`].
    pub fn decrement(&self, metric: &str, sample: Option<f64>, tags: Option<&[&str]>) {
        self.add(Direction::Decrement, metric, compensate(sample), tags);
    }

    /// Subtract `value` from `metric`, 1 when absent.
    pub fn decrement_by(&self, metric: &str, value: Option<f64>, tags: Option<&[&str]>) {
        self.add(Direction::Decrement, metric, value.unwrap_or(1.0), tags);
    }

    /// Forward a timing, in milliseconds, without aggregation.
    pub fn timing(&self, metric: &str, millis: f64, sample: Option<f64>, tags: Option<&[&str]>) {
        if let Some(inner) = &self.inner {
            let res = inner.transport.timing(metric, millis, sample, tags);
            report("timing", metric, res);
        }
    }

    /// Forward a gauge value without aggregation.
    pub fn gauge(&self, metric: &str, value: f64, sample: Option<f64>, tags: Option<&[&str]>) {
        if let Some(inner) = &self.inner {
            let res = inner.transport.gauge(metric, value, sample, tags);
            report("gauge", metric, res);
        }
    }

    /// Forward a histogram sample without aggregation.
    pub fn histogram(&self, metric: &str, value: f64, sample: Option<f64>, tags: Option<&[&str]>) {
        if let Some(inner) = &self.inner {
            let res = inner.transport.histogram(metric, value, sample, tags);
            report("histogram", metric, res);
        }
    }

    /// Forward a set member without aggregation.
    pub fn set(&self, metric: &str, value: &str, sample: Option<f64>, tags: Option<&[&str]>) {
        if let Some(inner) = &self.inner {
            let res = inner.transport.set(metric, value, sample, tags);
            report("set", metric, res);
        }
    }

    /// Report every pending total now. Flushes already scheduled still run
    /// and report whatever accumulates in the meantime.
    pub fn flush(&self) {
        if let Some(inner) = &self.inner {
            for direction in [Direction::Increment, Direction::Decrement] {
                inner.drain(direction, false);
            }
        }
    }

    /// Cancel scheduled flushes and report every pending total now.
    ///
    /// The collector remains usable; the next call opens a fresh window.
    pub fn shutdown(&self) {
        if let Some(inner) = &self.inner {
            for direction in [Direction::Increment, Direction::Decrement] {
                inner.drain(direction, true);
            }
        }
    }

    fn add(&self, direction: Direction, metric: &str, value: f64, tags: Option<&[&str]>) {
        let Some(inner) = &self.inner else {
            return;
        };

        if !value.is_finite() {
            warn!(%direction, metric, value, "refusing non-finite value");
            counter!("tally_rejected", "direction" => direction.as_str()).increment(1);
            return;
        }
        let key = MetricKey::new(metric, tags);
        if !key.is_decodable() {
            warn!(%direction, metric, ?tags, "refusing metric that cannot be encoded");
            counter!("tally_rejected", "direction" => direction.as_str()).increment(1);
            return;
        }
        if !key.round_trips() {
            warn!(%direction, metric, ?tags, "tags will not survive encoding unchanged");
        }

        Inner::add(inner, direction, &key.encode(), value);
    }
}

impl<C> Inner<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn ledger(&self, direction: Direction) -> MutexGuard<'_, Ledger> {
        let ledger = match direction {
            Direction::Increment => &self.increment,
            Direction::Decrement => &self.decrement,
        };
        ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(this: &Arc<Self>, direction: Direction, key: &str, value: f64) {
        let mut ledger = this.ledger(direction);
        ledger.accumulator.add(key, value);

        match ledger.gate.arm(this.clock.ticks_elapsed()) {
            Arm::Pending => {}
            Arm::Scheduled {
                deadline,
                generation,
            } => {
                debug!(%direction, deadline, "flush scheduled");
                let inner = Arc::clone(this);
                let task = this.runtime.spawn(async move {
                    inner.flush_at(direction, deadline, generation).await;
                });
                ledger.timer = Some(task.abort_handle());
            }
        }
    }

    async fn flush_at(&self, direction: Direction, deadline: u64, generation: u64) {
        loop {
            self.clock.wait_until(deadline).await;
            let flushed = {
                let mut ledger = self.ledger(direction);
                match ledger.gate.fire(self.clock.ticks_elapsed(), generation) {
                    Ok(()) => {
                        ledger.timer = None;
                        take(direction, &mut ledger)
                    }
                    Err(trailing::Error::Early { .. }) => continue,
                    Err(trailing::Error::Stale(_)) => {
                        debug!(%direction, generation, "scheduled flush was cancelled");
                        return;
                    }
                }
            };
            self.emit(direction, &flushed);
            return;
        }
    }

    /// Drain `direction` immediately, optionally cancelling its scheduled
    /// flush first.
    fn drain(&self, direction: Direction, cancel: bool) {
        let flushed = {
            let mut ledger = self.ledger(direction);
            if cancel {
                if ledger.gate.disarm() {
                    debug!(%direction, "cancelling scheduled flush");
                }
                if let Some(timer) = ledger.timer.take() {
                    timer.abort();
                }
            }
            take(direction, &mut ledger)
        };
        self.emit(direction, &flushed);
    }

    fn emit(&self, direction: Direction, flushed: &[Flushed]) {
        let call = match direction {
            Direction::Increment => "increment_by",
            Direction::Decrement => "decrement_by",
        };

        let mut emitted: u64 = 0;
        for f in flushed {
            let tags = f.tag_refs();
            let res = match direction {
                Direction::Increment => {
                    self.transport
                        .increment_by(&f.metric, f.value, tags.as_deref())
                }
                Direction::Decrement => {
                    self.transport
                        .decrement_by(&f.metric, f.value, tags.as_deref())
                }
            };
            if res.is_ok() {
                emitted += 1;
            }
            report(call, &f.metric, res);
        }
        counter!("tally_emitted", "direction" => direction.as_str()).increment(emitted);
    }
}

fn take(direction: Direction, ledger: &mut Ledger) -> Vec<Flushed> {
    let flushed = ledger.accumulator.drain();
    counter!("tally_flushes", "direction" => direction.as_str()).increment(1);
    gauge!("tally_keys", "direction" => direction.as_str()).set(ledger.accumulator.len() as f64);
    flushed
}

fn report(call: &'static str, metric: &str, res: Result<(), transport::Error>) {
    if let Err(err) = res {
        warn!(call, metric, error = %err, "transport call failed");
        counter!("tally_transport_errors", "call" => call).increment(1);
    }
}

fn compensate(sample: Option<f64>) -> f64 {
    match sample {
        None => 1.0,
        Some(s) if s > 0.0 && s <= 1.0 => 1.0 / s,
        Some(s) => {
            if s != 0.0 {
                debug!(sample = s, "sample rate outside (0, 1], counting as 1");
            }
            1.0
        }
    }
}
