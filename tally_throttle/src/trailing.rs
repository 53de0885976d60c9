//! Trailing-edge gate
//!
//! A [`Gate`] fires once, a fixed delay after the first arming in a quiet
//! period. Arming again while the gate is armed does not push the deadline
//! back and does not schedule a second firing. Once the gate fires it is idle
//! and the next arming starts a fresh window.
//!
//! The gate itself never waits. Callers read the deadline out of
//! [`Arm::Scheduled`], wait on a [`crate::Clock`] and then call
//! [`Gate::fire`] with the generation they were handed.

use std::num::NonZeroU64;

/// Errors produced by [`Gate`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The gate was fired before its deadline.
    #[error("fired at tick {now}, before deadline {deadline}")]
    Early {
        /// The tick `fire` was called at
        now: u64,
        /// The tick the gate is armed until
        deadline: u64,
    },
    /// The gate is idle or was re-armed since the caller's generation.
    #[error("generation {0} is no longer armed")]
    Stale(u64),
}

/// The outcome of [`Gate::arm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    /// The gate was idle and is now armed. The caller is responsible for
    /// calling [`Gate::fire`] at or after `deadline` with `generation`.
    Scheduled {
        /// Tick at which the gate may fire
        deadline: u64,
        /// Identity of this arming
        generation: u64,
    },
    /// The gate was already armed. Nothing new to schedule.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Armed {
    deadline: u64,
    generation: u64,
}

/// The non-async interior of a flush timer, about which we can make proof
/// claims.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    /// Ticks between the first arming and the firing.
    delay: u64,
    /// `None` while idle.
    armed: Option<Armed>,
    /// Total number of times this gate has been scheduled.
    generation: u64,
}

impl Gate {
    /// Create a new, idle `Gate` that fires `delay` ticks after arming.
    #[must_use]
    pub fn new(delay: NonZeroU64) -> Self {
        Self {
            delay: delay.get(),
            armed: None,
            generation: 0,
        }
    }

    /// The configured delay, in ticks.
    #[must_use]
    pub fn delay(&self) -> u64 {
        self.delay
    }

    /// Whether a firing is outstanding.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// The tick the gate will fire at, if armed.
    #[must_use]
    pub fn deadline(&self) -> Option<u64> {
        self.armed.map(|a| a.deadline)
    }

    /// Arm the gate at tick `now`.
    ///
    /// Note that `now` must be an absolute value.
    pub fn arm(&mut self, now: u64) -> Arm {
        if self.armed.is_some() {
            return Arm::Pending;
        }

        self.generation = self.generation.wrapping_add(1);
        let armed = Armed {
            deadline: now.saturating_add(self.delay),
            generation: self.generation,
        };
        self.armed = Some(armed);
        Arm::Scheduled {
            deadline: armed.deadline,
            generation: armed.generation,
        }
    }

    /// Fire the gate at tick `now` on behalf of the arming `generation`. The
    /// gate is idle afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Early`] if `now` is before the deadline, the gate
    /// stays armed. Returns [`Error::Stale`] if `generation` is not the armed
    /// generation, the gate is left as it was.
    pub fn fire(&mut self, now: u64, generation: u64) -> Result<(), Error> {
        match self.armed {
            Some(armed) if armed.generation == generation => {
                if now < armed.deadline {
                    return Err(Error::Early {
                        now,
                        deadline: armed.deadline,
                    });
                }
                self.armed = None;
                Ok(())
            }
            _ => Err(Error::Stale(generation)),
        }
    }

    /// Return the gate to idle without firing. Returns whether the gate was
    /// armed.
    pub fn disarm(&mut self) -> bool {
        self.armed.take().is_some()
    }
}


#[cfg(kani)]
mod verification {
    use crate::trailing::{Arm, Gate};
    use std::num::NonZeroU64;

    // Arming an armed gate never moves its deadline.
    #[kani::proof]
    #[kani::unwind(10)] // must match `iters` below
    fn deadline_is_fixed_while_armed() {
        let delay: NonZeroU64 = kani::any();
        kani::assume(delay.get() < u64::from(u32::MAX));
        let mut gate = Gate::new(delay);

        let first: u64 = kani::any();
        kani::assume(first < u64::from(u32::MAX));
        let deadline = match gate.arm(first) {
            Arm::Scheduled { deadline, .. } => deadline,
            Arm::Pending => panic!("idle gate reported pending"),
        };

        let iters: usize = kani::any();
        kani::assume(iters < 10);
        for _ in 0..iters {
            let now: u64 = kani::any();
            if gate.arm(now) != Arm::Pending {
                panic!("armed gate scheduled twice");
            }
            if gate.deadline() != Some(deadline) {
                panic!("deadline moved");
            }
        }
    }
}
