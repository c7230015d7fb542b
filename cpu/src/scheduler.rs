//! The adaptive callback scheduler.
//!
//! Everything in the emulator which takes time (a processor's time
//! slice, the completion of an I/O operation, the real-time clock)
//! happens in a callback which some other piece of the emulator
//! asked the scheduler to run after a delay.  The emulated machine
//! was much slower than the host, so the delays are how we keep the
//! emulation running at roughly the speed of the real hardware.
//!
//! Host timers are imprecise.  A callback asked for in 3ms may
//! arrive in 4ms or 5ms, and a run of such late callbacks would make
//! the emulated machine run slow.  So the scheduler keeps, for each
//! [`Category`] of callback, the accumulated difference between when
//! callbacks actually fired and when they were asked to fire.  Each
//! new delay is adjusted by that running deviation (by at most one
//! scheduling quantum, and never below zero), so that over many
//! callbacks the average error converges towards zero.
//!
//! Delays no longer than [`MIN_TIMEOUT_MS`] are too short for a host
//! timer to honour.  Those callbacks are not armed as timers at all;
//! they are queued to run on the next pass of [`Scheduler::run_due`],
//! after anything which was already due.
//!
//! The scheduler itself never sleeps.  The program driving it calls
//! [`Scheduler::run_due`] and then waits for (or, when running
//! unthrottled, jumps the clock forward by) the interval returned by
//! [`Scheduler::next_due_in`].
use std::collections::{BTreeMap, VecDeque};
use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};
use std::time::Duration;

use tracing::{event, Level};

use base::prelude::UnitId;

use super::clock::HostClock;
use super::types::{IoUnitId, ProcessorId};

mod timerq;

use timerq::TimerQueue;

/// Delays at or below this are run on the next pass rather than
/// being armed as a timer.
pub const MIN_TIMEOUT_MS: f64 = 4.0;

/// The largest adjustment made to any single delay.
pub const SCHEDULING_QUANTUM_MS: f64 = 4.0;

/// What a callback is for.  Deviation from the requested timing is
/// tracked separately for each category, because (for example) the
/// processor and the printer are paced independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Processor(ProcessorId),
    IoUnit(IoUnitId),
    Device(UnitId),
    TimeInterval,
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Category::Processor(p) => write!(f, "{p}"),
            Category::IoUnit(u) => write!(f, "{u}"),
            Category::Device(unit) => write!(f, "{unit}"),
            Category::TimeInterval => f.write_str("RTC"),
        }
    }
}

/// Identifies a scheduled callback, so that it can be cancelled.
/// Tokens are never reused: once a callback has fired (or been
/// cancelled) its token refers to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token {
    slot: usize,
    generation: u64,
}

pub type CallbackResult = Result<(), Box<dyn Error>>;

/// A scheduled callback.  It receives the emulator state and the
/// scheduler itself, so that it can schedule further work.
pub type Callback<T> = Box<dyn FnOnce(&mut T, &mut Scheduler<T>) -> CallbackResult>;

struct Entry<T> {
    category: Category,
    /// The time at which the caller wanted the callback to run.
    requested_at: Duration,
    callback: Callback<T>,
}

struct Slot<T> {
    generation: u64,
    entry: Option<Entry<T>>,
}

pub struct Scheduler<T> {
    clock: Box<dyn HostClock>,
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    immediate: VecDeque<Token>,
    timers: TimerQueue,
    /// Accumulated (actual - requested) firing time, in milliseconds.
    deviation: BTreeMap<Category, f64>,
    live: usize,
    fired: u64,
}

pub(crate) fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1e6
}

pub(crate) fn from_millis(ms: f64) -> Duration {
    if ms > 0.0 && ms.is_finite() {
        Duration::from_nanos((ms * 1e6).round() as u64)
    } else {
        Duration::ZERO
    }
}

/// Computes the adjustment to a requested delay, given the
/// accumulated deviation for its category.  The result never makes
/// the delay negative and is never larger than one quantum.
pub(crate) fn adjustment(deviation_ms: f64, delay_ms: f64) -> f64 {
    if deviation_ms > 0.0 {
        -deviation_ms.min(delay_ms).min(SCHEDULING_QUANTUM_MS)
    } else {
        (-deviation_ms).min(SCHEDULING_QUANTUM_MS)
    }
}

impl<T> Scheduler<T> {
    pub fn new(clock: Box<dyn HostClock>) -> Scheduler<T> {
        Scheduler {
            clock,
            slots: Vec::new(),
            free: Vec::new(),
            immediate: VecDeque::new(),
            timers: TimerQueue::new(),
            deviation: BTreeMap::new(),
            live: 0,
            fired: 0,
        }
    }

    /// The current host time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Arranges for `callback` to be called (once) about `delay_ms`
    /// milliseconds from now.
    pub fn schedule<F>(&mut self, category: Category, delay_ms: f64, callback: F) -> Token
    where
        F: FnOnce(&mut T, &mut Scheduler<T>) -> CallbackResult + 'static,
    {
        let delay_ms = if delay_ms.is_finite() {
            delay_ms.max(0.0)
        } else {
            0.0
        };
        let now = self.clock.now();
        let dev = self.deviation.get(&category).copied().unwrap_or(0.0);
        let armed_ms = delay_ms + adjustment(dev, delay_ms);
        let entry = Entry {
            category,
            requested_at: now + from_millis(delay_ms),
            callback: Box::new(callback),
        };
        let token = self.allocate(entry);
        if armed_ms <= MIN_TIMEOUT_MS {
            self.immediate.push_back(token);
        } else {
            self.timers.arm(token, now + from_millis(armed_ms));
        }
        event!(
            Level::TRACE,
            "scheduled {:?} for {}: requested {:.3}ms, armed {:.3}ms",
            token,
            category,
            delay_ms,
            armed_ms
        );
        token
    }

    fn allocate(&mut self, entry: Entry<T>) -> Token {
        self.live += 1;
        match self.free.pop() {
            Some(slot) => {
                let s = &mut self.slots[slot];
                s.entry = Some(entry);
                Token {
                    slot,
                    generation: s.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                Token {
                    slot: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Takes the entry for `token` out of its slot and recycles the
    /// slot.  Gives `None` for a token which has already fired or
    /// been cancelled.
    fn release(&mut self, token: &Token) -> Option<Entry<T>> {
        let slot = self.slots.get_mut(token.slot)?;
        if slot.generation != token.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation += 1;
        self.free.push(token.slot);
        self.live -= 1;
        Some(entry)
    }

    /// Cancels a scheduled callback.  Returns true if the callback
    /// was still pending (and now never will be called).  Cancelling
    /// a callback which already fired, or was already cancelled, does
    /// nothing.
    pub fn cancel(&mut self, token: Token) -> bool {
        match self.release(&token) {
            Some(entry) => {
                self.timers.disarm(&token);
                // Any copy of the token still in the immediate queue
                // is now stale and will be skipped.
                event!(
                    Level::TRACE,
                    "cancelled {:?} ({})",
                    token,
                    entry.category
                );
                true
            }
            None => false,
        }
    }

    /// Runs every callback which is due.  Callbacks scheduled (with a
    /// short delay) while this is running wait for the next call.
    /// Returns the number of callbacks which were run.
    pub fn run_due(&mut self, target: &mut T) -> usize {
        let mut count = 0;
        let yielded: Vec<Token> = self.immediate.drain(..).collect();
        for token in yielded {
            if self.fire(token, target) {
                count += 1;
            }
        }
        while let Some(token) = self.timers.pop_expired(self.clock.now()) {
            if self.fire(token, target) {
                count += 1;
            }
        }
        count
    }

    fn fire(&mut self, token: Token, target: &mut T) -> bool {
        let Some(entry) = self.release(&token) else {
            return false;
        };
        let now = self.clock.now();
        let late_ms = millis(now.saturating_sub(entry.requested_at))
            - millis(entry.requested_at.saturating_sub(now));
        *self.deviation.entry(entry.category).or_insert(0.0) += late_ms;
        self.fired += 1;
        if let Err(e) = (entry.callback)(target, self) {
            event!(
                Level::ERROR,
                "callback for {} failed: {}",
                entry.category,
                e
            );
        }
        true
    }

    /// How long the driver may wait before calling
    /// [`Scheduler::run_due`] again.  `None` means that nothing at
    /// all is scheduled.
    pub fn next_due_in(&self) -> Option<Duration> {
        if !self.immediate.is_empty() {
            return Some(Duration::ZERO);
        }
        let now = self.clock.now();
        self.timers
            .peek_deadline()
            .map(|deadline| deadline.saturating_sub(now))
    }

    /// True when no callbacks are pending.
    pub fn is_idle(&self) -> bool {
        self.live == 0
    }

    /// The number of callbacks waiting to run.
    pub fn pending(&self) -> usize {
        self.live
    }

    /// The accumulated timing deviation, in milliseconds, of
    /// callbacks in `category`.
    pub fn deviation_ms(&self, category: Category) -> f64 {
        self.deviation.get(&category).copied().unwrap_or(0.0)
    }

    /// The total number of callbacks run so far.
    pub fn fired(&self) -> u64 {
        self.fired
    }

    #[cfg(test)]
    pub(crate) fn armed_timers(&self) -> usize {
        self.timers.len()
    }
}

impl<T> Debug for Scheduler<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("live", &self.live)
            .field("immediate", &self.immediate.len())
            .field("timers", &self.timers.len())
            .field("deviation", &self.deviation)
            .field("fired", &self.fired)
            .finish()
    }
}

#[cfg(test)]
mod tests;
