//! Host time, as seen by the scheduler.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// HostClock tells the scheduler how much real (host) time has
/// passed since some fixed origin.  The scheduler never sleeps; the
/// program driving it decides how to wait (or not) between calls to
/// [`crate::Scheduler::run_due`].
///
/// The wall-clock implementation lives in the command-line front
/// end.  The emulator library only provides [`ManualClock`].
pub trait HostClock {
    /// Retrieves the current host time.
    fn now(&self) -> Duration;
}

/// ManualClock is a host clock which only moves when told to.  It is
/// used by tests (which need to control exactly when callbacks fire)
/// and for running the emulator as fast as possible, by jumping the
/// clock forward to the next due callback instead of sleeping.
///
/// Clones share the same time, so the driver can keep a handle after
/// giving the scheduler its own.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use cpu::{HostClock, ManualClock};
/// let clk = ManualClock::new();
/// let handle = clk.clone();
/// handle.advance(Duration::from_millis(5));
/// assert_eq!(clk.now(), Duration::from_millis(5));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> ManualClock {
        ManualClock::default()
    }

    pub fn advance(&self, interval: Duration) {
        self.now.set(self.now.get() + interval);
    }

    /// Moves the clock to `when`, unless that is in the past.
    pub fn advance_to(&self, when: Duration) {
        if when > self.now.get() {
            self.now.set(when);
        }
    }
}

impl HostClock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

#[test]
fn test_manual_clock_never_goes_backward() {
    let clk = ManualClock::new();
    clk.advance_to(Duration::from_millis(10));
    clk.advance_to(Duration::from_millis(3));
    assert_eq!(clk.now(), Duration::from_millis(10));
}
