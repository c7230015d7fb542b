use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{event, Level};

/// MinimalSleeper provides a facility for periodically sleeping such
/// that on average we sleep for the requested amount of time, even
/// though we don't necessarily sleep on every call.  The emulator's
/// main loop asks to wait for every gap between scheduler callbacks,
/// most of which are far shorter than the host can usefully sleep.
///
/// Time spent oversleeping is remembered and paid back by skipping
/// later requests.
#[derive(Debug)]
pub struct MinimalSleeper {
    /// Minimum period for which we will try to sleep.
    min_sleep: Duration,
    owed: Duration,
    overslept: Duration,
    total_cumulative_sleep: Duration,
}

impl MinimalSleeper {
    pub fn new(min_sleep: Duration) -> MinimalSleeper {
        MinimalSleeper {
            min_sleep,
            owed: Duration::ZERO,
            overslept: Duration::ZERO,
            total_cumulative_sleep: Duration::ZERO,
        }
    }

    /// Adds `duration` to the sleep debt.  Returns true if the debt
    /// is now large enough to be worth a system call.
    fn owe(&mut self, duration: Duration) -> bool {
        let wanted = self.owed + duration;
        if wanted <= self.overslept {
            self.overslept -= wanted;
            self.owed = Duration::ZERO;
        } else {
            self.owed = wanted - self.overslept;
            self.overslept = Duration::ZERO;
        }
        self.owed > self.min_sleep
    }

    /// Records that we actually slept for `slept`.
    fn settle(&mut self, slept: Duration) {
        self.total_cumulative_sleep += slept;
        if slept > self.owed {
            self.overslept += slept - self.owed;
            self.owed = Duration::ZERO;
        } else {
            self.owed -= slept;
        }
    }

    pub fn sleep(&mut self, duration: Duration) {
        if !self.owe(duration) {
            return;
        }
        let then = Instant::now();
        sleep(self.owed);
        let slept = then.elapsed();
        event!(
            Level::TRACE,
            "MinimalSleeper: owed sleep is {:?}, actually slept for {:?}",
            self.owed,
            slept
        );
        self.settle(slept);
    }
}

impl Drop for MinimalSleeper {
    fn drop(&mut self) {
        event!(
            Level::DEBUG,
            "MinimalSleeper: drop: total cumulative sleep is {:?}",
            self.total_cumulative_sleep
        );
    }
}
