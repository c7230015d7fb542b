//! Host time for the command-line emulator.
use std::time::{Duration, Instant};

use cpu::HostClock;

/// WallClock measures real elapsed time since it was created, scaled
/// by a speed multiplier.  A multiplier of 2.0 makes the emulated
/// machine believe that two seconds pass for every real one.
#[derive(Debug)]
pub struct WallClock {
    origin: Instant,
    multiplier: f64,
}

impl WallClock {
    pub fn new(multiplier: f64) -> WallClock {
        WallClock {
            origin: Instant::now(),
            multiplier,
        }
    }
}

impl HostClock for WallClock {
    fn now(&self) -> Duration {
        self.origin.elapsed().mul_f64(self.multiplier)
    }
}

#[test]
fn test_wall_clock_moves_forward() {
    let clk = WallClock::new(1.0);
    let first = clk.now();
    std::thread::sleep(Duration::from_millis(2));
    assert!(clk.now() > first);
}
