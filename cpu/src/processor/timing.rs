//! Processor timing.
//!
//! We don't attempt to time each operator.  Instead every syllable
//! costs one cycle and every memory access six, and the processor
//! runs in slices of a fixed number of cycles.  After each slice the
//! next one is scheduled for when the real machine would have
//! finished this one.
use std::time::Duration;

/// The length of a time slice, in cycles.
pub const SLICE_CYCLES: u64 = 4000;

/// The number of cycles in one millisecond of emulated time.
pub const CYCLES_PER_MS: u64 = 1000;

/// The cost of one memory access, in cycles.
pub const MEMORY_CYCLES: u64 = 6;

/// How long to wait before the next slice, given that the slice
/// just run used `cycles` and took `elapsed` of host time.
#[must_use]
pub fn next_slice_delay_ms(cycles: u64, elapsed: Duration) -> f64 {
    let emulated_ms = cycles as f64 / CYCLES_PER_MS as f64;
    let elapsed_ms = elapsed.as_nanos() as f64 / 1e6;
    (emulated_ms - elapsed_ms).max(0.0)
}

#[test]
fn test_next_slice_delay() {
    assert_eq!(next_slice_delay_ms(4000, Duration::ZERO), 4.0);
    assert_eq!(next_slice_delay_ms(4000, Duration::from_millis(1)), 3.0);
    assert_eq!(next_slice_delay_ms(4000, Duration::from_millis(9)), 0.0);
}
