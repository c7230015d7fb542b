use std::time::Duration;

use super::super::clock::ManualClock;
use super::super::types::ProcessorId;
use super::*;

#[derive(Debug, Default)]
struct Recorder {
    fired: Vec<(u32, Duration)>,
}

fn setup() -> (ManualClock, Scheduler<Recorder>) {
    let clk = ManualClock::new();
    let sched = Scheduler::new(Box::new(clk.clone()));
    (clk, sched)
}

fn record(tag: u32) -> impl FnOnce(&mut Recorder, &mut Scheduler<Recorder>) -> CallbackResult {
    move |rec: &mut Recorder, sched: &mut Scheduler<Recorder>| {
        rec.fired.push((tag, sched.now()));
        Ok(())
    }
}

const CPU: Category = Category::Processor(ProcessorId::P1);

#[test]
fn test_adjustment_bounds() {
    // Positive deviation shortens the delay, but never below zero.
    assert_eq!(adjustment(2.0, 10.0), -2.0);
    assert_eq!(adjustment(3.0, 1.5), -1.5);
    assert_eq!(adjustment(100.0, 50.0), -SCHEDULING_QUANTUM_MS);
    // Negative deviation lengthens it, by at most a quantum.
    assert_eq!(adjustment(-1.0, 10.0), 1.0);
    assert_eq!(adjustment(-100.0, 10.0), SCHEDULING_QUANTUM_MS);
    assert_eq!(adjustment(0.0, 10.0), 0.0);
}

#[test]
fn test_short_delay_runs_on_next_pass() {
    let (_clk, mut sched) = setup();
    let mut rec = Recorder::default();
    sched.schedule(CPU, 0.0, record(1));
    sched.schedule(CPU, 2.0, record(2));
    assert_eq!(sched.armed_timers(), 0);
    assert_eq!(sched.next_due_in(), Some(Duration::ZERO));
    assert_eq!(sched.run_due(&mut rec), 2);
    assert_eq!(rec.fired.iter().map(|(t, _)| *t).collect::<Vec<_>>(), vec![1, 2]);
    assert!(sched.is_idle());
    assert_eq!(sched.next_due_in(), None);
}

#[test]
fn test_yield_waits_for_next_pass() {
    let (_clk, mut sched) = setup();
    let mut rec = Recorder::default();
    sched.schedule(
        CPU,
        0.0,
        |rec: &mut Recorder, sched: &mut Scheduler<Recorder>| {
            rec.fired.push((1, sched.now()));
            sched.schedule(CPU, 0.0, record(2));
            Ok(())
        },
    );
    assert_eq!(sched.run_due(&mut rec), 1);
    assert_eq!(rec.fired.len(), 1);
    assert_eq!(sched.run_due(&mut rec), 1);
    assert_eq!(rec.fired.len(), 2);
}

#[test]
fn test_timer_fires_when_due() {
    let (clk, mut sched) = setup();
    let mut rec = Recorder::default();
    sched.schedule(Category::TimeInterval, 20.0, record(7));
    assert_eq!(sched.armed_timers(), 1);
    assert_eq!(sched.next_due_in(), Some(Duration::from_millis(20)));
    clk.advance(Duration::from_millis(19));
    assert_eq!(sched.run_due(&mut rec), 0);
    clk.advance(Duration::from_millis(1));
    assert_eq!(sched.run_due(&mut rec), 1);
    assert_eq!(rec.fired, vec![(7, Duration::from_millis(20))]);
}

#[test]
fn test_cancel_prevents_firing() {
    let (clk, mut sched) = setup();
    let mut rec = Recorder::default();
    let timer = sched.schedule(CPU, 50.0, record(1));
    let immediate = sched.schedule(CPU, 0.0, record(2));
    assert!(sched.cancel(timer));
    assert!(sched.cancel(immediate));
    // Cancelling twice is harmless.
    assert!(!sched.cancel(timer));
    clk.advance(Duration::from_secs(1));
    assert_eq!(sched.run_due(&mut rec), 0);
    assert!(rec.fired.is_empty());
    assert!(sched.is_idle());
}

#[test]
fn test_cancel_after_fire_is_harmless() {
    let (_clk, mut sched) = setup();
    let mut rec = Recorder::default();
    let token = sched.schedule(CPU, 0.0, record(1));
    sched.run_due(&mut rec);
    // The slot is reused by the next entry; the old token must not
    // cancel it.
    let second = sched.schedule(CPU, 0.0, record(2));
    assert!(!sched.cancel(token));
    sched.run_due(&mut rec);
    assert_eq!(rec.fired.len(), 2);
    assert!(!sched.cancel(second));
}

#[test]
fn test_cancel_always_wins_before_due() {
    let (clk, mut sched) = setup();
    let mut rec = Recorder::default();
    for i in 0..200u32 {
        let delay = f64::from(i % 17) * 1.5;
        let token = sched.schedule(CPU, delay, record(i));
        assert!(sched.cancel(token));
        clk.advance(Duration::from_millis(1));
        sched.run_due(&mut rec);
    }
    assert!(rec.fired.is_empty());
}

#[test]
fn test_failing_callback_does_not_corrupt_state() {
    let (_clk, mut sched) = setup();
    let mut rec = Recorder::default();
    sched.schedule(CPU, 0.0, |_: &mut Recorder, _: &mut Scheduler<Recorder>| {
        Err(Box::from("device exploded"))
    });
    sched.schedule(CPU, 0.0, record(2));
    assert_eq!(sched.run_due(&mut rec), 2);
    assert_eq!(rec.fired.len(), 1);
    assert!(sched.is_idle());
    assert_eq!(sched.fired(), 2);
}

/// Simulates a host whose timers always fire `latency` late, and
/// checks that the scheduler learns to compensate.
#[test]
fn test_deviation_converges() {
    let (clk, mut sched) = setup();
    let mut rec = Recorder::default();
    let latency = Duration::from_millis(3);
    let delay_ms = 10.0;
    let mut total_error_ms = 0.0;
    let rounds = 200;
    for i in 0..rounds {
        let requested = clk.now() + Duration::from_millis(10);
        sched.schedule(CPU, delay_ms, record(i));
        let wait = sched.next_due_in().expect("a callback is pending");
        clk.advance(wait + latency);
        assert_eq!(sched.run_due(&mut rec), 1);
        let (_, fired_at) = rec.fired.last().copied().expect("callback fired");
        total_error_ms += millis(fired_at) - millis(requested);
    }
    let mean = total_error_ms / f64::from(rounds);
    assert!(mean.abs() < 0.1, "mean deviation {mean}ms did not converge");
    // After the first callback the scheduler fires exactly on time.
    let (_, last) = rec.fired[rec.fired.len() - 1];
    let (_, prev) = rec.fired[rec.fired.len() - 2];
    assert_eq!(last - prev, Duration::from_millis(10));
}

/// A host which fires short timers early (the next-pass queue runs
/// as soon as the driver comes round again) is compensated by
/// lengthening later delays.
#[test]
fn test_early_firing_lengthens_delays() {
    let (clk, mut sched) = setup();
    let mut rec = Recorder::default();
    sched.schedule(CPU, 3.0, record(1));
    sched.run_due(&mut rec);
    assert!(sched.deviation_ms(CPU) < 0.0);
    // The next 3ms request is stretched beyond the minimum timeout,
    // so it gets a real timer.
    sched.schedule(CPU, 3.0, record(2));
    sched.schedule(CPU, 3.0, record(3));
    assert_eq!(sched.armed_timers(), 2);
    clk.advance(Duration::from_millis(6));
    assert_eq!(sched.run_due(&mut rec), 2);
}

#[test]
fn test_categories_are_independent() {
    let (clk, mut sched) = setup();
    let mut rec = Recorder::default();
    sched.schedule(Category::TimeInterval, 10.0, record(1));
    clk.advance(Duration::from_millis(15));
    sched.run_due(&mut rec);
    assert_eq!(sched.deviation_ms(Category::TimeInterval), 5.0);
    assert_eq!(sched.deviation_ms(CPU), 0.0);
}
