use std::cmp::Reverse;
use std::time::Duration;

use keyed_priority_queue::KeyedPriorityQueue;

use super::Token;

/// Armed timers, earliest deadline first.  Timers with the same
/// deadline come out in the order in which they were armed.
#[derive(Debug)]
pub(super) struct TimerQueue {
    items: KeyedPriorityQueue<Token, Reverse<(Duration, u64)>>,
    armed: u64,
}

impl TimerQueue {
    pub(super) fn new() -> TimerQueue {
        TimerQueue {
            items: KeyedPriorityQueue::new(),
            armed: 0,
        }
    }

    pub(super) fn arm(&mut self, token: Token, deadline: Duration) {
        self.armed += 1;
        self.items.push(token, Reverse((deadline, self.armed)));
    }

    pub(super) fn peek_deadline(&self) -> Option<Duration> {
        self.items.peek().map(|(_, Reverse((deadline, _)))| *deadline)
    }

    /// Removes and returns the earliest timer if its deadline is no
    /// later than `now`.
    pub(super) fn pop_expired(&mut self, now: Duration) -> Option<Token> {
        match self.peek_deadline() {
            Some(deadline) if deadline <= now => self.items.pop().map(|(token, _)| token),
            _ => None,
        }
    }

    /// Disarms the timer for `token`, returning true if it was armed.
    pub(super) fn disarm(&mut self, token: &Token) -> bool {
        self.items.remove(token).is_some()
    }

    pub(super) fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
fn tok(slot: usize) -> Token {
    Token {
        slot,
        generation: 0,
    }
}

#[test]
fn test_timerq_empty() {
    let mut q = TimerQueue::new();
    assert!(q.is_empty());
    assert_eq!(0, q.len());
    assert_eq!(q.peek_deadline(), None);
    assert_eq!(q.pop_expired(Duration::MAX), None);
}

#[test]
fn test_timerq_ordering() {
    let mut q = TimerQueue::new();
    q.arm(tok(1), Duration::from_millis(8));
    q.arm(tok(0), Duration::from_millis(2));
    assert_eq!(q.pop_expired(Duration::from_millis(1)), None);
    assert_eq!(q.pop_expired(Duration::from_millis(5)), Some(tok(0)));
    assert_eq!(q.pop_expired(Duration::from_millis(5)), None);
    assert_eq!(q.pop_expired(Duration::from_millis(8)), Some(tok(1)));
    assert!(q.is_empty());
}

#[test]
fn test_timerq_ties_are_fifo() {
    let mut q = TimerQueue::new();
    let t = Duration::from_millis(4);
    for slot in [3, 1, 2] {
        q.arm(tok(slot), t);
    }
    assert_eq!(q.pop_expired(t), Some(tok(3)));
    assert_eq!(q.pop_expired(t), Some(tok(1)));
    assert_eq!(q.pop_expired(t), Some(tok(2)));
}

#[test]
fn test_timerq_disarm() {
    let mut q = TimerQueue::new();
    q.arm(tok(0), Duration::from_millis(2));
    assert!(q.disarm(&tok(0)));
    assert!(!q.disarm(&tok(0)));
    assert!(q.is_empty());
}
