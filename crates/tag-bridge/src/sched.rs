//! Event-scheduling capability the bridge needs from its host simulator.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::Tick;

/// Direction of travel through the bridge; also identifies which queue a
/// send-attempt event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Direction {
    /// Requests travelling from the upstream agent to the downstream agent.
    Request,
    /// Responses travelling from the downstream agent back upstream.
    Response,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Response => f.write_str("response"),
        }
    }
}

/// Host capability: read virtual time and schedule a send attempt.
///
/// When a scheduled attempt comes due the host calls
/// [`crate::Bridge::process_send`] with the same direction.
pub trait Scheduler {
    /// Current virtual time.
    fn cur_tick(&self) -> Tick;

    /// Requests a send attempt for `direction` at `when`.
    fn schedule_send(&mut self, direction: Direction, when: Tick);
}

#[derive(Debug)]
struct Scheduled<E> {
    when: Tick,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    // Reversed so the max-heap pops the earliest event first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .when
            .cmp(&self.when)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Deterministic discrete-event queue.
///
/// Events due at the same tick pop in scheduling order.
#[derive(Debug)]
pub struct EventQueue<E> {
    now: Tick,
    next_seq: u64,
    heap: BinaryHeap<Scheduled<E>>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    /// Creates an empty queue at tick zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: 0,
            next_seq: 0,
            heap: BinaryHeap::new(),
        }
    }

    /// Current virtual time.
    #[must_use]
    pub const fn now(&self) -> Tick {
        self.now
    }

    /// Schedules `event` at `when`; times in the past are clamped to now.
    pub fn schedule(&mut self, event: E, when: Tick) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled {
            when: when.max(self.now),
            seq,
            event,
        });
    }

    /// Removes the earliest event and advances time to it.
    pub fn pop(&mut self) -> Option<(Tick, E)> {
        let next = self.heap.pop()?;
        self.now = next.when;
        Some((next.when, next.event))
    }

    /// Tick of the earliest pending event.
    #[must_use]
    pub fn peek_tick(&self) -> Option<Tick> {
        self.heap.peek().map(|next| next.when)
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<E: From<Direction>> Scheduler for EventQueue<E> {
    fn cur_tick(&self) -> Tick {
        self.now
    }

    fn schedule_send(&mut self, direction: Direction, when: Tick) {
        self.schedule(E::from(direction), when);
    }
}
