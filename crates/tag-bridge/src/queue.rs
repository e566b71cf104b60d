//! Directional bounded transmit queue shared by both bridge ports.

use std::collections::VecDeque;

use tracing::trace;

use crate::{Admission, BridgeError, Direction, Scheduler, Tick, Transaction};

/// A queued transaction and the earliest tick it may leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredItem<T> {
    /// Queued transaction.
    pub txn: T,
    /// Earliest permissible departure time.
    pub ready: Tick,
}

/// FIFO of deferred transactions with a fixed capacity and the send-attempt
/// bookkeeping of one direction.
#[derive(Debug)]
pub struct TransmitQueue<T> {
    direction: Direction,
    items: VecDeque<DeferredItem<T>>,
    capacity: usize,
    send_scheduled: bool,
    awaiting_retry: bool,
}

impl<T: Transaction> TransmitQueue<T> {
    /// Creates an empty queue holding at most `capacity` items.
    #[must_use]
    pub fn new(direction: Direction, capacity: usize) -> Self {
        Self {
            direction,
            items: VecDeque::new(),
            capacity,
            send_scheduled: false,
            awaiting_retry: false,
        }
    }

    /// Direction this queue carries.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` when no further item fits.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Returns `true` while a refused handoff waits for the peer's retry.
    #[must_use]
    pub const fn awaiting_retry(&self) -> bool {
        self.awaiting_retry
    }

    /// Returns `true` while a send attempt is scheduled with the host.
    #[must_use]
    pub const fn send_scheduled(&self) -> bool {
        self.send_scheduled
    }

    /// Queued transactions in departure order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|item| &item.txn)
    }

    /// Appends `txn`, scheduling a send attempt at `ready` if the queue was
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::QueueOverflow`] when the queue is already full.
    pub fn push<S: Scheduler>(
        &mut self,
        txn: T,
        ready: Tick,
        sched: &mut S,
    ) -> Result<(), BridgeError> {
        if self.is_full() {
            return Err(BridgeError::QueueOverflow {
                direction: self.direction,
                capacity: self.capacity,
            });
        }
        if self.items.is_empty() && !self.send_scheduled {
            sched.schedule_send(self.direction, ready);
            self.send_scheduled = true;
        }
        self.items.push_back(DeferredItem { txn, ready });
        Ok(())
    }

    /// Marks the scheduled send attempt as having fired.
    pub const fn on_send_event(&mut self) {
        self.send_scheduled = false;
    }

    /// Offers the head to `handoff` if it is due.
    ///
    /// On acceptance the head is removed and the next attempt is scheduled at
    /// the later of its ready time and now. On refusal the head stays in place
    /// and the queue waits for the peer's retry. Returns the departed item's
    /// ready time on success.
    pub fn try_send<S, F>(&mut self, sched: &mut S, handoff: F) -> Option<Tick>
    where
        S: Scheduler,
        F: FnOnce(T) -> Admission<T>,
    {
        let now = sched.cur_tick();
        let due = self.items.front().is_some_and(|head| head.ready <= now);
        if !due {
            if let Some(head) = self.items.front() {
                if !self.send_scheduled {
                    sched.schedule_send(self.direction, head.ready);
                    self.send_scheduled = true;
                }
            }
            trace!(direction = %self.direction, queue_len = self.items.len(), "nothing due to send");
            return None;
        }
        let DeferredItem { txn, ready } = self.items.pop_front()?;
        match handoff(txn) {
            Admission::Accepted => {
                if let Some(next) = self.items.front() {
                    if !self.send_scheduled {
                        sched.schedule_send(self.direction, next.ready.max(now));
                        self.send_scheduled = true;
                    }
                }
                Some(ready)
            }
            Admission::Refused(txn) => {
                self.items.push_front(DeferredItem { txn, ready });
                self.awaiting_retry = true;
                None
            }
        }
    }

    /// Consumes the peer's retry notification.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SpuriousRetry`] when no handoff was refused.
    pub fn recv_retry(&mut self) -> Result<(), BridgeError> {
        if !self.awaiting_retry {
            return Err(BridgeError::SpuriousRetry {
                direction: self.direction,
            });
        }
        self.awaiting_retry = false;
        Ok(())
    }

    /// Offers a functional access to every queued transaction in order.
    ///
    /// A read completes from the first transaction that covers it. A write
    /// updates every overlapping queued transaction and never completes here.
    pub fn find_functional(&mut self, access: &mut T) -> bool {
        for item in &mut self.items {
            if access.check_functional(&mut item.txn) {
                access.make_response();
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::TransmitQueue;
    use crate::{
        Admission, BridgeError, Direction, EventQueue, Packet, PortId, Scheduler, Transaction,
        TransactionId,
    };

    fn read(id: u64, addr: u64) -> Packet {
        Packet::read(TransactionId(id), addr, 8, PortId(0))
    }

    #[test]
    fn first_push_schedules_exactly_one_attempt() {
        let mut sched: EventQueue<Direction> = EventQueue::new();
        let mut queue = TransmitQueue::new(Direction::Request, 4);
        queue.push(read(1, 0), 5, &mut sched).expect("space");
        queue.push(read(2, 8), 6, &mut sched).expect("space");
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.peek_tick(), Some(5));
        assert!(queue.send_scheduled());
    }

    #[test]
    fn overflow_is_fatal() {
        let mut sched: EventQueue<Direction> = EventQueue::new();
        let mut queue = TransmitQueue::new(Direction::Response, 1);
        queue.push(read(1, 0), 0, &mut sched).expect("space");
        assert_eq!(
            queue.push(read(2, 0), 0, &mut sched),
            Err(BridgeError::QueueOverflow {
                direction: Direction::Response,
                capacity: 1
            })
        );
    }

    #[test]
    fn head_is_not_sent_before_ready() {
        let mut sched: EventQueue<Direction> = EventQueue::new();
        let mut queue = TransmitQueue::new(Direction::Request, 2);
        queue.push(read(1, 0), 10, &mut sched).expect("space");
        let sent = queue.try_send(&mut sched, |_| panic!("handoff before ready"));
        assert_eq!(sent, None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn success_schedules_next_at_later_of_ready_and_now() {
        let mut sched: EventQueue<Direction> = EventQueue::new();
        let mut queue = TransmitQueue::new(Direction::Request, 4);
        queue.push(read(1, 0), 3, &mut sched).expect("space");
        queue.push(read(2, 8), 1, &mut sched).expect("space");
        let (tick, _) = sched.pop().expect("scheduled");
        assert_eq!(tick, 3);
        queue.on_send_event();

        let mut departed = Vec::new();
        let sent = queue.try_send(&mut sched, |pkt| {
            departed.push(pkt.id());
            Admission::Accepted
        });
        assert_eq!(sent, Some(3));
        assert_eq!(departed, vec![TransactionId(1)]);
        assert_eq!(sched.pop().map(|(tick, _)| tick), Some(3));
        assert_eq!(sched.cur_tick(), 3);
    }

    #[test]
    fn refusal_keeps_head_and_waits_for_retry() {
        let mut sched: EventQueue<Direction> = EventQueue::new();
        let mut queue = TransmitQueue::new(Direction::Response, 2);
        queue.push(read(1, 0), 0, &mut sched).expect("space");
        queue.push(read(2, 8), 0, &mut sched).expect("space");
        let _ = sched.pop();
        queue.on_send_event();

        assert_eq!(queue.try_send(&mut sched, Admission::Refused), None);
        assert!(queue.awaiting_retry());
        assert_eq!(queue.iter().next().map(Transaction::id), Some(TransactionId(1)));
        assert!(sched.is_empty());

        queue.recv_retry().expect("retry owed");
        assert_eq!(
            queue.recv_retry(),
            Err(BridgeError::SpuriousRetry {
                direction: Direction::Response
            })
        );
    }

    #[test]
    fn functional_scan_completes_read_from_first_match() {
        let mut sched: EventQueue<Direction> = EventQueue::new();
        let mut queue = TransmitQueue::new(Direction::Request, 4);
        queue.push(read(1, 0x100), 0, &mut sched).expect("space");
        queue
            .push(
                Packet::write(TransactionId(2), 0x100, vec![0xAB; 8], PortId(0)),
                0,
                &mut sched,
            )
            .expect("space");

        let mut lookup = Packet::read(TransactionId(9), 0x104, 2, PortId(7));
        assert!(queue.find_functional(&mut lookup));
        assert!(lookup.is_response());
        assert_eq!(lookup.data(), Some(&[0xAB, 0xAB][..]));

        let mut miss = Packet::read(TransactionId(10), 0x200, 2, PortId(7));
        assert!(!queue.find_functional(&mut miss));
        assert!(!miss.is_response());
    }

    #[test]
    fn functional_write_updates_every_overlapping_queued_write() {
        let mut sched: EventQueue<Direction> = EventQueue::new();
        let mut queue = TransmitQueue::new(Direction::Request, 4);
        for (id, addr) in [(1, 0x100), (2, 0x104), (3, 0x200)] {
            queue
                .push(
                    Packet::write(TransactionId(id), addr, vec![1; 8], PortId(0)),
                    10,
                    &mut sched,
                )
                .expect("space");
        }

        let mut update = Packet::write(TransactionId(9), 0x102, vec![2; 4], PortId(7));
        assert!(!queue.find_functional(&mut update));
        assert!(!update.is_response());

        let data: Vec<_> = queue.iter().map(|pkt| pkt.data().map(<[u8]>::to_vec)).collect();
        assert_eq!(data[0].as_deref(), Some(&[1, 1, 2, 2, 2, 2, 1, 1][..]));
        assert_eq!(data[1].as_deref(), Some(&[2, 2, 1, 1, 1, 1, 1, 1][..]));
        assert_eq!(data[2].as_deref(), Some(&[1; 8][..]));
    }

    #[test]
    fn huge_capacity_allocates_lazily() {
        let mut sched: EventQueue<Direction> = EventQueue::new();
        let mut queue = TransmitQueue::new(Direction::Request, usize::MAX);
        assert_eq!(queue.capacity(), usize::MAX);
        assert!(!queue.is_full());
        queue.push(read(1, 0), 0, &mut sched).expect("space");
        assert_eq!(queue.len(), 1);
    }
}
