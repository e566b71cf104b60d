//! Traffic generator and memory model bound to either side of the bridge.

use std::collections::{HashMap, VecDeque};

use tag_bridge::{
    Addr, AddrRange, Admission, Command, Packet, PortId, Requestor, Responder, Tick, Transaction,
    TransactionId,
};
use tracing::{debug, warn};

use crate::scenario::{AccessKind, AccessMode, TrafficItem};

/// Routing identity of the generator's port.
pub const GENERATOR_PORT: PortId = PortId(0);

/// An access waiting to be issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Packet to offer.
    pub pkt: Packet,
    /// Earliest issue tick.
    pub at: Tick,
    /// Issue protocol.
    pub mode: AccessMode,
}

impl Issue {
    fn from_item(id: TransactionId, item: &TrafficItem) -> Self {
        let pkt = match item.kind {
            AccessKind::Read => Packet::read(id, item.addr, item.size, GENERATOR_PORT),
            AccessKind::Write => Packet::write(id, item.addr, fill(item), GENERATOR_PORT),
            AccessKind::Writeback => Packet::writeback(id, item.addr, fill(item), GENERATOR_PORT),
        };
        Self {
            pkt,
            at: item.at,
            mode: item.mode,
        }
    }
}

fn fill(item: &TrafficItem) -> Vec<u8> {
    usize::try_from(item.size).map_or_else(|_| Vec::new(), |len| vec![item.fill; len])
}

/// Upstream agent issuing scenario traffic in order.
///
/// A refused request is held at the head until the bridge sends a retry;
/// nothing behind it is issued meanwhile.
#[derive(Debug, Default)]
pub struct TrafficGenerator {
    pending: VecDeque<Issue>,
    awaiting_retry: bool,
    retry_received: bool,
    retries: usize,
    responses: Vec<Packet>,
    ranges: Vec<AddrRange>,
}

impl TrafficGenerator {
    /// Creates a generator for `items`, numbering transactions from one.
    #[must_use]
    pub fn new(items: &[TrafficItem]) -> Self {
        let pending = items
            .iter()
            .zip(1..)
            .map(|(item, id)| Issue::from_item(TransactionId(id), item))
            .collect();
        Self {
            pending,
            ..Self::default()
        }
    }

    /// Next access to issue, if it is due and the generator is not stalled.
    pub fn next_due(&mut self, now: Tick) -> Option<Issue> {
        if self.awaiting_retry {
            return None;
        }
        if self.pending.front().is_some_and(|issue| issue.at <= now) {
            return self.pending.pop_front();
        }
        None
    }

    /// Puts a refused access back at the head and stalls until a retry.
    pub fn stall(&mut self, issue: Issue) {
        self.awaiting_retry = true;
        self.pending.push_front(issue);
    }

    /// Issue tick of the next access, unless stalled.
    #[must_use]
    pub fn next_issue_tick(&self) -> Option<Tick> {
        if self.awaiting_retry {
            return None;
        }
        self.pending.front().map(|issue| issue.at)
    }

    /// Reports and clears a retry delivered since the last call.
    pub const fn take_retry(&mut self) -> bool {
        let received = self.retry_received;
        self.retry_received = false;
        received
    }

    /// Hands over responses received since the last call.
    pub fn take_responses(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.responses)
    }

    /// Accesses not yet issued.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` while a refused access waits for a retry.
    #[must_use]
    pub const fn is_stalled(&self) -> bool {
        self.awaiting_retry
    }

    /// Retries received so far.
    #[must_use]
    pub const fn retries(&self) -> usize {
        self.retries
    }

    /// Ranges advertised by the bridge.
    #[must_use]
    pub fn ranges(&self) -> &[AddrRange] {
        &self.ranges
    }
}

impl Requestor<Packet> for TrafficGenerator {
    fn recv_timing_resp(&mut self, pkt: Packet) -> Admission<Packet> {
        self.responses.push(pkt);
        Admission::Accepted
    }

    fn recv_req_retry(&mut self) {
        if !self.awaiting_retry {
            warn!("retry received with nothing stalled");
        }
        self.awaiting_retry = false;
        self.retry_received = true;
        self.retries += 1;
    }

    fn recv_range_change(&mut self, ranges: &[AddrRange]) {
        self.ranges = ranges.to_vec();
    }
}

/// Downstream agent backed by a sparse byte store.
#[derive(Debug, Default)]
pub struct MemoryModel {
    bytes: HashMap<Addr, u8>,
    latency: Tick,
    refuse_every: u32,
    offered: u32,
    refusals: usize,
    owes_retry: bool,
    in_service: VecDeque<Packet>,
    newly_accepted: usize,
}

impl MemoryModel {
    /// Creates a memory answering after `latency` ticks that refuses every
    /// `refuse_every`th timed request (never, when zero).
    #[must_use]
    pub fn new(latency: Tick, refuse_every: u32) -> Self {
        Self {
            latency,
            refuse_every,
            ..Self::default()
        }
    }

    /// Service latency in ticks.
    #[must_use]
    pub const fn latency(&self) -> Tick {
        self.latency
    }

    /// Reads `size` bytes at `addr`; unwritten bytes read as zero.
    #[must_use]
    pub fn read(&self, addr: Addr, size: u64) -> Vec<u8> {
        (0..size)
            .map(|offset| {
                self.bytes
                    .get(&addr.wrapping_add(offset))
                    .copied()
                    .unwrap_or(0)
            })
            .collect()
    }

    fn write(&mut self, addr: Addr, data: &[u8]) {
        for (addr, byte) in (addr..).zip(data) {
            self.bytes.insert(addr, *byte);
        }
    }

    fn perform(&mut self, pkt: &mut Packet) {
        match pkt.cmd() {
            Command::ReadReq => {
                let data = self.read(pkt.addr(), pkt.size());
                pkt.make_response();
                pkt.set_data(data);
            }
            Command::WriteReq | Command::WritebackDirty => {
                if let Some(data) = pkt.data().map(<[u8]>::to_vec) {
                    self.write(pkt.addr(), &data);
                }
                pkt.make_response();
            }
            Command::ReadResp | Command::WriteResp => {}
        }
    }

    /// Number of requests accepted since the last call.
    pub const fn take_newly_accepted(&mut self) -> usize {
        let count = self.newly_accepted;
        self.newly_accepted = 0;
        count
    }

    /// Completes the oldest request in service, producing its response.
    ///
    /// Requests that expect no response are performed and dropped; `None`
    /// is returned for them.
    pub fn complete_next(&mut self) -> Option<Packet> {
        let mut pkt = self.in_service.pop_front()?;
        let expects = pkt.expects_response();
        self.perform(&mut pkt);
        expects.then_some(pkt)
    }

    /// Reports and clears a retry owed to the bridge.
    pub const fn take_owed_retry(&mut self) -> bool {
        let owed = self.owes_retry;
        self.owes_retry = false;
        owed
    }

    /// Timed requests refused so far.
    #[must_use]
    pub const fn refusals(&self) -> usize {
        self.refusals
    }
}

impl Responder<Packet> for MemoryModel {
    fn recv_timing_req(&mut self, pkt: Packet) -> Admission<Packet> {
        self.offered = self.offered.wrapping_add(1);
        if self.refuse_every != 0 && self.offered.is_multiple_of(self.refuse_every) {
            debug!(id = %pkt.id(), "memory refused request");
            self.refusals += 1;
            self.owes_retry = true;
            return Admission::Refused(pkt);
        }
        self.in_service.push_back(pkt);
        self.newly_accepted += 1;
        Admission::Accepted
    }

    fn recv_atomic(&mut self, pkt: &mut Packet) -> Tick {
        self.perform(pkt);
        self.latency
    }

    fn recv_functional(&mut self, pkt: &mut Packet) {
        self.perform(pkt);
    }
}
