//! Reference memory packet implementing [`Transaction`].

use crate::{Addr, PortId, Tick, TrafficTag, Transaction, TransactionId};

/// Memory command carried by a [`Packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Command {
    /// Read request.
    ReadReq,
    /// Write request.
    WriteReq,
    /// Dirty-line writeback; never answered.
    WritebackDirty,
    /// Read response carrying data.
    ReadResp,
    /// Write acknowledgement.
    WriteResp,
}

impl Command {
    /// Returns `true` for request commands.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(self, Self::ReadReq | Self::WriteReq | Self::WritebackDirty)
    }

    /// Returns `true` for commands that require a response.
    #[must_use]
    pub const fn needs_response(self) -> bool {
        matches!(self, Self::ReadReq | Self::WriteReq)
    }

    /// Returns `true` for commands that carry a payload.
    #[must_use]
    pub const fn has_data(self) -> bool {
        matches!(self, Self::WriteReq | Self::WritebackDirty | Self::ReadResp)
    }

    /// Returns the response command paired with a request command.
    #[must_use]
    pub const fn response(self) -> Option<Self> {
        match self {
            Self::ReadReq => Some(Self::ReadResp),
            Self::WriteReq => Some(Self::WriteResp),
            Self::WritebackDirty | Self::ReadResp | Self::WriteResp => None,
        }
    }
}

/// A memory request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: TransactionId,
    cmd: Command,
    addr: Addr,
    size: u64,
    data: Option<Vec<u8>>,
    src: PortId,
    dest: Option<PortId>,
    mem_inhibit: bool,
    tag: Option<TrafficTag>,
    first_word_delay: Tick,
    last_word_delay: Tick,
}

impl Packet {
    fn new(id: TransactionId, cmd: Command, addr: Addr, size: u64, src: PortId) -> Self {
        Self {
            id,
            cmd,
            addr,
            size,
            data: None,
            src,
            dest: None,
            mem_inhibit: false,
            tag: None,
            first_word_delay: 0,
            last_word_delay: 0,
        }
    }

    /// Creates a read request.
    #[must_use]
    pub fn read(id: TransactionId, addr: Addr, size: u64, src: PortId) -> Self {
        Self::new(id, Command::ReadReq, addr, size, src)
    }

    /// Creates a write request carrying `data`.
    #[must_use]
    pub fn write(id: TransactionId, addr: Addr, data: Vec<u8>, src: PortId) -> Self {
        let mut pkt = Self::new(id, Command::WriteReq, addr, data.len() as u64, src);
        pkt.data = Some(data);
        pkt
    }

    /// Creates a writeback, which is never answered.
    #[must_use]
    pub fn writeback(id: TransactionId, addr: Addr, data: Vec<u8>, src: PortId) -> Self {
        let mut pkt = Self::new(id, Command::WritebackDirty, addr, data.len() as u64, src);
        pkt.data = Some(data);
        pkt
    }

    /// Current command.
    #[must_use]
    pub const fn cmd(&self) -> Command {
        self.cmd
    }

    /// Returns `true` once the packet has been turned into a response.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        !self.cmd.is_request()
    }

    /// Payload, if any.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Replaces the payload.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = Some(data);
    }

    /// Rewrites the source routing identity, as an interconnect hop does.
    pub const fn set_src(&mut self, src: PortId) {
        self.src = src;
    }

    /// Marks the packet as answered by another agent.
    pub const fn assert_mem_inhibit(&mut self) {
        self.mem_inhibit = true;
    }

    /// Copies the bytes this read wants out of `other` when `other` holds
    /// all of them.
    fn read_from(&mut self, other: &Self) -> bool {
        if !other.cmd.has_data() {
            return false;
        }
        let Some(source) = other.data.as_deref() else {
            return false;
        };
        let wanted = self.footprint();
        if !other.footprint().covers(wanted) {
            return false;
        }
        let Ok(offset) = usize::try_from(wanted.start() - other.addr) else {
            return false;
        };
        let Ok(len) = usize::try_from(self.size) else {
            return false;
        };
        let Some(end) = offset.checked_add(len) else {
            return false;
        };
        match source.get(offset..end) {
            Some(bytes) => {
                self.data = Some(bytes.to_vec());
                true
            }
            None => false,
        }
    }

    /// Overwrites the bytes of `other` that this write overlaps.
    fn write_into(&self, other: &mut Self) {
        let (mine, theirs) = (self.footprint(), other.footprint());
        if !other.cmd.has_data() || !mine.intersects(theirs) {
            return;
        }
        let start = mine.start().max(theirs.start());
        let last = mine.end().min(theirs.end());
        let (Ok(from), Ok(to), Ok(span)) = (
            usize::try_from(start - self.addr),
            usize::try_from(start - other.addr),
            usize::try_from(last - start),
        ) else {
            return;
        };
        let Some(len) = span.checked_add(1) else {
            return;
        };
        let (Some(source), Some(target)) = (self.data.as_deref(), other.data.as_mut()) else {
            return;
        };
        let bytes = from.checked_add(len).and_then(|end| source.get(from..end));
        let slot = to.checked_add(len).and_then(|end| target.get_mut(to..end));
        if let (Some(bytes), Some(slot)) = (bytes, slot) {
            slot.copy_from_slice(bytes);
        }
    }
}

impl Transaction for Packet {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn addr(&self) -> Addr {
        self.addr
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn needs_response(&self) -> bool {
        self.cmd.needs_response()
    }

    fn mem_inhibit_asserted(&self) -> bool {
        self.mem_inhibit
    }

    fn src(&self) -> PortId {
        self.src
    }

    fn dest(&self) -> Option<PortId> {
        self.dest
    }

    fn set_dest(&mut self, dest: PortId) {
        self.dest = Some(dest);
    }

    fn traffic_tag(&self) -> Option<TrafficTag> {
        self.tag
    }

    fn set_traffic_tag(&mut self, tag: TrafficTag) {
        self.tag = Some(tag);
    }

    fn word_delays(&self) -> (Tick, Tick) {
        (self.first_word_delay, self.last_word_delay)
    }

    fn set_word_delays(&mut self, first: Tick, last: Tick) {
        self.first_word_delay = first;
        self.last_word_delay = last;
    }

    fn check_functional(&mut self, other: &mut Self) -> bool {
        match self.cmd {
            Command::ReadReq => self.read_from(other),
            Command::WriteReq | Command::WritebackDirty => {
                self.write_into(other);
                false
            }
            Command::ReadResp | Command::WriteResp => false,
        }
    }

    fn make_response(&mut self) {
        if let Some(resp) = self.cmd.response() {
            self.cmd = resp;
        }
        if self.cmd == Command::WriteResp {
            self.data = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, Packet};
    use crate::{PortId, Transaction, TransactionId};

    #[test]
    fn only_reads_and_writes_need_responses() {
        assert!(Command::ReadReq.needs_response());
        assert!(Command::WriteReq.needs_response());
        assert!(!Command::WritebackDirty.needs_response());
        assert!(!Command::ReadResp.needs_response());
    }

    #[test]
    fn functional_read_is_served_from_covering_write() {
        let mut write = Packet::write(TransactionId(1), 0x100, vec![1, 2, 3, 4], PortId(0));
        let mut lookup = Packet::read(TransactionId(2), 0x101, 2, PortId(9));
        assert!(lookup.check_functional(&mut write));
        assert_eq!(lookup.data(), Some(&[2, 3][..]));
    }

    #[test]
    fn functional_read_ignores_partial_overlap_and_dataless_requests() {
        let mut write = Packet::write(TransactionId(1), 0x100, vec![0; 4], PortId(0));
        let mut straddling = Packet::read(TransactionId(2), 0x102, 4, PortId(9));
        assert!(!straddling.check_functional(&mut write));

        let mut read = Packet::read(TransactionId(3), 0x100, 4, PortId(0));
        let mut lookup = Packet::read(TransactionId(4), 0x100, 4, PortId(9));
        assert!(!lookup.check_functional(&mut read));
    }

    #[test]
    fn functional_read_reaching_the_top_of_memory_does_not_overflow() {
        let mut write = Packet::write(TransactionId(1), u64::MAX - 3, vec![1, 2, 3, 4], PortId(0));
        let mut lookup = Packet::read(TransactionId(2), u64::MAX - 1, u64::MAX, PortId(9));
        assert!(!lookup.check_functional(&mut write));
        assert_eq!(lookup.data(), None);
        assert_eq!(write.data(), Some(&[1, 2, 3, 4][..]));
    }

    #[test]
    fn functional_write_updates_overlapping_bytes_only() {
        let mut queued = Packet::write(TransactionId(1), 0x100, vec![1; 8], PortId(0));
        let mut update = Packet::write(TransactionId(2), 0x0FE, vec![2, 3, 4, 5], PortId(9));
        assert!(!update.check_functional(&mut queued));
        assert_eq!(queued.data(), Some(&[4, 5, 1, 1, 1, 1, 1, 1][..]));
        assert_eq!(update.data(), Some(&[2, 3, 4, 5][..]));
        assert_eq!(update.cmd(), Command::WriteReq);

        let mut writeback =
            Packet::writeback(TransactionId(3), u64::MAX - 1, vec![6, 7], PortId(9));
        let mut top = Packet::write(TransactionId(4), u64::MAX - 3, vec![0; 4], PortId(0));
        assert!(!writeback.check_functional(&mut top));
        assert_eq!(top.data(), Some(&[0, 0, 6, 7][..]));
    }

    #[test]
    fn functional_write_leaves_reads_and_disjoint_writes_alone() {
        let mut read = Packet::read(TransactionId(1), 0x100, 8, PortId(0));
        let mut elsewhere = Packet::write(TransactionId(2), 0x200, vec![1; 8], PortId(0));
        let mut update = Packet::write(TransactionId(3), 0x100, vec![2; 8], PortId(9));
        assert!(!update.check_functional(&mut read));
        assert!(!update.check_functional(&mut elsewhere));
        assert_eq!(read.data(), None);
        assert_eq!(elsewhere.data(), Some(&[1; 8][..]));
    }

    #[test]
    fn make_response_pairs_commands() {
        let mut read = Packet::read(TransactionId(1), 0, 8, PortId(0));
        read.make_response();
        assert_eq!(read.cmd(), Command::ReadResp);
        assert!(read.is_response());

        let mut write = Packet::write(TransactionId(2), 0, vec![7; 8], PortId(0));
        write.make_response();
        assert_eq!(write.cmd(), Command::WriteResp);
        assert_eq!(write.data(), None);
    }

    #[test]
    fn src_rewrite_leaves_identity_intact() {
        let mut pkt = Packet::read(TransactionId(5), 0, 8, PortId(1));
        pkt.set_src(PortId(42));
        assert_eq!(pkt.src(), PortId(42));
        assert_eq!(pkt.id(), TransactionId(5));
    }
}
