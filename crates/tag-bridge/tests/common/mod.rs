//! Stub agents and event-loop helpers shared by the bridge suites.

#![allow(dead_code)]

use tag_bridge::{
    Admission, AddrRange, Bridge, BridgeConfig, Direction, EventQueue, Packet, PortId, Requestor,
    Responder, Tick, Transaction, TransactionId,
};

pub const REQUESTOR_ID: PortId = PortId(5);

#[derive(Debug, Default)]
pub struct StubRequestor {
    pub responses: Vec<Packet>,
    pub retries: usize,
    pub ranges: Vec<AddrRange>,
    pub refuse_responses: bool,
}

impl Requestor<Packet> for StubRequestor {
    fn recv_timing_resp(&mut self, pkt: Packet) -> Admission<Packet> {
        if self.refuse_responses {
            return Admission::Refused(pkt);
        }
        self.responses.push(pkt);
        Admission::Accepted
    }

    fn recv_req_retry(&mut self) {
        self.retries += 1;
    }

    fn recv_range_change(&mut self, ranges: &[AddrRange]) {
        self.ranges = ranges.to_vec();
    }
}

#[derive(Debug, Default)]
pub struct StubResponder {
    pub requests: Vec<Packet>,
    pub refuse_requests: bool,
    pub rewrite_src: Option<PortId>,
    pub atomic_latency: Tick,
    pub atomic_seen: Vec<Packet>,
    pub functional_seen: Vec<Packet>,
}

impl Responder<Packet> for StubResponder {
    fn recv_timing_req(&mut self, mut pkt: Packet) -> Admission<Packet> {
        if self.refuse_requests {
            return Admission::Refused(pkt);
        }
        if let Some(src) = self.rewrite_src {
            pkt.set_src(src);
        }
        self.requests.push(pkt);
        Admission::Accepted
    }

    fn recv_atomic(&mut self, pkt: &mut Packet) -> Tick {
        self.atomic_seen.push(pkt.clone());
        pkt.make_response();
        self.atomic_latency
    }

    fn recv_functional(&mut self, pkt: &mut Packet) {
        self.functional_seen.push(pkt.clone());
        pkt.make_response();
    }
}

pub type TestBridge = Bridge<Packet, StubRequestor, StubResponder>;
pub type Sched = EventQueue<Direction>;

pub fn connected(config: BridgeConfig) -> TestBridge {
    let mut bridge = TestBridge::new("bridge", config).expect("valid config");
    let _ = bridge.connect_upstream(StubRequestor::default());
    let _ = bridge.connect_downstream(StubResponder::default());
    bridge.init().expect("both ports bound");
    bridge
}

pub fn read(id: u64, addr: u64) -> Packet {
    Packet::read(TransactionId(id), addr, 8, REQUESTOR_ID)
}

pub fn requestor(bridge: &TestBridge) -> &StubRequestor {
    bridge.upstream_peer().expect("upstream bound")
}

pub fn responder(bridge: &TestBridge) -> &StubResponder {
    bridge.downstream_peer().expect("downstream bound")
}

pub fn responder_mut(bridge: &mut TestBridge) -> &mut StubResponder {
    bridge.downstream_peer_mut().expect("downstream bound")
}

/// Runs every scheduled send attempt due at or before `until`.
pub fn run_until(bridge: &mut TestBridge, sched: &mut Sched, until: Tick) {
    while sched.peek_tick().is_some_and(|tick| tick <= until) {
        let (_, direction) = sched.pop().expect("peeked event");
        bridge
            .process_send(direction, sched)
            .expect("send attempt succeeds");
    }
}

/// Runs until no send attempt is pending.
pub fn drain(bridge: &mut TestBridge, sched: &mut Sched) {
    run_until(bridge, sched, Tick::MAX);
}

/// Turns every request the responder holds into a response and returns it
/// through the bridge.
pub fn respond_all(bridge: &mut TestBridge, sched: &mut Sched) {
    let pending: Vec<Packet> = responder_mut(bridge).requests.drain(..).collect();
    for mut pkt in pending {
        if pkt.expects_response() {
            pkt.make_response();
            bridge
                .recv_timing_resp(pkt, sched)
                .expect("response matches a forwarded request");
        }
    }
}
