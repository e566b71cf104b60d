//! Tagging bridge: an upstream and a downstream port joined by bounded
//! request and response queues.

use tracing::debug;

use crate::port::{DownstreamPort, PortTiming, Requestor, Responder, RetryState, UpstreamPort};
use crate::{
    Addr, AddrRange, Admission, BridgeConfig, BridgeError, Direction, RequestStateTable,
    Scheduler, Side, Tick, TrafficTag, Transaction,
};

/// A bridge between one upstream and one downstream agent.
///
/// Timed requests are admitted only when both the request queue and a
/// response slot are available; refused requests are owed a retry. Every
/// admitted request is tagged with the configured traffic tag.
#[derive(Debug)]
pub struct Bridge<T, U, D> {
    name: String,
    upstream: UpstreamPort<T, U>,
    downstream: DownstreamPort<T, D>,
    states: RequestStateTable,
    tag_base_addr: Addr,
}

impl<T, U, D> Bridge<T, U, D>
where
    T: Transaction,
    U: Requestor<T>,
    D: Responder<T>,
{
    /// Creates an unconnected bridge.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when `config` does not validate.
    pub fn new(name: impl Into<String>, config: BridgeConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        let name = name.into();
        let clock = config.clock();
        let upstream = UpstreamPort::new(
            format!("{name}.upstream"),
            PortTiming::new(clock, config.request_delay, config.timing_hints),
            config.response_queue_capacity,
            config.traffic_tag,
            config.ranges,
        );
        let downstream = DownstreamPort::new(
            format!("{name}.downstream"),
            PortTiming::new(clock, config.response_delay, config.timing_hints),
            config.request_queue_capacity,
        );
        Ok(Self {
            name,
            upstream,
            downstream,
            states: RequestStateTable::new(),
            tag_base_addr: config.tag_base_addr,
        })
    }

    /// Bridge name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds the agent that issues requests.
    pub fn connect_upstream(&mut self, peer: U) -> Option<U> {
        self.upstream.bind(peer)
    }

    /// Binds the agent that services requests.
    pub fn connect_downstream(&mut self, peer: D) -> Option<D> {
        self.downstream.bind(peer)
    }

    /// Returns `true` when both agents are bound.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.upstream.is_connected() && self.downstream.is_connected()
    }

    /// Checks both ports are bound and advertises the served ranges upstream.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unconnected`] naming the first unbound side.
    pub fn init(&mut self) -> Result<(), BridgeError> {
        if !self.upstream.is_connected() {
            return Err(BridgeError::Unconnected {
                side: Side::Upstream,
            });
        }
        if !self.downstream.is_connected() {
            return Err(BridgeError::Unconnected {
                side: Side::Downstream,
            });
        }
        debug!(bridge = %self.name, ranges = self.upstream.ranges().len(), "init");
        self.upstream.send_range_change()
    }

    /// Address ranges served through the bridge.
    #[must_use]
    pub fn addr_ranges(&self) -> &[AddrRange] {
        self.upstream.ranges()
    }

    /// Tag attached to every request crossing the bridge.
    #[must_use]
    pub const fn traffic_tag(&self) -> TrafficTag {
        self.upstream.traffic_tag()
    }

    /// Base address associated with the traffic tag.
    #[must_use]
    pub const fn tag_base_addr(&self) -> Addr {
        self.tag_base_addr
    }

    /// Admits a timed request from the upstream agent.
    ///
    /// A refused request is handed back; the agent must not submit anything
    /// until [`Requestor::recv_req_retry`] is called.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`BridgeError`] on protocol violations.
    pub fn recv_timing_req<S: Scheduler>(
        &mut self,
        pkt: T,
        sched: &mut S,
    ) -> Result<Admission<T>, BridgeError> {
        self.upstream
            .recv_timing_req(pkt, &mut self.downstream, &mut self.states, sched)
    }

    /// Accepts a timed response from the downstream agent.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`BridgeError`] when no request state matches.
    pub fn recv_timing_resp<S: Scheduler>(
        &mut self,
        pkt: T,
        sched: &mut S,
    ) -> Result<(), BridgeError> {
        self.downstream
            .recv_timing_resp(pkt, &mut self.upstream, &mut self.states, sched)
    }

    /// The downstream agent can now take the request it refused.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SpuriousRetry`] if no request was refused.
    pub fn recv_req_retry<S: Scheduler>(&mut self, sched: &mut S) -> Result<(), BridgeError> {
        self.downstream.recv_req_retry(&mut self.upstream, sched)
    }

    /// The upstream agent can now take the response it refused.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SpuriousRetry`] if no response was refused.
    pub fn recv_resp_retry<S: Scheduler>(&mut self, sched: &mut S) -> Result<(), BridgeError> {
        self.upstream.recv_resp_retry(&self.downstream, sched)
    }

    /// Runs the send attempt scheduled for `direction`.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`BridgeError`] on bookkeeping failures.
    pub fn process_send<S: Scheduler>(
        &mut self,
        direction: Direction,
        sched: &mut S,
    ) -> Result<(), BridgeError> {
        match direction {
            Direction::Request => self
                .downstream
                .process_send_event(&mut self.upstream, sched),
            Direction::Response => self.upstream.process_send_event(&self.downstream, sched),
        }
    }

    /// Tags and forwards an atomic access, returning the total latency.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AlreadyTagged`] for pre-tagged accesses.
    pub fn recv_atomic(&mut self, pkt: &mut T) -> Result<Tick, BridgeError> {
        self.upstream.recv_atomic(pkt, &mut self.downstream)
    }

    /// Tags and performs a functional access.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AlreadyTagged`] for pre-tagged accesses.
    pub fn recv_functional(&mut self, pkt: &mut T) -> Result<(), BridgeError> {
        self.upstream.recv_functional(pkt, &mut self.downstream)
    }

    /// Response slots currently reserved.
    #[must_use]
    pub const fn outstanding_responses(&self) -> usize {
        self.upstream.outstanding_responses()
    }

    /// Requests queued towards the downstream agent.
    #[must_use]
    pub fn request_queue_len(&self) -> usize {
        self.downstream.req_queue_len()
    }

    /// Responses queued towards the upstream agent.
    #[must_use]
    pub fn response_queue_len(&self) -> usize {
        self.upstream.resp_queue_len()
    }

    /// Admission state of the upstream port.
    #[must_use]
    pub const fn retry_state(&self) -> RetryState {
        self.upstream.retry_state()
    }

    /// Requests forwarded whose response has not yet returned.
    #[must_use]
    pub fn pending_request_states(&self) -> usize {
        self.states.len()
    }

    /// The upstream port.
    #[must_use]
    pub const fn upstream(&self) -> &UpstreamPort<T, U> {
        &self.upstream
    }

    /// The downstream port.
    #[must_use]
    pub const fn downstream(&self) -> &DownstreamPort<T, D> {
        &self.downstream
    }

    /// The bound upstream agent.
    #[must_use]
    pub const fn upstream_peer(&self) -> Option<&U> {
        self.upstream.peer()
    }

    /// The bound upstream agent.
    pub fn upstream_peer_mut(&mut self) -> Option<&mut U> {
        self.upstream.peer_mut()
    }

    /// The bound downstream agent.
    #[must_use]
    pub const fn downstream_peer(&self) -> Option<&D> {
        self.downstream.peer()
    }

    /// The bound downstream agent.
    pub fn downstream_peer_mut(&mut self) -> Option<&mut D> {
        self.downstream.peer_mut()
    }
}
