//! Upstream port: admits and tags requests, then queues their responses.

use tracing::{debug, trace};

use super::{DownstreamPort, PortTiming, Requestor, Responder, RetryState};
use crate::{
    Admission, AddrRange, BridgeError, Direction, RequestStateTable, Scheduler, Side, Tick,
    TrafficTag, Transaction, TransmitQueue,
};

/// Accepts requests from the upstream agent and returns responses to it.
///
/// Admission reserves a response slot for every request that expects a
/// response, so the response queue can never overflow.
#[derive(Debug)]
pub struct UpstreamPort<T, U> {
    name: String,
    peer: Option<U>,
    timing: PortTiming,
    resp_queue: TransmitQueue<T>,
    outstanding_responses: usize,
    retry: RetryState,
    tag: TrafficTag,
    ranges: Vec<AddrRange>,
}

impl<T, U> UpstreamPort<T, U>
where
    T: Transaction,
    U: Requestor<T>,
{
    /// Creates an unbound port with `resp_limit` response slots.
    #[must_use]
    pub fn new(
        name: String,
        timing: PortTiming,
        resp_limit: usize,
        tag: TrafficTag,
        ranges: Vec<AddrRange>,
    ) -> Self {
        Self {
            name,
            peer: None,
            timing,
            resp_queue: TransmitQueue::new(Direction::Response, resp_limit),
            outstanding_responses: 0,
            retry: RetryState::Idle,
            tag,
            ranges,
        }
    }

    /// Port name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds the upstream agent, returning any previously bound agent.
    pub fn bind(&mut self, peer: U) -> Option<U> {
        self.peer.replace(peer)
    }

    /// Returns `true` when an agent is bound.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    /// Bound agent, if any.
    #[must_use]
    pub const fn peer(&self) -> Option<&U> {
        self.peer.as_ref()
    }

    /// Bound agent, if any.
    pub fn peer_mut(&mut self) -> Option<&mut U> {
        self.peer.as_mut()
    }

    fn bound_peer(&mut self) -> Result<&mut U, BridgeError> {
        self.peer.as_mut().ok_or(BridgeError::Unconnected {
            side: Side::Upstream,
        })
    }

    /// Served address ranges.
    #[must_use]
    pub fn ranges(&self) -> &[AddrRange] {
        &self.ranges
    }

    /// Tag attached to admitted requests.
    #[must_use]
    pub const fn traffic_tag(&self) -> TrafficTag {
        self.tag
    }

    /// Current admission state.
    #[must_use]
    pub const fn retry_state(&self) -> RetryState {
        self.retry
    }

    /// Response slots currently reserved.
    #[must_use]
    pub const fn outstanding_responses(&self) -> usize {
        self.outstanding_responses
    }

    /// Responses queued for the upstream agent.
    #[must_use]
    pub fn resp_queue_len(&self) -> usize {
        self.resp_queue.len()
    }

    /// Returns `true` when every response slot is reserved.
    #[must_use]
    pub const fn resp_queue_full(&self) -> bool {
        self.outstanding_responses >= self.resp_queue.capacity()
    }

    /// Sends the served ranges to the upstream agent.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unconnected`] when no agent is bound.
    pub fn send_range_change(&mut self) -> Result<(), BridgeError> {
        let Self { peer, ranges, .. } = self;
        let peer = peer.as_mut().ok_or(BridgeError::Unconnected {
            side: Side::Upstream,
        })?;
        peer.recv_range_change(ranges);
        Ok(())
    }

    fn attach_tag(&self, pkt: &mut T) -> Result<(), BridgeError> {
        if let Some(existing) = pkt.traffic_tag() {
            return Err(BridgeError::AlreadyTagged {
                id: pkt.id(),
                existing,
            });
        }
        pkt.set_traffic_tag(self.tag);
        Ok(())
    }

    /// Admits a timed request or refuses it for lack of space.
    ///
    /// # Errors
    ///
    /// Fails if a retry is still owed to the agent, if an admitted request
    /// is already tagged, or on downstream bookkeeping errors.
    pub fn recv_timing_req<D, S>(
        &mut self,
        mut pkt: T,
        downstream: &mut DownstreamPort<T, D>,
        states: &mut RequestStateTable,
        sched: &mut S,
    ) -> Result<Admission<T>, BridgeError>
    where
        D: Responder<T>,
        S: Scheduler,
    {
        debug!(port = %self.name, id = %pkt.id(), addr = pkt.addr(), "recv timing req");
        if self.retry == RetryState::RetryPending {
            return Err(BridgeError::RequestDuringRetry);
        }
        trace!(
            port = %self.name,
            resp_queue_len = self.resp_queue.len(),
            outstanding = self.outstanding_responses,
            "response queue"
        );

        if downstream.req_queue_full() {
            debug!(port = %self.name, "request queue full");
            self.retry = RetryState::RetryPending;
            return Ok(Admission::Refused(pkt));
        }

        let expects_response = pkt.expects_response();
        if expects_response && self.resp_queue_full() {
            debug!(port = %self.name, "response queue full");
            self.retry = RetryState::RetryPending;
            return Ok(Admission::Refused(pkt));
        }

        self.attach_tag(&mut pkt)?;
        if expects_response {
            debug!(port = %self.name, "reserving space for response");
            self.outstanding_responses += 1;
        }

        self.timing.charge(&mut pkt);
        let when = self.timing.ready_at(sched.cur_tick());
        downstream.sched_timing_req(pkt, when, states, sched)?;
        Ok(Admission::Accepted)
    }

    /// Queues a response for the upstream agent, restoring the destination
    /// saved when its request was forwarded.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MissingRequestState`] when the request state is
    /// absent, or [`BridgeError::QueueOverflow`] if the queue is full.
    pub fn sched_timing_resp<S: Scheduler>(
        &mut self,
        mut pkt: T,
        when: Tick,
        states: &mut RequestStateTable,
        sched: &mut S,
    ) -> Result<(), BridgeError> {
        let req_state = states.take(pkt.id())?;
        pkt.set_dest(req_state.orig_src);
        debug!(port = %self.name, id = %pkt.id(), dest = req_state.orig_src.0, "response, new dest");
        self.resp_queue.push(pkt, when, sched)
    }

    /// Marks the scheduled send attempt as fired and retries the head.
    ///
    /// # Errors
    ///
    /// See [`Self::try_send_timing`].
    pub fn process_send_event<D, S>(
        &mut self,
        downstream: &DownstreamPort<T, D>,
        sched: &mut S,
    ) -> Result<(), BridgeError>
    where
        D: Responder<T>,
        S: Scheduler,
    {
        self.resp_queue.on_send_event();
        self.try_send_timing(downstream, sched)
    }

    /// Offers the head response to the upstream agent if it is due.
    ///
    /// # Errors
    ///
    /// Fails when no agent is bound or a departure finds no reservation.
    pub fn try_send_timing<D, S>(
        &mut self,
        downstream: &DownstreamPort<T, D>,
        sched: &mut S,
    ) -> Result<(), BridgeError>
    where
        D: Responder<T>,
        S: Scheduler,
    {
        let Self {
            name,
            peer,
            resp_queue,
            outstanding_responses,
            retry,
            ..
        } = self;
        let peer = peer.as_mut().ok_or(BridgeError::Unconnected {
            side: Side::Upstream,
        })?;
        trace!(port = %name, outstanding = *outstanding_responses, "trySend response");
        if resp_queue
            .try_send(sched, |pkt| peer.recv_timing_resp(pkt))
            .is_none()
        {
            return Ok(());
        }
        debug!(port = %name, "trySend response successful");
        *outstanding_responses = outstanding_responses
            .checked_sub(1)
            .ok_or(BridgeError::ReservationUnderflow)?;

        // A freed response slot guarantees the stalled request fits unless the
        // request queue is still full.
        if !downstream.req_queue_full() && *retry == RetryState::RetryPending {
            debug!(port = %name, "request waiting for retry, now retrying");
            *retry = RetryState::Idle;
            peer.recv_req_retry();
        }
        Ok(())
    }

    /// Handles the upstream agent's retry after it refused a response.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SpuriousRetry`] when no response was refused.
    pub fn recv_resp_retry<D, S>(
        &mut self,
        downstream: &DownstreamPort<T, D>,
        sched: &mut S,
    ) -> Result<(), BridgeError>
    where
        D: Responder<T>,
        S: Scheduler,
    {
        self.resp_queue.recv_retry()?;
        self.try_send_timing(downstream, sched)
    }

    /// Notifies the upstream agent if a request was refused.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unconnected`] when no agent is bound.
    pub fn retry_stalled_req(&mut self) -> Result<(), BridgeError> {
        if self.retry == RetryState::RetryPending {
            debug!(port = %self.name, "request waiting for retry, now retrying");
            self.retry = RetryState::Idle;
            self.bound_peer()?.recv_req_retry();
        }
        Ok(())
    }

    /// Tags `pkt` and forwards it synchronously, returning the combined
    /// latency.
    ///
    /// # Errors
    ///
    /// Fails when `pkt` is already tagged or no downstream agent is bound.
    pub fn recv_atomic<D: Responder<T>>(
        &mut self,
        pkt: &mut T,
        downstream: &mut DownstreamPort<T, D>,
    ) -> Result<Tick, BridgeError> {
        self.attach_tag(pkt)?;
        let latency = downstream.send_atomic(pkt)?;
        Ok(self.timing.delay_ticks().saturating_add(latency))
    }

    /// Tags a functional access and satisfies it from in-flight traffic when
    /// possible, otherwise forwards it downstream.
    ///
    /// # Errors
    ///
    /// Fails when `pkt` is already tagged or no downstream agent is bound.
    pub fn recv_functional<D: Responder<T>>(
        &mut self,
        pkt: &mut T,
        downstream: &mut DownstreamPort<T, D>,
    ) -> Result<(), BridgeError> {
        self.attach_tag(pkt)?;

        if self.resp_queue.find_functional(pkt) {
            trace!(port = %self.name, addr = pkt.addr(), "functional hit in response queue");
            return Ok(());
        }
        if downstream.check_functional(pkt) {
            return Ok(());
        }
        downstream.send_functional(pkt)
    }
}
