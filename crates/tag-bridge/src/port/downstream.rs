//! Downstream port: the request queue and the side that forwards requests
//! to the responding agent.

use tracing::{debug, trace};

use super::{PortTiming, Requestor, Responder, UpstreamPort};
use crate::{
    BridgeError, Direction, RequestState, RequestStateTable, Scheduler, Side, Tick, Transaction,
    TransmitQueue,
};

/// Forwards admitted requests to the downstream agent and hands its
/// responses back to the upstream port.
#[derive(Debug)]
pub struct DownstreamPort<T, D> {
    name: String,
    peer: Option<D>,
    timing: PortTiming,
    req_queue: TransmitQueue<T>,
}

impl<T, D> DownstreamPort<T, D>
where
    T: Transaction,
    D: Responder<T>,
{
    /// Creates an unbound port queueing at most `req_limit` requests.
    #[must_use]
    pub fn new(name: String, timing: PortTiming, req_limit: usize) -> Self {
        Self {
            name,
            peer: None,
            timing,
            req_queue: TransmitQueue::new(Direction::Request, req_limit),
        }
    }

    /// Port name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds the downstream agent, returning any previously bound agent.
    pub fn bind(&mut self, peer: D) -> Option<D> {
        self.peer.replace(peer)
    }

    /// Returns `true` when an agent is bound.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    /// Bound agent, if any.
    #[must_use]
    pub const fn peer(&self) -> Option<&D> {
        self.peer.as_ref()
    }

    /// Bound agent, if any.
    pub fn peer_mut(&mut self) -> Option<&mut D> {
        self.peer.as_mut()
    }

    fn bound_peer(&mut self) -> Result<&mut D, BridgeError> {
        self.peer.as_mut().ok_or(BridgeError::Unconnected {
            side: Side::Downstream,
        })
    }

    /// Requests queued for the downstream agent.
    #[must_use]
    pub fn req_queue_len(&self) -> usize {
        self.req_queue.len()
    }

    /// Returns `true` when the request queue has no free slot.
    #[must_use]
    pub fn req_queue_full(&self) -> bool {
        self.req_queue.is_full()
    }

    /// Queues an admitted request, saving its source first when a response
    /// will come back.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::QueueOverflow`] when the queue is full, or
    /// [`BridgeError::DuplicateRequestState`] when the request is already in
    /// flight through this bridge.
    pub fn sched_timing_req<S: Scheduler>(
        &mut self,
        pkt: T,
        when: Tick,
        states: &mut RequestStateTable,
        sched: &mut S,
    ) -> Result<(), BridgeError> {
        let id = pkt.id();
        let orig_src = pkt.src();
        let expects_response = pkt.expects_response();
        if expects_response {
            states.insert(id, RequestState { orig_src })?;
        }
        if let Err(err) = self.req_queue.push(pkt, when, sched) {
            if expects_response {
                states.take(id)?;
            }
            return Err(err);
        }
        Ok(())
    }

    /// Accepts a response from the downstream agent.
    ///
    /// Space was reserved when the request was admitted, so this never
    /// refuses.
    ///
    /// # Errors
    ///
    /// Propagates [`UpstreamPort::sched_timing_resp`] failures.
    pub fn recv_timing_resp<U, S>(
        &mut self,
        mut pkt: T,
        upstream: &mut UpstreamPort<T, U>,
        states: &mut RequestStateTable,
        sched: &mut S,
    ) -> Result<(), BridgeError>
    where
        U: Requestor<T>,
        S: Scheduler,
    {
        debug!(port = %self.name, id = %pkt.id(), addr = pkt.addr(), "recv timing resp");
        trace!(port = %self.name, req_queue_len = self.req_queue.len(), "request queue");
        self.timing.charge(&mut pkt);
        let when = self.timing.ready_at(sched.cur_tick());
        upstream.sched_timing_resp(pkt, when, states, sched)
    }

    /// Marks the scheduled send attempt as fired and retries the head.
    ///
    /// # Errors
    ///
    /// See [`Self::try_send_timing`].
    pub fn process_send_event<U, S>(
        &mut self,
        upstream: &mut UpstreamPort<T, U>,
        sched: &mut S,
    ) -> Result<(), BridgeError>
    where
        U: Requestor<T>,
        S: Scheduler,
    {
        self.req_queue.on_send_event();
        self.try_send_timing(upstream, sched)
    }

    /// Offers the head request to the downstream agent if it is due.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unconnected`] when either agent is unbound.
    pub fn try_send_timing<U, S>(
        &mut self,
        upstream: &mut UpstreamPort<T, U>,
        sched: &mut S,
    ) -> Result<(), BridgeError>
    where
        U: Requestor<T>,
        S: Scheduler,
    {
        let Self {
            name,
            peer,
            req_queue,
            ..
        } = self;
        let peer = peer.as_mut().ok_or(BridgeError::Unconnected {
            side: Side::Downstream,
        })?;
        trace!(port = %name, queue_len = req_queue.len(), "trySend request");
        if req_queue
            .try_send(sched, |pkt| peer.recv_timing_req(pkt))
            .is_none()
        {
            return Ok(());
        }
        debug!(port = %name, "trySend request successful");

        // The stalled request may still be refused if it was waiting on the
        // response queue.
        upstream.retry_stalled_req()
    }

    /// Handles the downstream agent's retry after it refused a request.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SpuriousRetry`] when no request was refused.
    pub fn recv_req_retry<U, S>(
        &mut self,
        upstream: &mut UpstreamPort<T, U>,
        sched: &mut S,
    ) -> Result<(), BridgeError>
    where
        U: Requestor<T>,
        S: Scheduler,
    {
        self.req_queue.recv_retry()?;
        self.try_send_timing(upstream, sched)
    }

    /// Satisfies a functional read from a queued request, or updates queued
    /// requests a functional write overlaps.
    pub fn check_functional(&mut self, pkt: &mut T) -> bool {
        self.req_queue.find_functional(pkt)
    }

    /// Forwards an atomic access and returns the agent's latency.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unconnected`] when no agent is bound.
    pub fn send_atomic(&mut self, pkt: &mut T) -> Result<Tick, BridgeError> {
        Ok(self.bound_peer()?.recv_atomic(pkt))
    }

    /// Forwards a functional access.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unconnected`] when no agent is bound.
    pub fn send_functional(&mut self, pkt: &mut T) -> Result<(), BridgeError> {
        self.bound_peer()?.recv_functional(pkt);
        Ok(())
    }
}
