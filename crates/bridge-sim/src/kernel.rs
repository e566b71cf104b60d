//! Discrete-event loop driving one bridge between a traffic generator and a
//! memory model.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tag_bridge::{
    Admission, Bridge, BridgeError, Direction, EventQueue, Packet, RetryState, Side, Tick,
    Transaction, TransactionId,
};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::agents::{Issue, MemoryModel, TrafficGenerator};
use crate::scenario::{AccessMode, Scenario};

/// Bridge specialised to the harness agents.
pub type SimBridge = Bridge<Packet, TrafficGenerator, MemoryModel>;

/// Events dispatched by the simulation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// A bridge send attempt.
    Bridge(Direction),
    /// The generator may issue its next access.
    Issue,
    /// The memory finishes its oldest request.
    MemoryRespond,
    /// The memory can take the request it refused.
    MemoryRetry,
}

impl From<Direction> for SimEvent {
    fn from(direction: Direction) -> Self {
        Self::Bridge(direction)
    }
}

/// Failure that ends a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// The bridge reported a fatal condition.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// No event is pending but work remains.
    #[error(
        "simulation stalled at tick {tick}: {unissued} accesses unissued, \
         {outstanding} responses outstanding"
    )]
    Stalled {
        /// Tick of the last event.
        tick: Tick,
        /// Accesses the generator never issued.
        unissued: usize,
        /// Response slots still reserved in the bridge.
        outstanding: usize,
    },
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimReport {
    /// Timed requests admitted by the bridge.
    pub issued: usize,
    /// Timed responses delivered to the generator.
    pub completed: usize,
    /// Atomic accesses performed.
    pub atomic: usize,
    /// Functional accesses performed.
    pub functional: usize,
    /// Accesses dropped because no advertised range covers them.
    pub unroutable: usize,
    /// Timed requests the bridge refused.
    pub refused: usize,
    /// Retries the bridge sent to the generator.
    pub retries: usize,
    /// Timed requests the memory refused.
    pub memory_refusals: usize,
    /// Sum of timed round-trip latencies.
    pub total_latency: Tick,
    /// Longest timed round trip.
    pub max_latency: Tick,
    /// Longest atomic latency estimate.
    pub max_atomic_latency: Tick,
    /// Tag the bridge attached to its traffic.
    pub traffic_tag: u32,
    /// Tick of the last event.
    pub final_tick: Tick,
}

impl SimReport {
    /// Mean timed round-trip latency, if anything completed.
    #[must_use]
    pub fn mean_latency(&self) -> Option<Tick> {
        let completed = Tick::try_from(self.completed).ok().filter(|&n| n > 0)?;
        Some(self.total_latency / completed)
    }
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tag:              {}", self.traffic_tag)?;
        writeln!(f, "issued:           {}", self.issued)?;
        writeln!(f, "completed:        {}", self.completed)?;
        writeln!(f, "atomic:           {}", self.atomic)?;
        writeln!(f, "functional:       {}", self.functional)?;
        writeln!(f, "unroutable:       {}", self.unroutable)?;
        writeln!(f, "refused:          {}", self.refused)?;
        writeln!(f, "retries:          {}", self.retries)?;
        writeln!(f, "memory refusals:  {}", self.memory_refusals)?;
        match self.mean_latency() {
            Some(mean) => writeln!(f, "latency:          mean {mean}, max {}", self.max_latency)?,
            None => writeln!(f, "latency:          n/a")?,
        }
        writeln!(f, "atomic latency:   max {}", self.max_atomic_latency)?;
        write!(f, "final tick:       {}", self.final_tick)
    }
}

/// A bridge, its two agents, and the event queue driving them.
#[derive(Debug)]
pub struct Simulation {
    bridge: SimBridge,
    events: EventQueue<SimEvent>,
    issued_at: HashMap<TransactionId, Tick>,
    issue_armed: Option<Tick>,
    report: SimReport,
}

impl Simulation {
    /// Builds and initializes the bridge and agents described by `scenario`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Bridge`] if the bridge configuration is invalid.
    pub fn new(scenario: &Scenario) -> Result<Self, SimError> {
        let latency = scenario
            .bridge
            .clock()
            .cycles_to_ticks(scenario.memory.latency);
        let mut bridge = SimBridge::new("bridge", scenario.bridge.clone())?;
        let _ = bridge.connect_upstream(TrafficGenerator::new(&scenario.traffic));
        let _ = bridge.connect_downstream(MemoryModel::new(latency, scenario.memory.refuse_every));
        bridge.init()?;

        let mut sim = Self {
            report: SimReport {
                traffic_tag: bridge.traffic_tag().0,
                ..SimReport::default()
            },
            bridge,
            events: EventQueue::new(),
            issued_at: HashMap::new(),
            issue_armed: None,
        };
        sim.arm_issue()?;
        Ok(sim)
    }

    /// The simulated bridge.
    #[must_use]
    pub const fn bridge(&self) -> &SimBridge {
        &self.bridge
    }

    /// Current virtual time.
    #[must_use]
    pub const fn now(&self) -> Tick {
        self.events.now()
    }

    /// Dispatches the next event. Returns `false` once nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Bridge`] on a fatal bridge condition.
    pub fn step(&mut self) -> Result<bool, SimError> {
        let Some((tick, event)) = self.events.pop() else {
            return Ok(false);
        };
        trace!(tick, ?event, "dispatch");
        match event {
            SimEvent::Bridge(direction) => self.bridge.process_send(direction, &mut self.events)?,
            SimEvent::Issue => self.issue()?,
            SimEvent::MemoryRespond => {
                let completed = self.memory()?.complete_next();
                if let Some(pkt) = completed {
                    self.bridge.recv_timing_resp(pkt, &mut self.events)?;
                }
            }
            SimEvent::MemoryRetry => self.bridge.recv_req_retry(&mut self.events)?,
        }
        self.collect()?;
        Ok(true)
    }

    /// Runs until no event is pending.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Stalled`] if the queue drains with work left, or
    /// [`SimError::Bridge`] on a fatal bridge condition.
    pub fn run(&mut self) -> Result<SimReport, SimError> {
        while self.step()? {}

        let tick = self.events.now();
        let outstanding = self.bridge.outstanding_responses();
        let generator = self.generator()?;
        let unissued = generator.remaining();
        let retries = generator.retries();
        if unissued > 0 || outstanding > 0 {
            return Err(SimError::Stalled {
                tick,
                unissued,
                outstanding,
            });
        }
        let memory_refusals = self.memory()?.refusals();

        self.report.retries = retries;
        self.report.memory_refusals = memory_refusals;
        self.report.final_tick = tick;
        info!(
            issued = self.report.issued,
            completed = self.report.completed,
            final_tick = tick,
            "simulation finished"
        );
        Ok(self.report.clone())
    }

    fn generator(&mut self) -> Result<&mut TrafficGenerator, BridgeError> {
        self.bridge
            .upstream_peer_mut()
            .ok_or(BridgeError::Unconnected {
                side: Side::Upstream,
            })
    }

    fn memory(&mut self) -> Result<&mut MemoryModel, BridgeError> {
        self.bridge
            .downstream_peer_mut()
            .ok_or(BridgeError::Unconnected {
                side: Side::Downstream,
            })
    }

    fn routable(&self, pkt: &Packet) -> bool {
        let footprint = pkt.footprint();
        self.bridge
            .addr_ranges()
            .iter()
            .any(|range| range.covers(footprint))
    }

    fn arm_issue(&mut self) -> Result<(), SimError> {
        let Some(at) = self.generator()?.next_issue_tick() else {
            return Ok(());
        };
        let at = at.max(self.events.now());
        if self.issue_armed.is_some_and(|armed| armed <= at) {
            return Ok(());
        }
        self.issue_armed = Some(at);
        self.events.schedule(SimEvent::Issue, at);
        Ok(())
    }

    fn issue(&mut self) -> Result<(), SimError> {
        let now = self.events.now();
        if self.issue_armed == Some(now) {
            self.issue_armed = None;
        }

        while self.bridge.retry_state() == RetryState::Idle {
            let Some(Issue { mut pkt, mode, .. }) = self.generator()?.next_due(now) else {
                break;
            };
            if !self.routable(&pkt) {
                warn!(id = %pkt.id(), addr = pkt.addr(), "no advertised range covers access");
                self.report.unroutable += 1;
                continue;
            }
            match mode {
                AccessMode::Timing => {
                    let id = pkt.id();
                    let expects = pkt.expects_response();
                    match self.bridge.recv_timing_req(pkt, &mut self.events)? {
                        Admission::Accepted => {
                            debug!(%id, now, "issued");
                            self.report.issued += 1;
                            if expects {
                                self.issued_at.insert(id, now);
                            }
                        }
                        Admission::Refused(pkt) => {
                            debug!(%id, now, "refused, waiting for retry");
                            self.report.refused += 1;
                            self.generator()?.stall(Issue {
                                pkt,
                                at: now,
                                mode,
                            });
                        }
                    }
                }
                AccessMode::Atomic => {
                    let latency = self.bridge.recv_atomic(&mut pkt)?;
                    debug!(id = %pkt.id(), latency, "atomic access");
                    self.report.atomic += 1;
                    self.report.max_atomic_latency = self.report.max_atomic_latency.max(latency);
                }
                AccessMode::Functional => {
                    self.bridge.recv_functional(&mut pkt)?;
                    debug!(id = %pkt.id(), "functional access");
                    self.report.functional += 1;
                }
            }
        }
        self.arm_issue()
    }

    fn collect(&mut self) -> Result<(), SimError> {
        let now = self.events.now();

        let memory = self.memory()?;
        let accepted = memory.take_newly_accepted();
        let owes_retry = memory.take_owed_retry();
        let done_at = now.saturating_add(memory.latency());
        for _ in 0..accepted {
            self.events.schedule(SimEvent::MemoryRespond, done_at);
        }
        if owes_retry {
            self.events
                .schedule(SimEvent::MemoryRetry, now.saturating_add(1));
        }

        let generator = self.generator()?;
        let retried = generator.take_retry();
        let responses = generator.take_responses();
        for pkt in responses {
            let Some(issued) = self.issued_at.remove(&pkt.id()) else {
                warn!(id = %pkt.id(), "response for an access never issued");
                continue;
            };
            let latency = now.saturating_sub(issued);
            trace!(id = %pkt.id(), latency, "completed");
            self.report.completed += 1;
            self.report.total_latency = self.report.total_latency.saturating_add(latency);
            self.report.max_latency = self.report.max_latency.max(latency);
        }
        if retried {
            self.events.schedule(SimEvent::Issue, now);
        }
        Ok(())
    }
}

/// Runs `scenario` to completion.
///
/// # Errors
///
/// Returns [`SimError`] if the bridge faults or the run stalls.
pub fn simulate(scenario: &Scenario) -> Result<SimReport, SimError> {
    Simulation::new(scenario)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{AccessKind, MemorySpec, TrafficItem};
    use rstest::rstest;
    use tag_bridge::{AddrRange, BridgeConfig, Cycles, TrafficTag};

    fn timed(kind: AccessKind, addr: u64, at: Tick) -> TrafficItem {
        TrafficItem {
            kind,
            addr,
            size: 8,
            at,
            mode: AccessMode::Timing,
            fill: 0xAB,
        }
    }

    fn scenario(bridge: BridgeConfig, latency: u64, traffic: Vec<TrafficItem>) -> Scenario {
        Scenario {
            bridge,
            memory: MemorySpec {
                latency: Cycles(latency),
                refuse_every: 0,
            },
            traffic,
        }
    }

    #[test]
    fn single_read_round_trip_timing() {
        let report = simulate(&scenario(
            BridgeConfig::default(),
            5,
            vec![timed(AccessKind::Read, 0x40, 0)],
        ))
        .expect("runs to completion");

        // One cycle each way through the bridge plus five in memory.
        assert_eq!(report.issued, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(report.max_latency, 7);
        assert_eq!(report.final_tick, 7);
        assert_eq!(report.mean_latency(), Some(7));
    }

    #[rstest]
    #[case::tight_queues(1, 1)]
    #[case::narrow_requests(1, 4)]
    #[case::narrow_responses(4, 1)]
    fn backpressure_delays_but_never_loses_traffic(#[case] req: usize, #[case] resp: usize) {
        let traffic = (0..6)
            .map(|n| timed(AccessKind::Read, n * 8, 0))
            .collect();
        let report = simulate(&scenario(
            BridgeConfig {
                request_queue_capacity: req,
                response_queue_capacity: resp,
                ..BridgeConfig::default()
            },
            3,
            traffic,
        ))
        .expect("runs to completion");

        assert_eq!(report.issued, 6);
        assert_eq!(report.completed, 6);
        assert!(report.refused > 0);
        assert_eq!(report.retries, report.refused);
    }

    #[test]
    fn memory_refusals_are_retried() {
        let mut input = scenario(
            BridgeConfig::default(),
            2,
            (0..5).map(|n| timed(AccessKind::Write, n * 8, n)).collect(),
        );
        input.memory.refuse_every = 2;
        let report = simulate(&input).expect("runs to completion");

        // Every second offer is refused, so each write after the first is
        // refused once before its retry lands.
        assert_eq!(report.completed, 5);
        assert_eq!(report.memory_refusals, 4);
    }

    #[test]
    fn writes_land_in_memory_before_later_reads() {
        let mut sim = Simulation::new(&scenario(
            BridgeConfig::default(),
            4,
            vec![
                timed(AccessKind::Writeback, 0x100, 0),
                timed(AccessKind::Read, 0x100, 50),
            ],
        ))
        .expect("valid scenario");
        let report = sim.run().expect("runs to completion");

        assert_eq!(report.issued, 2);
        assert_eq!(report.completed, 1);
        let memory = sim.bridge().downstream_peer().expect("memory bound");
        assert_eq!(memory.read(0x100, 8), vec![0xAB; 8]);
    }

    #[test]
    fn atomic_and_functional_accesses_bypass_the_queues() {
        let mut atomic = timed(AccessKind::Write, 0, 0);
        atomic.mode = AccessMode::Atomic;
        let mut functional = timed(AccessKind::Read, 0, 0);
        functional.mode = AccessMode::Functional;
        let report = simulate(&scenario(
            BridgeConfig {
                request_delay: Cycles(2),
                clock_period: 10,
                ..BridgeConfig::default()
            },
            3,
            vec![atomic, functional],
        ))
        .expect("runs to completion");

        assert_eq!(report.atomic, 1);
        assert_eq!(report.functional, 1);
        assert_eq!(report.issued, 0);
        assert_eq!(report.max_atomic_latency, 2 * 10 + 3 * 10);
        assert!(report
            .to_string()
            .contains("atomic latency:   max 50"));
    }

    #[test]
    fn accesses_outside_the_advertised_ranges_are_dropped() {
        let report = simulate(&scenario(
            BridgeConfig {
                ranges: vec![AddrRange::new(0x1000, 0x1FFF).expect("valid range")],
                ..BridgeConfig::default()
            },
            1,
            vec![
                timed(AccessKind::Read, 0x1000, 0),
                timed(AccessKind::Read, 0x4000, 0),
            ],
        ))
        .expect("runs to completion");

        assert_eq!(report.unroutable, 1);
        assert_eq!(report.completed, 1);
    }

    #[test]
    fn report_carries_the_bridge_tag() {
        let report = simulate(&scenario(
            BridgeConfig {
                traffic_tag: TrafficTag(42),
                ..BridgeConfig::default()
            },
            1,
            Vec::new(),
        ))
        .expect("empty scenario finishes");
        assert_eq!(report.traffic_tag, 42);
        assert_eq!(report.final_tick, 0);
        assert_eq!(report.mean_latency(), None);
    }

    #[test]
    fn invalid_bridge_config_is_reported() {
        let err = Simulation::new(&scenario(
            BridgeConfig {
                response_queue_capacity: 0,
                ..BridgeConfig::default()
            },
            1,
            Vec::new(),
        ))
        .expect_err("zero capacity");
        assert!(matches!(err, SimError::Bridge(BridgeError::Config(_))));
    }
}
