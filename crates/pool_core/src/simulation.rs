//! Discrete-tick dispatch loop driving a [SteppedWorld] with one strategy.
//!
//! States: `Idle -> Running -> Draining -> Terminated`. Each running tick steps
//! the world, syncs vehicle positions (reached stops advance the route cursor,
//! a reached dropoff frees its seat), releases due requests and runs exactly one
//! strategy pass. Once nothing is pending or unreleased the loop either stops
//! right away or drains until the world reports no pending vehicles.
//!
//! The world handle is closed exactly once however the loop ends, including
//! early returns on error.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PoolError, WorldError};
use crate::greedy::{AbandonedRider, OnlineGreedyAssigner};
use crate::model::{RiderRequest, StopKind, Vehicle};
use crate::params::{PoolParams, StrategyKind};
use crate::route::RouteArtifact;
use crate::telemetry::SimTelemetry;
use crate::world::SteppedWorld;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Running,
    Draining,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationOutcome {
    Completed,
    Cancelled,
    TickLimitReached,
}

/// Cloneable cancellation signal, observed between ticks only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Assignment strategy for one run.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Greedy pass over released requests every tick.
    Online {
        assigner: OnlineGreedyAssigner,
        riders: Vec<RiderRequest>,
    },
    /// Precomputed routes, pushed to the world on the first tick.
    Offline { routes: Vec<RouteArtifact> },
}

impl Strategy {
    pub fn online(riders: Vec<RiderRequest>) -> Self {
        Strategy::Online {
            assigner: OnlineGreedyAssigner::new(),
            riders,
        }
    }

    pub fn offline(routes: Vec<RouteArtifact>) -> Self {
        Strategy::Offline { routes }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Online { .. } => StrategyKind::Online,
            Strategy::Offline { .. } => StrategyKind::Offline,
        }
    }

    fn rider_ids(&self) -> BTreeSet<u32> {
        match self {
            Strategy::Online { riders, .. } => riders.iter().map(|r| r.id).collect(),
            Strategy::Offline { routes } => routes.iter().flat_map(|r| r.rider_ids()).collect(),
        }
    }
}

/// Owns the world and closes it exactly once, on [WorldHandle::release] or on drop.
struct WorldHandle<W: SteppedWorld> {
    world: W,
    released: bool,
}

impl<W: SteppedWorld> WorldHandle<W> {
    fn new(world: W) -> Self {
        Self {
            world,
            released: false,
        }
    }

    fn release(&mut self) -> Result<(), WorldError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.world.close()
    }
}

impl<W: SteppedWorld> Drop for WorldHandle<W> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "closing world handle failed");
        }
    }
}

/// Summary of an abandoned rider for the JSON report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbandonedSummary {
    pub rider_id: u32,
    pub reason: String,
}

#[derive(Debug)]
pub struct SimulationReport {
    pub strategy: StrategyKind,
    pub outcome: SimulationOutcome,
    pub ticks: u64,
    /// Riders dropped off, in completion order.
    pub completed: Vec<u32>,
    pub abandoned: Vec<AbandonedRider>,
    /// Riders neither completed nor abandoned, ascending.
    pub unserved: Vec<u32>,
    /// Times a released request found no free seat (one per rider per tick).
    pub resource_exhaustions: u64,
    /// Grid units covered by every vehicle's committed stops.
    pub fleet_distance: f64,
    pub telemetry: SimTelemetry,
}

/// Serializable view of a [SimulationReport] without the raw telemetry rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub strategy: StrategyKind,
    pub outcome: SimulationOutcome,
    pub ticks: u64,
    pub completed: usize,
    pub abandoned: Vec<AbandonedSummary>,
    pub unserved: Vec<u32>,
    pub resource_exhaustions: u64,
    pub fleet_distance: f64,
    pub mean_time_to_pickup_ticks: Option<f64>,
    pub mean_ride_duration_ticks: Option<f64>,
}

impl SimulationReport {
    pub fn summary(&self) -> SimulationSummary {
        SimulationSummary {
            strategy: self.strategy,
            outcome: self.outcome,
            ticks: self.ticks,
            completed: self.completed.len(),
            abandoned: self
                .abandoned
                .iter()
                .map(|a| AbandonedSummary {
                    rider_id: a.rider_id,
                    reason: a.error.to_string(),
                })
                .collect(),
            unserved: self.unserved.clone(),
            resource_exhaustions: self.resource_exhaustions,
            fleet_distance: self.fleet_distance,
            mean_time_to_pickup_ticks: self.telemetry.mean_time_to_pickup(),
            mean_ride_duration_ticks: self.telemetry.mean_ride_duration(),
        }
    }
}

pub struct SimulationLoop<W: SteppedWorld> {
    params: PoolParams,
    strategy: Strategy,
    world: WorldHandle<W>,
    state: LoopState,
    tick: u64,
    fleet: Vec<Vehicle>,
    retired: Vec<Vehicle>,
    unreleased: VecDeque<RiderRequest>,
    pending: Vec<RiderRequest>,
    routes_applied: bool,
    riders: BTreeSet<u32>,
    completed: Vec<u32>,
    abandoned: Vec<AbandonedRider>,
    /// Offline riders whose pickup found the vehicle full; their dropoff frees no seat.
    unseated: HashSet<u32>,
    resource_exhaustions: u64,
    telemetry: SimTelemetry,
    cancel: CancelFlag,
}

impl<W: SteppedWorld> SimulationLoop<W> {
    /// Takes ownership of `world`. Parameters are validated here, before any world call.
    pub fn new(world: W, params: PoolParams, strategy: Strategy) -> Result<Self, PoolError> {
        let mut world = WorldHandle::new(world);
        let checked = params
            .validate()
            .and_then(|()| check_route_vehicles(&strategy, params.num_vehicles));
        if let Err(err) = checked {
            // Nothing was placed yet; still hand the world back exactly once.
            world.release()?;
            return Err(err);
        }

        let mut unreleased: Vec<RiderRequest> = match &strategy {
            Strategy::Online { riders, .. } => riders.clone(),
            Strategy::Offline { .. } => Vec::new(),
        };
        unreleased.sort_by(|a, b| a.request_time.total_cmp(&b.request_time));

        Ok(Self {
            riders: strategy.rider_ids(),
            params,
            strategy,
            world,
            state: LoopState::Idle,
            tick: 0,
            fleet: Vec::new(),
            retired: Vec::new(),
            unreleased: unreleased.into(),
            pending: Vec::new(),
            routes_applied: false,
            completed: Vec::new(),
            abandoned: Vec::new(),
            unseated: HashSet::new(),
            resource_exhaustions: 0,
            telemetry: SimTelemetry::default(),
            cancel: CancelFlag::new(),
        })
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn fleet(&self) -> &[Vehicle] {
        &self.fleet
    }

    pub fn pending(&self) -> &[RiderRequest] {
        &self.pending
    }

    pub fn telemetry(&self) -> &SimTelemetry {
        &self.telemetry
    }

    /// Places the fleet at the depot and enters `Running`.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.state != LoopState::Idle {
            return Err(PoolError::config(format!(
                "simulation already started (state {:?})",
                self.state
            )));
        }
        let depot = self.params.depot;
        for id in 0..self.params.num_vehicles as u32 {
            self.world
                .world
                .add_vehicle(id, depot, self.params.max_capacity)?;
            self.fleet
                .push(Vehicle::at_depot(id, depot, self.params.max_capacity));
        }
        self.state = LoopState::Running;
        info!(
            strategy = ?self.strategy.kind(),
            vehicles = self.fleet.len(),
            riders = self.riders.len(),
            %depot,
            "simulation started"
        );
        Ok(())
    }

    /// Advances one tick. No-op once terminated.
    pub fn tick(&mut self) -> Result<LoopState, PoolError> {
        match self.state {
            LoopState::Idle => {
                return Err(PoolError::config("simulation not started"));
            }
            LoopState::Terminated => return Ok(self.state),
            LoopState::Running | LoopState::Draining => {}
        }

        self.tick += 1;
        self.world.world.step()?;
        self.sync_positions()?;

        if self.state == LoopState::Running {
            self.release_due_requests();
            self.run_strategy()?;
            if self.pending.is_empty() && self.unreleased.is_empty() {
                if self.world.world.pending_count() == 0 {
                    self.transition(LoopState::Terminated);
                } else {
                    self.transition(LoopState::Draining);
                }
            }
        } else {
            self.retire_idle_vehicles();
            if self.world.world.pending_count() == 0 {
                self.transition(LoopState::Terminated);
            }
        }

        let interval = self.params.simulation.snapshot_interval_ticks;
        if self.telemetry.snapshot_due(self.tick, interval) {
            self.telemetry
                .capture(self.tick, self.fleet.iter().chain(self.retired.iter()));
        }

        debug!(
            tick = self.tick,
            state = ?self.state,
            pending = self.pending.len(),
            unreleased = self.unreleased.len(),
            completed = self.completed.len(),
            "tick"
        );
        Ok(self.state)
    }

    /// Runs to completion, cancellation or the tick limit, then closes the world.
    pub fn run(self) -> Result<SimulationReport, PoolError> {
        self.run_with_hook(|_, _| {})
    }

    /// Like [SimulationLoop::run], invoking `hook(tick, state)` after every tick.
    pub fn run_with_hook<F>(mut self, mut hook: F) -> Result<SimulationReport, PoolError>
    where
        F: FnMut(u64, LoopState),
    {
        if self.state == LoopState::Idle {
            self.start()?;
        }
        let max_ticks = self.params.simulation.max_ticks;

        let outcome = loop {
            if self.state == LoopState::Terminated {
                break SimulationOutcome::Completed;
            }
            if self.cancel.is_cancelled() {
                break SimulationOutcome::Cancelled;
            }
            if self.tick >= max_ticks {
                break SimulationOutcome::TickLimitReached;
            }
            let state = self.tick()?;
            hook(self.tick, state);
        };

        self.world.release()?;
        if self.state != LoopState::Terminated {
            self.transition(LoopState::Terminated);
        }

        let completed_set: HashSet<u32> = self.completed.iter().copied().collect();
        let abandoned_set: HashSet<u32> = self.abandoned.iter().map(|a| a.rider_id).collect();
        let unserved: Vec<u32> = self
            .riders
            .iter()
            .copied()
            .filter(|id| !completed_set.contains(id) && !abandoned_set.contains(id))
            .collect();

        let fleet_distance: f64 = self
            .fleet
            .iter()
            .chain(self.retired.iter())
            .map(Vehicle::total_distance)
            .sum();

        info!(
            ?outcome,
            ticks = self.tick,
            completed = self.completed.len(),
            abandoned = self.abandoned.len(),
            unserved = unserved.len(),
            in_flight = self.telemetry.in_flight_riders().count(),
            resource_exhaustions = self.resource_exhaustions,
            fleet_distance,
            "simulation finished"
        );

        Ok(SimulationReport {
            strategy: self.strategy.kind(),
            outcome,
            ticks: self.tick,
            completed: std::mem::take(&mut self.completed),
            abandoned: std::mem::take(&mut self.abandoned),
            unserved,
            resource_exhaustions: self.resource_exhaustions,
            fleet_distance,
            telemetry: std::mem::take(&mut self.telemetry),
        })
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            info!(tick = self.tick, from = ?self.state, to = ?next, "simulation state");
            self.state = next;
        }
    }

    fn sync_positions(&mut self) -> Result<(), PoolError> {
        let tick = self.tick;
        for vehicle in &mut self.fleet {
            let position = self.world.world.position(vehicle.id)?;
            for stop in vehicle.advance_to(position) {
                match stop.kind {
                    StopKind::Pickup => self.telemetry.mark_pickup(stop.rider_id, tick),
                    StopKind::Dropoff => {
                        if !self.unseated.remove(&stop.rider_id) {
                            vehicle.release_seat();
                        }
                        if self.telemetry.mark_dropoff(stop.rider_id, tick).is_some() {
                            self.completed.push(stop.rider_id);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn release_due_requests(&mut self) {
        let now = self.tick as f64 * self.params.simulation.tick_seconds;
        while self
            .unreleased
            .front()
            .is_some_and(|r| r.request_time <= now)
        {
            if let Some(request) = self.unreleased.pop_front() {
                self.pending.push(request);
            }
        }
    }

    fn run_strategy(&mut self) -> Result<(), PoolError> {
        match &self.strategy {
            Strategy::Online { assigner, .. } => {
                let assigner = *assigner;
                let dispatch =
                    assigner.assign_tick(&mut self.world.world, &mut self.fleet, &mut self.pending)?;
                for assigned in &dispatch.assigned {
                    self.telemetry
                        .mark_assigned(assigned.rider_id, assigned.vehicle_id, self.tick);
                }
                self.abandoned.extend(dispatch.abandoned);
                self.resource_exhaustions += dispatch.exhausted.len() as u64;
                Ok(())
            }
            Strategy::Offline { .. } if self.routes_applied => Ok(()),
            Strategy::Offline { routes } => {
                let routes = routes.clone();
                self.routes_applied = true;
                for route in &routes {
                    self.apply_route(route)?;
                }
                Ok(())
            }
        }
    }

    /// Queues one precomputed route stop by stop. An unreachable stop abandons its
    /// rider; the rest of that rider's stops are skipped and a pickup already
    /// queued stays as a plain visit.
    fn apply_route(&mut self, route: &RouteArtifact) -> Result<(), PoolError> {
        let slot = self
            .fleet
            .iter()
            .position(|v| v.id == route.vehicle_id)
            .ok_or_else(|| {
                PoolError::config_for_vehicle("route refers to a vehicle outside the fleet", route.vehicle_id)
            })?;
        let tick = self.tick;
        let mut skipped: HashSet<u32> = HashSet::new();
        let mut seated: HashSet<u32> = HashSet::new();

        for stop in &route.route {
            if skipped.contains(&stop.rider_id) {
                continue;
            }
            let vehicle = &mut self.fleet[slot];
            match self.world.world.append_targets(vehicle.id, &[stop.coord]) {
                Ok(()) => {
                    vehicle.push_stop(stop.kind, stop.rider_id, stop.coord);
                    if stop.kind == StopKind::Pickup {
                        if vehicle.reserve_seat() {
                            seated.insert(stop.rider_id);
                        } else {
                            warn!(
                                vehicle_id = vehicle.id,
                                rider_id = stop.rider_id,
                                "precomputed route exceeds vehicle capacity"
                            );
                            self.unseated.insert(stop.rider_id);
                        }
                        self.telemetry.mark_assigned(stop.rider_id, vehicle.id, tick);
                    }
                }
                Err(WorldError::Unreachable { vehicle_id, target }) => {
                    warn!(rider_id = stop.rider_id, vehicle_id, %target, "rider abandoned");
                    skipped.insert(stop.rider_id);
                    if seated.remove(&stop.rider_id) {
                        vehicle.release_seat();
                    }
                    self.unseated.remove(&stop.rider_id);
                    self.telemetry.forget(stop.rider_id);
                    self.abandoned.push(AbandonedRider {
                        rider_id: stop.rider_id,
                        error: PoolError::UnreachableTarget {
                            rider_id: stop.rider_id,
                            vehicle_id,
                            target,
                        },
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
        debug!(
            vehicle_id = route.vehicle_id,
            stops = self.fleet[slot].route().len(),
            skipped = skipped.len(),
            "precomputed route applied"
        );
        Ok(())
    }

    fn retire_idle_vehicles(&mut self) {
        let (idle, active): (Vec<Vehicle>, Vec<Vehicle>) =
            std::mem::take(&mut self.fleet).into_iter().partition(Vehicle::is_idle);
        for vehicle in &idle {
            debug!(vehicle_id = vehicle.id, tick = self.tick, "vehicle retired");
        }
        self.retired.extend(idle);
        self.fleet = active;
    }
}

/// Offline routes may only name vehicles `0..num_vehicles`.
fn check_route_vehicles(strategy: &Strategy, num_vehicles: usize) -> Result<(), PoolError> {
    if let Strategy::Offline { routes } = strategy {
        if let Some(route) = routes
            .iter()
            .find(|r| r.vehicle_id as usize >= num_vehicles)
        {
            return Err(PoolError::config_for_vehicle(
                format!("route refers to a vehicle outside the fleet of {num_vehicles}"),
                route.vehicle_id,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coord;
    use crate::test_helpers::{rider, MockWorld};

    fn params(vehicles: usize) -> PoolParams {
        PoolParams::default().with_num_vehicles(vehicles).with_max_ticks(500)
    }

    #[test]
    fn online_run_serves_every_rider() {
        let riders = vec![
            rider(0, (2, 0), (2, 3), 0.0),
            rider(1, (0, 4), (1, 4), 3.0),
        ];
        let sim = SimulationLoop::new(MockWorld::new(), params(1), Strategy::online(riders))
            .expect("loop");
        let report = sim.run().expect("run");
        assert_eq!(report.outcome, SimulationOutcome::Completed);
        assert_eq!(report.completed, vec![0, 1]);
        assert!(report.unserved.is_empty());
        assert_eq!(report.telemetry.completed_rides.len(), 2);
    }

    #[test]
    fn requests_are_released_by_request_time() {
        let riders = vec![rider(0, (1, 0), (2, 0), 5.0)];
        let mut sim = SimulationLoop::new(MockWorld::new(), params(1), Strategy::online(riders))
            .expect("loop");
        sim.start().expect("start");
        for _ in 0..4 {
            sim.tick().expect("tick");
        }
        assert!(sim.fleet()[0].route().is_empty());
        sim.tick().expect("tick");
        assert_eq!(sim.fleet()[0].route().len(), 2);
    }

    #[test]
    fn empty_input_terminates_after_one_tick() {
        let sim = SimulationLoop::new(MockWorld::new(), params(2), Strategy::online(Vec::new()))
            .expect("loop");
        let report = sim.run().expect("run");
        assert_eq!(report.outcome, SimulationOutcome::Completed);
        assert_eq!(report.ticks, 1);
    }

    #[test]
    fn draining_retires_idle_vehicles() {
        let riders = vec![rider(0, (3, 0), (3, 3), 0.0)];
        let mut sim = SimulationLoop::new(MockWorld::new(), params(2), Strategy::online(riders))
            .expect("loop");
        sim.start().expect("start");
        assert_eq!(sim.tick().expect("tick"), LoopState::Draining);
        sim.tick().expect("tick");
        // Vehicle 1 never got work.
        assert_eq!(sim.fleet().len(), 1);
        assert_eq!(sim.fleet()[0].id, 0);
    }

    #[test]
    fn tick_limit_stops_the_run() {
        let riders = vec![rider(0, (40, 0), (40, 40), 0.0)];
        let sim = SimulationLoop::new(
            MockWorld::new(),
            params(1).with_max_ticks(10),
            Strategy::online(riders),
        )
        .expect("loop");
        let report = sim.run().expect("run");
        assert_eq!(report.outcome, SimulationOutcome::TickLimitReached);
        assert_eq!(report.ticks, 10);
        assert_eq!(report.unserved, vec![0]);
    }

    #[test]
    fn cancellation_closes_the_world_once() {
        let world = MockWorld::new();
        let closes = world.close_counter();
        let riders = vec![rider(0, (9, 0), (9, 9), 0.0)];
        let sim = SimulationLoop::new(world, params(1), Strategy::online(riders)).expect("loop");
        let cancel = sim.cancel_flag();

        let report = sim
            .run_with_hook(|tick, _| {
                if tick == 3 {
                    cancel.cancel();
                }
            })
            .expect("run");
        assert_eq!(report.outcome, SimulationOutcome::Cancelled);
        assert_eq!(report.ticks, 3);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_an_unfinished_loop_closes_the_world() {
        let world = MockWorld::new();
        let closes = world.close_counter();
        let mut sim = SimulationLoop::new(world, params(1), Strategy::online(Vec::new()))
            .expect("loop");
        sim.start().expect("start");
        drop(sim);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_params_still_close_the_world() {
        let world = MockWorld::new();
        let closes = world.close_counter();
        let result = SimulationLoop::new(world, params(0), Strategy::online(Vec::new()));
        assert!(matches!(result, Err(PoolError::Configuration { .. })));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn offline_routes_are_applied_once_with_rider_isolation() {
        let world = MockWorld::new().with_unreachable(Coord::new(7, 7));
        let builder = crate::route::RouteBuilder::new(Coord::new(0, 0), 10.0, 0.5).expect("builder");
        let routes = vec![
            builder.build(0, &[rider(0, (1, 0), (7, 7), 0.0), rider(1, (0, 1), (0, 2), 0.0)]),
            builder.build(1, &[rider(2, (2, 2), (3, 2), 0.0)]),
        ];
        let sim = SimulationLoop::new(
            world,
            params(2).with_strategy(StrategyKind::Offline),
            Strategy::offline(routes),
        )
        .expect("loop");
        let report = sim.run().expect("run");

        assert_eq!(report.strategy, StrategyKind::Offline);
        assert_eq!(report.outcome, SimulationOutcome::Completed);
        assert_eq!(report.abandoned.len(), 1);
        assert_eq!(report.abandoned[0].rider_id, 0);
        let mut completed = report.completed.clone();
        completed.sort_unstable();
        assert_eq!(completed, vec![1, 2]);
        assert!(report.unserved.is_empty());
    }

    #[test]
    fn overfull_offline_route_frees_seat_only_for_seated_rider() {
        let builder = crate::route::RouteBuilder::new(Coord::new(0, 0), 10.0, 0.5).expect("builder");
        // Order: pickup 0, pickup 1, dropoff 1, dropoff 0. Only rider 0 gets the seat.
        let routes = vec![builder.build(
            0,
            &[rider(0, (1, 0), (6, 0), 0.0), rider(1, (2, 0), (3, 0), 0.0)],
        )];
        let mut sim = SimulationLoop::new(
            MockWorld::new(),
            params(1).with_max_capacity(1).with_strategy(StrategyKind::Offline),
            Strategy::offline(routes),
        )
        .expect("loop");
        sim.start().expect("start");
        sim.tick().expect("tick");
        assert_eq!(sim.fleet()[0].capacity_remaining(), 0);

        while sim.fleet()[0].remaining_stops().len() > 1 {
            sim.tick().expect("tick");
        }
        // Rider 1 left, rider 0 still holds the only seat.
        assert_eq!(sim.fleet()[0].remaining_stops()[0].rider_id, 0);
        assert_eq!(sim.fleet()[0].capacity_remaining(), 0);

        let report = sim.run().expect("run");
        let mut completed = report.completed.clone();
        completed.sort_unstable();
        assert_eq!(completed, vec![0, 1]);
    }

    #[test]
    fn route_for_unknown_vehicle_is_rejected_before_start() {
        let world = MockWorld::new();
        let closes = world.close_counter();
        let builder = crate::route::RouteBuilder::new(Coord::new(0, 0), 10.0, 0.5).expect("builder");
        let routes = vec![builder.build(5, &[rider(0, (1, 0), (2, 0), 0.0)])];

        let err = SimulationLoop::new(
            world,
            params(2).with_strategy(StrategyKind::Offline),
            Strategy::offline(routes),
        )
        .err()
        .expect("unknown vehicle");
        assert!(matches!(err, PoolError::Configuration { .. }));
        assert_eq!(err.vehicle_id(), Some(5));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
