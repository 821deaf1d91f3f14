//! The cooperative localisation engine.
//!
//! The MAC hands the engine control of every location slot: the engine
//! plans the slot (who transmits, what the expectations are), the MAC
//! moves the frames, and the finished capture comes back here. Each
//! capture runs the same pipeline: neighbour bookkeeping, ranging, the
//! sanity detectors, one solver step, role arbitration, and finally the
//! routing-coordinate refresh the router reads.

pub mod lattice;
pub mod linalg;
pub mod optimizer;
pub mod ranging;
pub mod slot;
pub mod solvers;
pub mod table;

use heapless::Vec;
use rand_core::RngCore;

use crate::config::Config;
use crate::mac::neighbors::NeighborTable;
use crate::route::coord::{embed, RoutingCoord};
use crate::time::Asn;

use lattice::{expected_offset_from_prime, is_prime, LatticePoint};
use linalg::Vec3;
use optimizer::{RoleAction, RoleOptimizer};
use slot::{BeaconSelf, Expectation, LocSlotDriver, SlotCapture};
use solvers::{SolveError, SolverChoice, SpringParams};

/// The position snapshot published to the rest of the node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    /// Position in metres, mesh-local frame.
    pub position: Vec3,
    /// Monotonic sequence, serial-number arithmetic.
    pub seq: u8,
}

/// The outcome of processing one location slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotOutcome {
    /// The solver branch that ran.
    pub solver: SolverChoice,
    /// The position changed and its sequence advanced.
    pub updated: bool,
    /// The position was declared lost this slot.
    pub position_lost: bool,
    /// A conflict marker named this node's sub-offset.
    pub conflict: bool,
    /// What happened to the beacon role.
    pub role: RoleAction,
}

/// An anchor for the solvers: position, measurement, participant index.
type Anchor = (Vec3, f32, u8);

/// Per-round reception history: a heard bit per sub-offset for each
/// `(direction, loc_slot)` round.
type HeardHistory = [[u8; table::LOC_SLOTS]; table::DIRECTIONS];

/// The localisation engine.
pub struct LocationEngine {
    link_addr: [u8; 8],
    /// Set on the node that founded the network; only it may bootstrap
    /// beacon 0.
    founder: bool,
    fix: Option<PositionFix>,
    velocity: Vec3,
    routing_coord: RoutingCoord,
    coord_seq: u8,
    role: RoleOptimizer,
    /// Cycles left of forced silence after a sub-offset conflict.
    conflict_backoff: u8,
    /// A conflict happened; re-attempts are probabilistic until clear.
    in_conflict: bool,
    heard: HeardHistory,
    spring: SpringParams,
}

impl LocationEngine {
    /// Create an engine for the node with the given link address.
    pub fn new(link_addr: [u8; 8], config: &Config) -> Self {
        Self {
            link_addr,
            founder: false,
            fix: None,
            velocity: Vec3::ZERO,
            routing_coord: RoutingCoord::ORIGIN,
            coord_seq: 0,
            role: RoleOptimizer::new(),
            conflict_backoff: 0,
            in_conflict: false,
            heard: Default::default(),
            spring: SpringParams {
                ks: config.ks,
                kg: config.kg,
                b: config.damping_b,
                m: 1.0,
                dt: config.sim_dt,
            },
        }
    }

    /// Mark this node as the network founder (it advertises first and
    /// anchors the lattice origin).
    pub fn set_founder(&mut self, founder: bool) {
        self.founder = founder;
    }

    /// The current position fix, if any.
    pub fn position(&self) -> Option<PositionFix> {
        self.fix
    }

    /// The current routing coordinate and its sequence.
    pub fn routing_coord(&self) -> (RoutingCoord, u8) {
        (self.routing_coord, self.coord_seq)
    }

    /// The beacon index this node currently transmits as.
    pub fn beacon_index(&self) -> Option<u8> {
        self.role.current()
    }

    /// Plan the upcoming location slot.
    pub fn plan_slot<R: RngCore>(
        &mut self,
        direction: u8,
        loc_slot: u8,
        neighbors: &NeighborTable,
        config: &Config,
        rng: &mut R,
    ) -> LocSlotDriver {
        self.bootstrap_claim(neighbors, config);

        // Conflict backoff gates participation, not the role: forced
        // silence for `backoff_count` cycles, then re-attempts with
        // probability 1 / backoff_count.
        let mut index = self.role.current();
        if index.is_some() {
            if self.conflict_backoff > 0 {
                index = None;
            } else if self.in_conflict {
                if rng.next_u32() % config.backoff_count.max(1) as u32 == 0 {
                    self.in_conflict = false;
                } else {
                    index = None;
                }
            }
        }

        let participants = table::participants(direction, loc_slot);
        let mut expectations = [Expectation::default(); 6];
        let heard_bits = self.heard[direction as usize][loc_slot as usize];
        for (i, expectation) in expectations.iter_mut().enumerate() {
            let scheduled = participants[i];
            if let Some(neighbor) = neighbors.beacon(scheduled) {
                expectation.addr = neighbor.link_addr;
            }
            expectation.heard = heard_bits & (1 << i) != 0;
        }

        let my_state = BeaconSelf {
            position: self.fix.map(|f| (f.position.x, f.position.y, f.position.z)),
            routing_coord: (self.routing_coord.r, self.routing_coord.theta),
            neighborhood: neighbors.heard_beacon_mask(),
        };

        LocSlotDriver::new(direction, loc_slot, index, my_state, expectations)
    }

    /// Process a finished location slot.
    pub fn process_slot(
        &mut self,
        capture: SlotCapture,
        neighbors: &mut NeighborTable,
        asn: Asn,
        config: &Config,
    ) -> SlotOutcome {
        self.absorb_frames(&capture, neighbors, asn);
        self.update_heard_history(&capture);
        let conflicted = self.detect_conflicts(&capture, neighbors, config);

        let ranging = ranging::compute(&capture);
        let anchors = self.gather_anchors(&capture, &ranging, config);

        let beacon_neighbors = neighbors.heard_beacon_mask().count_ones() as usize;
        let origin_heard = neighbors
            .iter()
            .any(|n| n.beacon_index == Some(0) && n.position.is_some());

        let mut outcome = SlotOutcome {
            solver: SolverChoice::Lost,
            updated: false,
            position_lost: false,
            conflict: conflicted,
            role: RoleAction::Hold,
        };

        if self.majority_inverted(&capture, config) {
            if self.fix.take().is_some() {
                self.velocity = Vec3::ZERO;
                outcome.position_lost = true;
                outcome.role = self.role.position_lost();
            }
        } else {
            let mut choice = solvers::select(
                capture.transmitted(),
                self.fix.is_some(),
                beacon_neighbors,
                anchors.len(),
                false,
                self.role.current(),
                origin_heard,
            );
            let mut solved = self.run_solver(choice, &capture, &anchors, &ranging, config);

            if matches!(solved, Err(SolveError::Degenerate)) {
                // Co-planar geometry: re-select with the flag raised.
                choice = solvers::select(
                    capture.transmitted(),
                    self.fix.is_some(),
                    beacon_neighbors,
                    anchors.len(),
                    true,
                    self.role.current(),
                    origin_heard,
                );
                solved = self.run_solver(choice, &capture, &anchors, &ranging, config);
            }

            outcome.solver = choice;
            match solved {
                Ok(Some(position)) => {
                    self.commit(position);
                    self.refresh_routing_coord(config);
                    outcome.updated = true;
                }
                Ok(None) => {}
                Err(_) => {
                    // The decision table's fall-through marks the position
                    // lost, but only when the slot actually offered enough
                    // geometry; a passive node that merely heard little
                    // keeps its previous fix.
                    if choice == SolverChoice::Lost
                        && self.fix.is_some()
                        && (capture.transmitted() || anchors.len() >= 4)
                    {
                        self.fix = None;
                        self.velocity = Vec3::ZERO;
                        outcome.position_lost = true;
                        outcome.role = self.role.position_lost();
                    }
                }
            }
        }

        // Role arbitration runs on every update cycle.
        if !outcome.position_lost {
            if let Some(fix) = self.fix {
                // A rival heard transmitting our own index arbitrates by
                // distance to the role's lattice point.
                if let Some(current) = self.role.current() {
                    let rival = neighbors
                        .beacon(current)
                        .filter(|n| n.link_addr != self.link_addr)
                        .and_then(|n| n.position);
                    if let Some((x, y, z)) = rival {
                        let action = self.role.on_challenger(
                            fix.position,
                            Vec3::new(x, y, z),
                            config.lattice_edge_r,
                            config.hysteresis,
                        );
                        if action != RoleAction::Hold {
                            outcome.role = action;
                        }
                    }
                }

                let target = LatticePoint::nearest(fix.position, config.lattice_edge_r);
                let incumbent = neighbors
                    .beacon(target.beacon_index())
                    .filter(|n| n.link_addr != self.link_addr)
                    .and_then(|n| n.position)
                    .map(|(x, y, z)| Vec3::new(x, y, z));
                let action = self.role.after_update(
                    fix.position,
                    config.lattice_edge_r,
                    config.hysteresis,
                    config.allow_beaconing,
                    incumbent,
                );
                if action != RoleAction::Hold {
                    outcome.role = action;
                }
            }
        }

        if conflicted {
            self.conflict_backoff = config.backoff_count;
            self.in_conflict = true;
        } else if self.conflict_backoff > 0 {
            self.conflict_backoff -= 1;
        }

        outcome
    }

    /// Fold every captured frame into the neighbour table.
    fn absorb_frames(&mut self, capture: &SlotCapture, neighbors: &mut NeighborTable, asn: Asn) {
        for frame in capture.frames.iter().flatten() {
            let neighbor = neighbors.heard(frame.src, asn);
            let (x, y, z) = frame.body.position;
            if !(x.is_nan() || y.is_nan() || z.is_nan()) {
                neighbor.position = Some((x, y, z));
            }
            if (frame.body.class as usize) < lattice::BEACON_INDICES {
                neighbor.beacon_index = Some(frame.body.class);
            }
            neighbor.neighborhood = frame.body.neighborhood;
            let (r, theta) = frame.body.routing_coord;
            if !(r.is_nan() || theta.is_nan()) {
                neighbor.routing_coord = Some((r, theta));
            }
        }
    }

    fn update_heard_history(&mut self, capture: &SlotCapture) {
        let bits = &mut self.heard[capture.direction as usize][capture.loc_slot as usize];
        *bits = 0;
        for i in 0..6 {
            if capture.frames[i].is_some() || capture.my_sub_offset == Some(i as u8) {
                *bits |= 1 << i;
            }
        }
    }

    /// Scan later frames for conflict markers naming this node's
    /// sub-offset, and arbitrate against a named challenger.
    fn detect_conflicts(
        &mut self,
        capture: &SlotCapture,
        neighbors: &NeighborTable,
        config: &Config,
    ) -> bool {
        let Some(mine) = capture.my_sub_offset else {
            return false;
        };

        let mut conflicted = false;
        let mut challenger = None;

        for j in (mine + 1)..6 {
            let Some(record) = capture.wire_record(j, mine) else {
                continue;
            };
            if record.addr == self.link_addr && !record.is_conflict_marker() {
                continue;
            }
            conflicted = true;
            if record.addr != self.link_addr && record.addr != [0; 8] {
                challenger = Some(record.addr);
            }
        }
        if mine != 0 {
            if let Some(record) = capture.closure_record(mine) {
                if record.addr != self.link_addr && record.addr != [0; 8] {
                    conflicted = true;
                    challenger = Some(record.addr);
                }
            }
        }

        // A named challenger with a known position gets the distance
        // comparison; otherwise plain backoff applies.
        if let Some(addr) = challenger {
            if let (Some(fix), Some((x, y, z))) =
                (self.fix, neighbors.get(&addr).and_then(|n| n.position))
            {
                self.role.on_challenger(
                    fix.position,
                    Vec3::new(x, y, z),
                    config.lattice_edge_r,
                    config.hysteresis,
                );
            }
        }

        conflicted
    }

    /// Distances with positions attached, after the non-local and stale
    /// filters. The prime is always anchor 0 when it was heard.
    fn gather_anchors(
        &self,
        capture: &SlotCapture,
        ranging: &ranging::Ranging,
        config: &Config,
    ) -> Vec<Anchor, 6> {
        let mut anchors = Vec::new();

        for i in 0..6u8 {
            if capture.my_sub_offset == Some(i) {
                continue;
            }
            let Some(frame) = capture.frames[i as usize].as_ref() else {
                continue;
            };
            let (x, y, z) = frame.body.position;
            if x.is_nan() || y.is_nan() || z.is_nan() {
                continue;
            }
            let position = Vec3::new(x, y, z);

            let measurement = if capture.transmitted() {
                ranging.distance_to(i)
            } else {
                ranging.pseudo[i as usize]
            };
            let Some(measurement) = measurement else {
                continue;
            };

            // Non-local filter needs an own position to compare against.
            if let Some(fix) = self.fix {
                if optimizer::is_non_local(fix.position, position, config.lattice_edge_r) {
                    continue;
                }
            }

            // Cross-check this beacon's report against the distances the
            // other beacons measured to it.
            let mut checks: Vec<(f32, f32), 6> = Vec::new();
            for j in 1..6u8 {
                if j == i || capture.my_sub_offset == Some(j) {
                    continue;
                }
                let Some(other) = capture.frames[j as usize].as_ref() else {
                    continue;
                };
                let (ox, oy, oz) = other.body.position;
                if ox.is_nan() || oy.is_nan() || oz.is_nan() {
                    continue;
                }
                let (lo, hi) = if i < j { (i, j) } else { (j, i) };
                if lo == 0 {
                    continue;
                }
                if let Some(measured) = ranging::inter_beacon_distance(capture, ranging, lo, hi) {
                    let implied = (position - Vec3::new(ox, oy, oz)).norm();
                    checks.push((measured, implied)).ok();
                }
            }
            if optimizer::is_stale(&checks, config.lattice_edge_r) {
                continue;
            }

            anchors
                .push((position, measurement, capture.participants[i as usize]))
                .ok();
        }

        anchors
    }

    fn majority_inverted(&self, capture: &SlotCapture, config: &Config) -> bool {
        let Some(fix) = self.fix else {
            return false;
        };
        let mut total = 0;
        let mut non_local = 0;
        for frame in capture.frames.iter().take(6).flatten() {
            let (x, y, z) = frame.body.position;
            if x.is_nan() || y.is_nan() || z.is_nan() {
                continue;
            }
            total += 1;
            if optimizer::is_non_local(fix.position, Vec3::new(x, y, z), config.lattice_edge_r) {
                non_local += 1;
            }
        }
        optimizer::majority_inversion(non_local, total)
    }

    fn run_solver(
        &mut self,
        choice: SolverChoice,
        capture: &SlotCapture,
        anchors: &[Anchor],
        ranging: &ranging::Ranging,
        config: &Config,
    ) -> Result<Option<Vec3>, SolveError> {
        let plain: Vec<(Vec3, f32), 6> =
            anchors.iter().map(|&(p, d, _)| (p, d)).collect();

        match choice {
            SolverChoice::Origin => Ok(Some(Vec3::ZERO)),
            SolverChoice::Line => {
                let d = ranging.my_d0.ok_or(SolveError::Underdetermined)?;
                Ok(Some(solvers::line(d)))
            }
            SolverChoice::Sphere2Pos | SolverChoice::Sphere2Neg => {
                if anchors.len() < 2 {
                    return Err(SolveError::Underdetermined);
                }
                let positive = match choice {
                    SolverChoice::Sphere2Pos => true,
                    _ => self.sphere2_root_sign(capture.participants[0], anchors),
                };
                solvers::sphere2(plain[0].0, plain[1].0, plain[0].1, plain[1].1, positive)
                    .map(Some)
            }
            SolverChoice::Sphere3 => {
                if anchors.len() < 3 {
                    return Err(SolveError::Underdetermined);
                }
                let hint = self.sphere3_sign_hint(capture.participants[0], anchors);
                solvers::sphere3(
                    [plain[0].0, plain[1].0, plain[2].0],
                    [plain[0].1, plain[1].1, plain[2].1],
                    hint,
                )
                .map(Some)
            }
            SolverChoice::Toa => solvers::toa(&plain).map(Some),
            SolverChoice::Tdoa => solvers::tdoa(&plain).map(Some),
            SolverChoice::Spring => {
                let fix = self.fix.ok_or(SolveError::Underdetermined)?;
                let lattice_point = LatticePoint::nearest(fix.position, config.lattice_edge_r)
                    .position(config.lattice_edge_r);
                let (position, velocity) = solvers::spring_step(
                    fix.position,
                    self.velocity,
                    &plain,
                    lattice_point,
                    &self.spring,
                );
                self.velocity = velocity;
                Ok(Some(position))
            }
            SolverChoice::Lost => Err(SolveError::Underdetermined),
        }
    }

    /// The side of the anchor plane the lattice expects this node on:
    /// the triple product of the basis anchors' expected offsets against
    /// this node's own.
    fn sphere3_sign_hint(&self, prime: u8, anchors: &[Anchor]) -> f32 {
        let e = [
            self.expected_offset(prime, anchors[0].2),
            self.expected_offset(prime, anchors[1].2),
            self.expected_offset(prime, anchors[2].2),
            self.own_expected_offset(prime),
        ];
        let [Some(e0), Some(e1), Some(e2), Some(me)] = e else {
            return 1.0;
        };
        let hint = (e1 - e0).cross(e2 - e0).dot(me - e0);
        if hint == 0.0 {
            1.0
        } else {
            hint
        }
    }

    /// Which side of the two-anchor axis the lattice expects this node
    /// on, in the shared z = 0 bootstrap plane.
    fn sphere2_root_sign(&self, prime: u8, anchors: &[Anchor]) -> bool {
        let (Some(e0), Some(e1), Some(me)) = (
            self.expected_offset(prime, anchors[0].2),
            self.expected_offset(prime, anchors[1].2),
            self.own_expected_offset(prime),
        ) else {
            return true;
        };
        let axis = e1 - e0;
        let perp = Vec3::new(-axis.y, axis.x, 0.0);
        perp.dot(me - e0) >= 0.0
    }

    fn expected_offset(&self, prime: u8, index: u8) -> Option<Vec3> {
        if index == prime {
            return Some(Vec3::ZERO);
        }
        let d = expected_offset_from_prime(prime, index)?;
        Some(Vec3::new(d[0] as f32, d[1] as f32, d[2] as f32))
    }

    fn own_expected_offset(&self, prime: u8) -> Option<Vec3> {
        let index = self.role.current()?;
        if is_prime(index) && index == prime {
            return Some(Vec3::ZERO);
        }
        self.expected_offset(prime, index)
    }

    fn commit(&mut self, position: Vec3) {
        let seq = match self.fix {
            Some(fix) => fix.seq.wrapping_add(1),
            None => 1,
        };
        self.fix = Some(PositionFix { position, seq });
    }

    /// Refresh the routing coordinate from the committed position; the
    /// sequence advances only when the coordinate actually moves.
    fn refresh_routing_coord(&mut self, config: &Config) {
        let Some(fix) = self.fix else {
            return;
        };
        let lattice_point = LatticePoint::nearest(fix.position, config.lattice_edge_r);
        let coord = embed(lattice_point);
        if coord != self.routing_coord {
            self.routing_coord = coord;
            self.coord_seq = self.coord_seq.wrapping_add(1);
        }
    }

    /// Claim a bootstrap role before the node has a position: the
    /// founder becomes beacon 0; the chain 4, 9, 13 follows as earlier
    /// bootstrap beacons become audible.
    fn bootstrap_claim(&mut self, neighbors: &NeighborTable, config: &Config) {
        if !config.allow_beaconing || self.role.current().is_some() || self.fix.is_some() {
            return;
        }

        let heard = neighbors.heard_beacon_mask();
        let vacant = |index: u8| neighbors.beacon(index).is_none();

        let claim = if self.founder && neighbors.is_empty() {
            Some(0)
        } else if heard & 1 != 0 && vacant(4) {
            Some(4)
        } else if heard & 0b1_0001 == 0b1_0001 && vacant(9) {
            Some(9)
        } else if heard & 0b10_0001_0001 == 0b10_0001_0001 && vacant(13) {
            Some(13)
        } else {
            None
        };

        if let Some(index) = claim {
            self.role.force_claim(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::ranging::tests::synthesise;
    use super::*;
    use crate::time::METERS_PER_TICK;

    fn config() -> Config {
        Config { lattice_edge_r: 30.0, ..Config::default() }
    }

    fn engine(addr: u8) -> LocationEngine {
        LocationEngine::new([addr; 8], &config())
    }

    #[test]
    fn founder_bootstraps_the_origin() {
        let mut engine = engine(1);
        engine.set_founder(true);
        let mut neighbors = NeighborTable::new();
        let mut rng = StdRng::seed_from_u64(1);

        let driver = engine.plan_slot(0, 0, &neighbors, &config(), &mut rng);
        assert_eq!(engine.beacon_index(), Some(0));
        assert!(driver.is_prime());

        // Alone in the slot: no frames, but the node transmitted.
        let mut capture = driver.finish();
        capture.my_tx_sfd = Some(crate::time::Instant::from_ticks(1_000));

        let outcome = engine.process_slot(capture, &mut neighbors, Asn::new(2), &config());
        assert_eq!(outcome.solver, SolverChoice::Origin);
        assert!(outcome.updated);

        let fix = engine.position().unwrap();
        assert_eq!(fix.position, Vec3::ZERO);
        assert_eq!(fix.seq, 1);
        let (coord, _) = engine.routing_coord();
        assert!(coord.r.abs() < 1e-6);
    }

    #[test]
    fn joiner_never_claims_the_origin() {
        let mut engine = engine(2);
        let neighbors = NeighborTable::new();
        let mut rng = StdRng::seed_from_u64(1);
        let _ = engine.plan_slot(0, 0, &neighbors, &config(), &mut rng);
        assert_eq!(engine.beacon_index(), None);
    }

    #[test]
    fn line_bootstrap_lands_on_the_x_axis() {
        // S2: the origin beacon at (0,0,0); this node 1.000 m away,
        // transmitting at sub-offset 1 as beacon 4.
        let mut engine = engine(2);
        let mut neighbors = NeighborTable::new();
        neighbors.heard([1; 8], Asn::new(1)).beacon_index = Some(0);
        neighbors.get_mut(&[1; 8]).unwrap().position = Some((0.0, 0.0, 0.0));

        let mut rng = StdRng::seed_from_u64(1);
        let driver = engine.plan_slot(0, 0, &neighbors, &config(), &mut rng);
        assert_eq!(engine.beacon_index(), Some(4));
        assert_eq!(driver.finish().my_sub_offset, Some(1));

        let positions = [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)];
        let capture = synthesise(&positions, positions[1], Some(1), table::participants(0, 0));
        let outcome = engine.process_slot(capture, &mut neighbors, Asn::new(2), &config());

        assert_eq!(outcome.solver, SolverChoice::Line);
        let fix = engine.position().unwrap();
        assert!((fix.position.x - 1.0).abs() < 2.0 * METERS_PER_TICK);
        assert_eq!((fix.position.y, fix.position.z), (0.0, 0.0));
        // The bootstrap role survives quantising near the origin cell.
        assert_eq!(engine.beacon_index(), Some(4));
    }

    #[test]
    fn conflict_marker_triggers_backoff() {
        // S5 at the engine level: this node transmits at sub-offset 1 and
        // a later frame reports another address there.
        let cfg = config();
        let mut engine = engine(2);
        let mut neighbors = NeighborTable::new();
        neighbors.heard([1; 8], Asn::new(1)).beacon_index = Some(0);
        neighbors.get_mut(&[1; 8]).unwrap().position = Some((0.0, 0.0, 0.0));

        let mut rng = StdRng::seed_from_u64(3);
        let _ = engine.plan_slot(0, 0, &neighbors, &cfg, &mut rng);
        assert_eq!(engine.beacon_index(), Some(4));

        let positions = [
            Vec3::ZERO,
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 30.0, 0.0),
        ];
        let mut capture =
            synthesise(&positions, positions[1], Some(1), table::participants(0, 0));
        // Beacon at sub-offset 2 heard someone else in our sub-offset.
        if let Some(frame) = capture.frames[2].as_mut() {
            frame.body.records[1].addr = [9; 8];
        }

        let outcome = engine.process_slot(capture, &mut neighbors, Asn::new(2), &cfg);
        assert!(outcome.conflict);

        // Forced silence for backoff_count cycles.
        for _ in 0..cfg.backoff_count {
            let driver = engine.plan_slot(0, 0, &neighbors, &cfg, &mut rng);
            assert_eq!(driver.finish().my_sub_offset, None);
            let capture = synthesise(&positions, positions[1], None, table::participants(0, 0));
            let _ = engine.process_slot(capture, &mut neighbors, Asn::new(3), &cfg);
        }

        // Eventually the probabilistic re-attempt fires again.
        let mut resumed = false;
        for _ in 0..64 {
            let driver = engine.plan_slot(0, 0, &neighbors, &cfg, &mut rng);
            if driver.finish().my_sub_offset.is_some() {
                resumed = true;
                break;
            }
        }
        assert!(resumed);
    }

    #[test]
    fn collision_winner_keeps_transmitting() {
        // The other side of a sub-offset collision: the beacon whose
        // frame the observers actually captured sees its own address in
        // their records and stays on the air.
        let cfg = config();
        let mut engine = engine(2);
        let mut neighbors = NeighborTable::new();
        neighbors.heard([1; 8], Asn::new(1)).beacon_index = Some(0);
        neighbors.get_mut(&[1; 8]).unwrap().position = Some((0.0, 0.0, 0.0));

        let mut rng = StdRng::seed_from_u64(3);
        let _ = engine.plan_slot(0, 0, &neighbors, &cfg, &mut rng);
        assert_eq!(engine.beacon_index(), Some(4));

        let positions = [
            Vec3::ZERO,
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 30.0, 0.0),
        ];
        let mut capture =
            synthesise(&positions, positions[1], Some(1), table::participants(0, 0));
        if let Some(frame) = capture.frames[2].as_mut() {
            frame.body.records[1].addr = [2; 8];
            frame.body.records[1].tstamp = 100;
        }

        let _ = engine.process_slot(capture, &mut neighbors, Asn::new(2), &cfg);

        let driver = engine.plan_slot(0, 0, &neighbors, &cfg, &mut rng);
        assert_eq!(driver.finish().my_sub_offset, Some(1));
    }

    #[test]
    fn passive_coplanar_listener_does_not_update() {
        // S4: four coplanar beacons plus the prime in the same plane; a
        // passive listener's TDOA is rank deficient.
        let mut engine = engine(9);
        let mut neighbors = NeighborTable::new();
        // Enough beacon neighbours for the nominal branch.
        for (i, index) in [0u8, 4, 7, 8, 9].iter().enumerate() {
            let addr = [i as u8 + 1; 8];
            neighbors.heard(addr, Asn::new(1)).beacon_index = Some(*index);
        }

        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 30.0, 0.0),
            Vec3::new(30.0, 30.0, 0.0),
            Vec3::new(-30.0, 15.0, 0.0),
        ];
        let me = Vec3::new(5.0, 5.0, 11.0);
        let capture = synthesise(&positions, me, None, table::participants(0, 0));
        let outcome = engine.process_slot(capture, &mut neighbors, Asn::new(2), &config());

        assert_eq!(outcome.solver, SolverChoice::Lost);
        assert!(!outcome.updated);
        assert!(engine.position().is_none());
    }

    #[test]
    fn passive_tdoa_fixes_a_listener() {
        let mut engine = engine(9);
        let mut neighbors = NeighborTable::new();
        for (i, index) in [0u8, 4, 7, 8, 9].iter().enumerate() {
            let addr = [i as u8 + 1; 8];
            neighbors.heard(addr, Asn::new(1)).beacon_index = Some(*index);
        }

        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 30.0, 0.0),
            Vec3::new(0.0, 0.0, 30.0),
            Vec3::new(30.0, 30.0, 30.0),
            Vec3::new(-30.0, 10.0, 10.0),
        ];
        let me = Vec3::new(8.0, 14.0, 5.0);
        let capture = synthesise(&positions, me, None, table::participants(0, 0));
        let outcome = engine.process_slot(capture, &mut neighbors, Asn::new(2), &config());

        assert_eq!(outcome.solver, SolverChoice::Tdoa);
        assert!(outcome.updated);
        let fix = engine.position().unwrap();
        assert!((fix.position - me).norm() < 0.05, "{:?}", fix.position);
    }
}
