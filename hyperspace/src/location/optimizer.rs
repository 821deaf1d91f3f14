//! Beacon-role arbitration and measurement sanity checks.
//!
//! Every location update re-derives which lattice point the node sits
//! nearest to and whether it should serve as that point's beacon. Claims
//! are armed with a delay proportional to the node's distance from the
//! lattice point, so a nearer candidate always preempts a farther one;
//! hysteresis keeps two borderline candidates from flapping.

use micromath::F32Ext;

use super::lattice::LatticePoint;
use super::linalg::Vec3;

/// Multiplier from claim distance (in lattice edges) to claim delay (in
/// location cycles).
const CLAIM_DELAY_SCALE: f32 = 8.0;

/// What the optimiser wants done after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleAction {
    /// Nothing changes.
    Hold,
    /// Start transmitting as this index.
    Claim(u8),
    /// Stop transmitting; the role was lost or the position is gone.
    Vacate,
}

/// The node's beacon-role state machine.
#[derive(Debug, Default)]
pub struct RoleOptimizer {
    /// The index the node currently transmits as.
    current: Option<u8>,
    /// An armed claim: `(index, cycles until it fires)`.
    armed: Option<(u8, u32)>,
}

impl RoleOptimizer {
    /// Create an idle optimiser.
    pub fn new() -> Self {
        Self::default()
    }

    /// The index the node currently holds.
    pub fn current(&self) -> Option<u8> {
        self.current
    }

    /// Re-evaluate the role after a position update.
    ///
    /// `incumbent` is the position the current holder of the target index
    /// reports, if any is heard.
    pub fn after_update(
        &mut self,
        position: Vec3,
        lattice_edge: f32,
        hysteresis: f32,
        allow_beaconing: bool,
        incumbent: Option<Vec3>,
    ) -> RoleAction {
        if !allow_beaconing {
            self.armed = None;
            return if self.current.take().is_some() { RoleAction::Vacate } else { RoleAction::Hold };
        }

        // A held role is sticky: it falls only to a closer candidate
        // (through on_challenger) or with the position itself.
        if self.current.is_some() {
            return RoleAction::Hold;
        }

        let target = LatticePoint::nearest(position, lattice_edge);
        let index = target.beacon_index();
        let my_dist = (position - target.position(lattice_edge)).norm();

        // Only challenge an incumbent we are decisively nearer than.
        let challenge = match incumbent {
            Some(inc_position) => {
                let inc_dist = (inc_position - target.position(lattice_edge)).norm();
                my_dist < inc_dist * (1.0 - hysteresis)
            }
            None => true,
        };

        if !challenge {
            self.armed = None;
            return RoleAction::Hold;
        }

        match &mut self.armed {
            Some((armed_index, cycles)) if *armed_index == index => {
                if *cycles == 0 {
                    self.armed = None;
                    self.current = Some(index);
                    return RoleAction::Claim(index);
                }
                *cycles -= 1;
            }
            _ => {
                let cycles = (my_dist / lattice_edge * CLAIM_DELAY_SCALE) as u32;
                self.armed = Some((index, cycles));
            }
        }

        RoleAction::Hold
    }

    /// A challenger collided in our sub-offset and reports its position.
    /// Vacate when it is decisively nearer the lattice point.
    pub fn on_challenger(
        &mut self,
        position: Vec3,
        challenger: Vec3,
        lattice_edge: f32,
        hysteresis: f32,
    ) -> RoleAction {
        let Some(index) = self.current else {
            return RoleAction::Hold;
        };
        let target = LatticePoint::nearest_with_index(position, lattice_edge, index);

        let my_dist = (position - target.position(lattice_edge)).norm();
        let challenger_dist = (challenger - target.position(lattice_edge)).norm();

        if challenger_dist < my_dist * (1.0 - hysteresis) {
            self.current = None;
            RoleAction::Vacate
        } else {
            RoleAction::Hold
        }
    }

    /// Take a role directly, bypassing the armed delay. Used by the
    /// bootstrap ladder, where the claimed index is not derived from a
    /// position yet.
    pub fn force_claim(&mut self, index: u8) {
        self.current = Some(index);
        self.armed = None;
    }

    /// The position was lost; the role goes with it.
    pub fn position_lost(&mut self) -> RoleAction {
        self.armed = None;
        if self.current.take().is_some() {
            RoleAction::Vacate
        } else {
            RoleAction::Hold
        }
    }
}

/// A beacon whose reported position is farther than `sqrt(3) * R` cannot
/// be a lattice neighbour; ignore it for the update.
pub fn is_non_local(position: Vec3, beacon: Vec3, lattice_edge: f32) -> bool {
    (position - beacon).norm() > 3.0f32.sqrt() * lattice_edge
}

/// More than half of the otherwise-in-neighbourhood beacons flagged
/// non-local means the node itself is the outlier: its position is
/// invalid.
pub fn majority_inversion(non_local: usize, total: usize) -> bool {
    total > 0 && non_local * 2 > total
}

/// A peer whose reported position disagrees with more than half of the
/// distances measured against it is stale; its report is ignored while
/// the peer keeps converging on its own.
pub fn is_stale(measured_vs_implied: &[(f32, f32)], lattice_edge: f32) -> bool {
    if measured_vs_implied.is_empty() {
        return false;
    }
    let bad = measured_vs_implied
        .iter()
        .filter(|(measured, implied)| (measured - implied).abs() > 0.3 * lattice_edge)
        .count();
    bad * 2 > measured_vs_implied.len()
}
