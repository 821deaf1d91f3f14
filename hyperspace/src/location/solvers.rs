//! Position solvers.
//!
//! A deterministic decision table picks the solver for each location
//! update; the network bootstraps through the early branches, so each one
//! is exact about its contract. All solvers are pure functions of
//! captured state.

use micromath::F32Ext;

use super::linalg::{lstsq3, LinalgError, Vec3};

/// Why a solver could not produce a fix.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SolveError {
    /// The geometry is degenerate (co-planar beacons, coincident
    /// anchors, or an unreachable sphere intersection).
    Degenerate,
    /// Not enough measurements for any branch.
    Underdetermined,
}

/// The solver branch chosen for an update.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SolverChoice {
    /// Iterative spring relaxation of an existing estimate.
    Spring,
    /// Over-determined time-of-arrival multilateration.
    Toa,
    /// Over-determined time-difference-of-arrival multilateration.
    Tdoa,
    /// Exact three-sphere intersection.
    Sphere3,
    /// Claim the origin (bootstrap beacon 0).
    Origin,
    /// One distance from the origin (bootstrap beacon 4).
    Line,
    /// Two-sphere intersection, positive root (bootstrap beacon 9).
    Sphere2Pos,
    /// Two-sphere intersection, root picked by cross-product sign
    /// (bootstrap beacon 13).
    Sphere2Neg,
    /// No branch applies; the position is lost.
    Lost,
}

/// The decision table. `beacon_neighbors` counts beacons currently in
/// the neighbour table; `beacons_in_update` counts the distances the
/// current slot produced; `coplanar` is the outcome of a previous
/// rank-deficiency failure for this update.
#[allow(clippy::too_many_arguments)]
pub fn select(
    transmitted: bool,
    has_position: bool,
    beacon_neighbors: usize,
    beacons_in_update: usize,
    coplanar: bool,
    my_index: Option<u8>,
    origin_in_neighborhood: bool,
) -> SolverChoice {
    if beacon_neighbors >= 4 {
        if transmitted && has_position {
            return SolverChoice::Spring;
        }
        if beacons_in_update >= 5 && !coplanar {
            return if transmitted { SolverChoice::Toa } else { SolverChoice::Tdoa };
        }
        if transmitted && beacons_in_update == 4 {
            return SolverChoice::Sphere3;
        }
    } else if transmitted {
        // Beacon 0 does not need neighbours: it becomes the origin.
        if my_index == Some(0) {
            return SolverChoice::Origin;
        }
        if origin_in_neighborhood {
            match my_index {
                Some(4) => return SolverChoice::Line,
                Some(9) => return SolverChoice::Sphere2Pos,
                Some(13) => return SolverChoice::Sphere2Neg,
                _ => {}
            }
        }
    }

    SolverChoice::Lost
}

/// Bootstrap line: one distance from the origin fixes the +x axis.
pub fn line(d01: f32) -> Vec3 {
    Vec3::new(d01, 0.0, 0.0)
}

/// Two-sphere intersection in the z = 0 plane.
///
/// `positive_root` picks the +y-side solution; the other root mirrors
/// across the axis through the anchors.
pub fn sphere2(p0: Vec3, p1: Vec3, r0: f32, r1: f32, positive_root: bool) -> Result<Vec3, SolveError> {
    let v = p1 - p0;
    let d = v.norm();
    if d <= f32::EPSILON {
        return Err(SolveError::Degenerate);
    }

    let l = (r0 * r0 - r1 * r1 + d * d) / (2.0 * d);
    let h_sq = r0 * r0 - l * l;
    if h_sq < -(r0 * r0) * 1e-3 {
        // The spheres do not intersect beyond measurement noise.
        return Err(SolveError::Degenerate);
    }
    let h = h_sq.max(0.0).sqrt() * if positive_root { 1.0 } else { -1.0 };

    Ok(Vec3::new(
        (l / d) * v.x - (h / d) * v.y + p0.x,
        (l / d) * v.y + (h / d) * v.x + p0.y,
        0.0,
    ))
}

/// Exact three-sphere intersection.
///
/// The two candidate roots differ in the sign of the component along
/// `u3 = u1 x u2`. `sign_hint` disambiguates: the caller passes the
/// scalar triple product of the *expected* lattice offsets of the three
/// anchors, which lies on the same side as the true solution even before
/// the node knows where it is.
pub fn sphere3(
    p: [Vec3; 3],
    r: [f32; 3],
    sign_hint: f32,
) -> Result<Vec3, SolveError> {
    let d = (p[1] - p[0]).norm();
    if d <= f32::EPSILON {
        return Err(SolveError::Degenerate);
    }
    let u1 = (p[1] - p[0]) * (1.0 / d);

    let rej = (p[2] - p[0]).reject(u1);
    let rej_norm = rej.norm();
    if rej_norm <= f32::EPSILON {
        return Err(SolveError::Degenerate);
    }
    let u2 = rej * (1.0 / rej_norm);
    let u3 = u1.cross(u2);

    let i = u1.dot(p[2] - p[0]);
    let j = u2.dot(p[2] - p[0]);

    let l = (r[0] * r[0] - r[1] * r[1] + d * d) / (2.0 * d);
    let w = (r[0] * r[0] - r[2] * r[2] + i * i + j * j - 2.0 * i * l) / (2.0 * j);
    let h_sq = r[0] * r[0] - l * l - w * w;
    if h_sq < -(r[0] * r[0]) * 1e-3 {
        return Err(SolveError::Degenerate);
    }
    let h = h_sq.max(0.0).sqrt() * if sign_hint < 0.0 { -1.0 } else { 1.0 };

    Ok(p[0] + u1 * l + u2 * w + u3 * h)
}

/// Over-determined TOA multilateration: `n >= 4` anchors with absolute
/// distances. Differencing anchor 0 from the rest linearises the system;
/// QR solves it and reports co-planar geometry as rank deficiency.
pub fn toa(anchors: &[(Vec3, f32)]) -> Result<Vec3, SolveError> {
    if anchors.len() < 4 {
        return Err(SolveError::Underdetermined);
    }

    let (p0, r0) = anchors[0];
    let mut rows = heapless::Vec::<[f32; 3], { super::linalg::MAX_ROWS }>::new();
    let mut rhs = heapless::Vec::<f32, { super::linalg::MAX_ROWS }>::new();

    for &(pi, ri) in &anchors[1..] {
        let row = (pi - p0) * 2.0;
        let b = r0 * r0 - ri * ri + pi.norm_sq() - p0.norm_sq();
        if rows.push([row.x, row.y, row.z]).is_err() || rhs.push(b).is_err() {
            break;
        }
    }

    lstsq3(&rows, &rhs).map_err(|e| match e {
        LinalgError::RankDeficient => SolveError::Degenerate,
        LinalgError::TooManyRows => SolveError::Underdetermined,
    })
}

/// Over-determined TDOA multilateration: anchor 0 is the prime, the
/// remaining anchors carry pseudoranges `p_i` with the true distance
/// `d_i = p_i + d0` for the unknown prime distance `d0`.
///
/// The linear system is solved symbolically in `d0` (`x = u + v * d0`),
/// then `|x - p0|^2 = d0^2` closes the scalar quadratic; the positive
/// root is the physical one.
pub fn tdoa(anchors: &[(Vec3, f32)]) -> Result<Vec3, SolveError> {
    if anchors.len() < 5 {
        return Err(SolveError::Underdetermined);
    }

    let (p0, _) = anchors[0];
    let mut rows = heapless::Vec::<[f32; 3], { super::linalg::MAX_ROWS }>::new();
    let mut b0 = heapless::Vec::<f32, { super::linalg::MAX_ROWS }>::new();
    let mut b1 = heapless::Vec::<f32, { super::linalg::MAX_ROWS }>::new();

    for &(pi, pr) in &anchors[1..] {
        let row = (pi - p0) * 2.0;
        if rows.push([row.x, row.y, row.z]).is_err() {
            break;
        }
        b0.push(pi.norm_sq() - p0.norm_sq() - pr * pr).ok();
        b1.push(-2.0 * pr).ok();
    }

    let map_err = |e| match e {
        LinalgError::RankDeficient => SolveError::Degenerate,
        LinalgError::TooManyRows => SolveError::Underdetermined,
    };
    let u = lstsq3(&rows, &b0).map_err(map_err)?;
    let v = lstsq3(&rows, &b1).map_err(map_err)?;

    // |u - p0 + v d0|^2 = d0^2.
    let w = u - p0;
    let a = v.norm_sq() - 1.0;
    let b = 2.0 * w.dot(v);
    let c = w.norm_sq();

    // Residual of a candidate offset against the first range equation;
    // the spurious quadratic root only satisfies the system in the
    // least-squares sense, so the physical root scores lower.
    let residual = |d0: f32| -> f32 {
        let x = u + v * d0;
        let (p1, pr1) = anchors[1];
        ((x - p1).norm() - (pr1 + d0)).abs()
    };

    let d0 = if a.abs() < 1e-6 {
        if b.abs() < f32::EPSILON {
            return Err(SolveError::Degenerate);
        }
        -c / b
    } else {
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return Err(SolveError::Degenerate);
        }
        let sqrt_disc = disc.sqrt();
        let root1 = (-b + sqrt_disc) / (2.0 * a);
        let root2 = (-b - sqrt_disc) / (2.0 * a);
        match (root1 > 0.0, root2 > 0.0) {
            (true, true) => {
                if residual(root1) <= residual(root2) {
                    root1
                } else {
                    root2
                }
            }
            (true, false) => root1,
            (false, true) => root2,
            (false, false) => return Err(SolveError::Degenerate),
        }
    };

    if d0 < 0.0 {
        return Err(SolveError::Degenerate);
    }

    Ok(u + v * d0)
}

/// Constants of the spring relaxation.
#[derive(Debug, Clone, Copy)]
pub struct SpringParams {
    /// Spring constant toward measured distances.
    pub ks: f32,
    /// Lattice gravity toward the nearest lattice point.
    pub kg: f32,
    /// Velocity damping.
    pub b: f32,
    /// Node mass.
    pub m: f32,
    /// Integration step.
    pub dt: f32,
}

impl Default for SpringParams {
    fn default() -> Self {
        Self { ks: 1.0, kg: 0.2, b: 2.0, m: 1.0, dt: 0.01 }
    }
}

/// One spring-relaxation step, run once per location slot.
///
/// The damping plus lattice gravity act as a low-pass filter over the
/// per-slot distance measurements and pin down long-term drift. Returns
/// the updated `(position, velocity)`.
pub fn spring_step(
    position: Vec3,
    velocity: Vec3,
    neighbors: &[(Vec3, f32)],
    lattice_point: Vec3,
    params: &SpringParams,
) -> (Vec3, Vec3) {
    let mut accel = Vec3::ZERO;

    for &(nbr_position, measured) in neighbors {
        let v = nbr_position - position;
        if v.norm_sq() <= f32::EPSILON {
            continue;
        }
        let target = v.unit() * measured;
        accel = accel + (target - v) * (params.ks / params.m) * -1.0;
    }

    accel = accel + (lattice_point - position) * (params.kg / params.m);
    accel = accel - velocity * (params.b / params.m);

    let velocity = velocity + accel * params.dt;
    let position = position + velocity * params.dt;
    (position, velocity)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MM: f32 = 0.001;

    #[test]
    fn line_bootstrap() {
        // A node 1.000 m from the origin lands on the +x axis.
        let p = line(1.0);
        assert_eq!(p, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn sphere2_roots() {
        let p0 = Vec3::ZERO;
        let p1 = Vec3::new(10.0, 0.0, 0.0);
        let truth = Vec3::new(4.0, 6.0, 0.0);
        let r0 = truth.norm();
        let r1 = (truth - p1).norm();

        let pos = sphere2(p0, p1, r0, r1, true).unwrap();
        assert!((pos - truth).norm() < MM);

        let neg = sphere2(p0, p1, r0, r1, false).unwrap();
        assert!((neg - Vec3::new(4.0, -6.0, 0.0)).norm() < MM);
    }

    #[test]
    fn sphere2_disjoint_spheres() {
        let p0 = Vec3::ZERO;
        let p1 = Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(sphere2(p0, p1, 1.0, 1.0, true), Err(SolveError::Degenerate));
        assert_eq!(sphere2(p0, p0, 1.0, 1.0, true), Err(SolveError::Degenerate));
    }

    #[test]
    fn sphere3_picks_the_hinted_root() {
        // The S3 bootstrap triangle.
        let p = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.5, 0.866_025, 0.0),
        ];
        let truth = Vec3::new(0.5, 0.289, 0.816);
        let r = [truth.norm(), (truth - p[1]).norm(), (truth - p[2]).norm()];

        let above = sphere3(p, r, 1.0).unwrap();
        assert!((above - truth).norm() < 0.01, "{above:?}");

        let below = sphere3(p, r, -1.0).unwrap();
        assert!((below - Vec3::new(0.5, 0.289, -0.816)).norm() < 0.01);
    }

    #[test]
    fn toa_idempotent_on_exact_distances() {
        let truth = Vec3::new(12.5, -3.0, 7.25);
        let anchors_pos = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 30.0, 0.0),
            Vec3::new(0.0, 0.0, 30.0),
            Vec3::new(30.0, 30.0, 30.0),
        ];
        let anchors: heapless::Vec<(Vec3, f32), 5> = anchors_pos
            .iter()
            .map(|&p| (p, (truth - p).norm()))
            .collect();
        let pos = toa(&anchors).unwrap();
        assert!((pos - truth).norm() < MM, "{pos:?}");
    }

    #[test]
    fn toa_rejects_coplanar_anchors() {
        let anchors = [
            (Vec3::new(0.0, 0.0, 0.0), 5.0),
            (Vec3::new(30.0, 0.0, 0.0), 25.0),
            (Vec3::new(0.0, 30.0, 0.0), 25.0),
            (Vec3::new(30.0, 30.0, 0.0), 35.0),
        ];
        assert_eq!(toa(&anchors), Err(SolveError::Degenerate));
    }

    #[test]
    fn tdoa_recovers_position_and_offset() {
        let truth = Vec3::new(8.0, 14.0, -5.0);
        let anchors_pos = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 30.0, 0.0),
            Vec3::new(0.0, 0.0, 30.0),
            Vec3::new(30.0, 30.0, 30.0),
            Vec3::new(-30.0, 10.0, 10.0),
        ];
        let d0 = truth.norm();
        let anchors: heapless::Vec<(Vec3, f32), 6> = anchors_pos
            .iter()
            .map(|&p| (p, (truth - p).norm() - d0))
            .collect();
        let pos = tdoa(&anchors).unwrap();
        assert!((pos - truth).norm() < 0.01, "{pos:?}");
    }

    #[test]
    fn tdoa_rejects_coplanar_anchors() {
        // Four coplanar anchors plus the prime in the same plane: the
        // listener must not update.
        let truth = Vec3::new(5.0, 5.0, 11.0);
        let anchors_pos = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 30.0, 0.0),
            Vec3::new(30.0, 30.0, 0.0),
            Vec3::new(-30.0, 15.0, 0.0),
        ];
        let d0 = truth.norm();
        let anchors: heapless::Vec<(Vec3, f32), 5> = anchors_pos
            .iter()
            .map(|&p| (p, (truth - p).norm() - d0))
            .collect();
        assert_eq!(tdoa(&anchors), Err(SolveError::Degenerate));
    }

    #[test]
    fn spring_converges_toward_truth() {
        let truth = Vec3::new(10.0, 10.0, 10.0);
        let neighbors_pos = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 30.0, 0.0),
            Vec3::new(0.0, 0.0, 30.0),
        ];
        let neighbors: heapless::Vec<(Vec3, f32), 4> = neighbors_pos
            .iter()
            .map(|&p| (p, (truth - p).norm()))
            .collect();

        let params = SpringParams::default();
        let mut position = Vec3::new(12.0, 8.0, 9.0);
        let mut velocity = Vec3::ZERO;
        let start_err = (position - truth).norm();

        for _ in 0..2_000 {
            let (p, v) = spring_step(position, velocity, &neighbors, truth, &params);
            position = p;
            velocity = v;
        }

        let end_err = (position - truth).norm();
        assert!(end_err < start_err / 10.0, "{start_err} -> {end_err}");
    }

    #[test]
    fn decision_table_branches() {
        // Nominal branches.
        assert_eq!(select(true, true, 5, 5, false, Some(8), false), SolverChoice::Spring);
        assert_eq!(select(true, false, 5, 5, false, Some(8), false), SolverChoice::Toa);
        assert_eq!(select(false, false, 5, 5, false, None, false), SolverChoice::Tdoa);
        assert_eq!(select(true, false, 4, 4, false, Some(8), false), SolverChoice::Sphere3);
        // Coplanar geometry falls through to the 4-beacon branch or Lost.
        assert_eq!(select(true, false, 5, 4, true, Some(8), false), SolverChoice::Sphere3);
        assert_eq!(select(false, false, 5, 5, true, None, false), SolverChoice::Lost);
        // Bootstrap branches.
        assert_eq!(select(true, false, 0, 0, false, Some(0), false), SolverChoice::Origin);
        assert_eq!(select(true, false, 1, 1, false, Some(4), true), SolverChoice::Line);
        assert_eq!(select(true, false, 2, 2, false, Some(9), true), SolverChoice::Sphere2Pos);
        assert_eq!(select(true, false, 3, 3, false, Some(13), true), SolverChoice::Sphere2Neg);
        assert_eq!(select(false, false, 1, 1, false, None, true), SolverChoice::Lost);
    }
}
