//! The hyperbolic routing embedding.
//!
//! A node's quantised lattice position maps onto a point of a hyperbolic
//! star graph: the six axial directions get fixed sector angles and every
//! unit lattice step walks one edge of length equal to the
//! angle-of-parallelism constant. Greedy forwarding over the resulting
//! polar coordinates always has a strictly-closer neighbour until the
//! destination (or a genuine local minimum) is reached.

use micromath::F32Ext;

use crate::location::lattice::LatticePoint;
use crate::location::linalg::{cosh, sinh, stable_acosh};

/// The hyperbolic edge length per lattice step:
/// `-2 ln(tan(pi/12))`, the angle-of-parallelism length for the 60
/// degree sector fan.
pub const STEP_LENGTH: f32 = 2.633_915_8;

/// Sector angles of the axial directions `+x, -x, +y, -y, +z, -z`, in
/// radians.
///
// TODO: field-verify the 320 degree -z sector against deployed meshes;
// 300 would restore the symmetric fan but breaks coordinate
// compatibility with nodes already flashed.
pub const SECTOR_ANGLES: [f32; 6] = [
    0.0,
    1.047_197_6,  // 60
    2.094_395_2,  // 120
    3.141_592_7,  // 180
    4.188_790_2,  // 240
    5.585_053_6,  // 320
];

/// A polar point of the hyperbolic plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingCoord {
    /// Radial distance from the origin.
    pub r: f32,
    /// Polar angle in radians.
    pub theta: f32,
}

impl RoutingCoord {
    /// The embedding origin.
    pub const ORIGIN: Self = Self { r: 0.0, theta: 0.0 };

    /// The flood marker: NaN components request flooding instead of
    /// greedy forwarding.
    pub const FLOOD: Self = Self { r: f32::NAN, theta: f32::NAN };

    /// Returns `true` when this coordinate requests flooding.
    pub fn is_flood(&self) -> bool {
        self.r.is_nan() || self.theta.is_nan()
    }
}

/// The hyperbolic distance between two polar points.
///
/// `acosh` is ill-conditioned next to 1, where nearby points land; the
/// argument is clamped and the stable series takes over there.
pub fn hyperbolic_distance(a: RoutingCoord, b: RoutingCoord) -> f32 {
    let argument = cosh(a.r) * cosh(b.r) - sinh(a.r) * sinh(b.r) * (b.theta - a.theta).cos();
    stable_acosh(argument.max(1.0))
}

/// A 2+1 Lorentz boost of rapidity `l` along the direction `theta`,
/// as a row-major 3x3 matrix over `(t, x, y)`.
fn boost(theta: f32, l: f32) -> [[f32; 3]; 3] {
    let (c, s) = (theta.cos(), theta.sin());
    let (ch, sh) = (cosh(l), sinh(l));
    [
        [ch, sh * c, sh * s],
        [sh * c, 1.0 + (ch - 1.0) * c * c, (ch - 1.0) * c * s],
        [sh * s, (ch - 1.0) * c * s, 1.0 + (ch - 1.0) * s * s],
    ]
}

fn mat_mul(a: [[f32; 3]; 3], b: [[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let mut out = [[0.0f32; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

/// Embed a lattice point into the hyperbolic plane.
///
/// The signed axial offsets are walked in descending order of magnitude
/// (ties in the fixed axial order x, y, z), each unit step composing one
/// more boost along its sector; every step moves the point strictly
/// farther from the origin.
pub fn embed(point: LatticePoint) -> RoutingCoord {
    // (magnitude, axial direction index).
    let mut components = [
        (point.x.unsigned_abs(), if point.x >= 0 { 0usize } else { 1 }),
        (point.y.unsigned_abs(), if point.y >= 0 { 2 } else { 3 }),
        (point.z.unsigned_abs(), if point.z >= 0 { 4 } else { 5 }),
    ];
    // Descending magnitude; the array order breaks ties as x, y, z.
    // A three-element insertion sort keeps the sort stable.
    for i in 1..components.len() {
        let mut j = i;
        while j > 0 && components[j - 1].0 < components[j].0 {
            components.swap(j - 1, j);
            j -= 1;
        }
    }

    let mut m = [[0.0f32; 3]; 3];
    m[0][0] = 1.0;
    m[1][1] = 1.0;
    m[2][2] = 1.0;

    for (magnitude, direction) in components {
        let theta = SECTOR_ANGLES[direction];
        for _ in 0..magnitude {
            m = mat_mul(m, boost(theta, STEP_LENGTH));
        }
    }

    // The embedded point is the image of the origin (1, 0, 0).
    let (t, x, y) = (m[0][0], m[1][0], m[2][0]);
    RoutingCoord { r: stable_acosh(t.max(1.0)), theta: y.atan2(x) }
}
