//! The beacon lattice.
//!
//! The deployment volume is tiled with an octahedral unit cell of edge
//! `R`. Beacon roles are named by an index in 0..20: the integer lattice
//! point a beacon occupies determines the index it should claim. Z parity
//! selects one of two sheets; within a sheet a 4-row by 5-column tile
//! assigns every index exactly once, and the odd sheet uses the same tile
//! rotated by (+2, +2) so that a beacon never borders a same-index beacon
//! in its own sheet or the sheet above.
//!
//! Indices 0..4 are prime: they open and close location slots and rotate
//! through the advertisement slot.

use micromath::F32Ext;

use super::linalg::Vec3;

/// The number of beacon indices.
pub const BEACON_INDICES: usize = 20;
/// The number of prime beacon indices.
pub const PRIME_INDICES: usize = 4;

/// The sheet-A index tile: `TILE_A[y % 4][x % 5]`.
pub const TILE_A: [[u8; 5]; 4] = [
    [0, 4, 5, 6, 7],
    [8, 9, 1, 10, 11],
    [12, 2, 13, 14, 15],
    [16, 17, 18, 3, 19],
];

/// Relative lattice offsets of the 17 possible neighbours of a beacon:
/// the 8 surrounding cells of its own sheet and the 9-cell block of the
/// sheet above. The sheet below mirrors the block with the same indices
/// (both adjacent sheets share a parity), so these 17 cover every index a
/// beacon can border.
pub const NEIGHBOR_OFFSETS: [[i8; 3]; 17] = [
    [1, 0, 0],
    [-1, 0, 0],
    [0, 1, 0],
    [0, -1, 0],
    [1, 1, 0],
    [-1, 1, 0],
    [1, -1, 0],
    [-1, -1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [-1, 0, 1],
    [0, 1, 1],
    [0, -1, 1],
    [1, 1, 1],
    [-1, 1, 1],
    [1, -1, 1],
    [-1, -1, 1],
];

/// Canonical sheet-A cells of the prime indices, used when expectations
/// are anchored on a prime.
pub const PRIME_CELLS: [(i32, i32); PRIME_INDICES] = [(0, 0), (2, 1), (1, 2), (3, 3)];

/// A point of the integer beacon lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatticePoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl LatticePoint {
    /// The origin.
    pub const ORIGIN: Self = Self { x: 0, y: 0, z: 0 };

    /// Create a lattice point.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The beacon index assigned to this point.
    pub fn beacon_index(&self) -> u8 {
        let xm = self.x.rem_euclid(5) as usize;
        let ym = self.y.rem_euclid(4) as usize;
        if self.z.rem_euclid(2) == 0 {
            TILE_A[ym][xm]
        } else {
            TILE_A[(ym + 2) % 4][(xm + 2) % 5]
        }
    }

    /// The position of this point in metres, for a lattice edge `r`.
    pub fn position(&self, r: f32) -> Vec3 {
        Vec3::new(self.x as f32 * r, self.y as f32 * r, self.z as f32 * r)
    }

    /// The nearest lattice point to a position, for a lattice edge `r`.
    pub fn nearest(position: Vec3, r: f32) -> Self {
        Self::new(
            (position.x / r).round() as i32,
            (position.y / r).round() as i32,
            (position.z / r).round() as i32,
        )
    }

    /// Offset this point.
    pub fn offset(&self, d: [i8; 3]) -> Self {
        Self::new(self.x + d[0] as i32, self.y + d[1] as i32, self.z + d[2] as i32)
    }

    /// The nearest lattice point carrying a given beacon index.
    ///
    /// The index pattern repeats every 5 columns, 4 rows and 2 sheets,
    /// so one period box around the nearest point always contains an
    /// instance.
    pub fn nearest_with_index(position: Vec3, r: f32, index: u8) -> Self {
        let base = Self::nearest(position, r);
        let mut best = base;
        let mut best_dist = f32::INFINITY;
        for dz in 0..2 {
            for dy in -1..3 {
                for dx in -2..3 {
                    let p = Self::new(base.x + dx, base.y + dy, base.z + dz);
                    if p.beacon_index() != index {
                        continue;
                    }
                    let dist = (position - p.position(r)).norm_sq();
                    if dist < best_dist {
                        best = p;
                        best_dist = dist;
                    }
                }
            }
        }
        best
    }

    /// The 17 expected neighbours of this point: `(point, index)` pairs.
    pub fn expected_neighbors(&self) -> impl Iterator<Item = (LatticePoint, u8)> + '_ {
        NEIGHBOR_OFFSETS.iter().map(|&d| {
            let p = self.offset(d);
            (p, p.beacon_index())
        })
    }

    /// The 20-bit mask of beacon indices a beacon at this point expects
    /// to hear.
    pub fn neighborhood_mask(&self) -> u32 {
        self.expected_neighbors()
            .fold(0u32, |mask, (_, index)| mask | (1 << index))
    }
}

/// Returns `true` for prime beacon indices.
pub fn is_prime(index: u8) -> bool {
    (index as usize) < PRIME_INDICES
}

/// The canonical sheet-A lattice point of a prime index.
pub fn prime_cell(prime: u8) -> LatticePoint {
    let (x, y) = PRIME_CELLS[prime as usize];
    LatticePoint::new(x, y, 0)
}

/// The expected lattice offset from a prime beacon to a neighbouring
/// index, anchored on the prime's canonical cell. In-sheet matches win
/// over cross-sheet ones when an index appears in both.
pub fn expected_offset_from_prime(prime: u8, index: u8) -> Option<[i8; 3]> {
    let cell = prime_cell(prime);
    NEIGHBOR_OFFSETS
        .iter()
        .find(|&&d| cell.offset(d).beacon_index() == index)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_is_a_permutation() {
        let mut seen = [false; BEACON_INDICES];
        for row in TILE_A {
            for index in row {
                assert!(!seen[index as usize], "index {index} repeats in the tile");
                seen[index as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn primes_sit_on_their_cells() {
        for prime in 0..PRIME_INDICES as u8 {
            assert_eq!(prime_cell(prime).beacon_index(), prime);
            assert!(is_prime(prime));
        }
        assert!(!is_prime(4));
    }

    #[test]
    fn sheets_swap_layouts() {
        let even = LatticePoint::new(0, 0, 0).beacon_index();
        let odd = LatticePoint::new(0, 0, 1).beacon_index();
        assert_ne!(even, odd);
        // The rotation is by (+2, +2).
        assert_eq!(odd, LatticePoint::new(2, 2, 0).beacon_index());
        // Two sheets up, the layout repeats.
        assert_eq!(even, LatticePoint::new(0, 0, 2).beacon_index());
    }

    #[test]
    fn no_same_index_within_a_step() {
        // No beacon borders another beacon with its own index.
        for z in 0..2 {
            for y in 0..4 {
                for x in 0..5 {
                    let p = LatticePoint::new(x, y, z);
                    for (_, index) in p.expected_neighbors() {
                        assert_ne!(index, p.beacon_index(), "at {p:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn seventeen_distinct_expected_indices() {
        // The in-sheet ring and the cross-sheet block may overlap in the
        // indices they contribute, but each offset maps to exactly one
        // index and the expectation set never contains the beacon's own.
        let p = LatticePoint::ORIGIN;
        let mask = p.neighborhood_mask();
        assert_eq!(mask & (1 << p.beacon_index()), 0);
        assert!(mask.count_ones() >= 15);
        assert!(mask < 1 << BEACON_INDICES);
    }

    #[test]
    fn nearest_with_index_finds_every_index() {
        let r = 30.0;
        let position = Vec3::new(4.0, -7.0, 12.0);
        for index in 0..BEACON_INDICES as u8 {
            let p = LatticePoint::nearest_with_index(position, r, index);
            assert_eq!(p.beacon_index(), index);
            // Inside one period box of the quantised position.
            let base = LatticePoint::nearest(position, r);
            assert!((p.x - base.x).abs() <= 2 && (p.y - base.y).abs() <= 2);
        }
    }

    #[test]
    fn quantisation_round_trip() {
        let r = 30.0;
        let p = LatticePoint::new(3, -2, 1);
        let jitter = Vec3::new(4.0, -6.0, 5.0);
        let recovered = LatticePoint::nearest(p.position(r) + jitter, r);
        assert_eq!(recovered, p);
    }

    #[test]
    fn prime_offsets_resolve() {
        // Every prime resolves an in-range offset for its scheduled
        // partners; spot-check prime 0.
        for index in [4, 7, 8, 9, 10, 11, 13, 14, 16, 17, 18, 19] {
            let offset = expected_offset_from_prime(0, index);
            assert!(offset.is_some(), "prime 0 cannot anchor index {index}");
        }
        // Index 5 is not adjacent to prime 0 in either sheet.
        assert_eq!(expected_offset_from_prime(0, 5), None);
    }
}
