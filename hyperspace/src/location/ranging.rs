//! Distance and pseudorange extraction from a captured location slot.
//!
//! All tick arithmetic stays in `i64`; only the final scaling to metres
//! goes through `f32`, so sub-millimetre tick resolution survives the
//! conversion.
//!
//! Notation: `w_ij` is the wire turnaround beacon `j` reports for
//! sub-offset `i` (its TX SFD minus its RX SFD of `i`). The reception
//! interval `t_ij = rx_j(i) - rx_j(0)` used by the closed forms is
//! recovered as `w_0j - w_ij`.

use hyperspace_frame::NbrRecord;

use crate::time::METERS_PER_TICK;

use super::slot::SlotCapture;

/// Distances and pseudoranges recovered from one slot.
#[derive(Debug, Clone, Default)]
pub struct Ranging {
    /// `d0[j]`: the distance from the prime to the beacon at sub-offset
    /// `j`, from the round-trip closure. `d0[0]` is zero.
    pub d0: [Option<f32>; 6],
    /// `pseudo[i]`: this node's pseudorange to sub-offset `i`, offset by
    /// the unknown distance to the prime. `pseudo[0]` is zero by
    /// definition.
    pub pseudo: [Option<f32>; 6],
    /// This node's distance to the prime, known when it transmitted in
    /// the slot (from its own closure), or zero for the prime itself.
    pub my_d0: Option<f32>,
}

impl Ranging {
    /// This node's actual distance to sub-offset `i`, when the prime
    /// distance is known.
    pub fn distance_to(&self, i: u8) -> Option<f32> {
        if i == 0 {
            return self.my_d0;
        }
        Some(self.pseudo[i as usize]? + self.my_d0?)
    }
}

fn meters(ticks: i64) -> f32 {
    ticks as f32 * METERS_PER_TICK
}

fn usable(record: NbrRecord) -> Option<i64> {
    (!record.is_conflict_marker()).then_some(record.tstamp as i64)
}

/// Recover distances and pseudoranges from a capture.
pub fn compute(capture: &SlotCapture) -> Ranging {
    let mut out = Ranging::default();
    out.d0[0] = Some(0.0);

    // The prime knows every closure from its own timestamps and is its
    // own reference.
    let i_am_prime = capture.my_sub_offset == Some(0);

    // t'_j either from the closing frame or, for the prime, from its own
    // capture.
    let closure = |j: u8| -> Option<i64> {
        if i_am_prime {
            let tx0 = capture.my_tx_sfd?;
            let rx = capture.frames[j as usize].as_ref()?.sfd_tick;
            Some((rx - tx0).ticks())
        } else {
            usable(capture.closure_record(j)?)
        }
    };

    // w_0j: beacon j's turnaround against the prime. For this node's own
    // sub-offset the turnaround is its own measurement, not a wire record.
    let w0 = |j: u8| -> Option<i64> {
        if capture.my_sub_offset == Some(j) {
            Some((capture.my_tx_sfd? - capture.sfd(0)?).ticks())
        } else {
            usable(capture.wire_record(j, 0)?)
        }
    };

    for j in 1..6u8 {
        if let (Some(t_rt), Some(t_0j)) = (closure(j), w0(j)) {
            // One-way distance: half the closure minus the turnaround.
            out.d0[j as usize] = Some(meters(t_rt - t_0j) / 2.0);
        }
    }

    // This node's reception intervals t_ik = rx(i) - rx(0), against
    // whichever tick it holds for sub-offset 0 (received, or its own TX
    // for the prime).
    if let Some(t0) = capture.sfd(0) {
        out.pseudo[0] = Some(0.0);
        for i in 1..6u8 {
            if capture.my_sub_offset == Some(i) {
                continue;
            }
            let (Some(rx_i), Some(t_0i), Some(d_0i)) =
                (capture.sfd(i), w0(i), out.d0[i as usize])
            else {
                continue;
            };
            let t_ik = (rx_i - t0).ticks();
            out.pseudo[i as usize] = Some(meters(t_ik - t_0i) - d_0i);
        }
    }

    // The prime's pseudoranges are its distances outright (my_d0 = 0);
    // a non-prime transmitter learns its prime distance from its closure.
    out.my_d0 = match capture.my_sub_offset {
        Some(0) => Some(0.0),
        Some(k) => out.d0[k as usize],
        None => None,
    };

    out
}

/// The distance between non-prime sub-offsets `i < j`, from beacon `j`'s
/// reported turnaround. Used by consistency checks.
pub fn inter_beacon_distance(capture: &SlotCapture, ranging: &Ranging, i: u8, j: u8) -> Option<f32> {
    debug_assert!(i < j && i >= 1);
    let w_0j = usable(capture.wire_record(j, 0)?)?;
    let w_ij = usable(capture.wire_record(j, i)?)?;
    let t_ij = w_0j - w_ij;
    let t_0i = usable(capture.wire_record(i, 0)?)?;
    let d_0i = ranging.d0[i as usize]?;
    let d_0j = ranging.d0[j as usize]?;
    Some(meters(t_ij - t_0i) + d_0j - d_0i)
}

#[cfg(test)]
pub(crate) mod tests {
    use heapless::Vec;
    use hyperspace_frame::LocBeaconRepr;

    use super::*;
    use crate::location::linalg::Vec3;
    use crate::location::slot::{sub_offset_tick, CapturedBeacon, SlotCapture};
    use crate::time::{Duration, Instant, METERS_PER_TICK};

    fn ticks_for_meters(d: f32) -> i64 {
        (d / METERS_PER_TICK) as i64
    }

    /// Build the capture a node at `me` would assemble from an exact,
    /// noiseless slot among beacons at `positions` (sub-offsets 0..n).
    /// `my_sub_offset` of `None` makes the node a passive listener.
    pub fn synthesise(
        positions: &[Vec3],
        me: Vec3,
        my_sub_offset: Option<u8>,
        participants: [u8; 6],
    ) -> SlotCapture {
        let slot_start = Instant::from_ticks(10_000_000);
        let n = positions.len();

        // Absolute TX SFD air times per sub-offset.
        let tx_tick = |k: usize| sub_offset_tick(slot_start, k as u8);
        // Propagation delay in ticks between two points.
        let prop = |a: Vec3, b: Vec3| ticks_for_meters((a - b).norm());

        let mut capture = SlotCapture {
            participants,
            my_sub_offset,
            my_tx_sfd: my_sub_offset.map(|k| tx_tick(k as usize)),
            ..Default::default()
        };

        // Each beacon's frame, with wire turnarounds tx_j - rx_j(i).
        for j in 0..n {
            if my_sub_offset == Some(j as u8) {
                continue;
            }
            let mut records = Vec::new();
            for i in 0..6usize {
                if i == j {
                    continue;
                }
                let tstamp = if i < n {
                    (tx_tick(j) - tx_tick(i)).ticks() - prop(positions[i], positions[j])
                } else {
                    0
                };
                records
                    .push(NbrRecord { addr: [i as u8 + 1; 8], tstamp: tstamp as i32 })
                    .unwrap();
            }
            let body = LocBeaconRepr {
                class: participants[j],
                direction: 0,
                loc_slot: 0,
                sub_offset: j as u8,
                position: (positions[j].x, positions[j].y, positions[j].z),
                routing_coord: (0.0, 0.0),
                neighborhood: 0,
                records,
            };
            capture.frames[j] = Some(CapturedBeacon {
                src: [j as u8 + 1; 8],
                sfd_tick: tx_tick(j) + Duration::from_ticks(prop(positions[j], me)),
                body,
            });
        }

        // The closing frame from the prime: t'_j = rx_0(j) - tx_0.
        if my_sub_offset != Some(0) {
            let mut records = Vec::new();
            for j in 1..6usize {
                let tstamp = if j < n {
                    (tx_tick(j) - tx_tick(0)).ticks() + prop(positions[0], positions[j])
                } else {
                    hyperspace_frame::TSTAMP_MISSED as i64
                };
                let addr = if j < n { [j as u8 + 1; 8] } else { [0; 8] };
                records.push(NbrRecord { addr, tstamp: tstamp as i32 }).unwrap();
            }
            let body = LocBeaconRepr {
                class: participants[0],
                direction: 0,
                loc_slot: 0,
                sub_offset: 6,
                position: (positions[0].x, positions[0].y, positions[0].z),
                routing_coord: (0.0, 0.0),
                neighborhood: 0,
                records,
            };
            capture.frames[6] = Some(CapturedBeacon {
                src: [1; 8],
                sfd_tick: sub_offset_tick(slot_start, 6)
                    + Duration::from_ticks(prop(positions[0], me)),
                body,
            });
        }

        capture
    }

    #[test]
    fn closure_distances_recover_geometry() {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 30.0, 0.0),
        ];
        let me = Vec3::new(10.0, 10.0, 0.0);
        let capture = synthesise(&positions, me, None, [0, 4, 7, 8, 9, 10]);
        let ranging = compute(&capture);

        // d_0j is exact to the tick resolution (4.69 mm).
        assert!((ranging.d0[1].unwrap() - 30.0).abs() < 0.01);
        assert!((ranging.d0[2].unwrap() - 30.0).abs() < 0.01);
        assert!(ranging.d0[3].is_none());
        // Round trips are non-negative.
        assert!(ranging.d0[1].unwrap() >= 0.0);
    }

    #[test]
    fn passive_pseudoranges_obey_the_offset_identity() {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 30.0, 0.0),
        ];
        let me = Vec3::new(5.0, 12.0, 0.0);
        let capture = synthesise(&positions, me, None, [0, 4, 7, 8, 9, 10]);
        let ranging = compute(&capture);

        let d0k = (me - positions[0]).norm();
        for i in 1..3 {
            let expected = (me - positions[i]).norm();
            let recovered = ranging.pseudo[i].unwrap() + d0k;
            assert!(
                (recovered - expected).abs() < 0.02,
                "sub-offset {i}: {recovered} != {expected}"
            );
        }
    }

    #[test]
    fn transmitter_learns_its_distances() {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(15.0, 25.0, 0.0),
        ];
        // This node is the beacon at sub-offset 2.
        let me = positions[2];
        let capture = synthesise(&positions, me, Some(2), [0, 4, 7, 8, 9, 10]);
        let ranging = compute(&capture);

        let expected_d0 = (me - positions[0]).norm();
        assert!((ranging.my_d0.unwrap() - expected_d0).abs() < 0.01);
        let expected_d1 = (me - positions[1]).norm();
        assert!((ranging.distance_to(1).unwrap() - expected_d1).abs() < 0.02);
    }

    #[test]
    fn inter_beacon_distance_is_symmetric_in_construction() {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 30.0, 0.0),
            Vec3::new(30.0, 30.0, 0.0),
        ];
        let capture = synthesise(&positions, Vec3::new(1.0, 1.0, 0.0), None, [0, 4, 7, 8, 9, 10]);
        let ranging = compute(&capture);

        let d12 = inter_beacon_distance(&capture, &ranging, 1, 2).unwrap();
        assert!((d12 - (positions[1] - positions[2]).norm()).abs() < 0.02);
        let d13 = inter_beacon_distance(&capture, &ranging, 1, 3).unwrap();
        assert!((d13 - (positions[1] - positions[3]).norm()).abs() < 0.02);
    }
}
