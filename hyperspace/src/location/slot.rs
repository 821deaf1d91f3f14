//! The location-slot protocol.
//!
//! A location slot divides its 2,500 us into seven equally spaced
//! sub-offsets. Beacons scheduled by the participation table transmit a
//! LocBeacon at their sub-offset; everyone else listens to all of them.
//! Sub-offset 6 is the prime's closing frame carrying round-trip
//! closures. This module is the pure per-slot state machine: the MAC
//! feeds it SFD-stamped frames and asks it what to put on the air; the
//! captured state goes to the engine afterwards.

use heapless::Vec;
use hyperspace_frame::{LocBeaconRepr, NbrRecord, TSTAMP_HEARD, TSTAMP_MISSED};

use crate::time::{Duration, Instant, SUB_OFFSET_TICKS};

use super::table;

/// SFD offset of a sub-offset transmission within its seventh of the
/// slot, leaving the receiver guard room before the earliest SFD.
pub const SUB_LEAD: Duration = Duration::from_us(60);

/// The number of sub-offsets, including the closing frame.
pub const SUB_OFFSETS: usize = 7;

/// The SFD tick of sub-offset `k`, relative to slot start.
pub fn sub_offset_tick(slot_start: Instant, k: u8) -> Instant {
    slot_start + Duration::from_ticks(k as i64 * SUB_OFFSET_TICKS as i64) + SUB_LEAD
}

/// A LocBeacon received during the slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedBeacon {
    /// The transmitter's link-layer address.
    pub src: [u8; 8],
    /// The SFD tick of the frame.
    pub sfd_tick: Instant,
    /// The parsed body.
    pub body: LocBeaconRepr,
}

/// Everything a node observed during one location slot.
#[derive(Debug, Clone, Default)]
pub struct SlotCapture {
    /// The direction in force.
    pub direction: u8,
    /// The location-cell index.
    pub loc_slot: u8,
    /// The scheduled beacon indices for sub-offsets 0..5.
    pub participants: [u8; table::PARTICIPANTS_PER_SLOT],
    /// Frames captured per sub-offset; entry 6 is the closing frame.
    pub frames: [Option<CapturedBeacon>; SUB_OFFSETS],
    /// CRC errors per sub-offset (a collision signature).
    pub crc_error: [bool; SUB_OFFSETS],
    /// The sub-offset this node transmitted at, if it participated.
    pub my_sub_offset: Option<u8>,
    /// The SFD tick of this node's own transmission.
    pub my_tx_sfd: Option<Instant>,
}

impl SlotCapture {
    /// The wire record beacon `j`'s frame carries for sub-offset `i`.
    ///
    /// Records cover sub-offsets 0..5 excluding the transmitter's own, in
    /// ascending order.
    pub fn wire_record(&self, j: u8, i: u8) -> Option<NbrRecord> {
        debug_assert!(i != j && i < 6);
        let frame = self.frames[j as usize].as_ref()?;
        let slot = if i < j { i } else { i - 1 } as usize;
        frame.body.records.get(slot).copied()
    }

    /// The closing-frame record for non-prime sub-offset `j` (1..6).
    pub fn closure_record(&self, j: u8) -> Option<NbrRecord> {
        debug_assert!((1..6).contains(&j));
        let frame = self.frames[6].as_ref()?;
        frame.body.records.get(j as usize - 1).copied()
    }

    /// The SFD tick this node captured for sub-offset `k`, whether the
    /// frame was received or transmitted by the node itself.
    pub fn sfd(&self, k: u8) -> Option<Instant> {
        if self.my_sub_offset == Some(k) {
            self.my_tx_sfd
        } else {
            self.frames[k as usize].as_ref().map(|f| f.sfd_tick)
        }
    }

    /// Returns `true` when this node transmitted in the slot.
    pub fn transmitted(&self) -> bool {
        self.my_sub_offset.is_some()
    }
}

/// What the MAC should do at a sub-offset.
#[derive(Debug, Clone, PartialEq)]
pub enum SubSlotAction {
    /// Transmit the given body with the SFD at the sub-offset tick.
    Transmit(LocBeaconRepr),
    /// Open a receive window around the sub-offset tick.
    Receive,
}

/// The transmitter-side state the driver needs from the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeaconSelf {
    /// The node's position, if it has one.
    pub position: Option<(f32, f32, f32)>,
    /// The node's routing coordinate.
    pub routing_coord: (f32, f32),
    /// The node's 20-bit heard-neighbourhood mask.
    pub neighborhood: u32,
}

/// Expectations for the five non-prime sub-offsets: who should transmit
/// and whether they were heard last cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Expectation {
    /// The expected transmitter, all-zero for none.
    pub addr: [u8; 8],
    /// Heard in the previous cycle of this round.
    pub heard: bool,
}

/// The per-slot protocol driver.
#[derive(Debug)]
pub struct LocSlotDriver {
    capture: SlotCapture,
    my_index: Option<u8>,
    expectations: [Expectation; 6],
    my_state: BeaconSelf,
}

impl LocSlotDriver {
    /// Set up a slot. `my_index` is the node's beacon role (already
    /// gated on conflict backoff by the engine); `expectations` reflect
    /// the previous cycle of this `(direction, loc_slot)` round.
    pub fn new(
        direction: u8,
        loc_slot: u8,
        my_index: Option<u8>,
        my_state: BeaconSelf,
        expectations: [Expectation; 6],
    ) -> Self {
        let participants = table::participants(direction, loc_slot);
        let my_sub_offset = my_index.and_then(|i| table::sub_offset_of(direction, loc_slot, i));

        Self {
            capture: SlotCapture {
                direction,
                loc_slot,
                participants,
                frames: Default::default(),
                crc_error: [false; SUB_OFFSETS],
                my_sub_offset,
                my_tx_sfd: None,
            },
            my_index,
            expectations,
            my_state,
        }
    }

    /// Returns `true` when this node opens the slot as the prime.
    pub fn is_prime(&self) -> bool {
        self.capture.my_sub_offset == Some(0)
    }

    /// What to do at sub-offset `k` (0..7).
    pub fn action_at(&self, k: u8) -> SubSlotAction {
        match (self.capture.my_sub_offset, k) {
            (Some(mine), k) if k == mine => SubSlotAction::Transmit(self.tx_body(k)),
            (Some(0), 6) => SubSlotAction::Transmit(self.closing_body()),
            _ => SubSlotAction::Receive,
        }
    }

    /// Record this node's own transmission SFD. Only the first one
    /// sticks: the prime's closing retransmission must not displace the
    /// sub-offset-0 tick its closures are measured against.
    pub fn record_tx(&mut self, sfd_tick: Instant) {
        if self.capture.my_tx_sfd.is_none() {
            self.capture.my_tx_sfd = Some(sfd_tick);
        }
    }

    /// Record a received LocBeacon at sub-offset `k`.
    ///
    /// A frame whose class does not match the scheduled participant still
    /// gets captured: the mismatch is exactly what conflict signalling
    /// reports.
    pub fn record_rx(&mut self, k: u8, src: [u8; 8], sfd_tick: Instant, body: LocBeaconRepr) {
        self.capture.frames[k as usize] = Some(CapturedBeacon { src, sfd_tick, body });
    }

    /// Record a CRC error at sub-offset `k`.
    pub fn record_crc_error(&mut self, k: u8) {
        self.capture.crc_error[k as usize] = true;
    }

    /// Finish the slot and hand the capture to the engine.
    pub fn finish(self) -> SlotCapture {
        self.capture
    }

    /// The body transmitted at this node's sub-offset `k`.
    ///
    /// Records for earlier sub-offsets carry measured turnarounds
    /// (scheduled TX SFD minus received SFD); later ones carry the
    /// expectations used for conflict signalling.
    fn tx_body(&self, k: u8) -> LocBeaconRepr {
        let tx_tick = self.scheduled_tx_tick();

        let mut records = Vec::new();
        for i in 0..6u8 {
            if i == k {
                continue;
            }
            let record = if i < k {
                match self.capture.frames[i as usize].as_ref() {
                    Some(frame) => NbrRecord {
                        addr: frame.src,
                        tstamp: ticks_i32(tx_tick, frame.sfd_tick),
                    },
                    // Expected but silent this very slot.
                    None => NbrRecord {
                        addr: self.expectations[i as usize].addr,
                        tstamp: TSTAMP_MISSED,
                    },
                }
            } else {
                let expectation = self.expectations[i as usize];
                NbrRecord {
                    addr: expectation.addr,
                    tstamp: if expectation.heard { TSTAMP_HEARD } else { TSTAMP_MISSED },
                }
            };
            // Capacity is five: six sub-offsets minus our own.
            records.push(record).ok();
        }

        self.header(k, records)
    }

    /// The prime's closing body: round-trip closures for sub-offsets 1..5.
    fn closing_body(&self) -> LocBeaconRepr {
        let tx0 = self.capture.my_tx_sfd;

        let mut records = Vec::new();
        for j in 1..6u8 {
            let record = match (self.capture.frames[j as usize].as_ref(), tx0) {
                (Some(frame), Some(tx0)) => NbrRecord {
                    addr: frame.src,
                    tstamp: ticks_i32(frame.sfd_tick, tx0),
                },
                _ => NbrRecord { addr: [0; 8], tstamp: TSTAMP_MISSED },
            };
            records.push(record).ok();
        }

        self.header(6, records)
    }

    fn header(&self, sub_offset: u8, records: Vec<NbrRecord, 5>) -> LocBeaconRepr {
        let (x, y, z) = self.my_state.position.unwrap_or((f32::NAN, f32::NAN, f32::NAN));
        LocBeaconRepr {
            class: self.my_index.unwrap_or(0xff),
            direction: self.capture.direction,
            loc_slot: self.capture.loc_slot,
            sub_offset,
            position: (x, y, z),
            routing_coord: self.my_state.routing_coord,
            neighborhood: self.my_state.neighborhood,
            records,
        }
    }

    /// The scheduled SFD tick of this node's transmission, relative to
    /// the slot origin the captured SFDs use.
    fn scheduled_tx_tick(&self) -> Instant {
        // The MAC records the actual TX SFD before asking for the body of
        // a later frame; fall back to the schedule for the first one.
        self.capture.my_tx_sfd.unwrap_or_else(|| {
            sub_offset_tick(Instant::ZERO, self.capture.my_sub_offset.unwrap_or(0))
        })
    }
}

fn ticks_i32(a: Instant, b: Instant) -> i32 {
    (a - b).ticks() as i32
}
