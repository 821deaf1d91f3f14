//! The slot timing engine.
//!
//! Keeps the local slot origin, hands out per-slot radio deadlines, and
//! folds received SFD timestamps back into the origin (resync). The
//! engine is pure bookkeeping over [`Instant`]s so it can be driven
//! without a hardware timer.

use crate::time::{Asn, Duration, Instant, SLOT_TICKS};

/// Nominal SFD offset of an in-slot transmission, from slot start.
///
/// Leaves room for TX preparation before the SFD and keeps the ACK at
/// [`ack_offset`](crate::config::Config::ack_offset) independent of the
/// data length.
pub const TX_OFFSET: Duration = Duration::from_us(300);

/// The fixed slot duration.
pub const SLOT_DURATION: Duration = Duration::from_ticks(SLOT_TICKS as i64);

/// A receive window derived from slot geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxWindow {
    /// When the radio opens.
    pub open: Instant,
    /// How long it stays open without an SFD.
    pub timeout: Duration,
}

/// The slot timing engine.
#[derive(Debug, Clone, Copy)]
pub struct SlotTimer {
    /// The tick of the start of slot `base_asn`.
    origin: Instant,
    /// The ASN whose slot starts at `origin`.
    base_asn: Asn,
    /// The current slot.
    asn: Asn,
    /// Accumulated signed correction, for clock-skew bookkeeping.
    drift: Duration,
}

impl SlotTimer {
    /// Arm the engine: slot `asn` starts at `epoch`.
    pub fn start(epoch: Instant, asn: Asn) -> Self {
        Self { origin: epoch, base_asn: asn, asn, drift: Duration::ZERO }
    }

    /// The current ASN.
    pub fn asn(&self) -> Asn {
        self.asn
    }

    /// The start tick of the current slot.
    pub fn slot_start(&self) -> Instant {
        self.start_of(self.asn)
    }

    /// The start tick of an arbitrary slot at or after the base.
    pub fn start_of(&self, asn: Asn) -> Instant {
        self.origin + SLOT_DURATION * ((asn - self.base_asn) as i64)
    }

    /// Advance to the next slot boundary. The ASN always advances, even
    /// for slots that were dropped on a missed SFD.
    pub fn advance(&mut self) {
        self.asn.increment();
    }

    /// The accumulated resync correction since start.
    pub fn drift(&self) -> Duration {
        self.drift
    }

    /// Realign the slot origin so a frame whose SFD was captured at
    /// `sfd_tick` sits exactly at `expected_offset` into the current
    /// slot. Returns the signed correction that was applied.
    ///
    /// Only the origin moves; the ASN is untouched, so a correction that
    /// pulls the origin earlier never lowers the slot count.
    pub fn resync(&mut self, sfd_tick: Instant, expected_offset: Duration) -> Duration {
        let observed_start = sfd_tick - expected_offset;
        let correction = observed_start - self.slot_start();
        // Rebase on the current slot to keep tick arithmetic small.
        self.origin = observed_start;
        self.base_asn = self.asn;
        self.drift = self.drift + correction;
        correction
    }

    /// The receive window for a frame expected at `expected_offset` into
    /// the current slot: opens `guard` early and closes after `2 * guard`
    /// without an SFD.
    pub fn rx_window(&self, expected_offset: Duration, guard: Duration) -> RxWindow {
        RxWindow {
            open: self.slot_start() + expected_offset - guard,
            timeout: guard * 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_boundaries() {
        let timer = SlotTimer::start(Instant::from_ticks(1_000), Asn::new(5));
        assert_eq!(timer.slot_start(), Instant::from_ticks(1_000));
        assert_eq!(
            timer.start_of(Asn::new(7)),
            Instant::from_ticks(1_000 + 2 * SLOT_TICKS)
        );
    }

    #[test]
    fn resync_shifts_origin_not_asn() {
        let mut timer = SlotTimer::start(Instant::from_ticks(0), Asn::new(10));
        timer.advance();
        let asn_before = timer.asn();

        // A frame expected 300us into the slot arrived 500 ticks late.
        let expected = TX_OFFSET;
        let sfd = timer.slot_start() + expected + Duration::from_ticks(500);
        let correction = timer.resync(sfd, expected);

        assert_eq!(correction, Duration::from_ticks(500));
        assert_eq!(timer.asn(), asn_before);
        assert_eq!(timer.slot_start() + expected, sfd);
    }

    #[test]
    fn negative_drift_never_decreases_asn() {
        let mut timer = SlotTimer::start(Instant::from_ticks(100_000), Asn::new(3));
        let expected = TX_OFFSET;
        // The frame arrived early: local clock runs slow.
        let sfd = timer.slot_start() + expected - Duration::from_ticks(800);
        timer.resync(sfd, expected);
        assert_eq!(timer.asn(), Asn::new(3));
        assert_eq!(timer.drift(), Duration::from_ticks(-800));

        // Simulated +-100 ppm drift over many slots: the ASN advances
        // strictly monotonically regardless of correction sign.
        let mut last = timer.asn();
        for i in 0..1_000u64 {
            timer.advance();
            assert!(timer.asn() > last);
            last = timer.asn();
            let jitter = ((i as i64 % 5) - 2) * 16; // ~ +-250ns swings
            let sfd = timer.slot_start() + expected + Duration::from_ticks(jitter);
            timer.resync(sfd, expected);
        }
    }

    #[test]
    fn rx_window_geometry() {
        let timer = SlotTimer::start(Instant::from_ticks(0), Asn::ZERO);
        let guard = Duration::from_us(40);
        let window = timer.rx_window(TX_OFFSET, guard);
        assert_eq!(window.open, Instant::from_ticks(0) + TX_OFFSET - guard);
        assert_eq!(window.timeout, guard * 2);
    }
}
