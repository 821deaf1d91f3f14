//! The radio driver trait.
//!
//! The MAC owns the radio exclusively and schedules every operation
//! against absolute radio time. The driver's contract is that reported
//! ticks are *air* time: the TX antenna delay is added before the SFD
//! leaves, and the RX antenna delay subtracted from the capture register,
//! so ranging code never sees calibration offsets.

use core::future::Future;

use crate::time::{Duration, Instant};

use super::MAX_FRAME_LEN;

/// How long before the programmed SFD a scheduled transmission can still
/// be cancelled. Past this point the frame is irrevocably on-air.
pub const TX_COMMIT: Duration = Duration::from_us(30);

/// Errors surfaced by the radio. All are confined to a single slot.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RadioError {
    /// No SFD arrived inside the window.
    Timeout,
    /// A frame arrived but its checksum was wrong.
    Crc,
    /// The radio was asked to do two things at once.
    Busy,
}

/// The acknowledgment leg of a transmission.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AckOutcome {
    /// No acknowledgment was requested.
    NotRequested,
    /// The ACK SFD was captured at this tick.
    Received(Instant),
    /// The ACK window elapsed without an SFD.
    Timeout,
}

/// The result of a completed transmission.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TxResult {
    /// The tick the SFD actually left the antenna.
    pub sfd_tick: Instant,
    /// What happened to the acknowledgment, if one was requested.
    pub ack: AckOutcome,
}

/// The result of a successful reception.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RxResult {
    /// The number of frame bytes written to the caller's buffer.
    pub len: usize,
    /// The tick the SFD crossed the antenna.
    pub sfd_tick: Instant,
}

/// A UWB radio with queued, timestamped TX and windowed RX.
pub trait Radio {
    /// Transmit `frame` with its SFD leaving the antenna at `sfd_tick`.
    ///
    /// When `ack_timeout` is given, the radio auto-turns-around into RX
    /// and waits that long for the acknowledgment SFD.
    fn tx_at(
        &mut self,
        sfd_tick: Instant,
        frame: &[u8],
        ack_timeout: Option<Duration>,
    ) -> impl Future<Output = Result<TxResult, RadioError>>;

    /// Open a receive window at `open` for `timeout`, writing the frame
    /// into `buffer`.
    fn rx_window(
        &mut self,
        open: Instant,
        timeout: Duration,
        buffer: &mut [u8; MAX_FRAME_LEN],
    ) -> impl Future<Output = Result<RxResult, RadioError>>;

    /// Cancel a scheduled transmission. Has no effect within [`TX_COMMIT`]
    /// of the programmed SFD.
    fn cancel_tx(&mut self);

    /// Switch to another channel.
    fn set_channel(&mut self, channel: u8) -> impl Future<Output = ()>;

    /// Power the radio down between slots.
    fn sleep(&mut self) -> impl Future<Output = ()>;

    /// Wake the radio from sleep.
    fn wake(&mut self) -> impl Future<Output = ()>;

    /// Program the antenna-delay calibration constants.
    fn set_antenna_delays(&mut self, tx: Duration, rx: Duration);

    /// Read the free-running radio clock.
    fn now(&self) -> Instant;

    /// Return the 64-bit hardware address of this radio.
    fn link_addr(&self) -> [u8; 8];
}
