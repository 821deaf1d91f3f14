//! Node configuration.
//!
//! Compile-time sizing constants live next to the types they bound; the
//! runtime knobs are collected here so a deployment can tune them in one
//! place.

use heapless::Vec;

use crate::time::{ticks_for_us, Duration};

/// Maximum SSID length carried in advertisements.
pub const MAX_SSID_LEN: usize = hyperspace_frame::MAX_SSID_LEN;

/// Runtime configuration of a node.
#[derive(Debug, Clone)]
pub struct Config {
    /// The network SSID matched during scanning and carried in
    /// advertisements.
    pub ssid: Vec<u8, MAX_SSID_LEN>,
    /// Slotframe length in slots, shared by SF0 and SF1 so the schedule
    /// repeats cleanly.
    pub slotframe_length: u16,
    /// Edge length of the beacon-lattice unit cell, in metres.
    pub lattice_edge_r: f32,
    /// Offset of the ACK SFD from slot start.
    pub ack_offset: Duration,
    /// TX antenna delay calibration.
    pub tx_antenna_delay: Duration,
    /// RX antenna delay calibration.
    pub rx_antenna_delay: Duration,
    /// RX guard: how long before the nominal SFD the receiver opens.
    pub guard: Duration,
    /// Channels scanned during network formation.
    pub channels: Vec<u8, 8>,
    /// Retransmissions of a flooded packet.
    pub flood_k: u8,
    /// Upper bound of the random inter-transmission delay while flooding.
    pub flood_jitter: Duration,
    /// Shared-slot backoff window bounds.
    pub backoff_w_min: u8,
    /// See [`backoff_w_min`](Self::backoff_w_min).
    pub backoff_w_max: u8,
    /// Hard retry cap for shared-slot transmissions.
    pub max_retries: u8,
    /// Location-slot conflict backoff, in location cycles.
    pub backoff_count: u8,
    /// Relative margin a challenger must win by before claiming a beacon
    /// role.
    pub hysteresis: f32,
    /// Spring constant of the relaxation solver.
    pub ks: f32,
    /// Lattice-gravity constant of the relaxation solver.
    pub kg: f32,
    /// Damping of the relaxation solver.
    pub damping_b: f32,
    /// Integration step of the relaxation solver.
    pub sim_dt: f32,
    /// Neighbour expiry, in slots without a frame.
    pub neighbor_timeout_asn: u64,
    /// Consecutive missed advertisements before the MAC re-enters scan.
    pub sync_loss_k: u8,
    /// Administrative flag: never claim a beacon role.
    pub allow_beaconing: bool,
}

impl Default for Config {
    fn default() -> Self {
        let mut ssid = Vec::new();
        // Unwrap is fine: the literal fits MAX_SSID_LEN.
        ssid.extend_from_slice(b"hyperspace").unwrap();

        let mut channels = Vec::new();
        channels.extend_from_slice(&[1, 2, 3, 5]).unwrap();

        Self {
            ssid,
            slotframe_length: 40,
            lattice_edge_r: 30.0,
            ack_offset: Duration::from_ticks(ticks_for_us(1_700) as i64),
            tx_antenna_delay: Duration::ZERO,
            rx_antenna_delay: Duration::ZERO,
            guard: Duration::from_us(40),
            channels,
            flood_k: 3,
            flood_jitter: Duration::from_us(10_000),
            backoff_w_min: 1,
            backoff_w_max: 16,
            max_retries: 4,
            backoff_count: 2,
            hysteresis: 0.25,
            ks: 1.0,
            kg: 0.2,
            damping_b: 2.0,
            sim_dt: 0.01,
            neighbor_timeout_asn: 4_000,
            sync_loss_k: 8,
            allow_beaconing: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.ack_offset.as_us(), 1_700);
        assert_eq!(config.slotframe_length, 40);
        assert!(config.backoff_w_min <= config.backoff_w_max);
    }
}
