//! Frame check sequence.
//!
//! IEEE 802.15.4 uses the 16-bit ITU-T CRC (polynomial 0x1021, reflected,
//! zero initial value), transmitted little-endian after the MAC payload.

use crc::{Crc, CRC_16_KERMIT};

const FCS: Crc<u16> = Crc::<u16>::new(&CRC_16_KERMIT);

/// The length of the frame check sequence in bytes.
pub const FCS_LEN: usize = 2;

/// Compute the FCS over a frame (without its trailing FCS bytes).
pub fn fcs(frame: &[u8]) -> u16 {
    FCS.checksum(frame)
}

/// Append the FCS to a frame. `buffer[..len]` holds the frame; the two
/// bytes after it receive the checksum. Returns the total length.
pub fn emit_fcs(buffer: &mut [u8], len: usize) -> usize {
    let checksum = fcs(&buffer[..len]);
    buffer[len..len + FCS_LEN].copy_from_slice(&checksum.to_le_bytes());
    len + FCS_LEN
}

/// Verify and strip the FCS of a received frame. Returns the frame without
/// its FCS, or `None` if the checksum does not match.
pub fn check_fcs(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < FCS_LEN {
        return None;
    }
    let (data, tail) = frame.split_at(frame.len() - FCS_LEN);
    let received = u16::from_le_bytes([tail[0], tail[1]]);
    (fcs(data) == received).then_some(data)
}
