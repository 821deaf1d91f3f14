//! Minimal IPv6 wire formats: the fixed header and the fragment header.
//!
//! The node does not implement an IPv6 stack; the router only needs to
//! read addresses, splice extension headers and fragment oversized
//! packets.

use crate::{Error, Result};

/// IPv6 next-header value for the hop-by-hop options header.
pub const NEXT_HEADER_HOP_BY_HOP: u8 = 0;
/// IPv6 next-header value for the fragment header.
pub const NEXT_HEADER_FRAGMENT: u8 = 44;
/// IPv6 next-header value for "no next header".
pub const NEXT_HEADER_NONE: u8 = 59;

/// A reader/writer for the fixed IPv6 header.
#[derive(Debug, Eq, PartialEq)]
pub struct Ipv6Header<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> Ipv6Header<T> {
    /// The length of the fixed header in bytes.
    pub const LEN: usize = 40;

    /// Create a new [`Ipv6Header`] reader/writer from a given buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is too short or the version nibble
    /// is not 6.
    pub fn new(data: T) -> Result<Self> {
        let h = Self::new_unchecked(data);

        if !h.check_len() || h.version() != 6 {
            return Err(Error);
        }

        Ok(h)
    }

    fn check_len(&self) -> bool {
        self.data.as_ref().len() >= Self::LEN
    }

    /// Create a new [`Ipv6Header`] reader/writer without validation.
    pub fn new_unchecked(data: T) -> Self {
        Self { data }
    }

    /// Return the version nibble.
    pub fn version(&self) -> u8 {
        self.data.as_ref()[0] >> 4
    }

    /// Return the payload length (everything after the fixed header).
    pub fn payload_length(&self) -> usize {
        let b = self.data.as_ref();
        u16::from_be_bytes([b[4], b[5]]) as usize
    }

    /// Return the next-header value.
    pub fn next_header(&self) -> u8 {
        self.data.as_ref()[6]
    }

    /// Return the hop limit.
    pub fn hop_limit(&self) -> u8 {
        self.data.as_ref()[7]
    }

    /// Return the source address.
    pub fn src(&self) -> [u8; 16] {
        let mut addr = [0u8; 16];
        addr.copy_from_slice(&self.data.as_ref()[8..24]);
        addr
    }

    /// Return the destination address.
    pub fn dst(&self) -> [u8; 16] {
        let mut addr = [0u8; 16];
        addr.copy_from_slice(&self.data.as_ref()[24..40]);
        addr
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Ipv6Header<T> {
    /// Write the version nibble (clears traffic class and flow label).
    pub fn set_version(&mut self) {
        let b = self.data.as_mut();
        b[0] = 6 << 4;
        b[1] = 0;
        b[2] = 0;
        b[3] = 0;
    }

    /// Write the payload length.
    pub fn set_payload_length(&mut self, len: usize) {
        self.data.as_mut()[4..6].copy_from_slice(&(len as u16).to_be_bytes());
    }

    /// Write the next-header value.
    pub fn set_next_header(&mut self, next: u8) {
        self.data.as_mut()[6] = next;
    }

    /// Write the hop limit.
    pub fn set_hop_limit(&mut self, limit: u8) {
        self.data.as_mut()[7] = limit;
    }

    /// Write the source address.
    pub fn set_src(&mut self, addr: &[u8; 16]) {
        self.data.as_mut()[8..24].copy_from_slice(addr);
    }

    /// Write the destination address.
    pub fn set_dst(&mut self, addr: &[u8; 16]) {
        self.data.as_mut()[24..40].copy_from_slice(addr);
    }
}

/// A reader/writer for the IPv6 fragment header.
///
/// Layout (big-endian): `u8 next_header; u8 reserved; u16 offset_flags;
/// u32 identification`. The offset is in 8-octet units in bits 3..16; bit
/// 0 is the more-fragments flag.
#[derive(Debug, Eq, PartialEq)]
pub struct FragmentHeader<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> FragmentHeader<T> {
    /// The length of the fragment header in bytes.
    pub const LEN: usize = 8;

    /// Create a new [`FragmentHeader`] reader/writer from a given buffer.
    pub fn new(data: T) -> Result<Self> {
        if data.as_ref().len() < Self::LEN {
            return Err(Error);
        }
        Ok(Self { data })
    }

    /// Create a new [`FragmentHeader`] reader/writer without validation.
    pub fn new_unchecked(data: T) -> Self {
        Self { data }
    }

    /// Return the next-header value.
    pub fn next_header(&self) -> u8 {
        self.data.as_ref()[0]
    }

    /// Return the fragment offset in bytes.
    pub fn offset(&self) -> usize {
        let b = self.data.as_ref();
        ((u16::from_be_bytes([b[2], b[3]]) >> 3) as usize) * 8
    }

    /// Returns `true` when more fragments follow.
    pub fn more_fragments(&self) -> bool {
        self.data.as_ref()[3] & 0b1 == 1
    }

    /// Return the fragment identification.
    pub fn identification(&self) -> u32 {
        let b = self.data.as_ref();
        u32::from_be_bytes([b[4], b[5], b[6], b[7]])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> FragmentHeader<T> {
    /// Write all fields. `offset` is in bytes and must be a multiple of 8.
    pub fn emit(&mut self, next_header: u8, offset: usize, more: bool, identification: u32) {
        debug_assert!(offset % 8 == 0);
        let b = self.data.as_mut();
        b[0] = next_header;
        b[1] = 0;
        let offset_flags = (((offset / 8) as u16) << 3) | more as u16;
        b[2..4].copy_from_slice(&offset_flags.to_be_bytes());
        b[4..8].copy_from_slice(&identification.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut buffer = [0u8; Ipv6Header::<&[u8]>::LEN];
        let mut h = Ipv6Header::new_unchecked(&mut buffer[..]);
        h.set_version();
        h.set_payload_length(512);
        h.set_next_header(NEXT_HEADER_HOP_BY_HOP);
        h.set_hop_limit(64);
        h.set_src(&[0xfe; 16]);
        h.set_dst(&[0x01; 16]);

        let h = Ipv6Header::new(&buffer[..]).unwrap();
        assert_eq!(h.version(), 6);
        assert_eq!(h.payload_length(), 512);
        assert_eq!(h.next_header(), NEXT_HEADER_HOP_BY_HOP);
        assert_eq!(h.hop_limit(), 64);
        assert_eq!(h.src(), [0xfe; 16]);
        assert_eq!(h.dst(), [0x01; 16]);
    }

    #[test]
    fn rejects_non_v6() {
        let buffer = [0u8; 40];
        assert!(Ipv6Header::new(&buffer[..]).is_err());
    }

    #[test]
    fn fragment_header() {
        let mut buffer = [0u8; FragmentHeader::<&[u8]>::LEN];
        let mut f = FragmentHeader::new_unchecked(&mut buffer[..]);
        f.emit(NEXT_HEADER_NONE, 80, true, 0xdead_beef);

        let f = FragmentHeader::new(&buffer[..]).unwrap();
        assert_eq!(f.next_header(), NEXT_HEADER_NONE);
        assert_eq!(f.offset(), 80);
        assert!(f.more_fragments());
        assert_eq!(f.identification(), 0xdead_beef);
    }
}
