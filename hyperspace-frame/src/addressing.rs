//! Addressing fields: 8-byte extended link-layer addresses, no PAN IDs.

use super::{AddressingMode, Error, FrameControl, Result};

/// A link-layer address.
///
/// Hyperspace nodes use 64-bit extended addresses exclusively. The address
/// is derived from the hardware ID and doubles as the IPv6 interface
/// identifier.
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    /// The address field is absent.
    Absent,
    /// An 8-byte extended address.
    Extended([u8; 8]),
}

impl Address {
    /// The broadcast address.
    pub const BROADCAST: Self = Self::Extended([0xff; 8]);

    /// Returns `true` when the address is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Returns `true` when the address is present and not broadcast.
    pub fn is_unicast(&self) -> bool {
        matches!(self, Self::Extended(_)) && !self.is_broadcast()
    }

    /// Return the addressing mode that encodes this address.
    pub fn mode(&self) -> AddressingMode {
        match self {
            Self::Absent => AddressingMode::Absent,
            Self::Extended(_) => AddressingMode::Extended,
        }
    }

    /// Parse an address from a buffer with the given mode.
    pub fn parse(mode: AddressingMode, bytes: &[u8]) -> Result<Self> {
        match mode {
            AddressingMode::Absent => Ok(Self::Absent),
            AddressingMode::Extended => {
                if bytes.len() < 8 {
                    return Err(Error);
                }
                let mut addr = [0u8; 8];
                addr.copy_from_slice(&bytes[..8]);
                addr.reverse();
                Ok(Self::Extended(addr))
            }
            AddressingMode::Unknown => Err(Error),
        }
    }

    /// Return the wire representation (little-endian byte order).
    pub fn as_bytes(&self) -> [u8; 8] {
        match self {
            Self::Absent => [0; 8],
            Self::Extended(addr) => {
                let mut bytes = *addr;
                bytes.reverse();
                bytes
            }
        }
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Extended(addr) => {
                write!(
                    f,
                    "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                    addr[0], addr[1], addr[2], addr[3], addr[4], addr[5], addr[6], addr[7]
                )
            }
        }
    }
}

/// A reader/writer for the addressing fields of a frame.
///
/// The destination address precedes the source address. PAN IDs are never
/// present on this network.
#[derive(Debug, Eq, PartialEq)]
pub struct AddressingFields<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> AddressingFields<T> {
    /// Create a new [`AddressingFields`] reader/writer from a given buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is too short for the modes announced
    /// in the frame control field.
    pub fn new<FC: AsRef<[u8]>>(data: T, fc: &FrameControl<FC>) -> Result<Self> {
        let af = Self::new_unchecked(data);

        if !af.check_len(fc) {
            return Err(Error);
        }

        Ok(af)
    }

    fn check_len<FC: AsRef<[u8]>>(&self, fc: &FrameControl<FC>) -> bool {
        self.data.as_ref().len() >= Self::length_for(fc)
    }

    /// Create a new [`AddressingFields`] reader/writer without length
    /// checking.
    pub fn new_unchecked(data: T) -> Self {
        Self { data }
    }

    /// Return the encoded length of the addressing fields for a given frame
    /// control field.
    pub fn length_for<FC: AsRef<[u8]>>(fc: &FrameControl<FC>) -> usize {
        fc.dst_addressing_mode().size() + fc.src_addressing_mode().size()
    }

    /// Return the destination [`Address`].
    pub fn dst_address<FC: AsRef<[u8]>>(&self, fc: &FrameControl<FC>) -> Option<Address> {
        Address::parse(fc.dst_addressing_mode(), self.data.as_ref()).ok()
    }

    /// Return the source [`Address`].
    pub fn src_address<FC: AsRef<[u8]>>(&self, fc: &FrameControl<FC>) -> Option<Address> {
        let offset = fc.dst_addressing_mode().size();
        Address::parse(fc.src_addressing_mode(), &self.data.as_ref()[offset..]).ok()
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> AddressingFields<T> {
    /// Write destination and source addresses.
    pub fn set_addresses(&mut self, dst: Address, src: Address) {
        let data = self.data.as_mut();
        let mut offset = 0;
        if let Address::Extended(_) = dst {
            data[offset..offset + 8].copy_from_slice(&dst.as_bytes());
            offset += 8;
        }
        if let Address::Extended(_) = src {
            data[offset..offset + 8].copy_from_slice(&src.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrameType;

    fn fc_buffer(dst: AddressingMode, src: AddressingMode) -> [u8; 2] {
        let mut bytes = [0u8; 2];
        let mut fc = FrameControl::new_unchecked(&mut bytes[..]);
        fc.set_frame_type(FrameType::Data);
        fc.set_dst_addressing_mode(dst);
        fc.set_src_addressing_mode(src);
        bytes
    }

    #[test]
    fn round_trip_addresses() {
        let fc_bytes = fc_buffer(AddressingMode::Extended, AddressingMode::Extended);
        let fc = FrameControl::new(&fc_bytes[..]).unwrap();

        let mut buffer = [0u8; 16];
        let mut af = AddressingFields::new_unchecked(&mut buffer[..]);
        let dst = Address::Extended([1, 2, 3, 4, 5, 6, 7, 8]);
        let src = Address::Extended([9, 10, 11, 12, 13, 14, 15, 16]);
        af.set_addresses(dst, src);

        let af = AddressingFields::new(&buffer[..], &fc).unwrap();
        assert_eq!(af.dst_address(&fc), Some(dst));
        assert_eq!(af.src_address(&fc), Some(src));
    }

    #[test]
    fn wire_order_is_little_endian() {
        let addr = Address::Extended([1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(addr.as_bytes(), [8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn broadcast() {
        assert!(Address::BROADCAST.is_broadcast());
        assert!(!Address::BROADCAST.is_unicast());
        assert!(Address::Extended([1; 8]).is_unicast());
    }

    #[test]
    fn too_short_for_modes() {
        let fc_bytes = fc_buffer(AddressingMode::Extended, AddressingMode::Extended);
        let fc = FrameControl::new(&fc_bytes[..]).unwrap();
        assert!(AddressingFields::new(&[0u8; 8][..], &fc).is_err());
    }
}
