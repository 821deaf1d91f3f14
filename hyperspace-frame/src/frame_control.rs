//! IEEE 802.15.4 frame control field reader and writer.

use super::{Error, Result};

/// A reader/writer for the IEEE 802.15.4 frame control field.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct FrameControl<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> FrameControl<T> {
    /// Create a new [`FrameControl`] reader/writer from a given buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is too short.
    pub fn new(data: T) -> Result<Self> {
        let fc = Self::new_unchecked(data);

        if !fc.check_len() {
            return Err(Error);
        }

        Ok(fc)
    }

    /// Returns `false` if the buffer is too short to contain the frame
    /// control field.
    fn check_len(&self) -> bool {
        self.data.as_ref().len() >= 2
    }

    /// Create a new [`FrameControl`] reader/writer from a given buffer
    /// without length checking.
    pub fn new_unchecked(data: T) -> Self {
        Self { data }
    }

    fn get(&self) -> u16 {
        let b = &self.data.as_ref()[0..2];
        u16::from_le_bytes([b[0], b[1]])
    }

    /// Return the [`FrameType`].
    pub fn frame_type(&self) -> FrameType {
        FrameType::from((self.get() & 0b111) as u8)
    }

    /// Returns `true` when the frame-pending bit is set.
    pub fn frame_pending(&self) -> bool {
        (self.get() >> 4) & 0b1 == 1
    }

    /// Returns `true` when the sender requests an acknowledgment.
    pub fn ack_request(&self) -> bool {
        (self.get() >> 5) & 0b1 == 1
    }

    /// Returns `true` when the sequence number is suppressed.
    pub fn sequence_number_suppression(&self) -> bool {
        (self.get() >> 8) & 0b1 == 1
    }

    /// Returns `true` when information elements follow the addressing
    /// fields.
    pub fn information_elements_present(&self) -> bool {
        (self.get() >> 9) & 0b1 == 1
    }

    /// Return the destination [`AddressingMode`].
    pub fn dst_addressing_mode(&self) -> AddressingMode {
        AddressingMode::from(((self.get() >> 10) & 0b11) as u8)
    }

    /// Return the [`FrameVersion`].
    pub fn frame_version(&self) -> FrameVersion {
        FrameVersion::from(((self.get() >> 12) & 0b11) as u8)
    }

    /// Return the source [`AddressingMode`].
    pub fn src_addressing_mode(&self) -> AddressingMode {
        AddressingMode::from(((self.get() >> 14) & 0b11) as u8)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> FrameControl<T> {
    fn set(&mut self, value: u16) {
        self.data.as_mut()[0..2].copy_from_slice(&value.to_le_bytes());
    }

    fn set_bits(&mut self, shift: u16, mask: u16, value: u16) {
        let fc = self.get() & !(mask << shift);
        self.set(fc | ((value & mask) << shift));
    }

    /// Set the frame type field.
    pub fn set_frame_type(&mut self, frame_type: FrameType) {
        self.set_bits(0, 0b111, frame_type as u16);
    }

    /// Set the frame-pending bit.
    pub fn set_frame_pending(&mut self, pending: bool) {
        self.set_bits(4, 0b1, pending as u16);
    }

    /// Set the acknowledgment-request bit.
    pub fn set_ack_request(&mut self, ack: bool) {
        self.set_bits(5, 0b1, ack as u16);
    }

    /// Set the sequence-number-suppression bit.
    pub fn set_sequence_number_suppression(&mut self, suppressed: bool) {
        self.set_bits(8, 0b1, suppressed as u16);
    }

    /// Set the information-elements-present bit.
    pub fn set_information_elements_present(&mut self, present: bool) {
        self.set_bits(9, 0b1, present as u16);
    }

    /// Set the destination addressing mode field.
    pub fn set_dst_addressing_mode(&mut self, mode: AddressingMode) {
        self.set_bits(10, 0b11, mode as u16);
    }

    /// Set the frame version field.
    pub fn set_frame_version(&mut self, version: FrameVersion) {
        self.set_bits(12, 0b11, version as u16);
    }

    /// Set the source addressing mode field.
    pub fn set_src_addressing_mode(&mut self, mode: AddressingMode) {
        self.set_bits(14, 0b11, mode as u16);
    }
}

/// IEEE 802.15.4 frame type.
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum FrameType {
    /// Beacon (the TSCH advertisement is an enhanced beacon).
    Beacon = 0b000,
    /// Data frame.
    Data = 0b001,
    /// Acknowledgment.
    Ack = 0b010,
    /// MAC command.
    MacCommand = 0b011,
    /// Unknown frame type.
    Unknown,
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            0b000 => Self::Beacon,
            0b001 => Self::Data,
            0b010 => Self::Ack,
            0b011 => Self::MacCommand,
            _ => Self::Unknown,
        }
    }
}

/// IEEE 802.15.4 addressing mode.
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum AddressingMode {
    /// The address field is not present.
    Absent = 0b00,
    /// The address field is an 8-byte extended address.
    Extended = 0b11,
    /// Unknown addressing mode.
    Unknown,
}

impl From<u8> for AddressingMode {
    fn from(value: u8) -> Self {
        match value {
            0b00 => Self::Absent,
            0b11 => Self::Extended,
            _ => Self::Unknown,
        }
    }
}

impl AddressingMode {
    /// Return the length of the address field in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Absent => 0,
            Self::Extended => 8,
            Self::Unknown => 0,
        }
    }
}

/// IEEE 802.15.4 frame version.
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum FrameVersion {
    /// IEEE 802.15.4-2003.
    Ieee802154_2003 = 0b00,
    /// IEEE 802.15.4-2006.
    Ieee802154_2006 = 0b01,
    /// IEEE 802.15.4-2020.
    Ieee802154_2020 = 0b10,
    /// Unknown frame version.
    Unknown,
}

impl From<u8> for FrameVersion {
    fn from(value: u8) -> Self {
        match value {
            0b00 => Self::Ieee802154_2003,
            0b01 => Self::Ieee802154_2006,
            0b10 => Self::Ieee802154_2020,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_fields() {
        // Data frame, ack request, IEs present, extended addressing, 2020.
        let bytes = [0b0010_0001u8, 0b1110_1110];
        let fc = FrameControl::new(&bytes[..]).unwrap();
        assert_eq!(fc.frame_type(), FrameType::Data);
        assert!(fc.ack_request());
        assert!(!fc.frame_pending());
        assert!(!fc.sequence_number_suppression());
        assert!(fc.information_elements_present());
        assert_eq!(fc.dst_addressing_mode(), AddressingMode::Extended);
        assert_eq!(fc.src_addressing_mode(), AddressingMode::Extended);
        assert_eq!(fc.frame_version(), FrameVersion::Ieee802154_2020);
    }

    #[test]
    fn write_fields() {
        let mut bytes = [0u8; 2];
        let mut fc = FrameControl::new(&mut bytes[..]).unwrap();
        fc.set_frame_type(FrameType::Ack);
        fc.set_sequence_number_suppression(true);
        fc.set_frame_version(FrameVersion::Ieee802154_2020);

        let fc = FrameControl::new(&bytes[..]).unwrap();
        assert_eq!(fc.frame_type(), FrameType::Ack);
        assert!(fc.sequence_number_suppression());
        assert_eq!(fc.dst_addressing_mode(), AddressingMode::Absent);
        assert_eq!(fc.frame_version(), FrameVersion::Ieee802154_2020);
    }

    #[test]
    fn too_short() {
        assert!(FrameControl::new(&[0u8][..]).is_err());
    }
}
