//! The top-level frame reader/writer.

use super::*;

/// A reader/writer for a hyperspace MAC frame.
///
/// The layout is the IEEE 802.15.4-2020 general frame format restricted to
/// what this network uses: frame control, optional sequence number,
/// extended addressing without PAN IDs, optional information elements, and
/// the payload. The FCS is handled separately (see [`check_fcs`]).
#[derive(Debug)]
pub struct Frame<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Frame<T> {
    /// Create a new [`Frame`] reader/writer from a given buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is too short to contain a valid
    /// frame.
    pub fn new(buffer: T) -> Result<Self> {
        let frame = Self::new_unchecked(buffer);

        if !frame.check_len() {
            return Err(Error);
        }

        Ok(frame)
    }

    /// Returns `false` if the buffer is too short for the fields announced
    /// by the frame control field.
    fn check_len(&self) -> bool {
        let buffer = self.buffer.as_ref();

        if buffer.len() < 2 {
            return false;
        }

        let fc = FrameControl::new_unchecked(&buffer[..2]);
        if fc.frame_type() == FrameType::Unknown {
            return false;
        }

        let mut len = 2;
        if !fc.sequence_number_suppression() {
            len += 1;
        }
        len += AddressingFields::<&[u8]>::length_for(&fc);

        buffer.len() >= len
    }

    /// Create a new [`Frame`] reader/writer from a given buffer without
    /// length checking.
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Return a [`FrameControl`] reader.
    pub fn frame_control(&self) -> FrameControl<&[u8]> {
        FrameControl::new_unchecked(&self.buffer.as_ref()[..2])
    }

    /// Return the sequence number, unless suppressed.
    pub fn sequence_number(&self) -> Option<u8> {
        if self.frame_control().sequence_number_suppression() {
            None
        } else {
            Some(self.buffer.as_ref()[2])
        }
    }

    fn addressing_offset(&self) -> usize {
        if self.frame_control().sequence_number_suppression() {
            2
        } else {
            3
        }
    }

    fn ie_offset(&self) -> usize {
        self.addressing_offset() + AddressingFields::<&[u8]>::length_for(&self.frame_control())
    }

    /// Return an [`AddressingFields`] reader, if any address is present.
    pub fn addressing(&self) -> Option<AddressingFields<&[u8]>> {
        let fc = self.frame_control();
        if AddressingFields::<&[u8]>::length_for(&fc) == 0 {
            return None;
        }
        AddressingFields::new(&self.buffer.as_ref()[self.addressing_offset()..], &fc).ok()
    }

    /// Return the destination [`Address`], if present.
    pub fn dst_address(&self) -> Option<Address> {
        self.addressing()
            .and_then(|af| af.dst_address(&self.frame_control()))
    }

    /// Return the source [`Address`], if present.
    pub fn src_address(&self) -> Option<Address> {
        self.addressing()
            .and_then(|af| af.src_address(&self.frame_control()))
    }

    /// Return an [`InformationElements`] reader, if IEs are present.
    pub fn information_elements(&self) -> Option<InformationElements<&[u8]>> {
        if !self.frame_control().information_elements_present() {
            return None;
        }
        InformationElements::new(&self.buffer.as_ref()[self.ie_offset()..]).ok()
    }

    /// Return the frame payload, if non-empty.
    ///
    /// The payload starts after the information elements (past the payload
    /// termination IE when one is present).
    pub fn payload(&self) -> Option<&[u8]> {
        let offset = match self.information_elements() {
            Some(ie) => self.ie_offset() + ie.payload_offset(),
            None => self.ie_offset(),
        };

        let buffer = self.buffer.as_ref();
        if offset >= buffer.len() {
            return None;
        }
        Some(&buffer[offset..])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Frame<T> {
    /// Write the frame control field.
    pub fn set_frame_control(&mut self, repr: &FrameControlRepr) {
        let mut fc = FrameControl::new_unchecked(&mut self.buffer.as_mut()[..2]);
        repr.emit(&mut fc);
    }

    /// Write the sequence number.
    pub fn set_sequence_number(&mut self, sequence_number: u8) {
        self.buffer.as_mut()[2] = sequence_number;
    }

    /// Write the addressing fields.
    pub fn set_addressing_fields(&mut self, repr: &AddressingFieldsRepr) {
        let offset = self.addressing_offset();
        let mut af = AddressingFields::new_unchecked(&mut self.buffer.as_mut()[offset..]);
        af.set_addresses(repr.dst_address, repr.src_address);
    }

    /// Write the information elements.
    pub fn set_information_elements(
        &mut self,
        repr: &InformationElementsRepr,
        payload_follows: bool,
    ) {
        let offset = self.ie_offset();
        repr.emit(&mut self.buffer.as_mut()[offset..], payload_follows);
    }

    /// Write the payload.
    pub fn set_payload(&mut self, payload: &[u8]) {
        let buffer = self.buffer.as_mut();
        let offset = buffer.len() - payload.len();
        buffer[offset..].copy_from_slice(payload);
    }
}
