//! High-level frame representations for the TX path.
//!
//! A [`FrameRepr`] owns every field of an outgoing frame. [`buffer_len`]
//! sizes the radio buffer, [`emit`] serialises into it. The RX path stays
//! zero-copy through the readers in the crate root.
//!
//! [`buffer_len`]: FrameRepr::buffer_len
//! [`emit`]: FrameRepr::emit

mod builder;
pub use builder::FrameBuilder;

mod ie;
pub use ie::*;

use super::*;

/// A high-level representation of the frame control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControlRepr {
    /// The frame type.
    pub frame_type: FrameType,
    /// The frame-pending bit.
    pub frame_pending: bool,
    /// The acknowledgment-request bit.
    pub ack_request: bool,
    /// The sequence-number-suppression bit.
    pub sequence_number_suppression: bool,
    /// The information-elements-present bit.
    pub information_elements_present: bool,
    /// The destination addressing mode.
    pub dst_addressing_mode: AddressingMode,
    /// The source addressing mode.
    pub src_addressing_mode: AddressingMode,
    /// The frame version.
    pub frame_version: FrameVersion,
}

impl FrameControlRepr {
    /// Parse a frame control field.
    pub fn parse<T: AsRef<[u8]>>(fc: FrameControl<T>) -> Result<Self> {
        Ok(Self {
            frame_type: fc.frame_type(),
            frame_pending: fc.frame_pending(),
            ack_request: fc.ack_request(),
            sequence_number_suppression: fc.sequence_number_suppression(),
            information_elements_present: fc.information_elements_present(),
            dst_addressing_mode: fc.dst_addressing_mode(),
            src_addressing_mode: fc.src_addressing_mode(),
            frame_version: fc.frame_version(),
        })
    }

    /// Emit the frame control field into a writer.
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]>>(&self, fc: &mut FrameControl<T>) {
        fc.set_frame_type(self.frame_type);
        fc.set_frame_pending(self.frame_pending);
        fc.set_ack_request(self.ack_request);
        fc.set_sequence_number_suppression(self.sequence_number_suppression);
        fc.set_information_elements_present(self.information_elements_present);
        fc.set_dst_addressing_mode(self.dst_addressing_mode);
        fc.set_src_addressing_mode(self.src_addressing_mode);
        fc.set_frame_version(self.frame_version);
    }
}

/// A high-level representation of the addressing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressingFieldsRepr {
    /// The destination address.
    pub dst_address: Address,
    /// The source address.
    pub src_address: Address,
}

impl AddressingFieldsRepr {
    /// Parse the addressing fields of a frame.
    pub fn parse<T: AsRef<[u8]>, FC: AsRef<[u8]>>(
        af: &AddressingFields<T>,
        fc: &FrameControl<FC>,
    ) -> Self {
        Self {
            dst_address: af.dst_address(fc).unwrap_or(Address::Absent),
            src_address: af.src_address(fc).unwrap_or(Address::Absent),
        }
    }

    /// Return the encoded length in bytes.
    pub fn buffer_len(&self) -> usize {
        self.dst_address.mode().size() + self.src_address.mode().size()
    }
}

/// A high-level representation of a frame.
#[derive(Debug)]
pub struct FrameRepr<'p> {
    /// The frame control field.
    pub frame_control: FrameControlRepr,
    /// The sequence number.
    pub sequence_number: Option<u8>,
    /// The addressing fields.
    pub addressing_fields: Option<AddressingFieldsRepr>,
    /// The information elements.
    pub information_elements: Option<InformationElementsRepr>,
    /// The payload.
    pub payload: Option<&'p [u8]>,
}

impl<'f> FrameRepr<'f> {
    /// Parse a frame into its representation.
    pub fn parse(reader: &'f Frame<&'f [u8]>) -> Result<Self> {
        let frame_control = FrameControlRepr::parse(reader.frame_control())?;
        let addressing_fields = reader
            .addressing()
            .map(|af| AddressingFieldsRepr::parse(&af, &reader.frame_control()));
        let information_elements = reader
            .information_elements()
            .map(|ie| InformationElementsRepr::parse(&ie))
            .transpose()?;

        Ok(Self {
            frame_control,
            sequence_number: reader.sequence_number(),
            addressing_fields,
            information_elements,
            payload: reader.payload(),
        })
    }

    /// Return the length of the frame when emitted into a buffer, without
    /// the FCS.
    pub fn buffer_len(&self) -> usize {
        let mut len = 2;

        if self.sequence_number.is_some() {
            len += 1;
        }

        if let Some(af) = &self.addressing_fields {
            len += af.buffer_len();
        }

        if let Some(ie) = &self.information_elements {
            len += ie.buffer_len(self.payload.is_some());
        }

        if let Some(payload) = self.payload {
            len += payload.len();
        }

        len
    }

    /// Emit the frame into a buffer.
    ///
    /// The buffer must be exactly [`buffer_len`] bytes long.
    ///
    /// [`buffer_len`]: Self::buffer_len
    pub fn emit(&self, frame: &mut Frame<&'_ mut [u8]>) {
        frame.set_frame_control(&self.frame_control);

        if let Some(sequence_number) = self.sequence_number {
            frame.set_sequence_number(sequence_number);
        }

        if let Some(af) = &self.addressing_fields {
            frame.set_addressing_fields(af);
        }

        if let Some(ie) = &self.information_elements {
            frame.set_information_elements(ie, self.payload.is_some());
        }

        if let Some(payload) = self.payload {
            frame.set_payload(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_parse_round_trip() {
        let repr = FrameBuilder::new_data(&[1, 2, 3, 4])
            .set_sequence_number(7)
            .set_dst_address(Address::Extended([1, 2, 3, 4, 5, 6, 7, 8]))
            .set_src_address(Address::Extended([8, 7, 6, 5, 4, 3, 2, 1]))
            .finalize()
            .unwrap();

        let mut buffer = [0u8; 127];
        let len = repr.buffer_len();
        repr.emit(&mut Frame::new_unchecked(&mut buffer[..len]));

        let frame = Frame::new(&buffer[..len]).unwrap();
        assert_eq!(frame.frame_control().frame_type(), FrameType::Data);
        assert_eq!(frame.sequence_number(), Some(7));
        assert_eq!(
            frame.dst_address(),
            Some(Address::Extended([1, 2, 3, 4, 5, 6, 7, 8]))
        );
        assert_eq!(frame.payload(), Some(&[1, 2, 3, 4][..]));
    }
}
