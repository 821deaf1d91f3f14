//! A helper for building frames.

use super::*;

/// A helper for building hyperspace MAC frames.
///
/// The builder starts from a frame-type-specific constructor, accumulates
/// fields, and [`finalize`]s into a [`FrameRepr`] after validation.
///
/// [`finalize`]: Self::finalize
pub struct FrameBuilder<'p> {
    frame: FrameRepr<'p>,
}

impl<'p> FrameBuilder<'p> {
    /// Create a new builder for an immediate acknowledgment frame.
    ///
    /// The ACK carries a time-correction IE holding the receiver's
    /// turnaround (`ack_offset - reception_tick`), which the transmitter
    /// folds into its ranging computation.
    pub fn new_ack(sequence_number: u8) -> Self {
        Self {
            frame: FrameRepr {
                frame_control: FrameControlRepr {
                    frame_type: FrameType::Ack,
                    frame_pending: false,
                    ack_request: false,
                    sequence_number_suppression: false,
                    information_elements_present: false,
                    dst_addressing_mode: AddressingMode::Absent,
                    src_addressing_mode: AddressingMode::Absent,
                    frame_version: FrameVersion::Ieee802154_2020,
                },
                sequence_number: Some(sequence_number),
                addressing_fields: None,
                information_elements: None,
                payload: None,
            },
        }
    }

    /// Create a new builder for an advertisement (enhanced beacon) frame.
    pub fn new_advertisement() -> Self {
        Self {
            frame: FrameRepr {
                frame_control: FrameControlRepr {
                    frame_type: FrameType::Beacon,
                    frame_pending: false,
                    ack_request: false,
                    sequence_number_suppression: true,
                    information_elements_present: false,
                    dst_addressing_mode: AddressingMode::Absent,
                    src_addressing_mode: AddressingMode::Absent,
                    frame_version: FrameVersion::Ieee802154_2020,
                },
                sequence_number: None,
                addressing_fields: None,
                information_elements: None,
                payload: None,
            },
        }
    }

    /// Create a new builder for a data frame.
    pub fn new_data(payload: &'p [u8]) -> Self {
        Self {
            frame: FrameRepr {
                frame_control: FrameControlRepr {
                    frame_type: FrameType::Data,
                    frame_pending: false,
                    ack_request: false,
                    sequence_number_suppression: true,
                    information_elements_present: false,
                    dst_addressing_mode: AddressingMode::Absent,
                    src_addressing_mode: AddressingMode::Absent,
                    frame_version: FrameVersion::Ieee802154_2020,
                },
                sequence_number: None,
                addressing_fields: None,
                information_elements: None,
                payload: Some(payload),
            },
        }
    }

    /// Create a new builder for a location-slot frame.
    pub fn new_location(body: LocBeaconRepr) -> Self {
        let mut builder = Self::new_advertisement();
        builder.frame.frame_control.frame_type = FrameType::Data;
        builder
            .add_payload_ie(PayloadIeRepr::LocBeacon(body))
            .expect("a fresh builder has room for one payload IE")
    }

    /// Set the sequence number.
    pub fn set_sequence_number(mut self, sequence_number: u8) -> Self {
        self.frame.sequence_number = Some(sequence_number);
        self.frame.frame_control.sequence_number_suppression = false;
        self
    }

    /// Set the destination address.
    pub fn set_dst_address(mut self, address: Address) -> Self {
        self.frame.frame_control.dst_addressing_mode = address.mode();
        self.addressing_mut().dst_address = address;
        self
    }

    /// Set the source address.
    pub fn set_src_address(mut self, address: Address) -> Self {
        self.frame.frame_control.src_addressing_mode = address.mode();
        self.addressing_mut().src_address = address;
        self
    }

    /// Request an acknowledgment.
    pub fn set_ack_request(mut self) -> Self {
        self.frame.frame_control.ack_request = true;
        self
    }

    fn addressing_mut(&mut self) -> &mut AddressingFieldsRepr {
        self.frame.addressing_fields.get_or_insert(AddressingFieldsRepr {
            dst_address: Address::Absent,
            src_address: Address::Absent,
        })
    }

    fn information_elements_mut(&mut self) -> &mut InformationElementsRepr {
        self.frame.frame_control.information_elements_present = true;
        self.frame.information_elements.get_or_insert_with(Default::default)
    }

    /// Add a header information element.
    pub fn add_header_ie(mut self, ie: HeaderIeRepr) -> Result<Self> {
        self.information_elements_mut()
            .header_information_elements
            .push(ie)
            .map_err(|_| Error)?;
        Ok(self)
    }

    /// Add a payload information element.
    pub fn add_payload_ie(mut self, ie: PayloadIeRepr) -> Result<Self> {
        self.information_elements_mut()
            .payload_information_elements
            .push(ie)
            .map_err(|_| Error)?;
        Ok(self)
    }

    /// Validate the frame and return its representation.
    pub fn finalize(self) -> Result<FrameRepr<'p>> {
        // A data frame with a payload needs addressing.
        if self.frame.frame_control.frame_type == FrameType::Data
            && self.frame.payload.is_some()
            && self.frame.addressing_fields.is_none()
        {
            return Err(Error);
        }

        if let Some(payload) = self.frame.payload {
            if payload.is_empty() {
                return Err(Error);
            }
        }

        Ok(self.frame)
    }
}
