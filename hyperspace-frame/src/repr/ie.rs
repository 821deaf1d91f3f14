//! High-level representations of information elements.

use heapless::Vec;

use crate::{
    Error, HeaderElementId, HeaderInformationElement, InformationElements, LocBeacon, NbrRecord,
    PayloadGroupId, PayloadInformationElement, Result, SlotframeDescriptor, TimeCorrection,
    TschSync, MAX_NBR_RECORDS,
};

/// Maximum SSID length in bytes.
pub const MAX_SSID_LEN: usize = 16;
/// Maximum number of cells in a slotframe descriptor.
pub const MAX_DESCRIPTOR_CELLS: usize = 8;

/// A high-level representation of a header information element.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderIeRepr {
    /// The network SSID.
    Ssid(Vec<u8, MAX_SSID_LEN>),
    /// TSCH synchronisation.
    TschSync {
        /// The transmitter's ASN at its slot start.
        asn: u64,
        /// The transmitter's join metric.
        join_metric: u8,
    },
    /// A slotframe descriptor.
    SlotframeDescriptor {
        /// The slotframe handle.
        handle: u8,
        /// The slotframe length in slots.
        length: u16,
        /// `(slot_offset, channel_offset, kind)` cell descriptors.
        cells: Vec<(u16, u8, u8), MAX_DESCRIPTOR_CELLS>,
    },
    /// A signed slot-origin correction in radio ticks.
    TimeCorrection(i32),
}

impl HeaderIeRepr {
    /// Return the content length in bytes.
    pub fn content_len(&self) -> usize {
        match self {
            Self::Ssid(ssid) => ssid.len(),
            Self::TschSync { .. } => TschSync::<&[u8]>::LEN,
            Self::SlotframeDescriptor { cells, .. } => {
                SlotframeDescriptor::<&[u8]>::len_for(cells.len())
            }
            Self::TimeCorrection(_) => TimeCorrection::<&[u8]>::LEN,
        }
    }

    fn element_id(&self) -> HeaderElementId {
        match self {
            Self::Ssid(_) => HeaderElementId::Ssid,
            Self::TschSync { .. } => HeaderElementId::TschSync,
            Self::SlotframeDescriptor { .. } => HeaderElementId::SlotframeDescriptor,
            Self::TimeCorrection(_) => HeaderElementId::TimeCorrection,
        }
    }

    /// Parse a header information element, skipping unknown ones.
    pub fn parse<T: AsRef<[u8]>>(ie: &HeaderInformationElement<T>) -> Option<Self> {
        match ie.element_id() {
            HeaderElementId::Ssid => {
                let mut ssid = Vec::new();
                ssid.extend_from_slice(ie.content()).ok()?;
                Some(Self::Ssid(ssid))
            }
            HeaderElementId::TschSync => {
                let sync = TschSync::new(ie.content()).ok()?;
                Some(Self::TschSync { asn: sync.asn(), join_metric: sync.join_metric() })
            }
            HeaderElementId::SlotframeDescriptor => {
                let d = SlotframeDescriptor::new(ie.content()).ok()?;
                let mut cells = Vec::new();
                for i in 0..d.cell_count() {
                    let (slot, channel, kind) = d.cell(i);
                    cells.push((slot, channel, kind)).ok()?;
                }
                Some(Self::SlotframeDescriptor { handle: d.handle(), length: d.length(), cells })
            }
            HeaderElementId::TimeCorrection => {
                let tc = TimeCorrection::new(ie.content()).ok()?;
                Some(Self::TimeCorrection(tc.ticks()))
            }
            _ => None,
        }
    }

    /// Emit this header IE (descriptor and content) into a buffer.
    pub fn emit(&self, buffer: &mut [u8]) {
        let mut ie = HeaderInformationElement::new_unchecked(&mut buffer[..]);
        ie.set_length(self.content_len() as u16);
        ie.set_element_id(self.element_id());

        let content = ie.content_mut();
        match self {
            Self::Ssid(ssid) => content[..ssid.len()].copy_from_slice(ssid),
            Self::TschSync { asn, join_metric } => {
                // The zeroed buffer is long enough, checked by the caller.
                let mut sync = TschSync::new(content).unwrap();
                sync.set_asn(*asn);
                sync.set_join_metric(*join_metric);
            }
            Self::SlotframeDescriptor { handle, length, cells } => {
                let mut d = SlotframeDescriptor::new(content).unwrap();
                d.set_header(*handle, *length, cells.len() as u8);
                for (i, (slot, channel, kind)) in cells.iter().enumerate() {
                    d.set_cell(i, *slot, *channel, *kind);
                }
            }
            Self::TimeCorrection(ticks) => {
                TimeCorrection::new(content).unwrap().set_ticks(*ticks);
            }
        }
    }
}

/// A high-level representation of the LocBeacon payload IE.
#[derive(Debug, Clone, PartialEq)]
pub struct LocBeaconRepr {
    /// The transmitter's beacon index.
    pub class: u8,
    /// The direction in force for this slot.
    pub direction: u8,
    /// The location-slot index (0..4).
    pub loc_slot: u8,
    /// The sub-offset this frame is transmitted at (0..7).
    pub sub_offset: u8,
    /// The transmitter's position in metres.
    pub position: (f32, f32, f32),
    /// The transmitter's routing coordinate.
    pub routing_coord: (f32, f32),
    /// The transmitter's 20-bit neighbourhood mask.
    pub neighborhood: u32,
    /// The neighbour records.
    pub records: Vec<NbrRecord, MAX_NBR_RECORDS>,
}

impl LocBeaconRepr {
    /// Return the content length in bytes.
    pub fn content_len(&self) -> usize {
        LocBeacon::<&[u8]>::len_for(self.records.len())
    }

    /// Parse a LocBeacon body.
    pub fn parse<T: AsRef<[u8]>>(body: &LocBeacon<T>) -> Result<Self> {
        let mut records = Vec::new();
        for record in body.records() {
            records.push(record).map_err(|_| Error)?;
        }
        Ok(Self {
            class: body.class(),
            direction: body.direction(),
            loc_slot: body.loc_slot(),
            sub_offset: body.sub_offset(),
            position: body.position(),
            routing_coord: body.routing_coord(),
            neighborhood: body.neighborhood(),
            records,
        })
    }

    /// Emit the body into a buffer of exactly [`content_len`] bytes.
    ///
    /// [`content_len`]: Self::content_len
    pub fn emit(&self, buffer: &mut [u8]) {
        let mut body = LocBeacon::new_unchecked(buffer);
        body.set_version(crate::LOC_BEACON_VERSION);
        body.set_class(self.class);
        body.set_dir_slot_offset(self.direction, self.loc_slot, self.sub_offset);
        body.set_position(self.position.0, self.position.1, self.position.2);
        body.set_routing_coord(self.routing_coord.0, self.routing_coord.1);
        body.set_neighborhood(self.neighborhood);
        for (i, record) in self.records.iter().enumerate() {
            body.set_record(i, *record);
        }
    }
}

/// A high-level representation of a payload information element.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadIeRepr {
    /// A location-slot beacon body.
    LocBeacon(LocBeaconRepr),
}

impl PayloadIeRepr {
    /// Return the content length in bytes.
    pub fn content_len(&self) -> usize {
        match self {
            Self::LocBeacon(b) => b.content_len(),
        }
    }

    fn group_id(&self) -> PayloadGroupId {
        match self {
            Self::LocBeacon(_) => PayloadGroupId::LocBeacon,
        }
    }

    /// Parse a payload information element, skipping unknown ones.
    pub fn parse<T: AsRef<[u8]>>(ie: &PayloadInformationElement<T>) -> Option<Self> {
        match ie.group_id() {
            PayloadGroupId::LocBeacon => {
                let body = LocBeacon::new(ie.content()).ok()?;
                Some(Self::LocBeacon(LocBeaconRepr::parse(&body).ok()?))
            }
            _ => None,
        }
    }

    /// Emit this payload IE (descriptor and content) into a buffer.
    pub fn emit(&self, buffer: &mut [u8]) {
        let mut ie = PayloadInformationElement::new_unchecked(&mut buffer[..]);
        ie.set_length(self.content_len() as u16);
        ie.set_group_id(self.group_id());
        match self {
            Self::LocBeacon(b) => b.emit(&mut ie.content_mut()[..b.content_len()]),
        }
    }
}

/// Maximum header IEs a frame representation can hold.
pub const MAX_HEADER_IES: usize = 4;
/// Maximum payload IEs a frame representation can hold.
pub const MAX_PAYLOAD_IES: usize = 2;

/// A high-level representation of the information elements of a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InformationElementsRepr {
    /// The header information elements.
    pub header_information_elements: Vec<HeaderIeRepr, MAX_HEADER_IES>,
    /// The payload information elements.
    pub payload_information_elements: Vec<PayloadIeRepr, MAX_PAYLOAD_IES>,
}

impl InformationElementsRepr {
    /// Parse the information elements of a frame, keeping the known ones.
    pub fn parse<T: AsRef<[u8]>>(ie: &InformationElements<T>) -> Result<Self> {
        let mut repr = Self::default();

        for header in ie.header_information_elements() {
            if let Some(header) = HeaderIeRepr::parse(&header) {
                repr.header_information_elements.push(header).map_err(|_| Error)?;
            }
        }

        for payload in ie.payload_information_elements() {
            if let Some(payload) = PayloadIeRepr::parse(&payload) {
                repr.payload_information_elements.push(payload).map_err(|_| Error)?;
            }
        }

        Ok(repr)
    }

    /// Return the encoded length in bytes, including termination IEs.
    pub fn buffer_len(&self, payload_follows: bool) -> usize {
        let mut len = 0;

        for ie in &self.header_information_elements {
            len += 2 + ie.content_len();
        }

        // Header termination: 1 when payload IEs follow, 2 when the frame
        // payload follows directly.
        if !self.payload_information_elements.is_empty() || payload_follows {
            len += 2;
        }

        for ie in &self.payload_information_elements {
            len += 2 + ie.content_len();
        }

        if !self.payload_information_elements.is_empty() && payload_follows {
            len += 2;
        }

        len
    }

    /// Emit the information elements into a buffer.
    pub fn emit(&self, buffer: &mut [u8], payload_follows: bool) {
        let mut offset = 0;

        for ie in &self.header_information_elements {
            ie.emit(&mut buffer[offset..]);
            offset += 2 + ie.content_len();
        }

        if !self.payload_information_elements.is_empty() {
            let mut termination =
                HeaderInformationElement::new_unchecked(&mut buffer[offset..]);
            termination.set_length(0);
            termination.set_element_id(HeaderElementId::HeaderTermination1);
            offset += 2;
        } else if payload_follows {
            let mut termination =
                HeaderInformationElement::new_unchecked(&mut buffer[offset..]);
            termination.set_length(0);
            termination.set_element_id(HeaderElementId::HeaderTermination2);
            offset += 2;
        }

        for ie in &self.payload_information_elements {
            ie.emit(&mut buffer[offset..]);
            offset += 2 + ie.content_len();
        }

        if !self.payload_information_elements.is_empty() && payload_follows {
            let mut termination =
                PayloadInformationElement::new_unchecked(&mut buffer[offset..]);
            termination.set_length(0);
            termination.set_group_id(PayloadGroupId::PayloadTermination);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_ie_round_trip() {
        let reprs = [
            HeaderIeRepr::TschSync { asn: 123_456, join_metric: 2 },
            HeaderIeRepr::TimeCorrection(-42),
        ];

        for repr in reprs {
            let mut buffer = [0u8; 32];
            repr.emit(&mut buffer);
            let ie = HeaderInformationElement::new(&buffer[..2 + repr.content_len()]).unwrap();
            assert_eq!(HeaderIeRepr::parse(&ie), Some(repr));
        }
    }

    #[test]
    fn loc_beacon_ie_round_trip() {
        let mut records = Vec::new();
        records.push(NbrRecord { addr: [5; 8], tstamp: 1000 }).unwrap();

        let repr = PayloadIeRepr::LocBeacon(LocBeaconRepr {
            class: 4,
            direction: 3,
            loc_slot: 1,
            sub_offset: 2,
            position: (1.0, 2.0, 3.0),
            routing_coord: (2.634, 0.0),
            neighborhood: 0b1111,
            records,
        });

        let mut buffer = [0u8; 128];
        repr.emit(&mut buffer);
        let ie = PayloadInformationElement::new(&buffer[..2 + repr.content_len()]).unwrap();
        assert_eq!(PayloadIeRepr::parse(&ie), Some(repr));
    }

    #[test]
    fn buffer_len_matches_emit() {
        let mut ssid = Vec::new();
        ssid.extend_from_slice(b"mesh-0").unwrap();

        let mut repr = InformationElementsRepr::default();
        repr.header_information_elements.push(HeaderIeRepr::Ssid(ssid)).unwrap();
        repr.header_information_elements
            .push(HeaderIeRepr::TschSync { asn: 77, join_metric: 0 })
            .unwrap();

        // Header IEs only, no payload: no termination needed.
        assert_eq!(repr.buffer_len(false), 2 + 6 + 2 + 9);
        // Header IEs and a payload: termination 2.
        assert_eq!(repr.buffer_len(true), 2 + 6 + 2 + 9 + 2);
    }
}
