//! Information Elements.
//!
//! Header IEs carry MAC-internal state: the network SSID, TSCH
//! synchronisation (ASN + join metric), slotframe descriptors and time
//! corrections. Payload IEs carry the location-slot bodies
//! ([`LocBeacon`]).
//!
//! [`LocBeacon`]: crate::LocBeacon

mod headers;
pub use headers::*;

mod payloads;
pub use payloads::*;

use super::{Error, Result};

/// A reader for the information-element region of a frame.
#[derive(Debug)]
pub struct InformationElements<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> InformationElements<T> {
    /// Create a new [`InformationElements`] reader.
    pub fn new(data: T) -> Result<Self> {
        let ie = Self::new_unchecked(data);

        // The region must start with at least one valid header IE.
        let mut iter = ie.header_information_elements();
        if iter.next().is_none() && !ie.data.as_ref().is_empty() {
            return Err(Error);
        }

        Ok(ie)
    }

    /// Create a new [`InformationElements`] reader without validation.
    pub fn new_unchecked(data: T) -> Self {
        Self { data }
    }

    /// Returns an [`Iterator`] over [`HeaderInformationElement`]s.
    pub fn header_information_elements(&self) -> HeaderInformationElementsIterator {
        HeaderInformationElementsIterator {
            data: self.data.as_ref(),
            offset: 0,
            terminated: self.data.as_ref().is_empty(),
        }
    }

    /// Returns an [`Iterator`] over [`PayloadInformationElement`]s.
    pub fn payload_information_elements(&self) -> PayloadInformationElementsIterator {
        let mut iter = self.header_information_elements();
        // Drain the header IEs to find where the payload IEs start.
        for _ in iter.by_ref() {}

        PayloadInformationElementsIterator {
            data: self.data.as_ref(),
            offset: iter.offset(),
            terminated: iter.offset() >= self.data.as_ref().len(),
        }
    }

    /// Return the offset of the frame payload relative to the start of the
    /// IE region.
    pub fn payload_offset(&self) -> usize {
        let mut iter = self.payload_information_elements();
        for _ in iter.by_ref() {}
        iter.offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_payload() {
        // SSID "ab", header termination 1, one LocBeacon payload IE with
        // 4 content bytes, payload termination.
        let mut data = [0u8; 20];
        let mut offset = 0;

        let mut ssid = HeaderInformationElement::new_unchecked(&mut data[offset..]);
        ssid.set_length(2);
        ssid.set_element_id(HeaderElementId::Ssid);
        ssid.content_mut()[..2].copy_from_slice(b"ab");
        offset += 4;

        let mut term = HeaderInformationElement::new_unchecked(&mut data[offset..]);
        term.set_length(0);
        term.set_element_id(HeaderElementId::HeaderTermination1);
        offset += 2;

        let mut loc = PayloadInformationElement::new_unchecked(&mut data[offset..]);
        loc.set_length(4);
        loc.set_group_id(PayloadGroupId::LocBeacon);
        loc.content_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        offset += 6;

        let mut term = PayloadInformationElement::new_unchecked(&mut data[offset..]);
        term.set_length(0);
        term.set_group_id(PayloadGroupId::PayloadTermination);
        offset += 2;

        let ie = InformationElements::new(&data[..offset]).unwrap();

        let headers: heapless::Vec<_, 4> = ie.header_information_elements().collect();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].element_id(), HeaderElementId::Ssid);
        assert_eq!(headers[0].content(), b"ab");

        let payloads: heapless::Vec<_, 4> = ie.payload_information_elements().collect();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].group_id(), PayloadGroupId::LocBeacon);
        assert_eq!(payloads[0].content(), &[1, 2, 3, 4]);

        assert_eq!(ie.payload_offset(), offset);
    }
}
