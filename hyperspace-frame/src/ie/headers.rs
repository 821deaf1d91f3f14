//! Header Information Element readers and writers.

use crate::{Error, Result};

bitflags::bitflags! {
    /// Link options of a scheduled cell, as advertised in slotframe
    /// descriptors (packed into the high nibble of the cell kind byte).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CellOptions: u8 {
        /// The cell may transmit.
        const TX = 0b0001;
        /// The cell may receive.
        const RX = 0b0010;
        /// Access is contended.
        const SHARED = 0b0100;
        /// Received SFDs resynchronise the slot origin.
        const TIMEKEEPING = 0b1000;
    }
}

/// A reader/writer for a Header Information Element.
///
/// The descriptor packs the content length in bits 0..7, the element ID in
/// bits 7..15 and a zero type bit in bit 15.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct HeaderInformationElement<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> HeaderInformationElement<T> {
    /// Create a new [`HeaderInformationElement`] reader/writer from a given
    /// buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is too short for the descriptor and
    /// its announced content.
    pub fn new(data: T) -> Result<Self> {
        let ie = Self::new_unchecked(data);

        if !ie.check_len() {
            return Err(Error);
        }

        Ok(ie)
    }

    fn check_len(&self) -> bool {
        let data = self.data.as_ref();
        data.len() >= 2 && data.len() >= 2 + self.len()
    }

    /// Create a new [`HeaderInformationElement`] reader/writer from a given
    /// buffer without length checking.
    pub fn new_unchecked(data: T) -> Self {
        Self { data }
    }

    /// Returns `true` when the length field is 0.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the length field value.
    pub fn len(&self) -> usize {
        let b = &self.data.as_ref()[0..2];
        u16::from_le_bytes([b[0], b[1]]) as usize & 0b0111_1111
    }

    /// Return the [`HeaderElementId`].
    pub fn element_id(&self) -> HeaderElementId {
        let b = &self.data.as_ref()[0..2];
        let id = (u16::from_le_bytes([b[0], b[1]]) >> 7) & 0b1111_1111;
        HeaderElementId::from(id as u8)
    }

    /// Return the content of this Header Information Element.
    pub fn content(&self) -> &[u8] {
        &self.data.as_ref()[2..][..self.len()]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> HeaderInformationElement<T> {
    /// Set the length field.
    pub fn set_length(&mut self, len: u16) {
        const MASK: u16 = 0b0111_1111;

        let b = &mut self.data.as_mut()[0..2];
        let value = u16::from_le_bytes([b[0], b[1]]) & !MASK;
        let value = value | (len & MASK);
        b.copy_from_slice(&value.to_le_bytes());
    }

    /// Set the element ID field.
    pub fn set_element_id(&mut self, id: HeaderElementId) {
        const SHIFT: u16 = 7;
        const MASK: u16 = 0b0111_1111_1000_0000;

        let b = &mut self.data.as_mut()[0..2];
        let value = u16::from_le_bytes([b[0], b[1]]) & !MASK;
        let value = value | (((id as u16) << SHIFT) & MASK);
        b.copy_from_slice(&value.to_le_bytes());
    }

    /// Return the mutable content of this Header Information Element.
    pub fn content_mut(&mut self) -> &mut [u8] {
        &mut self.data.as_mut()[2..]
    }
}

/// Header Information Element ID.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum HeaderElementId {
    /// Time correction (signed tick offset measured against the sender).
    TimeCorrection = 0x1e,
    /// Network SSID (vendor range).
    Ssid = 0x30,
    /// TSCH synchronisation: ASN and join metric.
    TschSync = 0x31,
    /// Slotframe descriptor advertised during network formation.
    SlotframeDescriptor = 0x32,
    /// Header termination 1 (payload IEs follow).
    HeaderTermination1 = 0x7e,
    /// Header termination 2 (the frame payload follows directly).
    HeaderTermination2 = 0x7f,
    /// Unknown header element.
    Unknown,
}

impl From<u8> for HeaderElementId {
    fn from(value: u8) -> Self {
        match value {
            0x1e => Self::TimeCorrection,
            0x30 => Self::Ssid,
            0x31 => Self::TschSync,
            0x32 => Self::SlotframeDescriptor,
            0x7e => Self::HeaderTermination1,
            0x7f => Self::HeaderTermination2,
            _ => Self::Unknown,
        }
    }
}

/// An [`Iterator`] over [`HeaderInformationElement`].
#[derive(Debug)]
pub struct HeaderInformationElementsIterator<'f> {
    pub(crate) data: &'f [u8],
    pub(crate) offset: usize,
    pub(crate) terminated: bool,
}

impl HeaderInformationElementsIterator<'_> {
    /// Return the offset just past the last header IE.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'f> Iterator for HeaderInformationElementsIterator<'f> {
    type Item = HeaderInformationElement<&'f [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.terminated {
            return None;
        }

        let Ok(ie) = HeaderInformationElement::new(&self.data[self.offset..]) else {
            self.terminated = true;
            return None;
        };

        self.terminated = matches!(
            ie.element_id(),
            HeaderElementId::HeaderTermination1 | HeaderElementId::HeaderTermination2
        );

        self.offset += ie.len() + 2;

        if self.offset >= self.data.len() {
            self.terminated = true;
        }

        Some(ie)
    }
}

/// A reader/writer for the TSCH synchronisation header IE content.
///
/// Content layout (little-endian): `u64 asn; u8 join_metric`.
#[derive(Debug, Eq, PartialEq)]
pub struct TschSync<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> TschSync<T> {
    /// The content length in bytes.
    pub const LEN: usize = 9;

    /// Create a new [`TschSync`] reader/writer from a given buffer.
    pub fn new(data: T) -> Result<Self> {
        if data.as_ref().len() < Self::LEN {
            return Err(Error);
        }
        Ok(Self { data })
    }

    /// Return the absolute slot number.
    pub fn asn(&self) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.data.as_ref()[0..8]);
        u64::from_le_bytes(b)
    }

    /// Return the join metric. Lower is a better time source.
    pub fn join_metric(&self) -> u8 {
        self.data.as_ref()[8]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> TschSync<T> {
    /// Set the absolute slot number.
    pub fn set_asn(&mut self, asn: u64) {
        self.data.as_mut()[0..8].copy_from_slice(&asn.to_le_bytes());
    }

    /// Set the join metric.
    pub fn set_join_metric(&mut self, metric: u8) {
        self.data.as_mut()[8] = metric;
    }
}

/// A reader/writer for the slotframe descriptor header IE content.
///
/// Content layout (little-endian): `u8 handle; u16 length; u8 cell_count;
/// struct { u16 slot_offset; u8 channel_offset; u8 kind; } cells[]`.
#[derive(Debug, Eq, PartialEq)]
pub struct SlotframeDescriptor<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> SlotframeDescriptor<T> {
    const HEADER: usize = 4;
    const CELL: usize = 4;

    /// Create a new [`SlotframeDescriptor`] reader/writer.
    pub fn new(data: T) -> Result<Self> {
        let d = Self { data };
        if d.data.as_ref().len() < Self::HEADER
            || d.data.as_ref().len() < Self::len_for(d.cell_count())
        {
            return Err(Error);
        }
        Ok(d)
    }

    /// Return the content length for a given number of cells.
    pub const fn len_for(cells: usize) -> usize {
        Self::HEADER + cells * Self::CELL
    }

    /// Return the slotframe handle.
    pub fn handle(&self) -> u8 {
        self.data.as_ref()[0]
    }

    /// Return the slotframe length in slots.
    pub fn length(&self) -> u16 {
        let b = self.data.as_ref();
        u16::from_le_bytes([b[1], b[2]])
    }

    /// Return the number of advertised cells.
    pub fn cell_count(&self) -> usize {
        self.data.as_ref()[3] as usize
    }

    /// Return the cell descriptor at `index` as
    /// `(slot_offset, channel_offset, kind)`.
    pub fn cell(&self, index: usize) -> (u16, u8, u8) {
        let b = &self.data.as_ref()[Self::HEADER + index * Self::CELL..];
        (u16::from_le_bytes([b[0], b[1]]), b[2], b[3])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> SlotframeDescriptor<T> {
    /// Write the descriptor header.
    pub fn set_header(&mut self, handle: u8, length: u16, cell_count: u8) {
        let b = self.data.as_mut();
        b[0] = handle;
        b[1..3].copy_from_slice(&length.to_le_bytes());
        b[3] = cell_count;
    }

    /// Write the cell descriptor at `index`.
    pub fn set_cell(&mut self, index: usize, slot_offset: u16, channel_offset: u8, kind: u8) {
        let b = &mut self.data.as_mut()[Self::HEADER + index * Self::CELL..];
        b[0..2].copy_from_slice(&slot_offset.to_le_bytes());
        b[2] = channel_offset;
        b[3] = kind;
    }
}

/// A reader/writer for the time correction header IE content.
///
/// Content layout: `i32 ticks` (little-endian), the signed slot-origin
/// correction in radio ticks observed against the sender.
#[derive(Debug, Eq, PartialEq)]
pub struct TimeCorrection<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> TimeCorrection<T> {
    /// The content length in bytes.
    pub const LEN: usize = 4;

    /// Create a new [`TimeCorrection`] reader/writer.
    pub fn new(data: T) -> Result<Self> {
        if data.as_ref().len() < Self::LEN {
            return Err(Error);
        }
        Ok(Self { data })
    }

    /// Return the correction in radio ticks.
    pub fn ticks(&self) -> i32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.data.as_ref()[0..4]);
        i32::from_le_bytes(b)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> TimeCorrection<T> {
    /// Set the correction in radio ticks.
    pub fn set_ticks(&mut self, ticks: i32) {
        self.data.as_mut()[0..4].copy_from_slice(&ticks.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsch_sync_round_trip() {
        let mut buffer = [0u8; TschSync::<&[u8]>::LEN];
        let mut sync = TschSync::new(&mut buffer[..]).unwrap();
        sync.set_asn(0x0102_0304_0506_0708);
        sync.set_join_metric(3);

        let sync = TschSync::new(&buffer[..]).unwrap();
        assert_eq!(sync.asn(), 0x0102_0304_0506_0708);
        assert_eq!(sync.join_metric(), 3);
    }

    #[test]
    fn slotframe_descriptor() {
        let mut buffer = [0u8; SlotframeDescriptor::<&[u8]>::len_for(2)];
        let mut d = SlotframeDescriptor { data: &mut buffer[..] };
        d.set_header(0, 40, 2);
        d.set_cell(0, 0, 0, 0);
        d.set_cell(1, 1, 0, 1);

        let d = SlotframeDescriptor::new(&buffer[..]).unwrap();
        assert_eq!(d.handle(), 0);
        assert_eq!(d.length(), 40);
        assert_eq!(d.cell_count(), 2);
        assert_eq!(d.cell(1), (1, 0, 1));
    }

    #[test]
    fn descriptor_id_round_trip() {
        for id in [0x1e, 0x30, 0x31, 0x32, 0x7e, 0x7f] {
            let parsed = HeaderElementId::from(id);
            assert_ne!(parsed, HeaderElementId::Unknown);
            assert_eq!(parsed as u8, id);
        }
        assert_eq!(HeaderElementId::from(0x55), HeaderElementId::Unknown);
    }
}
