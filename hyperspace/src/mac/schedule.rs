//! The TSCH schedule: slotframes overlaying cells on the ASN timeline.

use heapless::Vec;
use hyperspace_frame::CellOptions;

use crate::time::Asn;

/// Maximum cells per slotframe.
pub const MAX_CELLS: usize = 8;
/// Maximum slotframes per schedule.
pub const MAX_SLOTFRAMES: usize = 2;

/// Errors from schedule manipulation.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq)]
pub enum ScheduleError {
    /// The cell's slot offset is outside the slotframe.
    InvalidSlotOffset,
    /// A cell already occupies this slot offset.
    SlotOccupied,
    /// No room left.
    CapacityExceeded,
    /// A slotframe with this handle already exists, or the length is 0.
    InvalidSlotframe,
}

/// What a node does in a cell.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// The rotating prime beacon advertises; everyone else listens and
    /// resynchronises.
    Advertise = 0,
    /// Network-wide shared TX/RX with contention backoff.
    Shared = 1,
    /// Dedicated transmission to a neighbour.
    Tx = 2,
    /// Dedicated reception.
    Rx = 3,
    /// A location slot; the location engine drives the radio.
    Location = 4,
}

impl CellKind {
    /// Parse a wire descriptor kind (the low nibble of the kind byte).
    pub fn from_wire(value: u8) -> Option<Self> {
        match value & 0x0f {
            0 => Some(Self::Advertise),
            1 => Some(Self::Shared),
            2 => Some(Self::Tx),
            3 => Some(Self::Rx),
            4 => Some(Self::Location),
            _ => None,
        }
    }

    /// The link options a cell of this kind runs with by default.
    pub fn default_options(&self) -> CellOptions {
        match self {
            Self::Advertise => CellOptions::TX | CellOptions::RX | CellOptions::TIMEKEEPING,
            Self::Shared => CellOptions::TX | CellOptions::RX | CellOptions::SHARED,
            Self::Tx => CellOptions::TX,
            Self::Rx => CellOptions::RX,
            Self::Location => CellOptions::TX | CellOptions::RX,
        }
    }
}

/// One scheduled cell of a slotframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    /// The slot offset within the slotframe.
    pub slot_offset: u16,
    /// The channel offset folded into the hopping computation.
    pub channel_offset: u8,
    /// What happens in the cell.
    pub kind: CellKind,
    /// The link options in force.
    pub options: CellOptions,
    /// The dedicated peer for [`CellKind::Tx`]/[`CellKind::Rx`] cells.
    pub neighbor: Option<[u8; 8]>,
}

impl Cell {
    /// The wire kind byte: kind in the low nibble, options in the high.
    pub fn kind_byte(&self) -> u8 {
        (self.kind as u8) | (self.options.bits() << 4)
    }

    /// Parse the wire kind byte.
    pub fn parse_kind_byte(byte: u8) -> Option<(CellKind, CellOptions)> {
        let kind = CellKind::from_wire(byte)?;
        Some((kind, CellOptions::from_bits_truncate(byte >> 4)))
    }
}

/// A repeating schedule of cells.
#[derive(Debug, Clone)]
pub struct Slotframe {
    /// The slotframe handle; lower handles win overlaps.
    pub handle: u8,
    /// The length in slots. ASN 0 is the start of every slotframe.
    pub length: u16,
    cells: Vec<Cell, MAX_CELLS>,
}

impl Slotframe {
    /// Create an empty slotframe.
    pub fn new(handle: u8, length: u16) -> Self {
        Self { handle, length, cells: Vec::new() }
    }

    /// Add a cell.
    pub fn add_cell(&mut self, cell: Cell) -> Result<(), ScheduleError> {
        if cell.slot_offset >= self.length {
            Err(ScheduleError::InvalidSlotOffset)
        } else if self.cells.iter().any(|c| c.slot_offset == cell.slot_offset) {
            Err(ScheduleError::SlotOccupied)
        } else if self.cells.push(cell).is_err() {
            Err(ScheduleError::CapacityExceeded)
        } else {
            Ok(())
        }
    }

    /// Return the cell scheduled at the given ASN, if any.
    pub fn cell_at(&self, asn: Asn) -> Option<&Cell> {
        let offset = asn.slot_offset(self.length);
        self.cells.iter().find(|c| c.slot_offset == offset)
    }

    /// Iterate over the cells.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }
}

/// The set of slotframes a node runs.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    slotframes: Vec<Slotframe, MAX_SLOTFRAMES>,
}

impl Schedule {
    /// Create an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slotframe, keeping the set ordered by handle.
    pub fn add_slotframe(&mut self, slotframe: Slotframe) -> Result<(), ScheduleError> {
        if slotframe.length == 0 || self.slotframes.iter().any(|s| s.handle == slotframe.handle)
        {
            return Err(ScheduleError::InvalidSlotframe);
        }
        let at = self
            .slotframes
            .iter()
            .position(|s| s.handle > slotframe.handle)
            .unwrap_or(self.slotframes.len());
        self.slotframes
            .insert(at, slotframe)
            .map_err(|_| ScheduleError::CapacityExceeded)
    }

    /// Return the cell in force at the given ASN. When slotframes
    /// overlap, the one with the lowest handle wins.
    pub fn cell_at(&self, asn: Asn) -> Option<(&Slotframe, &Cell)> {
        self.slotframes
            .iter()
            .find_map(|sf| sf.cell_at(asn).map(|cell| (sf, cell)))
    }

    /// Iterate over the slotframes.
    pub fn slotframes(&self) -> impl Iterator<Item = &Slotframe> {
        self.slotframes.iter()
    }

    /// The slot offsets of SF1's location cells.
    pub const LOCATION_SLOTS: [u16; 4] = [2, 12, 22, 32];

    /// Build the baseline schedule: SF0 with the advertisement slot and
    /// the network-wide shared slot, SF1 with the four location cells.
    /// Both share `length` so the pattern repeats cleanly.
    pub fn baseline(length: u16) -> Self {
        let mut sf0 = Slotframe::new(0, length);
        // The baseline fits any slotframe of at least 33 slots; unwraps
        // are on capacity that is statically sufficient.
        sf0.add_cell(Cell {
            slot_offset: 0,
            channel_offset: 0,
            kind: CellKind::Advertise,
            options: CellKind::Advertise.default_options(),
            neighbor: None,
        })
        .unwrap();
        sf0.add_cell(Cell {
            slot_offset: 1,
            channel_offset: 0,
            kind: CellKind::Shared,
            options: CellKind::Shared.default_options(),
            neighbor: None,
        })
        .unwrap();

        let mut sf1 = Slotframe::new(1, length);
        for slot_offset in Self::LOCATION_SLOTS {
            sf1.add_cell(Cell {
                slot_offset,
                channel_offset: 0,
                kind: CellKind::Location,
                options: CellKind::Location.default_options(),
                neighbor: None,
            })
            .unwrap();
        }

        let mut schedule = Self::new();
        schedule.add_slotframe(sf0).unwrap();
        schedule.add_slotframe(sf1).unwrap();
        schedule
    }

    /// Return which of the four location cells (if any) the given ASN
    /// lands on.
    pub fn location_slot_index(&self, asn: Asn) -> Option<u8> {
        let sf1 = self.slotframes.iter().find(|s| s.handle == 1)?;
        let offset = asn.slot_offset(sf1.length);
        Self::LOCATION_SLOTS
            .iter()
            .position(|&s| s == offset)
            .map(|i| i as u8)
    }
}
