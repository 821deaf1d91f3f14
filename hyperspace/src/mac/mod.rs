//! The TSCH MAC.
//!
//! One task owns the radio and walks the slot timeline: advertisement
//! slots keep the network synchronised, shared slots move IPv6 traffic
//! under contention backoff, location slots belong to the localisation
//! engine. Detached nodes scan; a node that finds nothing and is allowed
//! to found a network starts its own timeline at ASN 0.

pub mod backoff;
pub mod neighbors;
pub mod schedule;
pub mod slot;

use embedded_hal_async::delay::DelayNs;
use heapless::Vec;
use hyperspace_frame::{
    check_fcs, emit_fcs, Address, Frame, FrameBuilder, FrameType, HeaderIeRepr, LocBeaconRepr,
    PayloadIeRepr, TimeCorrection,
};
use rand_core::RngCore;

use crate::config::Config;
use crate::location::slot::{sub_offset_tick, SubSlotAction};
use crate::location::{table as loc_table, LocationEngine};
use crate::phy::{PacketBuffer, Radio, RadioError, MAX_FRAME_LEN};
use crate::route::{frag, Forward, Router};
use crate::sync::queue::Queue;
use crate::sync::select::select;
use crate::sync::yield_now::yield_now;
use crate::sync::Either;
use crate::time::{Asn, Duration, SLOT_US};
use crate::upper::UpperLayer;

use backoff::Backoff;
use neighbors::NeighborTable;
use schedule::{CellKind, Schedule};
use slot::{SlotTimer, TX_OFFSET};

/// MAC-layer errors surfaced to the stack.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// No SFD arrived in a receive window. Confined to one slot.
    RadioTimeout,
    /// A frame arrived with a bad checksum. Confined to one slot.
    RadioCrc,
    /// A location-slot sub-offset collision; the conflict backoff runs.
    SlotConflict,
    /// Too many expected advertisements were missed; the MAC rescans.
    SyncLost,
    /// The location engine has no valid fix.
    PositionLost,
    /// The router found no strictly-closer neighbour.
    NoRoute,
    /// A packet exceeded the PDU budget even after fragmentation.
    FrameTooLarge,
    /// The outbound queue is saturated; the caller decides retry policy.
    QueueFull,
    /// A unicast exhausted its retry budget without an acknowledgment.
    AckFailed,
}

impl From<RadioError> for Error {
    fn from(error: RadioError) -> Self {
        match error {
            RadioError::Timeout | RadioError::Busy => Self::RadioTimeout,
            RadioError::Crc => Self::RadioCrc,
        }
    }
}

/// Radio and slot statistics. Radio errors are absorbed here instead of
/// propagating; they never leave the MAC.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MacStats {
    /// Receive windows that closed without an SFD.
    pub rx_timeouts: u32,
    /// Frames dropped on a bad checksum.
    pub rx_crc_errors: u32,
    /// Location-slot sub-offset conflicts observed.
    pub slot_conflicts: u32,
}

impl MacStats {
    fn record(&mut self, error: RadioError) {
        match Error::from(error) {
            Error::RadioCrc => self.rx_crc_errors += 1,
            _ => self.rx_timeouts += 1,
        }
    }
}

/// The MAC state machine.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MacState {
    /// Scanning for a network.
    Detached,
    /// Latched onto a timeline, not yet confirmed.
    Synchronised,
    /// Running the slot loop.
    Joined,
}

/// A parsed advertisement, offered to the scan predicate.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// The advertiser.
    pub src: [u8; 8],
    /// The advertised network SSID.
    pub ssid: Vec<u8, { hyperspace_frame::MAX_SSID_LEN }>,
    /// The advertiser's ASN at its slot start.
    pub asn: u64,
    /// The advertiser's join metric.
    pub join_metric: u8,
    /// The advertised slotframes: `(handle, length, cells)`.
    pub slotframes: Vec<(u8, u16, Vec<(u16, u8, u8), 8>), 2>,
}

/// Frame overhead of a data frame: frame control, sequence number, two
/// extended addresses and the FCS.
const DATA_OVERHEAD: usize = 2 + 1 + 16 + 2;
/// The largest IPv6 fragment a single frame can carry.
pub const PDU_BUDGET: usize = MAX_FRAME_LEN - DATA_OVERHEAD;
/// Outbound queue depth.
const TX_QUEUE: usize = 8;
/// Most fragments a single MTU-sized packet can cut into.
const MAX_FRAGMENTS: usize = frag::IPV6_MTU / 64 + 1;

/// The TSCH MAC, generic over the radio, delay provider, RNG and the
/// upper layer.
pub struct TschMac<'a, R, D, Rng, U> {
    radio: R,
    delay: D,
    rng: Rng,
    upper: &'a U,
    config: Config,
    schedule: Schedule,
    /// Single-writer: only this task mutates the table.
    pub neighbors: NeighborTable,
    timer: SlotTimer,
    state: MacState,
    location: LocationEngine,
    router: Router,
    tx_queue: Queue<PacketBuffer, TX_QUEUE>,
    backoff: Backoff,
    seqno: u8,
    missed_adverts: u8,
    frag_id: u32,
    link_addr: [u8; 8],
    scan_filter: fn(&ScanResult) -> bool,
    /// A node that scans into silence may start its own network.
    found_if_alone: bool,
    stats: MacStats,
}

impl<'a, R, D, Rng, U> TschMac<'a, R, D, Rng, U>
where
    R: Radio,
    D: DelayNs,
    Rng: RngCore,
    U: UpperLayer,
{
    /// Create a MAC bound to a radio and an upper layer.
    pub fn new(
        radio: R,
        delay: D,
        rng: Rng,
        upper: &'a U,
        config: Config,
        scan_filter: fn(&ScanResult) -> bool,
        found_if_alone: bool,
    ) -> Self {
        let link_addr = radio.link_addr();
        let schedule = Schedule::baseline(config.slotframe_length);
        let location = LocationEngine::new(link_addr, &config);
        let router = Router::new(link_addr, config.flood_k);
        let backoff = Backoff::new(config.backoff_w_min, config.backoff_w_max, config.max_retries);

        Self {
            radio,
            delay,
            rng,
            upper,
            config,
            schedule,
            neighbors: NeighborTable::new(),
            timer: SlotTimer::start(crate::time::Instant::ZERO, Asn::ZERO),
            state: MacState::Detached,
            location,
            router,
            tx_queue: Queue::new(),
            backoff,
            seqno: 0,
            missed_adverts: 0,
            frag_id: 0,
            link_addr,
            scan_filter,
            found_if_alone,
            stats: MacStats::default(),
        }
    }

    /// Radio and slot statistics since boot.
    pub fn stats(&self) -> MacStats {
        self.stats
    }

    /// This node's link-layer address.
    pub fn link_addr(&self) -> [u8; 8] {
        self.link_addr
    }

    /// The current MAC state.
    pub fn state(&self) -> MacState {
        self.state
    }

    /// The current position snapshot: `(x, y, z, seq)`.
    pub fn position(&self) -> Option<(f32, f32, f32, u8)> {
        self.location
            .position()
            .map(|f| (f.position.x, f.position.y, f.position.z, f.seq))
    }

    /// The current routing coordinate snapshot: `(r, theta, seq)`.
    pub fn routing_coord(&self) -> (f32, f32, u8) {
        let (coord, seq) = self.location.routing_coord();
        (coord.r, coord.theta, seq)
    }

    /// The beacon index this node currently transmits as.
    pub fn beacon_index(&self) -> Option<u8> {
        self.location.beacon_index()
    }

    /// Administratively allow or forbid beacon roles.
    pub fn allow_beaconing(&mut self, allow: bool) {
        self.config.allow_beaconing = allow;
    }

    /// Run the MAC forever.
    pub async fn run(&mut self) -> ! {
        loop {
            yield_now().await;
            match self.state {
                MacState::Detached => self.scan().await,
                _ => self.run_slot().await,
            }
        }
    }

    /// Execute the slot the schedule puts at the current ASN.
    async fn run_slot(&mut self) {
        let asn = self.timer.asn();

        match self.schedule.cell_at(asn).map(|(_, cell)| *cell) {
            Some(cell) => match cell.kind {
                CellKind::Advertise => self.advertise_slot().await,
                CellKind::Shared => self.shared_slot(None).await,
                CellKind::Tx | CellKind::Rx => self.shared_slot(cell.neighbor).await,
                CellKind::Location => self.location_slot().await,
            },
            None => self.idle_slot().await,
        }

        self.timer.advance();
        if asn.value() % 64 == 0 {
            self.neighbors.expire(asn, self.config.neighbor_timeout_asn);
        }
    }

    /// An idle slot: the radio sleeps and the stack gets to hand us
    /// traffic.
    async fn idle_slot(&mut self) {
        self.radio.sleep().await;
        let upper = self.upper;
        match select(upper.packet_to_transmit(), self.delay.delay_us(SLOT_US as u32)).await {
            Either::First(packet) => {
                if let Err(error) = self.send_packet(packet.frame()).await {
                    self.upper.error(error).await;
                }
            }
            Either::Second(()) => {}
        }
        self.radio.wake().await;
    }

    // ------------------------------------------------------------------
    // Network formation
    // ------------------------------------------------------------------

    /// Scan the configured channels round-robin for an acceptable
    /// advertisement.
    async fn scan(&mut self) {
        debug!("scanning for network");
        self.radio.wake().await;
        let window =
            Duration::from_us(SLOT_US as i64 * self.config.slotframe_length as i64);
        let mut empty_rounds = 0u8;

        while self.state == MacState::Detached {
            for idx in 0..self.config.channels.len() {
                yield_now().await;
                let channel = self.config.channels[idx];
                self.radio.set_channel(channel).await;

                let mut buffer = [0u8; MAX_FRAME_LEN];
                let open = self.radio.now();
                match self.radio.rx_window(open, window, &mut buffer).await {
                    Ok(rx) => {
                        let Some(result) = parse_advertisement(&buffer[..rx.len]) else {
                            continue;
                        };
                        if result.ssid == self.config.ssid && (self.scan_filter)(&result) {
                            self.adopt(&result, rx.sfd_tick);
                            return;
                        }
                    }
                    Err(_) => {}
                }
            }

            empty_rounds = empty_rounds.saturating_add(1);
            if empty_rounds >= 3 && self.found_if_alone {
                self.found();
                return;
            }
        }
    }

    /// Latch onto an advertised timeline.
    fn adopt(&mut self, result: &ScanResult, sfd_tick: crate::time::Instant) {
        info!("synchronised to advertised network at ASN {}", result.asn);

        self.timer = SlotTimer::start(sfd_tick - TX_OFFSET, Asn::new(result.asn));
        self.state = MacState::Synchronised;
        self.missed_adverts = 0;
        self.location.set_founder(false);

        // Take the advertised schedule when one came along.
        if !result.slotframes.is_empty() {
            let mut schedule = Schedule::new();
            for (handle, length, cells) in &result.slotframes {
                let mut slotframe = schedule::Slotframe::new(*handle, *length);
                for (slot_offset, channel_offset, kind_byte) in cells {
                    if let Some((kind, options)) = schedule::Cell::parse_kind_byte(*kind_byte) {
                        let _ = slotframe.add_cell(schedule::Cell {
                            slot_offset: *slot_offset,
                            channel_offset: *channel_offset,
                            kind,
                            options,
                            neighbor: None,
                        });
                    }
                }
                let _ = schedule.add_slotframe(slotframe);
            }
            self.schedule = schedule;
        }

        let prime = self.advertising_prime(self.timer.asn());
        self.neighbors.heard(result.src, self.timer.asn()).beacon_index = Some(prime);
    }

    /// Start a fresh network at ASN 0.
    fn found(&mut self) {
        info!("no network found; founding one");
        self.timer = SlotTimer::start(self.radio.now(), Asn::ZERO);
        self.state = MacState::Joined;
        self.location.set_founder(true);
    }

    // ------------------------------------------------------------------
    // Advertisement slots
    // ------------------------------------------------------------------

    /// Whose turn the advertisement is: primes rotate with the slotframe
    /// repetition.
    fn advertising_prime(&self, asn: Asn) -> u8 {
        (asn.repetition(self.config.slotframe_length) % 4) as u8
    }

    async fn advertise_slot(&mut self) {
        let asn = self.timer.asn();
        let my_turn = self.state == MacState::Joined
            && self.location.beacon_index() == Some(self.advertising_prime(asn));

        if my_turn {
            let mut buffer = [0u8; 128];
            if let Some(len) = self.build_advertisement(asn, &mut buffer) {
                let tick = self.timer.slot_start() + TX_OFFSET;
                let _ = self.radio.tx_at(tick, &buffer[..len], None).await;
            }
            return;
        }

        let window = self.timer.rx_window(TX_OFFSET, self.config.guard);
        let mut buffer = [0u8; MAX_FRAME_LEN];
        match self.radio.rx_window(window.open, window.timeout, &mut buffer).await {
            Ok(rx) => {
                let Some(result) = parse_advertisement(&buffer[..rx.len]) else {
                    return;
                };
                if result.ssid != self.config.ssid {
                    return;
                }
                // Resync the slot origin on the advertiser's SFD.
                let correction = self.timer.resync(rx.sfd_tick, TX_OFFSET);
                self.missed_adverts = 0;
                let prime = self.advertising_prime(asn);
                let neighbor = self.neighbors.heard(result.src, asn);
                neighbor.clock_offset = neighbor.clock_offset + correction;
                neighbor.beacon_index = Some(prime);
                if self.state == MacState::Synchronised {
                    info!("joined the network");
                    self.state = MacState::Joined;
                }
            }
            Err(_) => {
                // The slot is dropped; the ASN still advances. Misses
                // only count while a prime neighbour is actually
                // expected to advertise: a network of one has nothing
                // to lose sync against.
                let expecting = self.neighbors.iter().any(|n| {
                    n.beacon_index
                        .map_or(false, crate::location::lattice::is_prime)
                });
                if !expecting {
                    return;
                }
                self.missed_adverts = self.missed_adverts.saturating_add(1);
                if self.missed_adverts >= self.config.sync_loss_k {
                    warn!("sync lost after {} missed advertisements", self.missed_adverts);
                    self.state = MacState::Detached;
                    self.missed_adverts = 0;
                    self.upper.error(Error::SyncLost).await;
                }
            }
        }
    }

    fn build_advertisement(&self, asn: Asn, buffer: &mut [u8; 128]) -> Option<usize> {
        let mut builder = FrameBuilder::new_advertisement()
            .set_src_address(Address::Extended(self.link_addr))
            .add_header_ie(HeaderIeRepr::Ssid(self.config.ssid.clone()))
            .ok()?
            .add_header_ie(HeaderIeRepr::TschSync { asn: asn.value(), join_metric: 0 })
            .ok()?;

        for slotframe in self.schedule.slotframes() {
            let mut cells = Vec::new();
            for cell in slotframe.cells() {
                cells
                    .push((cell.slot_offset, cell.channel_offset, cell.kind_byte()))
                    .ok()?;
            }
            builder = builder
                .add_header_ie(HeaderIeRepr::SlotframeDescriptor {
                    handle: slotframe.handle,
                    length: slotframe.length,
                    cells,
                })
                .ok()?;
        }

        let repr = builder.finalize().ok()?;
        let len = repr.buffer_len();
        repr.emit(&mut Frame::new_unchecked(&mut buffer[..len]));
        Some(emit_fcs(buffer, len))
    }

    // ------------------------------------------------------------------
    // Shared slots
    // ------------------------------------------------------------------

    /// A shared or dedicated slot: transmit the queue head under backoff,
    /// otherwise listen.
    async fn shared_slot(&mut self, peer: Option<[u8; 8]>) {
        let wants_tx = !self.tx_queue.is_empty() && self.backoff.may_transmit();
        if wants_tx {
            if let Some(frame) = self.tx_queue.try_pop() {
                self.transmit_shared(frame).await;
                return;
            }
        }
        self.receive_shared(peer).await;
    }

    async fn transmit_shared(&mut self, frame: PacketBuffer) {
        let unicast = Frame::new(frame.frame())
            .ok()
            .and_then(|f| f.dst_address())
            .map(|a| a.is_unicast())
            .unwrap_or(false);

        // Broadcast floods dither inside the slot so parallel relays do
        // not repeatedly collide.
        let jitter = if unicast {
            Duration::ZERO
        } else {
            let span = self.config.flood_jitter.ticks().max(1);
            Duration::from_ticks((self.rng.next_u64() % span as u64) as i64)
        };
        let tick = self.timer.slot_start() + TX_OFFSET + jitter;

        let ack_timeout = unicast.then(|| {
            self.config.ack_offset - TX_OFFSET + self.config.guard * 2
        });

        match self.radio.tx_at(tick, frame.frame(), ack_timeout).await {
            Ok(result) => match result.ack {
                crate::phy::AckOutcome::Received(_) | crate::phy::AckOutcome::NotRequested => {
                    self.backoff.success();
                }
                crate::phy::AckOutcome::Timeout => {
                    if self.backoff.collision(&mut self.rng) {
                        // Try again in a later shared slot.
                        if self.tx_queue.push_front(frame).is_err() {
                            self.upper.error(Error::QueueFull).await;
                        }
                    } else {
                        self.backoff.success();
                        self.upper.error(Error::AckFailed).await;
                    }
                }
            },
            Err(_) => {
                if self.tx_queue.push_front(frame).is_err() {
                    self.upper.error(Error::QueueFull).await;
                }
            }
        }
    }

    async fn receive_shared(&mut self, peer: Option<[u8; 8]>) {
        let asn = self.timer.asn();
        let slot_start = self.timer.slot_start();
        let window = self.timer.rx_window(TX_OFFSET, self.config.guard);
        // Flood jitter widens the window beyond the guard.
        let timeout = window.timeout + self.config.flood_jitter;

        let mut buffer = [0u8; MAX_FRAME_LEN];
        let rx = match self.radio.rx_window(window.open, timeout, &mut buffer).await {
            Ok(rx) => rx,
            Err(error) => {
                self.stats.record(error);
                return;
            }
        };

        let Some(frame_data) = check_fcs(&buffer[..rx.len]) else {
            return;
        };
        let Ok(frame) = Frame::new(frame_data) else {
            return;
        };
        let Some(Address::Extended(src)) = frame.src_address() else {
            return;
        };
        if let Some(peer) = peer {
            if src != peer {
                return;
            }
        }
        let dst = frame.dst_address().unwrap_or(Address::Absent);
        let for_us = dst == Address::Extended(self.link_addr) || dst.is_broadcast();
        if !for_us || frame.frame_control().frame_type() != FrameType::Data {
            return;
        }

        let neighbor = self.neighbors.heard(src, asn);
        neighbor.clock_offset = neighbor.clock_offset + (rx.sfd_tick - (slot_start + TX_OFFSET));

        // Acknowledge unicasts at the fixed offset, carrying the
        // turnaround for the sender's ranging bookkeeping.
        let needs_ack =
            frame.frame_control().ack_request() && dst == Address::Extended(self.link_addr);
        let sequence_number = frame.sequence_number();
        let payload: Option<PacketBuffer> = frame.payload().map(PacketBuffer::from_frame);

        if needs_ack {
            if let Some(sequence_number) = sequence_number {
                let turnaround = self.config.ack_offset - (rx.sfd_tick - slot_start);
                let mut ack = [0u8; 64];
                if let Some(len) = build_ack(sequence_number, turnaround, &mut ack) {
                    let tick = slot_start + self.config.ack_offset;
                    let _ = self.radio.tx_at(tick, &ack[..len], None).await;
                }
            }
        }

        if let Some(mut packet) = payload {
            self.dispatch(&mut packet).await;
        }
    }

    // ------------------------------------------------------------------
    // Location slots
    // ------------------------------------------------------------------

    async fn location_slot(&mut self) {
        let asn = self.timer.asn();
        let Some(loc_slot) = self.schedule.location_slot_index(asn) else {
            return;
        };
        let direction = loc_table::direction_for(asn, self.config.slotframe_length);

        let mut driver = self.location.plan_slot(
            direction,
            loc_slot,
            &self.neighbors,
            &self.config,
            &mut self.rng,
        );
        let slot_start = self.timer.slot_start();

        for k in 0..crate::location::slot::SUB_OFFSETS as u8 {
            let tick = sub_offset_tick(slot_start, k);
            match driver.action_at(k) {
                SubSlotAction::Transmit(_) => {
                    // Record the scheduled SFD first so the body carries
                    // the measured turnarounds against it.
                    driver.record_tx(tick);
                    let SubSlotAction::Transmit(body) = driver.action_at(k) else {
                        continue;
                    };
                    let mut buffer = [0u8; 128];
                    if let Some(len) = build_location_frame(self.link_addr, body, &mut buffer) {
                        let _ = self.radio.tx_at(tick, &buffer[..len], None).await;
                    }
                }
                SubSlotAction::Receive => {
                    let guard = self.config.guard;
                    let mut buffer = [0u8; MAX_FRAME_LEN];
                    match self.radio.rx_window(tick - guard, guard * 2, &mut buffer).await {
                        Ok(rx) => {
                            if let Some((src, body)) = parse_location_frame(&buffer[..rx.len]) {
                                driver.record_rx(k, src, rx.sfd_tick, body);
                            }
                        }
                        Err(RadioError::Crc) => {
                            self.stats.record(RadioError::Crc);
                            driver.record_crc_error(k);
                        }
                        Err(error) => self.stats.record(error),
                    }
                }
            }
        }

        let capture = driver.finish();
        let outcome = self.location.process_slot(capture, &mut self.neighbors, asn, &self.config);

        if outcome.conflict {
            self.stats.slot_conflicts += 1;
        }
        if outcome.position_lost {
            self.upper.error(Error::PositionLost).await;
        }
        if outcome.updated {
            let (coord, seq) = self.location.routing_coord();
            self.router.set_own_coord(coord, seq);
        }
    }

    // ------------------------------------------------------------------
    // Packet plumbing
    // ------------------------------------------------------------------

    /// Send an IPv6 packet originated on this node.
    pub async fn send_packet(&mut self, packet: &[u8]) -> Result<(), Error> {
        let mut wrapped = [0u8; frag::IPV6_MTU + 32];
        let len = self.router.originate(packet, &mut wrapped)?;

        self.frag_id = self.frag_id.wrapping_add(1);
        let mut fragments: Vec<PacketBuffer, MAX_FRAGMENTS> = Vec::new();
        frag::fragment(&wrapped[..len], PDU_BUDGET, self.frag_id, |fragment| {
            fragments.push(PacketBuffer::from_frame(fragment)).ok();
        })?;

        let mut result = Ok(());
        for mut fragment in fragments {
            if let Err(error) = self.dispatch(&mut fragment).await {
                result = Err(error);
            }
        }
        result
    }

    /// Run the router on a packet and act on the decision.
    async fn dispatch(&mut self, packet: &mut PacketBuffer) -> Result<(), Error> {
        let len = packet.len;
        let decision = self
            .router
            .forward(&mut packet.buffer[..len], &self.neighbors, self.timer.asn());

        // Tell a directly reachable stale sender about the move.
        if let Some(redirect) = decision.redirect {
            if self.neighbors.get(&redirect.to).is_some() {
                let mut out = [0u8; 64];
                let rlen = self.router.emit_redirect(&redirect, &mut out);
                let mut notice = PacketBuffer::from_frame(&out[..rlen]);
                let _ = self.enqueue_frame(redirect.to, &mut notice);
            }
        }

        match decision.action {
            Forward::Deliver => {
                self.upper.received_packet(core::mem::take(packet)).await;
                Ok(())
            }
            Forward::Unicast(next) => self.enqueue_frame(next, packet),
            Forward::Flood(copies) => {
                for _ in 0..copies {
                    self.enqueue_frame([0xff; 8], packet)?;
                }
                Ok(())
            }
            Forward::Duplicate => Ok(()),
            Forward::NoRoute => {
                self.upper.error(Error::NoRoute).await;
                Err(Error::NoRoute)
            }
        }
    }

    /// Wrap an IPv6 packet into a data frame bound for `dst` and queue
    /// it for the next shared slot.
    fn enqueue_frame(&mut self, dst: [u8; 8], packet: &PacketBuffer) -> Result<(), Error> {
        if packet.len > PDU_BUDGET {
            return Err(Error::FrameTooLarge);
        }

        let dst = Address::Extended(dst);
        self.seqno = self.seqno.wrapping_add(1);
        let mut builder = FrameBuilder::new_data(packet.frame())
            .set_sequence_number(self.seqno)
            .set_dst_address(dst)
            .set_src_address(Address::Extended(self.link_addr));
        if dst.is_unicast() {
            builder = builder.set_ack_request();
        }
        let repr = builder.finalize().map_err(|_| Error::FrameTooLarge)?;

        let mut out = PacketBuffer::default();
        let len = repr.buffer_len();
        repr.emit(&mut Frame::new_unchecked(&mut out.buffer[..len]));
        out.len = emit_fcs(&mut out.buffer, len);

        self.tx_queue.push(out).map_err(|_| Error::QueueFull)
    }
}

/// Parse an advertisement frame (FCS included) into a [`ScanResult`].
fn parse_advertisement(bytes: &[u8]) -> Option<ScanResult> {
    let data = check_fcs(bytes)?;
    let frame = Frame::new(data).ok()?;
    if frame.frame_control().frame_type() != FrameType::Beacon {
        return None;
    }
    let Address::Extended(src) = frame.src_address()? else {
        return None;
    };

    let mut result = ScanResult {
        src,
        ssid: Vec::new(),
        asn: 0,
        join_metric: 0,
        slotframes: Vec::new(),
    };

    let ies = frame.information_elements()?;
    let mut have_sync = false;
    for ie in ies.header_information_elements() {
        match HeaderIeRepr::parse(&ie) {
            Some(HeaderIeRepr::Ssid(ssid)) => result.ssid = ssid,
            Some(HeaderIeRepr::TschSync { asn, join_metric }) => {
                result.asn = asn;
                result.join_metric = join_metric;
                have_sync = true;
            }
            Some(HeaderIeRepr::SlotframeDescriptor { handle, length, cells }) => {
                result.slotframes.push((handle, length, cells)).ok()?;
            }
            _ => {}
        }
    }

    have_sync.then_some(result)
}

/// Build an acknowledgment with the ranging turnaround, FCS appended.
fn build_ack(sequence_number: u8, turnaround: Duration, buffer: &mut [u8; 64]) -> Option<usize> {
    let repr = FrameBuilder::new_ack(sequence_number)
        .add_header_ie(HeaderIeRepr::TimeCorrection(turnaround.ticks() as i32))
        .ok()?
        .finalize()
        .ok()?;
    let len = repr.buffer_len();
    repr.emit(&mut Frame::new_unchecked(&mut buffer[..len]));
    Some(emit_fcs(buffer, len))
}

/// Extract the turnaround a received acknowledgment carries.
pub fn ack_turnaround(bytes: &[u8]) -> Option<Duration> {
    let data = check_fcs(bytes)?;
    let frame = Frame::new(data).ok()?;
    if frame.frame_control().frame_type() != FrameType::Ack {
        return None;
    }
    let ies = frame.information_elements()?;
    for ie in ies.header_information_elements() {
        if let Ok(tc) = TimeCorrection::new(ie.content()) {
            if ie.element_id() == hyperspace_frame::HeaderElementId::TimeCorrection {
                return Some(Duration::from_ticks(tc.ticks() as i64));
            }
        }
    }
    None
}

/// Build a location-slot frame (FCS included).
fn build_location_frame(
    link_addr: [u8; 8],
    body: LocBeaconRepr,
    buffer: &mut [u8; 128],
) -> Option<usize> {
    let repr = FrameBuilder::new_location(body)
        .set_src_address(Address::Extended(link_addr))
        .finalize()
        .ok()?;
    let len = repr.buffer_len();
    repr.emit(&mut Frame::new_unchecked(&mut buffer[..len]));
    Some(emit_fcs(buffer, len))
}

/// Parse a location-slot frame into its source and body.
fn parse_location_frame(bytes: &[u8]) -> Option<([u8; 8], LocBeaconRepr)> {
    let data = check_fcs(bytes)?;
    let frame = Frame::new(data).ok()?;
    let Address::Extended(src) = frame.src_address()? else {
        return None;
    };
    let ies = frame.information_elements()?;
    for ie in ies.payload_information_elements() {
        if let Some(PayloadIeRepr::LocBeacon(body)) = PayloadIeRepr::parse(&ie) {
            return Some((src, body));
        }
    }
    None
}
