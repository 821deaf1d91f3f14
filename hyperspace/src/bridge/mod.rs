//! The root-node host bridge: a framed IPv6 tunnel over slave SPI.
//!
//! A transaction has two phases. The first burst is a fixed 40 bytes,
//! enough for the IPv6 header (with its hop-by-hop option the header
//! chain is always at least that long): each side learns from the
//! version nibble whether the other has a packet, and from the payload
//! length how much follows. The second burst is sized to
//! `max(tx_remaining, rx_announced)`, so both directions complete in the
//! same transaction; either side may be idle. A READY line, driven
//! active-high while the slave holds outbound data, gives the host its
//! interrupt.
//!
//! The electrical contract is fixed by the host: mode 3 (CPOL=1,
//! CPHA=1), MSB first, 8 MHz nominal. That lives in the platform's
//! [`SpiSlave`] implementation, not here.

use core::future::Future;

use hyperspace_frame::Ipv6Header;

use crate::route::frag::IPV6_MTU;

/// The fixed first-burst length.
pub const HEADER_BURST: usize = 40;

/// Bridge errors.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BridgeError {
    /// An outbound packet shorter than the header burst.
    ShortPacket,
    /// The host announced a length beyond the MTU.
    Oversized,
}

/// The SPI slave port. One call clocks `tx` out while filling `rx`; the
/// two buffers have equal length and the master provides the clock.
pub trait SpiSlave {
    /// Perform one full-duplex burst.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> impl Future<Output = ()>;
}

/// The READY GPIO toward the host, active high.
pub trait ReadyLine {
    /// Drive the line.
    fn set_ready(&mut self, ready: bool);
}

/// The host bridge endpoint on the node side.
pub struct HostBridge<S, L> {
    spi: S,
    ready: L,
}

impl<S: SpiSlave, L: ReadyLine> HostBridge<S, L> {
    /// Create a bridge over a slave SPI port and a READY line.
    pub fn new(spi: S, ready: L) -> Self {
        Self { spi, ready }
    }

    /// Run one transaction.
    ///
    /// `outbound` is an optional packet for the host; a packet received
    /// from the host lands in `inbound` and its length is returned.
    pub async fn transact(
        &mut self,
        outbound: Option<&[u8]>,
        inbound: &mut [u8; IPV6_MTU],
    ) -> Result<Option<usize>, BridgeError> {
        if let Some(packet) = outbound {
            if packet.len() < HEADER_BURST {
                return Err(BridgeError::ShortPacket);
            }
            self.ready.set_ready(true);
        }

        // Phase 1: the fixed header burst. An idle slave clocks zeros,
        // whose version nibble cannot read as 6.
        let mut tx_header = [0u8; HEADER_BURST];
        if let Some(packet) = outbound {
            tx_header.copy_from_slice(&packet[..HEADER_BURST]);
        }
        let mut rx_header = [0u8; HEADER_BURST];
        self.spi.transfer(&tx_header, &mut rx_header).await;

        let host_len = match Ipv6Header::new(&rx_header[..]) {
            Ok(header) => {
                let total = Ipv6Header::<&[u8]>::LEN + header.payload_length();
                if total > IPV6_MTU {
                    self.ready.set_ready(false);
                    return Err(BridgeError::Oversized);
                }
                Some(total)
            }
            Err(_) => None,
        };

        // Phase 2: sized to whichever side still has bytes.
        let tx_remaining = outbound.map_or(0, |p| p.len() - HEADER_BURST);
        let rx_remaining = host_len.map_or(0, |l| l.saturating_sub(HEADER_BURST));
        let burst = tx_remaining.max(rx_remaining);

        inbound[..HEADER_BURST].copy_from_slice(&rx_header);
        if burst > 0 {
            let mut tx_body = [0u8; IPV6_MTU];
            if let Some(packet) = outbound {
                tx_body[..tx_remaining].copy_from_slice(&packet[HEADER_BURST..]);
            }
            let (tx_body, rx_body) = (
                &tx_body[..burst],
                &mut inbound[HEADER_BURST..HEADER_BURST + burst],
            );
            self.spi.transfer(tx_body, rx_body).await;
        }

        self.ready.set_ready(false);
        Ok(host_len)
    }
}
