//! IPv6-layer fragmentation.
//!
//! Oversized packets are split at the IPv6 layer, not 6LoWPAN-style: the
//! unfragmentable part (fixed header plus the hop-by-hop header with the
//! coordinate option) is copied into every fragment, so each fragment
//! routes independently and carries the same packet id for dedupe.

use hyperspace_frame::{FragmentHeader, HopByHopHeader, Ipv6Header, NEXT_HEADER_FRAGMENT};

use crate::mac::Error;

/// The IPv6 MTU assumed for the mesh-local interface.
pub const IPV6_MTU: usize = 1_280;

/// Split `packet` into fragments of at most `mtu` bytes each, invoking
/// `emit` per fragment. A packet that already fits is emitted unchanged.
///
/// The packet must start with an IPv6 header; a hop-by-hop header, when
/// present, joins the unfragmentable part.
pub fn fragment(
    packet: &[u8],
    mtu: usize,
    identification: u32,
    mut emit: impl FnMut(&[u8]),
) -> Result<(), Error> {
    if packet.len() <= mtu {
        emit(packet);
        return Ok(());
    }

    let header = Ipv6Header::new(packet).map_err(|_| Error::FrameTooLarge)?;
    let mut unfrag = Ipv6Header::<&[u8]>::LEN;
    let mut next_header = header.next_header();
    if next_header == hyperspace_frame::NEXT_HEADER_HOP_BY_HOP {
        let hbh = HopByHopHeader::new(&packet[unfrag..]).map_err(|_| Error::FrameTooLarge)?;
        next_header = hbh.next_header();
        unfrag += hbh.total_len();
    }

    let overhead = unfrag + FragmentHeader::<&[u8]>::LEN;
    if overhead + 8 > mtu {
        return Err(Error::FrameTooLarge);
    }
    // Fragment data lengths are multiples of 8, except the last.
    let chunk = (mtu - overhead) & !7;

    let payload = &packet[unfrag..];
    let mut buffer = [0u8; IPV6_MTU];
    let mut offset = 0;

    while offset < payload.len() {
        let take = chunk.min(payload.len() - offset);
        let more = offset + take < payload.len();
        let total = overhead + take;

        buffer[..unfrag].copy_from_slice(&packet[..unfrag]);
        buffer[overhead..total].copy_from_slice(&payload[offset..offset + take]);

        // Splice the fragment header in and fix the lengths up.
        {
            let mut fragment_header =
                FragmentHeader::new_unchecked(&mut buffer[unfrag..unfrag + 8]);
            fragment_header.emit(next_header, offset, more, identification);
        }
        {
            let mut header = Ipv6Header::new_unchecked(&mut buffer[..]);
            header.set_payload_length(total - Ipv6Header::<&[u8]>::LEN);
        }
        if unfrag > Ipv6Header::<&[u8]>::LEN {
            // The hop-by-hop header now chains to the fragment header.
            hbh_set_next(&mut buffer[Ipv6Header::<&[u8]>::LEN..], NEXT_HEADER_FRAGMENT);
        } else {
            let mut header = Ipv6Header::new_unchecked(&mut buffer[..]);
            header.set_next_header(NEXT_HEADER_FRAGMENT);
        }

        emit(&buffer[..total]);
        offset += take;
    }

    Ok(())
}

fn hbh_set_next(hbh: &mut [u8], next: u8) {
    hbh[0] = next;
}
